//! Error types for the render pipeline and for process startup.
//!
//! Per-request failures ([`PipelineError`]) are always turned into a failure
//! response by the request handler. Startup failures ([`StartupError`]) are
//! fatal: the binary logs them and exits.

use std::path::PathBuf;

use thiserror::Error;

/// Failure of one render request, tagged by the stage that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    /// Bad or missing input, detected before any compilation.
    #[error("Invalid request: {0}")]
    Validation(String),

    /// The JSX compiler rejected the source.
    #[error("Failed to compile component source: {message}")]
    Transform { message: String },

    /// Evaluation finished but produced nothing renderable.
    #[error("No valid component factory returned from user code")]
    NoComponent,

    /// An exception escaped the sandboxed evaluation.
    #[error("Failed to evaluate component: {message}")]
    Evaluation {
        message: String,
        stack: Option<String>,
    },

    /// An exception escaped element construction or serialization.
    #[error("Failed to render component: {message}")]
    Render {
        message: String,
        stack: Option<String>,
    },
}

impl PipelineError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn transform(message: impl Into<String>) -> Self {
        Self::Transform {
            message: message.into(),
        }
    }

    pub fn evaluation(message: impl Into<String>, stack: Option<String>) -> Self {
        Self::Evaluation {
            message: message.into(),
            stack,
        }
    }

    pub fn render(message: impl Into<String>, stack: Option<String>) -> Self {
        Self::Render {
            message: message.into(),
            stack,
        }
    }

    /// JavaScript stack trace, when the failure came from executed code.
    pub fn stack(&self) -> Option<&str> {
        match self {
            Self::Evaluation { stack, .. } | Self::Render { stack, .. } => stack.as_deref(),
            _ => None,
        }
    }

    /// Short stage name used as a structured logging field.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validate",
            Self::Transform { .. } => "transform",
            Self::NoComponent | Self::Evaluation { .. } => "evaluate",
            Self::Render { .. } => "render",
        }
    }
}

/// Fatal failure while bringing up the render worker.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(
        "component registry not found at {}; run the registry build step before starting the server",
        .path.display()
    )]
    RegistryMissing { path: PathBuf },

    #[error("component registry at {} is malformed: {reason}", .path.display())]
    RegistryMalformed { path: PathBuf, reason: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("render worker exited before reporting readiness")]
    WorkerExited,
}
