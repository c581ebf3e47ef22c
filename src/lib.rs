//! # Component Playground
//!
//! Renders submitted JSX components to HTML on the server.
//!
//! A request travels through fixed stages:
//!
//! 1. **Validate** the request body ([`RenderRequest`])
//! 2. **Transform** JSX into plain JavaScript ([`SourceTransformer`])
//! 3. **Evaluate** it in a sandbox that binds only `React`, `props`,
//!    `console` and `require` ([`sandbox::evaluate`])
//! 4. **Render** the component to an HTML fragment ([`render_fragment`])
//! 5. **Assemble** a full document with the registry stylesheet
//!    ([`document::assemble`])
//!
//! Pre-built components come from a CommonJS artifact directory loaded once
//! at startup ([`ComponentRegistry`]). The V8 runtime is owned by a single
//! worker thread ([`RenderService`]); renders never interleave.
//!
//! ## Sandbox
//!
//! - **No filesystem access**: `require` reads only `.js`/`.cjs` files inside
//!   the registry directory
//! - **No network access**: URL specifiers are rejected
//! - **No environment access**: there is no `process` and no Node built-ins
//!
//! ## Usage
//!
//! ```rust,ignore
//! use component_playground::{RenderRequest, RenderService, SandboxConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let service = RenderService::spawn(SandboxConfig::default(), 64).unwrap();
//!     let response = service
//!         .render(RenderRequest::new(
//!             "function App(props) { return <h1>{props.title}</h1>; }",
//!             serde_json::json!({ "title": "Hello" }),
//!         ))
//!         .await;
//!
//!     println!("{}", response.html.unwrap_or_default());
//! }
//! ```

pub mod config;
pub mod document;
pub mod error;
mod loader;
mod ops;
pub mod pipeline;
pub mod registry;
pub mod render;
mod runtime;
pub mod sandbox;
mod sanitize;
pub mod server;
pub mod telemetry;
pub mod transform;
pub mod worker;

pub use document::Stylesheet;
pub use error::{PipelineError, StartupError};
pub use loader::{HostModule, HostModuleLoader};
pub use ops::ConsoleOutput;
pub use pipeline::{Pipeline, RenderRequest, RenderResponse, Rendered, SUCCESS_MESSAGE};
pub use registry::ComponentRegistry;
pub use render::render_fragment;
pub use runtime::{create_runtime, drain_console, SandboxConfig};
pub use sanitize::sanitize_props;
pub use transform::{Program, SourceTransformer, Transform};
pub use worker::RenderService;
