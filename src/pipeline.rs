//! Request handling: validate → transform → evaluate → render → assemble.
//!
//! Every failure is turned into a failure [`RenderResponse`]; nothing escapes
//! [`Pipeline::handle`].

use crate::document::{self, Stylesheet};
use crate::error::{PipelineError, StartupError};
use crate::loader::HostModuleLoader;
use crate::ops::ConsoleOutput;
use crate::registry::ComponentRegistry;
use crate::render::render_fragment;
use crate::runtime::{create_runtime, drain_console, restore_heap_limit, Deadline, SandboxConfig};
use crate::sandbox::{evaluate, ExecutionContext};
use crate::sanitize::sanitize_props;
use crate::transform::{Program, SourceTransformer, Transform};
use deno_core::JsRuntime;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

pub const SUCCESS_MESSAGE: &str = "Component rendered successfully";

/// A render request as received. Fields stay untyped until validation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RenderRequest {
    #[serde(default)]
    pub code: Option<Value>,
    #[serde(default)]
    pub props: Option<Value>,
}

impl RenderRequest {
    pub fn new(code: impl Into<String>, props: Value) -> Self {
        Self {
            code: Some(Value::String(code.into())),
            props: Some(props),
        }
    }

    fn validate(self) -> Result<ValidRequest, PipelineError> {
        let code = match self.code {
            Some(Value::String(code)) => code,
            Some(_) => return Err(PipelineError::validation("code must be a string")),
            None => return Err(PipelineError::validation("code is required")),
        };
        if code.trim().is_empty() {
            return Err(PipelineError::validation("code must not be empty"));
        }
        let props = sanitize_props(self.props)?;
        Ok(ValidRequest { code, props })
    }
}

struct ValidRequest {
    code: String,
    props: Map<String, Value>,
}

/// Outcome of one render, shaped for the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fragment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl RenderResponse {
    pub fn success(html: String, fragment: String) -> Self {
        Self {
            success: true,
            html: Some(html),
            fragment: Some(fragment),
            message: Some(SUCCESS_MESSAGE.to_string()),
            error: None,
            stack: None,
        }
    }

    pub fn failure(error: &PipelineError, include_stack: bool) -> Self {
        Self {
            success: false,
            html: None,
            fragment: None,
            message: None,
            error: Some(error.to_string()),
            stack: include_stack
                .then(|| error.stack().map(str::to_string))
                .flatten(),
        }
    }

    /// Response used when the render worker cannot be reached.
    pub fn unavailable() -> Self {
        Self {
            success: false,
            html: None,
            fragment: None,
            message: None,
            error: Some(String::from("render worker is unavailable")),
            stack: None,
        }
    }
}

/// A successfully rendered component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub document: String,
    pub fragment: String,
}

/// Per-request options fixed at startup.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub registry_module: String,
    pub include_stack: bool,
    pub render_timeout: Option<Duration>,
}

impl From<&SandboxConfig> for PipelineOptions {
    fn from(config: &SandboxConfig) -> Self {
        Self {
            registry_module: config.registry_module.clone(),
            include_stack: config.include_stack,
            render_timeout: config.render_timeout,
        }
    }
}

/// The render pipeline. Owns the runtime, so it stays on one thread.
pub struct Pipeline<T = SourceTransformer> {
    runtime: JsRuntime,
    registry: ComponentRegistry,
    stylesheet: Stylesheet,
    transformer: T,
    options: PipelineOptions,
}

impl Pipeline<SourceTransformer> {
    /// Create the runtime, load the registry and the stylesheet.
    pub fn bootstrap(config: &SandboxConfig) -> Result<Self, StartupError> {
        let transformer = SourceTransformer::new(config.component_identifier.clone());
        Self::bootstrap_with(config, transformer)
    }
}

impl<T: Transform> Pipeline<T> {
    /// Like [`Pipeline::bootstrap`] with a custom transformer.
    pub fn bootstrap_with(config: &SandboxConfig, transformer: T) -> Result<Self, StartupError> {
        let loader = HostModuleLoader::new(&config.registry_dir).map_err(|_| {
            StartupError::RegistryMissing {
                path: config.registry_dir.clone(),
            }
        })?;
        let registry_dir = loader.root().to_path_buf();

        let mut runtime =
            create_runtime(config, loader).map_err(|e| StartupError::RegistryMalformed {
                path: registry_dir.clone(),
                reason: e.to_string(),
            })?;

        let registry = ComponentRegistry::load(&mut runtime, &registry_dir, &config.registry_entry)?;
        if registry.is_empty() {
            warn!(path = %registry_dir.display(), "component registry exports no components");
        }
        info!(
            components = registry.len(),
            path = %registry_dir.display(),
            "component registry loaded"
        );

        let stylesheet = Stylesheet::load(&registry_dir.join(&config.stylesheet));

        Ok(Self::new(
            runtime,
            registry,
            stylesheet,
            transformer,
            PipelineOptions::from(config),
        ))
    }

    pub fn new(
        runtime: JsRuntime,
        registry: ComponentRegistry,
        stylesheet: Stylesheet,
        transformer: T,
        options: PipelineOptions,
    ) -> Self {
        Self {
            runtime,
            registry,
            stylesheet,
            transformer,
            options,
        }
    }

    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    pub fn stylesheet(&self) -> &Stylesheet {
        &self.stylesheet
    }

    pub fn runtime(&mut self) -> &mut JsRuntime {
        &mut self.runtime
    }

    /// Handle one request and always produce a response.
    pub fn handle(&mut self, request: RenderRequest) -> RenderResponse {
        let started = Instant::now();
        let outcome = self.run(request);
        log_console(drain_console(&mut self.runtime));

        match outcome {
            Ok(rendered) => {
                info!(
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    bytes = rendered.document.len(),
                    "component rendered"
                );
                RenderResponse::success(rendered.document, rendered.fragment)
            }
            Err(error) => {
                warn!(
                    stage = error.stage(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    %error,
                    "render failed"
                );
                RenderResponse::failure(&error, self.options.include_stack)
            }
        }
    }

    /// Run the stages, stopping at the first failure.
    pub fn run(&mut self, request: RenderRequest) -> Result<Rendered, PipelineError> {
        let request = request.validate()?;
        let program = self.transformer.transform(&request.code)?;
        debug!(bytes = program.as_str().len(), "component source transformed");

        let (fragment, timed_out) = match self.options.render_timeout {
            Some(timeout) => {
                let deadline = Deadline::arm(&mut self.runtime, timeout);
                let result = self.execute(&program, &request.props);
                (result, deadline.disarm().then_some(timeout))
            }
            None => (self.execute(&program, &request.props), None),
        };

        let heap_exhausted = restore_heap_limit(&mut self.runtime);
        if self.runtime.v8_isolate().is_execution_terminating() {
            self.runtime.v8_isolate().cancel_terminate_execution();
        }
        if let Some(timeout) = timed_out {
            return Err(PipelineError::evaluation(
                format!("render timed out after {}ms", timeout.as_millis()),
                None,
            ));
        }
        if heap_exhausted {
            return Err(PipelineError::evaluation("heap limit exceeded", None));
        }

        let fragment = fragment?;
        let document = document::assemble(&fragment, &self.stylesheet);
        Ok(Rendered { document, fragment })
    }

    fn execute(&mut self, program: &Program, props: &Map<String, Value>) -> Result<String, PipelineError> {
        let context = ExecutionContext::new(
            &mut self.runtime,
            &self.registry,
            &self.options.registry_module,
            props,
        )?;
        let component = evaluate(&mut self.runtime, program, context)?;
        render_fragment(&mut self.runtime, &component, props)
    }
}

/// Forward captured sandbox console output to the host log.
fn log_console(output: ConsoleOutput) {
    if output.is_empty() {
        return;
    }
    for line in &output.logs {
        info!(target: "sandbox::console", "{}", line);
    }
    for line in &output.warns {
        warn!(target: "sandbox::console", "{}", line);
    }
    for line in &output.errors {
        error!(target: "sandbox::console", "{}", line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::Cell;
    use std::fs;
    use std::rc::Rc;
    use tempfile::{tempdir, TempDir};

    /// Counts calls and delegates to the real compiler.
    struct CountingTransformer {
        calls: Rc<Cell<usize>>,
        inner: SourceTransformer,
    }

    impl Transform for CountingTransformer {
        fn transform(&self, source: &str) -> Result<Program, PipelineError> {
            self.calls.set(self.calls.get() + 1);
            self.inner.transform(source)
        }
    }

    fn registry_dir() -> TempDir {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("index.js"),
            r#"
            const React = require("react");
            exports.Card = (props) =>
                React.createElement("section", { className: "card" }, props.children);
            "#,
        )
        .unwrap();
        dir
    }

    fn counting_pipeline(dir: &TempDir) -> (Pipeline<CountingTransformer>, Rc<Cell<usize>>) {
        let calls = Rc::new(Cell::new(0));
        let config = SandboxConfig {
            registry_dir: dir.path().to_path_buf(),
            ..Default::default()
        };
        let transformer = CountingTransformer {
            calls: Rc::clone(&calls),
            inner: SourceTransformer::new("App"),
        };
        (Pipeline::bootstrap_with(&config, transformer).unwrap(), calls)
    }

    #[tokio::test]
    async fn blank_code_never_reaches_the_transformer() {
        let dir = registry_dir();
        let (mut pipeline, calls) = counting_pipeline(&dir);

        for code in [json!(""), json!("   \n\t"), json!(42)] {
            let request = RenderRequest {
                code: Some(code),
                props: None,
            };
            let response = pipeline.handle(request);
            assert!(!response.success);
            assert!(response.error.unwrap().starts_with("Invalid request"));
        }
        let response = pipeline.handle(RenderRequest::default());
        assert_eq!(response.error.as_deref(), Some("Invalid request: code is required"));

        assert_eq!(calls.get(), 0);
    }

    #[tokio::test]
    async fn valid_code_is_transformed_once() {
        let dir = registry_dir();
        let (mut pipeline, calls) = counting_pipeline(&dir);

        let response = pipeline.handle(RenderRequest::new(
            "function App() { return <p>ok</p>; }",
            json!({}),
        ));

        assert!(response.success, "{response:?}");
        assert_eq!(response.fragment.as_deref(), Some("<p>ok</p>"));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn failure_response_omits_stack_when_disabled() {
        let error = PipelineError::evaluation("Error: boom", Some("Error: boom\n    at App".into()));

        let with_stack = RenderResponse::failure(&error, true);
        let without_stack = RenderResponse::failure(&error, false);

        assert_eq!(with_stack.stack.as_deref(), Some("Error: boom\n    at App"));
        assert!(without_stack.stack.is_none());
        assert_eq!(
            serde_json::to_value(&without_stack).unwrap(),
            json!({ "success": false, "error": "Failed to evaluate component: Error: boom" })
        );
    }

    #[test]
    fn success_response_shape() {
        let response = RenderResponse::success("<!DOCTYPE html>".into(), "<p/>".into());
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({
                "success": true,
                "html": "<!DOCTYPE html>",
                "fragment": "<p/>",
                "message": SUCCESS_MESSAGE,
            })
        );
    }
}
