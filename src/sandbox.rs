//! Sandboxed evaluation of transformed component code.
//!
//! The program runs as the body of a fresh function whose parameters are
//! exactly [`SANDBOX_BINDINGS`]. Its return value is the component.

use crate::error::PipelineError;
use crate::registry::ComponentRegistry;
use crate::runtime::{bootstrap_fn, bootstrap_value, caught_failure};
use crate::transform::Program;
use deno_core::{serde_v8, v8, JsRuntime};
use serde_json::{Map, Value};

/// Names visible to submitted code, in parameter order.
pub const SANDBOX_BINDINGS: [&str; 4] = ["React", "props", "console", "require"];

/// A validated component value living in the runtime.
pub struct Component(v8::Global<v8::Value>);

impl Component {
    pub fn handle(&self) -> &v8::Global<v8::Value> {
        &self.0
    }
}

/// Values bound to [`SANDBOX_BINDINGS`] for one request.
pub struct ExecutionContext {
    values: [v8::Global<v8::Value>; 4],
}

impl ExecutionContext {
    /// Build a fresh context: the rendering library, the request props, a new
    /// console sink and a new `require` with its own module cache.
    pub fn new(
        runtime: &mut JsRuntime,
        registry: &ComponentRegistry,
        registry_module: &str,
        props: &Map<String, Value>,
    ) -> Result<Self, PipelineError> {
        let internal = |message: String| PipelineError::evaluation(message, None);

        let scope = &mut runtime.handle_scope();
        let tc = &mut v8::TryCatch::new(scope);
        let recv: v8::Local<v8::Value> = v8::undefined(tc).into();

        let library = bootstrap_value(tc, "library").map_err(|e| internal(e.to_string()))?;
        let props = serde_v8::to_v8(tc, props).map_err(|e| internal(e.to_string()))?;

        let create_console =
            bootstrap_fn(tc, "createConsole").map_err(|e| internal(e.to_string()))?;
        let Some(console) = create_console.call(tc, recv, &[]) else {
            return Err(internal(caught_failure(tc).message));
        };

        let create_require =
            bootstrap_fn(tc, "createRequire").map_err(|e| internal(e.to_string()))?;
        let registry_exports = v8::Local::new(tc, registry.exports());
        let registry_name = v8::String::new(tc, registry_module)
            .ok_or_else(|| internal(String::from("registry name is not a valid string")))?;
        let Some(require) =
            create_require.call(tc, recv, &[registry_exports.into(), registry_name.into()])
        else {
            return Err(internal(caught_failure(tc).message));
        };

        Ok(Self {
            values: [
                v8::Global::new(tc, library),
                v8::Global::new(tc, props),
                v8::Global::new(tc, console),
                v8::Global::new(tc, require),
            ],
        })
    }
}

/// Compile `program` with the context's binding names as parameters, call it
/// once and validate the returned component.
pub fn evaluate(
    runtime: &mut JsRuntime,
    program: &Program,
    context: ExecutionContext,
) -> Result<Component, PipelineError> {
    let scope = &mut runtime.handle_scope();
    let tc = &mut v8::TryCatch::new(scope);
    let compile = bootstrap_fn(tc, "compileProgram")
        .map_err(|e| PipelineError::evaluation(e.to_string(), None))?;

    let mut names: Vec<v8::Local<v8::Value>> = Vec::with_capacity(SANDBOX_BINDINGS.len());
    for name in SANDBOX_BINDINGS {
        let value = v8::String::new(tc, name)
            .ok_or_else(|| PipelineError::evaluation("failed to allocate binding name", None))?;
        names.push(value.into());
    }
    let parameters = v8::Array::new_with_elements(tc, &names);
    let body = v8::String::new(tc, program.as_str())
        .ok_or_else(|| PipelineError::evaluation("program is too large", None))?;
    let recv: v8::Local<v8::Value> = v8::undefined(tc).into();

    let Some(compiled) = compile.call(tc, recv, &[parameters.into(), body.into()]) else {
        return Err(evaluation_failure(tc));
    };
    let function = v8::Local::<v8::Function>::try_from(compiled)
        .map_err(|_| PipelineError::evaluation("compiled program is not a function", None))?;

    let arguments: Vec<v8::Local<v8::Value>> = context
        .values
        .iter()
        .map(|value| v8::Local::new(tc, value))
        .collect();

    let Some(exported) = function.call(tc, recv, &arguments) else {
        return Err(evaluation_failure(tc));
    };

    if exported.is_function() || (exported.is_object() && !exported.is_null()) {
        Ok(Component(v8::Global::new(tc, exported)))
    } else {
        Err(PipelineError::NoComponent)
    }
}

fn evaluation_failure(tc: &mut v8::TryCatch<v8::HandleScope>) -> PipelineError {
    let failure = caught_failure(tc);
    PipelineError::evaluation(failure.message, failure.stack)
}
