//! Server-side rendering of an evaluated component to an HTML fragment.

use crate::error::PipelineError;
use crate::runtime::{bootstrap_fn, caught_failure};
use crate::sandbox::Component;
use deno_core::{serde_v8, v8, JsRuntime};
use serde_json::{Map, Value};

/// Create one element from `component` with `props` and serialize it with the
/// library's synchronous `renderToString`.
pub fn render_fragment(
    runtime: &mut JsRuntime,
    component: &Component,
    props: &Map<String, Value>,
) -> Result<String, PipelineError> {
    let scope = &mut runtime.handle_scope();
    let tc = &mut v8::TryCatch::new(scope);

    let render = bootstrap_fn(tc, "renderComponent")
        .map_err(|e| PipelineError::render(e.to_string(), None))?;
    let component = v8::Local::new(tc, component.handle());
    let props = serde_v8::to_v8(tc, props).map_err(|e| PipelineError::render(e.to_string(), None))?;
    let recv: v8::Local<v8::Value> = v8::undefined(tc).into();

    let Some(html) = render.call(tc, recv, &[component, props]) else {
        let failure = caught_failure(tc);
        return Err(PipelineError::render(failure.message, failure.stack));
    };

    if !html.is_string() {
        return Err(PipelineError::render("renderer did not produce a string", None));
    }
    Ok(html.to_rust_string_lossy(tc))
}
