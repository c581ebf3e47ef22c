//! Ops exposed to the bootstrap module and the `playground_runtime` extension.

use crate::loader::{HostModule, HostModuleLoader};
use anyhow::{anyhow, Error};
use deno_core::{op2, OpState};

// ============================================================================
// Console Output Capture
// ============================================================================

/// Console output captured from sandboxed code during one request.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ConsoleOutput {
    pub logs: Vec<String>,
    pub warns: Vec<String>,
    pub errors: Vec<String>,
}

impl ConsoleOutput {
    pub fn is_empty(&self) -> bool {
        self.logs.is_empty() && self.warns.is_empty() && self.errors.is_empty()
    }
}

#[op2(fast)]
pub fn op_console_log(state: &mut OpState, #[string] msg: &str) {
    if let Some(output) = state.try_borrow_mut::<ConsoleOutput>() {
        output.logs.push(msg.to_string());
    }
}

#[op2(fast)]
pub fn op_console_warn(state: &mut OpState, #[string] msg: &str) {
    if let Some(output) = state.try_borrow_mut::<ConsoleOutput>() {
        output.warns.push(msg.to_string());
    }
}

#[op2(fast)]
pub fn op_console_error(state: &mut OpState, #[string] msg: &str) {
    if let Some(output) = state.try_borrow_mut::<ConsoleOutput>() {
        output.errors.push(msg.to_string());
    }
}

// ============================================================================
// Host Modules
// ============================================================================

#[op2]
#[serde]
pub fn op_host_module(
    state: &mut OpState,
    #[string] specifier: String,
    #[string] referrer: String,
) -> Result<HostModule, Error> {
    let loader = state
        .try_borrow::<HostModuleLoader>()
        .ok_or_else(|| anyhow!("Cannot find module '{}'", specifier))?;
    loader.load(&specifier, &referrer)
}

// ============================================================================
// Extension Definition
// ============================================================================

deno_core::extension!(
    playground_runtime,
    ops = [
        op_console_log,
        op_console_warn,
        op_console_error,
        op_host_module,
    ],
    esm_entry_point = "ext:playground_runtime/bootstrap.js",
    esm = ["ext:playground_runtime/bootstrap.js" = "src/bootstrap.js"],
);
