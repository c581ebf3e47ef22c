//! Playground runtime - the V8 isolate every render executes in.
//!
//! Provides only what component code needs:
//! - the rendering library (`React`, `react/jsx-runtime`)
//! - console.log/info/debug/warn/error (captured, not printed)
//! - CommonJS `require` restricted to the registry artifact directory
//! - No fs, net or env access beyond that directory

use crate::loader::HostModuleLoader;
use crate::ops::{playground_runtime, ConsoleOutput};
use anyhow::{anyhow, Error};
use deno_core::error::JsError;
use deno_core::{v8, JsRuntime, RuntimeOptions};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::warn;

/// Global installed by `bootstrap.js`.
const BOOTSTRAP_NAMESPACE: &str = "__playground__";

const MB: usize = 1024 * 1024;

/// Configuration for the render sandbox
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    /// Registry artifact directory (the only directory `require` can read)
    pub registry_dir: PathBuf,
    /// Entry module of the registry, relative to `registry_dir`
    pub registry_entry: String,
    /// Stylesheet file, relative to `registry_dir`
    pub stylesheet: String,
    /// Reserved `require` name that returns the component registry
    pub registry_module: String,
    /// Top-level identifier the submitted source must define
    pub component_identifier: String,
    /// Maximum heap size in bytes (None = unlimited)
    pub max_heap_size: Option<usize>,
    /// Maximum time for evaluation plus rendering (None = unlimited)
    pub render_timeout: Option<Duration>,
    /// Include JavaScript stack traces in failure responses
    pub include_stack: bool,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            registry_dir: PathBuf::from("./registry"),
            registry_entry: String::from("index.js"),
            stylesheet: String::from("styles.css"),
            registry_module: String::from("components"),
            component_identifier: String::from("App"),
            max_heap_size: Some(64 * MB),
            render_timeout: None,
            include_stack: true,
        }
    }
}

/// Create the JS runtime that hosts the registry and every render.
pub fn create_runtime(config: &SandboxConfig, loader: HostModuleLoader) -> Result<JsRuntime, Error> {
    // Configure V8 heap limits if specified
    let create_params = config
        .max_heap_size
        .map(|max_bytes| v8::Isolate::create_params().heap_limits(0, max_bytes));

    let mut runtime = JsRuntime::new(RuntimeOptions {
        extensions: vec![playground_runtime::init_ops_and_esm()],
        create_params,
        ..Default::default()
    });

    let heap_guard = config.max_heap_size.map(|_| HeapGuard::default());
    if let Some(guard) = &heap_guard {
        install_heap_callback(&mut runtime, Arc::clone(&guard.tripped_at));
    }

    {
        let op_state = runtime.op_state();
        let mut state = op_state.borrow_mut();
        state.put(ConsoleOutput::default());
        state.put(loader);
        if let Some(guard) = heap_guard {
            state.put(guard);
        }
    }

    Ok(runtime)
}

/// Set by the near-heap-limit callback to the initial limit it raised.
#[derive(Clone, Default)]
struct HeapGuard {
    tripped_at: Arc<AtomicUsize>,
}

fn install_heap_callback(runtime: &mut JsRuntime, tripped_at: Arc<AtomicUsize>) {
    // Terminate the offending script and grow the limit so V8 can unwind
    // instead of aborting the process.
    let isolate = runtime.v8_isolate().thread_safe_handle();
    runtime.add_near_heap_limit_callback(move |current, initial| {
        warn!(
            current_mb = current / MB,
            initial_mb = initial / MB,
            "sandbox near heap limit, terminating execution"
        );
        tripped_at.store(initial, Ordering::SeqCst);
        isolate.terminate_execution();
        current * 2
    });
}

/// Put the heap limit back after the near-limit callback raised it.
///
/// Returns whether the limit was reached since the last call.
pub(crate) fn restore_heap_limit(runtime: &mut JsRuntime) -> bool {
    let guard = {
        let op_state = runtime.op_state();
        let state = op_state.borrow();
        state.try_borrow::<HeapGuard>().cloned()
    };
    let Some(guard) = guard else {
        return false;
    };
    let initial = guard.tripped_at.swap(0, Ordering::SeqCst);
    if initial == 0 {
        return false;
    }

    runtime.v8_isolate().low_memory_notification();
    runtime.remove_near_heap_limit_callback(initial);
    install_heap_callback(runtime, guard.tripped_at);
    true
}

/// Take the console output captured since the last call.
pub fn drain_console(runtime: &mut JsRuntime) -> ConsoleOutput {
    let op_state = runtime.op_state();
    let mut state = op_state.borrow_mut();
    let output = state
        .try_borrow_mut::<ConsoleOutput>()
        .map(std::mem::take)
        .unwrap_or_default();
    output
}

/// Look up a member of the bootstrap namespace.
pub(crate) fn bootstrap_value<'s>(
    scope: &mut v8::HandleScope<'s>,
    name: &str,
) -> Result<v8::Local<'s, v8::Value>, Error> {
    let context = scope.get_current_context();
    let global = context.global(scope);
    let namespace_key = v8::String::new(scope, BOOTSTRAP_NAMESPACE)
        .ok_or_else(|| anyhow!("failed to allocate namespace key"))?;
    let namespace = global
        .get(scope, namespace_key.into())
        .and_then(|value| v8::Local::<v8::Object>::try_from(value).ok())
        .ok_or_else(|| anyhow!("runtime bootstrap is not installed"))?;
    let key = v8::String::new(scope, name).ok_or_else(|| anyhow!("failed to allocate key"))?;
    namespace
        .get(scope, key.into())
        .ok_or_else(|| anyhow!("bootstrap member `{}` is missing", name))
}

/// Look up a function of the bootstrap namespace.
pub(crate) fn bootstrap_fn<'s>(
    scope: &mut v8::HandleScope<'s>,
    name: &str,
) -> Result<v8::Local<'s, v8::Function>, Error> {
    let value = bootstrap_value(scope, name)?;
    v8::Local::<v8::Function>::try_from(value)
        .map_err(|_| anyhow!("bootstrap member `{}` is not a function", name))
}

/// Message and stack of a JavaScript exception.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct JsFailure {
    pub message: String,
    pub stack: Option<String>,
}

/// Describe the exception caught by `tc`.
pub(crate) fn caught_failure(tc: &mut v8::TryCatch<v8::HandleScope>) -> JsFailure {
    if tc.has_terminated() {
        return JsFailure {
            message: String::from("execution terminated"),
            stack: None,
        };
    }

    let Some(exception) = tc.exception() else {
        return JsFailure {
            message: String::from("unknown JavaScript failure"),
            stack: None,
        };
    };

    let error = JsError::from_v8_exception(tc, exception);
    let message = match (error.name.as_deref(), error.message.as_deref()) {
        (Some(name), Some(message)) if !name.is_empty() => format!("{}: {}", name, message),
        (_, Some(message)) => message.to_string(),
        _ => error
            .exception_message
            .trim_start_matches("Uncaught ")
            .to_string(),
    };

    JsFailure {
        message,
        stack: error.stack,
    }
}

/// Watchdog that terminates the isolate when a render runs too long.
pub(crate) struct Deadline {
    cancel: Option<mpsc::Sender<()>>,
    fired: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl Deadline {
    pub fn arm(runtime: &mut JsRuntime, timeout: Duration) -> Self {
        let isolate = runtime.v8_isolate().thread_safe_handle();
        let (cancel, cancelled) = mpsc::channel::<()>();
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);

        let thread = thread::Builder::new()
            .name(String::from("render-deadline"))
            .spawn(move || {
                if let Err(RecvTimeoutError::Timeout) = cancelled.recv_timeout(timeout) {
                    flag.store(true, Ordering::SeqCst);
                    isolate.terminate_execution();
                }
            });

        let thread = match thread {
            Ok(handle) => Some(handle),
            Err(error) => {
                warn!(%error, "failed to start render deadline, continuing without it");
                None
            }
        };

        Self {
            cancel: Some(cancel),
            fired,
            thread,
        }
    }

    /// Stop the watchdog; returns whether it fired.
    pub fn disarm(mut self) -> bool {
        drop(self.cancel.take());
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
        self.fired.load(Ordering::SeqCst)
    }
}
