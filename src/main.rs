//! Component Playground CLI
//!
//! Server mode (default):
//!   component-playground serve [--server-port 3001] [--registry-dir registry]
//!
//! Single-shot mode:
//!   component-playground render <FILE> [--props '{"title":"Hi"}']
//!
//!   Prints the assembled document to stdout. On failure the error goes to
//!   stderr and the process exits with status 1.

use std::process;

use anyhow::{anyhow, Context, Result};
use component_playground::{
    config::{self, Command, RenderArgs, Settings},
    server::{self, AppState},
    telemetry, Pipeline, RenderRequest, RenderService,
};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        if tracing::dispatcher::has_been_set() {
            error!(error = %format!("{err:#}"), "component playground failed");
        } else {
            eprintln!("error: {err:#}");
        }
        process::exit(1);
    }
}

async fn run() -> Result<()> {
    let (cli_args, settings) =
        config::load_with_cli().context("failed to load configuration")?;

    telemetry::init(&settings.logging)?;

    let command = cli_args
        .command
        .unwrap_or(Command::Serve(Box::<config::ServeArgs>::default()));

    match command {
        Command::Serve(_) => run_serve(settings).await,
        Command::Render(args) => run_render(settings, args),
    }
}

async fn run_serve(settings: Settings) -> Result<()> {
    let sandbox = settings.sandbox_config();
    let queue_depth = settings.sandbox.queue_depth;

    // Bootstrapping V8 and the registry blocks; keep it off the async workers.
    let service = tokio::task::spawn_blocking(move || RenderService::spawn(sandbox, queue_depth))
        .await
        .context("render worker bootstrap panicked")??;

    info!(
        components = service.components().len(),
        production = settings.server.production,
        "render worker started"
    );

    let state = AppState {
        service,
        production: settings.server.production,
    };
    let router = server::build_router(state, settings.server.max_body_bytes);
    server::serve(settings.server.addr, router)
        .await
        .context("http server failed")
}

/// Render one file with a pipeline on the current thread.
fn run_render(settings: Settings, args: RenderArgs) -> Result<()> {
    let code = std::fs::read_to_string(&args.file)
        .with_context(|| format!("failed to read {}", args.file.display()))?;
    let props: serde_json::Value = match args.props.as_deref() {
        Some(json) => serde_json::from_str(json).map_err(|e| anyhow!("Invalid props JSON: {}", e))?,
        None => serde_json::json!({}),
    };

    let mut pipeline = Pipeline::bootstrap(&settings.sandbox_config())?;
    let response = pipeline.handle(RenderRequest::new(code, props));

    match (response.success, response.html) {
        (true, Some(html)) => {
            print!("{html}");
            Ok(())
        }
        _ => {
            let message = response.error.unwrap_or_else(|| String::from("render failed"));
            match response.stack {
                Some(stack) => Err(anyhow!("{message}\n{stack}")),
                None => Err(anyhow!(message)),
            }
        }
    }
}
