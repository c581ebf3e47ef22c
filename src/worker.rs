//! The render worker: one thread that owns the runtime and serves requests
//! from a bounded queue, one at a time.

use crate::document::Stylesheet;
use crate::error::StartupError;
use crate::pipeline::{Pipeline, RenderRequest, RenderResponse};
use crate::runtime::SandboxConfig;
use std::sync::{mpsc as std_mpsc, Arc};
use std::thread;
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info, info_span, Span};
use uuid::Uuid;

struct Job {
    request: RenderRequest,
    reply: oneshot::Sender<RenderResponse>,
    span: Span,
}

/// What the worker reports once the registry is loaded.
struct Ready {
    components: Arc<[String]>,
    stylesheet: Stylesheet,
}

/// Cloneable handle to the render worker.
#[derive(Clone)]
pub struct RenderService {
    jobs: mpsc::Sender<Job>,
    components: Arc<[String]>,
    stylesheet: Stylesheet,
}

impl RenderService {
    /// Start the worker and wait until the registry is loaded.
    ///
    /// Blocks the calling thread during bootstrap.
    pub fn spawn(config: SandboxConfig, queue_depth: usize) -> Result<Self, StartupError> {
        let (jobs, queue) = mpsc::channel::<Job>(queue_depth.max(1));
        let (ready_tx, ready_rx) = std_mpsc::channel::<Result<Ready, StartupError>>();

        thread::Builder::new()
            .name(String::from("render-worker"))
            .spawn(move || worker_main(config, queue, ready_tx))?;

        let ready = ready_rx.recv().map_err(|_| StartupError::WorkerExited)??;
        Ok(Self {
            jobs,
            components: ready.components,
            stylesheet: ready.stylesheet,
        })
    }

    /// Queue a request and wait for its response.
    pub async fn render(&self, request: RenderRequest) -> RenderResponse {
        let request_id = Uuid::new_v4();
        let span = info_span!("render", %request_id);
        let (reply, response) = oneshot::channel();

        let job = Job {
            request,
            reply,
            span,
        };
        if self.jobs.send(job).await.is_err() {
            error!(%request_id, "render worker is gone");
            return RenderResponse::unavailable();
        }

        response.await.unwrap_or_else(|_| {
            error!(%request_id, "render worker dropped the request");
            RenderResponse::unavailable()
        })
    }

    /// Registry component names, in registry order.
    pub fn components(&self) -> &[String] {
        &self.components
    }

    pub fn stylesheet(&self) -> &Stylesheet {
        &self.stylesheet
    }
}

fn worker_main(
    config: SandboxConfig,
    mut queue: mpsc::Receiver<Job>,
    ready: std_mpsc::Sender<Result<Ready, StartupError>>,
) {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            let _ = ready.send(Err(StartupError::Io(err)));
            return;
        }
    };

    runtime.block_on(async move {
        let mut pipeline = match Pipeline::bootstrap(&config) {
            Ok(pipeline) => pipeline,
            Err(err) => {
                let _ = ready.send(Err(err));
                return;
            }
        };

        let announced = ready.send(Ok(Ready {
            components: pipeline.registry().names().into(),
            stylesheet: pipeline.stylesheet().clone(),
        }));
        if announced.is_err() {
            return;
        }
        info!("render worker ready");

        while let Some(job) = queue.recv().await {
            let response = job.span.in_scope(|| pipeline.handle(job.request));
            // The caller may have gone away; nothing to do then.
            let _ = job.reply.send(response);
        }

        info!("render queue closed, worker stopping");
    });
}
