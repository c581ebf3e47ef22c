//! HTTP surface of the playground.

use crate::error::PipelineError;
use crate::pipeline::{RenderRequest, RenderResponse};
use crate::worker::RenderService;
use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, State},
    http::{
        header::{CACHE_CONTROL, CONTENT_TYPE, ETAG, IF_NONE_MATCH},
        HeaderMap, HeaderValue, StatusCode,
    },
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{info, warn};

const HEALTH_MESSAGE: &str = "Component playground is running";

#[derive(Clone)]
pub struct AppState {
    pub service: RenderService,
    pub production: bool,
}

pub fn build_router(state: AppState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/render", post(render))
        .route("/components", get(components))
        .route("/health", get(health))
        .route("/styles.css", get(stylesheet))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .with_state(state)
}

/// Bind `addr` and serve until Ctrl-C.
pub async fn serve(addr: SocketAddr, router: Router) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "component playground listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

async fn render(
    State(state): State<AppState>,
    payload: Result<Json<RenderRequest>, JsonRejection>,
) -> Response {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            let error = PipelineError::validation(rejection.body_text());
            warn!(%error, "rejected render request body");
            return (StatusCode::BAD_REQUEST, Json(RenderResponse::failure(&error, false)))
                .into_response();
        }
    };

    let mut response = state.service.render(request).await;
    if state.production {
        response.stack = None;
    }
    let status = if response.success {
        StatusCode::OK
    } else {
        StatusCode::BAD_REQUEST
    };
    (status, Json(response)).into_response()
}

#[derive(Serialize)]
struct ComponentEntry<'a> {
    name: &'a str,
}

#[derive(Serialize)]
struct ComponentsBody<'a> {
    success: bool,
    components: Vec<ComponentEntry<'a>>,
    count: usize,
}

async fn components(State(state): State<AppState>) -> Response {
    let components: Vec<ComponentEntry<'_>> = state
        .service
        .components()
        .iter()
        .map(|name| ComponentEntry { name })
        .collect();
    let body = ComponentsBody {
        success: true,
        count: components.len(),
        components,
    };
    Json(body).into_response()
}

#[derive(Serialize)]
struct HealthBody {
    status: &'static str,
    message: &'static str,
}

async fn health() -> Json<HealthBody> {
    Json(HealthBody {
        status: "OK",
        message: HEALTH_MESSAGE,
    })
}

async fn stylesheet(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let stylesheet = state.service.stylesheet();
    let etag = stylesheet.etag();

    let matches = headers
        .get(IF_NONE_MATCH)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.split(',').any(|tag| tag.trim() == etag || tag.trim() == "*"));

    let mut response = if matches {
        StatusCode::NOT_MODIFIED.into_response()
    } else {
        (
            [(CONTENT_TYPE, HeaderValue::from_static("text/css; charset=utf-8"))],
            stylesheet.as_str().to_owned(),
        )
            .into_response()
    };

    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(etag) {
        headers.insert(ETAG, value);
    }
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    response
}
