//! HTTP read API serving the UI.
//!
//! Read-only: tracked downloads, per-download detail, live transfer
//! progress, the timeline, and an SSE relay of bus events. OpenAPI docs are
//! served under `/swagger-ui`.

use std::net::SocketAddr;

use axum::Router;
use axum::routing::get;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{Error, Result};

pub mod routes;
pub mod state;

pub use state::ApiState;

/// OpenAPI description of the read API
#[derive(OpenApi)]
#[openapi(
    paths(
        routes::list_downloads,
        routes::get_download,
        routes::list_progress,
        routes::get_progress,
        routes::list_events,
        routes::stream_events,
        routes::health,
    ),
    components(schemas(
        routes::TrackedDownloadDto,
        routes::DownloadDetailDto,
        routes::DownloadJobDto,
        routes::DownloadFileDto,
        routes::SyncJobDto,
        routes::SyncFileDto,
        routes::MoveJobDto,
        routes::AppJobDto,
        routes::EventDto,
        routes::ErrorBody,
        crate::progress::DownloadProgress,
        crate::progress::FileProgress,
        crate::types::TrackedState,
        crate::types::DownloadStatus,
        crate::types::FileState,
        crate::types::SyncStatus,
        crate::types::SyncFileStatus,
        crate::types::MoveStatus,
        crate::types::AppJobStatus,
    )),
    info(title = "seedreap", description = "Seedbox sync pipeline read API")
)]
pub struct ApiDoc;

/// Build the API router
pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/v1/downloads", get(routes::list_downloads))
        .route("/api/v1/downloads/:id", get(routes::get_download))
        .route("/api/v1/progress", get(routes::list_progress))
        .route(
            "/api/v1/progress/:downloader/:remote_id",
            get(routes::get_progress),
        )
        .route("/api/v1/events", get(routes::list_events))
        .route("/api/v1/stream", get(routes::stream_events))
        .route("/api/v1/health", get(routes::health))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve the read API until the process exits
pub async fn start_api_server(state: ApiState, bind_addr: SocketAddr) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .map_err(|e| Error::ApiServerError(format!("failed to bind {bind_addr}: {e}")))?;
    tracing::info!(addr = %bind_addr, "API server listening");
    axum::serve(listener, router(state))
        .await
        .map_err(|e| Error::ApiServerError(e.to_string()))
}
