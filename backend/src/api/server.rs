//! HTTP server for the ODVT dashboard.
//!
//! Serves views computed over the shared, read-only [`Dataset`] snapshot.
//!
//! # API Endpoints
//!
//! | Method | Path               | Description                               |
//! |--------|--------------------|-------------------------------------------|
//! | GET    | `/health`          | Health check                              |
//! | GET    | `/api/views`       | All dashboard views for the query filters |
//! | GET    | `/api/filters`     | Values offered by the filter controls     |
//! | GET    | `/api/report`      | Views as an xlsx download                 |
//! | GET    | `/api/schemas`     | Built-in schema catalogs                  |
//! | POST   | `/api/cost-model`  | Join an uploaded cost file (field `file`) |
//! | GET    | `/api/logs`        | SSE stream of pipeline logs               |

use axum::{
    extract::{Multipart, Query, State},
    http::{header, Method},
    response::{sse::Event, IntoResponse, Json, Response, Sse},
    routing::{get, post},
    Router,
};
use futures::stream::Stream;
use serde_json::{json, Value};
use std::{convert::Infallible, net::SocketAddr, sync::Arc, time::Duration};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;
use tower_http::cors::CorsLayer;

use super::logs::{log_info, LOG_BROADCASTER};
use super::types::{new_request_id, CostModelResponse, ViewsResponse};
use crate::config::{DashboardFilters, DashboardOptions};
use crate::dashboard::{DashboardViews, FilterChoices};
use crate::error::{PipelineError, ServerError, ServerResult};
use crate::export::Report;
use crate::schema::{cost_model_catalog, trip_catalog};
use crate::transform::pipeline::{join_upload, Dataset};

const XLSX_CONTENT_TYPE: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// Shared, immutable server state.
#[derive(Clone)]
pub struct AppState {
    pub dataset: Arc<Dataset>,
    pub options: Arc<DashboardOptions>,
}

impl AppState {
    pub fn new(dataset: Arc<Dataset>, options: DashboardOptions) -> Self {
        Self {
            dataset,
            options: Arc::new(options),
        }
    }
}

/// Routes with permissive CORS.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers([header::CONTENT_TYPE, header::CONTENT_DISPOSITION]);

    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/api/views", get(views))
        .route("/api/filters", get(filters))
        .route("/api/report", get(report))
        .route("/api/schemas", get(schemas))
        .route("/api/cost-model", post(upload_cost_model))
        .route("/api/logs", get(sse_logs))
        .layer(cors)
        .with_state(state)
}

/// Serve `dataset` on `options.port` until the process stops.
pub async fn start_server(dataset: Arc<Dataset>, options: DashboardOptions) -> ServerResult<()> {
    let port = options.port;
    let app = router(AppState::new(dataset, options));

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ServerError::Internal(format!("cannot bind {addr}: {e}")))?;

    log_info(format!("🚀 ODVT server running on http://localhost:{port}"));
    log_info("   GET  /api/views       - Dashboard views");
    log_info("   POST /api/cost-model  - Join an uploaded cost file");
    log_info("   GET  /api/logs        - SSE log stream");

    axum::serve(listener, app)
        .await
        .map_err(|e| ServerError::Internal(e.to_string()))
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "odvt",
        "version": env!("CARGO_PKG_VERSION"),
        "requestId": new_request_id(),
        "dataset": state.dataset.summary(),
    }))
}

async fn views(
    State(state): State<AppState>,
    Query(filters): Query<DashboardFilters>,
) -> ServerResult<Json<ViewsResponse>> {
    let views = DashboardViews::compute(&state.dataset, &filters, &state.options)
        .map_err(PipelineError::from)?;
    Ok(Json(ViewsResponse {
        request_id: new_request_id(),
        dataset: state.dataset.summary(),
        views,
    }))
}

async fn filters(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "requestId": new_request_id(),
        "choices": FilterChoices::from_dataset(&state.dataset),
    }))
}

async fn report(
    State(state): State<AppState>,
    Query(filters): Query<DashboardFilters>,
) -> ServerResult<Response> {
    let views = DashboardViews::compute(&state.dataset, &filters, &state.options)
        .map_err(PipelineError::from)?;
    let summary = state.dataset.summary();
    let bytes = Report {
        summary: &summary,
        views: &views,
        joined: None,
    }
    .to_bytes()
    .map_err(PipelineError::from)?;

    Ok((
        [
            (header::CONTENT_TYPE, XLSX_CONTENT_TYPE),
            (header::CONTENT_DISPOSITION, "attachment; filename=\"odvt-report.xlsx\""),
        ],
        bytes,
    )
        .into_response())
}

async fn schemas() -> Json<Value> {
    Json(json!({
        "requestId": new_request_id(),
        "catalogs": [trip_catalog(), cost_model_catalog()],
    }))
}

/// SSE endpoint for real-time log streaming
async fn sse_logs() -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = BroadcastStream::new(LOG_BROADCASTER.subscribe()).filter_map(|result| {
        // lagged receivers skip the entries they missed
        let entry = result.ok()?;
        let json = serde_json::to_string(&entry).ok()?;
        Some(Ok(Event::default().data(json)))
    });

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

async fn upload_cost_model(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ServerResult<Json<CostModelResponse>> {
    let mut upload: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServerError::BadRequest(format!("Multipart error: {e}")))?
    {
        if field.name() == Some("file") {
            let file_name = field.file_name().unwrap_or("upload.csv").to_string();
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ServerError::BadRequest(format!("Read error: {e}")))?;
            upload = Some((file_name, bytes.to_vec()));
        }
    }

    let (file_name, bytes) =
        upload.ok_or_else(|| ServerError::BadRequest("No file provided".into()))?;
    log_info(format!("📄 New upload: {file_name} ({} bytes)", bytes.len()));

    let dataset = Arc::clone(&state.dataset);
    let joined = tokio::task::spawn_blocking(move || join_upload(&bytes, &file_name, &dataset))
        .await
        .map_err(|e| ServerError::Internal(e.to_string()))??;

    Ok(Json(CostModelResponse::from(joined)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::pipeline::tests::sample_dataset;
    use axum::http::StatusCode;

    fn state() -> AppState {
        AppState::new(Arc::new(sample_dataset()), DashboardOptions::default())
    }

    #[tokio::test]
    async fn test_health_reports_dataset() {
        let Json(body) = health(State(state())).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["dataset"]["trips"]["version"], "trips-v3-minimal");
    }

    #[tokio::test]
    async fn test_views_endpoint() {
        let Json(body) = views(State(state()), Query(DashboardFilters::default()))
            .await
            .unwrap();
        assert_eq!(body.views.trip_count, 3);
        assert_eq!(body.request_id.len(), 36);
    }

    #[tokio::test]
    async fn test_views_rejects_inverted_rating_range() {
        let filters = DashboardFilters {
            rating_low: 5,
            rating_high: 1,
            ..DashboardFilters::default()
        };
        let err = views(State(state()), Query(filters)).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_report_is_xlsx() {
        let response = report(State(state()), Query(DashboardFilters::default()))
            .await
            .unwrap();
        assert_eq!(response.headers()[header::CONTENT_TYPE], XLSX_CONTENT_TYPE);
    }

    #[test]
    fn test_router_builds() {
        let _ = router(state());
    }
}
