//! REST API response types.
//!
//! Every body carries a `requestId` so client reports can be matched to
//! server logs.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::dashboard::{DashboardViews, View};
use crate::error::{PipelineError, ServerError};
use crate::models::Table;
use crate::transform::pipeline::{DatasetSummary, JoinedUpload};

pub fn new_request_id() -> String {
    Uuid::new_v4().to_string()
}

/// Body of `GET /api/views`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewsResponse {
    pub request_id: String,
    pub dataset: DatasetSummary,
    pub views: DashboardViews,
}

/// Body of `POST /api/cost-model`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CostModelResponse {
    pub request_id: String,
    pub file_name: String,
    pub rows: usize,
    pub matched: usize,
    pub joined_cost_table: View<Table>,
}

impl From<JoinedUpload> for CostModelResponse {
    fn from(joined: JoinedUpload) -> Self {
        let joined_cost_table = if joined.table.is_empty() {
            View::NoData
        } else {
            View::Data { data: joined.table }
        };
        Self {
            request_id: new_request_id(),
            file_name: joined.file_name,
            rows: joined.rows,
            matched: joined.matched,
            joined_cost_table,
        }
    }
}

/// Error body with optional structured details.
pub fn error_response(error: &str, details: Option<Value>) -> Value {
    json!({
        "requestId": new_request_id(),
        "status": "error",
        "error": error,
        "details": details,
    })
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServerError::Pipeline(e) => match e {
                PipelineError::Schema(_) | PipelineError::Join(_) => {
                    StatusCode::UNPROCESSABLE_ENTITY
                }
                PipelineError::Sheet(_) | PipelineError::Config(_) => StatusCode::BAD_REQUEST,
                PipelineError::Aggregation(_) | PipelineError::Export(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }

    /// Machine-readable detail for schema and join failures.
    fn details(&self) -> Option<Value> {
        match self {
            ServerError::Pipeline(PipelineError::Schema(e)) => serde_json::to_value(e).ok(),
            ServerError::Pipeline(PipelineError::Join(e)) => serde_json::to_value(e).ok(),
            _ => None,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let body = error_response(&self.to_string(), self.details());
        (self.status(), Json(body)).into_response()
    }
}
