//! HTTP routes and handlers

use axum::{
    body::Bytes,
    extract::{
        rejection::{PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};
use uuid::Uuid;

use triage_core::{Confidence, Error, InferenceFault, TriageLevel, TriageRecord};

use crate::state::AppState;

/// Decimal places for probabilities in `/insert` responses
const PROBABILITY_PLACES: i32 = 3;

pub fn create_router(state: AppState, request_timeout: Duration) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .route("/insert", post(insert))
        .route("/summary", get(summary))
        .route("/records", get(list_records))
        .route("/records/:id", get(get_record))
        .fallback(fallback)
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "model": state.service.model_name(),
        "fields": state.service.schema().len(),
    }))
}

async fn metrics(State(state): State<AppState>) -> Response {
    match &state.metrics_handle {
        Some(handle) => handle.render().into_response(),
        None => (StatusCode::NOT_FOUND, "metrics exporter not installed").into_response(),
    }
}

#[derive(Debug, Serialize)]
struct InsertResponse {
    id: i64,
    prediction: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    probability: Option<Confidence>,
    record: TriageRecord,
}

/// Submit one patient record for classification and storage
async fn insert(State(state): State<AppState>, body: Bytes) -> Result<Response, AppError> {
    let request_id = Uuid::new_v4().to_string();
    debug!(%request_id, bytes = body.len(), "insert request");

    let payload: Value = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let record = state.service.submit(&payload).await?;
    info!(%request_id, id = record.id, level = %record.triage_level, "insert complete");

    let body = InsertResponse {
        id: record.id,
        prediction: record.triage_level.as_u8(),
        probability: record.confidence.map(|c| c.rounded(PROBABILITY_PLACES)),
        record,
    };

    let mut response = Json(body).into_response();
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert("x-request-id", value);
    }
    Ok(response)
}

#[derive(Debug, Serialize)]
struct SummaryResponse {
    total_records: u64,
    triage_level_0_count: u64,
    triage_level_1_count: u64,
    records: Vec<TriageRecord>,
}

async fn summary(State(state): State<AppState>) -> Result<Json<SummaryResponse>, AppError> {
    let snapshot = state.service.summarize().await?;
    Ok(Json(SummaryResponse {
        total_records: snapshot.total,
        triage_level_0_count: snapshot.count(TriageLevel::NotUrgent),
        triage_level_1_count: snapshot.count(TriageLevel::Urgent),
        records: snapshot.records,
    }))
}

#[derive(Debug, Deserialize)]
struct ListParams {
    #[serde(default)]
    limit: Option<usize>,
}

async fn list_records(
    State(state): State<AppState>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> Result<Json<Vec<TriageRecord>>, AppError> {
    let Query(params) = params?;
    Ok(Json(state.service.list_recent(params.limit).await?))
}

async fn get_record(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<TriageRecord>, AppError> {
    let Path(id) = id?;
    state
        .service
        .fetch(id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("record {id} not found")))
}

async fn fallback() -> AppError {
    AppError::NotFound("route not found".to_string())
}

/// Error handling
#[derive(Debug)]
pub enum AppError {
    /// Unparseable body, query string or path parameter
    BadRequest(String),
    NotFound(String),
    Triage(Error),
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        AppError::Triage(err)
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Triage(err) => match err {
                Error::Validation(_) => StatusCode::BAD_REQUEST,
                Error::Inference {
                    fault: InferenceFault::Rejected,
                    ..
                } => StatusCode::UNPROCESSABLE_ENTITY,
                Error::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                Error::Inference { .. }
                | Error::ModelLoad(_)
                | Error::ConstraintViolation(_)
                | Error::Config(_)
                | Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            AppError::BadRequest(msg) => json!({
                "error": { "type": "invalid_request_error", "message": msg }
            }),
            AppError::NotFound(msg) => json!({
                "error": { "type": "not_found", "message": msg }
            }),
            AppError::Triage(Error::Validation(validation)) => json!({
                "error": {
                    "type": "validation_error",
                    "message": validation.to_string(),
                    "fields": validation.fields(),
                }
            }),
            AppError::Triage(err) if status.is_server_error() => json!({
                // Internal detail stays in the logs.
                "error": { "type": err.code(), "message": server_message(status) }
            }),
            AppError::Triage(err) => json!({
                "error": { "type": err.code(), "message": err.to_string() }
            }),
        };

        (status, Json(body)).into_response()
    }
}

fn server_message(status: StatusCode) -> &'static str {
    if status == StatusCode::SERVICE_UNAVAILABLE {
        "record store unavailable, retry later"
    } else {
        "internal server error"
    }
}
