//! HTTP surface of the daemon.
//!
//! Routes:
//! - `POST /add_person?person_name=..` (multipart field `file`)
//! - `DELETE /delete_person/:name`
//! - `POST /recognize_person?distance_metric=..&threshold=..` (multipart field `file`)
//! - `GET /list_persons`
//! - `GET /status`

use crate::engine::{EngineError, EngineHandle};
use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        rejection::QueryRejection,
        DefaultBodyLimit, Multipart, Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use facereg_core::{
    distance::InvalidMetric, DistanceMetric, EmbedError, EnrollOutcome, RegistryError, StoreError,
};
use serde::{Deserialize, Serialize};

const UPLOAD_FIELD: &str = "file";
const NO_MATCH: &str = "No matching person found";

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RecognizeResponse {
    pub recognized_person: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PersonsResponse {
    pub persons: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub version: String,
    pub model: String,
    pub store_path: String,
    pub store_exists: bool,
    pub records: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub detail: String,
}

#[derive(Debug, Deserialize)]
pub struct AddPersonQuery {
    pub person_name: String,
}

#[derive(Debug, Deserialize)]
pub struct RecognizeQuery {
    pub distance_metric: Option<String>,
    pub threshold: Option<f32>,
}

/// Error returned by handlers, rendered as `{"detail": ...}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    fn bad_request(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            detail: detail.into(),
        }
    }

    fn internal(detail: impl Into<String>) -> Self {
        let detail = detail.into();
        tracing::error!(error = %detail, "request failed");
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            detail,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorResponse { detail: self.detail })).into_response()
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Registry(RegistryError::Store(StoreError::NotFound(_))) => {
                ApiError::bad_request("Database not found")
            }
            EngineError::Registry(
                e @ (RegistryError::InvalidName { .. }
                | RegistryError::InvalidThreshold(_)
                | RegistryError::Embed(EmbedError::NoFaceDetected)),
            ) => ApiError::bad_request(e.to_string()),
            e @ EngineError::Decode(_) => ApiError::bad_request(e.to_string()),
            e => ApiError::internal(e.to_string()),
        }
    }
}

impl From<InvalidMetric> for ApiError {
    fn from(err: InvalidMetric) -> Self {
        ApiError::bad_request(err.to_string())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(err: QueryRejection) -> Self {
        ApiError::bad_request(err.body_text())
    }
}

impl From<MultipartRejection> for ApiError {
    fn from(err: MultipartRejection) -> Self {
        ApiError::bad_request(err.body_text())
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        ApiError::bad_request(format!("invalid multipart body: {err}"))
    }
}

/// Build the router over a running engine.
pub fn router(engine: EngineHandle, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/add_person", post(add_person))
        .route("/delete_person/:person_name", delete(delete_person))
        .route("/recognize_person", post(recognize_person))
        .route("/recognize_person/", post(recognize_person))
        .route("/list_persons", get(list_persons))
        .route("/list_persons/", get(list_persons))
        .route("/status", get(status))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(engine)
}

async fn add_person(
    State(engine): State<EngineHandle>,
    query: Result<Query<AddPersonQuery>, QueryRejection>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let Query(query) = query?;
    let image = read_upload(multipart?).await?;
    let name = query.person_name;
    tracing::info!(name = %name, bytes = image.len(), "add_person");

    let message = match engine.enroll(name.clone(), image).await? {
        EnrollOutcome::Added => format!("Person {name} added to the database"),
        EnrollOutcome::Duplicate { .. } => {
            "This person was added before to the database".to_string()
        }
    };
    Ok(Json(MessageResponse { message }))
}

async fn delete_person(
    State(engine): State<EngineHandle>,
    Path(person_name): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    tracing::info!(name = %person_name, "delete_person");
    if engine.delete(person_name.clone()).await? {
        Ok(Json(MessageResponse {
            message: format!("Person {person_name} deleted from the database"),
        }))
    } else {
        Err(ApiError::bad_request(format!(
            "Person {person_name} not found in the database"
        )))
    }
}

async fn recognize_person(
    State(engine): State<EngineHandle>,
    query: Result<Query<RecognizeQuery>, QueryRejection>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<RecognizeResponse>, ApiError> {
    let Query(query) = query?;
    let metric = match query.distance_metric.as_deref() {
        Some(m) => m.parse::<DistanceMetric>()?,
        None => DistanceMetric::default(),
    };
    let image = read_upload(multipart?).await?;
    tracing::info!(%metric, threshold = query.threshold, bytes = image.len(), "recognize_person");

    let recognized = engine.recognize(image, metric, query.threshold).await?;
    Ok(Json(RecognizeResponse {
        recognized_person: recognized.map_or_else(|| NO_MATCH.to_string(), |m| m.name),
    }))
}

async fn list_persons(
    State(engine): State<EngineHandle>,
) -> Result<Json<PersonsResponse>, ApiError> {
    let persons = engine.list().await?;
    Ok(Json(PersonsResponse { persons }))
}

async fn status(State(engine): State<EngineHandle>) -> Result<Json<StatusResponse>, ApiError> {
    let s = engine.status().await?;
    Ok(Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        model: s.model.to_string(),
        store_path: s.store_path.display().to_string(),
        store_exists: s.store_exists,
        records: s.records,
    }))
}

/// Bytes of the `file` field of a multipart upload.
async fn read_upload(mut multipart: Multipart) -> Result<Vec<u8>, ApiError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some(UPLOAD_FIELD) {
            return Ok(field.bytes().await?.to_vec());
        }
    }
    Err(ApiError::bad_request(format!(
        "missing multipart field {UPLOAD_FIELD:?}"
    )))
}
