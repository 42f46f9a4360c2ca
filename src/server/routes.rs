use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::document;
use crate::persist::PersistError;
use crate::server::AppState;

pub const SAVED_MESSAGE: &str = "DAG saved successfully";
pub const ALIVE_MESSAGE: &str = "Monarch DAG Server is alive";

#[derive(Debug, Serialize, Deserialize)]
pub struct SaveResponse {
    pub dag_id: String,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, error: &str, message: impl ToString) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
            message: message.to_string(),
        }),
    )
}

fn persist_error(err: PersistError) -> ApiError {
    let status = match err {
        PersistError::DuplicateId(_) => StatusCode::CONFLICT,
        PersistError::StoreWriteFailed(_)
        | PersistError::ExportWriteFailed { .. }
        | PersistError::ConfigurationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    api_error(status, err.kind(), &err)
}

pub async fn root() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "message": ALIVE_MESSAGE }))
}

pub async fn save_dag(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<SaveResponse>, ApiError> {
    let dag = document::parse(&body).map_err(|e| {
        tracing::warn!("Rejected DAG submission: {}", e);
        api_error(StatusCode::BAD_REQUEST, "parse_error", &e)
    })?;

    if state.strict {
        dag.validate().map_err(|e| {
            tracing::warn!("Rejected DAG '{}': {}", dag.name, e);
            api_error(StatusCode::UNPROCESSABLE_ENTITY, "validation_error", &e)
        })?;
    }

    // Runs on the blocking pool: a dropped request cannot cancel it halfway
    // through the write or the rollback.
    let task_state = state.clone();
    let dag_id = tokio::task::spawn_blocking(move || task_state.persister.persist(&dag))
        .await
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, "internal", e))?
        .map_err(persist_error)?;

    Ok(Json(SaveResponse {
        dag_id,
        message: SAVED_MESSAGE.to_string(),
    }))
}
