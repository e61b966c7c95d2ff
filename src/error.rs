use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;
use tracing::error;

use crate::aggregator::AggregateError;
use crate::projections::ProjectionError;
use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    InvalidDate(#[from] AggregateError),

    #[error("{}", .0.body_text())]
    InvalidBody(#[from] JsonRejection),

    #[error("{}", .0.body_text())]
    InvalidQuery(#[from] QueryRejection),

    #[error("{}", .0.body_text())]
    InvalidPath(#[from] PathRejection),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Not found")]
    NotFound,

    #[error("{0}")]
    Conflict(String),

    #[error("Internal server error")]
    Internal(#[source] StoreError),

    #[error("Internal server error")]
    Task(#[from] tokio::task::JoinError),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) => AppError::NotFound,
            StoreError::UnknownEpisode(_) => AppError::BadRequest(err.to_string()),
            StoreError::AlreadyWatched(_) => {
                AppError::Conflict("Episode already watched. Use PUT to update.".to_string())
            }
            other => AppError::Internal(other),
        }
    }
}

impl From<ProjectionError> for AppError {
    fn from(err: ProjectionError) -> Self {
        match err {
            ProjectionError::Store(inner) => inner.into(),
            span @ ProjectionError::SpanTooLarge { .. } => AppError::BadRequest(span.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::BadRequest(_)
            | AppError::InvalidDate(_)
            | AppError::InvalidBody(_)
            | AppError::InvalidQuery(_)
            | AppError::InvalidPath(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Internal(source) => {
                error!(error = %source, "Request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::Task(source) => {
                error!(error = %source, "Store task failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}
