use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    UpstreamTransient,
    UpstreamPermanent,
    Store,
    Timeout,
    Cancelled,
    Internal,
}

impl ErrorKind {
    pub fn status(self) -> StatusCode {
        match self {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Timeout | ErrorKind::Cancelled => StatusCode::REQUEST_TIMEOUT,
            // Only a definitive upstream rejection surfaces as 502; a
            // transient failure that exhausted its retry budget is ours.
            ErrorKind::UpstreamPermanent => StatusCode::BAD_GATEWAY,
            ErrorKind::UpstreamTransient | ErrorKind::Store | ErrorKind::Internal => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

#[derive(Debug)]
pub struct AppError {
    pub kind: ErrorKind,
    pub message: String,
}

impl AppError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.kind.status();
        let body = if status.is_server_error() {
            let request_id = Uuid::new_v4().to_string();
            tracing::error!(error = %self.message, kind = ?self.kind, %request_id, "request failed");
            json!({ "error": self.message, "request_id": request_id })
        } else {
            if self.kind != ErrorKind::Cancelled {
                tracing::info!(error = %self.message, kind = ?self.kind, "request rejected");
            }
            json!({ "error": self.message })
        };
        (status, Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        map_db_error(err)
    }
}

pub fn map_db_error(err: sqlx::Error) -> AppError {
    match &err {
        sqlx::Error::RowNotFound => AppError::not_found("Resource not found"),
        sqlx::Error::Database(db) => {
            tracing::error!(error = %err, code = ?db.code(), "database error");
            match db.code().as_deref() {
                // unique_violation / foreign_key_violation / not_null_violation
                Some("23505") | Some("23503") | Some("23502") => {
                    AppError::validation("Invalid request")
                }
                _ => AppError::new(ErrorKind::Store, "Database error"),
            }
        }
        _ => {
            tracing::error!(error = %err, "database error");
            AppError::new(ErrorKind::Store, "Database error")
        }
    }
}

impl From<crate::clients::UpstreamError> for AppError {
    fn from(err: crate::clients::UpstreamError) -> Self {
        use crate::clients::UpstreamError;
        match err {
            UpstreamError::Transient(message) => AppError::new(ErrorKind::UpstreamTransient, message),
            UpstreamError::Permanent(message) => AppError::new(ErrorKind::UpstreamPermanent, message),
            UpstreamError::Decode(message) => AppError::new(ErrorKind::UpstreamPermanent, message),
            UpstreamError::Cancelled => AppError::new(ErrorKind::Cancelled, "request cancelled"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy_maps_to_expected_status_codes() {
        assert_eq!(ErrorKind::Validation.status(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorKind::NotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(ErrorKind::Timeout.status(), StatusCode::REQUEST_TIMEOUT);
        assert_eq!(ErrorKind::UpstreamPermanent.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(
            ErrorKind::UpstreamTransient.status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(ErrorKind::Store.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
