use axum::{response::IntoResponse, Json};
use diesel::result::{DatabaseErrorKind, Error as DieselError};

use super::mailer::MailError;

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Delivery failed: {0}")]
    Delivery(String),
    #[error("Database error: {0}")]
    Database(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<DieselError> for NotificationError {
    fn from(err: DieselError) -> Self {
        match err {
            DieselError::NotFound => Self::NotFound("Record not found".to_string()),
            DieselError::DatabaseError(
                DatabaseErrorKind::ForeignKeyViolation | DatabaseErrorKind::CheckViolation,
                info,
            ) => Self::Validation(info.message().to_string()),
            other => Self::Database(other.to_string()),
        }
    }
}

impl From<MailError> for NotificationError {
    fn from(err: MailError) -> Self {
        Self::Delivery(err.to_string())
    }
}

impl From<crate::shared::utils::DbTaskError> for NotificationError {
    fn from(err: crate::shared::utils::DbTaskError) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<diesel::r2d2::PoolError> for NotificationError {
    fn from(err: diesel::r2d2::PoolError) -> Self {
        Self::Database(format!("Connection pool error: {err}"))
    }
}

impl IntoResponse for NotificationError {
    fn into_response(self) -> axum::response::Response {
        use axum::http::StatusCode;
        let (status, message) = match &self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            Self::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            Self::Delivery(msg) => (StatusCode::BAD_GATEWAY, msg.clone()),
            Self::Database(msg) | Self::Internal(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, msg.clone())
            }
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}
