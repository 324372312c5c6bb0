use axum::{response::IntoResponse, Json};
use diesel::result::{DatabaseErrorKind, Error as DieselError};

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),
    #[error("Report generation failed: {0}")]
    Generation(String),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Database error: {0}")]
    Database(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<DieselError> for ReportError {
    fn from(err: DieselError) -> Self {
        match err {
            DieselError::NotFound => Self::NotFound("Record not found".to_string()),
            DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
                Self::Conflict(info.message().to_string())
            }
            DieselError::DatabaseError(DatabaseErrorKind::ForeignKeyViolation, info) => {
                Self::Validation(info.message().to_string())
            }
            other => Self::Database(other.to_string()),
        }
    }
}

impl From<crate::catalogs::CatalogError> for ReportError {
    fn from(err: crate::catalogs::CatalogError) -> Self {
        use crate::catalogs::CatalogError;
        match err {
            CatalogError::NotFound(msg) => Self::NotFound(msg),
            CatalogError::Validation(msg) => Self::Validation(msg),
            CatalogError::Database(msg) => Self::Database(msg),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<std::io::Error> for ReportError {
    fn from(err: std::io::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<crate::shared::utils::DbTaskError> for ReportError {
    fn from(err: crate::shared::utils::DbTaskError) -> Self {
        Self::Database(err.to_string())
    }
}

impl IntoResponse for ReportError {
    fn into_response(self) -> axum::response::Response {
        use axum::http::StatusCode;
        let (status, message) = match &self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            Self::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            Self::Conflict(msg) | Self::InvalidTransition(msg) => {
                (StatusCode::CONFLICT, msg.clone())
            }
            Self::Generation(msg)
            | Self::Storage(msg)
            | Self::Database(msg)
            | Self::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}
