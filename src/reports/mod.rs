pub mod analytics;
pub mod data;
pub mod documents;
pub mod error;
pub mod handlers;
pub mod pdf;
pub mod render;
pub mod storage;
pub mod types;
pub mod worker;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::core::urls::ApiUrls;
use crate::shared::state::AppState;

pub use error::ReportError;
pub use handlers::*;
pub use types::*;

pub fn configure_report_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            ApiUrls::REPORTS,
            get(handle_list_reports).post(handle_create_report),
        )
        .route(ApiUrls::REPORT_BY_ID, get(handle_get_report))
        .route(ApiUrls::REPORT_DOWNLOAD, get(handle_download_report))
        .route(ApiUrls::REPORT_RETRY, post(handle_retry_report))
}
