pub mod error;
pub mod events;
pub mod handlers;
pub mod jobs;
pub mod mailer;
pub mod reminders;
pub mod storage;
pub mod templates;
pub mod types;

use axum::{routing::get, Router};
use std::sync::Arc;

use crate::core::urls::ApiUrls;
use crate::shared::state::AppState;

pub use error::NotificationError;
pub use handlers::*;
pub use types::*;

pub fn configure_notification_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            ApiUrls::REMINDER_CONFIG,
            get(handle_get_reminder_config).put(handle_update_reminder_config),
        )
        .route(ApiUrls::REMINDER_LOGS, get(handle_list_reminder_logs))
}
