pub mod analytics;
pub mod error;
pub mod handlers;
pub mod matrix;
pub mod scoring;
pub mod storage;
pub mod treatment;
pub mod types;

use axum::{
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;

use crate::core::urls::ApiUrls;
use crate::shared::state::AppState;

pub use error::RiskError;
pub use handlers::*;
pub use types::*;

pub fn configure_risk_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            ApiUrls::RISK_MATRICES,
            get(handle_list_matrices).post(handle_create_matrix),
        )
        .route(ApiUrls::RISK_MATRIX_CALCULATE, get(handle_calculate_risk))
        .route(
            ApiUrls::RISK_MATRIX_BY_ID,
            get(handle_get_matrix)
                .put(handle_update_matrix)
                .delete(handle_delete_matrix),
        )
        .route(ApiUrls::RISK_MATRIX_DEFAULT, post(handle_set_default_matrix))
        .route(ApiUrls::RISKS, get(handle_list_risks).post(handle_create_risk))
        .route(ApiUrls::RISK_SUMMARY, get(handle_risk_summary))
        .route(ApiUrls::RISK_HEATMAP, get(handle_risk_heatmap))
        .route(
            ApiUrls::RISK_BY_ID,
            get(handle_get_risk)
                .put(handle_update_risk)
                .delete(handle_delete_risk),
        )
        .route(ApiUrls::RISK_CONTROLS, put(handle_replace_risk_controls))
        .route(
            ApiUrls::RISK_ACTIONS,
            get(handle_list_actions).post(handle_create_action),
        )
        .route(ApiUrls::RISK_ACTIONS_OVERDUE, get(handle_list_overdue_actions))
        .route(
            ApiUrls::RISK_ACTION_BY_ID,
            get(handle_get_action)
                .put(handle_update_action)
                .delete(handle_delete_action),
        )
        .route(
            ApiUrls::RISK_ACTION_PROGRESS,
            post(handle_update_action_progress),
        )
}
