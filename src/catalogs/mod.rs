pub mod error;
pub mod handlers;
pub mod import;
pub mod storage;
pub mod tree;
pub mod types;
pub mod workflow;

use axum::{
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;

use crate::core::urls::ApiUrls;
use crate::shared::state::AppState;

pub use error::CatalogError;
pub use handlers::*;
pub use types::*;

pub fn configure_catalog_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            ApiUrls::FRAMEWORKS,
            get(handle_list_frameworks).post(handle_create_framework),
        )
        .route(
            ApiUrls::FRAMEWORK_BY_ID,
            get(handle_get_framework)
                .put(handle_update_framework)
                .delete(handle_delete_framework),
        )
        .route(ApiUrls::FRAMEWORK_CLAUSES, get(handle_get_framework_clauses))
        .route(ApiUrls::FRAMEWORK_COVERAGE, get(handle_get_framework_coverage))
        .route(
            ApiUrls::CLAUSES,
            get(handle_list_clauses).post(handle_create_clause),
        )
        .route(
            ApiUrls::CLAUSE_BY_ID,
            get(handle_get_clause)
                .put(handle_update_clause)
                .delete(handle_delete_clause),
        )
        .route(
            ApiUrls::CONTROLS,
            get(handle_list_controls).post(handle_create_control),
        )
        .route(
            ApiUrls::CONTROL_BY_ID,
            get(handle_get_control)
                .put(handle_update_control)
                .delete(handle_delete_control),
        )
        .route(ApiUrls::CONTROL_CLAUSES, put(handle_replace_control_clauses))
        .route(ApiUrls::CONTROL_MARK_TESTED, post(handle_mark_control_tested))
        .route(
            ApiUrls::ASSESSMENTS,
            get(handle_list_assessments).post(handle_create_assessment),
        )
        .route(
            ApiUrls::ASSESSMENTS_BULK_CREATE,
            post(handle_bulk_create_assessments),
        )
        .route(
            ApiUrls::ASSESSMENT_BY_ID,
            get(handle_get_assessment).put(handle_update_assessment),
        )
        .route(ApiUrls::ASSESSMENT_ASSIGN, post(handle_assign_assessment))
        .route(
            ApiUrls::ASSESSMENT_TRANSITION,
            post(handle_transition_assessment),
        )
        .route(
            ApiUrls::ASSESSMENT_HISTORY,
            get(handle_get_assessment_history),
        )
}
