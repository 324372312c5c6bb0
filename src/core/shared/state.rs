use crate::core::config::AppConfig;
use crate::notifications::mailer::Mailer;
use crate::reports::documents::DocumentStore;
use crate::reports::pdf::PdfConverter;
use crate::reports::worker::ReportQueue;
use crate::shared::utils::DbPool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub conn: DbPool,
    pub config: Arc<AppConfig>,
    pub mailer: Arc<dyn Mailer>,
    pub pdf_converter: Arc<dyn PdfConverter>,
    pub documents: DocumentStore,
    pub report_queue: ReportQueue,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("environment", &self.config.environment)
            .field("documents", &self.documents)
            .finish_non_exhaustive()
    }
}

impl AppState {
    pub fn base_url(&self) -> &str {
        &self.config.server.base_url
    }
}
