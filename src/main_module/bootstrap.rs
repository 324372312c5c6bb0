//! Bootstrap and application initialization logic

use anyhow::{Context, Result};
use log::info;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::core::config::AppConfig;
use crate::core::shared::state::AppState;
use crate::core::shared::utils::{create_conn, run_migrations};
use crate::notifications::mailer::build_mailer;
use crate::reports::documents::DocumentStore;
use crate::reports::pdf::CommandPdfConverter;
use crate::reports::worker::ReportQueue;

/// `env_logger` with `info` as the default filter; `RUST_LOG` overrides it.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .try_init();
}

/// Loads `.env` and the layered configuration.
pub fn load_config() -> Result<AppConfig> {
    if let Ok(path) = dotenvy::dotenv() {
        info!("Loaded environment from {}", path.display());
    }
    let config = AppConfig::load().context("Failed to load configuration")?;
    info!(
        "Configuration loaded (profile {}, database pool {})",
        config.environment, config.database.pool_size
    );
    Ok(config)
}

/// Connects the pool, runs migrations when enabled, and wires the
/// mail, PDF and document backends. The receiver feeds the report worker.
pub fn build_app_state(config: AppConfig) -> Result<(AppState, mpsc::Receiver<Uuid>)> {
    let pool = create_conn(&config.database)?;
    if config.database.run_migrations {
        run_migrations(&pool)?;
    }

    let documents_dir = config.documents_dir();
    std::fs::create_dir_all(&documents_dir).with_context(|| {
        format!(
            "Failed to create documents directory {}",
            documents_dir.display()
        )
    })?;

    let (report_queue, report_rx) = ReportQueue::new(config.reports.queue_capacity);
    let state = AppState {
        conn: pool,
        mailer: build_mailer(&config.email),
        pdf_converter: Arc::new(CommandPdfConverter::from_config(&config.reports)),
        documents: DocumentStore::new(documents_dir),
        report_queue,
        config: Arc::new(config),
    };
    Ok((state, report_rx))
}
