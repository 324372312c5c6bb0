use anyhow::{Context, Result};
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::PgConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use log::info;

use crate::core::config::DatabaseConfig;

pub type DbPool = Pool<ConnectionManager<PgConnection>>;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

pub fn create_conn(config: &DatabaseConfig) -> Result<DbPool> {
    let manager = ConnectionManager::<PgConnection>::new(config.url.clone());
    Pool::builder()
        .max_size(config.pool_size)
        .build(manager)
        .with_context(|| "Failed to create database pool".to_string())
}

/// Run database migrations
pub fn run_migrations(pool: &DbPool) -> Result<()> {
    let mut conn = pool.get().context("Failed to get connection for migrations")?;
    let applied = conn
        .run_pending_migrations(MIGRATIONS)
        .map_err(|e| anyhow::anyhow!("Migration error: {e}"))?;
    info!("Applied {} pending migrations", applied.len());
    Ok(())
}

pub const DEFAULT_PAGE_SIZE: i64 = 50;
pub const MAX_PAGE_SIZE: i64 = 500;

/// Failure of the plumbing around a blocking database closure.
#[derive(Debug, thiserror::Error)]
pub enum DbTaskError {
    #[error("Database pool error: {0}")]
    Pool(String),
    #[error("Blocking task failed: {0}")]
    Join(String),
}

/// Checks a connection out of the pool and runs `f` on the blocking pool.
pub async fn run_db<T, E, F>(pool: &DbPool, f: F) -> std::result::Result<T, E>
where
    T: Send + 'static,
    E: From<DbTaskError> + Send + 'static,
    F: FnOnce(&mut PgConnection) -> std::result::Result<T, E> + Send + 'static,
{
    let pool = pool.clone();
    tokio::task::spawn_blocking(move || {
        let mut conn = pool
            .get()
            .map_err(|e| E::from(DbTaskError::Pool(e.to_string())))?;
        f(&mut conn)
    })
    .await
    .map_err(|e| E::from(DbTaskError::Join(e.to_string())))?
}

/// Clamps list pagination to `(limit, offset)`.
pub fn page_bounds(limit: Option<i64>, offset: Option<i64>) -> (i64, i64) {
    let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    let offset = offset.unwrap_or(0).max(0);
    (limit, offset)
}

/// Next sequential code for a per-org counter such as `RISK-0007`.
pub fn next_sequence_code(prefix: &str, existing: &[String]) -> String {
    let max = existing
        .iter()
        .filter_map(|code| code.strip_prefix(prefix))
        .filter_map(|rest| rest.trim_start_matches('-').parse::<u32>().ok())
        .max()
        .unwrap_or(0);
    format!("{prefix}-{:04}", max + 1)
}

pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_sequence_code_starts_at_one() {
        assert_eq!(next_sequence_code("RISK", &[]), "RISK-0001");
    }

    #[test]
    fn test_next_sequence_code_skips_gaps_and_foreign_codes() {
        let existing = vec![
            "RISK-0002".to_string(),
            "RISK-0010".to_string(),
            "LEGACY-9".to_string(),
            "RISK-abc".to_string(),
        ];
        assert_eq!(next_sequence_code("RISK", &existing), "RISK-0011");
    }

    #[test]
    fn test_page_bounds_clamps() {
        assert_eq!(page_bounds(None, None), (DEFAULT_PAGE_SIZE, 0));
        assert_eq!(page_bounds(Some(0), Some(-5)), (1, 0));
        assert_eq!(page_bounds(Some(10_000), Some(20)), (MAX_PAGE_SIZE, 20));
    }
}
