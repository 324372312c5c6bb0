use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::shared::state::AppState;
use crate::shared::utils::run_db;
use crate::tasks::RetryPolicy;

use super::data::load_report_data;
use super::documents::DocumentStore;
use super::error::ReportError;
use super::pdf::PdfConverter;
use super::render::render_html;
use super::storage::{
    claim_report, complete_with_document, mark_failed, recover_unfinished, DbDocument, DbReport,
};

pub const PDF_CONTENT_TYPE: &str = "application/pdf";

/// Sending side of the report worker's queue.
#[derive(Debug, Clone)]
pub struct ReportQueue {
    tx: mpsc::Sender<Uuid>,
}

impl ReportQueue {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Uuid>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Hands a report to the worker. A full or closed queue only logs: the
    /// row stays `pending` and is picked up again on the next startup sweep.
    pub fn enqueue(&self, report_id: Uuid) -> bool {
        match self.tx.try_send(report_id) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("Report queue full, report {report_id} left pending");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!("Report worker not running, report {report_id} left pending");
                false
            }
        }
    }
}

pub fn pdf_file_name(title: &str, generated_at: DateTime<Utc>) -> String {
    let slug: String = title
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    let slug = slug
        .split('-')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-");
    let slug = if slug.is_empty() { "report".to_string() } else { slug };
    format!("{slug}-{}.pdf", generated_at.format("%Y%m%d"))
}

/// Converts rendered HTML to PDF under `policy` and writes it to the store.
pub async fn produce_document(
    converter: &dyn PdfConverter,
    policy: RetryPolicy,
    store: &DocumentStore,
    report: &DbReport,
    html: &str,
    now: DateTime<Utc>,
) -> Result<DbDocument, ReportError> {
    let label = format!("PDF conversion for report {}", report.id);
    let bytes = policy
        .run(&label, |_| converter.convert(html))
        .await
        .map_err(|e| ReportError::Generation(e.to_string()))?;

    let document_id = Uuid::new_v4();
    let file_name = pdf_file_name(&report.title, now);
    let stored = store
        .save(report.org_id, document_id, &file_name, &bytes)
        .await?;

    Ok(DbDocument {
        id: document_id,
        org_id: report.org_id,
        file_name,
        content_type: PDF_CONTENT_TYPE.to_string(),
        storage_path: stored.storage_path,
        size_bytes: stored.size_bytes,
        sha256: stored.sha256,
        created_by: report.requested_by,
        created_at: now,
    })
}

async fn generate(state: &Arc<AppState>, report: DbReport) -> Result<DbReport, ReportError> {
    let now = Utc::now();
    let today = now.date_naive();
    let source = report.clone();
    let html = run_db(&state.conn, move |conn| {
        let data = load_report_data(conn, &source, today)?;
        Ok::<_, ReportError>(render_html(&source.title, &data, now))
    })
    .await?;
    debug!("Rendered report {} ({} bytes of HTML)", report.id, html.len());

    let document = produce_document(
        state.pdf_converter.as_ref(),
        state.config.reports.retry_policy(),
        &state.documents,
        &report,
        &html,
        now,
    )
    .await?;

    let report_id = report.id;
    let stored_path = document.storage_path.clone();
    let completed = run_db(&state.conn, move |conn| {
        complete_with_document(conn, report_id, &document)
    })
    .await;
    if completed.is_err() {
        let _ = state.documents.remove(&stored_path).await;
    }
    completed
}

/// Runs one report through its lifecycle. Returns `Ok(false)` when the
/// report was not claimable (already taken, finished, or deleted).
pub async fn process_report(state: Arc<AppState>, report_id: Uuid) -> Result<bool, ReportError> {
    let claimed = run_db(&state.conn, move |conn| claim_report(conn, report_id)).await?;
    let Some(report) = claimed else {
        debug!("Report {report_id} not claimable, skipping");
        return Ok(false);
    };
    info!(
        "Generating {} report {} (attempt {})",
        report.report_type, report.id, report.attempts
    );

    match generate(&state, report).await {
        Ok(done) => {
            info!("Report {} completed with document {:?}", done.id, done.document_id);
            Ok(true)
        }
        Err(e) => {
            let message = e.to_string();
            error!("Report {report_id} failed: {message}");
            run_db(&state.conn, move |conn| mark_failed(conn, report_id, &message)).await?;
            Ok(true)
        }
    }
}

/// Cutoff before which a `processing` report is considered abandoned.
pub fn stale_cutoff(now: DateTime<Utc>, stale_after: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(stale_after)
        .ok()
        .and_then(|age| now.checked_sub_signed(age))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Puts abandoned reports back to pending and queues every pending one.
pub async fn requeue_pending(state: &Arc<AppState>) -> Result<usize, ReportError> {
    let stale_before = stale_cutoff(Utc::now(), state.config.reports.stale_after());
    let ids = run_db(&state.conn, move |conn| {
        recover_unfinished(conn, stale_before).map_err(ReportError::from)
    })
    .await?;
    let queued = ids
        .iter()
        .filter(|id| state.report_queue.enqueue(**id))
        .count();
    if !ids.is_empty() {
        info!("Re-queued {queued} of {} pending reports", ids.len());
    }
    Ok(queued)
}

/// Consumes the queue until every sender is dropped.
pub async fn run_worker(state: Arc<AppState>, mut rx: mpsc::Receiver<Uuid>) {
    info!("Report worker started");
    while let Some(report_id) = rx.recv().await {
        if let Err(e) = process_report(state.clone(), report_id).await {
            error!("Report worker error on {report_id}: {e}");
        }
    }
    info!("Report worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reports::pdf::StaticPdfConverter;
    use crate::reports::types::{ReportStatus, ReportType};

    fn report() -> DbReport {
        DbReport {
            id: Uuid::new_v4(),
            org_id: Uuid::new_v4(),
            title: "Q3 Risk Register".into(),
            report_type: ReportType::RiskRegister,
            parameters: serde_json::json!({}),
            status: ReportStatus::Processing,
            requested_by: Some(Uuid::new_v4()),
            document_id: None,
            error_message: None,
            attempts: 1,
            started_at: Some(Utc::now()),
            completed_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_pdf_file_name() {
        let at = DateTime::parse_from_rfc3339("2026-09-30T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(
            pdf_file_name("Q3 Risk Register", at),
            "q3-risk-register-20260930.pdf"
        );
        assert_eq!(pdf_file_name("***", at), "report-20260930.pdf");
    }

    #[test]
    fn test_stale_cutoff() {
        let now = Utc::now();
        assert_eq!(
            stale_cutoff(now, Duration::from_secs(900)),
            now - chrono::Duration::seconds(900)
        );
        assert_eq!(
            stale_cutoff(now, Duration::from_secs(u64::MAX)),
            DateTime::<Utc>::MIN_UTC
        );
    }

    #[test]
    fn test_queue_full_reports_false() {
        let (queue, _rx) = ReportQueue::new(1);
        assert!(queue.enqueue(Uuid::new_v4()));
        assert!(!queue.enqueue(Uuid::new_v4()));
    }

    #[test]
    fn test_queue_closed_reports_false() {
        let (queue, rx) = ReportQueue::new(4);
        drop(rx);
        assert!(!queue.enqueue(Uuid::new_v4()));
    }

    #[tokio::test]
    async fn test_produce_document_retries_conversion() {
        let dir = tempfile::tempdir().unwrap();
        let store = DocumentStore::new(dir.path());
        let converter = StaticPdfConverter::failing(2);
        let report = report();

        let doc = produce_document(
            &converter,
            RetryPolicy::new(3, Duration::ZERO),
            &store,
            &report,
            "<h1>Register</h1>",
            Utc::now(),
        )
        .await
        .unwrap();

        assert_eq!(converter.calls(), 3);
        assert_eq!(doc.org_id, report.org_id);
        assert_eq!(doc.created_by, report.requested_by);
        assert_eq!(doc.content_type, PDF_CONTENT_TYPE);
        let bytes = store
            .read_verified(&doc.storage_path, &doc.sha256)
            .await
            .unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[tokio::test]
    async fn test_produce_document_gives_up() {
        let dir = tempfile::tempdir().unwrap();
        let store = DocumentStore::new(dir.path());
        let converter = StaticPdfConverter::failing(5);

        let result = produce_document(
            &converter,
            RetryPolicy::new(2, Duration::ZERO),
            &store,
            &report(),
            "<p/>",
            Utc::now(),
        )
        .await;

        assert!(matches!(result, Err(ReportError::Generation(_))));
        assert_eq!(converter.calls(), 2);
    }
}
