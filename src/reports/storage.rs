use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::shared::schema::{documents, reports};

use super::error::ReportError;
use super::types::{DocumentInfo, Report, ReportStatus, ReportType};

#[derive(Debug, Clone, Queryable, Insertable, AsChangeset, Serialize, Deserialize)]
#[diesel(table_name = reports)]
#[diesel(treat_none_as_null = true)]
pub struct DbReport {
    pub id: Uuid,
    pub org_id: Uuid,
    pub title: String,
    pub report_type: ReportType,
    pub parameters: serde_json::Value,
    pub status: ReportStatus,
    pub requested_by: Option<Uuid>,
    pub document_id: Option<Uuid>,
    pub error_message: Option<String>,
    pub attempts: i32,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = documents)]
pub struct DbDocument {
    pub id: Uuid,
    pub org_id: Uuid,
    pub file_name: String,
    pub content_type: String,
    pub storage_path: String,
    pub size_bytes: i64,
    pub sha256: String,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

pub fn db_report_to_report(db: DbReport, base_url: &str) -> Report {
    let download_url = (db.status == ReportStatus::Completed).then(|| {
        format!(
            "{}/api/reports/{}/download",
            base_url.trim_end_matches('/'),
            db.id
        )
    });
    Report {
        id: db.id,
        org_id: db.org_id,
        title: db.title,
        report_type: db.report_type,
        parameters: db.parameters,
        status: db.status,
        requested_by: db.requested_by,
        document_id: db.document_id,
        error_message: db.error_message,
        attempts: db.attempts,
        started_at: db.started_at,
        completed_at: db.completed_at,
        download_url,
        document: None,
        created_at: db.created_at,
        updated_at: db.updated_at,
    }
}

pub fn db_document_to_info(db: &DbDocument) -> DocumentInfo {
    DocumentInfo {
        id: db.id,
        file_name: db.file_name.clone(),
        content_type: db.content_type.clone(),
        size_bytes: db.size_bytes,
        sha256: db.sha256.clone(),
        created_at: db.created_at,
    }
}

/// Moves `report` to `next`, stamping the lifecycle timestamps.
pub fn apply_status(
    report: &mut DbReport,
    next: ReportStatus,
    now: DateTime<Utc>,
) -> Result<ReportStatus, ReportError> {
    let previous = report.status;
    if !previous.can_transition_to(next) {
        return Err(ReportError::InvalidTransition(format!(
            "Cannot move report from {previous} to {next}"
        )));
    }
    report.status = next;
    match next {
        ReportStatus::Processing => {
            report.attempts += 1;
            report.started_at = Some(now);
            report.error_message = None;
        }
        ReportStatus::Completed => {
            report.completed_at = Some(now);
            report.error_message = None;
        }
        ReportStatus::Failed => {
            report.completed_at = Some(now);
        }
        ReportStatus::Pending => {
            report.started_at = None;
            report.completed_at = None;
            report.document_id = None;
        }
    }
    report.updated_at = now;
    Ok(previous)
}

pub fn find_org_report(
    conn: &mut PgConnection,
    org_id: Uuid,
    report_id: Uuid,
) -> QueryResult<DbReport> {
    reports::table
        .filter(reports::id.eq(report_id))
        .filter(reports::org_id.eq(org_id))
        .first(conn)
}

pub fn save_report(conn: &mut PgConnection, report: &DbReport) -> QueryResult<usize> {
    diesel::update(reports::table.find(report.id))
        .set(report)
        .execute(conn)
}

/// Claims a pending report for processing. `None` when it is gone or
/// another worker got there first.
pub fn claim_report(conn: &mut PgConnection, report_id: Uuid) -> Result<Option<DbReport>, ReportError> {
    conn.transaction::<_, ReportError, _>(|conn| {
        let report: Option<DbReport> = reports::table
            .find(report_id)
            .for_update()
            .skip_locked()
            .first(conn)
            .optional()?;
        let Some(mut report) = report else {
            return Ok(None);
        };
        if report.status != ReportStatus::Pending {
            return Ok(None);
        }
        apply_status(&mut report, ReportStatus::Processing, Utc::now())?;
        save_report(conn, &report)?;
        Ok(Some(report))
    })
}

pub fn mark_failed(
    conn: &mut PgConnection,
    report_id: Uuid,
    message: &str,
) -> Result<DbReport, ReportError> {
    let mut report: DbReport = reports::table.find(report_id).first(conn)?;
    apply_status(&mut report, ReportStatus::Failed, Utc::now())?;
    report.error_message = Some(message.to_string());
    save_report(conn, &report)?;
    Ok(report)
}

/// Stores the document row and completes the report in one transaction.
pub fn complete_with_document(
    conn: &mut PgConnection,
    report_id: Uuid,
    document: &DbDocument,
) -> Result<DbReport, ReportError> {
    conn.transaction::<_, ReportError, _>(|conn| {
        diesel::insert_into(documents::table)
            .values(document)
            .execute(conn)?;
        let mut report: DbReport = reports::table.find(report_id).first(conn)?;
        apply_status(&mut report, ReportStatus::Completed, Utc::now())?;
        report.document_id = Some(document.id);
        save_report(conn, &report)?;
        Ok(report)
    })
}

pub fn find_document(
    conn: &mut PgConnection,
    org_id: Uuid,
    document_id: Uuid,
) -> QueryResult<DbDocument> {
    documents::table
        .filter(documents::id.eq(document_id))
        .filter(documents::org_id.eq(org_id))
        .first(conn)
}

/// Reports a worker should pick up after a restart. `processing` rows
/// claimed before `stale_before` are put back to `pending`; newer ones may
/// belong to a live worker on another instance and are left alone.
pub fn recover_unfinished(
    conn: &mut PgConnection,
    stale_before: DateTime<Utc>,
) -> QueryResult<Vec<Uuid>> {
    conn.transaction(|conn| {
        diesel::update(
            reports::table
                .filter(reports::status.eq(ReportStatus::Processing))
                .filter(
                    reports::started_at
                        .lt(stale_before)
                        .or(reports::started_at.is_null()),
                ),
        )
        .set((
            reports::status.eq(ReportStatus::Pending),
            reports::started_at.eq(None::<DateTime<Utc>>),
            reports::updated_at.eq(Utc::now()),
        ))
        .execute(conn)?;
        reports::table
            .filter(reports::status.eq(ReportStatus::Pending))
            .order(reports::created_at.asc())
            .select(reports::id)
            .load(conn)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(status: ReportStatus) -> DbReport {
        DbReport {
            id: Uuid::new_v4(),
            org_id: Uuid::new_v4(),
            title: "Risk Register".into(),
            report_type: ReportType::RiskRegister,
            parameters: serde_json::json!({}),
            status,
            requested_by: None,
            document_id: None,
            error_message: None,
            attempts: 0,
            started_at: None,
            completed_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_processing_counts_attempts() {
        let mut r = report(ReportStatus::Pending);
        apply_status(&mut r, ReportStatus::Processing, Utc::now()).unwrap();
        assert_eq!(r.attempts, 1);
        assert!(r.started_at.is_some());
    }

    #[test]
    fn test_retry_clears_previous_run() {
        let mut r = report(ReportStatus::Processing);
        r.attempts = 1;
        apply_status(&mut r, ReportStatus::Failed, Utc::now()).unwrap();
        r.error_message = Some("converter exited with 1".into());

        apply_status(&mut r, ReportStatus::Pending, Utc::now()).unwrap();
        assert!(r.completed_at.is_none());
        assert_eq!(r.attempts, 1);

        apply_status(&mut r, ReportStatus::Processing, Utc::now()).unwrap();
        assert_eq!(r.attempts, 2);
        assert!(r.error_message.is_none());
    }

    #[test]
    fn test_completed_report_cannot_restart() {
        let mut r = report(ReportStatus::Completed);
        assert!(matches!(
            apply_status(&mut r, ReportStatus::Pending, Utc::now()),
            Err(ReportError::InvalidTransition(_))
        ));
    }

    #[test]
    fn test_download_url_only_when_completed() {
        let done = db_report_to_report(report(ReportStatus::Completed), "http://grc.local/");
        assert!(done
            .download_url
            .unwrap()
            .starts_with("http://grc.local/api/reports/"));
        let pending = db_report_to_report(report(ReportStatus::Pending), "http://grc.local");
        assert!(pending.download_url.is_none());
    }

    #[test]
    fn test_recovery_leaves_recent_claims_alone() {
        use diesel::connection::SimpleConnection;

        let Ok(url) = std::env::var("GRC_TEST_DATABASE_URL") else {
            println!("Skipping test - GRC_TEST_DATABASE_URL not set");
            return;
        };
        let pool = crate::shared::utils::create_conn(&crate::core::config::DatabaseConfig {
            url,
            pool_size: 1,
            run_migrations: true,
        })
        .unwrap();
        crate::shared::utils::run_migrations(&pool).unwrap();
        let mut conn = pool.get().unwrap();

        let org = Uuid::new_v4();
        let (fresh, abandoned) = (Uuid::new_v4(), Uuid::new_v4());
        conn.batch_execute(&format!(
            "INSERT INTO organizations (id, name, slug) VALUES ('{org}', 'Recovery', '{org}');
             INSERT INTO reports (id, org_id, title, report_type, status, attempts, started_at)
             VALUES ('{fresh}', '{org}', 'Fresh', 'risk_register', 'processing', 1, NOW()),
                    ('{abandoned}', '{org}', 'Old', 'risk_register', 'processing', 1,
                     NOW() - INTERVAL '2 hours');"
        ))
        .unwrap();

        let ids = recover_unfinished(&mut conn, Utc::now() - chrono::Duration::hours(1)).unwrap();
        assert!(ids.contains(&abandoned));
        assert!(!ids.contains(&fresh));

        let fresh_status: ReportStatus = reports::table
            .find(fresh)
            .select(reports::status)
            .first(&mut conn)
            .unwrap();
        assert_eq!(fresh_status, ReportStatus::Processing);

        conn.batch_execute(&format!("DELETE FROM organizations WHERE id = '{org}'"))
            .unwrap();
    }
}
