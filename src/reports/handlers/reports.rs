use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use diesel::prelude::*;
use log::info;
use std::sync::Arc;
use uuid::Uuid;

use crate::core::middleware::{AuthenticatedUser, OrganizationContext};
use crate::core::shared::schema::reports;
use crate::shared::state::AppState;
use crate::shared::utils::{page_bounds, run_db};

use crate::reports::error::ReportError;
use crate::reports::storage::{
    apply_status, db_document_to_info, db_report_to_report, find_document, find_org_report,
    save_report, DbReport,
};
use crate::reports::types::{CreateReportRequest, ListReportsQuery, Report, ReportStatus};

#[utoipa::path(
    get,
    path = "/api/reports",
    params(
        ("status" = Option<String>, Query, description = "Filter by status"),
        ("report_type" = Option<String>, Query, description = "Filter by report type"),
        ("limit" = Option<i64>, Query, description = "Page size"),
        ("offset" = Option<i64>, Query, description = "Rows to skip")
    ),
    responses((status = 200, body = [Report])),
    tag = "reports"
)]
pub async fn handle_list_reports(
    State(state): State<Arc<AppState>>,
    org: OrganizationContext,
    Query(query): Query<ListReportsQuery>,
) -> Result<Json<Vec<Report>>, ReportError> {
    let (limit, offset) = page_bounds(query.limit, query.offset);
    let base_url = state.base_url().to_string();

    let result = run_db(&state.conn, move |conn| {
        let mut q = reports::table
            .filter(reports::org_id.eq(org.organization_id))
            .into_boxed();
        if let Some(status) = query.status {
            q = q.filter(reports::status.eq(status));
        }
        if let Some(report_type) = query.report_type {
            q = q.filter(reports::report_type.eq(report_type));
        }
        let rows: Vec<DbReport> = q
            .order(reports::created_at.desc())
            .limit(limit)
            .offset(offset)
            .load(conn)?;
        Ok::<_, ReportError>(
            rows.into_iter()
                .map(|r| db_report_to_report(r, &base_url))
                .collect(),
        )
    })
    .await?;

    Ok(Json(result))
}

#[utoipa::path(
    post,
    path = "/api/reports",
    request_body = CreateReportRequest,
    responses((status = 201, body = Report), (status = 400)),
    tag = "reports"
)]
pub async fn handle_create_report(
    State(state): State<Arc<AppState>>,
    org: OrganizationContext,
    user: AuthenticatedUser,
    Json(req): Json<CreateReportRequest>,
) -> Result<(StatusCode, Json<Report>), ReportError> {
    let parameters = req.validated_parameters()?;
    let title = match req.title.as_deref().map(str::trim) {
        Some(t) if !t.is_empty() => t.to_string(),
        _ => req.report_type.default_title().to_string(),
    };
    let now = Utc::now();
    let row = DbReport {
        id: Uuid::new_v4(),
        org_id: org.organization_id,
        title,
        report_type: req.report_type,
        parameters,
        status: ReportStatus::Pending,
        requested_by: user.user_id,
        document_id: None,
        error_message: None,
        attempts: 0,
        started_at: None,
        completed_at: None,
        created_at: now,
        updated_at: now,
    };

    let inserted = row.clone();
    run_db(&state.conn, move |conn| {
        diesel::insert_into(reports::table)
            .values(&inserted)
            .execute(conn)?;
        Ok::<_, ReportError>(())
    })
    .await?;

    info!(
        "Report {} ({}) requested by {}",
        row.id,
        row.report_type,
        user.actor_label()
    );
    state.report_queue.enqueue(row.id);

    Ok((
        StatusCode::CREATED,
        Json(db_report_to_report(row, state.base_url())),
    ))
}

#[utoipa::path(
    get,
    path = "/api/reports/{id}",
    params(("id" = Uuid, Path, description = "Report ID")),
    responses((status = 200, body = Report), (status = 404)),
    tag = "reports"
)]
pub async fn handle_get_report(
    State(state): State<Arc<AppState>>,
    org: OrganizationContext,
    Path(id): Path<Uuid>,
) -> Result<Json<Report>, ReportError> {
    let (row, document) = run_db(&state.conn, move |conn| {
        let row = find_org_report(conn, org.organization_id, id)
            .optional()?
            .ok_or_else(|| ReportError::NotFound(format!("Report {id} not found")))?;
        let document = match row.document_id {
            Some(document_id) => {
                find_document(conn, org.organization_id, document_id).optional()?
            }
            None => None,
        };
        Ok::<_, ReportError>((row, document))
    })
    .await?;

    let mut report = db_report_to_report(row, state.base_url());
    report.document = document.as_ref().map(db_document_to_info);
    Ok(Json(report))
}

#[utoipa::path(
    get,
    path = "/api/reports/{id}/download",
    params(("id" = Uuid, Path, description = "Report ID")),
    responses(
        (status = 200, description = "PDF document"),
        (status = 404),
        (status = 409, description = "Report is not completed")
    ),
    tag = "reports"
)]
pub async fn handle_download_report(
    State(state): State<Arc<AppState>>,
    org: OrganizationContext,
    Path(id): Path<Uuid>,
) -> Result<Response, ReportError> {
    let document = run_db(&state.conn, move |conn| {
        let report = find_org_report(conn, org.organization_id, id)
            .optional()?
            .ok_or_else(|| ReportError::NotFound(format!("Report {id} not found")))?;
        if report.status != ReportStatus::Completed {
            return Err(ReportError::Conflict(format!(
                "Report {id} is {}, not completed",
                report.status
            )));
        }
        let document_id = report.document_id.ok_or_else(|| {
            ReportError::Internal(format!("Completed report {id} has no document"))
        })?;
        find_document(conn, org.organization_id, document_id)
            .optional()?
            .ok_or_else(|| ReportError::NotFound(format!("Document {document_id} not found")))
    })
    .await?;

    let bytes = state
        .documents
        .read_verified(&document.storage_path, &document.sha256)
        .await?;

    Ok((
        [
            (header::CONTENT_TYPE, document.content_type.clone()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", document.file_name),
            ),
        ],
        bytes,
    )
        .into_response())
}

#[utoipa::path(
    post,
    path = "/api/reports/{id}/retry",
    params(("id" = Uuid, Path, description = "Report ID")),
    responses((status = 200, body = Report), (status = 404), (status = 409)),
    tag = "reports"
)]
pub async fn handle_retry_report(
    State(state): State<Arc<AppState>>,
    org: OrganizationContext,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Report>, ReportError> {
    let row = run_db(&state.conn, move |conn| {
        let mut report = find_org_report(conn, org.organization_id, id)
            .optional()?
            .ok_or_else(|| ReportError::NotFound(format!("Report {id} not found")))?;
        apply_status(&mut report, ReportStatus::Pending, Utc::now())?;
        save_report(conn, &report)?;
        Ok::<_, ReportError>(report)
    })
    .await?;

    info!("Report {id} re-queued by {}", user.actor_label());
    state.report_queue.enqueue(row.id);

    Ok(Json(db_report_to_report(row, state.base_url())))
}
