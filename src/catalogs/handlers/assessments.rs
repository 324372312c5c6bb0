use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use diesel::prelude::*;
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

use crate::core::middleware::{AuthenticatedUser, OrganizationContext};
use crate::core::shared::schema::{clauses, control_assessments, control_clauses, controls};
use crate::notifications::events::{spawn_notification, EventSubject, NotificationEvent};
use crate::notifications::types::EntityType;
use crate::shared::state::AppState;
use crate::shared::utils::{page_bounds, run_db};

use crate::catalogs::error::CatalogError;
use crate::catalogs::storage::{
    db_assessment_to_assessment, find_org_assessment, find_org_control, save_assessment,
    DbAssessment, DbControl,
};
use crate::catalogs::types::{
    Applicability, AssessmentStatus, Assessment, AssignAssessmentRequest,
    BulkCreateAssessmentsRequest, BulkCreateAssessmentsResponse, ChangeLogEntry,
    CreateAssessmentRequest, ImplementationStatus, ListAssessmentsQuery,
    TransitionAssessmentRequest, UpdateAssessmentRequest,
};
use crate::catalogs::workflow::{
    apply_assignment, apply_transition, apply_update, change_log_entries, record_creation,
};

fn new_assessment(org_id: Uuid, control_id: Uuid) -> DbAssessment {
    let now = Utc::now();
    DbAssessment {
        id: Uuid::new_v4(),
        org_id,
        control_id,
        applicability: Applicability::Applicable,
        applicability_justification: None,
        implementation_status: ImplementationStatus::NotStarted,
        status: AssessmentStatus::Pending,
        assigned_to: None,
        due_date: None,
        implementation_notes: None,
        evidence_notes: None,
        completed_at: None,
        change_log: serde_json::json!([]),
        created_at: now,
        updated_at: now,
    }
}

fn subject_for(control: &DbControl, assessment: &DbAssessment) -> EventSubject {
    EventSubject {
        entity_type: EntityType::Assessment,
        entity_id: assessment.id,
        org_id: assessment.org_id,
        title: format!("{} {}", control.control_id, control.name),
        due_date: assessment.due_date,
    }
}

fn load_for_update(
    conn: &mut PgConnection,
    org_id: Uuid,
    assessment_id: Uuid,
) -> Result<(DbAssessment, DbControl), CatalogError> {
    let assessment = find_org_assessment(conn, org_id, assessment_id)
        .optional()?
        .ok_or_else(|| CatalogError::NotFound("Assessment not found".to_string()))?;
    let control = find_org_control(conn, org_id, assessment.control_id)?;
    Ok((assessment, control))
}

#[utoipa::path(
    get,
    path = "/api/assessments",
    responses((status = 200, body = [Assessment]), (status = 400)),
    tag = "catalogs"
)]
pub async fn handle_list_assessments(
    State(state): State<Arc<AppState>>,
    org: OrganizationContext,
    Query(query): Query<ListAssessmentsQuery>,
) -> Result<Json<Vec<Assessment>>, CatalogError> {
    let result = run_db(&state.conn, move |conn| {
        let (limit, offset) = page_bounds(query.limit, query.offset);
        let today = Utc::now().date_naive();
        let mut db_query = control_assessments::table
            .filter(control_assessments::org_id.eq(org.organization_id))
            .into_boxed();

        if let Some(status) = query.status {
            db_query = db_query.filter(control_assessments::status.eq(status));
        }
        if let Some(assigned_to) = query.assigned_to {
            db_query = db_query.filter(control_assessments::assigned_to.eq(assigned_to));
        }
        if let Some(control_id) = query.control_id {
            db_query = db_query.filter(control_assessments::control_id.eq(control_id));
        }
        if let Some(framework_id) = query.framework_id {
            let mapped = control_clauses::table
                .inner_join(clauses::table)
                .filter(clauses::framework_id.eq(framework_id))
                .select(control_clauses::control_id);
            db_query = db_query.filter(control_assessments::control_id.eq_any(mapped));
        }
        if query.overdue == Some(true) {
            db_query = db_query
                .filter(control_assessments::due_date.lt(today))
                .filter(control_assessments::status.ne(AssessmentStatus::Completed));
        }

        let rows: Vec<DbAssessment> = db_query
            .order((
                control_assessments::due_date.asc().nulls_last(),
                control_assessments::created_at.asc(),
            ))
            .offset(offset)
            .limit(limit)
            .load(conn)?;

        Ok::<_, CatalogError>(
            rows.into_iter()
                .map(|row| db_assessment_to_assessment(row, today))
                .collect(),
        )
    })
    .await?;

    Ok(Json(result))
}

#[utoipa::path(
    post,
    path = "/api/assessments",
    request_body = CreateAssessmentRequest,
    responses((status = 201, body = Assessment), (status = 400), (status = 409)),
    tag = "catalogs"
)]
pub async fn handle_create_assessment(
    State(state): State<Arc<AppState>>,
    org: OrganizationContext,
    user: AuthenticatedUser,
    Json(req): Json<CreateAssessmentRequest>,
) -> Result<(StatusCode, Json<Assessment>), CatalogError> {
    req.validate()?;

    let (row, control) = run_db(&state.conn, move |conn| {
        let control = find_org_control(conn, org.organization_id, req.control_id)
            .optional()?
            .ok_or_else(|| CatalogError::Validation("Control does not exist".to_string()))?;

        let existing: Option<Uuid> = control_assessments::table
            .filter(control_assessments::control_id.eq(control.id))
            .select(control_assessments::id)
            .first(conn)
            .optional()?;
        if let Some(existing) = existing {
            return Err(CatalogError::Conflict(format!(
                "Control already has assessment {existing}"
            )));
        }

        let mut row = new_assessment(org.organization_id, control.id);
        row.applicability = req.applicability.unwrap_or(Applicability::Applicable);
        row.applicability_justification = req.applicability_justification;
        row.implementation_status = req
            .implementation_status
            .unwrap_or(ImplementationStatus::NotStarted);
        row.assigned_to = req.assigned_to;
        row.due_date = req.due_date;
        row.implementation_notes = req.implementation_notes;
        row.evidence_notes = req.evidence_notes;
        let created_at = row.created_at;
        record_creation(&mut row, &user.actor_label(), created_at);

        diesel::insert_into(control_assessments::table)
            .values(&row)
            .execute(conn)?;
        Ok((row, control))
    })
    .await?;

    if let Some(assignee) = row.assigned_to {
        spawn_notification(
            state.clone(),
            NotificationEvent::Assigned {
                subject: subject_for(&control, &row),
                assignee,
                assigned_by: user.user_id,
            },
        );
    }

    Ok((
        StatusCode::CREATED,
        Json(db_assessment_to_assessment(row, Utc::now().date_naive())),
    ))
}

#[utoipa::path(
    post,
    path = "/api/assessments/bulk-create",
    request_body = BulkCreateAssessmentsRequest,
    responses((status = 201, body = BulkCreateAssessmentsResponse), (status = 400)),
    tag = "catalogs"
)]
pub async fn handle_bulk_create_assessments(
    State(state): State<Arc<AppState>>,
    org: OrganizationContext,
    user: AuthenticatedUser,
    Json(req): Json<BulkCreateAssessmentsRequest>,
) -> Result<(StatusCode, Json<BulkCreateAssessmentsResponse>), CatalogError> {
    req.validate()?;
    let actor = user.actor_label();

    let result = run_db(&state.conn, move |conn| {
        conn.transaction::<_, CatalogError, _>(|conn| {
            let mut target: Vec<Uuid> = req.control_ids.clone().unwrap_or_default();
            if let Some(framework_id) = req.framework_id {
                let mapped: Vec<Uuid> = control_clauses::table
                    .inner_join(clauses::table)
                    .inner_join(controls::table)
                    .filter(clauses::framework_id.eq(framework_id))
                    .filter(controls::org_id.eq(org.organization_id))
                    .select(control_clauses::control_id)
                    .load(conn)?;
                target.extend(mapped);
            }
            target.sort();
            target.dedup();

            let owned: HashSet<Uuid> = controls::table
                .filter(controls::org_id.eq(org.organization_id))
                .filter(controls::id.eq_any(&target))
                .select(controls::id)
                .load::<Uuid>(conn)?
                .into_iter()
                .collect();
            if let Some(unknown) = target.iter().find(|id| !owned.contains(id)) {
                return Err(CatalogError::Validation(format!(
                    "Control {unknown} does not exist"
                )));
            }

            let already: HashSet<Uuid> = control_assessments::table
                .filter(control_assessments::control_id.eq_any(&target))
                .select(control_assessments::control_id)
                .load::<Uuid>(conn)?
                .into_iter()
                .collect();

            let today = Utc::now().date_naive();
            let mut created = Vec::new();
            let mut skipped = Vec::new();
            for control_id in target {
                if already.contains(&control_id) {
                    skipped.push(control_id);
                    continue;
                }
                let mut row = new_assessment(org.organization_id, control_id);
                row.assigned_to = req.assigned_to;
                row.due_date = req.due_date;
                let created_at = row.created_at;
                record_creation(&mut row, &actor, created_at);
                diesel::insert_into(control_assessments::table)
                    .values(&row)
                    .execute(conn)?;
                created.push(db_assessment_to_assessment(row, today));
            }

            log::info!(
                "Bulk-created {} assessments for org {} ({} skipped)",
                created.len(),
                org.organization_id,
                skipped.len()
            );
            Ok(BulkCreateAssessmentsResponse {
                created,
                skipped_control_ids: skipped,
            })
        })
    })
    .await?;

    Ok((StatusCode::CREATED, Json(result)))
}

#[utoipa::path(
    get,
    path = "/api/assessments/{id}",
    params(("id" = Uuid, Path, description = "Assessment ID")),
    responses((status = 200, body = Assessment), (status = 404)),
    tag = "catalogs"
)]
pub async fn handle_get_assessment(
    State(state): State<Arc<AppState>>,
    org: OrganizationContext,
    Path(assessment_id): Path<Uuid>,
) -> Result<Json<Assessment>, CatalogError> {
    let row = run_db(&state.conn, move |conn| {
        find_org_assessment(conn, org.organization_id, assessment_id)
            .optional()?
            .ok_or_else(|| CatalogError::NotFound("Assessment not found".to_string()))
    })
    .await?;

    Ok(Json(db_assessment_to_assessment(row, Utc::now().date_naive())))
}

#[utoipa::path(
    put,
    path = "/api/assessments/{id}",
    params(("id" = Uuid, Path, description = "Assessment ID")),
    request_body = UpdateAssessmentRequest,
    responses((status = 200, body = Assessment), (status = 400), (status = 404)),
    tag = "catalogs"
)]
pub async fn handle_update_assessment(
    State(state): State<Arc<AppState>>,
    org: OrganizationContext,
    user: AuthenticatedUser,
    Path(assessment_id): Path<Uuid>,
    Json(req): Json<UpdateAssessmentRequest>,
) -> Result<Json<Assessment>, CatalogError> {
    let row = run_db(&state.conn, move |conn| {
        let mut row = find_org_assessment(conn, org.organization_id, assessment_id)
            .optional()?
            .ok_or_else(|| CatalogError::NotFound("Assessment not found".to_string()))?;
        if apply_update(&mut row, req, &user.actor_label(), Utc::now())? {
            save_assessment(conn, &row)?;
        }
        Ok::<_, CatalogError>(row)
    })
    .await?;

    Ok(Json(db_assessment_to_assessment(row, Utc::now().date_naive())))
}

#[utoipa::path(
    post,
    path = "/api/assessments/{id}/assign",
    params(("id" = Uuid, Path, description = "Assessment ID")),
    request_body = AssignAssessmentRequest,
    responses((status = 200, body = Assessment), (status = 404)),
    tag = "catalogs"
)]
pub async fn handle_assign_assessment(
    State(state): State<Arc<AppState>>,
    org: OrganizationContext,
    user: AuthenticatedUser,
    Path(assessment_id): Path<Uuid>,
    Json(req): Json<AssignAssessmentRequest>,
) -> Result<Json<Assessment>, CatalogError> {
    let (row, control, changed) = run_db(&state.conn, move |conn| {
        let (mut row, control) = load_for_update(conn, org.organization_id, assessment_id)?;
        let changed = apply_assignment(
            &mut row,
            req.assigned_to,
            req.due_date,
            &user.actor_label(),
            Utc::now(),
        );
        if changed {
            save_assessment(conn, &row)?;
        }
        Ok::<_, CatalogError>((row, control, changed))
    })
    .await?;

    if changed {
        if let Some(assignee) = row.assigned_to {
            spawn_notification(
                state.clone(),
                NotificationEvent::Assigned {
                    subject: subject_for(&control, &row),
                    assignee,
                    assigned_by: user.user_id,
                },
            );
        }
    }

    Ok(Json(db_assessment_to_assessment(row, Utc::now().date_naive())))
}

#[utoipa::path(
    post,
    path = "/api/assessments/{id}/transition",
    params(("id" = Uuid, Path, description = "Assessment ID")),
    request_body = TransitionAssessmentRequest,
    responses((status = 200, body = Assessment), (status = 404), (status = 409)),
    tag = "catalogs"
)]
pub async fn handle_transition_assessment(
    State(state): State<Arc<AppState>>,
    org: OrganizationContext,
    user: AuthenticatedUser,
    Path(assessment_id): Path<Uuid>,
    Json(req): Json<TransitionAssessmentRequest>,
) -> Result<Json<Assessment>, CatalogError> {
    let (row, control, previous) = run_db(&state.conn, move |conn| {
        let (mut row, control) = load_for_update(conn, org.organization_id, assessment_id)?;
        let previous = apply_transition(
            &mut row,
            req.status,
            &user.actor_label(),
            req.comment,
            Utc::now(),
        )?;
        save_assessment(conn, &row)?;
        Ok::<_, CatalogError>((row, control, previous))
    })
    .await?;

    if let Some(recipient) = row.assigned_to.filter(|id| Some(*id) != user.user_id) {
        spawn_notification(
            state.clone(),
            NotificationEvent::StatusChanged {
                subject: subject_for(&control, &row),
                recipient,
                from: previous.to_string(),
                to: row.status.to_string(),
                changed_by: user.user_id,
            },
        );
    }

    Ok(Json(db_assessment_to_assessment(row, Utc::now().date_naive())))
}

#[utoipa::path(
    get,
    path = "/api/assessments/{id}/history",
    params(("id" = Uuid, Path, description = "Assessment ID")),
    responses((status = 200, body = [ChangeLogEntry]), (status = 404)),
    tag = "catalogs"
)]
pub async fn handle_get_assessment_history(
    State(state): State<Arc<AppState>>,
    org: OrganizationContext,
    Path(assessment_id): Path<Uuid>,
) -> Result<Json<Vec<ChangeLogEntry>>, CatalogError> {
    let row = run_db(&state.conn, move |conn| {
        find_org_assessment(conn, org.organization_id, assessment_id)
            .optional()?
            .ok_or_else(|| CatalogError::NotFound("Assessment not found".to_string()))
    })
    .await?;

    Ok(Json(change_log_entries(&row.change_log)))
}
