use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use diesel::prelude::*;
use std::sync::Arc;
use uuid::Uuid;

use crate::core::middleware::{AuthenticatedUser, OrganizationContext};
use crate::core::shared::schema::risk_actions;
use crate::notifications::events::{spawn_notification, EventSubject, NotificationEvent};
use crate::notifications::types::EntityType;
use crate::shared::state::AppState;
use crate::shared::utils::{page_bounds, run_db};

use crate::risk::error::RiskError;
use crate::risk::storage::{db_action_to_action, find_org_action, find_org_risk, DbRiskAction};
use crate::risk::treatment::{apply_progress, apply_status, validate_progress};
use crate::risk::types::{
    ActionPriority, ActionStatus, ActionType, CreateRiskActionRequest, ListRiskActionsQuery,
    RiskAction, UpdateProgressRequest, UpdateRiskActionRequest,
};

fn subject_for(action: &DbRiskAction) -> EventSubject {
    EventSubject {
        entity_type: EntityType::RiskAction,
        entity_id: action.id,
        org_id: action.org_id,
        title: action.title.clone(),
        due_date: action.due_date,
    }
}

fn save_action(conn: &mut PgConnection, action: &DbRiskAction) -> QueryResult<usize> {
    diesel::update(risk_actions::table.find(action.id))
        .set(action)
        .execute(conn)
}

fn notify_status_change(
    state: &Arc<AppState>,
    action: &DbRiskAction,
    previous: ActionStatus,
    user: AuthenticatedUser,
) {
    if previous == action.status {
        return;
    }
    if let Some(recipient) = action.assigned_to.filter(|id| Some(*id) != user.user_id) {
        spawn_notification(
            state.clone(),
            NotificationEvent::StatusChanged {
                subject: subject_for(action),
                recipient,
                from: previous.to_string(),
                to: action.status.to_string(),
                changed_by: user.user_id,
            },
        );
    }
}

#[utoipa::path(
    get,
    path = "/api/risk-actions",
    responses((status = 200, body = [RiskAction]), (status = 400)),
    tag = "risk"
)]
pub async fn handle_list_actions(
    State(state): State<Arc<AppState>>,
    org: OrganizationContext,
    Query(query): Query<ListRiskActionsQuery>,
) -> Result<Json<Vec<RiskAction>>, RiskError> {
    let result = run_db(&state.conn, move |conn| {
        let (limit, offset) = page_bounds(query.limit, query.offset);
        let mut db_query = risk_actions::table
            .filter(risk_actions::org_id.eq(org.organization_id))
            .into_boxed();

        if let Some(risk_id) = query.risk_id {
            db_query = db_query.filter(risk_actions::risk_id.eq(risk_id));
        }
        if let Some(status) = query.status {
            db_query = db_query.filter(risk_actions::status.eq(status));
        }
        if let Some(priority) = query.priority {
            db_query = db_query.filter(risk_actions::priority.eq(priority));
        }
        if let Some(assigned_to) = query.assigned_to {
            db_query = db_query.filter(risk_actions::assigned_to.eq(assigned_to));
        }

        let rows: Vec<DbRiskAction> = db_query
            .order((
                risk_actions::due_date.asc().nulls_last(),
                risk_actions::created_at.asc(),
            ))
            .offset(offset)
            .limit(limit)
            .load(conn)?;

        let today = Utc::now().date_naive();
        Ok::<_, RiskError>(
            rows.into_iter()
                .map(|row| db_action_to_action(row, today))
                .collect(),
        )
    })
    .await?;

    Ok(Json(result))
}

#[utoipa::path(
    get,
    path = "/api/risk-actions/overdue",
    responses((status = 200, body = [RiskAction])),
    tag = "risk"
)]
pub async fn handle_list_overdue_actions(
    State(state): State<Arc<AppState>>,
    org: OrganizationContext,
) -> Result<Json<Vec<RiskAction>>, RiskError> {
    let result = run_db(&state.conn, move |conn| {
        let today = Utc::now().date_naive();
        let rows: Vec<DbRiskAction> = risk_actions::table
            .filter(risk_actions::org_id.eq(org.organization_id))
            .filter(risk_actions::status.eq_any(ActionStatus::OPEN))
            .filter(risk_actions::due_date.lt(today))
            .order(risk_actions::due_date.asc())
            .load(conn)?;
        Ok::<_, RiskError>(
            rows.into_iter()
                .map(|row| db_action_to_action(row, today))
                .collect(),
        )
    })
    .await?;

    Ok(Json(result))
}

#[utoipa::path(
    post,
    path = "/api/risk-actions",
    request_body = CreateRiskActionRequest,
    responses((status = 201, body = RiskAction), (status = 400)),
    tag = "risk"
)]
pub async fn handle_create_action(
    State(state): State<Arc<AppState>>,
    org: OrganizationContext,
    user: AuthenticatedUser,
    Json(req): Json<CreateRiskActionRequest>,
) -> Result<(StatusCode, Json<RiskAction>), RiskError> {
    if req.title.trim().is_empty() {
        return Err(RiskError::Validation("title is required".to_string()));
    }
    let progress = req.progress_percentage.unwrap_or(0);
    validate_progress(progress)?;

    let row = run_db(&state.conn, move |conn| {
        find_org_risk(conn, org.organization_id, req.risk_id)
            .optional()?
            .ok_or_else(|| RiskError::Validation(format!("Risk {} does not exist", req.risk_id)))?;

        let now = Utc::now();
        let mut row = DbRiskAction {
            id: Uuid::new_v4(),
            org_id: org.organization_id,
            risk_id: req.risk_id,
            title: req.title.trim().to_string(),
            description: req.description,
            action_type: req.action_type.unwrap_or(ActionType::Corrective),
            assigned_to: req.assigned_to,
            status: ActionStatus::Planned,
            priority: req.priority.unwrap_or(ActionPriority::Medium),
            progress_percentage: 0,
            start_date: req.start_date,
            due_date: req.due_date,
            completed_date: None,
            notes: req.notes,
            created_at: now,
            updated_at: now,
        };
        if progress > 0 {
            apply_progress(&mut row, progress, now.date_naive())?;
        }

        diesel::insert_into(risk_actions::table)
            .values(&row)
            .execute(conn)?;
        Ok::<_, RiskError>(row)
    })
    .await?;

    if let Some(assignee) = row.assigned_to {
        spawn_notification(
            state.clone(),
            NotificationEvent::Assigned {
                subject: subject_for(&row),
                assignee,
                assigned_by: user.user_id,
            },
        );
    }

    Ok((
        StatusCode::CREATED,
        Json(db_action_to_action(row, Utc::now().date_naive())),
    ))
}

#[utoipa::path(
    get,
    path = "/api/risk-actions/{id}",
    params(("id" = Uuid, Path, description = "Risk action ID")),
    responses((status = 200, body = RiskAction), (status = 404)),
    tag = "risk"
)]
pub async fn handle_get_action(
    State(state): State<Arc<AppState>>,
    org: OrganizationContext,
    Path(action_id): Path<Uuid>,
) -> Result<Json<RiskAction>, RiskError> {
    let row = run_db(&state.conn, move |conn| {
        find_org_action(conn, org.organization_id, action_id)
            .optional()?
            .ok_or_else(|| RiskError::NotFound("Risk action not found".to_string()))
    })
    .await?;

    Ok(Json(db_action_to_action(row, Utc::now().date_naive())))
}

#[utoipa::path(
    put,
    path = "/api/risk-actions/{id}",
    params(("id" = Uuid, Path, description = "Risk action ID")),
    request_body = UpdateRiskActionRequest,
    responses((status = 200, body = RiskAction), (status = 400), (status = 404), (status = 409)),
    tag = "risk"
)]
pub async fn handle_update_action(
    State(state): State<Arc<AppState>>,
    org: OrganizationContext,
    user: AuthenticatedUser,
    Path(action_id): Path<Uuid>,
    Json(req): Json<UpdateRiskActionRequest>,
) -> Result<Json<RiskAction>, RiskError> {
    if req.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
        return Err(RiskError::Validation("title cannot be empty".to_string()));
    }
    if let Some(progress) = req.progress_percentage {
        validate_progress(progress)?;
    }

    let (row, previous_status, previous_assignee) = run_db(&state.conn, move |conn| {
        let mut row = find_org_action(conn, org.organization_id, action_id)
            .optional()?
            .ok_or_else(|| RiskError::NotFound("Risk action not found".to_string()))?;
        let previous_status = row.status;
        let previous_assignee = row.assigned_to;
        let today = Utc::now().date_naive();

        if let Some(title) = req.title {
            row.title = title.trim().to_string();
        }
        if let Some(description) = req.description {
            row.description = Some(description);
        }
        if let Some(action_type) = req.action_type {
            row.action_type = action_type;
        }
        if let Some(assigned_to) = req.assigned_to {
            row.assigned_to = Some(assigned_to);
        }
        if let Some(priority) = req.priority {
            row.priority = priority;
        }
        if let Some(date) = req.start_date {
            row.start_date = Some(date);
        }
        if let Some(date) = req.due_date {
            row.due_date = Some(date);
        }
        if let Some(notes) = req.notes {
            row.notes = Some(notes);
        }
        if let Some(status) = req.status {
            apply_status(&mut row, status, today)?;
        }
        if let Some(progress) = req.progress_percentage {
            if row.status.is_open() {
                apply_progress(&mut row, progress, today)?;
            } else if row.status == ActionStatus::Completed && progress != 100 {
                return Err(RiskError::Validation(
                    "A completed action must stay at 100% progress".to_string(),
                ));
            }
        }
        row.updated_at = Utc::now();

        save_action(conn, &row)?;
        Ok::<_, RiskError>((row, previous_status, previous_assignee))
    })
    .await?;

    if row.assigned_to.is_some() && row.assigned_to != previous_assignee {
        if let Some(assignee) = row.assigned_to {
            spawn_notification(
                state.clone(),
                NotificationEvent::Assigned {
                    subject: subject_for(&row),
                    assignee,
                    assigned_by: user.user_id,
                },
            );
        }
    }
    notify_status_change(&state, &row, previous_status, user);

    Ok(Json(db_action_to_action(row, Utc::now().date_naive())))
}

#[utoipa::path(
    delete,
    path = "/api/risk-actions/{id}",
    params(("id" = Uuid, Path, description = "Risk action ID")),
    responses((status = 204), (status = 404)),
    tag = "risk"
)]
pub async fn handle_delete_action(
    State(state): State<Arc<AppState>>,
    org: OrganizationContext,
    Path(action_id): Path<Uuid>,
) -> Result<StatusCode, RiskError> {
    let deleted = run_db(&state.conn, move |conn| {
        Ok::<_, RiskError>(
            diesel::delete(
                risk_actions::table
                    .filter(risk_actions::id.eq(action_id))
                    .filter(risk_actions::org_id.eq(org.organization_id)),
            )
            .execute(conn)?,
        )
    })
    .await?;

    if deleted == 0 {
        return Err(RiskError::NotFound("Risk action not found".to_string()));
    }
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/api/risk-actions/{id}/progress",
    params(("id" = Uuid, Path, description = "Risk action ID")),
    request_body = UpdateProgressRequest,
    responses((status = 200, body = RiskAction), (status = 400), (status = 404), (status = 409)),
    tag = "risk"
)]
pub async fn handle_update_action_progress(
    State(state): State<Arc<AppState>>,
    org: OrganizationContext,
    user: AuthenticatedUser,
    Path(action_id): Path<Uuid>,
    Json(req): Json<UpdateProgressRequest>,
) -> Result<Json<RiskAction>, RiskError> {
    validate_progress(req.progress_percentage)?;

    let (row, previous) = run_db(&state.conn, move |conn| {
        let mut row = find_org_action(conn, org.organization_id, action_id)
            .optional()?
            .ok_or_else(|| RiskError::NotFound("Risk action not found".to_string()))?;
        let previous = apply_progress(&mut row, req.progress_percentage, Utc::now().date_naive())?;
        if let Some(notes) = req.notes {
            row.notes = Some(notes);
        }
        row.updated_at = Utc::now();
        save_action(conn, &row)?;
        Ok::<_, RiskError>((row, previous))
    })
    .await?;

    notify_status_change(&state, &row, previous, user);
    Ok(Json(db_action_to_action(row, Utc::now().date_naive())))
}
