use axum::{
    extract::{Query, State},
    Json,
};
use chrono::Utc;
use diesel::prelude::*;
use std::sync::Arc;
use uuid::Uuid;

use crate::core::middleware::{AuthenticatedUser, OrganizationContext};
use crate::core::shared::schema::{reminder_configurations, reminder_logs};
use crate::shared::state::AppState;
use crate::shared::utils::{page_bounds, run_db};

use crate::notifications::error::NotificationError;
use crate::notifications::storage::{
    db_config_to_config, db_log_to_entry, find_org_user, load_config, DbReminderConfiguration,
    DbReminderLog,
};
use crate::notifications::types::{
    normalize_days, ListReminderLogsQuery, ReminderConfiguration, ReminderLogEntry,
    UpdateReminderConfigRequest,
};

fn acting_user(user: AuthenticatedUser) -> Result<Uuid, NotificationError> {
    user.user_id.ok_or_else(|| {
        NotificationError::Validation("X-User-Id header is required for reminder settings".into())
    })
}

fn ensure_member(
    conn: &mut PgConnection,
    org_id: Uuid,
    user_id: Uuid,
) -> Result<(), NotificationError> {
    find_org_user(conn, org_id, user_id)?
        .map(|_| ())
        .ok_or_else(|| NotificationError::NotFound(format!("User {user_id} not found")))
}

#[utoipa::path(
    get,
    path = "/api/reminders/config",
    responses((status = 200, body = ReminderConfiguration), (status = 400), (status = 404)),
    tag = "notifications"
)]
pub async fn handle_get_reminder_config(
    State(state): State<Arc<AppState>>,
    org: OrganizationContext,
    user: AuthenticatedUser,
) -> Result<Json<ReminderConfiguration>, NotificationError> {
    let user_id = acting_user(user)?;

    let result = run_db(&state.conn, move |conn| {
        ensure_member(conn, org.organization_id, user_id)?;
        Ok::<_, NotificationError>(match load_config(conn, user_id)? {
            Some(row) => db_config_to_config(row, true),
            None => db_config_to_config(
                DbReminderConfiguration::defaults(org.organization_id, user_id),
                false,
            ),
        })
    })
    .await?;

    Ok(Json(result))
}

#[utoipa::path(
    put,
    path = "/api/reminders/config",
    request_body = UpdateReminderConfigRequest,
    responses((status = 200, body = ReminderConfiguration), (status = 400), (status = 404)),
    tag = "notifications"
)]
pub async fn handle_update_reminder_config(
    State(state): State<Arc<AppState>>,
    org: OrganizationContext,
    user: AuthenticatedUser,
    Json(req): Json<UpdateReminderConfigRequest>,
) -> Result<Json<ReminderConfiguration>, NotificationError> {
    let user_id = acting_user(user)?;
    req.validate()?;

    let result = run_db(&state.conn, move |conn| {
        ensure_member(conn, org.organization_id, user_id)?;
        let existing = load_config(conn, user_id)?;
        let is_new = existing.is_none();
        let mut row = existing
            .unwrap_or_else(|| DbReminderConfiguration::defaults(org.organization_id, user_id));

        if let Some(enabled) = req.enabled {
            row.enabled = enabled;
        }
        if let Some(days) = req.days_before_due {
            row.days_before_due = normalize_days(days);
        }
        if let Some(send_overdue) = req.send_overdue {
            row.send_overdue = send_overdue;
        }
        if let Some(interval) = req.overdue_interval_days {
            row.overdue_interval_days = interval;
        }
        if let Some(enabled) = req.weekly_digest_enabled {
            row.weekly_digest_enabled = enabled;
        }
        if let Some(weekday) = req.digest_weekday {
            row.digest_weekday = weekday;
        }
        if let Some(include) = req.include_assessments {
            row.include_assessments = include;
        }
        if let Some(include) = req.include_risk_actions {
            row.include_risk_actions = include;
        }
        row.updated_at = Utc::now();

        if is_new {
            diesel::insert_into(reminder_configurations::table)
                .values(&row)
                .execute(conn)?;
        } else {
            diesel::update(reminder_configurations::table.find(row.id))
                .set(&row)
                .execute(conn)?;
        }
        Ok::<_, NotificationError>(db_config_to_config(row, true))
    })
    .await?;

    Ok(Json(result))
}

#[utoipa::path(
    get,
    path = "/api/reminders/logs",
    responses((status = 200, body = [ReminderLogEntry])),
    tag = "notifications"
)]
pub async fn handle_list_reminder_logs(
    State(state): State<Arc<AppState>>,
    org: OrganizationContext,
    Query(query): Query<ListReminderLogsQuery>,
) -> Result<Json<Vec<ReminderLogEntry>>, NotificationError> {
    let result = run_db(&state.conn, move |conn| {
        let (limit, offset) = page_bounds(query.limit, query.offset);
        let mut db_query = reminder_logs::table
            .filter(reminder_logs::org_id.eq(org.organization_id))
            .into_boxed();

        if let Some(user_id) = query.user_id {
            db_query = db_query.filter(reminder_logs::user_id.eq(user_id));
        }
        if let Some(entity_type) = query.entity_type {
            db_query = db_query.filter(reminder_logs::entity_type.eq(entity_type));
        }
        if let Some(entity_id) = query.entity_id {
            db_query = db_query.filter(reminder_logs::entity_id.eq(entity_id));
        }
        if let Some(reminder_type) = query.reminder_type {
            db_query = db_query.filter(reminder_logs::reminder_type.eq(reminder_type));
        }
        if let Some(since) = query.since {
            db_query = db_query.filter(reminder_logs::sent_date.ge(since));
        }

        let rows: Vec<DbReminderLog> = db_query
            .order(reminder_logs::sent_at.desc())
            .offset(offset)
            .limit(limit)
            .load(conn)?;
        Ok::<_, NotificationError>(rows.into_iter().map(db_log_to_entry).collect())
    })
    .await?;

    Ok(Json(result))
}
