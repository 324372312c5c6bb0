use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::catalogs::storage::DbAssessment;
use crate::catalogs::types::AssessmentStatus;
use crate::core::shared::schema::{
    control_assessments, controls, reminder_configurations, reminder_logs, risk_actions, users,
};
use crate::risk::storage::DbRiskAction;
use crate::risk::types::ActionStatus;

use super::types::{
    DueItem, EntityType, Recipient, ReminderConfiguration, ReminderLogEntry, ReminderType,
    DEFAULT_DAYS_BEFORE_DUE,
};

#[derive(Debug, Clone, Queryable, Insertable, AsChangeset, Serialize, Deserialize)]
#[diesel(table_name = reminder_configurations)]
pub struct DbReminderConfiguration {
    pub id: Uuid,
    pub org_id: Uuid,
    pub user_id: Uuid,
    pub enabled: bool,
    pub days_before_due: Vec<i32>,
    pub send_overdue: bool,
    pub overdue_interval_days: i32,
    pub weekly_digest_enabled: bool,
    pub digest_weekday: i32,
    pub include_assessments: bool,
    pub include_risk_actions: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DbReminderConfiguration {
    /// Settings used for a user who never saved any.
    pub fn defaults(org_id: Uuid, user_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            org_id,
            user_id,
            enabled: true,
            days_before_due: DEFAULT_DAYS_BEFORE_DUE.to_vec(),
            send_overdue: true,
            overdue_interval_days: 1,
            weekly_digest_enabled: true,
            digest_weekday: 0,
            include_assessments: true,
            include_risk_actions: true,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Queryable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = reminder_logs)]
pub struct DbReminderLog {
    pub id: Uuid,
    pub org_id: Uuid,
    pub user_id: Uuid,
    pub entity_type: EntityType,
    pub entity_id: Uuid,
    pub reminder_type: ReminderType,
    pub days_offset: i32,
    pub sent_date: NaiveDate,
    pub sent_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Serialize, Deserialize)]
#[diesel(table_name = users)]
pub struct DbUser {
    pub id: Uuid,
    pub org_id: Uuid,
    pub email: String,
    pub display_name: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<DbUser> for Recipient {
    fn from(user: DbUser) -> Self {
        Self {
            user_id: user.id,
            org_id: user.org_id,
            email: user.email,
            display_name: user.display_name,
        }
    }
}

pub fn db_config_to_config(db: DbReminderConfiguration, persisted: bool) -> ReminderConfiguration {
    ReminderConfiguration {
        id: persisted.then_some(db.id),
        org_id: db.org_id,
        user_id: db.user_id,
        enabled: db.enabled,
        days_before_due: db.days_before_due,
        send_overdue: db.send_overdue,
        overdue_interval_days: db.overdue_interval_days,
        weekly_digest_enabled: db.weekly_digest_enabled,
        digest_weekday: db.digest_weekday,
        include_assessments: db.include_assessments,
        include_risk_actions: db.include_risk_actions,
        persisted,
        updated_at: persisted.then_some(db.updated_at),
    }
}

pub fn db_log_to_entry(db: DbReminderLog) -> ReminderLogEntry {
    ReminderLogEntry {
        id: db.id,
        user_id: db.user_id,
        entity_type: db.entity_type,
        entity_id: db.entity_id,
        reminder_type: db.reminder_type,
        days_offset: db.days_offset,
        sent_date: db.sent_date,
        sent_at: db.sent_at,
    }
}

pub fn find_org_user(
    conn: &mut PgConnection,
    org_id: Uuid,
    user_id: Uuid,
) -> QueryResult<Option<DbUser>> {
    users::table
        .filter(users::id.eq(user_id))
        .filter(users::org_id.eq(org_id))
        .first(conn)
        .optional()
}

pub fn find_active_recipient(
    conn: &mut PgConnection,
    org_id: Uuid,
    user_id: Uuid,
) -> QueryResult<Option<Recipient>> {
    Ok(find_org_user(conn, org_id, user_id)?
        .filter(|u| u.is_active)
        .map(Recipient::from))
}

pub fn load_config(
    conn: &mut PgConnection,
    user_id: Uuid,
) -> QueryResult<Option<DbReminderConfiguration>> {
    reminder_configurations::table
        .filter(reminder_configurations::user_id.eq(user_id))
        .first(conn)
        .optional()
}

/// Enabled configurations of active users, across all tenants.
pub fn enabled_configurations(
    conn: &mut PgConnection,
) -> QueryResult<Vec<(DbReminderConfiguration, DbUser)>> {
    reminder_configurations::table
        .inner_join(users::table)
        .filter(reminder_configurations::enabled.eq(true))
        .filter(users::is_active.eq(true))
        .order(reminder_configurations::created_at.asc())
        .load(conn)
}

/// Open, dated items assigned to the user that the configuration opts into.
pub fn load_due_items(
    conn: &mut PgConnection,
    config: &DbReminderConfiguration,
) -> QueryResult<Vec<DueItem>> {
    let mut items = Vec::new();

    if config.include_assessments {
        let rows: Vec<(DbAssessment, String)> = control_assessments::table
            .inner_join(controls::table)
            .filter(control_assessments::org_id.eq(config.org_id))
            .filter(control_assessments::assigned_to.eq(config.user_id))
            .filter(control_assessments::status.ne(AssessmentStatus::Completed))
            .filter(control_assessments::due_date.is_not_null())
            .select((control_assessments::all_columns, controls::name))
            .load(conn)?;
        items.extend(rows.into_iter().filter_map(|(a, control_name)| {
            a.due_date.map(|due_date| DueItem {
                entity_type: EntityType::Assessment,
                entity_id: a.id,
                org_id: a.org_id,
                title: control_name,
                status: a.status.to_string(),
                due_date,
            })
        }));
    }

    if config.include_risk_actions {
        let rows: Vec<DbRiskAction> = risk_actions::table
            .filter(risk_actions::org_id.eq(config.org_id))
            .filter(risk_actions::assigned_to.eq(config.user_id))
            .filter(risk_actions::status.eq_any(ActionStatus::OPEN))
            .filter(risk_actions::due_date.is_not_null())
            .load(conn)?;
        items.extend(rows.into_iter().filter_map(|a| {
            a.due_date.map(|due_date| DueItem {
                entity_type: EntityType::RiskAction,
                entity_id: a.id,
                org_id: a.org_id,
                title: a.title,
                status: a.status.to_string(),
                due_date,
            })
        }));
    }

    items.sort_by(|a, b| a.due_date.cmp(&b.due_date).then(a.title.cmp(&b.title)));
    Ok(items)
}
