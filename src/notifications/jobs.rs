use chrono::{Datelike, NaiveDate, Utc};
use diesel::QueryResult;
use log::{error, info, warn};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

use crate::shared::state::AppState;
use crate::shared::utils::run_db;

use super::error::NotificationError;
use super::mailer::OutgoingEmail;
use super::reminders::{
    classify_reminder, DispatchOutcome, PgReminderLedger, ReminderDispatcher, ReminderKey,
};
use super::storage::{enabled_configurations, load_due_items, DbReminderConfiguration, DbUser};
use super::templates::{digest_email, reminder_email, DigestContent};
use super::types::{DueItem, Recipient};

/// Run date from a job payload `{"date": "YYYY-MM-DD"}`, defaulting to today (UTC).
pub fn payload_date(payload: &Value) -> NaiveDate {
    payload
        .get("date")
        .and_then(Value::as_str)
        .and_then(|raw| NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok())
        .unwrap_or_else(|| Utc::now().date_naive())
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReminderRunSummary {
    pub date: Option<NaiveDate>,
    pub users: usize,
    pub sent: usize,
    pub already_sent: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl ReminderRunSummary {
    fn for_date(date: NaiveDate) -> Self {
        Self {
            date: Some(date),
            ..Default::default()
        }
    }

    fn count(&mut self, outcome: &DispatchOutcome) {
        match outcome {
            DispatchOutcome::Sent => self.sent += 1,
            DispatchOutcome::AlreadySent => self.already_sent += 1,
            DispatchOutcome::Failed(_) => self.failed += 1,
        }
    }
}

/// A reminder worth sending for one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedReminder {
    pub key: ReminderKey,
    pub item: DueItem,
    pub days_until_due: i64,
}

pub fn plan_reminders(
    config: &DbReminderConfiguration,
    items: &[DueItem],
    today: NaiveDate,
) -> Vec<PlannedReminder> {
    items
        .iter()
        .filter_map(|item| {
            let days_until_due = item.days_until_due(today);
            classify_reminder(days_until_due, config).map(|(reminder_type, days_offset)| {
                PlannedReminder {
                    key: ReminderKey {
                        org_id: config.org_id,
                        user_id: config.user_id,
                        entity_type: item.entity_type,
                        entity_id: item.entity_id,
                        reminder_type,
                        days_offset,
                    },
                    item: item.clone(),
                    days_until_due,
                }
            })
        })
        .collect()
}

/// 0 = Monday, matching `digest_weekday`.
pub fn weekday_index(date: NaiveDate) -> i32 {
    date.weekday().num_days_from_monday() as i32
}

/// Reminders for one recipient, planned before anything is sent.
#[derive(Debug, Clone)]
pub struct RecipientBatch {
    pub recipient: Recipient,
    pub reminders: Vec<PlannedReminder>,
}

/// Plans the daily reminders for every configuration. A user whose items
/// cannot be loaded is counted as failed and the run moves on.
pub fn plan_daily_batches<F>(
    configurations: Vec<(DbReminderConfiguration, DbUser)>,
    today: NaiveDate,
    mut load_items: F,
) -> (Vec<RecipientBatch>, ReminderRunSummary)
where
    F: FnMut(&DbReminderConfiguration) -> QueryResult<Vec<DueItem>>,
{
    let mut summary = ReminderRunSummary::for_date(today);
    let mut batches = Vec::new();

    for (config, user) in configurations {
        summary.users += 1;
        let items = match load_items(&config) {
            Ok(items) => items,
            Err(e) => {
                error!("Loading due items for user {} failed: {e}", config.user_id);
                summary.failed += 1;
                continue;
            }
        };
        let reminders = plan_reminders(&config, &items, today);
        summary.skipped += items.len() - reminders.len();
        if !reminders.is_empty() {
            batches.push(RecipientBatch {
                recipient: Recipient::from(user),
                reminders,
            });
        }
    }
    (batches, summary)
}

/// Builds one digest per user whose digest day is `today`; same failure
/// handling as [`plan_daily_batches`].
pub fn plan_digests<F>(
    configurations: Vec<(DbReminderConfiguration, DbUser)>,
    today: NaiveDate,
    base_url: &str,
    mut load_items: F,
) -> (Vec<(ReminderKey, OutgoingEmail)>, ReminderRunSummary)
where
    F: FnMut(&DbReminderConfiguration) -> QueryResult<Vec<DueItem>>,
{
    let weekday = weekday_index(today);
    let mut summary = ReminderRunSummary::for_date(today);
    let mut digests = Vec::new();

    for (config, user) in configurations {
        if !config.weekly_digest_enabled || config.digest_weekday != weekday {
            continue;
        }
        summary.users += 1;
        let items = match load_items(&config) {
            Ok(items) => items,
            Err(e) => {
                error!("Loading digest items for user {} failed: {e}", config.user_id);
                summary.failed += 1;
                continue;
            }
        };
        let digest = DigestContent::from_items(items, today);
        if digest.is_empty() {
            summary.skipped += 1;
            continue;
        }
        let recipient = Recipient::from(user);
        let email = digest_email(&recipient, &digest, today, base_url);
        digests.push((ReminderKey::digest(config.org_id, config.user_id, today), email));
    }
    (digests, summary)
}

pub async fn send_planned(
    dispatcher: &ReminderDispatcher,
    batch: &RecipientBatch,
    today: NaiveDate,
    base_url: &str,
    summary: &mut ReminderRunSummary,
) {
    for reminder in &batch.reminders {
        let email = reminder_email(
            &batch.recipient,
            &reminder.item,
            reminder.key.reminder_type,
            reminder.days_until_due,
            base_url,
        );
        let outcome = dispatcher.dispatch(&reminder.key, today, &email).await;
        if let DispatchOutcome::Failed(e) = &outcome {
            warn!(
                "{} reminder for {} {} failed: {e}",
                reminder.key.reminder_type, reminder.item.entity_type, reminder.item.entity_id
            );
        }
        summary.count(&outcome);
    }
}

fn dispatcher_for(state: &AppState) -> ReminderDispatcher {
    ReminderDispatcher::new(
        state.mailer.clone(),
        Arc::new(PgReminderLedger::new(state.conn.clone())),
        state.config.email.retry_policy(),
    )
}

/// Sends every advance, due-today and overdue reminder due on `today`.
///
/// Planning holds one pooled connection and releases it before the first
/// email goes out; the ledger then checks connections out per reminder.
pub async fn run_daily_reminders(
    state: Arc<AppState>,
    today: NaiveDate,
) -> Result<ReminderRunSummary, NotificationError> {
    let base_url = state.base_url().to_string();
    let (batches, mut summary) = run_db(&state.conn, move |conn| {
        let configurations = enabled_configurations(conn)?;
        Ok::<_, NotificationError>(plan_daily_batches(configurations, today, |config| {
            load_due_items(conn, config)
        }))
    })
    .await?;

    let dispatcher = dispatcher_for(&state);
    for batch in &batches {
        send_planned(&dispatcher, batch, today, &base_url, &mut summary).await;
    }

    info!(
        "Daily reminders for {today}: {} users, {} sent, {} already sent, {} failed",
        summary.users, summary.sent, summary.already_sent, summary.failed
    );
    Ok(summary)
}

/// Sends the weekly digest to users whose digest weekday is `today`.
pub async fn run_weekly_digest(
    state: Arc<AppState>,
    today: NaiveDate,
) -> Result<ReminderRunSummary, NotificationError> {
    let base_url = state.base_url().to_string();
    let (digests, mut summary) = run_db(&state.conn, move |conn| {
        let configurations = enabled_configurations(conn)?;
        Ok::<_, NotificationError>(plan_digests(configurations, today, &base_url, |config| {
            load_due_items(conn, config)
        }))
    })
    .await?;

    let dispatcher = dispatcher_for(&state);
    for (key, email) in &digests {
        summary.count(&dispatcher.dispatch(key, today, email).await);
    }

    info!(
        "Weekly digest for {today}: {} users, {} sent, {} already sent, {} failed, {} empty",
        summary.users, summary.sent, summary.already_sent, summary.failed, summary.skipped
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifications::mailer::RecordingMailer;
    use crate::notifications::reminders::InMemoryReminderLedger;
    use crate::notifications::types::{EntityType, ReminderType};
    use crate::tasks::RetryPolicy;
    use diesel::result::Error as DieselError;
    use uuid::Uuid;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 6, 10).unwrap()
    }

    fn item(days: i64) -> DueItem {
        DueItem {
            entity_type: EntityType::RiskAction,
            entity_id: Uuid::new_v4(),
            org_id: Uuid::nil(),
            title: format!("due in {days}"),
            status: "planned".into(),
            due_date: today() + chrono::Duration::days(days),
        }
    }

    #[test]
    fn test_payload_date() {
        assert_eq!(
            payload_date(&serde_json::json!({ "date": "2026-06-10" })),
            today()
        );
        assert_eq!(
            payload_date(&serde_json::json!({ "date": "not a date" })),
            Utc::now().date_naive()
        );
    }

    #[test]
    fn test_weekday_index_starts_monday() {
        let monday = NaiveDate::from_ymd_opt(2026, 6, 8).unwrap();
        assert_eq!(weekday_index(monday), 0);
        assert_eq!(weekday_index(monday + chrono::Duration::days(6)), 6);
    }

    #[test]
    fn test_plan_reminders_filters_by_schedule() {
        let config = DbReminderConfiguration::defaults(Uuid::nil(), Uuid::nil());
        let items = vec![item(7), item(5), item(0), item(-2)];
        let planned = plan_reminders(&config, &items, today());
        let types: Vec<_> = planned.iter().map(|p| p.key.reminder_type).collect();
        assert_eq!(
            types,
            vec![
                ReminderType::Advance,
                ReminderType::DueToday,
                ReminderType::Overdue
            ]
        );
        assert_eq!(planned[2].key.days_offset, -2);
    }

    fn user(email: &str) -> DbUser {
        DbUser {
            id: Uuid::new_v4(),
            org_id: Uuid::nil(),
            email: email.into(),
            display_name: None,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    fn entry(email: &str) -> (DbReminderConfiguration, DbUser) {
        let user = user(email);
        (DbReminderConfiguration::defaults(user.org_id, user.id), user)
    }

    #[tokio::test]
    async fn test_second_run_sends_nothing_new() {
        let (batches, _) = plan_daily_batches(vec![entry("owner@example.com")], today(), |_| {
            Ok(vec![item(3), item(0)])
        });
        let mailer = Arc::new(RecordingMailer::new());
        let ledger = Arc::new(InMemoryReminderLedger::new());
        let dispatcher = ReminderDispatcher::new(mailer.clone(), ledger, RetryPolicy::no_retry());

        let mut first = ReminderRunSummary::default();
        send_planned(&dispatcher, &batches[0], today(), "http://x", &mut first).await;
        let mut second = ReminderRunSummary::default();
        send_planned(&dispatcher, &batches[0], today(), "http://x", &mut second).await;

        assert_eq!(first.sent, 2);
        assert_eq!(second.sent, 0);
        assert_eq!(second.already_sent, 2);
        assert_eq!(mailer.sent().len(), 2);
    }

    #[test]
    fn test_failing_user_does_not_stop_the_run() {
        let entries = vec![
            entry("first@example.com"),
            entry("broken@example.com"),
            entry("last@example.com"),
        ];
        let broken = entries[1].0.user_id;

        let (batches, summary) = plan_daily_batches(entries, today(), |config| {
            if config.user_id == broken {
                Err(DieselError::BrokenTransactionManager)
            } else {
                Ok(vec![item(0)])
            }
        });

        assert_eq!(summary.users, 3);
        assert_eq!(summary.failed, 1);
        let recipients: Vec<_> = batches.iter().map(|b| b.recipient.email.as_str()).collect();
        assert_eq!(recipients, vec!["first@example.com", "last@example.com"]);
    }

    #[test]
    fn test_digest_planning_skips_failures_and_other_weekdays() {
        let mut other_day = entry("tuesday@example.com");
        other_day.0.digest_weekday = (weekday_index(today()) + 1) % 7;
        let mut due_today = vec![
            entry("ok@example.com"),
            entry("broken@example.com"),
            entry("empty@example.com"),
            other_day,
        ];
        for (config, _) in due_today.iter_mut().take(3) {
            config.digest_weekday = weekday_index(today());
        }
        let broken = due_today[1].0.user_id;
        let empty = due_today[2].0.user_id;

        let (digests, summary) = plan_digests(due_today, today(), "http://x", |config| {
            if config.user_id == broken {
                Err(DieselError::NotFound)
            } else if config.user_id == empty {
                Ok(Vec::new())
            } else {
                Ok(vec![item(-1), item(2)])
            }
        });

        assert_eq!(summary.users, 3);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(digests.len(), 1);
        assert_eq!(digests[0].1.to, "ok@example.com");
        assert_eq!(digests[0].0.reminder_type, ReminderType::WeeklyDigest);
    }
}
