use async_trait::async_trait;
use chrono::{Datelike, NaiveDate, Utc};
use diesel::prelude::*;
use log::{debug, error, warn};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::core::shared::schema::reminder_logs;
use crate::shared::utils::{run_db, DbPool};
use crate::tasks::RetryPolicy;

use super::error::NotificationError;
use super::mailer::{send_with_retry, Mailer, OutgoingEmail};
use super::storage::{DbReminderConfiguration, DbReminderLog};
use super::types::{EntityType, ReminderType};

/// Decides which reminder, if any, is due for an item `days_until_due` days away.
/// Returns the reminder type and the offset it is deduplicated on.
pub fn classify_reminder(
    days_until_due: i64,
    config: &DbReminderConfiguration,
) -> Option<(ReminderType, i32)> {
    let days = i32::try_from(days_until_due).ok()?;
    match days {
        0 => Some((ReminderType::DueToday, 0)),
        d if d > 0 => config
            .days_before_due
            .contains(&d)
            .then_some((ReminderType::Advance, d)),
        d => {
            let interval = config.overdue_interval_days.max(1);
            (config.send_overdue && (-d) % interval == 0).then_some((ReminderType::Overdue, d))
        }
    }
}

/// Identity of one sent reminder.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ReminderKey {
    pub org_id: Uuid,
    pub user_id: Uuid,
    pub entity_type: EntityType,
    pub entity_id: Uuid,
    pub reminder_type: ReminderType,
    pub days_offset: i32,
}

impl ReminderKey {
    /// Digests are keyed on the calendar day they were sent.
    pub fn digest(org_id: Uuid, user_id: Uuid, sent_date: NaiveDate) -> Self {
        Self {
            org_id,
            user_id,
            entity_type: EntityType::Digest,
            entity_id: user_id,
            reminder_type: ReminderType::WeeklyDigest,
            days_offset: sent_date.num_days_from_ce(),
        }
    }
}

/// Record of reminders already sent.
#[async_trait]
pub trait ReminderLedger: Send + Sync {
    async fn already_sent(&self, key: &ReminderKey) -> Result<bool, NotificationError>;

    /// Returns false when another sender recorded the same key first.
    async fn record(
        &self,
        key: &ReminderKey,
        sent_date: NaiveDate,
    ) -> Result<bool, NotificationError>;
}

/// Ledger over `reminder_logs`. Every call checks a connection out for
/// that query alone, so callers must not be holding one from the same pool.
pub struct PgReminderLedger {
    pool: DbPool,
}

impl PgReminderLedger {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn reminder_logged(conn: &mut PgConnection, key: &ReminderKey) -> QueryResult<bool> {
    diesel::select(diesel::dsl::exists(
        reminder_logs::table
            .filter(reminder_logs::entity_type.eq(key.entity_type))
            .filter(reminder_logs::entity_id.eq(key.entity_id))
            .filter(reminder_logs::user_id.eq(key.user_id))
            .filter(reminder_logs::reminder_type.eq(key.reminder_type))
            .filter(reminder_logs::days_offset.eq(key.days_offset)),
    ))
    .get_result(conn)
}

fn log_reminder(
    conn: &mut PgConnection,
    key: &ReminderKey,
    sent_date: NaiveDate,
) -> QueryResult<bool> {
    let row = DbReminderLog {
        id: Uuid::new_v4(),
        org_id: key.org_id,
        user_id: key.user_id,
        entity_type: key.entity_type,
        entity_id: key.entity_id,
        reminder_type: key.reminder_type,
        days_offset: key.days_offset,
        sent_date,
        sent_at: Utc::now(),
    };
    let inserted = diesel::insert_into(reminder_logs::table)
        .values(&row)
        .on_conflict_do_nothing()
        .execute(conn)?;
    Ok(inserted == 1)
}

#[async_trait]
impl ReminderLedger for PgReminderLedger {
    async fn already_sent(&self, key: &ReminderKey) -> Result<bool, NotificationError> {
        let key = key.clone();
        run_db(&self.pool, move |conn| {
            reminder_logged(conn, &key).map_err(NotificationError::from)
        })
        .await
    }

    async fn record(
        &self,
        key: &ReminderKey,
        sent_date: NaiveDate,
    ) -> Result<bool, NotificationError> {
        let key = key.clone();
        run_db(&self.pool, move |conn| {
            log_reminder(conn, &key, sent_date).map_err(NotificationError::from)
        })
        .await
    }
}

#[derive(Debug, Default)]
pub struct InMemoryReminderLedger {
    sent: Mutex<HashSet<ReminderKey>>,
}

impl InMemoryReminderLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sent.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ReminderLedger for InMemoryReminderLedger {
    async fn already_sent(&self, key: &ReminderKey) -> Result<bool, NotificationError> {
        let sent = self
            .sent
            .lock()
            .map_err(|_| NotificationError::Internal("reminder ledger poisoned".to_string()))?;
        Ok(sent.contains(key))
    }

    async fn record(
        &self,
        key: &ReminderKey,
        _sent_date: NaiveDate,
    ) -> Result<bool, NotificationError> {
        let mut sent = self
            .sent
            .lock()
            .map_err(|_| NotificationError::Internal("reminder ledger poisoned".to_string()))?;
        Ok(sent.insert(key.clone()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "error", rename_all = "snake_case")]
pub enum DispatchOutcome {
    Sent,
    AlreadySent,
    Failed(String),
}

/// Sends a reminder at most once per key.
#[derive(Clone)]
pub struct ReminderDispatcher {
    mailer: Arc<dyn Mailer>,
    ledger: Arc<dyn ReminderLedger>,
    retry: RetryPolicy,
}

impl ReminderDispatcher {
    pub fn new(mailer: Arc<dyn Mailer>, ledger: Arc<dyn ReminderLedger>, retry: RetryPolicy) -> Self {
        Self {
            mailer,
            ledger,
            retry,
        }
    }

    pub async fn dispatch(
        &self,
        key: &ReminderKey,
        sent_date: NaiveDate,
        email: &OutgoingEmail,
    ) -> DispatchOutcome {
        match self.ledger.already_sent(key).await {
            Ok(true) => {
                debug!(
                    "Skipping {} reminder for {} {}: already sent",
                    key.reminder_type, key.entity_type, key.entity_id
                );
                return DispatchOutcome::AlreadySent;
            }
            Ok(false) => {}
            Err(e) => {
                error!("Reminder ledger lookup failed: {e}");
                return DispatchOutcome::Failed(e.to_string());
            }
        }

        let label = format!("{} reminder to {}", key.reminder_type, email.to);
        if let Err(e) = send_with_retry(&self.mailer, self.retry, &label, email).await {
            return DispatchOutcome::Failed(e.to_string());
        }

        match self.ledger.record(key, sent_date).await {
            Ok(true) => {}
            Ok(false) => warn!(
                "{} reminder for {} {} was recorded concurrently",
                key.reminder_type, key.entity_type, key.entity_id
            ),
            Err(e) => error!("Reminder sent to {} but could not be logged: {e}", email.to),
        }
        DispatchOutcome::Sent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifications::mailer::RecordingMailer;

    fn config() -> DbReminderConfiguration {
        DbReminderConfiguration::defaults(Uuid::new_v4(), Uuid::new_v4())
    }

    fn key(days_offset: i32) -> ReminderKey {
        ReminderKey {
            org_id: Uuid::nil(),
            user_id: Uuid::nil(),
            entity_type: EntityType::RiskAction,
            entity_id: Uuid::nil(),
            reminder_type: ReminderType::Advance,
            days_offset,
        }
    }

    fn email() -> OutgoingEmail {
        OutgoingEmail {
            to: "owner@example.com".into(),
            subject: "Reminder".into(),
            html: String::new(),
            text: String::new(),
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 6, 1).unwrap()
    }

    #[test]
    fn test_classify_advance_only_on_configured_days() {
        let config = config();
        assert_eq!(
            classify_reminder(7, &config),
            Some((ReminderType::Advance, 7))
        );
        assert_eq!(classify_reminder(5, &config), None);
        assert_eq!(
            classify_reminder(1, &config),
            Some((ReminderType::Advance, 1))
        );
    }

    #[test]
    fn test_classify_due_today() {
        assert_eq!(
            classify_reminder(0, &config()),
            Some((ReminderType::DueToday, 0))
        );
    }

    #[test]
    fn test_classify_overdue_interval() {
        let mut config = config();
        config.overdue_interval_days = 3;
        assert_eq!(
            classify_reminder(-3, &config),
            Some((ReminderType::Overdue, -3))
        );
        assert_eq!(classify_reminder(-4, &config), None);
        assert_eq!(
            classify_reminder(-6, &config),
            Some((ReminderType::Overdue, -6))
        );

        config.send_overdue = false;
        assert_eq!(classify_reminder(-3, &config), None);
    }

    #[tokio::test]
    async fn test_dispatch_sends_once_per_key() {
        let mailer = Arc::new(RecordingMailer::new());
        let ledger = Arc::new(InMemoryReminderLedger::new());
        let dispatcher =
            ReminderDispatcher::new(mailer.clone(), ledger.clone(), RetryPolicy::no_retry());

        assert_eq!(
            dispatcher.dispatch(&key(3), today(), &email()).await,
            DispatchOutcome::Sent
        );
        assert_eq!(
            dispatcher.dispatch(&key(3), today(), &email()).await,
            DispatchOutcome::AlreadySent
        );
        assert_eq!(
            dispatcher.dispatch(&key(1), today(), &email()).await,
            DispatchOutcome::Sent
        );
        assert_eq!(mailer.sent().len(), 2);
        assert_eq!(ledger.len(), 2);
    }

    #[tokio::test]
    async fn test_dispatch_retries_then_fails_without_logging() {
        let mailer = Arc::new(RecordingMailer::failing(5));
        let ledger = Arc::new(InMemoryReminderLedger::new());
        let retry = RetryPolicy::new(2, std::time::Duration::ZERO);
        let dispatcher = ReminderDispatcher::new(mailer, ledger.clone(), retry);

        assert!(matches!(
            dispatcher.dispatch(&key(7), today(), &email()).await,
            DispatchOutcome::Failed(_)
        ));
        assert!(ledger.is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_recovers_within_retry_budget() {
        let mailer = Arc::new(RecordingMailer::failing(1));
        let ledger = Arc::new(InMemoryReminderLedger::new());
        let retry = RetryPolicy::new(3, std::time::Duration::ZERO);
        let dispatcher = ReminderDispatcher::new(mailer.clone(), ledger, retry);

        assert_eq!(
            dispatcher.dispatch(&key(7), today(), &email()).await,
            DispatchOutcome::Sent
        );
        assert_eq!(mailer.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_dispatch_over_single_connection_pool() {
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

        let org = Uuid::new_v4();
        let user = Uuid::new_v4();
        let seed = format!(
            "INSERT INTO organizations (id, name, slug) VALUES ('{org}', 'Ledger test', '{org}');
             INSERT INTO users (id, org_id, email) VALUES ('{user}', '{org}', 'owner@example.com');"
        );
        run_db(&pool, move |conn| {
            conn.batch_execute(&seed).map_err(NotificationError::from)
        })
        .await
        .unwrap();

        let reminder = ReminderKey {
            org_id: org,
            user_id: user,
            ..key(3)
        };
        let mailer = Arc::new(RecordingMailer::new());
        let ledger = Arc::new(PgReminderLedger::new(pool.clone()));
        let dispatcher = ReminderDispatcher::new(mailer.clone(), ledger, RetryPolicy::no_retry());

        assert_eq!(
            dispatcher.dispatch(&reminder, today(), &email()).await,
            DispatchOutcome::Sent
        );
        assert_eq!(
            dispatcher.dispatch(&reminder, today(), &email()).await,
            DispatchOutcome::AlreadySent
        );
        assert_eq!(mailer.sent().len(), 1);

        let cleanup = format!("DELETE FROM organizations WHERE id = '{org}'");
        run_db(&pool, move |conn| {
            conn.batch_execute(&cleanup).map_err(NotificationError::from)
        })
        .await
        .unwrap();
    }

    #[test]
    fn test_digest_key_is_per_day() {
        let org = Uuid::new_v4();
        let user = Uuid::new_v4();
        let monday = ReminderKey::digest(org, user, today());
        let next = ReminderKey::digest(org, user, today() + chrono::Duration::days(7));
        assert_ne!(monday, next);
        assert_eq!(monday, ReminderKey::digest(org, user, today()));
    }
}
