use crate::shared::state::AppState;
use chrono::{DateTime, Duration, Utc};
use cron::Schedule;

use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

pub const DAILY_REMINDERS: &str = "daily_reminders";
pub const WEEKLY_DIGEST: &str = "weekly_digest";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledTask {
    pub id: Uuid,
    pub name: String,
    pub task_type: String,
    pub cron_expression: String,
    pub payload: serde_json::Value,
    pub enabled: bool,
    pub last_run: Option<DateTime<Utc>>,
    pub next_run: DateTime<Utc>,
    pub timeout_seconds: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskExecution {
    pub id: Uuid,
    pub scheduled_task_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: String,
    pub result: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub duration_ms: Option<i64>,
}

pub type TaskError = Box<dyn std::error::Error + Send + Sync>;

pub type TaskHandler = Arc<
    dyn Fn(
            Arc<AppState>,
            serde_json::Value,
        ) -> std::pin::Pin<
            Box<dyn std::future::Future<Output = Result<serde_json::Value, TaskError>> + Send>,
        > + Send
        + Sync,
>;

const EXECUTION_HISTORY_LIMIT: usize = 200;

/// Cron-driven runner for the background jobs (reminders, digests).
#[derive(Clone)]
pub struct TaskScheduler {
    state: Arc<AppState>,
    task_registry: Arc<RwLock<HashMap<String, TaskHandler>>>,
    scheduled_tasks: Arc<RwLock<Vec<ScheduledTask>>>,
    task_executions: Arc<RwLock<Vec<TaskExecution>>>,
}

pub fn next_run_after(cron_expression: &str, after: DateTime<Utc>) -> Result<DateTime<Utc>, TaskError> {
    let schedule = Schedule::from_str(cron_expression)?;
    schedule
        .after(&after)
        .next()
        .ok_or_else(|| format!("Cron expression has no upcoming run: {cron_expression}").into())
}

impl TaskScheduler {
    pub fn new(state: Arc<AppState>) -> Self {
        Self {
            state,
            task_registry: Arc::new(RwLock::new(HashMap::new())),
            scheduled_tasks: Arc::new(RwLock::new(Vec::new())),
            task_executions: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Registers the reminder handlers and schedules them from config.
    pub async fn with_default_jobs(state: Arc<AppState>) -> Result<Self, TaskError> {
        let scheduler = Self::new(state.clone());

        scheduler
            .register_handler(
                DAILY_REMINDERS.to_string(),
                Arc::new(|state: Arc<AppState>, payload: serde_json::Value| {
                    Box::pin(async move {
                        let today = crate::notifications::jobs::payload_date(&payload);
                        let summary =
                            crate::notifications::jobs::run_daily_reminders(state, today).await?;
                        Ok(serde_json::to_value(summary)?)
                    })
                }),
            )
            .await;

        scheduler
            .register_handler(
                WEEKLY_DIGEST.to_string(),
                Arc::new(|state: Arc<AppState>, payload: serde_json::Value| {
                    Box::pin(async move {
                        let today = crate::notifications::jobs::payload_date(&payload);
                        let summary =
                            crate::notifications::jobs::run_weekly_digest(state, today).await?;
                        Ok(serde_json::to_value(summary)?)
                    })
                }),
            )
            .await;

        if state.config.reminders.enabled {
            let reminders = state.config.reminders.clone();
            scheduler
                .create_scheduled_task(
                    "Daily reminders".to_string(),
                    DAILY_REMINDERS.to_string(),
                    reminders.daily_cron,
                    serde_json::json!({}),
                )
                .await?;
            scheduler
                .create_scheduled_task(
                    "Weekly digest".to_string(),
                    WEEKLY_DIGEST.to_string(),
                    reminders.digest_cron,
                    serde_json::json!({}),
                )
                .await?;
        } else {
            info!("Reminder jobs disabled by configuration");
        }

        Ok(scheduler)
    }

    pub async fn register_handler(&self, task_type: String, handler: TaskHandler) {
        let mut registry = self.task_registry.write().await;
        registry.insert(task_type, handler);
    }

    pub async fn create_scheduled_task(
        &self,
        name: String,
        task_type: String,
        cron_expression: String,
        payload: serde_json::Value,
    ) -> Result<ScheduledTask, TaskError> {
        let now = Utc::now();
        let next_run = next_run_after(&cron_expression, now)?;

        let task = ScheduledTask {
            id: Uuid::new_v4(),
            name,
            task_type,
            cron_expression,
            payload,
            enabled: true,
            last_run: None,
            next_run,
            timeout_seconds: 1800,
            created_at: now,
            updated_at: now,
        };

        let mut tasks = self.scheduled_tasks.write().await;
        tasks.push(task.clone());

        info!(
            "Created scheduled task: {} ({}) next run {}",
            task.name, task.id, task.next_run
        );
        Ok(task)
    }

    pub async fn start(&self) {
        info!("Starting task scheduler");
        let scheduler = self.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(30));

            loop {
                interval.tick().await;
                scheduler.check_and_run_tasks(Utc::now()).await;
            }
        });
    }

    /// Runs every enabled task whose `next_run` has passed, then advances it.
    pub async fn check_and_run_tasks(&self, now: DateTime<Utc>) -> usize {
        let due_tasks: Vec<ScheduledTask> = {
            let tasks = self.scheduled_tasks.read().await;
            tasks
                .iter()
                .filter(|t| t.enabled && t.next_run <= now)
                .cloned()
                .collect()
        };

        let count = due_tasks.len();
        for task in due_tasks {
            info!("Running scheduled task: {} ({})", task.name, task.id);
            let execution = self.execute_task(&task).await;
            self.advance_task(task.id, now).await;
            self.record_execution(execution).await;
        }
        count
    }

    async fn execute_task(&self, task: &ScheduledTask) -> TaskExecution {
        let started_at = Utc::now();
        let handler = {
            let handlers = self.task_registry.read().await;
            handlers.get(&task.task_type).cloned()
        };

        let result = match handler {
            Some(handler) => match tokio::time::timeout(
                std::time::Duration::from_secs(task.timeout_seconds),
                handler(self.state.clone(), task.payload.clone()),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err("Task execution timed out".into()),
            },
            None => Err(format!("No handler for task type: {}", task.task_type).into()),
        };

        let completed_at = Utc::now();
        let duration_ms = (completed_at - started_at).num_milliseconds();

        match result {
            Ok(value) => {
                info!("Task {} completed in {}ms", task.name, duration_ms);
                TaskExecution {
                    id: Uuid::new_v4(),
                    scheduled_task_id: task.id,
                    started_at,
                    completed_at: Some(completed_at),
                    status: "completed".to_string(),
                    result: Some(value),
                    error_message: None,
                    duration_ms: Some(duration_ms),
                }
            }
            Err(e) => {
                error!("Task {} failed: {}", task.name, e);
                TaskExecution {
                    id: Uuid::new_v4(),
                    scheduled_task_id: task.id,
                    started_at,
                    completed_at: Some(completed_at),
                    status: "failed".to_string(),
                    result: None,
                    error_message: Some(e.to_string()),
                    duration_ms: Some(duration_ms),
                }
            }
        }
    }

    async fn advance_task(&self, task_id: Uuid, now: DateTime<Utc>) {
        let mut tasks = self.scheduled_tasks.write().await;
        if let Some(task) = tasks.iter_mut().find(|t| t.id == task_id) {
            task.last_run = Some(now);
            task.updated_at = now;
            task.next_run = match next_run_after(&task.cron_expression, now) {
                Ok(next) => next,
                Err(e) => {
                    warn!("Task {} has no next run ({}); retrying in 1h", task.name, e);
                    now + Duration::hours(1)
                }
            };
        }
    }

    async fn record_execution(&self, execution: TaskExecution) {
        let mut executions = self.task_executions.write().await;
        executions.push(execution);
        let overflow = executions.len().saturating_sub(EXECUTION_HISTORY_LIMIT);
        if overflow > 0 {
            executions.drain(..overflow);
        }
    }

    pub async fn stop_task(&self, task_id: Uuid) {
        let mut tasks = self.scheduled_tasks.write().await;
        if let Some(task) = tasks.iter_mut().find(|t| t.id == task_id) {
            task.enabled = false;
            info!("Stopped task: {}", task.name);
        }
    }

    pub async fn list_scheduled_tasks(&self) -> Vec<ScheduledTask> {
        self.scheduled_tasks.read().await.clone()
    }

    pub async fn recent_executions(&self, task_id: Uuid) -> Vec<TaskExecution> {
        let executions = self.task_executions.read().await;
        executions
            .iter()
            .rev()
            .filter(|e| e.scheduled_task_id == task_id)
            .take(10)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::shared::test_utils::test_state;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_next_run_after_daily_cron() {
        let after = DateTime::parse_from_rfc3339("2026-03-02T09:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let next = next_run_after("0 0 8 * * *", after).unwrap();
        assert_eq!(next.to_rfc3339(), "2026-03-03T08:00:00+00:00");
    }

    #[test]
    fn test_next_run_after_rejects_bad_cron() {
        assert!(next_run_after("not a cron", Utc::now()).is_err());
    }

    #[tokio::test]
    async fn test_due_task_runs_and_advances() {
        let (state, _rx) = test_state();
        let scheduler = TaskScheduler::new(Arc::new(state));
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        scheduler
            .register_handler(
                "count".to_string(),
                Arc::new(move |_state, _payload| {
                    let counter = counter.clone();
                    Box::pin(async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Ok(serde_json::json!({"ok": true}))
                    })
                }),
            )
            .await;

        let task = scheduler
            .create_scheduled_task(
                "counter".to_string(),
                "count".to_string(),
                "0 0 * * * *".to_string(),
                serde_json::json!({}),
            )
            .await
            .unwrap();

        assert_eq!(scheduler.check_and_run_tasks(Utc::now()).await, 0);

        let later = task.next_run + Duration::seconds(1);
        assert_eq!(scheduler.check_and_run_tasks(later).await, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let tasks = scheduler.list_scheduled_tasks().await;
        assert!(tasks[0].next_run > later);
        assert_eq!(tasks[0].last_run, Some(later));

        let executions = scheduler.recent_executions(task.id).await;
        assert_eq!(executions.len(), 1);
        assert_eq!(executions[0].status, "completed");
    }

    #[tokio::test]
    async fn test_missing_handler_records_failure() {
        let (state, _rx) = test_state();
        let scheduler = TaskScheduler::new(Arc::new(state));
        let task = scheduler
            .create_scheduled_task(
                "orphan".to_string(),
                "unknown".to_string(),
                "0 0 * * * *".to_string(),
                serde_json::json!({}),
            )
            .await
            .unwrap();

        scheduler
            .check_and_run_tasks(task.next_run + Duration::seconds(1))
            .await;
        let executions = scheduler.recent_executions(task.id).await;
        assert_eq!(executions[0].status, "failed");
        assert!(executions[0]
            .error_message
            .as_deref()
            .unwrap_or_default()
            .contains("No handler"));
    }

    #[tokio::test]
    async fn test_stopped_task_is_skipped() {
        let (state, _rx) = test_state();
        let scheduler = TaskScheduler::new(Arc::new(state));
        let task = scheduler
            .create_scheduled_task(
                "stoppable".to_string(),
                "unknown".to_string(),
                "0 0 * * * *".to_string(),
                serde_json::json!({}),
            )
            .await
            .unwrap();
        scheduler.stop_task(task.id).await;
        assert_eq!(
            scheduler
                .check_and_run_tasks(task.next_run + Duration::seconds(1))
                .await,
            0
        );
    }
}
