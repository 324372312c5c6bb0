use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::error::NotificationError;

pub const DEFAULT_DAYS_BEFORE_DUE: [i32; 3] = [7, 3, 1];
pub const MAX_DAYS_BEFORE_DUE: i32 = 365;

crate::text_enum! {
    /// Kind of record a reminder or notification points at.
    pub enum EntityType {
        RiskAction => "risk_action",
        Assessment => "assessment",
        Digest => "digest",
    }
}

crate::text_enum! {
    pub enum ReminderType {
        Advance => "advance",
        DueToday => "due_today",
        Overdue => "overdue",
        WeeklyDigest => "weekly_digest",
    }
}

impl EntityType {
    pub fn label(&self) -> &'static str {
        match self {
            Self::RiskAction => "Risk action",
            Self::Assessment => "Control assessment",
            Self::Digest => "Digest",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ReminderConfiguration {
    pub id: Option<Uuid>,
    pub org_id: Uuid,
    pub user_id: Uuid,
    pub enabled: bool,
    pub days_before_due: Vec<i32>,
    pub send_overdue: bool,
    pub overdue_interval_days: i32,
    pub weekly_digest_enabled: bool,
    /// 0 = Monday .. 6 = Sunday.
    pub digest_weekday: i32,
    pub include_assessments: bool,
    pub include_risk_actions: bool,
    /// False when the defaults are shown because nothing was saved yet.
    pub persisted: bool,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct UpdateReminderConfigRequest {
    pub enabled: Option<bool>,
    pub days_before_due: Option<Vec<i32>>,
    pub send_overdue: Option<bool>,
    pub overdue_interval_days: Option<i32>,
    pub weekly_digest_enabled: Option<bool>,
    pub digest_weekday: Option<i32>,
    pub include_assessments: Option<bool>,
    pub include_risk_actions: Option<bool>,
}

impl UpdateReminderConfigRequest {
    pub fn validate(&self) -> Result<(), NotificationError> {
        if let Some(days) = &self.days_before_due {
            if let Some(bad) = days
                .iter()
                .find(|d| !(1..=MAX_DAYS_BEFORE_DUE).contains(*d))
            {
                return Err(NotificationError::Validation(format!(
                    "days_before_due values must be between 1 and {MAX_DAYS_BEFORE_DUE}, got {bad}"
                )));
            }
        }
        if self.overdue_interval_days.is_some_and(|d| d < 1) {
            return Err(NotificationError::Validation(
                "overdue_interval_days must be at least 1".to_string(),
            ));
        }
        if self
            .digest_weekday
            .is_some_and(|d| !(0..=6).contains(&d))
        {
            return Err(NotificationError::Validation(
                "digest_weekday must be between 0 (Monday) and 6 (Sunday)".to_string(),
            ));
        }
        Ok(())
    }
}

/// Sorted descending without duplicates.
pub fn normalize_days(mut days: Vec<i32>) -> Vec<i32> {
    days.sort_unstable_by(|a, b| b.cmp(a));
    days.dedup();
    days
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ReminderLogEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub entity_type: EntityType,
    pub entity_id: Uuid,
    pub reminder_type: ReminderType,
    pub days_offset: i32,
    pub sent_date: NaiveDate,
    pub sent_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListReminderLogsQuery {
    pub user_id: Option<Uuid>,
    pub entity_type: Option<EntityType>,
    pub entity_id: Option<Uuid>,
    pub reminder_type: Option<ReminderType>,
    pub since: Option<NaiveDate>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Open, dated work item assigned to a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DueItem {
    pub entity_type: EntityType,
    pub entity_id: Uuid,
    pub org_id: Uuid,
    pub title: String,
    pub status: String,
    pub due_date: NaiveDate,
}

impl DueItem {
    pub fn days_until_due(&self, today: NaiveDate) -> i64 {
        (self.due_date - today).num_days()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub user_id: Uuid,
    pub org_id: Uuid,
    pub email: String,
    pub display_name: Option<String>,
}

impl Recipient {
    pub fn greeting_name(&self) -> &str {
        self.display_name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or(&self.email)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_validation() {
        let ok = UpdateReminderConfigRequest {
            days_before_due: Some(vec![14, 7, 1]),
            digest_weekday: Some(6),
            ..Default::default()
        };
        assert!(ok.validate().is_ok());

        let zero_day = UpdateReminderConfigRequest {
            days_before_due: Some(vec![7, 0]),
            ..Default::default()
        };
        assert!(zero_day.validate().is_err());

        let bad_interval = UpdateReminderConfigRequest {
            overdue_interval_days: Some(0),
            ..Default::default()
        };
        assert!(bad_interval.validate().is_err());

        let bad_weekday = UpdateReminderConfigRequest {
            digest_weekday: Some(7),
            ..Default::default()
        };
        assert!(bad_weekday.validate().is_err());
    }

    #[test]
    fn test_normalize_days() {
        assert_eq!(normalize_days(vec![1, 7, 3, 7]), vec![7, 3, 1]);
    }

    #[test]
    fn test_days_until_due() {
        let today = NaiveDate::from_ymd_opt(2026, 4, 10).unwrap();
        let item = DueItem {
            entity_type: EntityType::RiskAction,
            entity_id: Uuid::new_v4(),
            org_id: Uuid::new_v4(),
            title: "Rotate keys".into(),
            status: "planned".into(),
            due_date: NaiveDate::from_ymd_opt(2026, 4, 7).unwrap(),
        };
        assert_eq!(item.days_until_due(today), -3);
    }

    #[test]
    fn test_enum_text_forms() {
        assert_eq!(EntityType::RiskAction.to_string(), "risk_action");
        assert_eq!("due_today".parse::<ReminderType>(), Ok(ReminderType::DueToday));
    }
}
