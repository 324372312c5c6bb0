use chrono::NaiveDate;

use super::error::RiskError;
use super::storage::DbRiskAction;
use super::types::ActionStatus;

pub fn validate_progress(progress: i32) -> Result<(), RiskError> {
    if (0..=100).contains(&progress) {
        Ok(())
    } else {
        Err(RiskError::Validation(format!(
            "progress_percentage must be between 0 and 100, got {progress}"
        )))
    }
}

impl ActionStatus {
    pub fn can_transition_to(&self, next: ActionStatus) -> bool {
        use ActionStatus::*;
        matches!(
            (self, next),
            (Planned, InProgress)
                | (Planned, Completed)
                | (Planned, Cancelled)
                | (InProgress, Planned)
                | (InProgress, Completed)
                | (InProgress, Cancelled)
                | (Completed, InProgress)
                | (Cancelled, Planned)
        )
    }
}

pub fn is_overdue(action: &DbRiskAction, today: NaiveDate) -> bool {
    action.status.is_open() && action.due_date.is_some_and(|due| due < today)
}

/// Changes status; completing forces 100% and stamps the completion date.
pub fn apply_status(
    action: &mut DbRiskAction,
    next: ActionStatus,
    today: NaiveDate,
) -> Result<ActionStatus, RiskError> {
    let previous = action.status;
    if previous == next {
        return Ok(previous);
    }
    if !previous.can_transition_to(next) {
        return Err(RiskError::InvalidTransition(format!(
            "Cannot move action from {previous} to {next}"
        )));
    }

    action.status = next;
    match next {
        ActionStatus::Completed => {
            action.progress_percentage = 100;
            action.completed_date = Some(today);
        }
        ActionStatus::InProgress => {
            action.completed_date = None;
            if action.start_date.is_none() {
                action.start_date = Some(today);
            }
            if action.progress_percentage >= 100 {
                action.progress_percentage = 99;
            }
        }
        ActionStatus::Planned | ActionStatus::Cancelled => {
            action.completed_date = None;
        }
    }
    Ok(previous)
}

/// Records progress; any progress starts a planned action and 100% completes it.
pub fn apply_progress(
    action: &mut DbRiskAction,
    progress: i32,
    today: NaiveDate,
) -> Result<ActionStatus, RiskError> {
    validate_progress(progress)?;
    let previous = action.status;
    if !previous.is_open() {
        return Err(RiskError::InvalidTransition(format!(
            "Cannot record progress on a {previous} action"
        )));
    }

    if progress == 100 {
        apply_status(action, ActionStatus::Completed, today)?;
    } else {
        if progress > 0 && previous == ActionStatus::Planned {
            apply_status(action, ActionStatus::InProgress, today)?;
        }
        action.progress_percentage = progress;
    }
    Ok(previous)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::risk::types::{ActionPriority, ActionType};
    use chrono::Utc;
    use uuid::Uuid;

    fn action(status: ActionStatus) -> DbRiskAction {
        DbRiskAction {
            id: Uuid::new_v4(),
            org_id: Uuid::new_v4(),
            risk_id: Uuid::new_v4(),
            title: "Patch servers".into(),
            description: None,
            action_type: ActionType::Corrective,
            assigned_to: None,
            status,
            priority: ActionPriority::High,
            progress_percentage: 0,
            start_date: None,
            due_date: None,
            completed_date: None,
            notes: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 6, 15).unwrap()
    }

    #[test]
    fn test_progress_bounds() {
        assert!(validate_progress(-1).is_err());
        assert!(validate_progress(101).is_err());
        assert!(validate_progress(0).is_ok());
        assert!(validate_progress(100).is_ok());
    }

    #[test]
    fn test_completing_sets_full_progress() {
        let mut a = action(ActionStatus::InProgress);
        a.progress_percentage = 40;
        apply_status(&mut a, ActionStatus::Completed, today()).unwrap();
        assert_eq!(a.progress_percentage, 100);
        assert_eq!(a.completed_date, Some(today()));
    }

    #[test]
    fn test_progress_starts_and_completes() {
        let mut a = action(ActionStatus::Planned);
        apply_progress(&mut a, 30, today()).unwrap();
        assert_eq!(a.status, ActionStatus::InProgress);
        assert_eq!(a.start_date, Some(today()));
        assert_eq!(a.progress_percentage, 30);

        apply_progress(&mut a, 100, today()).unwrap();
        assert_eq!(a.status, ActionStatus::Completed);
        assert_eq!(a.completed_date, Some(today()));
    }

    #[test]
    fn test_progress_rejected_on_closed_action() {
        let mut a = action(ActionStatus::Cancelled);
        assert!(matches!(
            apply_progress(&mut a, 50, today()),
            Err(RiskError::InvalidTransition(_))
        ));
        let mut b = action(ActionStatus::Planned);
        assert!(matches!(
            apply_progress(&mut b, 150, today()),
            Err(RiskError::Validation(_))
        ));
    }

    #[test]
    fn test_reopen_clears_completion() {
        let mut a = action(ActionStatus::Completed);
        a.progress_percentage = 100;
        a.completed_date = Some(today());
        apply_status(&mut a, ActionStatus::InProgress, today()).unwrap();
        assert_eq!(a.completed_date, None);
        assert!(a.progress_percentage < 100);
    }

    #[test]
    fn test_invalid_transition() {
        let mut a = action(ActionStatus::Cancelled);
        assert!(apply_status(&mut a, ActionStatus::Completed, today()).is_err());
    }

    #[test]
    fn test_overdue_only_for_open_actions() {
        let mut a = action(ActionStatus::InProgress);
        a.due_date = Some(today() - chrono::Duration::days(1));
        assert!(is_overdue(&a, today()));
        a.status = ActionStatus::Completed;
        assert!(!is_overdue(&a, today()));
    }
}
