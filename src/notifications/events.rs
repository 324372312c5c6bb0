use chrono::NaiveDate;
use log::{debug, warn};
use std::sync::Arc;
use uuid::Uuid;

use crate::shared::state::AppState;
use crate::shared::utils::run_db;

use super::error::NotificationError;
use super::mailer::{send_with_retry, OutgoingEmail};
use super::storage::{find_active_recipient, load_config};
use super::templates::{assignment_email, status_change_email};
use super::types::EntityType;

/// The record an event is about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventSubject {
    pub entity_type: EntityType,
    pub entity_id: Uuid,
    pub org_id: Uuid,
    pub title: String,
    pub due_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationEvent {
    Assigned {
        subject: EventSubject,
        assignee: Uuid,
        assigned_by: Option<Uuid>,
    },
    StatusChanged {
        subject: EventSubject,
        recipient: Uuid,
        from: String,
        to: String,
        changed_by: Option<Uuid>,
    },
}

impl NotificationEvent {
    pub fn subject(&self) -> &EventSubject {
        match self {
            Self::Assigned { subject, .. } | Self::StatusChanged { subject, .. } => subject,
        }
    }

    pub fn recipient(&self) -> Uuid {
        match self {
            Self::Assigned { assignee, .. } => *assignee,
            Self::StatusChanged { recipient, .. } => *recipient,
        }
    }

    /// Nobody is told about their own change.
    pub fn is_self_inflicted(&self) -> bool {
        let actor = match self {
            Self::Assigned { assigned_by, .. } => assigned_by,
            Self::StatusChanged { changed_by, .. } => changed_by,
        };
        *actor == Some(self.recipient())
    }
}

/// Fires the event email in the background; failures are only logged.
pub fn spawn_notification(state: Arc<AppState>, event: NotificationEvent) {
    tokio::spawn(async move {
        match deliver_event(state, event).await {
            Ok(true) => {}
            Ok(false) => debug!("Notification skipped"),
            Err(e) => warn!("Notification delivery failed: {e}"),
        }
    });
}

/// Sends the email for `event`; returns false when nothing needed sending.
pub async fn deliver_event(
    state: Arc<AppState>,
    event: NotificationEvent,
) -> Result<bool, NotificationError> {
    if event.is_self_inflicted() {
        return Ok(false);
    }

    let base_url = state.base_url().to_string();
    let entity_type = event.subject().entity_type;

    let email = run_db(&state.conn, move |conn| {
        let subject = event.subject();
        let Some(recipient) = find_active_recipient(conn, subject.org_id, event.recipient())?
        else {
            return Ok(None);
        };
        if load_config(conn, recipient.user_id)?.is_some_and(|c| !c.enabled) {
            return Ok(None);
        }

        let email: OutgoingEmail = match &event {
            NotificationEvent::Assigned { subject, .. } => {
                assignment_email(&recipient, subject, &base_url)
            }
            NotificationEvent::StatusChanged {
                subject, from, to, ..
            } => status_change_email(&recipient, subject, from, to, &base_url),
        };
        Ok::<_, NotificationError>(Some(email))
    })
    .await?;

    let Some(email) = email else {
        return Ok(false);
    };
    let label = format!("{entity_type} notification to {}", email.to);
    send_with_retry(&state.mailer, state.config.email.retry_policy(), &label, &email).await?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subject() -> EventSubject {
        EventSubject {
            entity_type: EntityType::Assessment,
            entity_id: Uuid::new_v4(),
            org_id: Uuid::new_v4(),
            title: "Access review".into(),
            due_date: None,
        }
    }

    #[test]
    fn test_self_assignment_is_skipped() {
        let user = Uuid::new_v4();
        let event = NotificationEvent::Assigned {
            subject: subject(),
            assignee: user,
            assigned_by: Some(user),
        };
        assert!(event.is_self_inflicted());

        let other = NotificationEvent::StatusChanged {
            subject: subject(),
            recipient: user,
            from: "pending".into(),
            to: "in_progress".into(),
            changed_by: None,
        };
        assert!(!other.is_self_inflicted());
        assert_eq!(other.recipient(), user);
    }
}
