use chrono::{DateTime, NaiveDate, Utc};
use log::warn;
use serde_json::{json, Map, Value};
use uuid::Uuid;

use super::error::CatalogError;
use super::storage::DbAssessment;
use super::types::{
    validate_applicability, AssessmentStatus, ChangeLogEntry, UpdateAssessmentRequest,
};

impl AssessmentStatus {
    pub fn allowed_transitions(&self) -> &'static [AssessmentStatus] {
        match self {
            Self::Pending => &[Self::InProgress],
            Self::InProgress => &[Self::UnderReview, Self::Pending],
            Self::UnderReview => &[Self::Completed, Self::InProgress],
            Self::Completed => &[Self::InProgress],
        }
    }

    pub fn can_transition_to(&self, next: AssessmentStatus) -> bool {
        self.allowed_transitions().contains(&next)
    }
}

/// Collects field changes for one change-log entry.
#[derive(Debug, Default)]
struct ChangeSet {
    fields: Map<String, Value>,
}

impl ChangeSet {
    fn record<T: serde::Serialize + PartialEq>(&mut self, field: &str, from: &T, to: &T) {
        if from != to {
            self.fields
                .insert(field.to_string(), json!({ "from": from, "to": to }));
        }
    }

    fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Readable history entries; a malformed entry is logged and skipped.
pub fn change_log_entries(log: &Value) -> Vec<ChangeLogEntry> {
    let Some(entries) = log.as_array() else {
        return Vec::new();
    };
    entries
        .iter()
        .enumerate()
        .filter_map(|(index, entry)| {
            serde_json::from_value(entry.clone())
                .map_err(|e| warn!("Skipping unreadable change log entry {index}: {e}"))
                .ok()
        })
        .collect()
}

fn append_entry(db: &mut DbAssessment, entry: ChangeLogEntry) {
    let value = serde_json::to_value(&entry).unwrap_or(Value::Null);
    match db.change_log.as_array_mut() {
        Some(entries) => entries.push(value),
        None => db.change_log = Value::Array(vec![value]),
    }
}

fn log_changes(
    db: &mut DbAssessment,
    actor: &str,
    action: &str,
    changes: ChangeSet,
    comment: Option<String>,
    now: DateTime<Utc>,
) {
    append_entry(
        db,
        ChangeLogEntry {
            timestamp: now,
            actor: actor.to_string(),
            action: action.to_string(),
            changes: Value::Object(changes.fields),
            comment,
        },
    );
    db.updated_at = now;
}

pub fn record_creation(db: &mut DbAssessment, actor: &str, now: DateTime<Utc>) {
    let mut changes = ChangeSet::default();
    changes.record("status", &Value::Null, &json!(db.status));
    log_changes(db, actor, "created", changes, None, now);
}

/// Applies field edits; returns false when nothing changed.
pub fn apply_update(
    db: &mut DbAssessment,
    req: UpdateAssessmentRequest,
    actor: &str,
    now: DateTime<Utc>,
) -> Result<bool, CatalogError> {
    let applicability = req.applicability.unwrap_or(db.applicability);
    let justification = req
        .applicability_justification
        .clone()
        .or_else(|| db.applicability_justification.clone());
    validate_applicability(applicability, justification.as_deref())?;

    let mut changes = ChangeSet::default();
    changes.record("applicability", &db.applicability, &applicability);
    changes.record(
        "applicability_justification",
        &db.applicability_justification,
        &justification,
    );
    db.applicability = applicability;
    db.applicability_justification = justification;

    if let Some(status) = req.implementation_status {
        changes.record("implementation_status", &db.implementation_status, &status);
        db.implementation_status = status;
    }
    if let Some(due) = req.due_date {
        changes.record("due_date", &db.due_date, &Some(due));
        db.due_date = Some(due);
    }
    if let Some(notes) = req.implementation_notes {
        changes.record("implementation_notes", &db.implementation_notes, &Some(notes.clone()));
        db.implementation_notes = Some(notes);
    }
    if let Some(notes) = req.evidence_notes {
        changes.record("evidence_notes", &db.evidence_notes, &Some(notes.clone()));
        db.evidence_notes = Some(notes);
    }

    if changes.is_empty() {
        return Ok(false);
    }
    log_changes(db, actor, "updated", changes, None, now);
    Ok(true)
}

pub fn apply_assignment(
    db: &mut DbAssessment,
    assignee: Uuid,
    due_date: Option<NaiveDate>,
    actor: &str,
    now: DateTime<Utc>,
) -> bool {
    let mut changes = ChangeSet::default();
    changes.record("assigned_to", &db.assigned_to, &Some(assignee));
    db.assigned_to = Some(assignee);
    if let Some(due) = due_date {
        changes.record("due_date", &db.due_date, &Some(due));
        db.due_date = Some(due);
    }
    if changes.is_empty() {
        return false;
    }
    log_changes(db, actor, "assigned", changes, None, now);
    true
}

/// Moves the assessment to `next`; completing stamps `completed_at`, reopening clears it.
pub fn apply_transition(
    db: &mut DbAssessment,
    next: AssessmentStatus,
    actor: &str,
    comment: Option<String>,
    now: DateTime<Utc>,
) -> Result<AssessmentStatus, CatalogError> {
    let previous = db.status;
    if !previous.can_transition_to(next) {
        return Err(CatalogError::InvalidTransition(format!(
            "Cannot move assessment from {previous} to {next}"
        )));
    }

    let mut changes = ChangeSet::default();
    changes.record("status", &previous, &next);
    db.status = next;

    let completed_at = if next == AssessmentStatus::Completed {
        Some(now)
    } else {
        None
    };
    changes.record("completed_at", &db.completed_at, &completed_at);
    db.completed_at = completed_at;

    log_changes(db, actor, "status_changed", changes, comment, now);
    Ok(previous)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalogs::types::{Applicability, ImplementationStatus};

    fn assessment() -> DbAssessment {
        let now = Utc::now();
        DbAssessment {
            id: Uuid::new_v4(),
            org_id: Uuid::new_v4(),
            control_id: Uuid::new_v4(),
            applicability: Applicability::Applicable,
            applicability_justification: None,
            implementation_status: ImplementationStatus::NotStarted,
            status: AssessmentStatus::Pending,
            assigned_to: None,
            due_date: None,
            implementation_notes: None,
            evidence_notes: None,
            completed_at: None,
            change_log: json!([]),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_transition_rules() {
        use AssessmentStatus::*;
        assert!(Pending.can_transition_to(InProgress));
        assert!(!Pending.can_transition_to(Completed));
        assert!(!Pending.can_transition_to(Pending));
        assert!(UnderReview.can_transition_to(Completed));
        assert!(Completed.can_transition_to(InProgress));
        assert!(!Completed.can_transition_to(UnderReview));
    }

    #[test]
    fn test_invalid_transition_rejected_without_logging() {
        let mut db = assessment();
        let result = apply_transition(&mut db, AssessmentStatus::Completed, "u", None, Utc::now());
        assert!(matches!(result, Err(CatalogError::InvalidTransition(_))));
        assert_eq!(db.status, AssessmentStatus::Pending);
        assert!(change_log_entries(&db.change_log).is_empty());
    }

    #[test]
    fn test_malformed_log_entry_keeps_the_rest() {
        let mut db = assessment();
        let now = Utc::now();
        record_creation(&mut db, "system", now);
        if let Some(entries) = db.change_log.as_array_mut() {
            entries.push(json!({ "actor": 42 }));
        }
        apply_transition(&mut db, AssessmentStatus::InProgress, "alice", None, now).unwrap();

        let log = change_log_entries(&db.change_log);
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].actor, "system");
        assert_eq!(log[1].actor, "alice");
    }

    #[test]
    fn test_full_workflow_grows_log_per_mutation() {
        let mut db = assessment();
        let now = Utc::now();
        record_creation(&mut db, "system", now);
        apply_transition(&mut db, AssessmentStatus::InProgress, "alice", None, now).unwrap();
        apply_transition(&mut db, AssessmentStatus::UnderReview, "alice", None, now).unwrap();
        apply_transition(
            &mut db,
            AssessmentStatus::Completed,
            "bob",
            Some("evidence ok".into()),
            now,
        )
        .unwrap();

        assert_eq!(db.completed_at, Some(now));
        let log = change_log_entries(&db.change_log);
        assert_eq!(log.len(), 4);
        assert_eq!(log[3].actor, "bob");
        assert_eq!(log[3].comment.as_deref(), Some("evidence ok"));
        assert_eq!(log[3].changes["status"]["to"], "completed");

        apply_transition(&mut db, AssessmentStatus::InProgress, "bob", None, now).unwrap();
        assert_eq!(db.completed_at, None);
        assert_eq!(change_log_entries(&db.change_log).len(), 5);
    }

    #[test]
    fn test_update_without_changes_is_not_logged() {
        let mut db = assessment();
        let changed = apply_update(&mut db, UpdateAssessmentRequest::default(), "u", Utc::now())
            .unwrap();
        assert!(!changed);
        assert!(change_log_entries(&db.change_log).is_empty());
    }

    #[test]
    fn test_update_records_field_diff() {
        let mut db = assessment();
        let req = UpdateAssessmentRequest {
            implementation_status: Some(ImplementationStatus::Implemented),
            evidence_notes: Some("screenshot".into()),
            ..Default::default()
        };
        assert!(apply_update(&mut db, req, "carol", Utc::now()).unwrap());
        let log = change_log_entries(&db.change_log);
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].changes["implementation_status"]["from"], "not_started");
        assert_eq!(log[0].changes["implementation_status"]["to"], "implemented");
        assert!(log[0].changes.get("applicability").is_none());
    }

    #[test]
    fn test_update_to_not_applicable_needs_justification() {
        let mut db = assessment();
        let req = UpdateAssessmentRequest {
            applicability: Some(Applicability::NotApplicable),
            ..Default::default()
        };
        assert!(matches!(
            apply_update(&mut db, req, "u", Utc::now()),
            Err(CatalogError::Validation(_))
        ));
    }

    #[test]
    fn test_assignment_logs_once() {
        let mut db = assessment();
        let user = Uuid::new_v4();
        assert!(apply_assignment(&mut db, user, None, "lead", Utc::now()));
        assert!(!apply_assignment(&mut db, user, None, "lead", Utc::now()));
        assert_eq!(change_log_entries(&db.change_log).len(), 1);
    }
}
