use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use utoipa::ToSchema;
use uuid::Uuid;

use super::error::CatalogError;

/// Controls untested for longer than this are flagged for testing.
pub const TESTING_INTERVAL_DAYS: i64 = 90;

crate::text_enum! {
    pub enum FrameworkStatus {
        Draft => "draft",
        Active => "active",
        Archived => "archived",
    }
}

crate::text_enum! {
    pub enum ClauseType {
        Section => "section",
        Requirement => "requirement",
        Control => "control",
    }
}

crate::text_enum! {
    pub enum ControlType {
        Preventive => "preventive",
        Detective => "detective",
        Corrective => "corrective",
        Directive => "directive",
    }
}

crate::text_enum! {
    pub enum AutomationLevel {
        Manual => "manual",
        SemiAutomated => "semi_automated",
        Automated => "automated",
    }
}

crate::text_enum! {
    pub enum ControlStatus {
        Draft => "draft",
        Active => "active",
        Inactive => "inactive",
        Retired => "retired",
    }
}

crate::text_enum! {
    pub enum ControlFrequency {
        Continuous => "continuous",
        Daily => "daily",
        Weekly => "weekly",
        Monthly => "monthly",
        Quarterly => "quarterly",
        Annually => "annually",
    }
}

crate::text_enum! {
    pub enum Effectiveness {
        NotTested => "not_tested",
        Ineffective => "ineffective",
        PartiallyEffective => "partially_effective",
        Effective => "effective",
    }
}

crate::text_enum! {
    pub enum Applicability {
        Applicable => "applicable",
        NotApplicable => "not_applicable",
    }
}

crate::text_enum! {
    pub enum ImplementationStatus {
        NotStarted => "not_started",
        PartiallyImplemented => "partially_implemented",
        Implemented => "implemented",
        NotImplemented => "not_implemented",
    }
}

crate::text_enum! {
    pub enum AssessmentStatus {
        Pending => "pending",
        InProgress => "in_progress",
        UnderReview => "under_review",
        Completed => "completed",
    }
}

impl ImplementationStatus {
    /// Weight used by coverage and correlation analytics.
    pub fn score(&self) -> f64 {
        match self {
            Self::Implemented => 1.0,
            Self::PartiallyImplemented => 0.5,
            Self::NotStarted | Self::NotImplemented => 0.0,
        }
    }
}

impl AssessmentStatus {
    pub fn is_open(&self) -> bool {
        !matches!(self, Self::Completed)
    }
}

pub(crate) fn require_text(field: &str, value: &str) -> Result<(), CatalogError> {
    if value.trim().is_empty() {
        return Err(CatalogError::Validation(format!("{field} is required")));
    }
    Ok(())
}

// ============================================================================
// Frameworks
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Framework {
    pub id: Uuid,
    pub name: String,
    pub short_name: String,
    pub version: String,
    pub description: Option<String>,
    pub framework_type: String,
    pub issuing_organization: Option<String>,
    pub effective_date: Option<NaiveDate>,
    pub status: FrameworkStatus,
    pub source_checksum: Option<String>,
    pub imported_at: Option<DateTime<Utc>>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateFrameworkRequest {
    pub name: String,
    pub short_name: String,
    pub version: String,
    pub description: Option<String>,
    pub framework_type: Option<String>,
    pub issuing_organization: Option<String>,
    pub effective_date: Option<NaiveDate>,
    pub status: Option<FrameworkStatus>,
}

impl CreateFrameworkRequest {
    pub fn validate(&self) -> Result<(), CatalogError> {
        require_text("name", &self.name)?;
        require_text("short_name", &self.short_name)?;
        require_text("version", &self.version)
    }
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct UpdateFrameworkRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub framework_type: Option<String>,
    pub issuing_organization: Option<String>,
    pub effective_date: Option<NaiveDate>,
    pub status: Option<FrameworkStatus>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListFrameworksQuery {
    pub status: Option<FrameworkStatus>,
    pub search: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Control coverage of one framework within an organization.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FrameworkCoverage {
    pub framework_id: Uuid,
    pub framework_name: String,
    pub total_clauses: i64,
    pub testable_clauses: i64,
    pub covered_clauses: i64,
    pub coverage_percentage: f64,
    pub mapped_controls: i64,
    pub assessment_status_counts: BTreeMap<String, i64>,
    pub implementation_status_counts: BTreeMap<String, i64>,
}

pub fn coverage_percentage(covered: i64, testable: i64) -> f64 {
    if testable <= 0 {
        return 0.0;
    }
    let pct = covered as f64 * 100.0 / testable as f64;
    (pct * 10.0).round() / 10.0
}

// ============================================================================
// Clauses
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Clause {
    pub id: Uuid,
    pub framework_id: Uuid,
    pub clause_id: String,
    pub full_clause_id: String,
    pub title: String,
    pub description: Option<String>,
    pub clause_type: ClauseType,
    pub parent_id: Option<Uuid>,
    pub sort_order: i32,
    pub is_testable: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ClauseNode {
    pub id: Uuid,
    pub clause_id: String,
    pub full_clause_id: String,
    pub title: String,
    pub clause_type: ClauseType,
    pub is_testable: bool,
    pub sort_order: i32,
    pub children: Vec<ClauseNode>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateClauseRequest {
    pub framework_id: Uuid,
    pub clause_id: String,
    pub title: String,
    pub description: Option<String>,
    pub clause_type: Option<ClauseType>,
    pub parent_id: Option<Uuid>,
    pub sort_order: Option<i32>,
    pub is_testable: Option<bool>,
}

impl CreateClauseRequest {
    pub fn validate(&self) -> Result<(), CatalogError> {
        require_text("clause_id", &self.clause_id)?;
        require_text("title", &self.title)
    }
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct UpdateClauseRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub clause_type: Option<ClauseType>,
    /// Moves the clause under another clause of the same framework.
    pub parent_id: Option<Uuid>,
    pub detach_parent: Option<bool>,
    pub sort_order: Option<i32>,
    pub is_testable: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListClausesQuery {
    pub framework_id: Option<Uuid>,
    pub parent_id: Option<Uuid>,
    pub clause_type: Option<ClauseType>,
    pub is_testable: Option<bool>,
    pub search: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

// ============================================================================
// Controls
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Control {
    pub id: Uuid,
    pub org_id: Uuid,
    pub control_id: String,
    pub name: String,
    pub description: Option<String>,
    pub control_type: ControlType,
    pub automation_level: AutomationLevel,
    pub status: ControlStatus,
    pub owner_id: Option<Uuid>,
    pub frequency: ControlFrequency,
    pub effectiveness: Effectiveness,
    pub last_tested_date: Option<NaiveDate>,
    pub needs_testing: bool,
    pub clause_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// True when the control was never tested or its last test is older than
/// [`TESTING_INTERVAL_DAYS`].
pub fn needs_testing(last_tested_date: Option<NaiveDate>, today: NaiveDate) -> bool {
    match last_tested_date {
        None => true,
        Some(tested) => (today - tested).num_days() > TESTING_INTERVAL_DAYS,
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateControlRequest {
    pub control_id: String,
    pub name: String,
    pub description: Option<String>,
    pub control_type: Option<ControlType>,
    pub automation_level: Option<AutomationLevel>,
    pub status: Option<ControlStatus>,
    pub owner_id: Option<Uuid>,
    pub frequency: Option<ControlFrequency>,
    pub clause_ids: Option<Vec<Uuid>>,
}

impl CreateControlRequest {
    pub fn validate(&self) -> Result<(), CatalogError> {
        require_text("control_id", &self.control_id)?;
        require_text("name", &self.name)
    }
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct UpdateControlRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub control_type: Option<ControlType>,
    pub automation_level: Option<AutomationLevel>,
    pub status: Option<ControlStatus>,
    pub owner_id: Option<Uuid>,
    pub frequency: Option<ControlFrequency>,
    pub effectiveness: Option<Effectiveness>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ReplaceControlClausesRequest {
    pub clause_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct MarkTestedRequest {
    /// Defaults to today.
    pub tested_date: Option<NaiveDate>,
    pub effectiveness: Option<Effectiveness>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListControlsQuery {
    pub status: Option<ControlStatus>,
    pub control_type: Option<ControlType>,
    pub owner_id: Option<Uuid>,
    pub clause_id: Option<Uuid>,
    pub needs_testing: Option<bool>,
    pub search: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

// ============================================================================
// Assessments
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Assessment {
    pub id: Uuid,
    pub org_id: Uuid,
    pub control_id: Uuid,
    pub applicability: Applicability,
    pub applicability_justification: Option<String>,
    pub implementation_status: ImplementationStatus,
    pub status: AssessmentStatus,
    pub assigned_to: Option<Uuid>,
    pub due_date: Option<NaiveDate>,
    pub implementation_notes: Option<String>,
    pub evidence_notes: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub is_overdue: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateAssessmentRequest {
    pub control_id: Uuid,
    pub applicability: Option<Applicability>,
    pub applicability_justification: Option<String>,
    pub implementation_status: Option<ImplementationStatus>,
    pub assigned_to: Option<Uuid>,
    pub due_date: Option<NaiveDate>,
    pub implementation_notes: Option<String>,
    pub evidence_notes: Option<String>,
}

impl CreateAssessmentRequest {
    pub fn validate(&self) -> Result<(), CatalogError> {
        validate_applicability(
            self.applicability.unwrap_or(Applicability::Applicable),
            self.applicability_justification.as_deref(),
        )
    }
}

pub fn validate_applicability(
    applicability: Applicability,
    justification: Option<&str>,
) -> Result<(), CatalogError> {
    if applicability == Applicability::NotApplicable
        && justification.map_or(true, |j| j.trim().is_empty())
    {
        return Err(CatalogError::Validation(
            "applicability_justification is required when a control is not applicable"
                .to_string(),
        ));
    }
    Ok(())
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct BulkCreateAssessmentsRequest {
    pub control_ids: Option<Vec<Uuid>>,
    /// Creates assessments for every org control mapped to this framework.
    pub framework_id: Option<Uuid>,
    pub assigned_to: Option<Uuid>,
    pub due_date: Option<NaiveDate>,
}

impl BulkCreateAssessmentsRequest {
    pub fn validate(&self) -> Result<(), CatalogError> {
        let has_controls = self.control_ids.as_ref().is_some_and(|ids| !ids.is_empty());
        if !has_controls && self.framework_id.is_none() {
            return Err(CatalogError::Validation(
                "Either control_ids or framework_id is required".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BulkCreateAssessmentsResponse {
    pub created: Vec<Assessment>,
    /// Controls that already had an assessment.
    pub skipped_control_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct UpdateAssessmentRequest {
    pub applicability: Option<Applicability>,
    pub applicability_justification: Option<String>,
    pub implementation_status: Option<ImplementationStatus>,
    pub due_date: Option<NaiveDate>,
    pub implementation_notes: Option<String>,
    pub evidence_notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct AssignAssessmentRequest {
    pub assigned_to: Uuid,
    pub due_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct TransitionAssessmentRequest {
    pub status: AssessmentStatus,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListAssessmentsQuery {
    pub status: Option<AssessmentStatus>,
    pub assigned_to: Option<Uuid>,
    pub control_id: Option<Uuid>,
    pub framework_id: Option<Uuid>,
    pub overdue: Option<bool>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// One entry of an assessment's change log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ChangeLogEntry {
    pub timestamp: DateTime<Utc>,
    pub actor: String,
    pub action: String,
    /// Field name to `{"from": .., "to": ..}`.
    #[schema(value_type = Object)]
    pub changes: serde_json::Value,
    pub comment: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_needs_testing_when_never_tested() {
        assert!(needs_testing(None, date("2026-05-01")));
    }

    #[test]
    fn test_needs_testing_boundary() {
        let today = date("2026-05-01");
        assert!(!needs_testing(Some(today), today));
        assert!(!needs_testing(
            Some(today - chrono::Duration::days(90)),
            today
        ));
        assert!(needs_testing(
            Some(today - chrono::Duration::days(91)),
            today
        ));
    }

    #[test]
    fn test_not_applicable_requires_justification() {
        assert!(validate_applicability(Applicability::NotApplicable, None).is_err());
        assert!(validate_applicability(Applicability::NotApplicable, Some("  ")).is_err());
        assert!(validate_applicability(Applicability::NotApplicable, Some("no cloud")).is_ok());
        assert!(validate_applicability(Applicability::Applicable, None).is_ok());
    }

    #[test]
    fn test_bulk_request_needs_a_target() {
        let req = BulkCreateAssessmentsRequest {
            control_ids: Some(vec![]),
            framework_id: None,
            assigned_to: None,
            due_date: None,
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_coverage_percentage_rounding() {
        assert_eq!(coverage_percentage(0, 0), 0.0);
        assert_eq!(coverage_percentage(1, 3), 33.3);
        assert_eq!(coverage_percentage(3, 3), 100.0);
    }

    #[test]
    fn test_implementation_score_weights() {
        assert_eq!(ImplementationStatus::Implemented.score(), 1.0);
        assert_eq!(ImplementationStatus::PartiallyImplemented.score(), 0.5);
        assert_eq!(ImplementationStatus::NotImplemented.score(), 0.0);
    }

    #[test]
    fn test_framework_request_requires_fields() {
        let req = CreateFrameworkRequest {
            name: "ISO".into(),
            short_name: " ".into(),
            version: "2022".into(),
            description: None,
            framework_type: None,
            issuing_organization: None,
            effective_date: None,
            status: None,
        };
        assert!(matches!(req.validate(), Err(CatalogError::Validation(_))));
    }
}
