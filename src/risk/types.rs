use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use utoipa::ToSchema;
use uuid::Uuid;

crate::text_enum! {
    pub enum RiskLevel {
        Low => "low",
        Medium => "medium",
        High => "high",
        Critical => "critical",
    }
}

crate::text_enum! {
    pub enum RiskCategory {
        Strategic => "strategic",
        Operational => "operational",
        Financial => "financial",
        Compliance => "compliance",
        Technical => "technical",
        Security => "security",
        Reputational => "reputational",
    }
}

crate::text_enum! {
    pub enum RiskStatus {
        Identified => "identified",
        Assessed => "assessed",
        TreatmentPlanned => "treatment_planned",
        InTreatment => "in_treatment",
        Monitored => "monitored",
        Accepted => "accepted",
        Closed => "closed",
    }
}

crate::text_enum! {
    pub enum TreatmentStrategy {
        Mitigate => "mitigate",
        Accept => "accept",
        Transfer => "transfer",
        Avoid => "avoid",
    }
}

crate::text_enum! {
    pub enum ActionType {
        Preventive => "preventive",
        Detective => "detective",
        Corrective => "corrective",
        Improvement => "improvement",
    }
}

crate::text_enum! {
    pub enum ActionStatus {
        Planned => "planned",
        InProgress => "in_progress",
        Completed => "completed",
        Cancelled => "cancelled",
    }
}

crate::text_enum! {
    pub enum ActionPriority {
        Low => "low",
        Medium => "medium",
        High => "high",
        Critical => "critical",
    }
}

impl ActionStatus {
    pub const OPEN: &'static [ActionStatus] = &[ActionStatus::Planned, ActionStatus::InProgress];

    pub fn is_open(&self) -> bool {
        Self::OPEN.contains(self)
    }
}

impl RiskStatus {
    pub fn is_open(&self) -> bool {
        !matches!(self, Self::Closed)
    }
}

// ============================================================================
// Matrices
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RiskMatrix {
    pub id: Uuid,
    pub org_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub is_default: bool,
    /// Impact (`"1"`..`"5"`) to likelihood to level.
    #[schema(value_type = Object)]
    pub matrix: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateRiskMatrixRequest {
    pub name: String,
    pub description: Option<String>,
    pub is_default: Option<bool>,
    /// Defaults to the standard table.
    #[schema(value_type = Option<Object>)]
    pub matrix: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct UpdateRiskMatrixRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    #[schema(value_type = Option<Object>)]
    pub matrix: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CalculateRiskQuery {
    pub impact: i32,
    pub likelihood: i32,
    pub matrix_id: Option<Uuid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum LevelSource {
    AssignedMatrix,
    DefaultMatrix,
    Fallback,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RiskCalculation {
    pub impact: i32,
    pub likelihood: i32,
    pub risk_score: i32,
    pub risk_level: RiskLevel,
    pub matrix_id: Option<Uuid>,
    pub source: LevelSource,
}

// ============================================================================
// Risks
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Risk {
    pub id: Uuid,
    pub org_id: Uuid,
    pub risk_id: String,
    pub title: String,
    pub description: Option<String>,
    pub category: RiskCategory,
    pub status: RiskStatus,
    pub owner_id: Option<Uuid>,
    pub impact: i32,
    pub likelihood: i32,
    pub risk_score: i32,
    pub risk_level: RiskLevel,
    pub risk_matrix_id: Option<Uuid>,
    pub treatment_strategy: TreatmentStrategy,
    pub treatment_description: Option<String>,
    pub identified_date: NaiveDate,
    pub last_assessed_date: Option<NaiveDate>,
    pub next_review_date: Option<NaiveDate>,
    pub created_by: Option<Uuid>,
    pub control_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateRiskRequest {
    pub title: String,
    pub description: Option<String>,
    pub category: Option<RiskCategory>,
    pub status: Option<RiskStatus>,
    pub owner_id: Option<Uuid>,
    pub impact: i32,
    pub likelihood: i32,
    pub risk_matrix_id: Option<Uuid>,
    pub treatment_strategy: Option<TreatmentStrategy>,
    pub treatment_description: Option<String>,
    pub identified_date: Option<NaiveDate>,
    pub next_review_date: Option<NaiveDate>,
    pub control_ids: Option<Vec<Uuid>>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct UpdateRiskRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<RiskCategory>,
    pub status: Option<RiskStatus>,
    pub owner_id: Option<Uuid>,
    pub impact: Option<i32>,
    pub likelihood: Option<i32>,
    pub risk_matrix_id: Option<Uuid>,
    pub clear_risk_matrix: Option<bool>,
    pub treatment_strategy: Option<TreatmentStrategy>,
    pub treatment_description: Option<String>,
    pub next_review_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ReplaceRiskControlsRequest {
    pub control_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListRisksQuery {
    pub status: Option<RiskStatus>,
    pub category: Option<RiskCategory>,
    pub risk_level: Option<RiskLevel>,
    pub owner_id: Option<Uuid>,
    pub search: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RiskSummary {
    pub total_risks: usize,
    pub open_risks: usize,
    pub by_level: BTreeMap<String, usize>,
    pub by_category: BTreeMap<String, usize>,
    pub by_status: BTreeMap<String, usize>,
    pub average_score: f64,
    pub high_or_critical: usize,
    pub total_actions: usize,
    pub completed_actions: usize,
    pub overdue_actions: usize,
    pub action_completion_rate: f64,
    pub action_overdue_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HeatmapCell {
    pub impact: i32,
    pub likelihood: i32,
    pub count: usize,
    pub risk_level: RiskLevel,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RiskHeatmap {
    pub total: usize,
    pub cells: Vec<HeatmapCell>,
}

// ============================================================================
// Actions
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RiskAction {
    pub id: Uuid,
    pub org_id: Uuid,
    pub risk_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub action_type: ActionType,
    pub assigned_to: Option<Uuid>,
    pub status: ActionStatus,
    pub priority: ActionPriority,
    pub progress_percentage: i32,
    pub start_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub completed_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub is_overdue: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateRiskActionRequest {
    pub risk_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub action_type: Option<ActionType>,
    pub assigned_to: Option<Uuid>,
    pub priority: Option<ActionPriority>,
    pub progress_percentage: Option<i32>,
    pub start_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct UpdateRiskActionRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub action_type: Option<ActionType>,
    pub assigned_to: Option<Uuid>,
    pub status: Option<ActionStatus>,
    pub priority: Option<ActionPriority>,
    pub progress_percentage: Option<i32>,
    pub start_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct UpdateProgressRequest {
    pub progress_percentage: i32,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListRiskActionsQuery {
    pub risk_id: Option<Uuid>,
    pub status: Option<ActionStatus>,
    pub priority: Option<ActionPriority>,
    pub assigned_to: Option<Uuid>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}
