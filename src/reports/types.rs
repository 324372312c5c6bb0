use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use uuid::Uuid;

use super::error::ReportError;

crate::text_enum! {
    pub enum ReportType {
        ComplianceSummary => "compliance_summary",
        FrameworkAssessment => "framework_assessment",
        RiskRegister => "risk_register",
        RiskAnalytics => "risk_analytics",
        ActionPlan => "action_plan",
    }
}

crate::text_enum! {
    pub enum ReportStatus {
        Pending => "pending",
        Processing => "processing",
        Completed => "completed",
        Failed => "failed",
    }
}

impl ReportType {
    pub fn default_title(&self) -> &'static str {
        match self {
            Self::ComplianceSummary => "Compliance Summary",
            Self::FrameworkAssessment => "Framework Assessment",
            Self::RiskRegister => "Risk Register",
            Self::RiskAnalytics => "Risk Analytics",
            Self::ActionPlan => "Action Plan",
        }
    }
}

impl ReportStatus {
    pub fn can_transition_to(&self, next: ReportStatus) -> bool {
        use ReportStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Failed, Pending)
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Report {
    pub id: Uuid,
    pub org_id: Uuid,
    pub title: String,
    pub report_type: ReportType,
    pub parameters: Value,
    pub status: ReportStatus,
    pub requested_by: Option<Uuid>,
    pub document_id: Option<Uuid>,
    pub error_message: Option<String>,
    pub attempts: i32,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub download_url: Option<String>,
    /// Present on single-report reads once a document exists.
    pub document: Option<DocumentInfo>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateReportRequest {
    pub report_type: ReportType,
    pub title: Option<String>,
    /// `framework_assessment` needs `{"framework_id": "<uuid>"}`.
    pub parameters: Option<Value>,
}

impl CreateReportRequest {
    /// Checks the parameters the report type needs; returns them normalized.
    pub fn validated_parameters(&self) -> Result<Value, ReportError> {
        let parameters = self
            .parameters
            .clone()
            .unwrap_or_else(|| Value::Object(Default::default()));
        if !parameters.is_object() {
            return Err(ReportError::Validation(
                "parameters must be a JSON object".to_string(),
            ));
        }
        if self.report_type == ReportType::FrameworkAssessment {
            framework_id_param(&parameters)?;
        }
        Ok(parameters)
    }
}

pub fn framework_id_param(parameters: &Value) -> Result<Uuid, ReportError> {
    parameters
        .get("framework_id")
        .and_then(Value::as_str)
        .and_then(|raw| Uuid::parse_str(raw).ok())
        .ok_or_else(|| {
            ReportError::Validation(
                "framework_assessment reports need a framework_id parameter".to_string(),
            )
        })
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListReportsQuery {
    pub status: Option<ReportStatus>,
    pub report_type: Option<ReportType>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DocumentInfo {
    pub id: Uuid,
    pub file_name: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub sha256: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_transitions() {
        assert!(ReportStatus::Pending.can_transition_to(ReportStatus::Processing));
        assert!(ReportStatus::Processing.can_transition_to(ReportStatus::Failed));
        assert!(ReportStatus::Failed.can_transition_to(ReportStatus::Pending));
        assert!(!ReportStatus::Pending.can_transition_to(ReportStatus::Completed));
        assert!(!ReportStatus::Completed.can_transition_to(ReportStatus::Pending));
        assert!(!ReportStatus::Completed.can_transition_to(ReportStatus::Processing));
    }

    #[test]
    fn test_framework_assessment_requires_framework() {
        let missing = CreateReportRequest {
            report_type: ReportType::FrameworkAssessment,
            title: None,
            parameters: None,
        };
        assert!(missing.validated_parameters().is_err());

        let ok = CreateReportRequest {
            report_type: ReportType::FrameworkAssessment,
            title: None,
            parameters: Some(serde_json::json!({ "framework_id": Uuid::new_v4() })),
        };
        assert!(ok.validated_parameters().is_ok());
    }

    #[test]
    fn test_parameters_must_be_object() {
        let req = CreateReportRequest {
            report_type: ReportType::RiskRegister,
            title: None,
            parameters: Some(serde_json::json!([1, 2])),
        };
        assert!(req.validated_parameters().is_err());
        let empty = CreateReportRequest {
            report_type: ReportType::RiskRegister,
            title: None,
            parameters: None,
        };
        assert_eq!(empty.validated_parameters().unwrap(), serde_json::json!({}));
    }
}
