//! OpenAPI document served at `/api/openapi.json`.

use axum::Json;
use utoipa::OpenApi;

use crate::reports::analytics::RiskComplianceCorrelation;
use crate::{catalogs, notifications, reports, risk};

#[derive(OpenApi)]
#[openapi(
    info(title = "grcserver", description = "Governance, risk and compliance API"),
    paths(
        catalogs::handle_list_frameworks,
        catalogs::handle_create_framework,
        catalogs::handle_get_framework,
        catalogs::handle_update_framework,
        catalogs::handle_delete_framework,
        catalogs::handle_get_framework_clauses,
        catalogs::handle_get_framework_coverage,
        catalogs::handle_list_clauses,
        catalogs::handle_create_clause,
        catalogs::handle_get_clause,
        catalogs::handle_update_clause,
        catalogs::handle_delete_clause,
        catalogs::handle_list_controls,
        catalogs::handle_create_control,
        catalogs::handle_get_control,
        catalogs::handle_update_control,
        catalogs::handle_delete_control,
        catalogs::handle_replace_control_clauses,
        catalogs::handle_mark_control_tested,
        catalogs::handle_list_assessments,
        catalogs::handle_create_assessment,
        catalogs::handle_bulk_create_assessments,
        catalogs::handle_get_assessment,
        catalogs::handle_update_assessment,
        catalogs::handle_assign_assessment,
        catalogs::handle_transition_assessment,
        catalogs::handle_get_assessment_history,
        risk::handle_list_matrices,
        risk::handle_create_matrix,
        risk::handle_get_matrix,
        risk::handle_update_matrix,
        risk::handle_delete_matrix,
        risk::handle_set_default_matrix,
        risk::handle_calculate_risk,
        risk::handle_list_risks,
        risk::handle_create_risk,
        risk::handle_get_risk,
        risk::handle_update_risk,
        risk::handle_delete_risk,
        risk::handle_replace_risk_controls,
        risk::handle_risk_summary,
        risk::handle_risk_heatmap,
        risk::handle_list_actions,
        risk::handle_list_overdue_actions,
        risk::handle_create_action,
        risk::handle_get_action,
        risk::handle_update_action,
        risk::handle_delete_action,
        risk::handle_update_action_progress,
        notifications::handle_get_reminder_config,
        notifications::handle_update_reminder_config,
        notifications::handle_list_reminder_logs,
        reports::handle_list_reports,
        reports::handle_create_report,
        reports::handle_get_report,
        reports::handle_download_report,
        reports::handle_retry_report,
    ),
    components(schemas(
        catalogs::FrameworkStatus, catalogs::ClauseType, catalogs::ControlType,
        catalogs::AutomationLevel, catalogs::ControlStatus, catalogs::ControlFrequency,
        catalogs::Effectiveness, catalogs::Applicability, catalogs::ImplementationStatus,
        catalogs::AssessmentStatus, catalogs::Framework, catalogs::CreateFrameworkRequest,
        catalogs::UpdateFrameworkRequest, catalogs::FrameworkCoverage, catalogs::Clause,
        catalogs::ClauseNode, catalogs::CreateClauseRequest, catalogs::UpdateClauseRequest,
        catalogs::Control, catalogs::CreateControlRequest, catalogs::UpdateControlRequest,
        catalogs::ReplaceControlClausesRequest, catalogs::MarkTestedRequest,
        catalogs::Assessment, catalogs::CreateAssessmentRequest,
        catalogs::BulkCreateAssessmentsRequest, catalogs::BulkCreateAssessmentsResponse,
        catalogs::UpdateAssessmentRequest, catalogs::AssignAssessmentRequest,
        catalogs::TransitionAssessmentRequest, catalogs::ChangeLogEntry, risk::RiskLevel,
        risk::RiskCategory, risk::RiskStatus, risk::TreatmentStrategy, risk::ActionType,
        risk::ActionStatus, risk::ActionPriority, risk::RiskMatrix,
        risk::CreateRiskMatrixRequest, risk::UpdateRiskMatrixRequest, risk::RiskCalculation,
        risk::Risk, risk::CreateRiskRequest, risk::UpdateRiskRequest,
        risk::ReplaceRiskControlsRequest, risk::RiskSummary, risk::HeatmapCell,
        risk::RiskHeatmap, risk::RiskAction, risk::CreateRiskActionRequest,
        risk::UpdateRiskActionRequest, risk::UpdateProgressRequest, notifications::EntityType,
        notifications::ReminderType, notifications::ReminderConfiguration,
        notifications::UpdateReminderConfigRequest, notifications::ReminderLogEntry,
        reports::ReportType, reports::ReportStatus, reports::Report,
        reports::CreateReportRequest, reports::DocumentInfo, RiskComplianceCorrelation,
    )),
    tags(
        (name = "catalogs", description = "Frameworks, clauses, controls and assessments"),
        (name = "risk", description = "Risk matrices, risks and treatment actions"),
        (name = "notifications", description = "Reminder settings and delivery log"),
        (name = "reports", description = "Report generation and download"),
    )
)]
pub struct ApiDoc;

pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_lists_every_route_group() {
        let doc = ApiDoc::openapi();
        let paths: Vec<&String> = doc.paths.paths.keys().collect();
        for expected in [
            "/api/frameworks",
            "/api/risks/{id}",
            "/api/reminders/config",
            "/api/reports/{id}/download",
        ] {
            assert!(
                paths.iter().any(|p| p.as_str() == expected),
                "missing {expected}"
            );
        }
    }
}
