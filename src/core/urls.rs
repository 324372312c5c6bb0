#[derive(Debug)]
pub struct ApiUrls;

impl ApiUrls {
    // Health & docs
    pub const HEALTH: &'static str = "/api/health";
    pub const OPENAPI: &'static str = "/api/openapi.json";

    // Catalogs - frameworks, clauses, controls
    pub const FRAMEWORKS: &'static str = "/api/frameworks";
    pub const FRAMEWORK_BY_ID: &'static str = "/api/frameworks/:id";
    pub const FRAMEWORK_CLAUSES: &'static str = "/api/frameworks/:id/clauses";
    pub const FRAMEWORK_COVERAGE: &'static str = "/api/frameworks/:id/coverage";
    pub const CLAUSES: &'static str = "/api/clauses";
    pub const CLAUSE_BY_ID: &'static str = "/api/clauses/:id";
    pub const CONTROLS: &'static str = "/api/controls";
    pub const CONTROL_BY_ID: &'static str = "/api/controls/:id";
    pub const CONTROL_CLAUSES: &'static str = "/api/controls/:id/clauses";
    pub const CONTROL_MARK_TESTED: &'static str = "/api/controls/:id/mark-tested";

    // Catalogs - assessments
    pub const ASSESSMENTS: &'static str = "/api/assessments";
    pub const ASSESSMENTS_BULK_CREATE: &'static str = "/api/assessments/bulk-create";
    pub const ASSESSMENT_BY_ID: &'static str = "/api/assessments/:id";
    pub const ASSESSMENT_ASSIGN: &'static str = "/api/assessments/:id/assign";
    pub const ASSESSMENT_TRANSITION: &'static str = "/api/assessments/:id/transition";
    pub const ASSESSMENT_HISTORY: &'static str = "/api/assessments/:id/history";

    // Risk
    pub const RISK_MATRICES: &'static str = "/api/risk-matrices";
    pub const RISK_MATRIX_CALCULATE: &'static str = "/api/risk-matrices/calculate";
    pub const RISK_MATRIX_BY_ID: &'static str = "/api/risk-matrices/:id";
    pub const RISK_MATRIX_DEFAULT: &'static str = "/api/risk-matrices/:id/default";
    pub const RISKS: &'static str = "/api/risks";
    pub const RISK_SUMMARY: &'static str = "/api/risks/summary";
    pub const RISK_HEATMAP: &'static str = "/api/risks/heatmap";
    pub const RISK_BY_ID: &'static str = "/api/risks/:id";
    pub const RISK_CONTROLS: &'static str = "/api/risks/:id/controls";
    pub const RISK_ACTIONS: &'static str = "/api/risk-actions";
    pub const RISK_ACTIONS_OVERDUE: &'static str = "/api/risk-actions/overdue";
    pub const RISK_ACTION_BY_ID: &'static str = "/api/risk-actions/:id";
    pub const RISK_ACTION_PROGRESS: &'static str = "/api/risk-actions/:id/progress";

    // Notifications
    pub const REMINDER_CONFIG: &'static str = "/api/reminders/config";
    pub const REMINDER_LOGS: &'static str = "/api/reminders/logs";

    // Reports
    pub const REPORTS: &'static str = "/api/reports";
    pub const REPORT_BY_ID: &'static str = "/api/reports/:id";
    pub const REPORT_DOWNLOAD: &'static str = "/api/reports/:id/download";
    pub const REPORT_RETRY: &'static str = "/api/reports/:id/retry";
}
