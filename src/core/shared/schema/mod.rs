pub mod catalogs;
pub mod core;
pub mod notifications;
#[path = "reports.rs"]
pub mod reports_schema;
pub mod risk;

pub use self::catalogs::*;
pub use self::core::*;
pub use self::notifications::*;
pub use self::reports_schema::*;
pub use self::risk::*;

diesel::joinable!(controls -> organizations (org_id));
diesel::joinable!(risk_controls -> controls (control_id));
diesel::joinable!(reminder_configurations -> users (user_id));
diesel::joinable!(reminder_logs -> users (user_id));

diesel::allow_tables_to_appear_in_same_query!(
    organizations,
    users,
    frameworks,
    clauses,
    controls,
    control_clauses,
    control_assessments,
    risk_matrices,
    risks,
    risk_controls,
    risk_actions,
    reminder_configurations,
    reminder_logs,
    documents,
    reports,
);
