use chrono::NaiveDate;
use diesel::prelude::*;
use serde::Serialize;
use std::collections::HashMap;
use uuid::Uuid;

use crate::catalogs::framework_coverage;
use crate::catalogs::storage::{DbClause, DbFramework};
use crate::catalogs::tree::build_tree;
use crate::catalogs::types::{
    AssessmentStatus, ClauseNode, FrameworkCoverage, FrameworkStatus, ImplementationStatus,
};
use crate::core::shared::schema::{
    clauses, control_assessments, control_clauses, controls, frameworks, risk_actions, risks,
};
use crate::risk::analytics::{heatmap, summarize};
use crate::risk::storage::{resolve_table, DbRisk, DbRiskAction};
use crate::risk::types::{ActionStatus, RiskHeatmap, RiskSummary};

use super::analytics::{risk_compliance_correlation, RiskComplianceCorrelation};
use super::error::ReportError;
use super::storage::DbReport;
use super::types::{framework_id_param, ReportType};

#[derive(Debug, Clone, Serialize)]
pub struct MappedControl {
    pub control_id: String,
    pub name: String,
    pub assessment_status: Option<AssessmentStatus>,
    pub implementation_status: Option<ImplementationStatus>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClauseRow {
    pub depth: usize,
    pub full_clause_id: String,
    pub title: String,
    pub is_testable: bool,
    pub controls: Vec<MappedControl>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlannedAction {
    pub action: DbRiskAction,
    pub risk_code: String,
    pub risk_title: String,
}

/// Everything a report body is rendered from.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReportData {
    ComplianceSummary {
        frameworks: Vec<FrameworkCoverage>,
    },
    FrameworkAssessment {
        framework_name: String,
        framework_version: String,
        coverage: FrameworkCoverage,
        clauses: Vec<ClauseRow>,
    },
    RiskRegister {
        risks: Vec<DbRisk>,
    },
    RiskAnalytics {
        summary: RiskSummary,
        heatmap: RiskHeatmap,
        correlation: RiskComplianceCorrelation,
    },
    ActionPlan {
        actions: Vec<PlannedAction>,
    },
}

/// Depth-first flattening of a clause tree.
pub fn flatten_tree(
    nodes: &[ClauseNode],
    depth: usize,
    controls: &HashMap<Uuid, Vec<MappedControl>>,
    out: &mut Vec<ClauseRow>,
) {
    for node in nodes {
        out.push(ClauseRow {
            depth,
            full_clause_id: node.full_clause_id.clone(),
            title: node.title.clone(),
            is_testable: node.is_testable,
            controls: controls.get(&node.id).cloned().unwrap_or_default(),
        });
        flatten_tree(&node.children, depth + 1, controls, out);
    }
}

/// Earliest due date first, undated last; ties go to the higher priority.
pub fn sort_action_plan(actions: &mut [PlannedAction]) {
    actions.sort_by(|a, b| {
        let due = match (a.action.due_date, b.action.due_date) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        };
        due.then_with(|| b.action.priority.cmp(&a.action.priority))
    });
}

fn load_compliance_summary(
    conn: &mut PgConnection,
    org_id: Uuid,
) -> Result<ReportData, ReportError> {
    let rows: Vec<DbFramework> = frameworks::table
        .filter(frameworks::status.ne(FrameworkStatus::Archived))
        .order((frameworks::name.asc(), frameworks::version.asc()))
        .load(conn)?;
    let mut coverage = Vec::with_capacity(rows.len());
    for framework in &rows {
        coverage.push(framework_coverage(conn, org_id, framework)?);
    }
    Ok(ReportData::ComplianceSummary {
        frameworks: coverage,
    })
}

fn load_framework_assessment(
    conn: &mut PgConnection,
    org_id: Uuid,
    framework_id: Uuid,
) -> Result<ReportData, ReportError> {
    let framework: DbFramework = frameworks::table
        .find(framework_id)
        .first(conn)
        .optional()?
        .ok_or_else(|| ReportError::NotFound(format!("Framework {framework_id} not found")))?;
    let clause_rows: Vec<DbClause> = clauses::table
        .filter(clauses::framework_id.eq(framework_id))
        .load(conn)?;

    let mapped: Vec<(Uuid, Uuid, String, String)> = control_clauses::table
        .inner_join(controls::table)
        .inner_join(clauses::table)
        .filter(controls::org_id.eq(org_id))
        .filter(clauses::framework_id.eq(framework_id))
        .select((
            control_clauses::clause_id,
            controls::id,
            controls::control_id,
            controls::name,
        ))
        .order(controls::control_id.asc())
        .load(conn)?;
    let control_ids: Vec<Uuid> = mapped.iter().map(|(_, id, _, _)| *id).collect();
    let assessments: HashMap<Uuid, (AssessmentStatus, ImplementationStatus)> =
        control_assessments::table
            .filter(control_assessments::org_id.eq(org_id))
            .filter(control_assessments::control_id.eq_any(&control_ids))
            .select((
                control_assessments::control_id,
                control_assessments::status,
                control_assessments::implementation_status,
            ))
            .load::<(Uuid, AssessmentStatus, ImplementationStatus)>(conn)?
            .into_iter()
            .map(|(id, status, implementation)| (id, (status, implementation)))
            .collect();

    let mut by_clause: HashMap<Uuid, Vec<MappedControl>> = HashMap::new();
    for (clause_id, control_uuid, code, name) in mapped {
        let assessment = assessments.get(&control_uuid);
        by_clause.entry(clause_id).or_default().push(MappedControl {
            control_id: code,
            name,
            assessment_status: assessment.map(|(s, _)| *s),
            implementation_status: assessment.map(|(_, i)| *i),
        });
    }

    let coverage = framework_coverage(conn, org_id, &framework)?;
    let mut rows = Vec::new();
    flatten_tree(&build_tree(clause_rows), 0, &by_clause, &mut rows);

    Ok(ReportData::FrameworkAssessment {
        framework_name: framework.name,
        framework_version: framework.version,
        coverage,
        clauses: rows,
    })
}

fn load_risk_register(conn: &mut PgConnection, org_id: Uuid) -> Result<ReportData, ReportError> {
    let rows: Vec<DbRisk> = risks::table
        .filter(risks::org_id.eq(org_id))
        .order((risks::risk_score.desc(), risks::risk_id.asc()))
        .load(conn)?;
    Ok(ReportData::RiskRegister { risks: rows })
}

fn load_risk_analytics(
    conn: &mut PgConnection,
    org_id: Uuid,
    today: NaiveDate,
) -> Result<ReportData, ReportError> {
    let risk_rows: Vec<DbRisk> = risks::table
        .filter(risks::org_id.eq(org_id))
        .load(conn)?;
    let action_rows: Vec<DbRiskAction> = risk_actions::table
        .filter(risk_actions::org_id.eq(org_id))
        .load(conn)?;
    let (table, _, _) = resolve_table(conn, org_id, None)?;

    Ok(ReportData::RiskAnalytics {
        summary: summarize(&risk_rows, &action_rows, today),
        heatmap: heatmap(&risk_rows, table.as_ref()),
        correlation: risk_compliance_correlation(conn, org_id)?,
    })
}

fn load_action_plan(conn: &mut PgConnection, org_id: Uuid) -> Result<ReportData, ReportError> {
    let rows: Vec<(DbRiskAction, String, String)> = risk_actions::table
        .inner_join(risks::table)
        .filter(risk_actions::org_id.eq(org_id))
        .filter(risk_actions::status.eq_any(ActionStatus::OPEN))
        .select((risk_actions::all_columns, risks::risk_id, risks::title))
        .load(conn)?;

    let mut actions: Vec<PlannedAction> = rows
        .into_iter()
        .map(|(action, risk_code, risk_title)| PlannedAction {
            action,
            risk_code,
            risk_title,
        })
        .collect();
    sort_action_plan(&mut actions);
    Ok(ReportData::ActionPlan { actions })
}

pub fn load_report_data(
    conn: &mut PgConnection,
    report: &DbReport,
    today: NaiveDate,
) -> Result<ReportData, ReportError> {
    match report.report_type {
        ReportType::ComplianceSummary => load_compliance_summary(conn, report.org_id),
        ReportType::FrameworkAssessment => {
            let framework_id = framework_id_param(&report.parameters)?;
            load_framework_assessment(conn, report.org_id, framework_id)
        }
        ReportType::RiskRegister => load_risk_register(conn, report.org_id),
        ReportType::RiskAnalytics => load_risk_analytics(conn, report.org_id, today),
        ReportType::ActionPlan => load_action_plan(conn, report.org_id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::risk::analytics::tests::action;
    use crate::risk::types::ActionPriority;

    fn planned(due: Option<NaiveDate>, priority: ActionPriority) -> PlannedAction {
        let mut a = action(ActionStatus::Planned, due);
        a.priority = priority;
        PlannedAction {
            action: a,
            risk_code: "RISK-0001".into(),
            risk_title: "Vendor outage".into(),
        }
    }

    #[test]
    fn test_action_plan_order() {
        let d1 = NaiveDate::from_ymd_opt(2026, 7, 1).unwrap();
        let d2 = NaiveDate::from_ymd_opt(2026, 8, 1).unwrap();
        let mut actions = vec![
            planned(None, ActionPriority::Critical),
            planned(Some(d2), ActionPriority::Low),
            planned(Some(d1), ActionPriority::Low),
            planned(Some(d1), ActionPriority::High),
        ];
        sort_action_plan(&mut actions);
        let order: Vec<_> = actions
            .iter()
            .map(|p| (p.action.due_date, p.action.priority))
            .collect();
        assert_eq!(
            order,
            vec![
                (Some(d1), ActionPriority::High),
                (Some(d1), ActionPriority::Low),
                (Some(d2), ActionPriority::Low),
                (None, ActionPriority::Critical),
            ]
        );
    }

    #[test]
    fn test_flatten_tree_keeps_depth_and_controls() {
        let child_id = Uuid::new_v4();
        let tree = vec![ClauseNode {
            id: Uuid::new_v4(),
            clause_id: "A.5".into(),
            full_clause_id: "A.5".into(),
            title: "Policies".into(),
            clause_type: crate::catalogs::types::ClauseType::Section,
            is_testable: false,
            sort_order: 0,
            children: vec![ClauseNode {
                id: child_id,
                clause_id: "1".into(),
                full_clause_id: "A.5.1".into(),
                title: "Policy set".into(),
                clause_type: crate::catalogs::types::ClauseType::Control,
                is_testable: true,
                sort_order: 0,
                children: vec![],
            }],
        }];
        let controls = HashMap::from([(
            child_id,
            vec![MappedControl {
                control_id: "CTL-1".into(),
                name: "Policy review".into(),
                assessment_status: Some(AssessmentStatus::Completed),
                implementation_status: Some(ImplementationStatus::Implemented),
            }],
        )]);

        let mut rows = Vec::new();
        flatten_tree(&tree, 0, &controls, &mut rows);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].depth, 1);
        assert_eq!(rows[1].full_clause_id, "A.5.1");
        assert_eq!(rows[1].controls.len(), 1);
        assert!(rows[0].controls.is_empty());
    }
}
