use chrono::{DateTime, Utc};
use std::fmt::Write;

use crate::catalogs::types::FrameworkCoverage;
use crate::risk::types::RiskLevel;
use crate::shared::utils::html_escape;

use super::data::{ClauseRow, PlannedAction, ReportData};
use crate::risk::storage::DbRisk;
use crate::risk::types::{RiskHeatmap, RiskSummary};

use super::analytics::RiskComplianceCorrelation;

const STYLE: &str = r#"
body { font-family: Helvetica, Arial, sans-serif; font-size: 11px; color: #222; }
h1 { font-size: 20px; margin-bottom: 2px; }
h2 { font-size: 15px; margin-top: 18px; border-bottom: 1px solid #ccc; }
table { border-collapse: collapse; width: 100%; margin-top: 6px; }
th, td { border: 1px solid #ccc; padding: 3px 5px; text-align: left; vertical-align: top; }
th { background: #f0f0f0; }
.meta { color: #666; }
.low { background: #d9f2d9; } .medium { background: #fff3c4; }
.high { background: #ffd8b0; } .critical { background: #f8b4b4; }
"#;

fn level_class(level: RiskLevel) -> &'static str {
    level.as_str()
}

fn opt<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}

fn counts_table(html: &mut String, heading: &str, counts: &std::collections::BTreeMap<String, impl std::fmt::Display>) {
    let _ = write!(html, "<table><tr><th>{}</th><th>Count</th></tr>", html_escape(heading));
    for (key, value) in counts {
        let _ = write!(html, "<tr><td>{}</td><td>{}</td></tr>", html_escape(key), value);
    }
    html.push_str("</table>\n");
}

fn coverage_row(html: &mut String, c: &FrameworkCoverage) {
    let _ = write!(
        html,
        "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{:.1}%</td><td>{}</td></tr>",
        html_escape(&c.framework_name),
        c.total_clauses,
        c.testable_clauses,
        c.covered_clauses,
        c.coverage_percentage,
        c.mapped_controls
    );
}

fn render_compliance_summary(html: &mut String, frameworks: &[FrameworkCoverage]) {
    html.push_str("<h2>Framework coverage</h2>\n");
    if frameworks.is_empty() {
        html.push_str("<p>No frameworks in the catalog.</p>\n");
        return;
    }
    html.push_str(
        "<table><tr><th>Framework</th><th>Clauses</th><th>Testable</th><th>Covered</th>\
         <th>Coverage</th><th>Controls</th></tr>",
    );
    for c in frameworks {
        coverage_row(html, c);
    }
    html.push_str("</table>\n");

    for c in frameworks.iter().filter(|c| c.mapped_controls > 0) {
        let _ = writeln!(html, "<h2>{}</h2>", html_escape(&c.framework_name));
        counts_table(html, "Assessment status", &c.assessment_status_counts);
        counts_table(html, "Implementation status", &c.implementation_status_counts);
    }
}

fn render_framework_assessment(
    html: &mut String,
    name: &str,
    version: &str,
    coverage: &FrameworkCoverage,
    clauses: &[ClauseRow],
) {
    let _ = writeln!(
        html,
        "<h2>{} {}</h2>\n<p>{} of {} testable clauses covered ({:.1}%), {} mapped controls.</p>",
        html_escape(name),
        html_escape(version),
        coverage.covered_clauses,
        coverage.testable_clauses,
        coverage.coverage_percentage,
        coverage.mapped_controls
    );
    html.push_str(
        "<table><tr><th>Clause</th><th>Title</th><th>Controls</th><th>Assessment</th>\
         <th>Implementation</th></tr>",
    );
    for row in clauses {
        let indent = row.depth * 14;
        let marker = if row.is_testable && row.controls.is_empty() {
            " (not covered)"
        } else {
            ""
        };
        if row.controls.is_empty() {
            let _ = write!(
                html,
                "<tr><td style=\"padding-left:{indent}px\">{}</td><td>{}{}</td><td>-</td><td>-</td><td>-</td></tr>",
                html_escape(&row.full_clause_id),
                html_escape(&row.title),
                marker
            );
            continue;
        }
        for (i, control) in row.controls.iter().enumerate() {
            let (clause_cell, title_cell) = if i == 0 {
                (html_escape(&row.full_clause_id), html_escape(&row.title))
            } else {
                (String::new(), String::new())
            };
            let _ = write!(
                html,
                "<tr><td style=\"padding-left:{indent}px\">{}</td><td>{}</td><td>{} {}</td><td>{}</td><td>{}</td></tr>",
                clause_cell,
                title_cell,
                html_escape(&control.control_id),
                html_escape(&control.name),
                opt(control.assessment_status),
                opt(control.implementation_status)
            );
        }
    }
    html.push_str("</table>\n");
}

fn render_risk_register(html: &mut String, risks: &[DbRisk]) {
    let _ = writeln!(html, "<h2>Risks ({})</h2>", risks.len());
    html.push_str(
        "<table><tr><th>ID</th><th>Title</th><th>Category</th><th>Impact</th><th>Likelihood</th>\
         <th>Score</th><th>Level</th><th>Status</th><th>Owner</th><th>Treatment</th></tr>",
    );
    for r in risks {
        let _ = write!(
            html,
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td>\
             <td class=\"{}\">{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
            html_escape(&r.risk_id),
            html_escape(&r.title),
            r.category,
            r.impact,
            r.likelihood,
            r.risk_score,
            level_class(r.risk_level),
            r.risk_level,
            r.status,
            opt(r.owner_id),
            r.treatment_strategy
        );
    }
    html.push_str("</table>\n");
}

fn render_heatmap(html: &mut String, heatmap: &RiskHeatmap) {
    html.push_str("<h2>Heatmap</h2>\n<table><tr><th>Impact \\ Likelihood</th>");
    for likelihood in 1..=5 {
        let _ = write!(html, "<th>{likelihood}</th>");
    }
    html.push_str("</tr>");
    for impact in (1..=5).rev() {
        let _ = write!(html, "<tr><th>{impact}</th>");
        for likelihood in 1..=5 {
            if let Some(cell) = heatmap
                .cells
                .iter()
                .find(|c| c.impact == impact && c.likelihood == likelihood)
            {
                let _ = write!(
                    html,
                    "<td class=\"{}\">{}</td>",
                    level_class(cell.risk_level),
                    cell.count
                );
            } else {
                html.push_str("<td>-</td>");
            }
        }
        html.push_str("</tr>");
    }
    html.push_str("</table>\n");
}

fn render_risk_analytics(
    html: &mut String,
    summary: &RiskSummary,
    heatmap: &RiskHeatmap,
    correlation: &RiskComplianceCorrelation,
) {
    let _ = writeln!(
        html,
        "<h2>Overview</h2>\n<table>\
         <tr><th>Total risks</th><td>{}</td></tr>\
         <tr><th>Open risks</th><td>{}</td></tr>\
         <tr><th>High or critical</th><td>{}</td></tr>\
         <tr><th>Average score</th><td>{:.2}</td></tr>\
         <tr><th>Action completion rate</th><td>{:.1}%</td></tr>\
         <tr><th>Action overdue rate</th><td>{:.1}%</td></tr>\
         </table>",
        summary.total_risks,
        summary.open_risks,
        summary.high_or_critical,
        summary.average_score,
        summary.action_completion_rate,
        summary.action_overdue_rate
    );
    counts_table(html, "Level", &summary.by_level);
    counts_table(html, "Category", &summary.by_category);
    counts_table(html, "Status", &summary.by_status);
    render_heatmap(html, heatmap);

    html.push_str("<h2>Risk vs. control implementation</h2>\n");
    match correlation.coefficient {
        Some(r) => {
            let _ = writeln!(
                html,
                "<p>Pearson correlation between risk score and control implementation: \
                 <strong>{r:.3}</strong> over {} risks.</p>",
                correlation.samples
            );
        }
        None => {
            let _ = writeln!(
                html,
                "<p>Not enough data to correlate risk scores with control implementation \
                 ({} risks with linked controls).</p>",
                correlation.samples
            );
        }
    }
}

fn render_action_plan(html: &mut String, actions: &[PlannedAction], today: chrono::NaiveDate) {
    let _ = writeln!(html, "<h2>Open actions ({})</h2>", actions.len());
    html.push_str(
        "<table><tr><th>Due</th><th>Action</th><th>Risk</th><th>Type</th><th>Priority</th>\
         <th>Status</th><th>Progress</th><th>Assignee</th></tr>",
    );
    for p in actions {
        let a = &p.action;
        let overdue = a.due_date.is_some_and(|d| d < today);
        let _ = write!(
            html,
            "<tr><td{}>{}</td><td>{}</td><td>{} {}</td><td>{}</td><td>{}</td><td>{}</td>\
             <td>{}%</td><td>{}</td></tr>",
            if overdue { " class=\"critical\"" } else { "" },
            opt(a.due_date),
            html_escape(&a.title),
            html_escape(&p.risk_code),
            html_escape(&p.risk_title),
            a.action_type,
            a.priority,
            a.status,
            a.progress_percentage,
            opt(a.assigned_to)
        );
    }
    html.push_str("</table>\n");
}

/// Full HTML document for a report.
pub fn render_html(title: &str, data: &ReportData, generated_at: DateTime<Utc>) -> String {
    let mut body = String::new();
    match data {
        ReportData::ComplianceSummary { frameworks } => {
            render_compliance_summary(&mut body, frameworks)
        }
        ReportData::FrameworkAssessment {
            framework_name,
            framework_version,
            coverage,
            clauses,
        } => render_framework_assessment(
            &mut body,
            framework_name,
            framework_version,
            coverage,
            clauses,
        ),
        ReportData::RiskRegister { risks } => render_risk_register(&mut body, risks),
        ReportData::RiskAnalytics {
            summary,
            heatmap,
            correlation,
        } => render_risk_analytics(&mut body, summary, heatmap, correlation),
        ReportData::ActionPlan { actions } => {
            render_action_plan(&mut body, actions, generated_at.date_naive())
        }
    }

    format!(
        "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>{title}</title>\
         <style>{STYLE}</style></head>\n<body>\n<h1>{title}</h1>\n\
         <p class=\"meta\">Generated {generated}</p>\n{body}</body></html>\n",
        title = html_escape(title),
        generated = generated_at.format("%Y-%m-%d %H:%M UTC"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::risk::analytics::tests::risk;
    use crate::risk::analytics::{heatmap, summarize};
    use crate::risk::matrix::RiskMatrixTable;

    #[test]
    fn test_register_lists_every_risk() {
        let mut critical = risk(5, 5, RiskLevel::Critical);
        critical.title = "Ransomware <x>".into();
        let data = ReportData::RiskRegister {
            risks: vec![critical, risk(1, 2, RiskLevel::Low)],
        };
        let html = render_html("Risk Register", &data, Utc::now());
        assert!(html.contains("<h2>Risks (2)</h2>"));
        assert!(html.contains("Ransomware &lt;x&gt;"));
        assert!(html.contains("class=\"critical\""));
    }

    #[test]
    fn test_analytics_without_correlation() {
        let risks = vec![risk(4, 4, RiskLevel::High)];
        let data = ReportData::RiskAnalytics {
            summary: summarize(&risks, &[], Utc::now().date_naive()),
            heatmap: heatmap(&risks, Some(&RiskMatrixTable::standard())),
            correlation: RiskComplianceCorrelation {
                coefficient: None,
                samples: 1,
            },
        };
        let html = render_html("Risk Analytics", &data, Utc::now());
        assert!(html.contains("Not enough data"));
        assert!(html.contains("<h2>Heatmap</h2>"));
    }

    #[test]
    fn test_empty_compliance_summary() {
        let data = ReportData::ComplianceSummary { frameworks: vec![] };
        let html = render_html("Compliance <Summary>", &data, Utc::now());
        assert!(html.contains("No frameworks in the catalog."));
        assert!(html.contains("<h1>Compliance &lt;Summary&gt;</h1>"));
    }
}
