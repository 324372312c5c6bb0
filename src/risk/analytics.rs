use chrono::NaiveDate;
use std::collections::BTreeMap;

use super::matrix::{Rating, RiskMatrixTable};
use super::scoring::fallback_level;
use super::storage::{DbRisk, DbRiskAction};
use super::treatment::is_overdue;
use super::types::{ActionStatus, HeatmapCell, RiskHeatmap, RiskLevel, RiskSummary};

fn rate(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    ((part as f64 / whole as f64) * 1000.0).round() / 10.0
}

pub fn summarize(risks: &[DbRisk], actions: &[DbRiskAction], today: NaiveDate) -> RiskSummary {
    let mut by_level = BTreeMap::new();
    let mut by_category = BTreeMap::new();
    let mut by_status = BTreeMap::new();
    for level in RiskLevel::ALL {
        by_level.insert(level.to_string(), 0);
    }

    for risk in risks {
        *by_level.entry(risk.risk_level.to_string()).or_insert(0) += 1;
        *by_category.entry(risk.category.to_string()).or_insert(0) += 1;
        *by_status.entry(risk.status.to_string()).or_insert(0) += 1;
    }

    let total_score: i64 = risks.iter().map(|r| i64::from(r.risk_score)).sum();
    let average_score = if risks.is_empty() {
        0.0
    } else {
        ((total_score as f64 / risks.len() as f64) * 100.0).round() / 100.0
    };

    let completed_actions = actions
        .iter()
        .filter(|a| a.status == ActionStatus::Completed)
        .count();
    let overdue_actions = actions.iter().filter(|a| is_overdue(a, today)).count();
    let countable = actions
        .iter()
        .filter(|a| a.status != ActionStatus::Cancelled)
        .count();

    RiskSummary {
        total_risks: risks.len(),
        open_risks: risks.iter().filter(|r| r.status.is_open()).count(),
        by_level,
        by_category,
        by_status,
        average_score,
        high_or_critical: risks
            .iter()
            .filter(|r| matches!(r.risk_level, RiskLevel::High | RiskLevel::Critical))
            .count(),
        total_actions: actions.len(),
        completed_actions,
        overdue_actions,
        action_completion_rate: rate(completed_actions, countable),
        action_overdue_rate: rate(overdue_actions, countable),
    }
}

/// Counts risks per `(impact, likelihood)` cell; every cell is present.
pub fn heatmap(risks: &[DbRisk], table: Option<&RiskMatrixTable>) -> RiskHeatmap {
    let mut counts = [[0usize; 5]; 5];
    for risk in risks {
        if let (Ok(i), Ok(l)) = (
            Rating::new(risk.impact, "impact"),
            Rating::new(risk.likelihood, "likelihood"),
        ) {
            counts[(i.get() - 1) as usize][(l.get() - 1) as usize] += 1;
        }
    }

    let mut cells = Vec::with_capacity(25);
    for impact in Rating::all() {
        for likelihood in Rating::all() {
            let risk_level = match table {
                Some(table) => table.level(impact, likelihood),
                None => fallback_level(impact, likelihood),
            };
            cells.push(HeatmapCell {
                impact: impact.get(),
                likelihood: likelihood.get(),
                count: counts[(impact.get() - 1) as usize][(likelihood.get() - 1) as usize],
                risk_level,
            });
        }
    }

    RiskHeatmap {
        total: risks.len(),
        cells,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::risk::types::{
        ActionPriority, ActionType, RiskCategory, RiskStatus, TreatmentStrategy,
    };
    use chrono::Utc;
    use uuid::Uuid;

    pub(crate) fn risk(impact: i32, likelihood: i32, level: RiskLevel) -> DbRisk {
        DbRisk {
            id: Uuid::new_v4(),
            org_id: Uuid::nil(),
            risk_id: "RISK-0001".into(),
            title: "Vendor outage".into(),
            description: None,
            category: RiskCategory::Operational,
            status: RiskStatus::Assessed,
            owner_id: None,
            impact,
            likelihood,
            risk_score: impact * likelihood,
            risk_level: level,
            risk_matrix_id: None,
            treatment_strategy: TreatmentStrategy::Mitigate,
            treatment_description: None,
            identified_date: Utc::now().date_naive(),
            last_assessed_date: None,
            next_review_date: None,
            created_by: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    pub(crate) fn action(status: ActionStatus, due: Option<NaiveDate>) -> DbRiskAction {
        DbRiskAction {
            id: Uuid::new_v4(),
            org_id: Uuid::nil(),
            risk_id: Uuid::nil(),
            title: "Action".into(),
            description: None,
            action_type: ActionType::Corrective,
            assigned_to: None,
            status,
            priority: ActionPriority::Medium,
            progress_percentage: 0,
            start_date: None,
            due_date: due,
            completed_date: None,
            notes: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_summary_counts_and_rates() {
        let today = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        let yesterday = today.pred_opt().unwrap();
        let risks = vec![
            risk(5, 5, RiskLevel::Critical),
            risk(2, 2, RiskLevel::Low),
            risk(3, 4, RiskLevel::High),
        ];
        let actions = vec![
            action(ActionStatus::Completed, None),
            action(ActionStatus::InProgress, Some(yesterday)),
            action(ActionStatus::Planned, None),
            action(ActionStatus::Cancelled, Some(yesterday)),
        ];

        let summary = summarize(&risks, &actions, today);
        assert_eq!(summary.total_risks, 3);
        assert_eq!(summary.by_level["critical"], 1);
        assert_eq!(summary.by_level["medium"], 0);
        assert_eq!(summary.high_or_critical, 2);
        assert_eq!(summary.average_score, 13.67);
        assert_eq!(summary.overdue_actions, 1);
        assert_eq!(summary.action_completion_rate, 33.3);
        assert_eq!(summary.action_overdue_rate, 33.3);
    }

    #[test]
    fn test_empty_summary() {
        let summary = summarize(&[], &[], Utc::now().date_naive());
        assert_eq!(summary.average_score, 0.0);
        assert_eq!(summary.action_completion_rate, 0.0);
    }

    #[test]
    fn test_heatmap_has_all_cells() {
        let risks = vec![
            risk(5, 5, RiskLevel::Critical),
            risk(5, 5, RiskLevel::Critical),
            risk(1, 2, RiskLevel::Low),
        ];
        let map = heatmap(&risks, Some(&RiskMatrixTable::standard()));
        assert_eq!(map.cells.len(), 25);
        assert_eq!(map.total, 3);
        let top = map
            .cells
            .iter()
            .find(|c| c.impact == 5 && c.likelihood == 5)
            .unwrap();
        assert_eq!(top.count, 2);
        assert_eq!(top.risk_level, RiskLevel::Critical);
    }
}
