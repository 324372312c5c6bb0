use diesel::prelude::*;
use serde::Serialize;
use std::collections::HashMap;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::catalogs::types::ImplementationStatus;
use crate::core::shared::schema::{control_assessments, risk_controls, risks};

const MIN_SAMPLES: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct RiskComplianceCorrelation {
    /// Pearson coefficient, absent when it cannot be computed.
    pub coefficient: Option<f64>,
    pub samples: usize,
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// Pearson correlation of paired samples; `None` below three samples or with zero variance.
pub fn pearson(xs: &[f64], ys: &[f64]) -> Option<f64> {
    if xs.len() != ys.len() || xs.len() < MIN_SAMPLES {
        return None;
    }
    let n = xs.len() as f64;
    let mean_x = xs.iter().sum::<f64>() / n;
    let mean_y = ys.iter().sum::<f64>() / n;

    let (mut cov, mut var_x, mut var_y) = (0.0, 0.0, 0.0);
    for (x, y) in xs.iter().zip(ys) {
        let dx = x - mean_x;
        let dy = y - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }
    if var_x == 0.0 || var_y == 0.0 {
        return None;
    }
    Some(round3(cov / (var_x.sqrt() * var_y.sqrt())))
}

/// Pairs each risk score with the mean implementation score of its linked controls.
/// Risks without linked controls are left out; unassessed controls count as 0.
pub fn correlation_samples(
    risk_scores: &[(Uuid, i32)],
    links: &[(Uuid, Uuid)],
    implementation: &HashMap<Uuid, ImplementationStatus>,
) -> (Vec<f64>, Vec<f64>) {
    let mut controls_by_risk: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
    for (risk_id, control_id) in links {
        controls_by_risk.entry(*risk_id).or_default().push(*control_id);
    }

    let mut scores = Vec::new();
    let mut ratios = Vec::new();
    for (risk_id, score) in risk_scores {
        let Some(controls) = controls_by_risk.get(risk_id) else {
            continue;
        };
        let total: f64 = controls
            .iter()
            .map(|c| implementation.get(c).map(|s| s.score()).unwrap_or(0.0))
            .sum();
        scores.push(f64::from(*score));
        ratios.push(total / controls.len() as f64);
    }
    (scores, ratios)
}

pub fn risk_compliance_correlation(
    conn: &mut PgConnection,
    org_id: Uuid,
) -> QueryResult<RiskComplianceCorrelation> {
    let risk_scores: Vec<(Uuid, i32)> = risks::table
        .filter(risks::org_id.eq(org_id))
        .select((risks::id, risks::risk_score))
        .load(conn)?;
    let risk_ids: Vec<Uuid> = risk_scores.iter().map(|(id, _)| *id).collect();

    let links: Vec<(Uuid, Uuid)> = risk_controls::table
        .filter(risk_controls::risk_id.eq_any(&risk_ids))
        .select((risk_controls::risk_id, risk_controls::control_id))
        .load(conn)?;
    let control_ids: Vec<Uuid> = links.iter().map(|(_, c)| *c).collect();

    let implementation: HashMap<Uuid, ImplementationStatus> = control_assessments::table
        .filter(control_assessments::org_id.eq(org_id))
        .filter(control_assessments::control_id.eq_any(&control_ids))
        .select((
            control_assessments::control_id,
            control_assessments::implementation_status,
        ))
        .load::<(Uuid, ImplementationStatus)>(conn)?
        .into_iter()
        .collect();

    let (scores, ratios) = correlation_samples(&risk_scores, &links, &implementation);
    Ok(RiskComplianceCorrelation {
        coefficient: pearson(&scores, &ratios),
        samples: scores.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_perfect_negative_correlation() {
        let xs = [25.0, 16.0, 9.0, 4.0];
        let ys = [0.0, 0.25, 0.5, 0.75];
        let r = pearson(&xs, &ys).unwrap();
        assert!(r < -0.95);
    }

    #[test]
    fn test_too_few_samples_or_no_variance() {
        assert_eq!(pearson(&[1.0, 2.0], &[1.0, 2.0]), None);
        assert_eq!(pearson(&[5.0, 5.0, 5.0], &[0.1, 0.5, 0.9]), None);
    }

    #[test]
    fn test_linear_is_one() {
        assert_eq!(pearson(&[1.0, 2.0, 3.0], &[2.0, 4.0, 6.0]), Some(1.0));
    }

    #[test]
    fn test_samples_skip_risks_without_controls() {
        let (r1, r2, r3) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let (c1, c2) = (Uuid::new_v4(), Uuid::new_v4());
        let risks = vec![(r1, 20), (r2, 6), (r3, 12)];
        let links = vec![(r1, c1), (r1, c2), (r2, c2)];
        let implementation = HashMap::from([
            (c1, ImplementationStatus::PartiallyImplemented),
            (c2, ImplementationStatus::Implemented),
        ]);

        let (scores, ratios) = correlation_samples(&risks, &links, &implementation);
        assert_eq!(scores, vec![20.0, 6.0]);
        assert_eq!(ratios, vec![0.75, 1.0]);
    }
}
