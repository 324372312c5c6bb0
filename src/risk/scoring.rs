use chrono::NaiveDate;

use super::matrix::{Rating, RiskMatrixTable};
use super::types::RiskLevel;

/// Level used when neither an assigned nor a default matrix applies.
pub fn fallback_level(impact: Rating, likelihood: Rating) -> RiskLevel {
    match impact.get() + likelihood.get() {
        9.. => RiskLevel::Critical,
        7..=8 => RiskLevel::High,
        5..=6 => RiskLevel::Medium,
        _ => RiskLevel::Low,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RiskScore {
    pub score: i32,
    pub level: RiskLevel,
}

impl RiskScore {
    pub fn compute(impact: Rating, likelihood: Rating, table: Option<&RiskMatrixTable>) -> Self {
        let level = match table {
            Some(table) => table.level(impact, likelihood),
            None => fallback_level(impact, likelihood),
        };
        Self {
            score: impact.get() * likelihood.get(),
            level,
        }
    }
}

/// Previously saved ratings of a risk.
#[derive(Debug, Clone, Copy)]
pub struct PriorAssessment {
    pub impact: i32,
    pub likelihood: i32,
    pub last_assessed_date: Option<NaiveDate>,
}

/// New risks are assessed today; saved risks only when a rating changed.
pub fn apply_assessment(
    previous: Option<PriorAssessment>,
    impact: Rating,
    likelihood: Rating,
    today: NaiveDate,
) -> Option<NaiveDate> {
    match previous {
        None => Some(today),
        Some(prior) if prior.impact != impact.get() || prior.likelihood != likelihood.get() => {
            Some(today)
        }
        Some(prior) => prior.last_assessed_date,
    }
}
