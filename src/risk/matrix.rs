//! Risk matrix engine.
//!
//! A matrix maps every `(impact, likelihood)` pair on the 1–5 scales to a
//! [`RiskLevel`]. Matrices are stored as JSON keyed by impact then
//! likelihood:
//!
//! ```json
//! {"1": {"1": "low", "2": "low", "3": "low", "4": "medium", "5": "medium"}, ...}
//! ```
//!
//! Loading validates all 25 cells up front, so lookups on a
//! [`RiskMatrixTable`] never fail.

use serde_json::{Map, Value};

use super::error::RiskError;
use super::types::RiskLevel;

pub const SCALE: usize = 5;

/// A rating on the 1–5 impact or likelihood scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Rating(u8);

impl Rating {
    pub fn new(value: i32, field: &str) -> Result<Self, RiskError> {
        if (1..=SCALE as i32).contains(&value) {
            Ok(Self(value as u8))
        } else {
            Err(RiskError::Validation(format!(
                "{field} must be between 1 and {SCALE}, got {value}"
            )))
        }
    }

    pub fn get(self) -> i32 {
        i32::from(self.0)
    }

    fn index(self) -> usize {
        usize::from(self.0) - 1
    }

    pub fn all() -> impl Iterator<Item = Rating> {
        (1..=SCALE as u8).map(Rating)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RiskMatrixTable {
    cells: [[RiskLevel; SCALE]; SCALE],
}

impl RiskMatrixTable {
    /// `cells[impact - 1][likelihood - 1]`.
    pub fn new(cells: [[RiskLevel; SCALE]; SCALE]) -> Self {
        Self { cells }
    }

    pub fn standard() -> Self {
        use RiskLevel::{Critical as C, High as H, Low as L, Medium as M};
        Self::new([
            [L, L, L, M, M],
            [L, L, M, M, H],
            [L, M, M, H, H],
            [M, H, H, C, C],
            [H, H, C, C, C],
        ])
    }

    pub fn level(&self, impact: Rating, likelihood: Rating) -> RiskLevel {
        self.cells[impact.index()][likelihood.index()]
    }

    pub fn from_json(value: &Value) -> Result<Self, RiskError> {
        let rows = value
            .as_object()
            .ok_or_else(|| RiskError::Validation("Risk matrix must be a JSON object".into()))?;

        let mut cells = [[RiskLevel::Low; SCALE]; SCALE];
        let mut problems = Vec::new();

        for impact in Rating::all() {
            let key = impact.get().to_string();
            let Some(row) = rows.get(&key).and_then(Value::as_object) else {
                problems.push(format!("missing impact row {key}"));
                continue;
            };
            for likelihood in Rating::all() {
                let cell_key = likelihood.get().to_string();
                match row.get(&cell_key).and_then(Value::as_str) {
                    Some(text) => match text.parse::<RiskLevel>() {
                        Ok(level) => cells[impact.index()][likelihood.index()] = level,
                        Err(_) => problems.push(format!(
                            "unknown level '{text}' at impact {key}, likelihood {cell_key}"
                        )),
                    },
                    None => problems.push(format!(
                        "missing cell at impact {key}, likelihood {cell_key}"
                    )),
                }
            }
        }

        let extra: Vec<&String> = rows
            .keys()
            .filter(|k| !Rating::all().any(|r| r.get().to_string() == **k))
            .collect();
        if !extra.is_empty() {
            problems.push(format!("unexpected impact keys {extra:?}"));
        }

        if problems.is_empty() {
            Ok(Self { cells })
        } else {
            Err(RiskError::Validation(format!(
                "Invalid risk matrix: {}",
                problems.join("; ")
            )))
        }
    }

    pub fn to_json(&self) -> Value {
        let mut rows = Map::new();
        for impact in Rating::all() {
            let mut row = Map::new();
            for likelihood in Rating::all() {
                row.insert(
                    likelihood.get().to_string(),
                    Value::String(self.level(impact, likelihood).to_string()),
                );
            }
            rows.insert(impact.get().to_string(), Value::Object(row));
        }
        Value::Object(rows)
    }
}

impl Default for RiskMatrixTable {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn r(value: i32) -> Rating {
        Rating::new(value, "rating").unwrap()
    }

    #[test]
    fn test_rating_bounds() {
        assert!(Rating::new(0, "impact").is_err());
        assert!(Rating::new(6, "likelihood").is_err());
        assert_eq!(r(5).get(), 5);
    }

    #[test]
    fn test_standard_corners() {
        let table = RiskMatrixTable::standard();
        assert_eq!(table.level(r(1), r(1)), RiskLevel::Low);
        assert_eq!(table.level(r(5), r(5)), RiskLevel::Critical);
        assert_eq!(table.level(r(5), r(1)), RiskLevel::High);
        assert_eq!(table.level(r(1), r(5)), RiskLevel::Medium);
    }

    #[test]
    fn test_json_round_trip_preserves_every_cell() {
        let table = RiskMatrixTable::standard();
        let back = RiskMatrixTable::from_json(&table.to_json()).unwrap();
        assert_eq!(back, table);
    }

    #[test]
    fn test_custom_matrix_level_matches_configured_cell() {
        // Level depends only on likelihood, so each cell is predictable.
        let levels = ["low", "low", "medium", "high", "critical"];
        let mut rows = serde_json::Map::new();
        for impact in 1..=5 {
            let row: serde_json::Map<String, Value> = (1..=5)
                .map(|l| (l.to_string(), json!(levels[l - 1])))
                .collect();
            rows.insert(impact.to_string(), Value::Object(row));
        }
        let table = RiskMatrixTable::from_json(&Value::Object(rows)).unwrap();

        for impact in Rating::all() {
            for likelihood in Rating::all() {
                let expected: RiskLevel = levels[(likelihood.get() - 1) as usize].parse().unwrap();
                assert_eq!(table.level(impact, likelihood), expected);
            }
        }
    }

    #[test]
    fn test_from_json_reports_missing_and_unknown_cells() {
        let mut value = RiskMatrixTable::standard().to_json();
        value["3"].as_object_mut().unwrap().remove("2");
        value["4"]["4"] = json!("extreme");
        let message = RiskMatrixTable::from_json(&value).unwrap_err().to_string();
        assert!(message.contains("missing cell at impact 3, likelihood 2"));
        assert!(message.contains("unknown level 'extreme'"));
    }

    #[test]
    fn test_from_json_rejects_non_object_and_extra_rows() {
        assert!(RiskMatrixTable::from_json(&json!([1, 2])).is_err());
        let mut value = RiskMatrixTable::standard().to_json();
        value["6"] = json!({});
        assert!(RiskMatrixTable::from_json(&value).is_err());
    }
}
