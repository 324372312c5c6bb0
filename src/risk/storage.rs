use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::core::shared::schema::{
    organizations, risk_actions, risk_controls, risk_matrices, risks,
};
use crate::shared::utils::next_sequence_code;

use super::error::RiskError;
use super::matrix::{Rating, RiskMatrixTable};
use super::scoring::RiskScore;
use super::treatment::is_overdue;
use super::types::{
    ActionPriority, ActionStatus, ActionType, LevelSource, Risk, RiskAction, RiskCategory,
    RiskLevel, RiskMatrix, RiskStatus, TreatmentStrategy,
};

#[derive(Debug, Clone, Queryable, Insertable, AsChangeset, Serialize, Deserialize)]
#[diesel(table_name = risk_matrices)]
#[diesel(treat_none_as_null = true)]
pub struct DbRiskMatrix {
    pub id: Uuid,
    pub org_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub is_default: bool,
    pub matrix: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Insertable, AsChangeset, Serialize, Deserialize)]
#[diesel(table_name = risks)]
#[diesel(treat_none_as_null = true)]
pub struct DbRisk {
    pub id: Uuid,
    pub org_id: Uuid,
    pub risk_id: String,
    pub title: String,
    pub description: Option<String>,
    pub category: RiskCategory,
    pub status: RiskStatus,
    pub owner_id: Option<Uuid>,
    pub impact: i32,
    pub likelihood: i32,
    pub risk_score: i32,
    pub risk_level: RiskLevel,
    pub risk_matrix_id: Option<Uuid>,
    pub treatment_strategy: TreatmentStrategy,
    pub treatment_description: Option<String>,
    pub identified_date: NaiveDate,
    pub last_assessed_date: Option<NaiveDate>,
    pub next_review_date: Option<NaiveDate>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Insertable)]
#[diesel(table_name = risk_controls)]
pub struct DbRiskControl {
    pub risk_id: Uuid,
    pub control_id: Uuid,
}

#[derive(Debug, Clone, Queryable, Insertable, AsChangeset, Serialize, Deserialize)]
#[diesel(table_name = risk_actions)]
#[diesel(treat_none_as_null = true)]
pub struct DbRiskAction {
    pub id: Uuid,
    pub org_id: Uuid,
    pub risk_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub action_type: ActionType,
    pub assigned_to: Option<Uuid>,
    pub status: ActionStatus,
    pub priority: ActionPriority,
    pub progress_percentage: i32,
    pub start_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub completed_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub fn db_matrix_to_matrix(db: DbRiskMatrix) -> RiskMatrix {
    RiskMatrix {
        id: db.id,
        org_id: db.org_id,
        name: db.name,
        description: db.description,
        is_default: db.is_default,
        matrix: db.matrix,
        created_at: db.created_at,
        updated_at: db.updated_at,
    }
}

pub fn db_risk_to_risk(db: DbRisk, control_ids: Vec<Uuid>) -> Risk {
    Risk {
        id: db.id,
        org_id: db.org_id,
        risk_id: db.risk_id,
        title: db.title,
        description: db.description,
        category: db.category,
        status: db.status,
        owner_id: db.owner_id,
        impact: db.impact,
        likelihood: db.likelihood,
        risk_score: db.risk_score,
        risk_level: db.risk_level,
        risk_matrix_id: db.risk_matrix_id,
        treatment_strategy: db.treatment_strategy,
        treatment_description: db.treatment_description,
        identified_date: db.identified_date,
        last_assessed_date: db.last_assessed_date,
        next_review_date: db.next_review_date,
        created_by: db.created_by,
        control_ids,
        created_at: db.created_at,
        updated_at: db.updated_at,
    }
}

pub fn db_action_to_action(db: DbRiskAction, today: NaiveDate) -> RiskAction {
    RiskAction {
        is_overdue: is_overdue(&db, today),
        id: db.id,
        org_id: db.org_id,
        risk_id: db.risk_id,
        title: db.title,
        description: db.description,
        action_type: db.action_type,
        assigned_to: db.assigned_to,
        status: db.status,
        priority: db.priority,
        progress_percentage: db.progress_percentage,
        start_date: db.start_date,
        due_date: db.due_date,
        completed_date: db.completed_date,
        notes: db.notes,
        created_at: db.created_at,
        updated_at: db.updated_at,
    }
}

pub fn find_org_risk(conn: &mut PgConnection, org_id: Uuid, risk_id: Uuid) -> QueryResult<DbRisk> {
    risks::table
        .filter(risks::id.eq(risk_id))
        .filter(risks::org_id.eq(org_id))
        .first(conn)
}

pub fn find_org_matrix(
    conn: &mut PgConnection,
    org_id: Uuid,
    matrix_id: Uuid,
) -> QueryResult<DbRiskMatrix> {
    risk_matrices::table
        .filter(risk_matrices::id.eq(matrix_id))
        .filter(risk_matrices::org_id.eq(org_id))
        .first(conn)
}

pub fn find_org_action(
    conn: &mut PgConnection,
    org_id: Uuid,
    action_id: Uuid,
) -> QueryResult<DbRiskAction> {
    risk_actions::table
        .filter(risk_actions::id.eq(action_id))
        .filter(risk_actions::org_id.eq(org_id))
        .first(conn)
}

pub fn load_control_ids_for_risks(
    conn: &mut PgConnection,
    risk_ids: &[Uuid],
) -> QueryResult<HashMap<Uuid, Vec<Uuid>>> {
    let rows: Vec<DbRiskControl> = risk_controls::table
        .filter(risk_controls::risk_id.eq_any(risk_ids))
        .load(conn)?;
    let mut map: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
    for row in rows {
        map.entry(row.risk_id).or_default().push(row.control_id);
    }
    Ok(map)
}

fn parse_stored(matrix: &DbRiskMatrix) -> Option<RiskMatrixTable> {
    match RiskMatrixTable::from_json(&matrix.matrix) {
        Ok(table) => Some(table),
        Err(e) => {
            warn!("Ignoring unusable risk matrix {}: {}", matrix.id, e);
            None
        }
    }
}

/// Table a risk is scored against: its own matrix, then the org default.
pub fn resolve_table(
    conn: &mut PgConnection,
    org_id: Uuid,
    assigned: Option<Uuid>,
) -> QueryResult<(Option<RiskMatrixTable>, Option<Uuid>, LevelSource)> {
    if let Some(matrix_id) = assigned {
        if let Some(matrix) = find_org_matrix(conn, org_id, matrix_id).optional()? {
            if let Some(table) = parse_stored(&matrix) {
                return Ok((Some(table), Some(matrix.id), LevelSource::AssignedMatrix));
            }
        }
    }

    let default: Option<DbRiskMatrix> = risk_matrices::table
        .filter(risk_matrices::org_id.eq(org_id))
        .filter(risk_matrices::is_default.eq(true))
        .first(conn)
        .optional()?;
    if let Some(matrix) = default {
        if let Some(table) = parse_stored(&matrix) {
            return Ok((Some(table), Some(matrix.id), LevelSource::DefaultMatrix));
        }
    }

    Ok((None, None, LevelSource::Fallback))
}

/// Recomputes score and level of `risk` against its resolved matrix.
pub fn rescore(conn: &mut PgConnection, risk: &mut DbRisk) -> Result<(), RiskError> {
    let impact = Rating::new(risk.impact, "impact")?;
    let likelihood = Rating::new(risk.likelihood, "likelihood")?;
    let (table, _, _) = resolve_table(conn, risk.org_id, risk.risk_matrix_id)?;
    let score = RiskScore::compute(impact, likelihood, table.as_ref());
    risk.risk_score = score.score;
    risk.risk_level = score.level;
    Ok(())
}

/// Next `RISK-NNNN` code for the org. Must run inside the transaction that
/// inserts the risk: the org row stays locked until it commits, so
/// concurrent creates in one org take turns instead of colliding.
pub fn allocate_risk_code(
    conn: &mut PgConnection,
    org_id: Uuid,
    prefix: &str,
) -> QueryResult<String> {
    organizations::table
        .find(org_id)
        .select(organizations::id)
        .for_update()
        .first::<Uuid>(conn)
        .optional()?;

    let existing: Vec<String> = risks::table
        .filter(risks::org_id.eq(org_id))
        .select(risks::risk_id)
        .load(conn)?;
    Ok(next_sequence_code(prefix, &existing))
}

/// Re-scores every risk of the org after a matrix change; returns how many levels moved.
pub fn recalculate_org_risks(conn: &mut PgConnection, org_id: Uuid) -> Result<usize, RiskError> {
    let rows: Vec<DbRisk> = risks::table
        .filter(risks::org_id.eq(org_id))
        .load(conn)?;

    let mut changed = 0;
    for mut risk in rows {
        let before = (risk.risk_score, risk.risk_level);
        rescore(conn, &mut risk)?;
        if before != (risk.risk_score, risk.risk_level) {
            risk.updated_at = Utc::now();
            diesel::update(risks::table.find(risk.id))
                .set((
                    risks::risk_score.eq(risk.risk_score),
                    risks::risk_level.eq(risk.risk_level),
                    risks::updated_at.eq(risk.updated_at),
                ))
                .execute(conn)?;
            changed += 1;
        }
    }
    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::DatabaseConfig;
    use crate::shared::utils::{create_conn, run_migrations};
    use diesel::connection::SimpleConnection;

    #[test]
    fn test_concurrent_codes_do_not_collide() {
        let Ok(url) = std::env::var("GRC_TEST_DATABASE_URL") else {
            println!("Skipping test - GRC_TEST_DATABASE_URL not set");
            return;
        };
        let pool = create_conn(&DatabaseConfig {
            url,
            pool_size: 4,
            run_migrations: true,
        })
        .unwrap();
        run_migrations(&pool).unwrap();

        let org = Uuid::new_v4();
        pool.get()
            .unwrap()
            .batch_execute(&format!(
                "INSERT INTO organizations (id, name, slug) VALUES ('{org}', 'Codes', '{org}')"
            ))
            .unwrap();

        let workers: Vec<_> = (0..4)
            .map(|_| {
                let pool = pool.clone();
                std::thread::spawn(move || {
                    let mut conn = pool.get().unwrap();
                    conn.transaction::<_, diesel::result::Error, _>(|conn| {
                        let code = allocate_risk_code(conn, org, "RISK")?;
                        // Widen the window between reading and inserting.
                        std::thread::sleep(std::time::Duration::from_millis(50));
                        conn.batch_execute(&format!(
                            "INSERT INTO risks (id, org_id, risk_id, title, impact, likelihood, \
                             risk_score, risk_level, identified_date) VALUES ('{}', '{org}', \
                             '{code}', 'Concurrent', 3, 3, 9, 'medium', CURRENT_DATE)",
                            Uuid::new_v4()
                        ))?;
                        Ok(code)
                    })
                })
            })
            .collect();

        let mut codes: Vec<String> = workers
            .into_iter()
            .map(|w| w.join().unwrap().unwrap())
            .collect();
        codes.sort();
        assert_eq!(codes, vec!["RISK-0001", "RISK-0002", "RISK-0003", "RISK-0004"]);

        pool.get()
            .unwrap()
            .batch_execute(&format!("DELETE FROM organizations WHERE id = '{org}'"))
            .unwrap();
    }
}
