use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::shared::schema::{
    clauses, control_assessments, control_clauses, controls, frameworks,
};

use super::types::{
    Applicability, Assessment, AssessmentStatus, AutomationLevel, Clause, ClauseType, Control,
    ControlFrequency, ControlStatus, ControlType, Effectiveness, Framework, FrameworkStatus,
    ImplementationStatus,
};

#[derive(Debug, Clone, Queryable, Insertable, AsChangeset, Serialize, Deserialize)]
#[diesel(table_name = frameworks)]
#[diesel(treat_none_as_null = true)]
pub struct DbFramework {
    pub id: Uuid,
    pub name: String,
    pub short_name: String,
    pub version: String,
    pub description: Option<String>,
    pub framework_type: String,
    pub issuing_organization: Option<String>,
    pub effective_date: Option<NaiveDate>,
    pub status: FrameworkStatus,
    pub source_checksum: Option<String>,
    pub imported_at: Option<DateTime<Utc>>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Insertable, AsChangeset, Serialize, Deserialize)]
#[diesel(table_name = clauses)]
#[diesel(treat_none_as_null = true)]
pub struct DbClause {
    pub id: Uuid,
    pub framework_id: Uuid,
    pub clause_id: String,
    pub title: String,
    pub description: Option<String>,
    pub clause_type: ClauseType,
    pub parent_id: Option<Uuid>,
    pub sort_order: i32,
    pub is_testable: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Insertable, AsChangeset, Serialize, Deserialize)]
#[diesel(table_name = controls)]
#[diesel(treat_none_as_null = true)]
pub struct DbControl {
    pub id: Uuid,
    pub org_id: Uuid,
    pub control_id: String,
    pub name: String,
    pub description: Option<String>,
    pub control_type: ControlType,
    pub automation_level: AutomationLevel,
    pub status: ControlStatus,
    pub owner_id: Option<Uuid>,
    pub frequency: ControlFrequency,
    pub effectiveness: Effectiveness,
    pub last_tested_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Insertable)]
#[diesel(table_name = control_clauses)]
pub struct DbControlClause {
    pub control_id: Uuid,
    pub clause_id: Uuid,
}

#[derive(Debug, Clone, Queryable, Insertable, AsChangeset, Serialize, Deserialize)]
#[diesel(table_name = control_assessments)]
#[diesel(treat_none_as_null = true)]
pub struct DbAssessment {
    pub id: Uuid,
    pub org_id: Uuid,
    pub control_id: Uuid,
    pub applicability: Applicability,
    pub applicability_justification: Option<String>,
    pub implementation_status: ImplementationStatus,
    pub status: AssessmentStatus,
    pub assigned_to: Option<Uuid>,
    pub due_date: Option<NaiveDate>,
    pub implementation_notes: Option<String>,
    pub evidence_notes: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub change_log: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub fn db_framework_to_framework(db: DbFramework) -> Framework {
    Framework {
        id: db.id,
        name: db.name,
        short_name: db.short_name,
        version: db.version,
        description: db.description,
        framework_type: db.framework_type,
        issuing_organization: db.issuing_organization,
        effective_date: db.effective_date,
        status: db.status,
        source_checksum: db.source_checksum,
        imported_at: db.imported_at,
        created_by: db.created_by,
        created_at: db.created_at,
        updated_at: db.updated_at,
    }
}

pub fn db_clause_to_clause(db: DbClause, full_clause_id: String) -> Clause {
    Clause {
        id: db.id,
        framework_id: db.framework_id,
        clause_id: db.clause_id,
        full_clause_id,
        title: db.title,
        description: db.description,
        clause_type: db.clause_type,
        parent_id: db.parent_id,
        sort_order: db.sort_order,
        is_testable: db.is_testable,
        created_at: db.created_at,
        updated_at: db.updated_at,
    }
}

pub fn db_control_to_control(db: DbControl, clause_ids: Vec<Uuid>, today: NaiveDate) -> Control {
    Control {
        id: db.id,
        org_id: db.org_id,
        needs_testing: super::types::needs_testing(db.last_tested_date, today),
        control_id: db.control_id,
        name: db.name,
        description: db.description,
        control_type: db.control_type,
        automation_level: db.automation_level,
        status: db.status,
        owner_id: db.owner_id,
        frequency: db.frequency,
        effectiveness: db.effectiveness,
        last_tested_date: db.last_tested_date,
        clause_ids,
        created_at: db.created_at,
        updated_at: db.updated_at,
    }
}

pub fn db_assessment_to_assessment(db: DbAssessment, today: NaiveDate) -> Assessment {
    let is_overdue = db.status.is_open() && db.due_date.is_some_and(|due| due < today);
    Assessment {
        id: db.id,
        org_id: db.org_id,
        control_id: db.control_id,
        applicability: db.applicability,
        applicability_justification: db.applicability_justification,
        implementation_status: db.implementation_status,
        status: db.status,
        assigned_to: db.assigned_to,
        due_date: db.due_date,
        implementation_notes: db.implementation_notes,
        evidence_notes: db.evidence_notes,
        completed_at: db.completed_at,
        is_overdue,
        created_at: db.created_at,
        updated_at: db.updated_at,
    }
}

pub fn load_clause_ids_for_controls(
    conn: &mut PgConnection,
    control_ids: &[Uuid],
) -> QueryResult<std::collections::HashMap<Uuid, Vec<Uuid>>> {
    let rows: Vec<DbControlClause> = control_clauses::table
        .filter(control_clauses::control_id.eq_any(control_ids))
        .load(conn)?;
    let mut map: std::collections::HashMap<Uuid, Vec<Uuid>> = std::collections::HashMap::new();
    for row in rows {
        map.entry(row.control_id).or_default().push(row.clause_id);
    }
    Ok(map)
}

pub fn find_org_control(
    conn: &mut PgConnection,
    org_id: Uuid,
    control_id: Uuid,
) -> QueryResult<DbControl> {
    controls::table
        .filter(controls::id.eq(control_id))
        .filter(controls::org_id.eq(org_id))
        .first(conn)
}

pub fn find_org_assessment(
    conn: &mut PgConnection,
    org_id: Uuid,
    assessment_id: Uuid,
) -> QueryResult<DbAssessment> {
    control_assessments::table
        .filter(control_assessments::id.eq(assessment_id))
        .filter(control_assessments::org_id.eq(org_id))
        .first(conn)
}

pub fn save_assessment(conn: &mut PgConnection, db: &DbAssessment) -> QueryResult<usize> {
    diesel::update(control_assessments::table.find(db.id))
        .set(db)
        .execute(conn)
}

/// `(id, parent_id, clause_id)` of every clause in the given frameworks, for
/// resolving full clause ids.
pub fn load_clause_links(
    conn: &mut PgConnection,
    framework_ids: &[Uuid],
) -> QueryResult<Vec<(Uuid, Option<Uuid>, String)>> {
    clauses::table
        .filter(clauses::framework_id.eq_any(framework_ids))
        .select((clauses::id, clauses::parent_id, clauses::clause_id))
        .load(conn)
}
