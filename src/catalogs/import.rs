//! Framework catalog import from JSON or YAML files.
//!
//! ```yaml
//! name: ISO/IEC 27001
//! short_name: ISO27001
//! version: "2022"
//! clauses:
//!   - clause_id: A.5
//!     title: Organizational controls
//!     clause_type: section
//!     children:
//!       - clause_id: "1"
//!         title: Policies for information security
//!   - clause_id: A.6
//!     title: People controls
//!   - clause_id: "3"
//!     title: Information security awareness
//!     parent: A.6
//! ```
//!
//! A `clause_id` is relative to its parent, so `"1"` under `A.5` is the
//! clause `A.5.1` and may repeat under another section. `parent` references
//! a clause by its full dotted id; nested `children` inherit their parent
//! from the enclosing clause.

use chrono::{NaiveDate, Utc};
use diesel::prelude::*;
use log::info;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use uuid::Uuid;

use crate::core::shared::schema::{clauses, frameworks};

use super::error::CatalogError;
use super::storage::{DbClause, DbFramework};
use super::types::{ClauseType, FrameworkStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportFormat {
    Json,
    Yaml,
}

impl ImportFormat {
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("yml") | Some("yaml") => Self::Yaml,
            _ => Self::Json,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FrameworkDocument {
    pub name: Option<String>,
    pub short_name: Option<String>,
    pub version: Option<String>,
    pub description: Option<String>,
    pub framework_type: Option<String>,
    pub issuing_organization: Option<String>,
    pub effective_date: Option<NaiveDate>,
    pub status: Option<FrameworkStatus>,
    #[serde(default)]
    pub clauses: Vec<ClauseDocument>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClauseDocument {
    pub clause_id: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub clause_type: Option<ClauseType>,
    pub parent: Option<String>,
    pub sort_order: Option<i32>,
    pub is_testable: Option<bool>,
    #[serde(default)]
    pub children: Vec<ClauseDocument>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlannedClause {
    pub clause_id: String,
    /// Full dotted id: the parent's path joined with `clause_id`.
    pub path: String,
    pub title: String,
    pub description: Option<String>,
    pub clause_type: ClauseType,
    pub parent: Option<String>,
    pub sort_order: i32,
    pub is_testable: bool,
}

/// Validated import, clauses ordered so every parent precedes its children.
#[derive(Debug, Clone)]
pub struct ImportPlan {
    pub name: String,
    pub short_name: String,
    pub version: String,
    pub description: Option<String>,
    pub framework_type: String,
    pub issuing_organization: Option<String>,
    pub effective_date: Option<NaiveDate>,
    pub status: FrameworkStatus,
    pub clauses: Vec<PlannedClause>,
    pub checksum: String,
}

#[derive(Debug, Clone, Default)]
pub struct ImportOptions {
    pub update: bool,
    pub created_by: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ImportOutcome {
    Created { framework_id: Uuid, clauses: usize },
    Updated { framework_id: Uuid, clauses: usize },
    Unchanged { framework_id: Uuid },
}

pub fn checksum(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

pub fn parse_document(bytes: &[u8], format: ImportFormat) -> Result<FrameworkDocument, CatalogError> {
    match format {
        ImportFormat::Json => serde_json::from_slice(bytes)
            .map_err(|e| CatalogError::Validation(format!("Invalid JSON framework file: {e}"))),
        ImportFormat::Yaml => serde_yaml::from_slice(bytes)
            .map_err(|e| CatalogError::Validation(format!("Invalid YAML framework file: {e}"))),
    }
}

fn required(value: Option<String>, what: &str, errors: &mut Vec<String>) -> String {
    match value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) {
        Some(v) => v,
        None => {
            errors.push(format!("{what} is required"));
            String::new()
        }
    }
}

fn flatten(
    docs: Vec<ClauseDocument>,
    enclosing: Option<&str>,
    out: &mut Vec<PlannedClause>,
    errors: &mut Vec<String>,
) {
    for (index, doc) in docs.into_iter().enumerate() {
        let position = match enclosing {
            Some(parent) => format!("child {} of {parent}", index + 1),
            None => format!("clause {}", index + 1),
        };
        let clause_id = required(doc.clause_id, &format!("{position}: clause_id"), errors);
        let title = required(doc.title, &format!("{position}: title"), errors);

        let explicit = doc
            .parent
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty());
        let parent = match (enclosing, explicit) {
            (Some(outer), Some(explicit)) if explicit != outer => {
                errors.push(format!(
                    "Clause {clause_id} is nested under {outer} but declares parent {explicit}"
                ));
                Some(outer.to_string())
            }
            (Some(outer), _) => Some(outer.to_string()),
            (None, explicit) => explicit,
        };
        let path = match parent.as_deref() {
            Some(parent) => format!("{parent}.{clause_id}"),
            None => clause_id.clone(),
        };

        out.push(PlannedClause {
            clause_id,
            path: path.clone(),
            title,
            description: doc.description,
            clause_type: doc.clause_type.unwrap_or(ClauseType::Requirement),
            parent,
            sort_order: doc.sort_order.unwrap_or(index as i32),
            is_testable: doc.is_testable.unwrap_or(true),
        });

        if !doc.children.is_empty() {
            flatten(doc.children, Some(&path), out, errors);
        }
    }
}

fn order_parents_first(clauses: Vec<PlannedClause>, errors: &mut Vec<String>) -> Vec<PlannedClause> {
    let mut seen = HashSet::new();
    for clause in &clauses {
        if !clause.clause_id.is_empty() && !seen.insert(clause.path.as_str()) {
            errors.push(format!("Duplicate clause {}", clause.path));
        }
    }

    let parents: HashMap<&str, Option<&str>> = clauses
        .iter()
        .map(|c| (c.path.as_str(), c.parent.as_deref()))
        .collect();

    for clause in &clauses {
        if let Some(parent) = clause.parent.as_deref() {
            if !parents.contains_key(parent) {
                errors.push(format!(
                    "Clause {} references unknown parent {parent}",
                    clause.path
                ));
            }
        }
    }

    // A parent's path is a strict prefix of its child's, so the walk ends.
    let depth = |path: &str| {
        let mut levels = 0;
        let mut current = parents.get(path).copied().flatten();
        while let Some(parent) = current {
            levels += 1;
            current = parents.get(parent).copied().flatten();
        }
        levels
    };

    let depths: Vec<usize> = clauses.iter().map(|c| depth(&c.path)).collect();
    let mut indexed: Vec<(usize, PlannedClause)> = depths.into_iter().zip(clauses).collect();
    indexed.sort_by_key(|(d, _)| *d);
    indexed.into_iter().map(|(_, c)| c).collect()
}

/// Validates a parsed document; every problem is reported at once.
pub fn plan_import(doc: FrameworkDocument, checksum: String) -> Result<ImportPlan, CatalogError> {
    let mut errors = Vec::new();
    let name = required(doc.name, "name", &mut errors);
    let short_name = required(doc.short_name, "short_name", &mut errors);
    let version = required(doc.version, "version", &mut errors);

    let mut flat = Vec::new();
    flatten(doc.clauses, None, &mut flat, &mut errors);
    let clauses = order_parents_first(flat, &mut errors);

    if !errors.is_empty() {
        return Err(CatalogError::Validation(errors.join("; ")));
    }

    Ok(ImportPlan {
        name,
        short_name,
        version,
        description: doc.description,
        framework_type: doc.framework_type.unwrap_or_else(|| "security".to_string()),
        issuing_organization: doc.issuing_organization,
        effective_date: doc.effective_date,
        status: doc.status.unwrap_or(FrameworkStatus::Active),
        clauses,
        checksum,
    })
}

pub fn plan_from_bytes(bytes: &[u8], format: ImportFormat) -> Result<ImportPlan, CatalogError> {
    let doc = parse_document(bytes, format)?;
    plan_import(doc, checksum(bytes))
}

/// Writes the plan in a single transaction.
pub fn apply_import(
    conn: &mut PgConnection,
    plan: &ImportPlan,
    options: &ImportOptions,
) -> Result<ImportOutcome, CatalogError> {
    conn.transaction::<_, CatalogError, _>(|conn| {
        let existing: Option<DbFramework> = frameworks::table
            .filter(frameworks::short_name.eq(&plan.short_name))
            .filter(frameworks::version.eq(&plan.version))
            .first(conn)
            .optional()?;

        let now = Utc::now();
        let (framework_id, updated) = match existing {
            Some(current) if !options.update => {
                return Err(CatalogError::Conflict(format!(
                    "Framework {} {} already exists (id {}); pass --update to replace it",
                    current.short_name, current.version, current.id
                )));
            }
            Some(current) if current.source_checksum.as_deref() == Some(plan.checksum.as_str()) => {
                info!(
                    "Framework {} {} unchanged (checksum {})",
                    current.short_name, current.version, plan.checksum
                );
                return Ok(ImportOutcome::Unchanged {
                    framework_id: current.id,
                });
            }
            Some(current) => {
                let row = DbFramework {
                    name: plan.name.clone(),
                    description: plan.description.clone(),
                    framework_type: plan.framework_type.clone(),
                    issuing_organization: plan.issuing_organization.clone(),
                    effective_date: plan.effective_date,
                    status: plan.status,
                    source_checksum: Some(plan.checksum.clone()),
                    imported_at: Some(now),
                    updated_at: now,
                    ..current
                };
                diesel::update(frameworks::table.find(row.id))
                    .set(&row)
                    .execute(conn)?;
                diesel::delete(clauses::table.filter(clauses::framework_id.eq(row.id)))
                    .execute(conn)?;
                (row.id, true)
            }
            None => {
                let row = DbFramework {
                    id: Uuid::new_v4(),
                    name: plan.name.clone(),
                    short_name: plan.short_name.clone(),
                    version: plan.version.clone(),
                    description: plan.description.clone(),
                    framework_type: plan.framework_type.clone(),
                    issuing_organization: plan.issuing_organization.clone(),
                    effective_date: plan.effective_date,
                    status: plan.status,
                    source_checksum: Some(plan.checksum.clone()),
                    imported_at: Some(now),
                    created_by: options.created_by,
                    created_at: now,
                    updated_at: now,
                };
                diesel::insert_into(frameworks::table)
                    .values(&row)
                    .execute(conn)?;
                (row.id, false)
            }
        };

        let rows = clause_rows(framework_id, &plan.clauses);
        for row in &rows {
            diesel::insert_into(clauses::table).values(row).execute(conn)?;
        }

        info!(
            "Imported framework {} {} with {} clauses",
            plan.short_name,
            plan.version,
            rows.len()
        );
        Ok(if updated {
            ImportOutcome::Updated {
                framework_id,
                clauses: rows.len(),
            }
        } else {
            ImportOutcome::Created {
                framework_id,
                clauses: rows.len(),
            }
        })
    })
}

fn clause_rows(framework_id: Uuid, planned: &[PlannedClause]) -> Vec<DbClause> {
    let now = Utc::now();
    let ids: HashMap<&str, Uuid> = planned
        .iter()
        .map(|c| (c.path.as_str(), Uuid::new_v4()))
        .collect();

    planned
        .iter()
        .filter_map(|c| {
            let id = *ids.get(c.path.as_str())?;
            Some(DbClause {
                id,
                framework_id,
                clause_id: c.clause_id.clone(),
                title: c.title.clone(),
                description: c.description.clone(),
                clause_type: c.clause_type,
                parent_id: c
                    .parent
                    .as_deref()
                    .and_then(|p| ids.get(p).copied()),
                sort_order: c.sort_order,
                is_testable: c.is_testable,
                created_at: now,
                updated_at: now,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = r#"
name: ISO/IEC 27001
short_name: ISO27001
version: "2022"
clauses:
  - clause_id: A.5
    title: Organizational controls
    clause_type: section
    children:
      - clause_id: "1"
        title: Policies
        children:
          - clause_id: a
            title: Review
  - clause_id: "3"
    title: Awareness
    parent: A.6
  - clause_id: A.6
    title: People controls
"#;

    #[test]
    fn test_format_from_extension() {
        assert_eq!(ImportFormat::from_path(Path::new("iso.yaml")), ImportFormat::Yaml);
        assert_eq!(ImportFormat::from_path(Path::new("iso.YML")), ImportFormat::Yaml);
        assert_eq!(ImportFormat::from_path(Path::new("iso.json")), ImportFormat::Json);
        assert_eq!(ImportFormat::from_path(Path::new("iso")), ImportFormat::Json);
    }

    #[test]
    fn test_plan_orders_parents_first() {
        let plan = plan_from_bytes(YAML.as_bytes(), ImportFormat::Yaml).unwrap();
        assert_eq!(plan.short_name, "ISO27001");
        assert_eq!(plan.clauses.len(), 5);

        let position = |path: &str| {
            plan.clauses
                .iter()
                .position(|c| c.path == path)
                .unwrap()
        };
        assert!(position("A.6") < position("A.6.3"));
        assert!(position("A.5.1") < position("A.5.1.a"));
        let nested = &plan.clauses[position("A.5.1.a")];
        assert_eq!(nested.parent.as_deref(), Some("A.5.1"));
    }

    #[test]
    fn test_clause_rows_link_parents() {
        let plan = plan_from_bytes(YAML.as_bytes(), ImportFormat::Yaml).unwrap();
        let rows = clause_rows(Uuid::new_v4(), &plan.clauses);
        let by_code: HashMap<_, _> = rows.iter().map(|r| (r.clause_id.as_str(), r)).collect();
        assert_eq!(by_code["3"].parent_id, Some(by_code["A.6"].id));
        assert_eq!(by_code["a"].parent_id, Some(by_code["1"].id));
        assert_eq!(by_code["A.5"].parent_id, None);
    }

    #[test]
    fn test_sections_may_share_child_codes() {
        let yaml = r#"
name: ISO/IEC 27001
short_name: ISO27001
version: "2022"
clauses:
  - clause_id: A.5
    title: Organizational controls
    children:
      - clause_id: "1"
        title: Policies for information security
  - clause_id: A.8
    title: Technological controls
    children:
      - clause_id: "1"
        title: User endpoint devices
  - clause_id: "2"
    title: Privileged access rights
    parent: A.8
"#;
        let plan = plan_from_bytes(yaml.as_bytes(), ImportFormat::Yaml).unwrap();
        let paths: HashSet<&str> = plan.clauses.iter().map(|c| c.path.as_str()).collect();
        assert_eq!(paths, HashSet::from(["A.5", "A.5.1", "A.8", "A.8.1", "A.8.2"]));

        let rows = clause_rows(Uuid::new_v4(), &plan.clauses);
        let id_of = |title: &str| rows.iter().find(|r| r.title == title).unwrap().id;
        let parent_of = |title: &str| rows.iter().find(|r| r.title == title).unwrap().parent_id;
        let a8 = Some(id_of("Technological controls"));
        assert_eq!(
            parent_of("Policies for information security"),
            Some(id_of("Organizational controls"))
        );
        assert_eq!(parent_of("User endpoint devices"), a8);
        assert_eq!(parent_of("Privileged access rights"), a8);
    }

    #[test]
    fn test_checksum_is_sha256_hex() {
        assert_eq!(
            checksum(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_missing_required_fields_reported_together() {
        let json = br#"{"name": "X", "clauses": [{"clause_id": "1"}]}"#;
        let err = plan_from_bytes(json, ImportFormat::Json).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("short_name is required"));
        assert!(message.contains("version is required"));
        assert!(message.contains("clause 1: title is required"));
    }

    #[test]
    fn test_rejects_duplicates_and_unknown_parents() {
        let json = br#"{
            "name": "X", "short_name": "X", "version": "1",
            "clauses": [
                {"clause_id": "1", "title": "a", "children": [{"clause_id": "1", "title": "a1"}]},
                {"clause_id": "1", "title": "b", "parent": "1"},
                {"clause_id": "2", "title": "c", "parent": "9"},
                {"clause_id": "3", "title": "d", "parent": "4"},
                {"clause_id": "4", "title": "e", "parent": "3"}
            ]
        }"#;
        let message = plan_from_bytes(json, ImportFormat::Json)
            .unwrap_err()
            .to_string();
        assert!(message.contains("Duplicate clause 1.1"));
        assert!(message.contains("Clause 9.2 references unknown parent 9"));
        assert!(message.contains("Clause 4.3 references unknown parent 4"));
        assert!(message.contains("Clause 3.4 references unknown parent 3"));
    }

    #[test]
    fn test_invalid_syntax_is_validation_error() {
        assert!(matches!(
            plan_from_bytes(b"{not json", ImportFormat::Json),
            Err(CatalogError::Validation(_))
        ));
    }
}
