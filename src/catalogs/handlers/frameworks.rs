use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use diesel::prelude::*;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use uuid::Uuid;

use crate::core::middleware::{AuthenticatedUser, OrganizationContext};
use crate::core::shared::schema::{clauses, control_assessments, control_clauses, controls, frameworks};
use crate::shared::state::AppState;
use crate::shared::utils::{page_bounds, run_db};

use crate::catalogs::error::CatalogError;
use crate::catalogs::storage::{db_framework_to_framework, DbClause, DbFramework};
use crate::catalogs::tree::build_tree;
use crate::catalogs::types::{
    coverage_percentage, AssessmentStatus, ClauseNode, CreateFrameworkRequest, Framework,
    FrameworkCoverage, FrameworkStatus, ImplementationStatus, ListFrameworksQuery,
    UpdateFrameworkRequest,
};

#[utoipa::path(
    get,
    path = "/api/frameworks",
    responses((status = 200, body = [Framework])),
    tag = "catalogs"
)]
pub async fn handle_list_frameworks(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListFrameworksQuery>,
) -> Result<Json<Vec<Framework>>, CatalogError> {
    let result = run_db(&state.conn, move |conn| {
        let (limit, offset) = page_bounds(query.limit, query.offset);
        let mut db_query = frameworks::table.into_boxed();

        if let Some(status) = query.status {
            db_query = db_query.filter(frameworks::status.eq(status));
        }
        if let Some(ref search) = query.search {
            let term = format!("%{search}%");
            db_query = db_query.filter(
                frameworks::name
                    .ilike(term.clone())
                    .or(frameworks::short_name.ilike(term)),
            );
        }

        let rows: Vec<DbFramework> = db_query
            .order((frameworks::short_name.asc(), frameworks::version.desc()))
            .offset(offset)
            .limit(limit)
            .load(conn)?;

        Ok::<_, CatalogError>(rows.into_iter().map(db_framework_to_framework).collect())
    })
    .await?;

    Ok(Json(result))
}

#[utoipa::path(
    post,
    path = "/api/frameworks",
    request_body = CreateFrameworkRequest,
    responses((status = 201, body = Framework), (status = 400), (status = 409)),
    tag = "catalogs"
)]
pub async fn handle_create_framework(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Json(req): Json<CreateFrameworkRequest>,
) -> Result<(StatusCode, Json<Framework>), CatalogError> {
    req.validate()?;

    let result = run_db(&state.conn, move |conn| {
        let now = Utc::now();
        let row = DbFramework {
            id: Uuid::new_v4(),
            name: req.name.trim().to_string(),
            short_name: req.short_name.trim().to_string(),
            version: req.version.trim().to_string(),
            description: req.description,
            framework_type: req.framework_type.unwrap_or_else(|| "security".to_string()),
            issuing_organization: req.issuing_organization,
            effective_date: req.effective_date,
            status: req.status.unwrap_or(FrameworkStatus::Active),
            source_checksum: None,
            imported_at: None,
            created_by: user.user_id,
            created_at: now,
            updated_at: now,
        };

        diesel::insert_into(frameworks::table)
            .values(&row)
            .execute(conn)?;

        Ok::<_, CatalogError>(db_framework_to_framework(row))
    })
    .await?;

    Ok((StatusCode::CREATED, Json(result)))
}

#[utoipa::path(
    get,
    path = "/api/frameworks/{id}",
    params(("id" = Uuid, Path, description = "Framework ID")),
    responses((status = 200, body = Framework), (status = 404)),
    tag = "catalogs"
)]
pub async fn handle_get_framework(
    State(state): State<Arc<AppState>>,
    Path(framework_id): Path<Uuid>,
) -> Result<Json<Framework>, CatalogError> {
    let result = run_db(&state.conn, move |conn| {
        let row: DbFramework = frameworks::table
            .find(framework_id)
            .first(conn)
            .optional()?
            .ok_or_else(|| CatalogError::NotFound("Framework not found".to_string()))?;
        Ok::<_, CatalogError>(db_framework_to_framework(row))
    })
    .await?;

    Ok(Json(result))
}

#[utoipa::path(
    put,
    path = "/api/frameworks/{id}",
    params(("id" = Uuid, Path, description = "Framework ID")),
    request_body = UpdateFrameworkRequest,
    responses((status = 200, body = Framework), (status = 404)),
    tag = "catalogs"
)]
pub async fn handle_update_framework(
    State(state): State<Arc<AppState>>,
    Path(framework_id): Path<Uuid>,
    Json(req): Json<UpdateFrameworkRequest>,
) -> Result<Json<Framework>, CatalogError> {
    if let Some(ref name) = req.name {
        crate::catalogs::types::require_text("name", name)?;
    }

    let result = run_db(&state.conn, move |conn| {
        let mut row: DbFramework = frameworks::table
            .find(framework_id)
            .first(conn)
            .optional()?
            .ok_or_else(|| CatalogError::NotFound("Framework not found".to_string()))?;

        if let Some(name) = req.name {
            row.name = name.trim().to_string();
        }
        if let Some(description) = req.description {
            row.description = Some(description);
        }
        if let Some(framework_type) = req.framework_type {
            row.framework_type = framework_type;
        }
        if let Some(issuer) = req.issuing_organization {
            row.issuing_organization = Some(issuer);
        }
        if let Some(date) = req.effective_date {
            row.effective_date = Some(date);
        }
        if let Some(status) = req.status {
            row.status = status;
        }
        row.updated_at = Utc::now();

        diesel::update(frameworks::table.find(framework_id))
            .set(&row)
            .execute(conn)?;

        Ok::<_, CatalogError>(db_framework_to_framework(row))
    })
    .await?;

    Ok(Json(result))
}

#[utoipa::path(
    delete,
    path = "/api/frameworks/{id}",
    params(("id" = Uuid, Path, description = "Framework ID")),
    responses((status = 204), (status = 404)),
    tag = "catalogs"
)]
pub async fn handle_delete_framework(
    State(state): State<Arc<AppState>>,
    Path(framework_id): Path<Uuid>,
) -> Result<StatusCode, CatalogError> {
    let deleted = run_db(&state.conn, move |conn| {
        Ok::<_, CatalogError>(
            diesel::delete(frameworks::table.find(framework_id)).execute(conn)?,
        )
    })
    .await?;

    if deleted == 0 {
        return Err(CatalogError::NotFound("Framework not found".to_string()));
    }
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/api/frameworks/{id}/clauses",
    params(("id" = Uuid, Path, description = "Framework ID")),
    responses((status = 200, body = [ClauseNode]), (status = 404)),
    tag = "catalogs"
)]
pub async fn handle_get_framework_clauses(
    State(state): State<Arc<AppState>>,
    Path(framework_id): Path<Uuid>,
) -> Result<Json<Vec<ClauseNode>>, CatalogError> {
    let result = run_db(&state.conn, move |conn| {
        let exists: Option<Uuid> = frameworks::table
            .find(framework_id)
            .select(frameworks::id)
            .first(conn)
            .optional()?;
        if exists.is_none() {
            return Err(CatalogError::NotFound("Framework not found".to_string()));
        }

        let rows: Vec<DbClause> = clauses::table
            .filter(clauses::framework_id.eq(framework_id))
            .load(conn)?;
        Ok(build_tree(rows))
    })
    .await?;

    Ok(Json(result))
}

/// Coverage of one framework by the organization's controls.
pub fn framework_coverage(
    conn: &mut PgConnection,
    org_id: Uuid,
    framework: &DbFramework,
) -> Result<FrameworkCoverage, CatalogError> {
    let clause_rows: Vec<(Uuid, bool)> = clauses::table
        .filter(clauses::framework_id.eq(framework.id))
        .select((clauses::id, clauses::is_testable))
        .load(conn)?;
    let testable: HashSet<Uuid> = clause_rows
        .iter()
        .filter(|(_, testable)| *testable)
        .map(|(id, _)| *id)
        .collect();

    let mappings: Vec<(Uuid, Uuid)> = control_clauses::table
        .inner_join(controls::table)
        .inner_join(clauses::table)
        .filter(controls::org_id.eq(org_id))
        .filter(clauses::framework_id.eq(framework.id))
        .select((control_clauses::control_id, control_clauses::clause_id))
        .load(conn)?;

    let covered: HashSet<Uuid> = mappings
        .iter()
        .map(|(_, clause)| *clause)
        .filter(|clause| testable.contains(clause))
        .collect();
    let control_ids: Vec<Uuid> = mappings
        .iter()
        .map(|(control, _)| *control)
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();

    let assessments: Vec<(AssessmentStatus, ImplementationStatus)> = control_assessments::table
        .filter(control_assessments::org_id.eq(org_id))
        .filter(control_assessments::control_id.eq_any(&control_ids))
        .select((
            control_assessments::status,
            control_assessments::implementation_status,
        ))
        .load(conn)?;

    let mut assessment_status_counts = BTreeMap::new();
    let mut implementation_status_counts = BTreeMap::new();
    for (status, implementation) in assessments {
        *assessment_status_counts
            .entry(status.to_string())
            .or_insert(0) += 1;
        *implementation_status_counts
            .entry(implementation.to_string())
            .or_insert(0) += 1;
    }

    Ok(FrameworkCoverage {
        framework_id: framework.id,
        framework_name: format!("{} {}", framework.short_name, framework.version),
        total_clauses: clause_rows.len() as i64,
        testable_clauses: testable.len() as i64,
        covered_clauses: covered.len() as i64,
        coverage_percentage: coverage_percentage(covered.len() as i64, testable.len() as i64),
        mapped_controls: control_ids.len() as i64,
        assessment_status_counts,
        implementation_status_counts,
    })
}

#[utoipa::path(
    get,
    path = "/api/frameworks/{id}/coverage",
    params(("id" = Uuid, Path, description = "Framework ID")),
    responses((status = 200, body = FrameworkCoverage), (status = 404)),
    tag = "catalogs"
)]
pub async fn handle_get_framework_coverage(
    State(state): State<Arc<AppState>>,
    org: OrganizationContext,
    Path(framework_id): Path<Uuid>,
) -> Result<Json<FrameworkCoverage>, CatalogError> {
    let result = run_db(&state.conn, move |conn| {
        let framework: DbFramework = frameworks::table
            .find(framework_id)
            .first(conn)
            .optional()?
            .ok_or_else(|| CatalogError::NotFound("Framework not found".to_string()))?;
        framework_coverage(conn, org.organization_id, &framework)
    })
    .await?;

    Ok(Json(result))
}
