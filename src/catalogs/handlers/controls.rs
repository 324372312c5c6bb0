use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{Duration, Utc};
use diesel::prelude::*;
use std::sync::Arc;
use uuid::Uuid;

use crate::core::middleware::OrganizationContext;
use crate::core::shared::schema::{clauses, control_clauses, controls};
use crate::shared::state::AppState;
use crate::shared::utils::{page_bounds, run_db};

use crate::catalogs::error::CatalogError;
use crate::catalogs::storage::{
    db_control_to_control, find_org_control, load_clause_ids_for_controls, DbControl,
    DbControlClause,
};
use crate::catalogs::types::{
    AutomationLevel, Control, ControlFrequency, ControlStatus, ControlType,
    CreateControlRequest, Effectiveness, ListControlsQuery, MarkTestedRequest,
    ReplaceControlClausesRequest, UpdateControlRequest, TESTING_INTERVAL_DAYS,
};

fn replace_mappings(
    conn: &mut PgConnection,
    control_id: Uuid,
    clause_ids: &[Uuid],
) -> Result<Vec<Uuid>, CatalogError> {
    let mut wanted = clause_ids.to_vec();
    wanted.sort();
    wanted.dedup();

    let found: i64 = clauses::table
        .filter(clauses::id.eq_any(&wanted))
        .count()
        .get_result(conn)?;
    if found != wanted.len() as i64 {
        return Err(CatalogError::Validation(
            "One or more clause ids do not exist".to_string(),
        ));
    }

    diesel::delete(control_clauses::table.filter(control_clauses::control_id.eq(control_id)))
        .execute(conn)?;
    let rows: Vec<DbControlClause> = wanted
        .iter()
        .map(|clause_id| DbControlClause {
            control_id,
            clause_id: *clause_id,
        })
        .collect();
    if !rows.is_empty() {
        diesel::insert_into(control_clauses::table)
            .values(&rows)
            .execute(conn)?;
    }

    Ok(wanted)
}

fn control_with_clauses(conn: &mut PgConnection, row: DbControl) -> Result<Control, CatalogError> {
    let mut mappings = load_clause_ids_for_controls(conn, &[row.id])?;
    let clause_ids = mappings.remove(&row.id).unwrap_or_default();
    Ok(db_control_to_control(row, clause_ids, Utc::now().date_naive()))
}

#[utoipa::path(
    get,
    path = "/api/controls",
    responses((status = 200, body = [Control]), (status = 400)),
    tag = "catalogs"
)]
pub async fn handle_list_controls(
    State(state): State<Arc<AppState>>,
    org: OrganizationContext,
    Query(query): Query<ListControlsQuery>,
) -> Result<Json<Vec<Control>>, CatalogError> {
    let result = run_db(&state.conn, move |conn| {
        let (limit, offset) = page_bounds(query.limit, query.offset);
        let today = Utc::now().date_naive();
        let mut db_query = controls::table
            .filter(controls::org_id.eq(org.organization_id))
            .into_boxed();

        if let Some(status) = query.status {
            db_query = db_query.filter(controls::status.eq(status));
        }
        if let Some(control_type) = query.control_type {
            db_query = db_query.filter(controls::control_type.eq(control_type));
        }
        if let Some(owner_id) = query.owner_id {
            db_query = db_query.filter(controls::owner_id.eq(owner_id));
        }
        if let Some(clause_id) = query.clause_id {
            let mapped = control_clauses::table
                .filter(control_clauses::clause_id.eq(clause_id))
                .select(control_clauses::control_id);
            db_query = db_query.filter(controls::id.eq_any(mapped));
        }
        if let Some(wanted) = query.needs_testing {
            let cutoff = today - Duration::days(TESTING_INTERVAL_DAYS);
            db_query = if wanted {
                db_query.filter(
                    controls::last_tested_date
                        .is_null()
                        .or(controls::last_tested_date.lt(cutoff)),
                )
            } else {
                db_query.filter(controls::last_tested_date.ge(cutoff))
            };
        }
        if let Some(ref search) = query.search {
            let term = format!("%{search}%");
            db_query = db_query.filter(
                controls::name
                    .ilike(term.clone())
                    .or(controls::control_id.ilike(term)),
            );
        }

        let rows: Vec<DbControl> = db_query
            .order(controls::control_id.asc())
            .offset(offset)
            .limit(limit)
            .load(conn)?;

        let ids: Vec<Uuid> = rows.iter().map(|c| c.id).collect();
        let mut mappings = load_clause_ids_for_controls(conn, &ids)?;

        Ok::<_, CatalogError>(
            rows.into_iter()
                .map(|row| {
                    let clause_ids = mappings.remove(&row.id).unwrap_or_default();
                    db_control_to_control(row, clause_ids, today)
                })
                .collect(),
        )
    })
    .await?;

    Ok(Json(result))
}

#[utoipa::path(
    post,
    path = "/api/controls",
    request_body = CreateControlRequest,
    responses((status = 201, body = Control), (status = 400), (status = 409)),
    tag = "catalogs"
)]
pub async fn handle_create_control(
    State(state): State<Arc<AppState>>,
    org: OrganizationContext,
    Json(req): Json<CreateControlRequest>,
) -> Result<(StatusCode, Json<Control>), CatalogError> {
    req.validate()?;

    let result = run_db(&state.conn, move |conn| {
        conn.transaction::<_, CatalogError, _>(|conn| {
            let now = Utc::now();
            let row = DbControl {
                id: Uuid::new_v4(),
                org_id: org.organization_id,
                control_id: req.control_id.trim().to_string(),
                name: req.name,
                description: req.description,
                control_type: req.control_type.unwrap_or(ControlType::Preventive),
                automation_level: req.automation_level.unwrap_or(AutomationLevel::Manual),
                status: req.status.unwrap_or(ControlStatus::Draft),
                owner_id: req.owner_id,
                frequency: req.frequency.unwrap_or(ControlFrequency::Annually),
                effectiveness: Effectiveness::NotTested,
                last_tested_date: None,
                created_at: now,
                updated_at: now,
            };
            diesel::insert_into(controls::table)
                .values(&row)
                .execute(conn)?;

            let clause_ids = match req.clause_ids {
                Some(ref ids) if !ids.is_empty() => replace_mappings(conn, row.id, ids)?,
                _ => Vec::new(),
            };
            Ok(db_control_to_control(row, clause_ids, now.date_naive()))
        })
    })
    .await?;

    Ok((StatusCode::CREATED, Json(result)))
}

#[utoipa::path(
    get,
    path = "/api/controls/{id}",
    params(("id" = Uuid, Path, description = "Control ID")),
    responses((status = 200, body = Control), (status = 404)),
    tag = "catalogs"
)]
pub async fn handle_get_control(
    State(state): State<Arc<AppState>>,
    org: OrganizationContext,
    Path(control_id): Path<Uuid>,
) -> Result<Json<Control>, CatalogError> {
    let result = run_db(&state.conn, move |conn| {
        let row = find_org_control(conn, org.organization_id, control_id)
            .optional()?
            .ok_or_else(|| CatalogError::NotFound("Control not found".to_string()))?;
        control_with_clauses(conn, row)
    })
    .await?;

    Ok(Json(result))
}

#[utoipa::path(
    put,
    path = "/api/controls/{id}",
    params(("id" = Uuid, Path, description = "Control ID")),
    request_body = UpdateControlRequest,
    responses((status = 200, body = Control), (status = 404)),
    tag = "catalogs"
)]
pub async fn handle_update_control(
    State(state): State<Arc<AppState>>,
    org: OrganizationContext,
    Path(control_id): Path<Uuid>,
    Json(req): Json<UpdateControlRequest>,
) -> Result<Json<Control>, CatalogError> {
    if let Some(ref name) = req.name {
        crate::catalogs::types::require_text("name", name)?;
    }

    let result = run_db(&state.conn, move |conn| {
        let mut row = find_org_control(conn, org.organization_id, control_id)
            .optional()?
            .ok_or_else(|| CatalogError::NotFound("Control not found".to_string()))?;

        if let Some(name) = req.name {
            row.name = name;
        }
        if let Some(description) = req.description {
            row.description = Some(description);
        }
        if let Some(control_type) = req.control_type {
            row.control_type = control_type;
        }
        if let Some(level) = req.automation_level {
            row.automation_level = level;
        }
        if let Some(status) = req.status {
            row.status = status;
        }
        if let Some(owner_id) = req.owner_id {
            row.owner_id = Some(owner_id);
        }
        if let Some(frequency) = req.frequency {
            row.frequency = frequency;
        }
        if let Some(effectiveness) = req.effectiveness {
            row.effectiveness = effectiveness;
        }
        row.updated_at = Utc::now();

        diesel::update(controls::table.find(row.id))
            .set(&row)
            .execute(conn)?;

        control_with_clauses(conn, row)
    })
    .await?;

    Ok(Json(result))
}

#[utoipa::path(
    delete,
    path = "/api/controls/{id}",
    params(("id" = Uuid, Path, description = "Control ID")),
    responses((status = 204), (status = 404)),
    tag = "catalogs"
)]
pub async fn handle_delete_control(
    State(state): State<Arc<AppState>>,
    org: OrganizationContext,
    Path(control_id): Path<Uuid>,
) -> Result<StatusCode, CatalogError> {
    let deleted = run_db(&state.conn, move |conn| {
        Ok::<_, CatalogError>(
            diesel::delete(
                controls::table
                    .filter(controls::id.eq(control_id))
                    .filter(controls::org_id.eq(org.organization_id)),
            )
            .execute(conn)?,
        )
    })
    .await?;

    if deleted == 0 {
        return Err(CatalogError::NotFound("Control not found".to_string()));
    }
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    put,
    path = "/api/controls/{id}/clauses",
    params(("id" = Uuid, Path, description = "Control ID")),
    request_body = ReplaceControlClausesRequest,
    responses((status = 200, body = Control), (status = 400), (status = 404)),
    tag = "catalogs"
)]
pub async fn handle_replace_control_clauses(
    State(state): State<Arc<AppState>>,
    org: OrganizationContext,
    Path(control_id): Path<Uuid>,
    Json(req): Json<ReplaceControlClausesRequest>,
) -> Result<Json<Control>, CatalogError> {
    let result = run_db(&state.conn, move |conn| {
        conn.transaction::<_, CatalogError, _>(|conn| {
            let row = find_org_control(conn, org.organization_id, control_id)
                .optional()?
                .ok_or_else(|| CatalogError::NotFound("Control not found".to_string()))?;
            let clause_ids = replace_mappings(conn, row.id, &req.clause_ids)?;
            Ok(db_control_to_control(row, clause_ids, Utc::now().date_naive()))
        })
    })
    .await?;

    Ok(Json(result))
}

#[utoipa::path(
    post,
    path = "/api/controls/{id}/mark-tested",
    params(("id" = Uuid, Path, description = "Control ID")),
    request_body = MarkTestedRequest,
    responses((status = 200, body = Control), (status = 400), (status = 404)),
    tag = "catalogs"
)]
pub async fn handle_mark_control_tested(
    State(state): State<Arc<AppState>>,
    org: OrganizationContext,
    Path(control_id): Path<Uuid>,
    Json(req): Json<MarkTestedRequest>,
) -> Result<Json<Control>, CatalogError> {
    let today = Utc::now().date_naive();
    let tested_date = req.tested_date.unwrap_or(today);
    if tested_date > today {
        return Err(CatalogError::Validation(
            "tested_date cannot be in the future".to_string(),
        ));
    }

    let result = run_db(&state.conn, move |conn| {
        let mut row = find_org_control(conn, org.organization_id, control_id)
            .optional()?
            .ok_or_else(|| CatalogError::NotFound("Control not found".to_string()))?;

        row.last_tested_date = Some(tested_date);
        if let Some(effectiveness) = req.effectiveness {
            row.effectiveness = effectiveness;
        }
        row.updated_at = Utc::now();

        diesel::update(controls::table.find(row.id))
            .set(&row)
            .execute(conn)?;

        control_with_clauses(conn, row)
    })
    .await?;

    Ok(Json(result))
}
