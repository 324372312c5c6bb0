use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use diesel::prelude::*;
use std::sync::Arc;
use uuid::Uuid;

use crate::core::shared::schema::{clauses, frameworks};
use crate::shared::state::AppState;
use crate::shared::utils::{page_bounds, run_db};

use crate::catalogs::error::CatalogError;
use crate::catalogs::storage::{db_clause_to_clause, load_clause_links, DbClause};
use crate::catalogs::tree::{creates_cycle, full_clause_id, full_clause_ids, link_map};
use crate::catalogs::types::{
    Clause, ClauseType, CreateClauseRequest, ListClausesQuery, UpdateClauseRequest,
};

fn with_full_ids(conn: &mut PgConnection, rows: Vec<DbClause>) -> Result<Vec<Clause>, CatalogError> {
    let mut framework_ids: Vec<Uuid> = rows.iter().map(|c| c.framework_id).collect();
    framework_ids.sort();
    framework_ids.dedup();

    let links = link_map(load_clause_links(conn, &framework_ids)?);
    let full_ids = full_clause_ids(&links);

    Ok(rows
        .into_iter()
        .map(|row| {
            let full = full_ids
                .get(&row.id)
                .cloned()
                .unwrap_or_else(|| row.clause_id.clone());
            db_clause_to_clause(row, full)
        })
        .collect())
}

fn load_clause(conn: &mut PgConnection, clause_id: Uuid) -> Result<DbClause, CatalogError> {
    clauses::table
        .find(clause_id)
        .first(conn)
        .optional()?
        .ok_or_else(|| CatalogError::NotFound("Clause not found".to_string()))
}

fn single_with_full_id(conn: &mut PgConnection, row: DbClause) -> Result<Clause, CatalogError> {
    let links = link_map(load_clause_links(conn, &[row.framework_id])?);
    let full = full_clause_id(row.id, &links);
    Ok(db_clause_to_clause(row, full))
}

#[utoipa::path(
    get,
    path = "/api/clauses",
    responses((status = 200, body = [Clause])),
    tag = "catalogs"
)]
pub async fn handle_list_clauses(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListClausesQuery>,
) -> Result<Json<Vec<Clause>>, CatalogError> {
    let result = run_db(&state.conn, move |conn| {
        let (limit, offset) = page_bounds(query.limit, query.offset);
        let mut db_query = clauses::table.into_boxed();

        if let Some(framework_id) = query.framework_id {
            db_query = db_query.filter(clauses::framework_id.eq(framework_id));
        }
        if let Some(parent_id) = query.parent_id {
            db_query = db_query.filter(clauses::parent_id.eq(parent_id));
        }
        if let Some(clause_type) = query.clause_type {
            db_query = db_query.filter(clauses::clause_type.eq(clause_type));
        }
        if let Some(is_testable) = query.is_testable {
            db_query = db_query.filter(clauses::is_testable.eq(is_testable));
        }
        if let Some(ref search) = query.search {
            let term = format!("%{search}%");
            db_query = db_query.filter(
                clauses::title
                    .ilike(term.clone())
                    .or(clauses::clause_id.ilike(term)),
            );
        }

        let rows: Vec<DbClause> = db_query
            .order((
                clauses::framework_id.asc(),
                clauses::sort_order.asc(),
                clauses::clause_id.asc(),
            ))
            .offset(offset)
            .limit(limit)
            .load(conn)?;

        with_full_ids(conn, rows)
    })
    .await?;

    Ok(Json(result))
}

#[utoipa::path(
    post,
    path = "/api/clauses",
    request_body = CreateClauseRequest,
    responses((status = 201, body = Clause), (status = 400), (status = 409)),
    tag = "catalogs"
)]
pub async fn handle_create_clause(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateClauseRequest>,
) -> Result<(StatusCode, Json<Clause>), CatalogError> {
    req.validate()?;

    let result = run_db(&state.conn, move |conn| {
        let framework: Option<Uuid> = frameworks::table
            .find(req.framework_id)
            .select(frameworks::id)
            .first(conn)
            .optional()?;
        if framework.is_none() {
            return Err(CatalogError::Validation(format!(
                "Framework {} does not exist",
                req.framework_id
            )));
        }

        if let Some(parent_id) = req.parent_id {
            let parent = load_clause(conn, parent_id)
                .map_err(|_| CatalogError::Validation("Parent clause does not exist".to_string()))?;
            if parent.framework_id != req.framework_id {
                return Err(CatalogError::Validation(
                    "Parent clause belongs to another framework".to_string(),
                ));
            }
        }

        let now = Utc::now();
        let row = DbClause {
            id: Uuid::new_v4(),
            framework_id: req.framework_id,
            clause_id: req.clause_id.trim().to_string(),
            title: req.title,
            description: req.description,
            clause_type: req.clause_type.unwrap_or(ClauseType::Requirement),
            parent_id: req.parent_id,
            sort_order: req.sort_order.unwrap_or(0),
            is_testable: req.is_testable.unwrap_or(true),
            created_at: now,
            updated_at: now,
        };
        diesel::insert_into(clauses::table)
            .values(&row)
            .execute(conn)?;

        single_with_full_id(conn, row)
    })
    .await?;

    Ok((StatusCode::CREATED, Json(result)))
}

#[utoipa::path(
    get,
    path = "/api/clauses/{id}",
    params(("id" = Uuid, Path, description = "Clause ID")),
    responses((status = 200, body = Clause), (status = 404)),
    tag = "catalogs"
)]
pub async fn handle_get_clause(
    State(state): State<Arc<AppState>>,
    Path(clause_id): Path<Uuid>,
) -> Result<Json<Clause>, CatalogError> {
    let result = run_db(&state.conn, move |conn| {
        let row = load_clause(conn, clause_id)?;
        single_with_full_id(conn, row)
    })
    .await?;

    Ok(Json(result))
}

#[utoipa::path(
    put,
    path = "/api/clauses/{id}",
    params(("id" = Uuid, Path, description = "Clause ID")),
    request_body = UpdateClauseRequest,
    responses((status = 200, body = Clause), (status = 400), (status = 404)),
    tag = "catalogs"
)]
pub async fn handle_update_clause(
    State(state): State<Arc<AppState>>,
    Path(clause_id): Path<Uuid>,
    Json(req): Json<UpdateClauseRequest>,
) -> Result<Json<Clause>, CatalogError> {
    if let Some(ref title) = req.title {
        crate::catalogs::types::require_text("title", title)?;
    }

    let result = run_db(&state.conn, move |conn| {
        let mut row = load_clause(conn, clause_id)?;

        if req.detach_parent.unwrap_or(false) {
            row.parent_id = None;
        } else if let Some(parent_id) = req.parent_id {
            let links = link_map(load_clause_links(conn, &[row.framework_id])?);
            if !links.contains_key(&parent_id) {
                return Err(CatalogError::Validation(
                    "Parent clause must belong to the same framework".to_string(),
                ));
            }
            if creates_cycle(row.id, parent_id, &links) {
                return Err(CatalogError::Validation(
                    "Parent change would create a cycle".to_string(),
                ));
            }
            row.parent_id = Some(parent_id);
        }

        if let Some(title) = req.title {
            row.title = title;
        }
        if let Some(description) = req.description {
            row.description = Some(description);
        }
        if let Some(clause_type) = req.clause_type {
            row.clause_type = clause_type;
        }
        if let Some(sort_order) = req.sort_order {
            row.sort_order = sort_order;
        }
        if let Some(is_testable) = req.is_testable {
            row.is_testable = is_testable;
        }
        row.updated_at = Utc::now();

        diesel::update(clauses::table.find(row.id))
            .set(&row)
            .execute(conn)?;

        single_with_full_id(conn, row)
    })
    .await?;

    Ok(Json(result))
}

#[utoipa::path(
    delete,
    path = "/api/clauses/{id}",
    params(("id" = Uuid, Path, description = "Clause ID")),
    responses((status = 204), (status = 404)),
    tag = "catalogs"
)]
pub async fn handle_delete_clause(
    State(state): State<Arc<AppState>>,
    Path(clause_id): Path<Uuid>,
) -> Result<StatusCode, CatalogError> {
    let deleted = run_db(&state.conn, move |conn| {
        Ok::<_, CatalogError>(diesel::delete(clauses::table.find(clause_id)).execute(conn)?)
    })
    .await?;

    if deleted == 0 {
        return Err(CatalogError::NotFound("Clause not found".to_string()));
    }
    Ok(StatusCode::NO_CONTENT)
}
