use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use diesel::prelude::*;
use log::info;
use std::sync::Arc;
use uuid::Uuid;

use crate::core::middleware::OrganizationContext;
use crate::core::shared::schema::risk_matrices;
use crate::shared::state::AppState;
use crate::shared::utils::run_db;

use crate::risk::error::RiskError;
use crate::risk::matrix::{Rating, RiskMatrixTable};
use crate::risk::scoring::RiskScore;
use crate::risk::storage::{
    db_matrix_to_matrix, find_org_matrix, recalculate_org_risks, resolve_table, DbRiskMatrix,
};
use crate::risk::types::{
    CalculateRiskQuery, CreateRiskMatrixRequest, RiskCalculation, RiskMatrix,
    UpdateRiskMatrixRequest,
};

fn clear_default(conn: &mut PgConnection, org_id: Uuid) -> QueryResult<usize> {
    diesel::update(
        risk_matrices::table
            .filter(risk_matrices::org_id.eq(org_id))
            .filter(risk_matrices::is_default.eq(true)),
    )
    .set(risk_matrices::is_default.eq(false))
    .execute(conn)
}

#[utoipa::path(
    get,
    path = "/api/risk-matrices",
    responses((status = 200, body = [RiskMatrix])),
    tag = "risk"
)]
pub async fn handle_list_matrices(
    State(state): State<Arc<AppState>>,
    org: OrganizationContext,
) -> Result<Json<Vec<RiskMatrix>>, RiskError> {
    let result = run_db(&state.conn, move |conn| {
        let rows: Vec<DbRiskMatrix> = risk_matrices::table
            .filter(risk_matrices::org_id.eq(org.organization_id))
            .order((risk_matrices::is_default.desc(), risk_matrices::name.asc()))
            .load(conn)?;
        Ok::<_, RiskError>(rows.into_iter().map(db_matrix_to_matrix).collect())
    })
    .await?;

    Ok(Json(result))
}

#[utoipa::path(
    post,
    path = "/api/risk-matrices",
    request_body = CreateRiskMatrixRequest,
    responses((status = 201, body = RiskMatrix), (status = 400)),
    tag = "risk"
)]
pub async fn handle_create_matrix(
    State(state): State<Arc<AppState>>,
    org: OrganizationContext,
    Json(req): Json<CreateRiskMatrixRequest>,
) -> Result<(StatusCode, Json<RiskMatrix>), RiskError> {
    if req.name.trim().is_empty() {
        return Err(RiskError::Validation("name is required".to_string()));
    }
    let table = match req.matrix {
        Some(ref value) => RiskMatrixTable::from_json(value)?,
        None => RiskMatrixTable::standard(),
    };

    let result = run_db(&state.conn, move |conn| {
        conn.transaction::<_, RiskError, _>(|conn| {
            let is_default = req.is_default.unwrap_or(false);
            if is_default {
                clear_default(conn, org.organization_id)?;
            }

            let now = Utc::now();
            let row = DbRiskMatrix {
                id: Uuid::new_v4(),
                org_id: org.organization_id,
                name: req.name.trim().to_string(),
                description: req.description,
                is_default,
                matrix: table.to_json(),
                created_at: now,
                updated_at: now,
            };
            diesel::insert_into(risk_matrices::table)
                .values(&row)
                .execute(conn)?;

            if is_default {
                recalculate_org_risks(conn, org.organization_id)?;
            }
            Ok(db_matrix_to_matrix(row))
        })
    })
    .await?;

    Ok((StatusCode::CREATED, Json(result)))
}

#[utoipa::path(
    get,
    path = "/api/risk-matrices/{id}",
    params(("id" = Uuid, Path, description = "Risk matrix ID")),
    responses((status = 200, body = RiskMatrix), (status = 404)),
    tag = "risk"
)]
pub async fn handle_get_matrix(
    State(state): State<Arc<AppState>>,
    org: OrganizationContext,
    Path(matrix_id): Path<Uuid>,
) -> Result<Json<RiskMatrix>, RiskError> {
    let row = run_db(&state.conn, move |conn| {
        find_org_matrix(conn, org.organization_id, matrix_id)
            .optional()?
            .ok_or_else(|| RiskError::NotFound("Risk matrix not found".to_string()))
    })
    .await?;

    Ok(Json(db_matrix_to_matrix(row)))
}

#[utoipa::path(
    put,
    path = "/api/risk-matrices/{id}",
    params(("id" = Uuid, Path, description = "Risk matrix ID")),
    request_body = UpdateRiskMatrixRequest,
    responses((status = 200, body = RiskMatrix), (status = 400), (status = 404)),
    tag = "risk"
)]
pub async fn handle_update_matrix(
    State(state): State<Arc<AppState>>,
    org: OrganizationContext,
    Path(matrix_id): Path<Uuid>,
    Json(req): Json<UpdateRiskMatrixRequest>,
) -> Result<Json<RiskMatrix>, RiskError> {
    if req.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
        return Err(RiskError::Validation("name cannot be empty".to_string()));
    }
    let table = req
        .matrix
        .as_ref()
        .map(RiskMatrixTable::from_json)
        .transpose()?;

    let result = run_db(&state.conn, move |conn| {
        conn.transaction::<_, RiskError, _>(|conn| {
            let mut row = find_org_matrix(conn, org.organization_id, matrix_id)
                .optional()?
                .ok_or_else(|| RiskError::NotFound("Risk matrix not found".to_string()))?;

            if let Some(name) = req.name {
                row.name = name.trim().to_string();
            }
            if let Some(description) = req.description {
                row.description = Some(description);
            }
            if let Some(ref table) = table {
                row.matrix = table.to_json();
            }
            row.updated_at = Utc::now();

            diesel::update(risk_matrices::table.find(row.id))
                .set(&row)
                .execute(conn)?;

            if table.is_some() {
                let changed = recalculate_org_risks(conn, org.organization_id)?;
                info!("Matrix {} updated; {} risk levels changed", row.id, changed);
            }
            Ok(db_matrix_to_matrix(row))
        })
    })
    .await?;

    Ok(Json(result))
}

#[utoipa::path(
    delete,
    path = "/api/risk-matrices/{id}",
    params(("id" = Uuid, Path, description = "Risk matrix ID")),
    responses((status = 204), (status = 404)),
    tag = "risk"
)]
pub async fn handle_delete_matrix(
    State(state): State<Arc<AppState>>,
    org: OrganizationContext,
    Path(matrix_id): Path<Uuid>,
) -> Result<StatusCode, RiskError> {
    run_db(&state.conn, move |conn| {
        conn.transaction::<_, RiskError, _>(|conn| {
            let deleted = diesel::delete(
                risk_matrices::table
                    .filter(risk_matrices::id.eq(matrix_id))
                    .filter(risk_matrices::org_id.eq(org.organization_id)),
            )
            .execute(conn)?;
            if deleted == 0 {
                return Err(RiskError::NotFound("Risk matrix not found".to_string()));
            }
            recalculate_org_risks(conn, org.organization_id)?;
            Ok(())
        })
    })
    .await?;

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/api/risk-matrices/{id}/default",
    params(("id" = Uuid, Path, description = "Risk matrix ID")),
    responses((status = 200, body = RiskMatrix), (status = 404)),
    tag = "risk"
)]
pub async fn handle_set_default_matrix(
    State(state): State<Arc<AppState>>,
    org: OrganizationContext,
    Path(matrix_id): Path<Uuid>,
) -> Result<Json<RiskMatrix>, RiskError> {
    let result = run_db(&state.conn, move |conn| {
        conn.transaction::<_, RiskError, _>(|conn| {
            let mut row = find_org_matrix(conn, org.organization_id, matrix_id)
                .optional()?
                .ok_or_else(|| RiskError::NotFound("Risk matrix not found".to_string()))?;

            clear_default(conn, org.organization_id)?;
            row.is_default = true;
            row.updated_at = Utc::now();
            diesel::update(risk_matrices::table.find(row.id))
                .set(&row)
                .execute(conn)?;

            let changed = recalculate_org_risks(conn, org.organization_id)?;
            info!(
                "Matrix {} is now default for org {}; {} risk levels changed",
                row.id, org.organization_id, changed
            );
            Ok(db_matrix_to_matrix(row))
        })
    })
    .await?;

    Ok(Json(result))
}

#[utoipa::path(
    get,
    path = "/api/risk-matrices/calculate",
    params(
        ("impact" = i32, Query, description = "Impact rating 1-5"),
        ("likelihood" = i32, Query, description = "Likelihood rating 1-5"),
        ("matrix_id" = Option<Uuid>, Query, description = "Matrix to score against")
    ),
    responses((status = 200, body = RiskCalculation), (status = 400)),
    tag = "risk"
)]
pub async fn handle_calculate_risk(
    State(state): State<Arc<AppState>>,
    org: OrganizationContext,
    Query(query): Query<CalculateRiskQuery>,
) -> Result<Json<RiskCalculation>, RiskError> {
    let impact = Rating::new(query.impact, "impact")?;
    let likelihood = Rating::new(query.likelihood, "likelihood")?;

    let (table, matrix_id, source) = run_db(&state.conn, move |conn| {
        Ok::<_, RiskError>(resolve_table(conn, org.organization_id, query.matrix_id)?)
    })
    .await?;

    let score = RiskScore::compute(impact, likelihood, table.as_ref());
    Ok(Json(RiskCalculation {
        impact: impact.get(),
        likelihood: likelihood.get(),
        risk_score: score.score,
        risk_level: score.level,
        matrix_id,
        source,
    }))
}
