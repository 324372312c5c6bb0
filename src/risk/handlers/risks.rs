use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use diesel::prelude::*;
use std::sync::Arc;
use uuid::Uuid;

use crate::core::middleware::{AuthenticatedUser, OrganizationContext};
use crate::core::shared::schema::{controls, risk_actions, risk_controls, risks};
use crate::shared::state::AppState;
use crate::shared::utils::{page_bounds, run_db};

use crate::risk::analytics::{heatmap, summarize};
use crate::risk::error::RiskError;
use crate::risk::matrix::Rating;
use crate::risk::scoring::{apply_assessment, PriorAssessment};
use crate::risk::storage::{
    allocate_risk_code, db_risk_to_risk, find_org_matrix, find_org_risk,
    load_control_ids_for_risks, rescore, resolve_table, DbRisk, DbRiskAction, DbRiskControl,
};
use crate::risk::types::{
    CreateRiskRequest, ListRisksQuery, ReplaceRiskControlsRequest, Risk, RiskCategory,
    RiskHeatmap, RiskLevel, RiskStatus, RiskSummary, TreatmentStrategy, UpdateRiskRequest,
};

pub const RISK_CODE_PREFIX: &str = "RISK";

fn ensure_matrix(conn: &mut PgConnection, org_id: Uuid, matrix_id: Uuid) -> Result<(), RiskError> {
    find_org_matrix(conn, org_id, matrix_id)
        .optional()?
        .map(|_| ())
        .ok_or_else(|| RiskError::Validation(format!("Risk matrix {matrix_id} does not exist")))
}

fn replace_controls(
    conn: &mut PgConnection,
    org_id: Uuid,
    risk_id: Uuid,
    control_ids: &[Uuid],
) -> Result<Vec<Uuid>, RiskError> {
    let mut wanted = control_ids.to_vec();
    wanted.sort();
    wanted.dedup();

    let owned: i64 = controls::table
        .filter(controls::org_id.eq(org_id))
        .filter(controls::id.eq_any(&wanted))
        .count()
        .get_result(conn)?;
    if owned != wanted.len() as i64 {
        return Err(RiskError::Validation(
            "One or more controls do not exist".to_string(),
        ));
    }

    diesel::delete(risk_controls::table.filter(risk_controls::risk_id.eq(risk_id)))
        .execute(conn)?;
    let rows: Vec<DbRiskControl> = wanted
        .iter()
        .map(|control_id| DbRiskControl {
            risk_id,
            control_id: *control_id,
        })
        .collect();
    if !rows.is_empty() {
        diesel::insert_into(risk_controls::table)
            .values(&rows)
            .execute(conn)?;
    }
    Ok(wanted)
}

fn risk_with_controls(conn: &mut PgConnection, row: DbRisk) -> Result<Risk, RiskError> {
    let mut mappings = load_control_ids_for_risks(conn, &[row.id])?;
    let control_ids = mappings.remove(&row.id).unwrap_or_default();
    Ok(db_risk_to_risk(row, control_ids))
}

#[utoipa::path(
    get,
    path = "/api/risks",
    responses((status = 200, body = [Risk]), (status = 400)),
    tag = "risk"
)]
pub async fn handle_list_risks(
    State(state): State<Arc<AppState>>,
    org: OrganizationContext,
    Query(query): Query<ListRisksQuery>,
) -> Result<Json<Vec<Risk>>, RiskError> {
    let result = run_db(&state.conn, move |conn| {
        let (limit, offset) = page_bounds(query.limit, query.offset);
        let mut db_query = risks::table
            .filter(risks::org_id.eq(org.organization_id))
            .into_boxed();

        if let Some(status) = query.status {
            db_query = db_query.filter(risks::status.eq(status));
        }
        if let Some(category) = query.category {
            db_query = db_query.filter(risks::category.eq(category));
        }
        if let Some(level) = query.risk_level {
            db_query = db_query.filter(risks::risk_level.eq(level));
        }
        if let Some(owner_id) = query.owner_id {
            db_query = db_query.filter(risks::owner_id.eq(owner_id));
        }
        if let Some(ref search) = query.search {
            let term = format!("%{search}%");
            db_query = db_query.filter(
                risks::title
                    .ilike(term.clone())
                    .or(risks::risk_id.ilike(term)),
            );
        }

        let rows: Vec<DbRisk> = db_query
            .order((risks::risk_score.desc(), risks::risk_id.asc()))
            .offset(offset)
            .limit(limit)
            .load(conn)?;

        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let mut mappings = load_control_ids_for_risks(conn, &ids)?;
        Ok::<_, RiskError>(
            rows.into_iter()
                .map(|row| {
                    let control_ids = mappings.remove(&row.id).unwrap_or_default();
                    db_risk_to_risk(row, control_ids)
                })
                .collect(),
        )
    })
    .await?;

    Ok(Json(result))
}

#[utoipa::path(
    post,
    path = "/api/risks",
    request_body = CreateRiskRequest,
    responses((status = 201, body = Risk), (status = 400)),
    tag = "risk"
)]
pub async fn handle_create_risk(
    State(state): State<Arc<AppState>>,
    org: OrganizationContext,
    user: AuthenticatedUser,
    Json(req): Json<CreateRiskRequest>,
) -> Result<(StatusCode, Json<Risk>), RiskError> {
    if req.title.trim().is_empty() {
        return Err(RiskError::Validation("title is required".to_string()));
    }
    let impact = Rating::new(req.impact, "impact")?;
    let likelihood = Rating::new(req.likelihood, "likelihood")?;

    let result = run_db(&state.conn, move |conn| {
        conn.transaction::<_, RiskError, _>(|conn| {
            if let Some(matrix_id) = req.risk_matrix_id {
                ensure_matrix(conn, org.organization_id, matrix_id)?;
            }

            let risk_code = allocate_risk_code(conn, org.organization_id, RISK_CODE_PREFIX)?;
            let now = Utc::now();
            let today = now.date_naive();
            let mut row = DbRisk {
                id: Uuid::new_v4(),
                org_id: org.organization_id,
                risk_id: risk_code,
                title: req.title.trim().to_string(),
                description: req.description,
                category: req.category.unwrap_or(RiskCategory::Operational),
                status: req.status.unwrap_or(RiskStatus::Identified),
                owner_id: req.owner_id,
                impact: impact.get(),
                likelihood: likelihood.get(),
                risk_score: 0,
                risk_level: RiskLevel::Low,
                risk_matrix_id: req.risk_matrix_id,
                treatment_strategy: req.treatment_strategy.unwrap_or(TreatmentStrategy::Mitigate),
                treatment_description: req.treatment_description,
                identified_date: req.identified_date.unwrap_or(today),
                last_assessed_date: apply_assessment(None, impact, likelihood, today),
                next_review_date: req.next_review_date,
                created_by: user.user_id,
                created_at: now,
                updated_at: now,
            };
            rescore(conn, &mut row)?;

            diesel::insert_into(risks::table)
                .values(&row)
                .execute(conn)?;

            let control_ids = match req.control_ids {
                Some(ref ids) if !ids.is_empty() => {
                    replace_controls(conn, org.organization_id, row.id, ids)?
                }
                _ => Vec::new(),
            };
            log::info!(
                "Created risk {} ({} score {}, {})",
                row.risk_id,
                row.title,
                row.risk_score,
                row.risk_level
            );
            Ok(db_risk_to_risk(row, control_ids))
        })
    })
    .await?;

    Ok((StatusCode::CREATED, Json(result)))
}

#[utoipa::path(
    get,
    path = "/api/risks/{id}",
    params(("id" = Uuid, Path, description = "Risk ID")),
    responses((status = 200, body = Risk), (status = 404)),
    tag = "risk"
)]
pub async fn handle_get_risk(
    State(state): State<Arc<AppState>>,
    org: OrganizationContext,
    Path(risk_id): Path<Uuid>,
) -> Result<Json<Risk>, RiskError> {
    let result = run_db(&state.conn, move |conn| {
        let row = find_org_risk(conn, org.organization_id, risk_id)
            .optional()?
            .ok_or_else(|| RiskError::NotFound("Risk not found".to_string()))?;
        risk_with_controls(conn, row)
    })
    .await?;

    Ok(Json(result))
}

#[utoipa::path(
    put,
    path = "/api/risks/{id}",
    params(("id" = Uuid, Path, description = "Risk ID")),
    request_body = UpdateRiskRequest,
    responses((status = 200, body = Risk), (status = 400), (status = 404)),
    tag = "risk"
)]
pub async fn handle_update_risk(
    State(state): State<Arc<AppState>>,
    org: OrganizationContext,
    Path(risk_id): Path<Uuid>,
    Json(req): Json<UpdateRiskRequest>,
) -> Result<Json<Risk>, RiskError> {
    if req.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
        return Err(RiskError::Validation("title cannot be empty".to_string()));
    }
    let impact = req.impact.map(|v| Rating::new(v, "impact")).transpose()?;
    let likelihood = req
        .likelihood
        .map(|v| Rating::new(v, "likelihood"))
        .transpose()?;

    let result = run_db(&state.conn, move |conn| {
        let mut row = find_org_risk(conn, org.organization_id, risk_id)
            .optional()?
            .ok_or_else(|| RiskError::NotFound("Risk not found".to_string()))?;

        let prior = PriorAssessment {
            impact: row.impact,
            likelihood: row.likelihood,
            last_assessed_date: row.last_assessed_date,
        };
        let impact = match impact {
            Some(i) => i,
            None => Rating::new(row.impact, "impact")?,
        };
        let likelihood = match likelihood {
            Some(l) => l,
            None => Rating::new(row.likelihood, "likelihood")?,
        };

        if req.clear_risk_matrix.unwrap_or(false) {
            row.risk_matrix_id = None;
        } else if let Some(matrix_id) = req.risk_matrix_id {
            ensure_matrix(conn, org.organization_id, matrix_id)?;
            row.risk_matrix_id = Some(matrix_id);
        }
        if let Some(title) = req.title {
            row.title = title.trim().to_string();
        }
        if let Some(description) = req.description {
            row.description = Some(description);
        }
        if let Some(category) = req.category {
            row.category = category;
        }
        if let Some(status) = req.status {
            row.status = status;
        }
        if let Some(owner_id) = req.owner_id {
            row.owner_id = Some(owner_id);
        }
        if let Some(strategy) = req.treatment_strategy {
            row.treatment_strategy = strategy;
        }
        if let Some(text) = req.treatment_description {
            row.treatment_description = Some(text);
        }
        if let Some(date) = req.next_review_date {
            row.next_review_date = Some(date);
        }

        let now = Utc::now();
        row.impact = impact.get();
        row.likelihood = likelihood.get();
        row.last_assessed_date =
            apply_assessment(Some(prior), impact, likelihood, now.date_naive());
        rescore(conn, &mut row)?;
        row.updated_at = now;

        diesel::update(risks::table.find(row.id))
            .set(&row)
            .execute(conn)?;

        risk_with_controls(conn, row)
    })
    .await?;

    Ok(Json(result))
}

#[utoipa::path(
    delete,
    path = "/api/risks/{id}",
    params(("id" = Uuid, Path, description = "Risk ID")),
    responses((status = 204), (status = 404)),
    tag = "risk"
)]
pub async fn handle_delete_risk(
    State(state): State<Arc<AppState>>,
    org: OrganizationContext,
    Path(risk_id): Path<Uuid>,
) -> Result<StatusCode, RiskError> {
    let deleted = run_db(&state.conn, move |conn| {
        Ok::<_, RiskError>(
            diesel::delete(
                risks::table
                    .filter(risks::id.eq(risk_id))
                    .filter(risks::org_id.eq(org.organization_id)),
            )
            .execute(conn)?,
        )
    })
    .await?;

    if deleted == 0 {
        return Err(RiskError::NotFound("Risk not found".to_string()));
    }
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    put,
    path = "/api/risks/{id}/controls",
    params(("id" = Uuid, Path, description = "Risk ID")),
    request_body = ReplaceRiskControlsRequest,
    responses((status = 200, body = Risk), (status = 400), (status = 404)),
    tag = "risk"
)]
pub async fn handle_replace_risk_controls(
    State(state): State<Arc<AppState>>,
    org: OrganizationContext,
    Path(risk_id): Path<Uuid>,
    Json(req): Json<ReplaceRiskControlsRequest>,
) -> Result<Json<Risk>, RiskError> {
    let result = run_db(&state.conn, move |conn| {
        conn.transaction::<_, RiskError, _>(|conn| {
            let row = find_org_risk(conn, org.organization_id, risk_id)
                .optional()?
                .ok_or_else(|| RiskError::NotFound("Risk not found".to_string()))?;
            let control_ids = replace_controls(conn, org.organization_id, row.id, &req.control_ids)?;
            Ok(db_risk_to_risk(row, control_ids))
        })
    })
    .await?;

    Ok(Json(result))
}

#[utoipa::path(
    get,
    path = "/api/risks/summary",
    responses((status = 200, body = RiskSummary)),
    tag = "risk"
)]
pub async fn handle_risk_summary(
    State(state): State<Arc<AppState>>,
    org: OrganizationContext,
) -> Result<Json<RiskSummary>, RiskError> {
    let result = run_db(&state.conn, move |conn| {
        let rows: Vec<DbRisk> = risks::table
            .filter(risks::org_id.eq(org.organization_id))
            .load(conn)?;
        let actions: Vec<DbRiskAction> = risk_actions::table
            .filter(risk_actions::org_id.eq(org.organization_id))
            .load(conn)?;
        Ok::<_, RiskError>(summarize(&rows, &actions, Utc::now().date_naive()))
    })
    .await?;

    Ok(Json(result))
}

#[utoipa::path(
    get,
    path = "/api/risks/heatmap",
    responses((status = 200, body = RiskHeatmap)),
    tag = "risk"
)]
pub async fn handle_risk_heatmap(
    State(state): State<Arc<AppState>>,
    org: OrganizationContext,
) -> Result<Json<RiskHeatmap>, RiskError> {
    let result = run_db(&state.conn, move |conn| {
        let rows: Vec<DbRisk> = risks::table
            .filter(risks::org_id.eq(org.organization_id))
            .filter(risks::status.ne(RiskStatus::Closed))
            .load(conn)?;
        let (table, _, _) = resolve_table(conn, org.organization_id, None)?;
        Ok::<_, RiskError>(heatmap(&rows, table.as_ref()))
    })
    .await?;

    Ok(Json(result))
}
