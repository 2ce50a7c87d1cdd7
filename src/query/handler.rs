use crate::config::RankingConfig;
use crate::error::{AppError, AppResult};
use crate::query::lookup;
use crate::ranking::{self, History};
use crate::types::{
    ComponentCount, HealthResponse, HotQueryParams, LongTermQueryParams, OpSysQueryParams,
    Problem, RankingResponse, Releases,
};
use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{Duration, Local, NaiveDate};
use deadpool_sqlite::{Object, Pool};
use serde_json::json;
use std::sync::Arc;

pub struct QueryState {
    pub pool: Pool,
    pub ranking: RankingConfig,
}

impl QueryState {
    async fn conn(&self) -> AppResult<Object> {
        self.pool
            .get()
            .await
            .map_err(|e| AppError::Internal(format!("pool error: {e}")))
    }
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// Parse a comma separated id list. An empty string is an empty list.
pub(crate) fn parse_id_list(field: &str, raw: &str) -> AppResult<Vec<i64>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<i64>()
                .map_err(|_| AppError::Validation(format!("invalid id in {field}: {s:?}")))
        })
        .collect()
}

/// `releases` absent means every release; present but empty means none.
pub(crate) fn release_selection(raw: Option<&str>) -> AppResult<Releases> {
    match raw {
        None => Ok(Releases::All),
        Some(raw) => Ok(Releases::Only(parse_id_list("releases", raw)?)),
    }
}

pub(crate) fn component_selection(raw: Option<&str>) -> AppResult<Option<Vec<i64>>> {
    raw.map(|raw| parse_id_list("components", raw)).transpose()
}

/// GET /v1/problems/hot - Problems ranked by occurrences since a cutoff.
pub async fn hot_problems(
    State(state): State<Arc<QueryState>>,
    Query(params): Query<HotQueryParams>,
) -> AppResult<Json<RankingResponse>> {
    let releases = release_selection(params.releases.as_deref())?;
    let components = component_selection(params.components.as_deref())?;
    let token = params.history.unwrap_or_else(|| "daily".to_string());
    let history = History::from_token(&token);
    let limit = state.ranking.clamp_limit(params.limit);
    let today = today();
    let since = params
        .since
        .unwrap_or(today - Duration::days(state.ranking.hot_window_days));

    let conn = state.conn().await?;
    let mut problems = conn
        .interact(move |conn| {
            ranking::hot_problems(
                conn,
                &releases,
                components.as_deref(),
                Some(since),
                &token,
                today,
            )
        })
        .await??;

    tracing::info!(%history, %since, total = problems.len(), limit, "hot problems");
    problems.truncate(limit);

    Ok(Json(RankingResponse {
        history: history.as_str(),
        problems,
    }))
}

/// GET /v1/problems/longterm - Problems ranked by average occurrences per month.
pub async fn longterm_problems(
    State(state): State<Arc<QueryState>>,
    Query(params): Query<LongTermQueryParams>,
) -> AppResult<Json<RankingResponse>> {
    let releases = release_selection(params.releases.as_deref())?;
    let components = component_selection(params.components.as_deref())?;
    let token = params.history.unwrap_or_else(|| "monthly".to_string());
    let history = History::from_token(&token);
    let limit = state.ranking.clamp_limit(params.limit);
    let today = today();

    let conn = state.conn().await?;
    let mut problems = conn
        .interact(move |conn| {
            ranking::longterm_problems(conn, &releases, components.as_deref(), &token, today)
        })
        .await??;

    tracing::info!(%history, total = problems.len(), limit, "long-term problems");
    problems.truncate(limit);

    Ok(Json(RankingResponse {
        history: history.as_str(),
        problems,
    }))
}

/// GET /v1/problems/{id}
pub async fn get_problem(
    State(state): State<Arc<QueryState>>,
    Path(id): Path<i64>,
) -> AppResult<Json<Problem>> {
    let conn = state.conn().await?;
    let problem = conn
        .interact(move |conn| lookup::get_problem_by_id(conn, id))
        .await??;

    problem
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("problem {id} not found")))
}

/// GET /v1/releases - Release ids, optionally narrowed by OS name and version.
pub async fn release_ids(
    State(state): State<Arc<QueryState>>,
    Query(params): Query<OpSysQueryParams>,
) -> AppResult<Json<serde_json::Value>> {
    let conn = state.conn().await?;
    let ids = conn
        .interact(move |conn| {
            lookup::get_release_ids(conn, params.opsys.as_deref(), params.version.as_deref())
        })
        .await??;

    Ok(Json(json!({ "releases": ids })))
}

/// GET /v1/components/stats - Occurrence totals per component.
pub async fn component_stats(
    State(state): State<Arc<QueryState>>,
    Query(params): Query<OpSysQueryParams>,
) -> AppResult<Json<serde_json::Value>> {
    let history = History::from_token(params.history.as_deref().unwrap_or("monthly"));

    let conn = state.conn().await?;
    let (total, components) = conn
        .interact(move |conn| {
            let opsys = params.opsys.as_deref();
            let version = params.version.as_deref();
            let total = lookup::get_history_sum(conn, opsys, version, history)?;
            let components: Vec<ComponentCount> =
                lookup::get_report_count_by_component(conn, opsys, version, history)?;
            Ok::<_, rusqlite::Error>((total, components))
        })
        .await??;

    Ok(Json(json!({
        "history": history.as_str(),
        "total": total,
        "components": components,
    })))
}

/// GET /health - Health check.
pub async fn health(State(state): State<Arc<QueryState>>) -> Json<HealthResponse> {
    let db_ok = match state.pool.get().await {
        Ok(conn) => matches!(
            conn.interact(|conn| conn.execute_batch("SELECT 1")).await,
            Ok(Ok(()))
        ),
        Err(_) => false,
    };

    Json(HealthResponse {
        status: if db_ok {
            "ok".into()
        } else {
            "degraded".into()
        },
        db_ok,
    })
}
