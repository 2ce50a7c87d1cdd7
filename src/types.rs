use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A cluster of related crash reports, treated as one triage unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Problem {
    pub id: i64,
    pub first_occurrence: NaiveDate,
    pub last_occurrence: NaiveDate,
}

impl Problem {
    pub(crate) fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Problem {
            id: row.get(0)?,
            first_occurrence: row.get(1)?,
            last_occurrence: row.get(2)?,
        })
    }
}

/// A problem annotated by a ranking query. `count` is the summed occurrence
/// count over the queried buckets; `rank` is the ordering value (the count
/// itself for hot rankings, occurrences per month for long-term ones).
#[derive(Debug, Clone, Serialize)]
pub struct RankedProblem {
    #[serde(flatten)]
    pub problem: Problem,
    pub count: i64,
    pub rank: f64,
}

/// Which operating-system releases a ranking is scoped to.
///
/// `All` means no release restriction. `Only` with an empty list means
/// "no releases" and always produces an empty ranking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Releases {
    All,
    Only(Vec<i64>),
}

impl Releases {
    pub fn is_empty_selection(&self) -> bool {
        matches!(self, Releases::Only(ids) if ids.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProblemComponent {
    pub problem_id: i64,
    pub component_id: i64,
    pub component_order: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProblemOpSysRelease {
    pub problem_id: i64,
    pub opsysrelease_id: i64,
    pub probable_fix: Option<String>,
}

/// Summed occurrences of one component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComponentCount {
    pub component_id: i64,
    pub name: String,
    pub count: i64,
}

/// Query parameters for `GET /v1/problems/hot`.
#[derive(Debug, Deserialize)]
pub struct HotQueryParams {
    pub releases: Option<String>,
    pub components: Option<String>,
    pub since: Option<NaiveDate>,
    pub history: Option<String>,
    pub limit: Option<usize>,
}

/// Query parameters for `GET /v1/problems/longterm`.
#[derive(Debug, Deserialize)]
pub struct LongTermQueryParams {
    pub releases: Option<String>,
    pub components: Option<String>,
    pub history: Option<String>,
    pub limit: Option<usize>,
}

/// Operating system filter shared by the release and component endpoints.
#[derive(Debug, Deserialize)]
pub struct OpSysQueryParams {
    pub opsys: Option<String>,
    pub version: Option<String>,
    pub history: Option<String>,
}

/// Ranking response envelope.
#[derive(Debug, Serialize)]
pub struct RankingResponse {
    pub history: &'static str,
    pub problems: Vec<RankedProblem>,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub db_ok: bool,
}
