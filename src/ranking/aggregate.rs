use crate::ranking::history::History;
use crate::types::{Problem, RankedProblem, Releases};
use rusqlite::types::ToSql;
use rusqlite::Connection;

/// Extra predicate applied to the rank aggregation before grouping.
pub type RankFilter<'a> = &'a dyn Fn(&mut RankQuery);

/// Reorders (or drops) ranked rows after the count-ordered query returns.
pub type PostProcess<'a> = &'a dyn Fn(Vec<RankedProblem>) -> Vec<RankedProblem>;

/// The per-problem sum being built, before grouping.
///
/// Inside filters the bucket row is aliased `h` and its problem `p`, so
/// clauses may compare `p.first_occurrence`, `p.last_occurrence` and
/// [`RankQuery::bucket_date`].
pub struct RankQuery {
    history: History,
    clauses: Vec<String>,
    binds: Vec<Box<dyn ToSql>>,
}

impl RankQuery {
    fn new(history: History) -> Self {
        Self {
            history,
            clauses: Vec::new(),
            binds: Vec::new(),
        }
    }

    pub fn history(&self) -> History {
        self.history
    }

    /// Qualified bucket date column, e.g. `h.day`.
    pub fn bucket_date(&self) -> String {
        format!("h.{}", self.history.date_column())
    }

    /// Add a clause that compares columns only.
    pub fn filter(&mut self, clause: impl Into<String>) -> &mut Self {
        self.clauses.push(clause.into());
        self
    }

    /// Add `<column> <op> <value>` with `value` bound as a parameter.
    pub fn filter_value<T: ToSql + 'static>(&mut self, column: &str, op: &str, value: T) -> &mut Self {
        let placeholder = self.bind(value);
        self.clauses.push(format!("{column} {op} {placeholder}"));
        self
    }

    /// Add `<column> IN (...)` over `values`, each bound as a parameter.
    pub fn filter_in(&mut self, column: &str, values: &[i64]) -> &mut Self {
        let list = self.bind_list(values);
        self.clauses.push(format!("{column} IN ({list})"));
        self
    }

    fn bind<T: ToSql + 'static>(&mut self, value: T) -> String {
        self.binds.push(Box::new(value));
        format!("?{}", self.binds.len())
    }

    fn bind_list(&mut self, values: &[i64]) -> String {
        values
            .iter()
            .map(|v| self.bind(*v))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Rank problems by summed bucket counts.
///
/// Sums `count` per problem over the `history` buckets of `releases`, applies
/// `rank_filter` to the aggregation, keeps only problems linked to one of
/// `components` when given, and orders by summed count descending with ties
/// broken by ascending problem id. `post_process` sees that ordering and
/// returns the final one.
pub fn query_problems(
    conn: &Connection,
    history: History,
    releases: &Releases,
    components: Option<&[i64]>,
    rank_filter: Option<RankFilter<'_>>,
    post_process: Option<PostProcess<'_>>,
) -> rusqlite::Result<Vec<RankedProblem>> {
    if releases.is_empty_selection() || components.is_some_and(|c| c.is_empty()) {
        tracing::debug!(%history, "empty release or component selection, nothing to rank");
        return Ok(Vec::new());
    }

    let mut query = RankQuery::new(history);
    if let Releases::Only(ids) = releases {
        query.filter_in("h.opsysrelease_id", ids);
    }
    if let Some(filter) = rank_filter {
        filter(&mut query);
    }

    let mut rank_sql = format!(
        "SELECT rep.problem_id AS id, SUM(h.count) AS total
         FROM {table} h
         JOIN reports rep ON rep.id = h.report_id
         JOIN problems p ON p.id = rep.problem_id",
        table = history.table(),
    );
    if !query.clauses.is_empty() {
        rank_sql.push_str(" WHERE ");
        rank_sql.push_str(&query.clauses.join(" AND "));
    }
    rank_sql.push_str(" GROUP BY rep.problem_id");

    let mut sql = format!(
        "SELECT p.id, p.first_occurrence, p.last_occurrence, r.total
         FROM ({rank_sql}) r
         JOIN problems p ON p.id = r.id"
    );
    if let Some(component_ids) = components {
        let list = query.bind_list(component_ids);
        sql.push_str(&format!(
            " WHERE EXISTS (SELECT 1 FROM problem_components pc
                            WHERE pc.problem_id = p.id AND pc.component_id IN ({list}))"
        ));
    }
    sql.push_str(" ORDER BY r.total DESC, p.id ASC");

    let params_ref: Vec<&dyn ToSql> = query.binds.iter().map(|b| b.as_ref()).collect();
    let mut stmt = conn.prepare(&sql)?;
    let ranked = stmt
        .query_map(params_ref.as_slice(), |row| {
            let count: i64 = row.get(3)?;
            Ok(RankedProblem {
                problem: Problem::from_row(row)?,
                count,
                rank: count as f64,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    tracing::debug!(%history, rows = ranked.len(), "ranked problems");

    Ok(match post_process {
        Some(process) => process(ranked),
        None => ranked,
    })
}
