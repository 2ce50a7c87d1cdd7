use crate::ranking::aggregate::{query_problems, RankQuery};
use crate::ranking::history::{first_of_month, History};
use crate::types::{RankedProblem, Releases};
use chrono::{Datelike, Duration, NaiveDate};
use rusqlite::Connection;

/// First day of the month preceding `today`'s month.
///
/// A problem is eligible for long-term ranking only if it first occurred on
/// or before this date.
pub fn min_first_occurrence(today: NaiveDate) -> NaiveDate {
    first_of_month(first_of_month(today) - Duration::days(1))
}

/// Number of whole months a problem has been observed up to `min_fo`.
///
/// Counts calendar months from the month of `first_occurrence` through the
/// month of `min_fo`, both included, then drops the first month when it was
/// only partially observed (`first_occurrence` is not the 1st).
pub fn observed_months(min_fo: NaiveDate, first_occurrence: NaiveDate) -> i64 {
    let min_month = i64::from(min_fo.month());
    let first_month = i64::from(first_occurrence.month());

    let mut months = (min_month - first_month) + 1;
    if min_fo.year() != first_occurrence.year() {
        let years = i64::from(min_fo.year() - first_occurrence.year());
        months = min_month + 12 * (years - 1) + (13 - first_month);
    }

    if first_occurrence.day() != 1 {
        months -= 1;
    }

    months
}

/// Turn summed counts into occurrences per observed month and order by it.
///
/// Rows whose month count is not positive are dropped; the long-term filters
/// never produce them. Equal averages keep the aggregation order: higher
/// total count first, then lower id.
pub fn prioritize_longterm(min_fo: NaiveDate, ranked: Vec<RankedProblem>) -> Vec<RankedProblem> {
    let mut prioritized: Vec<RankedProblem> = ranked
        .into_iter()
        .filter_map(|mut ranked| {
            let months = observed_months(min_fo, ranked.problem.first_occurrence);
            if months <= 0 {
                tracing::warn!(
                    problem_id = ranked.problem.id,
                    first_occurrence = %ranked.problem.first_occurrence,
                    %min_fo,
                    months,
                    "problem has no complete month of history, skipping"
                );
                return None;
            }
            ranked.rank = ranked.count as f64 / months as f64;
            Some(ranked)
        })
        .collect();

    prioritized.sort_by(|a, b| {
        b.rank
            .total_cmp(&a.rank)
            .then_with(|| b.count.cmp(&a.count))
            .then_with(|| a.problem.id.cmp(&b.problem.id))
    });
    prioritized
}

/// Problems observed for at least one full month, ordered by average
/// occurrences per month.
pub fn longterm_problems(
    conn: &Connection,
    releases: &Releases,
    components: Option<&[i64]>,
    history: &str,
    today: NaiveDate,
) -> rusqlite::Result<Vec<RankedProblem>> {
    let min_fo = min_first_occurrence(today);
    let history = History::from_token(history);

    let eligible = move |query: &mut RankQuery| {
        let bucket_date = query.bucket_date();
        // at least one whole month old
        query.filter_value("p.first_occurrence", "<=", min_fo);
        // skip buckets before the first occurrence
        query.filter(format!("p.first_occurrence <= {bucket_date}"));
        // still active since min_fo
        query.filter_value("p.last_occurrence", ">=", min_fo);
    };
    let prioritize = move |ranked: Vec<RankedProblem>| prioritize_longterm(min_fo, ranked);

    let ranked = query_problems(
        conn,
        history,
        releases,
        components,
        Some(&eligible),
        Some(&prioritize),
    )?;
    tracing::debug!(%history, %min_fo, problems = ranked.len(), "long-term ranking");
    Ok(ranked)
}
