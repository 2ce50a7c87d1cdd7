use crate::ranking::aggregate::{query_problems, RankQuery};
use crate::ranking::history::History;
use crate::types::{RankedProblem, Releases};
use chrono::{Duration, NaiveDate};
use rusqlite::Connection;

/// Trailing window used when no cutoff date is given.
pub const DEFAULT_HOT_WINDOW_DAYS: i64 = 14;

/// Problems with activity since `last_date`, most active first.
///
/// `last_date` defaults to [`DEFAULT_HOT_WINDOW_DAYS`] before `today`.
/// Problems without occurrences in the window are absent from the result.
pub fn hot_problems(
    conn: &Connection,
    releases: &Releases,
    components: Option<&[i64]>,
    last_date: Option<NaiveDate>,
    history: &str,
    today: NaiveDate,
) -> rusqlite::Result<Vec<RankedProblem>> {
    let last_date = last_date.unwrap_or(today - Duration::days(DEFAULT_HOT_WINDOW_DAYS));
    let history = History::from_token(history);

    let since = move |query: &mut RankQuery| {
        let column = query.bucket_date();
        query.filter_value(&column, ">=", last_date);
    };

    let ranked = query_problems(conn, history, releases, components, Some(&since), None)?;
    tracing::debug!(%history, %last_date, problems = ranked.len(), "hot ranking");
    Ok(ranked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::testutil::{date, Fixture};

    fn today() -> NaiveDate {
        date(2023, 4, 15)
    }

    #[test]
    fn test_default_window_is_fourteen_days() {
        let mut fx = Fixture::new();
        let (inside, r1) = fx.problem(date(2023, 3, 1), date(2023, 4, 1));
        let (_, r2) = fx.problem(date(2023, 3, 1), date(2023, 3, 31));
        fx.record(r1, fx.release, date(2023, 4, 1), 3);
        fx.record(r2, fx.release, date(2023, 3, 31), 50);

        let ranked = hot_problems(&fx.conn, &Releases::All, None, None, "daily", today()).unwrap();

        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].problem.id, inside);
        assert_eq!(ranked[0].count, 3);
    }

    #[test]
    fn test_sorted_descending_with_id_tiebreak_and_no_zero_counts() {
        let mut fx = Fixture::new();
        let (a, ra) = fx.problem(date(2023, 4, 10), date(2023, 4, 12));
        let (b, rb) = fx.problem(date(2023, 4, 10), date(2023, 4, 12));
        let (c, rc) = fx.problem(date(2023, 4, 10), date(2023, 4, 12));
        let (_quiet, _) = fx.problem(date(2023, 4, 10), date(2023, 4, 10));
        fx.record(ra, fx.release, date(2023, 4, 10), 4);
        fx.record(rb, fx.release, date(2023, 4, 11), 7);
        fx.record(rc, fx.release, date(2023, 4, 12), 4);

        let ranked = hot_problems(&fx.conn, &Releases::All, None, None, "d", today()).unwrap();

        let order: Vec<i64> = ranked.iter().map(|r| r.problem.id).collect();
        assert_eq!(order, vec![b, a, c]);
        assert!(ranked.iter().all(|r| r.count > 0));
        for pair in ranked.windows(2) {
            assert!(
                pair[0].count > pair[1].count
                    || (pair[0].count == pair[1].count && pair[0].problem.id < pair[1].problem.id)
            );
        }
    }

    #[test]
    fn test_explicit_cutoff_and_weekly_buckets() {
        let mut fx = Fixture::new();
        let (p, r) = fx.problem(date(2023, 1, 2), date(2023, 4, 12));
        fx.record(r, fx.release, date(2023, 1, 4), 10);
        fx.record(r, fx.release, date(2023, 4, 12), 1);

        let ranked = hot_problems(
            &fx.conn,
            &Releases::All,
            None,
            Some(date(2023, 1, 1)),
            "weekly",
            today(),
        )
        .unwrap();
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].problem.id, p);
        assert_eq!(ranked[0].count, 11);
    }

    #[test]
    fn test_cutoff_in_the_future_yields_empty() {
        let mut fx = Fixture::new();
        let (_, r) = fx.problem(date(2023, 4, 10), date(2023, 4, 10));
        fx.record(r, fx.release, date(2023, 4, 10), 2);

        let ranked = hot_problems(
            &fx.conn,
            &Releases::All,
            None,
            Some(date(2023, 5, 1)),
            "daily",
            today(),
        )
        .unwrap();
        assert!(ranked.is_empty());
    }

    #[test]
    fn test_empty_release_set_returns_nothing() {
        let mut fx = Fixture::new();
        let (_, r) = fx.problem(date(2023, 4, 10), date(2023, 4, 10));
        fx.record(r, fx.release, date(2023, 4, 10), 2);

        let ranked = hot_problems(
            &fx.conn,
            &Releases::Only(Vec::new()),
            None,
            None,
            "daily",
            today(),
        )
        .unwrap();
        assert!(ranked.is_empty());
    }

    #[test]
    fn test_release_and_component_scoping() {
        let mut fx = Fixture::new();
        let (p1, r1) = fx.problem(date(2023, 4, 10), date(2023, 4, 10));
        let (_, r2) = fx.problem(date(2023, 4, 10), date(2023, 4, 10));
        fx.record(r1, fx.release, date(2023, 4, 10), 2);
        fx.record(r2, fx.other_release, date(2023, 4, 10), 8);

        let ranked = hot_problems(
            &fx.conn,
            &Releases::Only(vec![fx.release]),
            None,
            None,
            "daily",
            today(),
        )
        .unwrap();
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].problem.id, p1);

        let unrelated = [fx.other_component];
        let ranked = hot_problems(
            &fx.conn,
            &Releases::All,
            Some(&unrelated),
            None,
            "daily",
            today(),
        )
        .unwrap();
        assert!(ranked.is_empty());
    }
}
