//! Read-only lookups against the occurrence store.
//!
//! Single-row lookups by key return `Option`; a missing row is never an
//! error. Store failures are returned unchanged.

use crate::ranking::aggregate::{query_problems, RankQuery};
use crate::ranking::history::History;
use crate::types::{ComponentCount, Problem, ProblemComponent, ProblemOpSysRelease, Releases};
use rusqlite::types::ToSql;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::{HashMap, HashSet};

fn placeholders(start: usize, count: usize) -> String {
    (start..start + count)
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Summed bucket counts per problem, optionally for a subset of problems.
///
/// Uses the same aggregation as the rankings, so a problem's value here
/// equals its `count` in an unfiltered ranking over `releases`.
pub fn sum_counts(
    conn: &Connection,
    problem_ids: Option<&[i64]>,
    releases: &Releases,
    history: History,
) -> rusqlite::Result<HashMap<i64, i64>> {
    if problem_ids.is_some_and(|ids| ids.is_empty()) {
        return Ok(HashMap::new());
    }

    let only = |query: &mut RankQuery| {
        if let Some(ids) = problem_ids {
            query.filter_in("rep.problem_id", ids);
        }
    };
    let ranked = query_problems(conn, history, releases, None, Some(&only), None)?;
    Ok(ranked
        .into_iter()
        .map(|ranked| (ranked.problem.id, ranked.count))
        .collect())
}

/// Every problem, ordered by id.
pub fn get_problems(conn: &Connection) -> rusqlite::Result<Vec<Problem>> {
    let mut stmt = conn.prepare(
        "SELECT id, first_occurrence, last_occurrence FROM problems ORDER BY id",
    )?;
    let rows = stmt.query_map([], Problem::from_row)?;
    rows.collect()
}

pub fn get_problem_by_id(conn: &Connection, id: i64) -> rusqlite::Result<Option<Problem>> {
    conn.query_row(
        "SELECT id, first_occurrence, last_occurrence FROM problems WHERE id = ?1",
        params![id],
        Problem::from_row,
    )
    .optional()
}

const EMPTY_PROBLEMS_SQL: &str = "SELECT p.id, p.first_occurrence, p.last_occurrence
     FROM problems p
     WHERE p.id > ?1
       AND NOT EXISTS (SELECT 1 FROM reports r WHERE r.problem_id = p.id)
     ORDER BY p.id
     LIMIT ?2";

/// Problems that no longer have any reports.
pub fn get_empty_problems(conn: &Connection) -> rusqlite::Result<Vec<Problem>> {
    let mut stmt = conn.prepare(EMPTY_PROBLEMS_SQL)?;
    let rows = stmt.query_map(params![i64::MIN, -1], Problem::from_row)?;
    rows.collect()
}

/// Visit problems without reports in id order, `batch_size` rows at a time.
///
/// Pages by id, so at most one batch is held in memory. Returns the number
/// of problems visited. An error from `f` stops the scan.
pub fn for_each_empty_problem_batch<F>(
    conn: &Connection,
    batch_size: usize,
    mut f: F,
) -> rusqlite::Result<usize>
where
    F: FnMut(Vec<Problem>) -> rusqlite::Result<()>,
{
    let batch_size = batch_size.max(1);
    let mut stmt = conn.prepare(EMPTY_PROBLEMS_SQL)?;
    let mut after = i64::MIN;
    let mut visited = 0;

    loop {
        let batch = stmt
            .query_map(params![after, batch_size as i64], Problem::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        let Some(last) = batch.last() else {
            break;
        };
        after = last.id;
        visited += batch.len();
        let done = batch.len() < batch_size;
        f(batch)?;
        if done {
            break;
        }
    }

    tracing::debug!(visited, batch_size, "scanned empty problems");
    Ok(visited)
}

/// Ids of problems associated with at least one of `component_ids`.
///
/// Standalone lookup; rankings apply the same association as a semi-join
/// inside [`query_problems`].
pub fn problems_for_components(
    conn: &Connection,
    component_ids: &[i64],
) -> rusqlite::Result<HashSet<i64>> {
    if component_ids.is_empty() {
        return Ok(HashSet::new());
    }
    let sql = format!(
        "SELECT DISTINCT problem_id FROM problem_components WHERE component_id IN ({})",
        placeholders(1, component_ids.len())
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(rusqlite::params_from_iter(component_ids), |row| row.get(0))?;
    rows.collect()
}

pub fn get_problem_component(
    conn: &Connection,
    problem_id: i64,
    component_id: i64,
) -> rusqlite::Result<Option<ProblemComponent>> {
    conn.query_row(
        "SELECT problem_id, component_id, component_order
         FROM problem_components WHERE problem_id = ?1 AND component_id = ?2",
        params![problem_id, component_id],
        |row| {
            Ok(ProblemComponent {
                problem_id: row.get(0)?,
                component_id: row.get(1)?,
                component_order: row.get(2)?,
            })
        },
    )
    .optional()
}

pub fn get_problem_opsysrelease(
    conn: &Connection,
    problem_id: i64,
    opsysrelease_id: i64,
) -> rusqlite::Result<Option<ProblemOpSysRelease>> {
    conn.query_row(
        "SELECT problem_id, opsysrelease_id, probable_fix
         FROM problem_opsysreleases WHERE problem_id = ?1 AND opsysrelease_id = ?2",
        params![problem_id, opsysrelease_id],
        |row| {
            Ok(ProblemOpSysRelease {
                problem_id: row.get(0)?,
                opsysrelease_id: row.get(1)?,
                probable_fix: row.get(2)?,
            })
        },
    )
    .optional()
}

/// Release ids, optionally narrowed to an OS name and/or version.
///
/// An empty name or version does not filter.
pub fn get_release_ids(
    conn: &Connection,
    opsys_name: Option<&str>,
    opsys_version: Option<&str>,
) -> rusqlite::Result<Vec<i64>> {
    let opsys_name = opsys_name.filter(|s| !s.is_empty());
    let opsys_version = opsys_version.filter(|s| !s.is_empty());
    let mut stmt = conn.prepare(
        "SELECT r.id
         FROM opsys_releases r
         JOIN opsys o ON o.id = r.opsys_id
         WHERE (?1 IS NULL OR o.name = ?1)
           AND (?2 IS NULL OR r.version = ?2)
         ORDER BY r.id",
    )?;
    let rows = stmt.query_map(params![opsys_name, opsys_version], |row| row.get(0))?;
    rows.collect()
}

/// Scope for OS-filtered totals: when the OS filter matches no release, the
/// totals fall back to all releases.
fn opsys_scope(
    conn: &Connection,
    opsys_name: Option<&str>,
    opsys_version: Option<&str>,
) -> rusqlite::Result<Releases> {
    let ids = get_release_ids(conn, opsys_name, opsys_version)?;
    Ok(if ids.is_empty() {
        Releases::All
    } else {
        Releases::Only(ids)
    })
}

fn release_clause(releases: &Releases, bind_values: &mut Vec<Box<dyn ToSql>>) -> String {
    match releases {
        Releases::All => String::new(),
        Releases::Only(ids) => {
            let clause = format!(
                " WHERE h.opsysrelease_id IN ({})",
                placeholders(bind_values.len() + 1, ids.len())
            );
            bind_values.extend(ids.iter().map(|id| Box::new(*id) as Box<dyn ToSql>));
            clause
        }
    }
}

/// Total of all bucket counts at `history` granularity for an OS selection.
pub fn get_history_sum(
    conn: &Connection,
    opsys_name: Option<&str>,
    opsys_version: Option<&str>,
    history: History,
) -> rusqlite::Result<i64> {
    let releases = opsys_scope(conn, opsys_name, opsys_version)?;
    let mut bind_values: Vec<Box<dyn ToSql>> = Vec::new();
    let sql = format!(
        "SELECT COALESCE(SUM(h.count), 0) FROM {table} h{clause}",
        table = history.table(),
        clause = release_clause(&releases, &mut bind_values),
    );
    let params_ref: Vec<&dyn ToSql> = bind_values.iter().map(|b| b.as_ref()).collect();
    conn.query_row(&sql, params_ref.as_slice(), |row| row.get(0))
}

/// Summed occurrences per component for an OS selection, busiest first.
pub fn get_report_count_by_component(
    conn: &Connection,
    opsys_name: Option<&str>,
    opsys_version: Option<&str>,
    history: History,
) -> rusqlite::Result<Vec<ComponentCount>> {
    let releases = opsys_scope(conn, opsys_name, opsys_version)?;
    let mut bind_values: Vec<Box<dyn ToSql>> = Vec::new();
    let sql = format!(
        "SELECT c.id, c.name, SUM(h.count) AS cnt
         FROM {table} h
         JOIN reports rep ON rep.id = h.report_id
         JOIN components c ON c.id = rep.component_id{clause}
         GROUP BY c.id, c.name
         ORDER BY cnt DESC, c.id ASC",
        table = history.table(),
        clause = release_clause(&releases, &mut bind_values),
    );
    let params_ref: Vec<&dyn ToSql> = bind_values.iter().map(|b| b.as_ref()).collect();
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_ref.as_slice(), |row| {
        Ok(ComponentCount {
            component_id: row.get(0)?,
            name: row.get(1)?,
            count: row.get(2)?,
        })
    })?;
    rows.collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::testutil::{date, Fixture};
    use crate::storage::writer;

    #[test]
    fn test_get_problem_by_id_absent_is_none() {
        let mut fx = Fixture::new();
        let (p, _) = fx.problem(date(2023, 1, 1), date(2023, 2, 1));

        let found = get_problem_by_id(&fx.conn, p).unwrap().unwrap();
        assert_eq!(found.first_occurrence, date(2023, 1, 1));
        assert_eq!(found.last_occurrence, date(2023, 2, 1));
        assert!(get_problem_by_id(&fx.conn, p + 100).unwrap().is_none());
    }

    #[test]
    fn test_sum_counts_scoping() {
        let mut fx = Fixture::new();
        let (p1, r1) = fx.problem(date(2023, 1, 1), date(2023, 1, 1));
        let (p2, r2) = fx.problem(date(2023, 1, 1), date(2023, 1, 1));
        fx.record(r1, fx.release, date(2023, 1, 1), 2);
        fx.record(r1, fx.other_release, date(2023, 1, 2), 3);
        fx.record(r2, fx.release, date(2023, 1, 1), 7);

        let all = sum_counts(&fx.conn, None, &Releases::All, History::Monthly).unwrap();
        assert_eq!(all.get(&p1), Some(&5));
        assert_eq!(all.get(&p2), Some(&7));

        let scoped = sum_counts(
            &fx.conn,
            Some(&[p1]),
            &Releases::Only(vec![fx.other_release]),
            History::Daily,
        )
        .unwrap();
        assert_eq!(scoped.len(), 1);
        assert_eq!(scoped.get(&p1), Some(&3));

        let none = sum_counts(&fx.conn, None, &Releases::Only(Vec::new()), History::Daily)
            .unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn test_sum_counts_agrees_with_ranking() {
        let mut fx = Fixture::new();
        let (_, r1) = fx.problem(date(2023, 1, 1), date(2023, 1, 1));
        let (_, r2) = fx.problem(date(2023, 1, 1), date(2023, 1, 1));
        fx.record(r1, fx.release, date(2023, 1, 4), 6);
        fx.record(r2, fx.release, date(2023, 1, 5), 1);
        fx.record(r2, fx.other_release, date(2023, 2, 5), 8);

        let releases = Releases::Only(vec![fx.release]);
        let sums = sum_counts(&fx.conn, None, &releases, History::Weekly).unwrap();
        let ranked =
            query_problems(&fx.conn, History::Weekly, &releases, None, None, None).unwrap();

        assert_eq!(sums.len(), ranked.len());
        for row in ranked {
            assert_eq!(sums.get(&row.problem.id), Some(&row.count));
        }
    }

    #[test]
    fn test_empty_problems_batched_matches_unbatched() {
        let mut fx = Fixture::new();
        let mut empty = Vec::new();
        for _ in 0..5 {
            empty.push(writer::insert_problem(&fx.conn, date(2023, 1, 1), date(2023, 1, 1)).unwrap());
            fx.problem(date(2023, 1, 1), date(2023, 1, 1));
        }

        let all: Vec<i64> = get_empty_problems(&fx.conn)
            .unwrap()
            .into_iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(all, empty);
        assert_eq!(get_problems(&fx.conn).unwrap().len(), 10);

        let mut batches = Vec::new();
        let visited = for_each_empty_problem_batch(&fx.conn, 2, |batch| {
            batches.push(batch.into_iter().map(|p| p.id).collect::<Vec<_>>());
            Ok(())
        })
        .unwrap();
        assert_eq!(visited, 5);
        assert_eq!(batches.len(), 3);
        assert_eq!(batches.concat(), empty);
    }

    #[test]
    fn test_component_and_release_associations() {
        let mut fx = Fixture::new();
        let (p, _) = fx.problem(date(2023, 1, 1), date(2023, 1, 1));
        writer::link_release(&fx.conn, p, fx.release, Some("kernel-6.2.9")).unwrap();

        let link = get_problem_component(&fx.conn, p, fx.component).unwrap().unwrap();
        assert_eq!(link.component_order, 0);
        assert!(get_problem_component(&fx.conn, p, fx.other_component)
            .unwrap()
            .is_none());

        let release = get_problem_opsysrelease(&fx.conn, p, fx.release).unwrap().unwrap();
        assert_eq!(release.probable_fix.as_deref(), Some("kernel-6.2.9"));
        assert!(get_problem_opsysrelease(&fx.conn, p, fx.other_release)
            .unwrap()
            .is_none());

        let problems = problems_for_components(&fx.conn, &[fx.component, fx.other_component])
            .unwrap();
        assert_eq!(problems, HashSet::from([p]));
        assert!(problems_for_components(&fx.conn, &[]).unwrap().is_empty());
    }

    #[test]
    fn test_release_ids_and_history_sum() {
        let mut fx = Fixture::new();
        let other_os = writer::insert_opsys(&fx.conn, "CentOS").unwrap();
        let centos = writer::insert_release(&fx.conn, other_os, "9").unwrap();
        let (_, r) = fx.problem(date(2023, 1, 1), date(2023, 1, 1));
        fx.record(r, fx.release, date(2023, 1, 1), 4);
        fx.record(r, centos, date(2023, 1, 1), 6);

        assert_eq!(
            get_release_ids(&fx.conn, Some("Fedora"), None).unwrap(),
            vec![fx.release, fx.other_release]
        );
        assert_eq!(
            get_release_ids(&fx.conn, Some("Fedora"), Some("39")).unwrap(),
            vec![fx.other_release]
        );
        assert_eq!(get_release_ids(&fx.conn, None, None).unwrap().len(), 3);
        assert_eq!(
            get_release_ids(&fx.conn, Some(""), Some("")).unwrap().len(),
            3
        );
        assert_eq!(
            get_release_ids(&fx.conn, Some(""), Some("9")).unwrap(),
            vec![centos]
        );

        assert_eq!(
            get_history_sum(&fx.conn, Some("Fedora"), None, History::Daily).unwrap(),
            4
        );
        // unknown OS matches no release and falls back to every release
        assert_eq!(
            get_history_sum(&fx.conn, Some("Plan9"), None, History::Weekly).unwrap(),
            10
        );
    }

    #[test]
    fn test_report_count_by_component() {
        let mut fx = Fixture::new();
        let (p, r1) = fx.problem(date(2023, 1, 1), date(2023, 1, 1));
        let r2 = writer::insert_report(&fx.conn, Some(p), fx.other_component, date(2023, 1, 1))
            .unwrap();
        fx.record(r1, fx.release, date(2023, 1, 1), 2);
        fx.record(r2, fx.release, date(2023, 1, 1), 5);

        let counts =
            get_report_count_by_component(&fx.conn, None, None, History::Monthly).unwrap();
        assert_eq!(counts.len(), 2);
        assert_eq!(counts[0].name, "glibc");
        assert_eq!(counts[0].count, 5);
        assert_eq!(counts[1].name, "kernel");
    }
}
