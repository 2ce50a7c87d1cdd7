//! Write helpers for the occurrence store.
//!
//! Ingestion proper lives outside this crate; these helpers exist so a store
//! can be seeded and so tests can build realistic histories.

use crate::ranking::history::History;
use chrono::NaiveDate;
use rusqlite::{params, Connection};

pub fn insert_opsys(conn: &Connection, name: &str) -> rusqlite::Result<i64> {
    conn.execute("INSERT INTO opsys (name) VALUES (?1)", params![name])?;
    Ok(conn.last_insert_rowid())
}

pub fn insert_release(conn: &Connection, opsys_id: i64, version: &str) -> rusqlite::Result<i64> {
    conn.execute(
        "INSERT INTO opsys_releases (opsys_id, version) VALUES (?1, ?2)",
        params![opsys_id, version],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn insert_component(conn: &Connection, opsys_id: i64, name: &str) -> rusqlite::Result<i64> {
    conn.execute(
        "INSERT INTO components (opsys_id, name) VALUES (?1, ?2)",
        params![opsys_id, name],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn insert_problem(
    conn: &Connection,
    first_occurrence: NaiveDate,
    last_occurrence: NaiveDate,
) -> rusqlite::Result<i64> {
    conn.execute(
        "INSERT INTO problems (first_occurrence, last_occurrence) VALUES (?1, ?2)",
        params![first_occurrence, last_occurrence],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn link_component(
    conn: &Connection,
    problem_id: i64,
    component_id: i64,
    component_order: i64,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO problem_components (problem_id, component_id, component_order)
         VALUES (?1, ?2, ?3)",
        params![problem_id, component_id, component_order],
    )?;
    Ok(())
}

pub fn link_release(
    conn: &Connection,
    problem_id: i64,
    opsysrelease_id: i64,
    probable_fix: Option<&str>,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO problem_opsysreleases (problem_id, opsysrelease_id, probable_fix)
         VALUES (?1, ?2, ?3)
         ON CONFLICT (problem_id, opsysrelease_id) DO UPDATE SET probable_fix = excluded.probable_fix",
        params![problem_id, opsysrelease_id, probable_fix],
    )?;
    Ok(())
}

pub fn insert_report(
    conn: &Connection,
    problem_id: Option<i64>,
    component_id: i64,
    first_occurrence: NaiveDate,
) -> rusqlite::Result<i64> {
    conn.execute(
        "INSERT INTO reports (problem_id, component_id, first_occurrence, last_occurrence)
         VALUES (?1, ?2, ?3, ?3)",
        params![problem_id, component_id, first_occurrence],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Record `count` occurrences of a report on `date` for one release.
///
/// Upserts the daily, weekly and monthly buckets in a single transaction and
/// widens the occurrence range of the report and of its problem. A
/// non-positive count writes nothing: absent buckets already mean zero.
pub fn record_occurrence(
    conn: &mut Connection,
    report_id: i64,
    opsysrelease_id: i64,
    date: NaiveDate,
    count: i64,
) -> rusqlite::Result<()> {
    if count <= 0 {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for history in History::ALL {
        let sql = format!(
            "INSERT INTO {table} (report_id, opsysrelease_id, {column}, count)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (report_id, opsysrelease_id, {column}) DO UPDATE SET count = count + excluded.count",
            table = history.table(),
            column = history.date_column(),
        );
        tx.prepare_cached(&sql)?.execute(params![
            report_id,
            opsysrelease_id,
            history.bucket_start(date),
            count
        ])?;
    }

    tx.execute(
        "UPDATE reports SET
            count = count + ?2,
            first_occurrence = MIN(first_occurrence, ?3),
            last_occurrence = MAX(last_occurrence, ?3)
         WHERE id = ?1",
        params![report_id, count, date],
    )?;
    tx.execute(
        "UPDATE problems SET
            first_occurrence = MIN(first_occurrence, ?2),
            last_occurrence = MAX(last_occurrence, ?2)
         WHERE id = (SELECT problem_id FROM reports WHERE id = ?1)",
        params![report_id, date],
    )?;
    tx.commit()?;

    tracing::debug!(report_id, opsysrelease_id, %date, count, "recorded occurrence");
    Ok(())
}
