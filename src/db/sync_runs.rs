use crate::errors::ServerError;
use rusqlite::{params, Connection};
use serde::Serialize;

/// One row of the sync/cleanup audit log.
#[derive(Debug, Serialize)]
pub struct SyncRun {
    pub id: i64,
    pub kind: String,
    pub started_at: i64,
    pub finished_at: Option<i64>,
    pub count: Option<i64>,
    pub error_count: Option<i64>,
    pub success: bool,
    pub message: Option<String>,
}

pub fn start_sync_run(conn: &Connection, kind: &str, now: i64) -> Result<i64, ServerError> {
    conn.execute(
        "INSERT INTO sync_runs (kind, started_at, success) VALUES (?, ?, 0)",
        params![kind, now],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn end_sync_run(
    conn: &Connection,
    run_id: i64,
    now: i64,
    count: usize,
    error_count: usize,
    success: bool,
    message: &str,
) -> Result<(), ServerError> {
    conn.execute(
        "UPDATE sync_runs SET finished_at = ?, count = ?, error_count = ?, success = ?, message = ? WHERE id = ?",
        params![now, count as i64, error_count as i64, success, message, run_id],
    )?;
    Ok(())
}

pub fn get_recent_sync_runs(conn: &Connection) -> Result<Vec<SyncRun>, ServerError> {
    let mut stmt = conn.prepare(
        "SELECT id, kind, started_at, finished_at, count, error_count, success, message \
         FROM sync_runs ORDER BY started_at DESC, id DESC LIMIT 50",
    )?;

    let rows = stmt.query_map([], |row| {
        Ok(SyncRun {
            id: row.get(0)?,
            kind: row.get(1)?,
            started_at: row.get(2)?,
            finished_at: row.get(3)?,
            count: row.get(4)?,
            error_count: row.get(5)?,
            success: row.get(6)?,
            message: row.get(7)?,
        })
    })?;

    let mut runs = Vec::new();
    for r in rows {
        runs.push(r?);
    }
    Ok(runs)
}
