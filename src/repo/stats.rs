use rusqlite::Connection;
use serde::Serialize;

use crate::auth::Session;
use crate::error::RepoResult;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemStats {
    pub students: i64,
    pub teachers: i64,
    pub subjects: i64,
    pub classes: i64,
    pub results: i64,
    pub attendance: i64,
}

fn count(conn: &Connection, table: &str) -> RepoResult<i64> {
    let sql = format!("SELECT COUNT(*) FROM {}", table);
    Ok(conn.query_row(&sql, [], |r| r.get(0))?)
}

pub fn system(conn: &Connection, session: &Session) -> RepoResult<SystemStats> {
    session.require_admin()?;
    Ok(SystemStats {
        students: count(conn, "students")?,
        teachers: count(conn, "teachers")?,
        subjects: count(conn, "subjects")?,
        classes: count(conn, "classes")?,
        results: count(conn, "results")?,
        attendance: count(conn, "attendance")?,
    })
}
