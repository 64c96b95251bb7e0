use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::{info, instrument};

use super::{exists, in_scope, optional, scope, validate_date, Target};
use crate::auth::{Role, Session};
use crate::error::{RepoError, RepoResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AttendanceStatus {
    Present,
    Absent,
    Late,
}

impl AttendanceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AttendanceStatus::Present => "Present",
            AttendanceStatus::Absent => "Absent",
            AttendanceStatus::Late => "Late",
        }
    }
}

impl FromStr for AttendanceStatus {
    type Err = RepoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "present" => Ok(AttendanceStatus::Present),
            "absent" => Ok(AttendanceStatus::Absent),
            "late" => Ok(AttendanceStatus::Late),
            _ => Err(RepoError::validation(
                "status must be one of Present, Absent, Late",
            )),
        }
    }
}

/// One status applied to several students for a date and subject.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkRequest {
    #[serde(default)]
    pub date: String,
    pub subject_id: Option<i64>,
    #[serde(default)]
    pub status: String,
    pub remarks: Option<String>,
    #[serde(default)]
    pub student_ids: Vec<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceFilter {
    pub student_id: Option<i64>,
    pub date: Option<String>,
    pub subject_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRow {
    pub id: i64,
    pub student_id: i64,
    pub student_name: Option<String>,
    pub date: String,
    pub subject_id: Option<i64>,
    pub subject_name: Option<String>,
    pub status: String,
    pub remarks: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceSummary {
    pub total: i64,
    pub present: i64,
    pub absent: i64,
    pub late: i64,
    /// Percentage of present marks; 0 when nothing is recorded.
    pub attendance_rate: f64,
}

/// Outcome of a mark request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkOutcome {
    pub inserted: usize,
    pub updated: usize,
}

/// Writes `status` for one (student, date, subject) key, overwriting any
/// existing row. Must run inside a transaction.
fn upsert_one(
    tx: &Connection,
    student_id: i64,
    date: &str,
    subject_id: Option<i64>,
    status: AttendanceStatus,
    remarks: Option<&str>,
) -> RepoResult<bool> {
    let changed = tx.execute(
        "UPDATE attendance SET status = ?, remarks = ?
         WHERE student_id = ? AND date = ? AND subject_id IS ?",
        (status.as_str(), remarks, student_id, date, subject_id),
    )?;
    if changed > 0 {
        return Ok(false);
    }
    tx.execute(
        "INSERT INTO attendance(student_id, date, status, subject_id, remarks)
         VALUES(?, ?, ?, ?, ?)",
        (student_id, date, status.as_str(), subject_id, remarks),
    )?;
    Ok(true)
}

/// Marks attendance for every listed student in one transaction. Teachers
/// must name one of their subjects and may only mark students they can see.
#[instrument(skip(conn, session, req), fields(role = session.role.as_str(), date = %req.date, count = req.student_ids.len()))]
pub fn mark(conn: &Connection, session: &Session, req: &MarkRequest) -> RepoResult<MarkOutcome> {
    session.require_rotated()?;
    if session.role == Role::Student {
        return Err(RepoError::Forbidden);
    }
    let date = validate_date("date", &req.date)?;
    let status: AttendanceStatus = req.status.parse()?;
    let remarks = optional(req.remarks.as_deref());
    if req.student_ids.is_empty() {
        return Err(RepoError::validation("select at least one student"));
    }

    let tx = conn.unchecked_transaction()?;
    match (session.role, req.subject_id) {
        (Role::Teacher, None) => {
            return Err(RepoError::validation("subject is required"));
        }
        (Role::Teacher, Some(sid)) => {
            if !in_scope(&tx, session, Target::Subjects, sid)? {
                return Err(RepoError::Forbidden);
            }
        }
        (_, Some(sid)) => {
            if !exists(&tx, "SELECT 1 FROM subjects WHERE id = ?", [sid])? {
                return Err(RepoError::NotFound("subject"));
            }
        }
        (_, None) => {}
    }

    let mut outcome = MarkOutcome::default();
    for &student_id in &req.student_ids {
        if !in_scope(&tx, session, Target::Students, student_id)? {
            return Err(if session.is_admin() {
                RepoError::NotFound("student")
            } else {
                RepoError::Forbidden
            });
        }
        if upsert_one(&tx, student_id, &date, req.subject_id, status, remarks.as_deref())? {
            outcome.inserted += 1;
        } else {
            outcome.updated += 1;
        }
    }
    tx.commit()?;
    info!(inserted = outcome.inserted, updated = outcome.updated, "attendance marked");
    Ok(outcome)
}

fn scoped_filter(session: &Session, filter: &AttendanceFilter) -> RepoResult<super::Scope> {
    let mut sc = scope(session, Target::Attendance, "a")?;
    if let Some(st) = filter.student_id {
        sc.and("a.student_id = ?", Value::Integer(st));
    }
    if let Some(d) = optional(filter.date.as_deref()) {
        sc.and("a.date = ?", Value::Text(validate_date("date", &d)?));
    }
    if let Some(sid) = filter.subject_id {
        sc.and("a.subject_id = ?", Value::Integer(sid));
    }
    Ok(sc)
}

pub fn list(conn: &Connection, session: &Session, filter: &AttendanceFilter) -> RepoResult<Vec<AttendanceRow>> {
    let sc = scoped_filter(session, filter)?;
    let sql = format!(
        "SELECT a.id, a.student_id, stu.name, a.date, a.subject_id, sub.subject_name,
                a.status, a.remarks
         FROM attendance a
         LEFT JOIN students stu ON stu.id = a.student_id
         LEFT JOIN subjects sub ON sub.id = a.subject_id
         WHERE {}
         ORDER BY a.date DESC, stu.name, a.id",
        sc.clause
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(sc.params(), |r| {
            Ok(AttendanceRow {
                id: r.get(0)?,
                student_id: r.get(1)?,
                student_name: r.get(2)?,
                date: r.get(3)?,
                subject_id: r.get(4)?,
                subject_name: r.get(5)?,
                status: r.get(6)?,
                remarks: r.get(7)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn summary(conn: &Connection, session: &Session, filter: &AttendanceFilter) -> RepoResult<AttendanceSummary> {
    let sc = scoped_filter(session, filter)?;
    let sql = format!(
        "SELECT COUNT(*),
                SUM(CASE WHEN a.status = 'Present' THEN 1 ELSE 0 END),
                SUM(CASE WHEN a.status = 'Absent' THEN 1 ELSE 0 END),
                SUM(CASE WHEN a.status = 'Late' THEN 1 ELSE 0 END)
         FROM attendance a
         WHERE {}",
        sc.clause
    );
    let (total, present, absent, late) = conn
        .query_row(&sql, sc.params(), |r| {
            Ok((
                r.get::<_, i64>(0)?,
                r.get::<_, Option<i64>>(1)?.unwrap_or(0),
                r.get::<_, Option<i64>>(2)?.unwrap_or(0),
                r.get::<_, Option<i64>>(3)?.unwrap_or(0),
            ))
        })
        .optional()?
        .unwrap_or((0, 0, 0, 0));
    let attendance_rate = if total > 0 {
        present as f64 / total as f64 * 100.0
    } else {
        0.0
    };
    Ok(AttendanceSummary {
        total,
        present,
        absent,
        late,
        attendance_rate,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parses_any_case() {
        assert_eq!("present".parse::<AttendanceStatus>().expect("status"), AttendanceStatus::Present);
        assert_eq!(" LATE ".parse::<AttendanceStatus>().expect("status"), AttendanceStatus::Late);
        assert!("excused".parse::<AttendanceStatus>().is_err());
    }
}
