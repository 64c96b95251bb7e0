use rusqlite::{Connection, Row};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use super::{class_ref, exists, required, scope, Target};
use crate::auth::Session;
use crate::error::{RepoError, RepoResult};

pub const DEFAULT_CREDITS: i64 = 3;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub id: i64,
    pub subject_code: String,
    pub subject_name: String,
    pub teacher_id: Option<i64>,
    pub teacher_name: Option<String>,
    pub class_name: Option<String>,
    pub credits: Option<i64>,
}

fn subject_from_row(r: &Row<'_>) -> rusqlite::Result<Subject> {
    Ok(Subject {
        id: r.get(0)?,
        subject_code: r.get(1)?,
        subject_name: r.get(2)?,
        teacher_id: r.get(3)?,
        teacher_name: r.get(4)?,
        class_name: r.get(5)?,
        credits: r.get(6)?,
    })
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectInput {
    #[serde(default)]
    pub subject_code: String,
    #[serde(default)]
    pub subject_name: String,
    pub teacher_id: Option<i64>,
    pub class_name: Option<String>,
    pub credits: Option<i64>,
}

struct CleanSubject {
    code: String,
    name: String,
    teacher_id: Option<i64>,
    class_name: Option<String>,
    credits: i64,
}

fn clean(conn: &Connection, input: &SubjectInput) -> RepoResult<CleanSubject> {
    let code = required("subject code", &input.subject_code)?;
    let name = required("subject name", &input.subject_name)?;
    if let Some(tid) = input.teacher_id {
        if !exists(conn, "SELECT 1 FROM teachers WHERE id = ?", [tid])? {
            return Err(RepoError::validation("invalid teacher selection"));
        }
    }
    let credits = input.credits.unwrap_or(DEFAULT_CREDITS);
    if credits < 0 {
        return Err(RepoError::validation("credits must not be negative"));
    }
    Ok(CleanSubject {
        code,
        name,
        teacher_id: input.teacher_id,
        class_name: class_ref(conn, input.class_name.as_deref())?,
        credits,
    })
}

/// Admin sees every subject, a teacher only the subjects assigned to it.
pub fn list(conn: &Connection, session: &Session) -> RepoResult<Vec<Subject>> {
    let sc = scope(session, Target::Subjects, "sub")?;
    let sql = format!(
        "SELECT sub.id, sub.subject_code, sub.subject_name, sub.teacher_id, t.name,
                sub.class_name, sub.credits
         FROM subjects sub
         LEFT JOIN teachers t ON t.id = sub.teacher_id
         WHERE {}
         ORDER BY sub.subject_code",
        sc.clause
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(sc.params(), subject_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[instrument(skip(conn, session, input), fields(code = %input.subject_code))]
pub fn create(conn: &Connection, session: &Session, input: &SubjectInput) -> RepoResult<i64> {
    session.require_admin()?;
    let s = clean(conn, input)?;
    if exists(
        conn,
        "SELECT 1 FROM subjects WHERE subject_code = ?",
        [&s.code],
    )? {
        return Err(RepoError::conflict("subject code already exists"));
    }
    conn.execute(
        "INSERT INTO subjects(subject_code, subject_name, teacher_id, class_name, credits)
         VALUES(?, ?, ?, ?, ?)",
        (&s.code, &s.name, s.teacher_id, &s.class_name, s.credits),
    )?;
    let id = conn.last_insert_rowid();
    info!(id, "subject created");
    Ok(id)
}

#[instrument(skip(conn, session, input))]
pub fn update(
    conn: &Connection,
    session: &Session,
    id: i64,
    input: &SubjectInput,
) -> RepoResult<()> {
    session.require_admin()?;
    if !exists(conn, "SELECT 1 FROM subjects WHERE id = ?", [id])? {
        return Err(RepoError::NotFound("subject"));
    }
    let s = clean(conn, input)?;
    if exists(
        conn,
        "SELECT 1 FROM subjects WHERE subject_code = ? AND id != ?",
        (&s.code, id),
    )? {
        return Err(RepoError::conflict("subject code already exists"));
    }
    conn.execute(
        "UPDATE subjects
         SET subject_code = ?, subject_name = ?, teacher_id = ?, class_name = ?, credits = ?
         WHERE id = ?",
        (&s.code, &s.name, s.teacher_id, &s.class_name, s.credits, id),
    )?;
    info!("subject updated");
    Ok(())
}

/// Removes the subject with the results and attendance recorded for it.
#[instrument(skip(conn, session))]
pub fn delete(conn: &Connection, session: &Session, id: i64) -> RepoResult<()> {
    session.require_admin()?;
    if !exists(conn, "SELECT 1 FROM subjects WHERE id = ?", [id])? {
        return Err(RepoError::NotFound("subject"));
    }
    let tx = conn.unchecked_transaction()?;
    let results = tx.execute("DELETE FROM results WHERE subject_id = ?", [id])?;
    let attendance = tx.execute("DELETE FROM attendance WHERE subject_id = ?", [id])?;
    tx.execute("DELETE FROM subjects WHERE id = ?", [id])?;
    tx.commit()?;
    info!(results, attendance, "subject deleted");
    Ok(())
}
