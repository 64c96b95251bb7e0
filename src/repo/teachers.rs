use rusqlite::{Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use super::{exists, optional, required};
use crate::auth::{self, Session};
use crate::config::HashScheme;
use crate::error::{RepoError, RepoResult};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Teacher {
    pub id: i64,
    pub teacher_id: String,
    pub name: String,
    pub email: Option<String>,
    pub subject: Option<String>,
    pub qualification: Option<String>,
    pub phone: Option<String>,
    pub created_at: Option<String>,
}

const TEACHER_COLUMNS: &str =
    "id, teacher_id, name, email, subject, qualification, phone, created_at";

fn teacher_from_row(r: &Row<'_>) -> rusqlite::Result<Teacher> {
    Ok(Teacher {
        id: r.get(0)?,
        teacher_id: r.get(1)?,
        name: r.get(2)?,
        email: r.get(3)?,
        subject: r.get(4)?,
        qualification: r.get(5)?,
        phone: r.get(6)?,
        created_at: r.get(7)?,
    })
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherInput {
    #[serde(default)]
    pub teacher_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub subject: String,
    pub password: Option<String>,
    pub qualification: Option<String>,
    pub phone: Option<String>,
}

struct CleanTeacher {
    teacher_id: String,
    name: String,
    email: String,
    subject: String,
    qualification: Option<String>,
    phone: Option<String>,
}

fn clean(input: &TeacherInput) -> RepoResult<CleanTeacher> {
    Ok(CleanTeacher {
        teacher_id: required("teacher ID", &input.teacher_id)?,
        name: required("name", &input.name)?,
        email: required("email", &input.email)?,
        subject: required("subject", &input.subject)?,
        qualification: optional(input.qualification.as_deref()),
        phone: optional(input.phone.as_deref()),
    })
}

fn check_unique(conn: &Connection, t: &CleanTeacher, except: i64) -> RepoResult<()> {
    if exists(
        conn,
        "SELECT 1 FROM teachers WHERE teacher_id = ? AND id != ?",
        (&t.teacher_id, except),
    )? {
        return Err(RepoError::conflict("teacher ID already exists"));
    }
    if exists(
        conn,
        "SELECT 1 FROM teachers WHERE email = ? AND id != ?",
        (&t.email, except),
    )? {
        return Err(RepoError::conflict("email already exists"));
    }
    Ok(())
}

pub fn list(conn: &Connection, session: &Session) -> RepoResult<Vec<Teacher>> {
    session.require_admin()?;
    let sql = format!("SELECT {TEACHER_COLUMNS} FROM teachers ORDER BY name, id");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], teacher_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Admin reads any teacher; a teacher reads only itself.
pub fn get(conn: &Connection, session: &Session, id: i64) -> RepoResult<Teacher> {
    session.require_rotated()?;
    let allowed = session.is_admin()
        || (session.role == auth::Role::Teacher && session.user_id == id);
    if !allowed {
        return Err(RepoError::Forbidden);
    }
    let sql = format!("SELECT {TEACHER_COLUMNS} FROM teachers WHERE id = ?");
    conn.query_row(&sql, [id], teacher_from_row)
        .optional()?
        .ok_or(RepoError::NotFound("teacher"))
}

#[instrument(skip(conn, session, input, scheme), fields(teacher_id = %input.teacher_id))]
pub fn create(
    conn: &Connection,
    session: &Session,
    input: &TeacherInput,
    scheme: HashScheme,
) -> RepoResult<i64> {
    session.require_admin()?;
    let t = clean(input)?;
    let password = input.password.as_deref().unwrap_or("");
    auth::validate_new_secret(password)?;
    check_unique(conn, &t, -1)?;

    let hash = auth::hash_secret(password, scheme)?;
    conn.execute(
        "INSERT INTO teachers(teacher_id, name, email, password_hash, subject, qualification, phone)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (
            &t.teacher_id,
            &t.name,
            &t.email,
            &hash,
            &t.subject,
            &t.qualification,
            &t.phone,
        ),
    )?;
    let id = conn.last_insert_rowid();
    info!(id, "teacher created");
    Ok(id)
}

#[instrument(skip(conn, session, input, scheme))]
pub fn update(
    conn: &Connection,
    session: &Session,
    id: i64,
    input: &TeacherInput,
    scheme: HashScheme,
) -> RepoResult<()> {
    session.require_admin()?;
    if !exists(conn, "SELECT 1 FROM teachers WHERE id = ?", [id])? {
        return Err(RepoError::NotFound("teacher"));
    }
    let t = clean(input)?;
    check_unique(conn, &t, id)?;
    let new_hash = match optional(input.password.as_deref()) {
        Some(p) => {
            auth::validate_new_secret(&p)?;
            Some(auth::hash_secret(&p, scheme)?)
        }
        None => None,
    };

    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "UPDATE teachers
         SET teacher_id = ?, name = ?, email = ?, subject = ?, qualification = ?, phone = ?
         WHERE id = ?",
        (
            &t.teacher_id,
            &t.name,
            &t.email,
            &t.subject,
            &t.qualification,
            &t.phone,
            id,
        ),
    )?;
    if let Some(hash) = new_hash {
        tx.execute(
            "UPDATE teachers SET password_hash = ? WHERE id = ?",
            (&hash, id),
        )?;
    }
    tx.commit()?;
    info!("teacher updated");
    Ok(())
}

/// Removes the teacher and its results; its subjects stay but become
/// unassigned.
#[instrument(skip(conn, session))]
pub fn delete(conn: &Connection, session: &Session, id: i64) -> RepoResult<()> {
    session.require_admin()?;
    if !exists(conn, "SELECT 1 FROM teachers WHERE id = ?", [id])? {
        return Err(RepoError::NotFound("teacher"));
    }
    let tx = conn.unchecked_transaction()?;
    let results = tx.execute("DELETE FROM results WHERE teacher_id = ?", [id])?;
    let subjects = tx.execute(
        "UPDATE subjects SET teacher_id = NULL WHERE teacher_id = ?",
        [id],
    )?;
    tx.execute("DELETE FROM teachers WHERE id = ?", [id])?;
    tx.commit()?;
    info!(results, subjects, "teacher deleted");
    Ok(())
}
