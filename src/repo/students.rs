use rusqlite::types::Value;
use rusqlite::{Connection, Row};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use super::{class_ref, exists, in_scope, optional, required, scope, validate_date, Target};
use crate::auth::{self, Session};
use crate::config::HashScheme;
use crate::error::{RepoError, RepoResult};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: i64,
    pub student_id: String,
    pub cne: Option<String>,
    pub name: String,
    pub email: Option<String>,
    pub class_name: Option<String>,
    pub birth_date: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub created_at: Option<String>,
}

const STUDENT_COLUMNS: &str = "s.id, s.student_id, s.cne, s.name, s.email, s.class_name,
     s.birth_date, s.address, s.phone, s.created_at";

fn student_from_row(r: &Row<'_>) -> rusqlite::Result<Student> {
    Ok(Student {
        id: r.get(0)?,
        student_id: r.get(1)?,
        cne: r.get(2)?,
        name: r.get(3)?,
        email: r.get(4)?,
        class_name: r.get(5)?,
        birth_date: r.get(6)?,
        address: r.get(7)?,
        phone: r.get(8)?,
        created_at: r.get(9)?,
    })
}

/// Fields of a student form. `password` is required on create and
/// optional on update (absent keeps the current hash).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentInput {
    #[serde(default)]
    pub student_id: String,
    #[serde(default)]
    pub cne: String,
    #[serde(default)]
    pub name: String,
    pub email: Option<String>,
    pub password: Option<String>,
    pub class_name: Option<String>,
    pub birth_date: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
}

struct CleanStudent {
    student_id: String,
    cne: String,
    name: String,
    email: Option<String>,
    class_name: Option<String>,
    birth_date: Option<String>,
    address: Option<String>,
    phone: Option<String>,
}

fn clean(conn: &Connection, input: &StudentInput) -> RepoResult<CleanStudent> {
    let student_id = required("student ID", &input.student_id)?;
    let cne = required("CNE", &input.cne)?;
    let name = required("name", &input.name)?;
    let birth_date = match optional(input.birth_date.as_deref()) {
        Some(d) => Some(validate_date("birth date", &d)?),
        None => None,
    };
    Ok(CleanStudent {
        student_id,
        cne,
        name,
        email: optional(input.email.as_deref()),
        class_name: class_ref(conn, input.class_name.as_deref())?,
        birth_date,
        address: optional(input.address.as_deref()),
        phone: optional(input.phone.as_deref()),
    })
}

/// Explicit uniqueness checks so conflicts are reported by field rather
/// than as a constraint failure. `except` skips the row being updated.
fn check_unique(conn: &Connection, s: &CleanStudent, except: i64) -> RepoResult<()> {
    if exists(
        conn,
        "SELECT 1 FROM students WHERE student_id = ? AND id != ?",
        (&s.student_id, except),
    )? {
        return Err(RepoError::conflict("student ID already exists"));
    }
    if exists(
        conn,
        "SELECT 1 FROM students WHERE cne = ? AND id != ?",
        (&s.cne, except),
    )? {
        return Err(RepoError::conflict("CNE already exists"));
    }
    if let Some(email) = &s.email {
        if exists(
            conn,
            "SELECT 1 FROM students WHERE email = ? AND id != ?",
            (email, except),
        )? {
            return Err(RepoError::conflict("email already exists"));
        }
    }
    Ok(())
}

pub fn list(conn: &Connection, session: &Session, class_name: Option<&str>) -> RepoResult<Vec<Student>> {
    let mut sc = scope(session, Target::Students, "s")?;
    if let Some(c) = optional(class_name) {
        sc.and("s.class_name = ?", Value::Text(c));
    }
    let sql = format!(
        "SELECT {STUDENT_COLUMNS} FROM students s WHERE {} ORDER BY s.name, s.id",
        sc.clause
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(sc.params(), student_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn get(conn: &Connection, session: &Session, id: i64) -> RepoResult<Student> {
    let mut sc = scope(session, Target::Students, "s")?;
    sc.and("s.id = ?", Value::Integer(id));
    let sql = format!("SELECT {STUDENT_COLUMNS} FROM students s WHERE {}", sc.clause);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query_map(sc.params(), student_from_row)?;
    match rows.next() {
        Some(row) => Ok(row?),
        None => Err(RepoError::NotFound("student")),
    }
}

#[instrument(skip(conn, session, input, scheme), fields(student_id = %input.student_id))]
pub fn create(
    conn: &Connection,
    session: &Session,
    input: &StudentInput,
    scheme: HashScheme,
) -> RepoResult<i64> {
    session.require_admin()?;
    let s = clean(conn, input)?;
    let password = input.password.as_deref().unwrap_or("");
    auth::validate_new_secret(password)?;
    check_unique(conn, &s, -1)?;

    let hash = auth::hash_secret(password, scheme)?;
    conn.execute(
        "INSERT INTO students(student_id, cne, name, email, password_hash,
                              class_name, birth_date, address, phone)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &s.student_id,
            &s.cne,
            &s.name,
            &s.email,
            &hash,
            &s.class_name,
            &s.birth_date,
            &s.address,
            &s.phone,
        ),
    )?;
    let id = conn.last_insert_rowid();
    info!(id, "student created");
    Ok(id)
}

#[instrument(skip(conn, session, input, scheme))]
pub fn update(
    conn: &Connection,
    session: &Session,
    id: i64,
    input: &StudentInput,
    scheme: HashScheme,
) -> RepoResult<()> {
    session.require_admin()?;
    if !in_scope(conn, session, Target::Students, id)? {
        return Err(RepoError::NotFound("student"));
    }
    let s = clean(conn, input)?;
    check_unique(conn, &s, id)?;
    let new_hash = match optional(input.password.as_deref()) {
        Some(p) => {
            auth::validate_new_secret(&p)?;
            Some(auth::hash_secret(&p, scheme)?)
        }
        None => None,
    };

    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "UPDATE students
         SET student_id = ?, cne = ?, name = ?, email = ?, class_name = ?,
             birth_date = ?, address = ?, phone = ?
         WHERE id = ?",
        (
            &s.student_id,
            &s.cne,
            &s.name,
            &s.email,
            &s.class_name,
            &s.birth_date,
            &s.address,
            &s.phone,
            id,
        ),
    )?;
    if let Some(hash) = new_hash {
        tx.execute(
            "UPDATE students SET password_hash = ? WHERE id = ?",
            (&hash, id),
        )?;
    }
    tx.commit()?;
    info!("student updated");
    Ok(())
}

/// Removes the student together with its results and attendance.
#[instrument(skip(conn, session))]
pub fn delete(conn: &Connection, session: &Session, id: i64) -> RepoResult<()> {
    session.require_admin()?;
    if !in_scope(conn, session, Target::Students, id)? {
        return Err(RepoError::NotFound("student"));
    }
    let tx = conn.unchecked_transaction()?;
    let results = tx.execute("DELETE FROM results WHERE student_id = ?", [id])?;
    let attendance = tx.execute("DELETE FROM attendance WHERE student_id = ?", [id])?;
    tx.execute("DELETE FROM students WHERE id = ?", [id])?;
    tx.commit()?;
    info!(results, attendance, "student deleted");
    Ok(())
}
