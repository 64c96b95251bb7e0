use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use super::{exists, optional, required, scope, Target};
use crate::auth::Session;
use crate::error::{RepoError, RepoResult};

pub const DEFAULT_CAPACITY: i64 = 30;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Class {
    pub id: i64,
    pub class_name: String,
    pub level: Option<String>,
    pub capacity: Option<i64>,
    pub year: Option<String>,
    pub student_count: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassInput {
    #[serde(default)]
    pub class_name: String,
    pub level: Option<String>,
    pub capacity: Option<i64>,
    pub year: Option<String>,
}

/// Outcome of an update, reporting how far a rename cascaded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassUpdate {
    pub renamed: bool,
    pub students_moved: usize,
    pub subjects_moved: usize,
}

fn capacity(input: &ClassInput) -> RepoResult<i64> {
    let c = input.capacity.unwrap_or(DEFAULT_CAPACITY);
    if c < 0 {
        return Err(RepoError::validation("capacity must not be negative"));
    }
    Ok(c)
}

pub fn list(conn: &Connection, session: &Session) -> RepoResult<Vec<Class>> {
    let sc = scope(session, Target::Classes, "c")?;
    // Correlated subquery avoids double-counting from joins.
    let sql = format!(
        "SELECT c.id, c.class_name, c.level, c.capacity, c.year,
                (SELECT COUNT(*) FROM students s WHERE s.class_name = c.class_name)
         FROM classes c
         WHERE {}
         ORDER BY c.class_name",
        sc.clause
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(sc.params(), |r| {
            Ok(Class {
                id: r.get(0)?,
                class_name: r.get(1)?,
                level: r.get(2)?,
                capacity: r.get(3)?,
                year: r.get(4)?,
                student_count: r.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[instrument(skip(conn, session, input), fields(class_name = %input.class_name))]
pub fn create(conn: &Connection, session: &Session, input: &ClassInput) -> RepoResult<i64> {
    session.require_admin()?;
    let name = required("class name", &input.class_name)?;
    let cap = capacity(input)?;
    if exists(conn, "SELECT 1 FROM classes WHERE class_name = ?", [&name])? {
        return Err(RepoError::conflict("class already exists"));
    }
    conn.execute(
        "INSERT INTO classes(class_name, level, capacity, year) VALUES(?, ?, ?, ?)",
        (
            &name,
            optional(input.level.as_deref()),
            cap,
            optional(input.year.as_deref()),
        ),
    )?;
    let id = conn.last_insert_rowid();
    info!(id, "class created");
    Ok(id)
}

/// Updates the class; a new name is propagated to every student and subject
/// that referenced the old one, in the same transaction.
#[instrument(skip(conn, session, input))]
pub fn update(
    conn: &Connection,
    session: &Session,
    id: i64,
    input: &ClassInput,
) -> RepoResult<ClassUpdate> {
    session.require_admin()?;
    let old_name: Option<String> = conn
        .query_row("SELECT class_name FROM classes WHERE id = ?", [id], |r| {
            r.get(0)
        })
        .optional()?;
    let Some(old_name) = old_name else {
        return Err(RepoError::NotFound("class"));
    };
    let name = required("class name", &input.class_name)?;
    let cap = capacity(input)?;
    if exists(
        conn,
        "SELECT 1 FROM classes WHERE class_name = ? AND id != ?",
        (&name, id),
    )? {
        return Err(RepoError::conflict("class already exists"));
    }

    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "UPDATE classes SET class_name = ?, level = ?, capacity = ?, year = ? WHERE id = ?",
        (
            &name,
            optional(input.level.as_deref()),
            cap,
            optional(input.year.as_deref()),
            id,
        ),
    )?;
    let mut outcome = ClassUpdate::default();
    if old_name != name {
        outcome.renamed = true;
        outcome.students_moved = tx.execute(
            "UPDATE students SET class_name = ? WHERE class_name = ?",
            (&name, &old_name),
        )?;
        outcome.subjects_moved = tx.execute(
            "UPDATE subjects SET class_name = ? WHERE class_name = ?",
            (&name, &old_name),
        )?;
    }
    tx.commit()?;
    info!(
        renamed = outcome.renamed,
        students = outcome.students_moved,
        subjects = outcome.subjects_moved,
        "class updated"
    );
    Ok(outcome)
}

/// Refused while any student is still in the class.
#[instrument(skip(conn, session))]
pub fn delete(conn: &Connection, session: &Session, id: i64) -> RepoResult<()> {
    session.require_admin()?;
    let name: Option<String> = conn
        .query_row("SELECT class_name FROM classes WHERE id = ?", [id], |r| {
            r.get(0)
        })
        .optional()?;
    let Some(name) = name else {
        return Err(RepoError::NotFound("class"));
    };

    let tx = conn.unchecked_transaction()?;
    let students: i64 = tx.query_row(
        "SELECT COUNT(*) FROM students WHERE class_name = ?",
        [&name],
        |r| r.get(0),
    )?;
    if students > 0 {
        return Err(RepoError::Blocked(format!(
            "cannot delete class '{}' because it has {} student(s); reassign or delete them first",
            name, students
        )));
    }
    tx.execute("DELETE FROM classes WHERE id = ?", [id])?;
    tx.commit()?;
    info!("class deleted");
    Ok(())
}
