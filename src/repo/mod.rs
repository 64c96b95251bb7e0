//! Role-scoped access to school records.
//!
//! Every read composes [`scope`], so a query cannot be written without the
//! row filter for the caller's session. Writes that touch rows a teacher
//! may or may not own check [`in_scope`] inside their transaction.

pub mod attendance;
pub mod classes;
pub mod profile;
pub mod results;
pub mod stats;
pub mod students;
pub mod subjects;
pub mod teachers;

use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OptionalExtension};

use crate::auth::{Role, Session};
use crate::error::{RepoError, RepoResult};

/// Tables whose visibility depends on the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Students,
    Results,
    Attendance,
    Subjects,
    Classes,
}

impl Target {
    fn table(self) -> &'static str {
        match self {
            Target::Students => "students",
            Target::Results => "results",
            Target::Attendance => "attendance",
            Target::Subjects => "subjects",
            Target::Classes => "classes",
        }
    }
}

/// A WHERE clause plus its positional parameters.
#[derive(Debug, Clone)]
pub struct Scope {
    pub clause: String,
    pub params: Vec<Value>,
}

impl Scope {
    fn unrestricted() -> Self {
        Scope {
            clause: "1 = 1".to_string(),
            params: Vec::new(),
        }
    }

    fn only(clause: String, params: Vec<Value>) -> Self {
        Scope { clause, params }
    }

    /// Narrows the scope with an extra predicate. The scope predicate stays
    /// parenthesized so an OR inside it cannot widen the result.
    pub fn and(&mut self, predicate: &str, value: Value) -> &mut Self {
        self.clause = format!("({}) AND {}", self.clause, predicate);
        self.params.push(value);
        self
    }

    pub fn params(&self) -> rusqlite::ParamsFromIter<std::slice::Iter<'_, Value>> {
        params_from_iter(self.params.iter())
    }
}

/// Builds the row filter for `target` (aliased as `alias`) under `session`.
pub fn scope(session: &Session, target: Target, alias: &str) -> RepoResult<Scope> {
    session.require_rotated()?;
    let me = Value::Integer(session.user_id);

    let scope = match (session.role, target) {
        (Role::Admin, _) => Scope::unrestricted(),

        (Role::Teacher, Target::Results) => {
            Scope::only(format!("{alias}.teacher_id = ?"), vec![me])
        }
        (Role::Teacher, Target::Attendance) => Scope::only(
            format!("{alias}.subject_id IN (SELECT id FROM subjects WHERE teacher_id = ?)"),
            vec![me],
        ),
        (Role::Teacher, Target::Students) => Scope::only(
            format!(
                "({alias}.id IN (SELECT student_id FROM results WHERE teacher_id = ?)
                  OR {alias}.class_name IN (
                    SELECT class_name FROM subjects
                    WHERE teacher_id = ? AND class_name IS NOT NULL
                  ))"
            ),
            vec![me.clone(), me],
        ),
        (Role::Teacher, Target::Subjects) => {
            Scope::only(format!("{alias}.teacher_id = ?"), vec![me])
        }
        (Role::Teacher, Target::Classes) => Scope::only(
            format!(
                "{alias}.class_name IN (
                   SELECT class_name FROM subjects
                   WHERE teacher_id = ? AND class_name IS NOT NULL
                 )"
            ),
            vec![me],
        ),

        (Role::Student, Target::Results) | (Role::Student, Target::Attendance) => {
            Scope::only(format!("{alias}.student_id = ?"), vec![me])
        }
        (Role::Student, Target::Students) => Scope::only(format!("{alias}.id = ?"), vec![me]),
        (Role::Student, Target::Subjects) | (Role::Student, Target::Classes) => {
            return Err(RepoError::Forbidden)
        }
    };
    Ok(scope)
}

/// Whether the row `id` of `target` is visible to `session`.
pub fn in_scope(conn: &Connection, session: &Session, target: Target, id: i64) -> RepoResult<bool> {
    let mut sc = scope(session, target, "t")?;
    sc.and("t.id = ?", Value::Integer(id));
    let sql = format!("SELECT 1 FROM {} t WHERE {}", target.table(), sc.clause);
    let found: Option<i64> = conn
        .query_row(&sql, sc.params(), |r| r.get(0))
        .optional()?;
    Ok(found.is_some())
}

pub(crate) fn exists(conn: &Connection, sql: &str, params: impl rusqlite::Params) -> RepoResult<bool> {
    let found: Option<i64> = conn.query_row(sql, params, |r| r.get(0)).optional()?;
    Ok(found.is_some())
}

/// Trimmed value of a required text field.
pub(crate) fn required(field: &str, value: &str) -> RepoResult<String> {
    let v = value.trim();
    if v.is_empty() {
        return Err(RepoError::validation(format!("{} is required", field)));
    }
    Ok(v.to_string())
}

/// Trimmed optional text; blank becomes `None` so UNIQUE columns do not
/// collide on empty strings.
pub(crate) fn optional(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

pub(crate) fn validate_date(field: &str, value: &str) -> RepoResult<String> {
    let v = value.trim();
    chrono::NaiveDate::parse_from_str(v, "%Y-%m-%d")
        .map_err(|_| RepoError::validation(format!("{} must be YYYY-MM-DD", field)))?;
    Ok(v.to_string())
}

pub(crate) fn class_exists(conn: &Connection, class_name: &str) -> RepoResult<bool> {
    exists(
        conn,
        "SELECT 1 FROM classes WHERE class_name = ?",
        [class_name],
    )
}

/// Optional class reference; when given it must name an existing class.
pub(crate) fn class_ref(conn: &Connection, value: Option<&str>) -> RepoResult<Option<String>> {
    let Some(name) = optional(value) else {
        return Ok(None);
    };
    if !class_exists(conn, &name)? {
        return Err(RepoError::validation(format!("class '{}' does not exist", name)));
    }
    Ok(Some(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(role: Role, id: i64) -> Session {
        Session {
            role,
            user_id: id,
            display_name: "x".to_string(),
            must_rotate: false,
        }
    }

    #[test]
    fn admin_scope_is_unrestricted() {
        let sc = scope(&session(Role::Admin, 1), Target::Results, "r").expect("scope");
        assert_eq!(sc.clause, "1 = 1");
        assert!(sc.params.is_empty());
    }

    #[test]
    fn teacher_results_are_keyed_by_teacher() {
        let sc = scope(&session(Role::Teacher, 7), Target::Results, "r").expect("scope");
        assert_eq!(sc.clause, "r.teacher_id = ?");
        assert_eq!(sc.params, vec![Value::Integer(7)]);
    }

    #[test]
    fn extra_predicates_cannot_escape_the_scope() {
        let mut sc = scope(&session(Role::Teacher, 7), Target::Students, "s").expect("scope");
        sc.and("s.class_name = ?", Value::Text("1A".into()));
        assert!(sc.clause.starts_with("(("));
        assert!(sc.clause.ends_with(") AND s.class_name = ?"));
        assert_eq!(sc.params.len(), 3);
    }

    #[test]
    fn students_cannot_browse_subjects_or_classes() {
        let s = session(Role::Student, 3);
        assert!(matches!(scope(&s, Target::Subjects, "x"), Err(RepoError::Forbidden)));
        assert!(matches!(scope(&s, Target::Classes, "x"), Err(RepoError::Forbidden)));
    }

    #[test]
    fn unrotated_session_gets_no_scope() {
        let mut s = session(Role::Admin, 1);
        s.must_rotate = true;
        assert!(matches!(
            scope(&s, Target::Students, "s"),
            Err(RepoError::RotationRequired)
        ));
    }
}
