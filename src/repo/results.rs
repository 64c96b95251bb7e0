use chrono::Datelike;
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use super::{exists, in_scope, optional, scope, Target};
use crate::auth::{Role, Session};
use crate::error::{RepoError, RepoResult};
use crate::grade::{validate_grade, GradeBand};

pub const DEFAULT_EXAM_TYPE: &str = "Normal";
pub const DEFAULT_SEMESTER: &str = "Semester 1";

/// A grade as typed into a form: a JSON number or numeric text.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum GradeInput {
    Number(f64),
    Text(String),
}

impl GradeInput {
    pub fn parse(&self) -> RepoResult<f64> {
        let g = match self {
            GradeInput::Number(n) => *n,
            GradeInput::Text(t) => t
                .trim()
                .replace(',', ".")
                .parse::<f64>()
                .map_err(|_| RepoError::validation("grade must be a number"))?,
        };
        validate_grade(g)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultInput {
    pub student_id: i64,
    pub subject_id: i64,
    /// Only honoured for administrators; teachers always record as themselves.
    pub teacher_id: Option<i64>,
    pub grade: Option<GradeInput>,
    pub exam_type: Option<String>,
    pub semester: Option<String>,
    pub academic_year: Option<String>,
    pub remarks: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultPatch {
    pub grade: Option<GradeInput>,
    pub exam_type: Option<String>,
    pub semester: Option<String>,
    pub academic_year: Option<String>,
    pub remarks: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultFilter {
    pub subject_id: Option<i64>,
    pub class_name: Option<String>,
    pub student_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultRow {
    pub id: i64,
    pub student_id: i64,
    pub student_code: Option<String>,
    pub student_name: Option<String>,
    pub class_name: Option<String>,
    pub subject_id: i64,
    pub subject_name: Option<String>,
    pub teacher_id: i64,
    pub teacher_name: Option<String>,
    pub grade: f64,
    pub band: GradeBand,
    pub exam_type: Option<String>,
    pub semester: Option<String>,
    pub academic_year: Option<String>,
    pub remarks: Option<String>,
    pub recorded_at: Option<String>,
}

fn result_from_row(r: &Row<'_>) -> rusqlite::Result<ResultRow> {
    let grade: f64 = r.get(9)?;
    Ok(ResultRow {
        id: r.get(0)?,
        student_id: r.get(1)?,
        student_code: r.get(2)?,
        student_name: r.get(3)?,
        class_name: r.get(4)?,
        subject_id: r.get(5)?,
        subject_name: r.get(6)?,
        teacher_id: r.get(7)?,
        teacher_name: r.get(8)?,
        grade,
        band: GradeBand::classify(grade),
        exam_type: r.get(10)?,
        semester: r.get(11)?,
        academic_year: r.get(12)?,
        remarks: r.get(13)?,
        recorded_at: r.get(14)?,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultSummary {
    pub count: i64,
    pub average: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectOption {
    pub id: i64,
    pub subject_name: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterOptions {
    pub subjects: Vec<SubjectOption>,
    pub classes: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentOverview {
    pub id: i64,
    pub student_id: String,
    pub name: String,
    pub class_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub result_count: i64,
    pub last_result_at: Option<String>,
    pub average_grade: Option<f64>,
}

/// School year containing `today`; a new year starts in September.
pub fn current_academic_year(today: chrono::NaiveDate) -> String {
    let y = today.year();
    if today.month() >= 9 {
        format!("{}-{}", y, y + 1)
    } else {
        format!("{}-{}", y - 1, y)
    }
}

fn scoped_filter(session: &Session, filter: &ResultFilter) -> RepoResult<super::Scope> {
    let mut sc = scope(session, Target::Results, "r")?;
    if let Some(sid) = filter.subject_id {
        sc.and("r.subject_id = ?", Value::Integer(sid));
    }
    if let Some(c) = optional(filter.class_name.as_deref()) {
        sc.and("stu.class_name = ?", Value::Text(c));
    }
    if let Some(st) = filter.student_id {
        sc.and("r.student_id = ?", Value::Integer(st));
    }
    Ok(sc)
}

pub fn list(conn: &Connection, session: &Session, filter: &ResultFilter) -> RepoResult<Vec<ResultRow>> {
    let sc = scoped_filter(session, filter)?;
    let sql = format!(
        "SELECT r.id, r.student_id, stu.student_id, stu.name, stu.class_name,
                r.subject_id, sub.subject_name, r.teacher_id, t.name,
                r.grade, r.exam_type, r.semester, r.academic_year, r.remarks, r.recorded_at
         FROM results r
         LEFT JOIN students stu ON stu.id = r.student_id
         LEFT JOIN subjects sub ON sub.id = r.subject_id
         LEFT JOIN teachers t ON t.id = r.teacher_id
         WHERE {}
         ORDER BY r.recorded_at DESC, r.id DESC",
        sc.clause
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(sc.params(), result_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn summary(conn: &Connection, session: &Session, filter: &ResultFilter) -> RepoResult<ResultSummary> {
    let sc = scoped_filter(session, filter)?;
    let sql = format!(
        "SELECT COUNT(*), AVG(r.grade), MIN(r.grade), MAX(r.grade)
         FROM results r
         LEFT JOIN students stu ON stu.id = r.student_id
         WHERE {}",
        sc.clause
    );
    let s = conn.query_row(&sql, sc.params(), |r| {
        Ok(ResultSummary {
            count: r.get(0)?,
            average: r.get(1)?,
            min: r.get(2)?,
            max: r.get(3)?,
        })
    })?;
    Ok(s)
}

/// Subjects the session can filter by, and the classes present in its results.
pub fn filter_options(conn: &Connection, session: &Session) -> RepoResult<FilterOptions> {
    if session.role == Role::Student {
        return Err(RepoError::Forbidden);
    }
    let sub_sc = scope(session, Target::Subjects, "sub")?;
    let sql = format!(
        "SELECT sub.id, sub.subject_name FROM subjects sub WHERE {} ORDER BY sub.subject_name",
        sub_sc.clause
    );
    let mut stmt = conn.prepare(&sql)?;
    let subjects = stmt
        .query_map(sub_sc.params(), |r| {
            Ok(SubjectOption {
                id: r.get(0)?,
                subject_name: r.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let res_sc = scope(session, Target::Results, "r")?;
    let sql = format!(
        "SELECT DISTINCT stu.class_name
         FROM results r
         JOIN students stu ON stu.id = r.student_id
         WHERE ({}) AND stu.class_name IS NOT NULL AND stu.class_name != ''
         ORDER BY stu.class_name",
        res_sc.clause
    );
    let mut stmt = conn.prepare(&sql)?;
    let classes = stmt
        .query_map(res_sc.params(), |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(FilterOptions { subjects, classes })
}

/// One line per student with results visible to the session.
pub fn students_overview(conn: &Connection, session: &Session) -> RepoResult<Vec<StudentOverview>> {
    let sc = scope(session, Target::Results, "r")?;
    let sql = format!(
        "SELECT stu.id, stu.student_id, stu.name, stu.class_name, stu.email, stu.phone,
                COUNT(r.id), MAX(r.recorded_at), AVG(r.grade)
         FROM students stu
         JOIN results r ON r.student_id = stu.id
         WHERE {}
         GROUP BY stu.id
         ORDER BY stu.name, stu.id",
        sc.clause
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(sc.params(), |r| {
            Ok(StudentOverview {
                id: r.get(0)?,
                student_id: r.get(1)?,
                name: r.get(2)?,
                class_name: r.get(3)?,
                email: r.get(4)?,
                phone: r.get(5)?,
                result_count: r.get(6)?,
                last_result_at: r.get(7)?,
                average_grade: r.get(8)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Records a grade. Teachers may only grade their own subjects and students
/// they can see; administrators record on behalf of a teacher.
#[instrument(skip(conn, session, input), fields(role = session.role.as_str(), student = input.student_id, subject = input.subject_id))]
pub fn add(conn: &Connection, session: &Session, input: &ResultInput) -> RepoResult<i64> {
    session.require_rotated()?;
    let grade = input
        .grade
        .as_ref()
        .ok_or_else(|| RepoError::validation("grade is required"))?
        .parse()?;

    let tx = conn.unchecked_transaction()?;
    let subject_teacher: Option<Option<i64>> = tx
        .query_row(
            "SELECT teacher_id FROM subjects WHERE id = ?",
            [input.subject_id],
            |r| r.get(0),
        )
        .optional()?;
    let Some(subject_teacher) = subject_teacher else {
        return Err(RepoError::NotFound("subject"));
    };
    if !exists(&tx, "SELECT 1 FROM students WHERE id = ?", [input.student_id])? {
        return Err(RepoError::NotFound("student"));
    }

    let teacher_id = match session.role {
        Role::Teacher => {
            if !in_scope(&tx, session, Target::Subjects, input.subject_id)?
                || !in_scope(&tx, session, Target::Students, input.student_id)?
            {
                return Err(RepoError::Forbidden);
            }
            session.user_id
        }
        Role::Admin => {
            let Some(tid) = input.teacher_id.or(subject_teacher) else {
                return Err(RepoError::validation(
                    "teacher is required for a subject without an assigned teacher",
                ));
            };
            if !exists(&tx, "SELECT 1 FROM teachers WHERE id = ?", [tid])? {
                return Err(RepoError::validation("invalid teacher selection"));
            }
            tid
        }
        Role::Student => return Err(RepoError::Forbidden),
    };

    let academic_year = optional(input.academic_year.as_deref())
        .unwrap_or_else(|| current_academic_year(chrono::Local::now().date_naive()));
    tx.execute(
        "INSERT INTO results(student_id, subject_id, teacher_id, grade, exam_type,
                             semester, academic_year, remarks)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
        (
            input.student_id,
            input.subject_id,
            teacher_id,
            grade,
            optional(input.exam_type.as_deref()).unwrap_or_else(|| DEFAULT_EXAM_TYPE.to_string()),
            optional(input.semester.as_deref()).unwrap_or_else(|| DEFAULT_SEMESTER.to_string()),
            academic_year,
            optional(input.remarks.as_deref()),
        ),
    )?;
    let id = tx.last_insert_rowid();
    tx.commit()?;
    info!(id, teacher_id, "result recorded");
    Ok(id)
}

#[instrument(skip(conn, session, patch))]
pub fn update(conn: &Connection, session: &Session, id: i64, patch: &ResultPatch) -> RepoResult<()> {
    if session.role == Role::Student {
        return Err(RepoError::Forbidden);
    }
    let grade = patch.grade.as_ref().map(GradeInput::parse).transpose()?;

    let tx = conn.unchecked_transaction()?;
    if !in_scope(&tx, session, Target::Results, id)? {
        return Err(RepoError::NotFound("result"));
    }
    if let Some(g) = grade {
        tx.execute("UPDATE results SET grade = ? WHERE id = ?", (g, id))?;
    }
    let text_fields = [
        ("exam_type", &patch.exam_type),
        ("semester", &patch.semester),
        ("academic_year", &patch.academic_year),
        ("remarks", &patch.remarks),
    ];
    for (column, value) in text_fields {
        if let Some(v) = value {
            let sql = format!("UPDATE results SET {} = ? WHERE id = ?", column);
            tx.execute(&sql, (optional(Some(v.as_str())), id))?;
        }
    }
    tx.commit()?;
    info!("result updated");
    Ok(())
}

#[instrument(skip(conn, session))]
pub fn delete(conn: &Connection, session: &Session, id: i64) -> RepoResult<()> {
    if session.role == Role::Student {
        return Err(RepoError::Forbidden);
    }
    let tx = conn.unchecked_transaction()?;
    if !in_scope(&tx, session, Target::Results, id)? {
        return Err(RepoError::NotFound("result"));
    }
    tx.execute("DELETE FROM results WHERE id = ?", [id])?;
    tx.commit()?;
    info!("result deleted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn academic_year_rolls_over_in_september() {
        let aug = NaiveDate::from_ymd_opt(2024, 8, 31).expect("date");
        let sep = NaiveDate::from_ymd_opt(2024, 9, 1).expect("date");
        assert_eq!(current_academic_year(aug), "2023-2024");
        assert_eq!(current_academic_year(sep), "2024-2025");
    }

    #[test]
    fn grade_text_accepts_decimal_comma() {
        assert_eq!(GradeInput::Text("12,5".into()).parse().expect("grade"), 12.5);
        assert!(GradeInput::Text("abc".into()).parse().is_err());
        assert!(GradeInput::Number(21.0).parse().is_err());
    }
}
