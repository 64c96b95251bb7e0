use rusqlite::{Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::auth;
use crate::config::AppConfig;

pub fn db_path(workspace: &Path, cfg: &AppConfig) -> PathBuf {
    workspace.join(&cfg.database.file_name)
}

/// Opens a connection to an already-initialized workspace database.
/// Dropped by the caller at the end of each request.
pub fn connect(workspace: &Path, cfg: &AppConfig) -> anyhow::Result<Connection> {
    let conn = Connection::open(db_path(workspace, cfg))?;
    conn.busy_timeout(Duration::from_millis(cfg.database.busy_timeout_ms))?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;
    Ok(conn)
}

/// Creates the workspace directory and schema if needed, migrates legacy
/// databases in place, and seeds the default administrator.
pub fn open_db(workspace: &Path, cfg: &AppConfig) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let conn = connect(workspace, cfg)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS admin(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            username TEXT UNIQUE NOT NULL,
            password_hash TEXT NOT NULL,
            email TEXT,
            must_rotate INTEGER NOT NULL DEFAULT 0,
            created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS teachers(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            teacher_id TEXT UNIQUE NOT NULL,
            name TEXT NOT NULL,
            email TEXT UNIQUE,
            password_hash TEXT NOT NULL,
            subject TEXT,
            qualification TEXT,
            phone TEXT,
            created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            student_id TEXT UNIQUE NOT NULL,
            cne TEXT UNIQUE,
            name TEXT NOT NULL,
            email TEXT UNIQUE,
            password_hash TEXT NOT NULL,
            class_name TEXT,
            birth_date TEXT,
            address TEXT,
            phone TEXT,
            created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS classes(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            class_name TEXT UNIQUE NOT NULL,
            level TEXT,
            capacity INTEGER,
            year TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS subjects(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            subject_code TEXT UNIQUE NOT NULL,
            subject_name TEXT NOT NULL,
            teacher_id INTEGER,
            class_name TEXT,
            credits INTEGER,
            FOREIGN KEY(teacher_id) REFERENCES teachers(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS results(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            student_id INTEGER NOT NULL,
            subject_id INTEGER NOT NULL,
            teacher_id INTEGER NOT NULL,
            grade REAL NOT NULL,
            exam_type TEXT,
            semester TEXT,
            academic_year TEXT,
            remarks TEXT,
            recorded_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(subject_id) REFERENCES subjects(id),
            FOREIGN KEY(teacher_id) REFERENCES teachers(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS attendance(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            student_id INTEGER NOT NULL,
            date DATE NOT NULL,
            status TEXT NOT NULL,
            subject_id INTEGER,
            remarks TEXT,
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(subject_id) REFERENCES subjects(id)
        )",
        [],
    )?;

    // Databases written by the desktop application use older column names.
    ensure_renamed_column(&conn, "students", "class", "class_name")?;
    ensure_renamed_column(&conn, "subjects", "class", "class_name")?;
    ensure_renamed_column(&conn, "students", "password", "password_hash")?;
    ensure_renamed_column(&conn, "teachers", "password", "password_hash")?;
    ensure_renamed_column(&conn, "admin", "password", "password_hash")?;
    ensure_renamed_column(&conn, "results", "date", "recorded_at")?;
    ensure_admin_must_rotate(&conn, cfg)?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_class ON students(class_name)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_subjects_teacher ON subjects(teacher_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_subjects_class ON subjects(class_name)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_results_student ON results(student_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_results_teacher ON results(teacher_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_student ON attendance(student_id)",
        [],
    )?;

    dedupe_attendance(&conn)?;
    // NULL subjects would never collide in a plain unique index.
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS ux_attendance_key
         ON attendance(student_id, date, IFNULL(subject_id, 0))",
        [],
    )?;

    seed_default_admin(&conn, cfg)?;

    Ok(conn)
}

/// Deletes the database file and recreates an empty schema.
pub fn reset_db(workspace: &Path, cfg: &AppConfig) -> anyhow::Result<()> {
    let path = db_path(workspace, cfg);
    if path.exists() {
        std::fs::remove_file(&path)?;
    }
    let _conn = open_db(workspace, cfg)?;
    info!(path = %path.to_string_lossy(), "database reset");
    Ok(())
}

fn seed_default_admin(conn: &Connection, cfg: &AppConfig) -> anyhow::Result<()> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM admin", [], |r| r.get(0))?;
    if count > 0 {
        return Ok(());
    }
    let hash = auth::hash_secret(&cfg.auth.default_admin_secret, cfg.auth.hash_scheme)?;
    conn.execute(
        "INSERT INTO admin(username, password_hash, email, must_rotate) VALUES(?, ?, ?, 1)",
        (&cfg.auth.default_admin_username, &hash, "admin@school.ma"),
    )?;
    info!(
        username = %cfg.auth.default_admin_username,
        "seeded default administrator; password rotation required"
    );
    Ok(())
}

fn ensure_renamed_column(
    conn: &Connection,
    table: &str,
    old: &str,
    new: &str,
) -> anyhow::Result<()> {
    if !table_has_column(conn, table, old)? || table_has_column(conn, table, new)? {
        return Ok(());
    }
    let sql = format!("ALTER TABLE {} RENAME COLUMN {} TO {}", table, old, new);
    conn.execute(&sql, [])?;
    debug!(table, old, new, "renamed legacy column");
    Ok(())
}

/// Adds `admin.must_rotate` to legacy databases. Accounts still holding the
/// well-known default secret are flagged so they cannot act until rotated.
fn ensure_admin_must_rotate(conn: &Connection, cfg: &AppConfig) -> anyhow::Result<()> {
    if table_has_column(conn, "admin", "must_rotate")? {
        return Ok(());
    }
    conn.execute(
        "ALTER TABLE admin ADD COLUMN must_rotate INTEGER NOT NULL DEFAULT 0",
        [],
    )?;
    let default_hash = auth::legacy_sha256_hex(&cfg.auth.default_admin_secret);
    let flagged = conn.execute(
        "UPDATE admin SET must_rotate = 1 WHERE lower(password_hash) = ?",
        [&default_hash],
    )?;
    if flagged > 0 {
        info!(flagged, "legacy administrators with the default password must rotate");
    }
    Ok(())
}

fn dedupe_attendance(conn: &Connection) -> anyhow::Result<()> {
    let has_index: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'index' AND name = 'ux_attendance_key'",
            [],
            |r| r.get(0),
        )
        .optional()?;
    if has_index.is_some() {
        return Ok(());
    }
    // Keep the most recently written row for each key.
    let removed = conn.execute(
        "DELETE FROM attendance
         WHERE id NOT IN (
           SELECT MAX(id) FROM attendance
           GROUP BY student_id, date, IFNULL(subject_id, 0)
         )",
        [],
    )?;
    if removed > 0 {
        info!(removed, "collapsed duplicate attendance rows");
    }
    Ok(())
}

pub fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}
