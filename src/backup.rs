use anyhow::{anyhow, Context};
use chrono::{DateTime, Local};
use rusqlite::types::Value;
use rusqlite::Connection;
use rust_xlsxwriter::{Format, Workbook, Worksheet};
use std::path::{Path, PathBuf};

pub const EXPORT_FORMAT_V1: &str = "registrar-xlsx-v1";
pub const BACKUPS_DIR: &str = "backups";
pub const EXPORTS_DIR: &str = "exports";
const MAX_COLUMN_WIDTH: usize = 50;

/// Tables written to an export, one worksheet each, in sheet order.
pub const EXPORT_TABLES: &[&str] = &[
    "students",
    "teachers",
    "subjects",
    "results",
    "classes",
    "attendance",
];

#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub path: PathBuf,
    pub format: String,
    pub tables: Vec<TableSummary>,
}

#[derive(Debug, Clone)]
pub struct TableSummary {
    pub name: String,
    pub rows: usize,
    pub column_widths: Vec<usize>,
}

fn stamp(now: &DateTime<Local>) -> String {
    now.format("%Y%m%d_%H%M%S").to_string()
}

/// First free path of the form `<dir>/<prefix>_<stamp>[_<n>].<ext>`.
fn timestamped_path(dir: &Path, prefix: &str, now: &DateTime<Local>, ext: &str) -> PathBuf {
    let base = format!("{}_{}", prefix, stamp(now));
    let mut candidate = dir.join(format!("{}.{}", base, ext));
    let mut n = 1;
    while candidate.exists() {
        candidate = dir.join(format!("{}_{}.{}", base, n, ext));
        n += 1;
    }
    candidate
}

/// Copies the live database file next to the workspace under `backups/`.
pub fn backup_database(db_path: &Path, workspace: &Path, now: DateTime<Local>) -> anyhow::Result<PathBuf> {
    if !db_path.is_file() {
        return Err(anyhow!(
            "workspace database not found: {}",
            db_path.to_string_lossy()
        ));
    }
    let dir = workspace.join(BACKUPS_DIR);
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create directory {}", dir.to_string_lossy()))?;
    let out = timestamped_path(&dir, "registrar_backup", &now, "sqlite3");
    std::fs::copy(db_path, &out).with_context(|| {
        format!(
            "failed to copy database from {} to {}",
            db_path.to_string_lossy(),
            out.to_string_lossy()
        )
    })?;
    Ok(out)
}

fn cell_text(v: &Value) -> String {
    match v {
        Value::Null => String::new(),
        Value::Integer(i) => i.to_string(),
        Value::Real(f) => f.to_string(),
        Value::Text(t) => t.clone(),
        Value::Blob(b) => hex::encode(b),
    }
}

fn export_columns(conn: &Connection, table: &str) -> anyhow::Result<Vec<String>> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let cols = stmt
        .query_map([], |r| r.get::<_, String>(1))?
        .collect::<Result<Vec<_>, _>>()?;
    // Credentials never leave the database.
    Ok(cols.into_iter().filter(|c| c != "password_hash").collect())
}

fn write_cell(sheet: &mut Worksheet, row: u32, col: u16, v: &Value) -> anyhow::Result<()> {
    match v {
        Value::Null => {}
        Value::Integer(i) => {
            sheet.write_number(row, col, *i as f64)?;
        }
        Value::Real(f) => {
            sheet.write_number(row, col, *f)?;
        }
        Value::Text(t) => {
            sheet.write_string(row, col, t)?;
        }
        Value::Blob(b) => {
            sheet.write_string(row, col, hex::encode(b))?;
        }
    }
    Ok(())
}

/// Auto-fit width for a column whose longest cell is `longest` characters.
pub fn column_width(longest: usize) -> usize {
    (longest + 2).min(MAX_COLUMN_WIDTH)
}

/// Fills `sheet` with a header row and every row of `table`, then sizes the
/// columns to their content.
fn write_table_sheet(
    conn: &Connection,
    table: &str,
    sheet: &mut Worksheet,
    header: &Format,
) -> anyhow::Result<TableSummary> {
    sheet.set_name(table)?;
    let columns = export_columns(conn, table)?;
    let mut longest: Vec<usize> = columns.iter().map(|c| c.chars().count()).collect();
    for (i, name) in columns.iter().enumerate() {
        sheet.write_string_with_format(0, i as u16, name, header)?;
    }

    let sql = format!("SELECT {} FROM {} ORDER BY rowid", columns.join(", "), table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    let mut count: u32 = 0;
    while let Some(row) = rows.next()? {
        count += 1;
        for i in 0..columns.len() {
            let v: Value = row.get(i)?;
            longest[i] = longest[i].max(cell_text(&v).chars().count());
            write_cell(sheet, count, i as u16, &v)?;
        }
    }

    let column_widths: Vec<usize> = longest.into_iter().map(column_width).collect();
    for (i, width) in column_widths.iter().enumerate() {
        sheet.set_column_width(i as u16, *width as f64)?;
    }
    Ok(TableSummary {
        name: table.to_string(),
        rows: count as usize,
        column_widths,
    })
}

/// Writes every records table into `exports/registrar_export_<stamp>.xlsx`,
/// one worksheet per table with a bold header row.
pub fn export_tables(conn: &Connection, workspace: &Path, now: DateTime<Local>) -> anyhow::Result<ExportSummary> {
    let dir = workspace.join(EXPORTS_DIR);
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create directory {}", dir.to_string_lossy()))?;
    let out_path = timestamped_path(&dir, "registrar_export", &now, "xlsx");

    let mut workbook = Workbook::new();
    let header = Format::new().set_bold();
    let mut tables = Vec::with_capacity(EXPORT_TABLES.len());
    for table in EXPORT_TABLES {
        let sheet = workbook.add_worksheet();
        let summary = write_table_sheet(conn, table, sheet, &header)
            .with_context(|| format!("failed to export table {}", table))?;
        tables.push(summary);
    }

    workbook.save(&out_path).with_context(|| {
        format!(
            "failed to write workbook {}",
            out_path.to_string_lossy()
        )
    })?;

    Ok(ExportSummary {
        path: out_path,
        format: EXPORT_FORMAT_V1.to_string(),
        tables,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_width_pads_and_caps() {
        assert_eq!(column_width(0), 2);
        assert_eq!(column_width(10), 12);
        assert_eq!(column_width(48), 50);
        assert_eq!(column_width(400), 50);
    }
}
