mod test_support;

use serde_json::json;
use std::fs::File;
use std::io::Read;
use std::path::PathBuf;
use test_support::{seed_school, spawn_sidecar, temp_dir};

#[test]
fn backup_copies_the_database_under_backups() {
    let workspace = temp_dir("registrar-admin-backup");
    let mut sc = spawn_sidecar();
    sc.select_workspace(&workspace);
    let school = seed_school(&mut sc);

    let first = sc.request_ok("admin.backup", json!({ "session": school.admin }));
    let second = sc.request_ok("admin.backup", json!({ "session": school.admin }));
    let first = PathBuf::from(first["path"].as_str().expect("path"));
    let second = PathBuf::from(second["path"].as_str().expect("path"));

    assert!(first.is_file());
    assert!(second.is_file());
    // Same-second backups never overwrite each other.
    assert_ne!(first, second);
    assert_eq!(first.parent(), Some(workspace.join("backups").as_path()));
    let name = first.file_name().and_then(|n| n.to_str()).expect("name");
    assert!(name.starts_with("registrar_backup_"));
    assert!(name.ends_with(".sqlite3"));
    assert_eq!(
        std::fs::read(&first).expect("backup").len(),
        std::fs::read(workspace.join("registrar.sqlite3")).expect("db").len()
    );

    let teacher = sc.login("teacher", "T-A", "pass-a");
    assert_eq!(sc.request_err("admin.backup", json!({ "session": teacher })), "forbidden");
    let _ = std::fs::remove_dir_all(workspace);
}

fn xlsx_part(archive: &mut zip::ZipArchive<File>, name: &str) -> String {
    let mut out = String::new();
    archive
        .by_name(name)
        .expect("workbook part")
        .read_to_string(&mut out)
        .expect("read part");
    out
}

#[test]
fn export_writes_one_sheet_per_table_without_password_hashes() {
    let workspace = temp_dir("registrar-admin-export");
    let mut sc = spawn_sidecar();
    sc.select_workspace(&workspace);
    let school = seed_school(&mut sc);

    let res = sc.request_ok("admin.export", json!({ "session": school.admin }));
    let path = PathBuf::from(res["path"].as_str().expect("path"));
    assert_eq!(path.extension().and_then(|e| e.to_str()), Some("xlsx"));
    assert_eq!(res["format"], json!("registrar-xlsx-v1"));
    let tables = res["tables"].as_array().expect("tables");
    assert_eq!(tables.len(), 6);
    let students = tables
        .iter()
        .find(|t| t["name"] == json!("students"))
        .expect("students table");
    assert_eq!(students["rows"], json!(2));
    for w in students["columnWidths"].as_array().expect("widths") {
        let w = w.as_u64().expect("width");
        assert!((2..=50).contains(&w));
    }

    // An .xlsx file is a zip of XML parts.
    let mut archive = zip::ZipArchive::new(File::open(&path).expect("open export")).expect("zip");
    let workbook = xlsx_part(&mut archive, "xl/workbook.xml");
    for name in ["students", "teachers", "subjects", "results", "classes", "attendance"] {
        assert!(workbook.contains(&format!("name=\"{}\"", name)), "sheet {} missing", name);
    }
    assert!(!workbook.contains("name=\"admin\""));

    let strings = xlsx_part(&mut archive, "xl/sharedStrings.xml");
    assert!(strings.contains("student_id"));
    assert!(strings.contains("Student A"));
    assert!(!strings.contains("password_hash"));
    assert!(!strings.contains("$argon2"));

    // Column widths are applied to the sheet itself.
    let sheet = xlsx_part(&mut archive, "xl/worksheets/sheet1.xml");
    assert!(sheet.contains("<cols>"));
    assert!(sheet.contains("customWidth=\"1\""));
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn reset_needs_both_confirmations_and_ends_every_session() {
    let workspace = temp_dir("registrar-admin-reset");
    let mut sc = spawn_sidecar();
    sc.select_workspace(&workspace);
    let school = seed_school(&mut sc);
    let teacher = sc.login("teacher", "T-A", "pass-a");

    assert_eq!(
        sc.request_err("admin.reset", json!({ "session": school.admin })),
        "confirmation_required"
    );
    assert_eq!(
        sc.request_err(
            "admin.reset",
            json!({ "session": school.admin, "confirm": true, "confirmPhrase": "reset" })
        ),
        "confirmation_required"
    );
    assert_eq!(
        sc.request_err(
            "admin.reset",
            json!({ "session": teacher, "confirm": true, "confirmPhrase": "RESET" })
        ),
        "forbidden"
    );
    let stats = sc.request_ok("admin.stats", json!({ "session": school.admin }));
    assert_eq!(stats["students"], json!(2));

    let done = sc.request_ok(
        "admin.reset",
        json!({ "session": school.admin, "confirm": true, "confirmPhrase": "RESET" }),
    );
    assert_eq!(done["reset"], json!(true));
    assert_eq!(done["sessionsEnded"], json!(2));

    assert_eq!(sc.request_err("admin.stats", json!({ "session": school.admin })), "unauthorized");
    assert_eq!(sc.request_err("students.list", json!({ "session": teacher })), "unauthorized");

    // Fresh schema with a fresh seeded administrator awaiting rotation.
    let admin = sc.admin_session();
    let stats = sc.request_ok("admin.stats", json!({ "session": admin }));
    assert_eq!(stats, json!({
        "students": 0, "teachers": 0, "subjects": 0,
        "classes": 0, "results": 0, "attendance": 0
    }));
    let _ = std::fs::remove_dir_all(workspace);
}
