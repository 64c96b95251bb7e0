mod test_support;

use serde_json::json;
use test_support::{seed_school, spawn_sidecar, temp_dir};

fn class_id(sc: &mut test_support::Sidecar, admin: &str, name: &str) -> i64 {
    let listed = sc.request_ok("classes.list", json!({ "session": admin }));
    listed["classes"]
        .as_array()
        .expect("classes")
        .iter()
        .find(|c| c["className"] == json!(name))
        .and_then(|c| c["id"].as_i64())
        .expect("class id")
}

#[test]
fn renaming_a_class_moves_students_and_subjects() {
    let workspace = temp_dir("registrar-class-rename");
    let mut sc = spawn_sidecar();
    sc.select_workspace(&workspace);
    let school = seed_school(&mut sc);
    let admin = school.admin.clone();

    let id = class_id(&mut sc, &admin, "1A");
    assert_eq!(
        sc.request_err(
            "classes.update",
            json!({ "session": admin, "id": id, "className": "1B" })
        ),
        "conflict"
    );

    let outcome = sc.request_ok(
        "classes.update",
        json!({ "session": admin, "id": id, "className": "2A", "capacity": 28 }),
    );
    assert_eq!(outcome["renamed"], json!(true));
    assert_eq!(outcome["studentsMoved"], json!(1));
    assert_eq!(outcome["subjectsMoved"], json!(1));

    let student = sc.request_ok(
        "students.get",
        json!({ "session": admin, "id": school.student_a }),
    );
    assert_eq!(student["className"], json!("2A"));
    let subjects = sc.request_ok("subjects.list", json!({ "session": admin }));
    let math = subjects["subjects"]
        .as_array()
        .expect("subjects")
        .iter()
        .find(|s| s["id"] == json!(school.subject_a))
        .cloned()
        .expect("math");
    assert_eq!(math["className"], json!("2A"));
    let empty = sc.request_ok(
        "students.list",
        json!({ "session": admin, "className": "1A" }),
    );
    assert!(empty["students"].as_array().expect("students").is_empty());

    // The teacher of the renamed class still sees it through its subject.
    let teacher = sc.login("teacher", "T-A", "pass-a");
    let classes = sc.request_ok("classes.list", json!({ "session": teacher }));
    let names: Vec<_> = classes["classes"]
        .as_array()
        .expect("classes")
        .iter()
        .map(|c| c["className"].clone())
        .collect();
    assert_eq!(names, vec![json!("2A")]);
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn occupied_classes_cannot_be_deleted() {
    let workspace = temp_dir("registrar-class-delete");
    let mut sc = spawn_sidecar();
    sc.select_workspace(&workspace);
    let school = seed_school(&mut sc);
    let admin = school.admin.clone();

    let occupied = class_id(&mut sc, &admin, "1B");
    assert_eq!(
        sc.request_err("classes.delete", json!({ "session": admin, "id": occupied })),
        "confirmation_required"
    );
    assert_eq!(
        sc.request_err(
            "classes.delete",
            json!({ "session": admin, "id": occupied, "confirm": true })
        ),
        "blocked"
    );
    let still = sc.request_ok("classes.list", json!({ "session": admin }));
    let row = still["classes"]
        .as_array()
        .expect("classes")
        .iter()
        .find(|c| c["id"] == json!(occupied))
        .cloned()
        .expect("class still present");
    assert_eq!(row["studentCount"], json!(1));

    // Removing the only student frees the class; its results and attendance go too.
    sc.create_id(
        "results.add",
        json!({
            "session": admin, "studentId": school.student_b,
            "subjectId": school.subject_b, "grade": 11
        }),
    );
    sc.request_ok(
        "students.delete",
        json!({ "session": admin, "id": school.student_b, "confirm": true }),
    );
    let stats = sc.request_ok("admin.stats", json!({ "session": admin }));
    assert_eq!(stats["results"], json!(0));

    sc.request_ok(
        "classes.delete",
        json!({ "session": admin, "id": occupied, "confirm": true }),
    );
    assert_eq!(
        sc.request_err(
            "classes.delete",
            json!({ "session": admin, "id": occupied, "confirm": true })
        ),
        "not_found"
    );

    let created = sc.create_id(
        "classes.create",
        json!({ "session": admin, "className": "Empty" }),
    );
    sc.request_ok(
        "classes.delete",
        json!({ "session": admin, "id": created, "confirm": true }),
    );
    assert_eq!(
        sc.request_err("classes.create", json!({ "session": admin, "className": "1A" })),
        "conflict"
    );
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn teacher_delete_unassigns_subjects() {
    let workspace = temp_dir("registrar-teacher-delete");
    let mut sc = spawn_sidecar();
    sc.select_workspace(&workspace);
    let school = seed_school(&mut sc);
    let admin = school.admin.clone();

    sc.create_id(
        "results.add",
        json!({
            "session": admin, "studentId": school.student_a,
            "subjectId": school.subject_a, "grade": 17
        }),
    );
    sc.request_ok(
        "teachers.delete",
        json!({ "session": admin, "id": school.teacher_a, "confirm": true }),
    );

    let subjects = sc.request_ok("subjects.list", json!({ "session": admin }));
    let math = subjects["subjects"]
        .as_array()
        .expect("subjects")
        .iter()
        .find(|s| s["id"] == json!(school.subject_a))
        .cloned()
        .expect("subject survives");
    assert!(math["teacherId"].is_null());
    let stats = sc.request_ok("admin.stats", json!({ "session": admin }));
    assert_eq!(stats["results"], json!(0));
    assert_eq!(stats["teachers"], json!(1));
    assert_eq!(
        sc.request_err("auth.login", json!({ "role": "teacher", "identifier": "T-A", "secret": "pass-a" })),
        "invalid_credentials"
    );
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn subject_and_student_deletes_remove_results_and_attendance() {
    let workspace = temp_dir("registrar-delete-cascade");
    let mut sc = spawn_sidecar();
    sc.select_workspace(&workspace);
    let school = seed_school(&mut sc);
    let admin = school.admin.clone();

    for (student, subject) in [(school.student_a, school.subject_a), (school.student_b, school.subject_b)] {
        sc.create_id(
            "results.add",
            json!({ "session": admin, "studentId": student, "subjectId": subject, "grade": 12 }),
        );
        sc.request_ok(
            "attendance.mark",
            json!({
                "session": admin, "date": "2025-02-03", "subjectId": subject,
                "status": "Absent", "studentIds": [student]
            }),
        );
    }
    // Subject-less attendance belongs to the student only.
    sc.request_ok(
        "attendance.mark",
        json!({
            "session": admin, "date": "2025-02-04", "status": "Late",
            "studentIds": [school.student_a, school.student_b]
        }),
    );
    let stats = sc.request_ok("admin.stats", json!({ "session": admin }));
    assert_eq!(stats["results"], json!(2));
    assert_eq!(stats["attendance"], json!(4));

    sc.request_ok(
        "subjects.delete",
        json!({ "session": admin, "id": school.subject_a, "confirm": true }),
    );
    let stats = sc.request_ok("admin.stats", json!({ "session": admin }));
    assert_eq!(stats["subjects"], json!(1));
    assert_eq!(stats["results"], json!(1));
    assert_eq!(stats["attendance"], json!(3));

    sc.request_ok(
        "students.delete",
        json!({ "session": admin, "id": school.student_a, "confirm": true }),
    );
    let stats = sc.request_ok("admin.stats", json!({ "session": admin }));
    assert_eq!(stats["results"], json!(1));
    assert_eq!(stats["attendance"], json!(2));

    sc.request_ok(
        "students.delete",
        json!({ "session": admin, "id": school.student_b, "confirm": true }),
    );
    let stats = sc.request_ok("admin.stats", json!({ "session": admin }));
    assert_eq!(stats["results"], json!(0));
    assert_eq!(stats["attendance"], json!(0));
    let _ = std::fs::remove_dir_all(workspace);
}
