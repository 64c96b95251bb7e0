#![allow(dead_code)]

use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

pub const ADMIN_SECRET: &str = "rotated-secret";

pub fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

pub struct Sidecar {
    pub child: Child,
    pub stdin: ChildStdin,
    pub reader: BufReader<ChildStdout>,
    next_id: u64,
}

impl Drop for Sidecar {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

pub fn spawn_sidecar() -> Sidecar {
    let exe = env!("CARGO_BIN_EXE_registrard");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn registrard");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    Sidecar {
        child,
        stdin,
        reader: BufReader::new(stdout),
        next_id: 0,
    }
}

impl Sidecar {
    /// Sends one request and returns the full response envelope.
    pub fn request(&mut self, method: &str, params: serde_json::Value) -> serde_json::Value {
        self.next_id += 1;
        let id = self.next_id.to_string();
        let payload = json!({
            "id": id,
            "method": method,
            "params": params,
        });
        writeln!(self.stdin, "{}", payload).expect("write request");
        self.stdin.flush().expect("flush request");

        let mut line = String::new();
        self.reader.read_line(&mut line).expect("read response line");
        assert!(!line.trim().is_empty(), "empty response for {}", method);
        let value: serde_json::Value =
            serde_json::from_str(line.trim()).expect("parse response json");
        assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id.as_str()));
        value
    }

    pub fn request_ok(&mut self, method: &str, params: serde_json::Value) -> serde_json::Value {
        let value = self.request(method, params);
        assert_eq!(
            value.get("ok").and_then(|v| v.as_bool()),
            Some(true),
            "{} failed: {}",
            method,
            value
        );
        value.get("result").cloned().unwrap_or(serde_json::Value::Null)
    }

    /// Expects a failure and returns its error code.
    pub fn request_err(&mut self, method: &str, params: serde_json::Value) -> String {
        let value = self.request(method, params);
        assert_eq!(
            value.get("ok").and_then(|v| v.as_bool()),
            Some(false),
            "{} unexpectedly succeeded: {}",
            method,
            value
        );
        value
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str())
            .expect("error code")
            .to_string()
    }

    pub fn select_workspace(&mut self, workspace: &std::path::Path) {
        self.request_ok(
            "workspace.select",
            json!({ "path": workspace.to_string_lossy() }),
        );
    }

    pub fn login(&mut self, role: &str, identifier: &str, secret: &str) -> String {
        let res = self.request_ok(
            "auth.login",
            json!({ "role": role, "identifier": identifier, "secret": secret }),
        );
        res.get("session")
            .and_then(|v| v.as_str())
            .expect("session token")
            .to_string()
    }

    /// Logs in as the seeded administrator and completes the forced
    /// password change.
    pub fn admin_session(&mut self) -> String {
        let token = self.login("admin", "admin", "admin123");
        self.request_ok(
            "auth.changePassword",
            json!({
                "session": token,
                "currentSecret": "admin123",
                "newSecret": ADMIN_SECRET,
            }),
        );
        token
    }

    pub fn create_id(&mut self, method: &str, params: serde_json::Value) -> i64 {
        self.request_ok(method, params)
            .get("id")
            .and_then(|v| v.as_i64())
            .expect("created id")
    }
}

/// A small school: two classes, two teachers each teaching one subject in
/// one class, and one student per class.
pub struct School {
    pub admin: String,
    pub teacher_a: i64,
    pub teacher_b: i64,
    pub subject_a: i64,
    pub subject_b: i64,
    pub student_a: i64,
    pub student_b: i64,
}

pub fn seed_school(sc: &mut Sidecar) -> School {
    let admin = sc.admin_session();
    for class in ["1A", "1B"] {
        sc.create_id(
            "classes.create",
            json!({ "session": admin, "className": class, "level": "1" }),
        );
    }
    let teacher_a = sc.create_id(
        "teachers.create",
        json!({
            "session": admin, "teacherId": "T-A", "name": "Teacher A",
            "email": "a@school.test", "subject": "Math", "password": "pass-a"
        }),
    );
    let teacher_b = sc.create_id(
        "teachers.create",
        json!({
            "session": admin, "teacherId": "T-B", "name": "Teacher B",
            "email": "b@school.test", "subject": "Physics", "password": "pass-b"
        }),
    );
    let subject_a = sc.create_id(
        "subjects.create",
        json!({
            "session": admin, "subjectCode": "MATH1", "subjectName": "Math",
            "teacherId": teacher_a, "className": "1A"
        }),
    );
    let subject_b = sc.create_id(
        "subjects.create",
        json!({
            "session": admin, "subjectCode": "PHYS1", "subjectName": "Physics",
            "teacherId": teacher_b, "className": "1B"
        }),
    );
    let student_a = sc.create_id(
        "students.create",
        json!({
            "session": admin, "studentId": "S-A", "cne": "CNE-A", "name": "Student A",
            "className": "1A", "password": "stud-a"
        }),
    );
    let student_b = sc.create_id(
        "students.create",
        json!({
            "session": admin, "studentId": "S-B", "cne": "CNE-B", "name": "Student B",
            "className": "1B", "password": "stud-b"
        }),
    );
    School {
        admin,
        teacher_a,
        teacher_b,
        subject_a,
        subject_b,
        student_a,
        student_b,
    }
}
