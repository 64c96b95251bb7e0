use serde_json::json;
use tracing::{error, warn};

use crate::error::RepoError;

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

#[derive(Debug)]
pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl HandlerErr {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        HandlerErr {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn bad_params(message: impl Into<String>) -> Self {
        Self::new("bad_params", message)
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// File-level failure from backup, export or reset.
    pub fn io(e: anyhow::Error) -> Self {
        warn!(error = %format!("{e:#}"), "file operation failed");
        Self::new("io_error", format!("{e:#}"))
    }

    pub fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }
}

impl From<RepoError> for HandlerErr {
    fn from(e: RepoError) -> Self {
        match e {
            RepoError::Storage(inner) => {
                // Detail stays in the log; the front end gets a generic message.
                error!(error = %inner, "database operation failed");
                HandlerErr::new("db_error", "database operation failed")
            }
            RepoError::Hash(ref detail) => {
                error!(error = %detail, "password hashing failed");
                HandlerErr::new(e.code(), "password hashing failed")
            }
            other => HandlerErr::new(other.code(), other.to_string()),
        }
    }
}

/// Wraps a handler outcome in the response envelope.
pub fn respond(id: &str, result: Result<serde_json::Value, HandlerErr>) -> serde_json::Value {
    match result {
        Ok(value) => ok(id, value),
        Err(error) => error.response(id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_errors_are_reported_generically() {
        let e: HandlerErr = RepoError::Storage(rusqlite::Error::InvalidQuery).into();
        assert_eq!(e.code, "db_error");
        assert_eq!(e.message, "database operation failed");
    }

    #[test]
    fn error_envelope_carries_details() {
        let v = HandlerErr::new("blocked", "class in use")
            .with_details(json!({ "students": 2 }))
            .response("7");
        assert_eq!(v["ok"], json!(false));
        assert_eq!(v["error"]["code"], json!("blocked"));
        assert_eq!(v["error"]["details"]["students"], json!(2));
    }
}
