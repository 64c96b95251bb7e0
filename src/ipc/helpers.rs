use rusqlite::Connection;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::auth::{Role, Session};
use crate::db;
use crate::ipc::error::HandlerErr;
use crate::ipc::types::AppState;

pub fn get_required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn get_required_i64(params: &serde_json::Value, key: &str) -> Result<i64, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_i64())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing or non-integer {}", key)))
}

pub fn get_optional_str(params: &serde_json::Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

/// Deserializes the request params into a repository input type. Unknown
/// keys such as `session` are ignored.
pub fn parse_params<T: DeserializeOwned>(params: &serde_json::Value) -> Result<T, HandlerErr> {
    let value = if params.is_null() {
        serde_json::json!({})
    } else {
        params.clone()
    };
    serde_json::from_value(value).map_err(|e| HandlerErr::bad_params(e.to_string()))
}

pub fn to_json<T: Serialize>(value: T) -> Result<serde_json::Value, HandlerErr> {
    serde_json::to_value(value).map_err(|e| HandlerErr::new("internal", e.to_string()))
}

/// Destructive operations need an explicit `confirm: true`.
pub fn require_confirm(params: &serde_json::Value) -> Result<(), HandlerErr> {
    if params.get("confirm").and_then(|v| v.as_bool()) == Some(true) {
        Ok(())
    } else {
        Err(HandlerErr::new(
            "confirmation_required",
            "pass confirm: true to perform this operation",
        ))
    }
}

pub fn session_token(params: &serde_json::Value) -> Result<String, HandlerErr> {
    get_optional_str(params, "session")
        .ok_or_else(|| HandlerErr::new("unauthorized", "missing session"))
}

/// The session addressed by `params.session`.
pub fn session_for(state: &AppState, params: &serde_json::Value) -> Result<Session, HandlerErr> {
    let token = session_token(params)?;
    state
        .sessions
        .get(&token)
        .cloned()
        .ok_or_else(|| HandlerErr::new("unauthorized", "unknown or expired session"))
}

/// Drops every session held by the given account. Returns how many ended.
pub fn end_sessions_for(state: &mut AppState, role: Role, user_id: i64) -> usize {
    let before = state.sessions.len();
    state
        .sessions
        .retain(|_, s| !(s.role == role && s.user_id == user_id));
    let ended = before - state.sessions.len();
    if ended > 0 {
        tracing::info!(role = role.as_str(), user_id, ended, "sessions ended");
    }
    ended
}

/// Opens a connection for the current request.
pub fn connect(state: &AppState) -> Result<Connection, HandlerErr> {
    let Some(workspace) = state.workspace.as_ref() else {
        return Err(HandlerErr::new("no_workspace", "select a workspace first"));
    };
    db::connect(workspace, &state.config).map_err(|e| {
        tracing::error!(error = %format!("{e:#}"), "failed to open database");
        HandlerErr::new("db_error", "failed to open database")
    })
}

/// Connection plus the caller's session, the preamble of nearly every handler.
pub fn connect_as(state: &AppState, params: &serde_json::Value) -> Result<(Connection, Session), HandlerErr> {
    let session = session_for(state, params)?;
    let conn = connect(state)?;
    Ok((conn, session))
}
