use crate::db;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::get_required_str;
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;
use tracing::{error, info};

fn health(state: &mut AppState) -> Result<serde_json::Value, HandlerErr> {
    Ok(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string()),
        "sessions": state.sessions.len(),
    }))
}

/// Opens (creating or migrating as needed) the database under `path` and
/// makes it the active workspace.
pub fn select_workspace(state: &mut AppState, path: PathBuf) -> Result<serde_json::Value, HandlerErr> {
    // Validates the schema and seeds the administrator; the connection is
    // dropped again straight away.
    db::open_db(&path, &state.config).map_err(|e| {
        error!(workspace = %path.to_string_lossy(), error = %format!("{e:#}"), "failed to open workspace");
        HandlerErr::new("db_error", "failed to open workspace database")
            .with_details(json!({ "path": path.to_string_lossy() }))
    })?;

    if state.workspace.as_ref() != Some(&path) {
        // Sessions belong to the database they were issued against.
        state.sessions.clear();
    }
    state.workspace = Some(path.clone());
    info!(workspace = %path.to_string_lossy(), "workspace selected");
    Ok(json!({
        "workspacePath": path.to_string_lossy(),
        "dbPath": db::db_path(&path, &state.config).to_string_lossy(),
    }))
}

fn workspace_select(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let path = PathBuf::from(get_required_str(params, "path")?);
    select_workspace(state, path)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "health" => health(state),
        "workspace.select" => workspace_select(state, &req.params),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
