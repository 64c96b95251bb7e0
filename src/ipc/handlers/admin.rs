use chrono::Local;
use serde_json::json;
use tracing::{info, warn};

use crate::backup;
use crate::db;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{connect_as, get_optional_str, require_confirm, session_for, to_json};
use crate::ipc::types::{AppState, Request};
use crate::repo::stats;

pub const RESET_PHRASE: &str = "RESET";

fn admin_stats(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let (conn, session) = connect_as(state, params)?;
    to_json(stats::system(&conn, &session)?)
}

fn admin_backup(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let session = session_for(state, params)?;
    session.require_admin()?;
    let Some(workspace) = state.workspace.as_ref() else {
        return Err(HandlerErr::new("no_workspace", "select a workspace first"));
    };
    let db_path = db::db_path(workspace, &state.config);
    let out = backup::backup_database(&db_path, workspace, Local::now()).map_err(HandlerErr::io)?;
    info!(path = %out.to_string_lossy(), "database backed up");
    Ok(json!({ "path": out.to_string_lossy() }))
}

fn admin_export(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let (conn, session) = connect_as(state, params)?;
    session.require_admin()?;
    let Some(workspace) = state.workspace.as_ref() else {
        return Err(HandlerErr::new("no_workspace", "select a workspace first"));
    };
    let summary = backup::export_tables(&conn, workspace, Local::now()).map_err(HandlerErr::io)?;
    info!(path = %summary.path.to_string_lossy(), "tables exported");
    Ok(json!({
        "path": summary.path.to_string_lossy(),
        "format": summary.format,
        "tables": summary.tables.iter().map(|t| json!({
            "name": t.name,
            "rows": t.rows,
            "columnWidths": t.column_widths,
        })).collect::<Vec<_>>(),
    }))
}

/// Wipes the workspace database. Needs both `confirm: true` and the typed
/// phrase; every session, including the caller's, ends.
fn admin_reset(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let session = session_for(state, params)?;
    session.require_admin()?;
    require_confirm(params)?;
    if get_optional_str(params, "confirmPhrase").as_deref() != Some(RESET_PHRASE) {
        return Err(HandlerErr::new(
            "confirmation_required",
            format!("type {} to confirm the reset", RESET_PHRASE),
        ));
    }
    let Some(workspace) = state.workspace.clone() else {
        return Err(HandlerErr::new("no_workspace", "select a workspace first"));
    };

    db::reset_db(&workspace, &state.config).map_err(HandlerErr::io)?;
    let ended = state.sessions.len();
    state.sessions.clear();
    warn!(user_id = session.user_id, sessions_ended = ended, "database reset");
    Ok(json!({ "reset": true, "sessionsEnded": ended }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "admin.stats" => admin_stats(state, &req.params),
        "admin.backup" => admin_backup(state, &req.params),
        "admin.export" => admin_export(state, &req.params),
        "admin.reset" => admin_reset(state, &req.params),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
