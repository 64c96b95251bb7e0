use serde_json::json;

use crate::auth::Role;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{connect_as, end_sessions_for, get_required_i64, parse_params, require_confirm, to_json};
use crate::ipc::types::{AppState, Request};
use crate::repo::teachers::{self, TeacherInput};

fn teachers_list(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let (conn, session) = connect_as(state, params)?;
    let rows = teachers::list(&conn, &session)?;
    Ok(json!({ "teachers": to_json(rows)? }))
}

fn teachers_get(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let (conn, session) = connect_as(state, params)?;
    let id = get_required_i64(params, "id")?;
    to_json(teachers::get(&conn, &session, id)?)
}

fn teachers_create(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let (conn, session) = connect_as(state, params)?;
    let input: TeacherInput = parse_params(params)?;
    let id = teachers::create(&conn, &session, &input, state.config.auth.hash_scheme)?;
    Ok(json!({ "id": id }))
}

fn teachers_update(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let (conn, session) = connect_as(state, params)?;
    let id = get_required_i64(params, "id")?;
    let input: TeacherInput = parse_params(params)?;
    teachers::update(&conn, &session, id, &input, state.config.auth.hash_scheme)?;
    // A password reset signs the account out everywhere.
    if input.password.as_deref().is_some_and(|p| !p.trim().is_empty()) {
        end_sessions_for(state, Role::Teacher, id);
    }
    Ok(json!({ "id": id }))
}

fn teachers_delete(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let (conn, session) = connect_as(state, params)?;
    let id = get_required_i64(params, "id")?;
    require_confirm(params)?;
    teachers::delete(&conn, &session, id)?;
    end_sessions_for(state, Role::Teacher, id);
    Ok(json!({ "deleted": id }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "teachers.list" => teachers_list(state, &req.params),
        "teachers.get" => teachers_get(state, &req.params),
        "teachers.create" => teachers_create(state, &req.params),
        "teachers.update" => teachers_update(state, &req.params),
        "teachers.delete" => teachers_delete(state, &req.params),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
