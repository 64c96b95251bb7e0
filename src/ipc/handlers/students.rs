use serde_json::json;

use crate::auth::Role;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{connect_as, end_sessions_for, get_optional_str, get_required_i64, parse_params, require_confirm, to_json};
use crate::ipc::types::{AppState, Request};
use crate::repo::students::{self, StudentInput};

fn students_list(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let (conn, session) = connect_as(state, params)?;
    let class_name = get_optional_str(params, "className");
    let rows = students::list(&conn, &session, class_name.as_deref())?;
    Ok(json!({ "students": to_json(rows)? }))
}

fn students_get(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let (conn, session) = connect_as(state, params)?;
    let id = get_required_i64(params, "id")?;
    to_json(students::get(&conn, &session, id)?)
}

fn students_create(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let (conn, session) = connect_as(state, params)?;
    let input: StudentInput = parse_params(params)?;
    let id = students::create(&conn, &session, &input, state.config.auth.hash_scheme)?;
    Ok(json!({ "id": id }))
}

fn students_update(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let (conn, session) = connect_as(state, params)?;
    let id = get_required_i64(params, "id")?;
    let input: StudentInput = parse_params(params)?;
    students::update(&conn, &session, id, &input, state.config.auth.hash_scheme)?;
    // A password reset signs the account out everywhere.
    if input.password.as_deref().is_some_and(|p| !p.trim().is_empty()) {
        end_sessions_for(state, Role::Student, id);
    }
    Ok(json!({ "id": id }))
}

fn students_delete(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let (conn, session) = connect_as(state, params)?;
    let id = get_required_i64(params, "id")?;
    require_confirm(params)?;
    students::delete(&conn, &session, id)?;
    end_sessions_for(state, Role::Student, id);
    Ok(json!({ "deleted": id }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "students.list" => students_list(state, &req.params),
        "students.get" => students_get(state, &req.params),
        "students.create" => students_create(state, &req.params),
        "students.update" => students_update(state, &req.params),
        "students.delete" => students_delete(state, &req.params),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
