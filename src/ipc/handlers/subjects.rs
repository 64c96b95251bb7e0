use serde_json::json;

use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{connect_as, get_required_i64, parse_params, require_confirm, to_json};
use crate::ipc::types::{AppState, Request};
use crate::repo::subjects::{self, SubjectInput};

fn subjects_list(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let (conn, session) = connect_as(state, params)?;
    let rows = subjects::list(&conn, &session)?;
    Ok(json!({ "subjects": to_json(rows)? }))
}

fn subjects_create(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let (conn, session) = connect_as(state, params)?;
    let input: SubjectInput = parse_params(params)?;
    let id = subjects::create(&conn, &session, &input)?;
    Ok(json!({ "id": id }))
}

fn subjects_update(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let (conn, session) = connect_as(state, params)?;
    let id = get_required_i64(params, "id")?;
    let input: SubjectInput = parse_params(params)?;
    subjects::update(&conn, &session, id, &input)?;
    Ok(json!({ "id": id }))
}

fn subjects_delete(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let (conn, session) = connect_as(state, params)?;
    let id = get_required_i64(params, "id")?;
    require_confirm(params)?;
    subjects::delete(&conn, &session, id)?;
    Ok(json!({ "deleted": id }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "subjects.list" => subjects_list(state, &req.params),
        "subjects.create" => subjects_create(state, &req.params),
        "subjects.update" => subjects_update(state, &req.params),
        "subjects.delete" => subjects_delete(state, &req.params),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
