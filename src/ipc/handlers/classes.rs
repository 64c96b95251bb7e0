use serde_json::json;

use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{connect_as, get_required_i64, parse_params, require_confirm, to_json};
use crate::ipc::types::{AppState, Request};
use crate::repo::classes::{self, ClassInput};

fn classes_list(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let (conn, session) = connect_as(state, params)?;
    let rows = classes::list(&conn, &session)?;
    Ok(json!({ "classes": to_json(rows)? }))
}

fn classes_create(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let (conn, session) = connect_as(state, params)?;
    let input: ClassInput = parse_params(params)?;
    let id = classes::create(&conn, &session, &input)?;
    Ok(json!({ "id": id }))
}

/// A changed `className` renames the class and every student and subject
/// that references it.
fn classes_update(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let (conn, session) = connect_as(state, params)?;
    let id = get_required_i64(params, "id")?;
    let input: ClassInput = parse_params(params)?;
    let outcome = classes::update(&conn, &session, id, &input)?;
    to_json(outcome)
}

fn classes_delete(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let (conn, session) = connect_as(state, params)?;
    let id = get_required_i64(params, "id")?;
    require_confirm(params)?;
    classes::delete(&conn, &session, id)?;
    Ok(json!({ "deleted": id }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "classes.list" => classes_list(state, &req.params),
        "classes.create" => classes_create(state, &req.params),
        "classes.update" => classes_update(state, &req.params),
        "classes.delete" => classes_delete(state, &req.params),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
