use serde_json::json;

use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{connect_as, get_required_i64, parse_params, require_confirm, to_json};
use crate::ipc::types::{AppState, Request};
use crate::repo::results::{self, ResultFilter, ResultInput, ResultPatch};

fn results_add(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let (conn, session) = connect_as(state, params)?;
    let input: ResultInput = parse_params(params)?;
    let id = results::add(&conn, &session, &input)?;
    Ok(json!({ "id": id }))
}

fn results_list(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let (conn, session) = connect_as(state, params)?;
    let filter: ResultFilter = parse_params(params)?;
    let rows = results::list(&conn, &session, &filter)?;
    Ok(json!({ "results": to_json(rows)? }))
}

fn results_update(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let (conn, session) = connect_as(state, params)?;
    let id = get_required_i64(params, "id")?;
    let patch: ResultPatch = parse_params(params)?;
    results::update(&conn, &session, id, &patch)?;
    Ok(json!({ "id": id }))
}

fn results_delete(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let (conn, session) = connect_as(state, params)?;
    let id = get_required_i64(params, "id")?;
    require_confirm(params)?;
    results::delete(&conn, &session, id)?;
    Ok(json!({ "deleted": id }))
}

fn results_summary(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let (conn, session) = connect_as(state, params)?;
    let filter: ResultFilter = parse_params(params)?;
    to_json(results::summary(&conn, &session, &filter)?)
}

fn results_filter_options(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let (conn, session) = connect_as(state, params)?;
    to_json(results::filter_options(&conn, &session)?)
}

fn results_students_overview(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let (conn, session) = connect_as(state, params)?;
    let rows = results::students_overview(&conn, &session)?;
    Ok(json!({ "students": to_json(rows)? }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "results.add" => results_add(state, &req.params),
        "results.list" => results_list(state, &req.params),
        "results.update" => results_update(state, &req.params),
        "results.delete" => results_delete(state, &req.params),
        "results.summary" => results_summary(state, &req.params),
        "results.filterOptions" => results_filter_options(state, &req.params),
        "results.studentsOverview" => results_students_overview(state, &req.params),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
