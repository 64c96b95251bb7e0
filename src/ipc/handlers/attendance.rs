use serde_json::json;

use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{connect_as, parse_params, to_json};
use crate::ipc::types::{AppState, Request};
use crate::repo::attendance::{self, AttendanceFilter, MarkRequest};

fn attendance_mark(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let (conn, session) = connect_as(state, params)?;
    let req: MarkRequest = parse_params(params)?;
    to_json(attendance::mark(&conn, &session, &req)?)
}

fn attendance_list(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let (conn, session) = connect_as(state, params)?;
    let filter: AttendanceFilter = parse_params(params)?;
    let rows = attendance::list(&conn, &session, &filter)?;
    Ok(json!({ "attendance": to_json(rows)? }))
}

fn attendance_summary(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let (conn, session) = connect_as(state, params)?;
    let filter: AttendanceFilter = parse_params(params)?;
    to_json(attendance::summary(&conn, &session, &filter)?)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "attendance.mark" => attendance_mark(state, &req.params),
        "attendance.list" => attendance_list(state, &req.params),
        "attendance.summary" => attendance_summary(state, &req.params),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
