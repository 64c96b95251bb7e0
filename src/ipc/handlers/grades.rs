use serde_json::json;

use crate::grade::GradeBand;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::repo::results::GradeInput;

/// Stateless; needs neither a workspace nor a session.
fn classify(params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let raw = params
        .get("grade")
        .cloned()
        .ok_or_else(|| HandlerErr::bad_params("missing grade"))?;
    let input: GradeInput = serde_json::from_value(raw)
        .map_err(|_| HandlerErr::bad_params("grade must be a number"))?;
    let grade = input.parse()?;
    let band = GradeBand::classify(grade);
    Ok(json!({ "grade": grade, "band": band.as_str() }))
}

pub fn try_handle(_state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "grades.classify" => Some(respond(&req.id, classify(&req.params))),
        _ => None,
    }
}
