use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{connect_as, to_json};
use crate::ipc::types::{AppState, Request};
use crate::repo::profile;

fn profile_get(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let (conn, session) = connect_as(state, params)?;
    let p = profile::own(&conn, &session)?;
    to_json(p)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "profile.get" => Some(respond(&req.id, profile_get(state, &req.params))),
        _ => None,
    }
}
