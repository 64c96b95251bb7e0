use super::handlers;
use super::types::{AppState, Request};
use crate::ipc::error::err;
use tracing::debug_span;

type Handler = fn(&mut AppState, &Request) -> Option<serde_json::Value>;

const HANDLERS: &[Handler] = &[
    handlers::core::try_handle,
    handlers::auth::try_handle,
    handlers::profile::try_handle,
    handlers::students::try_handle,
    handlers::teachers::try_handle,
    handlers::subjects::try_handle,
    handlers::classes::try_handle,
    handlers::results::try_handle,
    handlers::attendance::try_handle,
    handlers::grades::try_handle,
    handlers::admin::try_handle,
];

pub fn handle_request(state: &mut AppState, req: Request) -> serde_json::Value {
    let _span = debug_span!("request", id = %req.id, method = %req.method).entered();
    for handler in HANDLERS {
        if let Some(resp) = handler(state, &req) {
            return resp;
        }
    }

    err(
        &req.id,
        "not_implemented",
        format!("unknown method: {}", req.method),
        None,
    )
}
