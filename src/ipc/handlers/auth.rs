use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::auth::{self, Role, Session};
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{connect, get_required_str, session_for, session_token};
use crate::ipc::types::{AppState, Request};

fn session_json(token: &str, s: &Session) -> serde_json::Value {
    json!({
        "session": token,
        "role": s.role.as_str(),
        "userId": s.user_id,
        "displayName": s.display_name,
        "mustRotate": s.must_rotate,
    })
}

fn login(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let role: Role = get_required_str(params, "role")?.parse()?;
    let identifier = get_required_str(params, "identifier")?;
    let secret = get_required_str(params, "secret")?;

    let conn = connect(state)?;
    let session = auth::authenticate(&conn, &state.config.auth, role, &identifier, &secret)?;
    drop(conn);

    let token = Uuid::new_v4().to_string();
    let out = session_json(&token, &session);
    state.sessions.insert(token, session);
    Ok(out)
}

fn logout(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let token = session_token(params)?;
    let removed = state.sessions.remove(&token);
    if let Some(s) = &removed {
        info!(role = s.role.as_str(), user_id = s.user_id, "logged out");
    }
    Ok(json!({ "loggedOut": removed.is_some() }))
}

fn whoami(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let token = session_token(params)?;
    let session = session_for(state, params)?;
    Ok(session_json(&token, &session))
}

fn change_password(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let token = session_token(params)?;
    let session = session_for(state, params)?;
    let current = get_required_str(params, "currentSecret")?;
    let new_secret = get_required_str(params, "newSecret")?;

    let conn = connect(state)?;
    auth::change_password(&conn, &state.config.auth, &session, &current, &new_secret)?;
    drop(conn);

    if let Some(s) = state.sessions.get_mut(&token) {
        s.must_rotate = false;
    }
    Ok(json!({ "changed": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "auth.login" => login(state, &req.params),
        "auth.logout" => logout(state, &req.params),
        "auth.whoami" => whoami(state, &req.params),
        "auth.changePassword" => change_password(state, &req.params),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
