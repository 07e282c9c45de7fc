use crate::cache::LocalCache;
use crate::ipc::helpers::{require_workspace, required_str, respond, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::model::{RecordStatus, User};
use serde_json::json;

/// Check a persisted session against freshly loaded users. Someone who was
/// removed or inactivated since is signed out.
pub fn restore(cache: &LocalCache, persisted: Option<User>) -> Option<User> {
    let persisted = persisted?;
    match cache.users.get(&persisted.id) {
        Some(user) if user.status == RecordStatus::Active => Some(user.without_password()),
        Some(_) => {
            tracing::info!(user = %persisted.id, "dropping session of inactive user");
            None
        }
        None => {
            tracing::info!(user = %persisted.id, "dropping session of unknown user");
            None
        }
    }
}

/// The signed-in user as the cache currently knows them.
fn current(state: &AppState) -> Option<User> {
    let user = state.current_user.as_ref()?;
    Some(
        state
            .cache
            .users
            .get(&user.id)
            .unwrap_or(user)
            .without_password(),
    )
}

fn handle_get(state: &AppState) -> Result<serde_json::Value, HandlerErr> {
    require_workspace(state)?;
    Ok(json!({ "user": current(state) }))
}

fn handle_set(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    require_workspace(state)?;
    let user_id = required_str(&req.params, "userId")?;
    let Some(user) = state.cache.users.get(&user_id).map(User::without_password) else {
        return Err(HandlerErr::new("not_found", format!("users {} not found", user_id)));
    };
    if user.status == RecordStatus::Inactive {
        return Err(HandlerErr::new("forbidden", "user is inactive"));
    }
    if let Some(session) = state.session.as_ref() {
        session
            .save(&user)
            .map_err(|e| HandlerErr::new("session_write_failed", format!("{e:#}")))?;
    }
    tracing::info!(user = %user.id, role = ?user.role, "session started");
    state.current_user = Some(user.clone());
    Ok(json!({ "user": user }))
}

fn handle_clear(state: &mut AppState) -> Result<serde_json::Value, HandlerErr> {
    require_workspace(state)?;
    if let Some(session) = state.session.as_ref() {
        session
            .clear()
            .map_err(|e| HandlerErr::new("session_write_failed", format!("{e:#}")))?;
    }
    if let Some(user) = state.current_user.take() {
        tracing::info!(user = %user.id, "session cleared");
    }
    Ok(json!({ "user": null }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "session.get" => handle_get(state),
        "session.set" => handle_set(state, req),
        "session.clear" => handle_clear(state),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
