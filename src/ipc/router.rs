use super::handlers;
use super::types::{AppState, Request};
use crate::ipc::error::err;
use crate::sync;

/// Bring the cache up to date with other sessions before serving `req`.
fn drain_feed(state: &mut AppState) {
    let (Some(store), Some(sub)) = (state.store.as_deref_mut(), state.subscription) else {
        return;
    };
    if let Err(e) = sync::drain(&mut state.cache, store, sub) {
        tracing::warn!(reason = %e, "change feed poll failed");
    }
}

pub fn handle_request(state: &mut AppState, req: Request) -> serde_json::Value {
    // sync.poll drains on its own so it can report what it applied.
    if req.method != "sync.poll" {
        drain_feed(state);
    }

    if let Some(resp) = handlers::core::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::sync::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::classes::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::students::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::skills::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::assessments::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::logs::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::users::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::analytics::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::session::try_handle(state, &req) {
        return resp;
    }

    err(
        &req.id,
        "not_implemented",
        format!("unknown method: {}", req.method),
        None,
    )
}
