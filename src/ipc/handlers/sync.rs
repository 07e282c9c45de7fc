use crate::feed::apply_event;
use crate::ipc::helpers::{require_workspace, required_str, respond, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::model::{Row, Table};
use crate::store::{ChangeEvent, ChangeKind};
use crate::sync;
use serde_json::json;

fn handle_reload(state: &mut AppState) -> Result<serde_json::Value, HandlerErr> {
    let store = state
        .store
        .as_deref_mut()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))?;
    let fresh = sync::load_all(store).map_err(|e| HandlerErr::new("store_open_failed", e.to_string()))?;
    state.cache.replace_with(fresh);
    Ok(json!({ "cacheVersion": state.cache.version() }))
}

fn handle_poll(state: &mut AppState) -> Result<serde_json::Value, HandlerErr> {
    let (Some(store), Some(sub)) = (state.store.as_deref_mut(), state.subscription) else {
        return Err(HandlerErr::new("no_workspace", "select a workspace first"));
    };
    let applied = sync::drain(&mut state.cache, store, sub)
        .map_err(|e| HandlerErr::new("remote_rejected", e.to_string()))?;
    Ok(json!({ "applied": applied, "cacheVersion": state.cache.version() }))
}

fn optional_row(params: &serde_json::Value, key: &str) -> Result<Option<Row>, HandlerErr> {
    match params.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::Object(m)) => Ok(Some(m.clone())),
        Some(_) => Err(HandlerErr::bad_params(format!("{} must be an object", key))),
    }
}

/// Merge one event delivered by the shell rather than by the store.
fn handle_apply(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    require_workspace(state)?;
    let table_raw = required_str(&req.params, "table")?;
    let table = Table::parse(&table_raw)
        .ok_or_else(|| HandlerErr::bad_params(format!("unknown table: {}", table_raw)))?;
    let kind_raw = required_str(&req.params, "kind")?;
    let kind = ChangeKind::parse(&kind_raw)
        .ok_or_else(|| HandlerErr::bad_params(format!("unknown change kind: {}", kind_raw)))?;
    let event = ChangeEvent {
        table,
        kind,
        new: optional_row(&req.params, "new")?,
        old: optional_row(&req.params, "old")?,
    };
    let outcome = apply_event(&mut state.cache, &event)
        .map_err(|e| HandlerErr::bad_params(e.to_string()))?;
    Ok(json!({ "outcome": outcome, "cacheVersion": state.cache.version() }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "sync.reload" => handle_reload(state),
        "sync.poll" => handle_poll(state),
        "feed.apply" => handle_apply(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
