use crate::coordinator::{MutationCoordinator, MutationError};
use crate::ipc::error::err;
use crate::ipc::types::AppState;
use crate::model::Entity;
use serde::Serialize;
use serde_json::Value as JsonValue;

#[derive(Debug)]
pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<JsonValue>,
}

impl HandlerErr {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn bad_params(message: impl Into<String>) -> Self {
        Self::new("bad_params", message)
    }

    pub fn response(self, id: &str) -> JsonValue {
        err(id, self.code, self.message, self.details)
    }
}

impl From<MutationError> for HandlerErr {
    fn from(e: MutationError) -> Self {
        Self {
            code: e.code(),
            message: e.to_string(),
            details: e.details(),
        }
    }
}

pub fn required_str(params: &JsonValue, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn optional_str(params: &JsonValue, key: &str) -> Result<Option<String>, HandlerErr> {
    match params.get(key) {
        None | Some(JsonValue::Null) => Ok(None),
        Some(JsonValue::String(s)) if s.trim().is_empty() => Ok(None),
        Some(JsonValue::String(s)) => Ok(Some(s.trim().to_string())),
        Some(_) => Err(HandlerErr::bad_params(format!("{} must be a string", key))),
    }
}

pub fn parse_bool(params: &JsonValue, key: &str, default: bool) -> Result<bool, HandlerErr> {
    match params.get(key) {
        None | Some(JsonValue::Null) => Ok(default),
        Some(v) => v
            .as_bool()
            .ok_or_else(|| HandlerErr::bad_params(format!("{} must be boolean", key))),
    }
}

pub fn to_json<T: Serialize>(value: &T) -> Result<JsonValue, HandlerErr> {
    serde_json::to_value(value).map_err(|e| HandlerErr::new("encode_failed", e.to_string()))
}

pub fn require_workspace(state: &AppState) -> Result<(), HandlerErr> {
    if state.store.is_none() {
        return Err(HandlerErr::new("no_workspace", "select a workspace first"));
    }
    Ok(())
}

pub fn coordinator<E: Entity>(
    state: &mut AppState,
) -> Result<MutationCoordinator<'_, E>, HandlerErr> {
    let store = state
        .store
        .as_deref_mut()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))?;
    Ok(MutationCoordinator::new(&mut state.cache, store))
}

/// Collapse a handler result into the wire response.
pub fn respond(id: &str, result: Result<JsonValue, HandlerErr>) -> JsonValue {
    match result {
        Ok(v) => crate::ipc::error::ok(id, v),
        Err(e) => e.response(id),
    }
}
