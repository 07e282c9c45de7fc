//! Verbs shared by every entity family. Records travel in local
//! (camelCase) form; the coordinator does the remote translation.

use crate::coordinator::{MutationError, PreApproved};
use crate::ids::new_id;
use crate::ipc::helpers::{coordinator, parse_bool, require_workspace, required_str, to_json, HandlerErr};
use crate::ipc::types::AppState;
use crate::model::{Entity, RecordStatus};
use serde_json::{json, Map, Value as JsonValue};

/// Request keys that steer the call rather than describe the record.
const CONTROL_KEYS: &[&str] = &["confirm"];

fn record_fields(params: &JsonValue) -> Result<Map<String, JsonValue>, HandlerErr> {
    let Some(obj) = params.as_object() else {
        return Err(HandlerErr::bad_params("params must be an object"));
    };
    let mut fields = obj.clone();
    for k in CONTROL_KEYS {
        fields.remove(*k);
    }
    Ok(fields)
}

fn decode<E: Entity>(fields: Map<String, JsonValue>) -> Result<E, HandlerErr> {
    serde_json::from_value(JsonValue::Object(fields))
        .map_err(|e| HandlerErr::bad_params(format!("invalid {} record: {}", E::TABLE, e)))
}

pub fn list<E: Entity>(state: &AppState) -> Result<JsonValue, HandlerErr> {
    require_workspace(state)?;
    to_json(&E::collection(&state.cache).as_slice())
}

/// `params` is the new record. An absent or blank id is generated here.
pub fn create<E: Entity>(state: &mut AppState, params: &JsonValue) -> Result<E, HandlerErr> {
    require_workspace(state)?;
    let mut fields = record_fields(params)?;
    let has_id = fields
        .get("id")
        .and_then(|v| v.as_str())
        .is_some_and(|s| !s.trim().is_empty());
    if !has_id {
        fields.insert("id".to_string(), json!(new_id()));
    }
    let record: E = decode(fields)?;
    Ok(coordinator::<E>(state)?.create(record)?)
}

/// `params` carries the id plus the fields to change; everything else is
/// taken from the cached record.
pub fn update<E: Entity>(state: &mut AppState, params: &JsonValue) -> Result<E, HandlerErr> {
    require_workspace(state)?;
    let id = required_str(params, "id")?;
    let Some(existing) = E::collection(&state.cache).get(&id) else {
        return Err(MutationError::NotFound { table: E::TABLE, id }.into());
    };
    let mut merged = match to_json(existing)? {
        JsonValue::Object(m) => m,
        _ => Map::new(),
    };
    for (k, v) in record_fields(params)? {
        if E::WRITE_ONLY.contains(&k.as_str()) && !v.is_string() {
            continue;
        }
        merged.insert(k, v);
    }
    merged.insert("id".to_string(), json!(id));
    let record: E = decode(merged)?;
    Ok(coordinator::<E>(state)?.update(record)?)
}

pub fn delete<E: Entity>(state: &mut AppState, params: &JsonValue) -> Result<JsonValue, HandlerErr> {
    let id = required_str(params, "id")?;
    let confirm = parse_bool(params, "confirm", false)?;
    let outcome = coordinator::<E>(state)?.delete(&id, &mut PreApproved(confirm))?;
    Ok(json!({ "id": id, "outcome": outcome }))
}

/// `status` is the status the caller saw; it defaults to the cached one.
pub fn toggle_status<E: Entity>(state: &mut AppState, params: &JsonValue) -> Result<E, HandlerErr> {
    require_workspace(state)?;
    let id = required_str(params, "id")?;
    let confirm = parse_bool(params, "confirm", false)?;
    let current = match params.get("status") {
        None | Some(JsonValue::Null) => E::collection(&state.cache)
            .get(&id)
            .and_then(|r| r.status())
            .unwrap_or_default(),
        Some(v) => serde_json::from_value::<RecordStatus>(v.clone())
            .map_err(|_| HandlerErr::bad_params("status must be active or inactive"))?,
    };
    Ok(coordinator::<E>(state)?.toggle_status(&id, current, &mut PreApproved(confirm))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::User;
    use crate::store::memory::MemoryStore;

    fn state() -> AppState {
        let mut state = AppState::new();
        state.store = Some(Box::new(MemoryStore::new()));
        state
    }

    #[test]
    fn echoed_user_keeps_its_password() {
        let mut state = state();
        create::<User>(
            &mut state,
            &json!({ "id": "u1", "name": "Prof", "email": "p@escola.test", "password": "secret" }),
        )
        .expect("create");

        let mut edited = to_json(&state.cache.users.get("u1").expect("u1").without_password())
            .expect("json");
        assert!(edited["password"].is_null());
        edited["name"] = json!("Profa. Lima");
        let updated = update::<User>(&mut state, &edited).expect("update");

        assert_eq!(updated.name, "Profa. Lima");
        let cached = state.cache.users.get("u1").expect("u1");
        assert_eq!(cached.password.as_deref(), Some("secret"));
    }

    #[test]
    fn explicit_password_change_is_applied() {
        let mut state = state();
        create::<User>(
            &mut state,
            &json!({ "id": "u1", "name": "Prof", "email": "p@escola.test", "password": "secret" }),
        )
        .expect("create");
        update::<User>(&mut state, &json!({ "id": "u1", "password": "novo" })).expect("update");
        let cached = state.cache.users.get("u1").expect("u1");
        assert_eq!(cached.password.as_deref(), Some("novo"));
    }
}
