use crate::ipc::handlers::crud;
use crate::ipc::helpers::{optional_str, require_workspace, respond, to_json, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::model::ClassDailyLog;

fn handle_list(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    require_workspace(state)?;
    match optional_str(&req.params, "classId")? {
        Some(class_id) => to_json(&state.cache.logs_for_class(&class_id)),
        None => to_json(&state.cache.logs.as_slice()),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "logs.list" => handle_list(state, req),
        "logs.create" => crud::create::<ClassDailyLog>(state, &req.params).and_then(|l| to_json(&l)),
        "logs.update" => crud::update::<ClassDailyLog>(state, &req.params).and_then(|l| to_json(&l)),
        "logs.delete" => crud::delete::<ClassDailyLog>(state, &req.params),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
