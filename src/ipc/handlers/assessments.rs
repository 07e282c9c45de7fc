use crate::calc;
use crate::ipc::handlers::crud;
use crate::ipc::helpers::{optional_str, require_workspace, respond, to_json, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::model::Assessment;
use serde_json::json;

fn handle_list(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    require_workspace(state)?;
    let class_id = optional_str(&req.params, "classId")?;
    to_json(&calc::assessment_rows(&state.cache, class_id.as_deref()))
}

/// Assessments are dated today unless the caller says otherwise.
fn handle_create(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let mut params = req.params.clone();
    if let Some(obj) = params.as_object_mut() {
        let dated = obj
            .get("date")
            .and_then(|v| v.as_str())
            .is_some_and(|d| !d.trim().is_empty());
        if !dated {
            let today = chrono::Local::now().format("%Y-%m-%d").to_string();
            obj.insert("date".to_string(), json!(today));
        }
    }
    let created = crud::create::<Assessment>(state, &params)?;
    to_json(&created)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "assessments.list" => handle_list(state, req),
        "assessments.create" => handle_create(state, req),
        "assessments.delete" => crud::delete::<Assessment>(state, &req.params),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
