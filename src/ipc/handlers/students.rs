use crate::ipc::handlers::crud;
use crate::ipc::helpers::{optional_str, require_workspace, respond, to_json, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::model::Student;

/// Name (case-insensitive) or registration-number match, optionally
/// within one class.
fn handle_list(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    require_workspace(state)?;
    let query = optional_str(&req.params, "query")?.map(|q| q.to_lowercase());
    let class_id = optional_str(&req.params, "classId")?;

    let matches: Vec<&Student> = state
        .cache
        .students
        .iter()
        .filter(|s| {
            class_id
                .as_deref()
                .map_or(true, |c| s.class_id.as_deref() == Some(c))
        })
        .filter(|s| {
            let Some(q) = query.as_deref() else {
                return true;
            };
            s.name.to_lowercase().contains(q)
                || s
                    .registration_number
                    .as_deref()
                    .is_some_and(|r| r.to_lowercase().contains(q))
        })
        .collect();
    to_json(&matches)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "students.list" => handle_list(state, req),
        "students.create" => crud::create::<Student>(state, &req.params).and_then(|s| to_json(&s)),
        "students.update" => crud::update::<Student>(state, &req.params).and_then(|s| to_json(&s)),
        "students.delete" => crud::delete::<Student>(state, &req.params),
        "students.toggleStatus" => {
            crud::toggle_status::<Student>(state, &req.params).and_then(|s| to_json(&s))
        }
        _ => return None,
    };
    Some(respond(&req.id, result))
}
