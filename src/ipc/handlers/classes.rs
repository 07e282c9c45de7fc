use crate::ipc::handlers::crud;
use crate::ipc::helpers::{respond, to_json};
use crate::ipc::types::{AppState, Request};
use crate::model::ClassGroup;

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "classes.list" => crud::list::<ClassGroup>(state),
        "classes.create" => crud::create::<ClassGroup>(state, &req.params).and_then(|c| to_json(&c)),
        "classes.update" => crud::update::<ClassGroup>(state, &req.params).and_then(|c| to_json(&c)),
        "classes.delete" => crud::delete::<ClassGroup>(state, &req.params),
        "classes.toggleStatus" => {
            crud::toggle_status::<ClassGroup>(state, &req.params).and_then(|c| to_json(&c))
        }
        _ => return None,
    };
    Some(respond(&req.id, result))
}
