use crate::ipc::handlers::crud;
use crate::ipc::helpers::{respond, to_json};
use crate::ipc::types::{AppState, Request};
use crate::model::Skill;

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "skills.list" => crud::list::<Skill>(state),
        "skills.create" => crud::create::<Skill>(state, &req.params).and_then(|s| to_json(&s)),
        "skills.update" => crud::update::<Skill>(state, &req.params).and_then(|s| to_json(&s)),
        "skills.delete" => crud::delete::<Skill>(state, &req.params),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
