use crate::ipc::handlers::crud;
use crate::ipc::helpers::{require_workspace, respond, to_json, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::model::{RecordStatus, User};

/// With someone signed in, only admins and coordinators manage the team.
/// Without a session the gate is open; a signed-in user who was since
/// removed or inactivated is refused.
fn ensure_can_manage(state: &AppState) -> Result<(), HandlerErr> {
    let Some(user) = state.current_user.as_ref() else {
        return Ok(());
    };
    let allowed = state
        .cache
        .users
        .get(&user.id)
        .is_some_and(|u| u.status == RecordStatus::Active && u.role.can_manage_team());
    if allowed {
        Ok(())
    } else {
        Err(HandlerErr::new(
            "forbidden",
            "only admins and coordinators can manage users",
        ))
    }
}

fn handle_list(state: &AppState) -> Result<serde_json::Value, HandlerErr> {
    require_workspace(state)?;
    let users: Vec<User> = state.cache.users.iter().map(User::without_password).collect();
    to_json(&users)
}

fn gated<F>(state: &mut AppState, op: F) -> Result<serde_json::Value, HandlerErr>
where
    F: FnOnce(&mut AppState) -> Result<User, HandlerErr>,
{
    ensure_can_manage(state)?;
    let user = op(state)?;
    to_json(&user.without_password())
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let params = &req.params;
    let result = match req.method.as_str() {
        "users.list" => handle_list(state),
        "users.create" => gated(state, |s| crud::create::<User>(s, params)),
        "users.update" => gated(state, |s| crud::update::<User>(s, params)),
        "users.toggleStatus" => gated(state, |s| crud::toggle_status::<User>(s, params)),
        "users.delete" => {
            ensure_can_manage(state).and_then(|_| crud::delete::<User>(state, params))
        }
        _ => return None,
    };
    Some(respond(&req.id, result))
}
