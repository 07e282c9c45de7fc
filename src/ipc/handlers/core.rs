use crate::config::SidecarConfig;
use crate::ipc::helpers::{required_str, respond, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::session::{FileSessionStore, SessionStore};
use crate::store::sqlite::SqliteStore;
use crate::store::RemoteStore;
use crate::sync;
use anyhow::Context;
use serde_json::json;
use std::path::{Path, PathBuf};

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    respond(
        &req.id,
        Ok(json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string()),
            "cacheVersion": state.cache.version(),
        })),
    )
}

fn open_store(path: &Path) -> anyhow::Result<(SidecarConfig, SqliteStore)> {
    std::fs::create_dir_all(path)
        .with_context(|| format!("failed to create workspace {}", path.to_string_lossy()))?;
    let config = SidecarConfig::load(path)?;
    let store = SqliteStore::open(&config.store_path(path), config.remote_timeout())?;
    Ok((config, store))
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let path = PathBuf::from(required_str(&req.params, "path")?);

    let (config, store) = open_store(&path)
        .map_err(|e| HandlerErr::new("store_open_failed", format!("{e:#}")))?;
    let mut store: Box<dyn RemoteStore> = Box::new(store);
    // Subscribe before loading so nothing written in between is missed;
    // replays of loaded rows merge as no-ops.
    let subscription = store
        .subscribe()
        .map_err(|e| HandlerErr::new("store_open_failed", e.to_string()))?;
    let cache = sync::load_all(store.as_mut())
        .map_err(|e| HandlerErr::new("store_open_failed", e.to_string()))?;

    let session = FileSessionStore::new(config.session_path(&path));
    let persisted = match session.load() {
        Ok(u) => u,
        Err(e) => {
            tracing::warn!(reason = %format!("{e:#}"), "ignoring unreadable session");
            None
        }
    };
    let current_user = super::session::restore(&cache, persisted);

    state.close();
    state.cache.replace_with(cache);
    state.config = config;
    state.store = Some(store);
    state.subscription = Some(subscription);
    state.session = Some(Box::new(session));
    state.current_user = current_user;
    state.workspace = Some(path.clone());

    tracing::info!(workspace = %path.to_string_lossy(), "workspace opened");
    Ok(json!({
        "workspacePath": path.to_string_lossy(),
        "counts": {
            "classes": state.cache.classes.len(),
            "students": state.cache.students.len(),
            "skills": state.cache.skills.len(),
            "assessments": state.cache.assessments.len(),
            "logs": state.cache.logs.len(),
            "users": state.cache.users.len(),
        },
        "sessionUser": state.current_user,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(respond(&req.id, handle_workspace_select(state, req))),
        _ => None,
    }
}
