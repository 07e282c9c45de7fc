use std::path::PathBuf;

use serde::Deserialize;

use crate::cache::LocalCache;
use crate::config::SidecarConfig;
use crate::model::User;
use crate::session::SessionStore;
use crate::store::{RemoteStore, SubscriptionId};

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Everything the sidecar owns. Handlers get it by reference; nothing
/// else holds on to the cache or the store.
pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub config: SidecarConfig,
    pub cache: LocalCache,
    pub store: Option<Box<dyn RemoteStore>>,
    pub subscription: Option<SubscriptionId>,
    pub session: Option<Box<dyn SessionStore>>,
    pub current_user: Option<User>,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            workspace: None,
            config: SidecarConfig::default(),
            cache: LocalCache::default(),
            store: None,
            subscription: None,
            session: None,
            current_user: None,
        }
    }

    /// Unbind the current workspace, if any.
    pub fn close(&mut self) {
        if let (Some(store), Some(sub)) = (self.store.as_deref_mut(), self.subscription.take()) {
            store.unsubscribe(sub);
        }
        self.store = None;
        self.session = None;
        self.current_user = None;
        self.workspace = None;
        self.cache.replace_with(LocalCache::default());
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
