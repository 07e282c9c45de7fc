use crate::model::User;
use anyhow::Context;
use std::path::PathBuf;

/// Persists the signed-in user across restarts. The password is never
/// written.
pub trait SessionStore {
    fn load(&self) -> anyhow::Result<Option<User>>;
    fn save(&self, user: &User) -> anyhow::Result<()>;
    fn clear(&self) -> anyhow::Result<()>;
}

pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl SessionStore for FileSessionStore {
    fn load(&self) -> anyhow::Result<Option<User>> {
        if !self.path.is_file() {
            return Ok(None);
        }
        let text = std::fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read {}", self.path.to_string_lossy()))?;
        let user: User = serde_json::from_str(&text)
            .with_context(|| format!("invalid session file {}", self.path.to_string_lossy()))?;
        Ok(Some(user.without_password()))
    }

    fn save(&self, user: &User) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.to_string_lossy()))?;
        }
        let text = serde_json::to_string_pretty(&user.without_password())?;
        std::fs::write(&self.path, text)
            .with_context(|| format!("failed to write {}", self.path.to_string_lossy()))
    }

    fn clear(&self) -> anyhow::Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e)
                .with_context(|| format!("failed to remove {}", self.path.to_string_lossy())),
        }
    }
}
