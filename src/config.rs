use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILE: &str = "bnccd.json";
pub const REMOTE_TIMEOUT_ENV: &str = "BNCCD_REMOTE_TIMEOUT_MS";

/// Thresholds for the high-achiever badge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HighAchieverRule {
    pub min_attendance_percent: f64,
    pub min_exam_average: f64,
    pub min_exceeded_count: usize,
}

impl Default for HighAchieverRule {
    fn default() -> Self {
        Self {
            min_attendance_percent: 90.0,
            min_exam_average: 9.0,
            min_exceeded_count: 2,
        }
    }
}

/// Per-workspace sidecar settings, read from `bnccd.json` next to the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SidecarConfig {
    pub remote_timeout_ms: u64,
    pub session_file: String,
    pub store_file: String,
    pub high_achiever: HighAchieverRule,
}

impl Default for SidecarConfig {
    fn default() -> Self {
        Self {
            remote_timeout_ms: 5000,
            session_file: "session.json".to_string(),
            store_file: "bncc.sqlite3".to_string(),
            high_achiever: HighAchieverRule::default(),
        }
    }
}

impl SidecarConfig {
    pub fn load(workspace: &Path) -> anyhow::Result<Self> {
        let path = workspace.join(CONFIG_FILE);
        let mut cfg = if path.is_file() {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read {}", path.to_string_lossy()))?;
            serde_json::from_str::<SidecarConfig>(&text)
                .with_context(|| format!("invalid config {}", path.to_string_lossy()))?
        } else {
            SidecarConfig::default()
        };
        cfg.apply_env(std::env::var(REMOTE_TIMEOUT_ENV).ok().as_deref());
        Ok(cfg)
    }

    fn apply_env(&mut self, timeout: Option<&str>) {
        let Some(raw) = timeout else {
            return;
        };
        match raw.trim().parse::<u64>() {
            Ok(ms) => self.remote_timeout_ms = ms,
            Err(_) => tracing::warn!(value = raw, "ignoring invalid {}", REMOTE_TIMEOUT_ENV),
        }
    }

    pub fn remote_timeout(&self) -> Duration {
        Duration::from_millis(self.remote_timeout_ms)
    }

    pub fn store_path(&self, workspace: &Path) -> PathBuf {
        workspace.join(&self.store_file)
    }

    pub fn session_path(&self, workspace: &Path) -> PathBuf {
        workspace.join(&self.session_file)
    }
}
