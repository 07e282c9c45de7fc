//! The hosted persistence layer as the core sees it.

pub mod sqlite;

#[cfg(test)]
pub mod memory;

use crate::model::{Row, Table};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("{0}")]
    Rejected(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

impl ChangeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ChangeKind::Insert => "INSERT",
            ChangeKind::Update => "UPDATE",
            ChangeKind::Delete => "DELETE",
        }
    }

    pub fn parse(raw: &str) -> Option<ChangeKind> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "INSERT" => Some(ChangeKind::Insert),
            "UPDATE" => Some(ChangeKind::Update),
            "DELETE" => Some(ChangeKind::Delete),
            _ => None,
        }
    }
}

/// One push notification. Rows are in remote (snake_case) form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub table: Table,
    pub kind: ChangeKind,
    #[serde(default)]
    pub new: Option<Row>,
    #[serde(default)]
    pub old: Option<Row>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Remote store contract. Writes either succeed as a whole or return the
/// store's reason; nothing here retries.
pub trait RemoteStore {
    fn insert(&mut self, table: Table, row: &Row) -> Result<(), StoreError>;

    fn update(&mut self, table: Table, id: &str, patch: &Row) -> Result<(), StoreError>;

    fn delete(&mut self, table: Table, id: &str) -> Result<(), StoreError>;

    fn select_all(&mut self, table: Table) -> Result<Vec<Row>, StoreError>;

    /// Start receiving changes made after this call.
    fn subscribe(&mut self) -> Result<SubscriptionId, StoreError>;

    fn unsubscribe(&mut self, sub: SubscriptionId);

    /// Changes delivered to `sub` since the last poll, oldest first.
    fn poll(&mut self, sub: SubscriptionId) -> Result<Vec<ChangeEvent>, StoreError>;
}
