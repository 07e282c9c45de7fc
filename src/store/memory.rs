//! Scriptable in-memory store for unit tests.

use super::{ChangeEvent, ChangeKind, RemoteStore, StoreError, SubscriptionId};
use crate::model::{Row, Table};
use std::collections::{HashMap, VecDeque};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Insert(Table, Row),
    Update(Table, String, Row),
    Delete(Table, String),
}

#[derive(Default)]
pub struct MemoryStore {
    pub tables: HashMap<Table, Vec<Row>>,
    pub calls: Vec<Call>,
    /// Reasons handed out, in order, to the next write calls.
    pub failures: VecDeque<String>,
    pub failing_selects: Vec<Table>,
    feeds: HashMap<u64, Vec<ChangeEvent>>,
    next_sub: u64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next(&mut self, reason: &str) {
        self.failures.push_back(reason.to_string());
    }

    fn take_failure(&mut self) -> Result<(), StoreError> {
        match self.failures.pop_front() {
            Some(reason) => Err(StoreError::Rejected(reason)),
            None => Ok(()),
        }
    }

    fn publish(&mut self, event: ChangeEvent) {
        for queue in self.feeds.values_mut() {
            queue.push(event.clone());
        }
    }

    pub fn rows(&self, table: Table) -> &[Row] {
        self.tables.get(&table).map(|v| v.as_slice()).unwrap_or(&[])
    }
}

fn row_id(row: &Row) -> Option<&str> {
    row.get("id").and_then(|v| v.as_str())
}

impl RemoteStore for MemoryStore {
    fn insert(&mut self, table: Table, row: &Row) -> Result<(), StoreError> {
        self.calls.push(Call::Insert(table, row.clone()));
        self.take_failure()?;
        self.tables.entry(table).or_default().push(row.clone());
        self.publish(ChangeEvent {
            table,
            kind: ChangeKind::Insert,
            new: Some(row.clone()),
            old: None,
        });
        Ok(())
    }

    fn update(&mut self, table: Table, id: &str, patch: &Row) -> Result<(), StoreError> {
        self.calls
            .push(Call::Update(table, id.to_string(), patch.clone()));
        self.take_failure()?;
        let rows = self.tables.entry(table).or_default();
        let Some(row) = rows.iter_mut().find(|r| row_id(r) == Some(id)) else {
            return Ok(());
        };
        let old = row.clone();
        for (k, v) in patch {
            row.insert(k.clone(), v.clone());
        }
        let new = row.clone();
        self.publish(ChangeEvent {
            table,
            kind: ChangeKind::Update,
            new: Some(new),
            old: Some(old),
        });
        Ok(())
    }

    fn delete(&mut self, table: Table, id: &str) -> Result<(), StoreError> {
        self.calls.push(Call::Delete(table, id.to_string()));
        self.take_failure()?;
        let rows = self.tables.entry(table).or_default();
        let Some(idx) = rows.iter().position(|r| row_id(r) == Some(id)) else {
            return Ok(());
        };
        let old = rows.remove(idx);
        self.publish(ChangeEvent {
            table,
            kind: ChangeKind::Delete,
            new: None,
            old: Some(old),
        });
        Ok(())
    }

    fn select_all(&mut self, table: Table) -> Result<Vec<Row>, StoreError> {
        if self.failing_selects.contains(&table) {
            return Err(StoreError::Rejected(format!("relation {} does not exist", table)));
        }
        Ok(self.rows(table).to_vec())
    }

    fn subscribe(&mut self) -> Result<SubscriptionId, StoreError> {
        self.next_sub += 1;
        self.feeds.insert(self.next_sub, Vec::new());
        Ok(SubscriptionId(self.next_sub))
    }

    fn unsubscribe(&mut self, sub: SubscriptionId) {
        self.feeds.remove(&sub.0);
    }

    fn poll(&mut self, sub: SubscriptionId) -> Result<Vec<ChangeEvent>, StoreError> {
        self.feeds
            .get_mut(&sub.0)
            .map(std::mem::take)
            .ok_or_else(|| StoreError::Rejected("unknown subscription".to_string()))
    }
}
