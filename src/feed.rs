//! Merges changes made by other sessions into the local cache.
//!
//! Inserts are matched by id so a change this session already applied
//! optimistically is not added twice. Updates never create records and
//! deletes of unknown ids do nothing, which keeps replays harmless. A
//! delete that overtakes its own insert lets the insert re-add the
//! record; that gap is accepted.

use crate::cache::LocalCache;
use crate::model::{
    from_remote, to_remote, Assessment, ClassDailyLog, ClassGroup, Entity, Row, Skill, Student,
    Table, User,
};
use crate::store::{ChangeEvent, ChangeKind};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum FeedError {
    #[error("{kind:?} event on {table} carries no record id")]
    MissingRecord { table: Table, kind: ChangeKind },
    #[error("undecodable {table} record: {message}")]
    Decode { table: Table, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeOutcome {
    Inserted,
    Replaced,
    Removed,
    Ignored,
}

pub fn apply_event(cache: &mut LocalCache, event: &ChangeEvent) -> Result<MergeOutcome, FeedError> {
    let outcome = match event.table {
        Table::Classes => merge::<ClassGroup>(cache, event)?,
        Table::Students => merge::<Student>(cache, event)?,
        Table::Skills => merge::<Skill>(cache, event)?,
        Table::Assessments => merge::<Assessment>(cache, event)?,
        Table::ClassLogs => merge::<ClassDailyLog>(cache, event)?,
        Table::Users => merge::<User>(cache, event)?,
    };
    if outcome != MergeOutcome::Ignored {
        cache.bump();
    }
    tracing::debug!(table = %event.table, kind = ?event.kind, ?outcome, "feed event merged");
    Ok(outcome)
}

fn row_id(row: &Row) -> Option<&str> {
    row.get("id").and_then(|v| v.as_str())
}

fn decode<E: Entity>(row: &Row) -> Result<E, FeedError> {
    from_remote(row).map_err(|e| FeedError::Decode {
        table: E::TABLE,
        message: e.to_string(),
    })
}

fn merge<E: Entity>(cache: &mut LocalCache, event: &ChangeEvent) -> Result<MergeOutcome, FeedError> {
    let missing = || FeedError::MissingRecord {
        table: E::TABLE,
        kind: event.kind,
    };

    match event.kind {
        ChangeKind::Insert => {
            let row = event.new.as_ref().ok_or_else(missing)?;
            let record: E = decode(row)?;
            let collection = E::collection_mut(cache);
            if collection.contains(record.id()) {
                return Ok(MergeOutcome::Ignored);
            }
            collection.push(record);
            Ok(MergeOutcome::Inserted)
        }
        ChangeKind::Update => {
            let row = event.new.as_ref().ok_or_else(missing)?;
            let id = row_id(row).ok_or_else(missing)?;
            let Some(existing) = E::collection(cache).get(id) else {
                return Ok(MergeOutcome::Ignored);
            };
            let encode = |r: &E| {
                to_remote(r).map_err(|e| FeedError::Decode {
                    table: E::TABLE,
                    message: e.to_string(),
                })
            };
            // Partial payloads are laid over the record we already hold.
            let current = encode(existing)?;
            let mut merged = current.clone();
            for (k, v) in row {
                merged.insert(k.clone(), v.clone());
            }
            let record: E = decode(&merged)?;
            if encode(&record)? == current {
                return Ok(MergeOutcome::Ignored);
            }
            E::collection_mut(cache).replace(record);
            Ok(MergeOutcome::Replaced)
        }
        ChangeKind::Delete => {
            let id = event
                .old
                .as_ref()
                .and_then(row_id)
                .or_else(|| event.new.as_ref().and_then(row_id))
                .ok_or_else(missing)?;
            match E::collection_mut(cache).remove(id) {
                Some(_) => Ok(MergeOutcome::Removed),
                None => Ok(MergeOutcome::Ignored),
            }
        }
    }
}
