//! Initial load of the local cache and draining of the change feed.

use crate::cache::{Collection, LocalCache};
use crate::feed::{apply_event, MergeOutcome};
use crate::model::{from_remote, Entity, Table};
use crate::store::{RemoteStore, StoreError, SubscriptionId};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
#[error("failed to load {table}: {source}")]
pub struct LoadError {
    pub table: Table,
    pub source: StoreError,
}

fn load_table<E: Entity>(store: &mut dyn RemoteStore) -> Result<Collection<E>, LoadError> {
    let rows = store.select_all(E::TABLE).map_err(|source| LoadError {
        table: E::TABLE,
        source,
    })?;
    let mut records = Vec::with_capacity(rows.len());
    for row in &rows {
        match from_remote::<E>(row) {
            Ok(r) => records.push(r),
            Err(e) => tracing::warn!(table = %E::TABLE, reason = %e, "skipping undecodable row"),
        }
    }
    Ok(Collection::from_vec(records))
}

/// Fetch every collection. The users table is allowed to fail (the team
/// screen simply starts empty); any other failure aborts the load.
pub fn load_all(store: &mut dyn RemoteStore) -> Result<LocalCache, LoadError> {
    let mut cache = LocalCache::default();
    cache.classes = load_table(store)?;
    cache.students = load_table(store)?;
    cache.skills = load_table(store)?;
    cache.assessments = load_table(store)?;
    cache.logs = load_table(store)?;
    match load_table(store) {
        Ok(users) => cache.users = users,
        Err(e) => tracing::warn!(reason = %e.source, "users unavailable; continuing without them"),
    }
    cache.bump();
    tracing::info!(
        classes = cache.classes.len(),
        students = cache.students.len(),
        skills = cache.skills.len(),
        assessments = cache.assessments.len(),
        logs = cache.logs.len(),
        users = cache.users.len(),
        "cache loaded"
    );
    Ok(cache)
}

/// Apply every pending feed event. Returns how many changed the cache.
/// Malformed events are logged and skipped.
pub fn drain(
    cache: &mut LocalCache,
    store: &mut dyn RemoteStore,
    sub: SubscriptionId,
) -> Result<usize, StoreError> {
    let events = store.poll(sub)?;
    let mut changed = 0;
    for event in &events {
        match apply_event(cache, event) {
            Ok(MergeOutcome::Ignored) => {}
            Ok(_) => changed += 1,
            Err(e) => tracing::warn!(table = %event.table, reason = %e, "dropping feed event"),
        }
    }
    Ok(changed)
}
