use crate::model::{Assessment, ClassDailyLog, ClassGroup, Entity, Skill, Student, User};

/// Ordered records of one entity type. Insertion order is what the UI
/// renders, so removals remember their position for rollback.
#[derive(Debug, Clone)]
pub struct Collection<E> {
    items: Vec<E>,
}

impl<E> Default for Collection<E> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<E: Entity> Collection<E> {
    pub fn from_vec(items: Vec<E>) -> Self {
        Self { items }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, E> {
        self.items.iter()
    }

    pub fn as_slice(&self) -> &[E] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.items.iter().position(|e| e.id() == id)
    }

    pub fn get(&self, id: &str) -> Option<&E> {
        self.items.iter().find(|e| e.id() == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.position(id).is_some()
    }

    pub fn push(&mut self, record: E) {
        self.items.push(record);
    }

    /// Replace the record with the same id, returning the previous value.
    pub fn replace(&mut self, record: E) -> Option<E> {
        let idx = self.position(record.id())?;
        Some(std::mem::replace(&mut self.items[idx], record))
    }

    pub fn remove(&mut self, id: &str) -> Option<(usize, E)> {
        let idx = self.position(id)?;
        Some((idx, self.items.remove(idx)))
    }

    pub fn insert_at(&mut self, idx: usize, record: E) {
        let idx = idx.min(self.items.len());
        self.items.insert(idx, record);
    }
}

/// The in-memory collections the UI renders from. Written only by the
/// mutation coordinator and the change-feed listener.
#[derive(Debug, Default, Clone)]
pub struct LocalCache {
    pub classes: Collection<ClassGroup>,
    pub students: Collection<Student>,
    pub skills: Collection<Skill>,
    pub assessments: Collection<Assessment>,
    pub logs: Collection<ClassDailyLog>,
    pub users: Collection<User>,
    version: u64,
}

impl LocalCache {
    /// Monotonic counter bumped on every write; usable as a memo key.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn bump(&mut self) {
        self.version = self.version.wrapping_add(1);
    }

    /// Swap in freshly loaded collections without resetting the version.
    pub fn replace_with(&mut self, fresh: LocalCache) {
        let version = self.version;
        *self = fresh;
        self.version = version.wrapping_add(1);
    }

    pub fn logs_for_class(&self, class_id: &str) -> Vec<&ClassDailyLog> {
        self.logs.iter().filter(|l| l.class_id == class_id).collect()
    }
}

/// Keep a reference only if it still resolves in `collection`.
pub fn validate_ref<E: Entity>(collection: &Collection<E>, id: Option<&str>) -> Option<String> {
    let id = id?;
    if collection.contains(id) {
        Some(id.to_string())
    } else {
        None
    }
}
