//! Optimistic create/update/delete with rollback, generic over entity type.
//!
//! Every write is applied to the local cache first, then sent to the remote
//! store. A rejected write restores the cache to what it was before the
//! call and surfaces the store's reason. Nothing is retried.

use crate::cache::LocalCache;
use crate::model::{diff_rows, to_remote, Entity, RecordStatus, Table};
use crate::store::{RemoteStore, StoreError};
use serde::Serialize;
use std::marker::PhantomData;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptAction {
    Inactivate,
    Activate,
}

/// The yes/no decision put to the operator before a status flip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmPrompt {
    pub table: String,
    pub id: String,
    pub action: PromptAction,
    /// Records that keep this one from being removed outright.
    pub dependents: usize,
}

pub trait Confirmer {
    fn confirm(&mut self, prompt: &ConfirmPrompt) -> bool;
}

/// Answer decided ahead of time, e.g. a `confirm` flag on a request.
pub struct PreApproved(pub bool);

impl Confirmer for PreApproved {
    fn confirm(&mut self, _prompt: &ConfirmPrompt) -> bool {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum MutationError {
    #[error("{table}: {reason}")]
    RemoteRejected { table: Table, reason: String },
    #[error("missing or invalid field: {field}")]
    ValidationFailed { field: &'static str },
    /// Hard delete refused because of dependents and the soft delete that
    /// replaces it was not confirmed.
    #[error("{} has {} dependent record(s); confirm to inactivate", .prompt.table, .prompt.dependents)]
    DependencyBlocked { prompt: ConfirmPrompt },
    #[error("status change on {} not confirmed", .prompt.table)]
    Declined { prompt: ConfirmPrompt },
    #[error("{table} {id} not found")]
    NotFound { table: Table, id: String },
    #[error("failed to encode {table} record: {message}")]
    Encode { table: Table, message: String },
}

impl MutationError {
    pub fn code(&self) -> &'static str {
        match self {
            MutationError::RemoteRejected { .. } => "remote_rejected",
            MutationError::ValidationFailed { .. } => "validation_failed",
            MutationError::DependencyBlocked { .. } | MutationError::Declined { .. } => {
                "confirm_required"
            }
            MutationError::NotFound { .. } => "not_found",
            MutationError::Encode { .. } => "encode_failed",
        }
    }

    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            MutationError::ValidationFailed { field } => Some(serde_json::json!({ "field": field })),
            MutationError::DependencyBlocked { prompt } | MutationError::Declined { prompt } => {
                Some(serde_json::json!({ "prompt": prompt }))
            }
            MutationError::RemoteRejected { table, .. } => {
                Some(serde_json::json!({ "table": table.as_str() }))
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteOutcome {
    HardDeleted,
    Inactivated,
}

pub struct MutationCoordinator<'a, E> {
    cache: &'a mut LocalCache,
    store: &'a mut dyn RemoteStore,
    _entity: PhantomData<E>,
}

impl<'a, E: Entity> MutationCoordinator<'a, E> {
    pub fn new(cache: &'a mut LocalCache, store: &'a mut dyn RemoteStore) -> Self {
        Self {
            cache,
            store,
            _entity: PhantomData,
        }
    }

    fn encode(record: &E) -> Result<crate::model::Row, MutationError> {
        to_remote(record).map_err(|e| MutationError::Encode {
            table: E::TABLE,
            message: e.to_string(),
        })
    }

    fn rejected(e: StoreError) -> MutationError {
        MutationError::RemoteRejected {
            table: E::TABLE,
            reason: e.to_string(),
        }
    }

    fn guard(&self, record: &mut E) {
        for field in record.guard_refs(&*self.cache) {
            tracing::debug!(table = %E::TABLE, id = record.id(), field, "cleared stale reference");
        }
    }

    pub fn create(&mut self, mut record: E) -> Result<E, MutationError> {
        record
            .validate()
            .map_err(|field| MutationError::ValidationFailed { field })?;
        if record.id().trim().is_empty() || E::collection(self.cache).contains(record.id()) {
            return Err(MutationError::ValidationFailed { field: "id" });
        }
        self.guard(&mut record);
        let row = Self::encode(&record)?;

        E::collection_mut(self.cache).push(record.clone());
        self.cache.bump();

        if let Err(e) = self.store.insert(E::TABLE, &row) {
            E::collection_mut(self.cache).remove(record.id());
            self.cache.bump();
            tracing::warn!(table = %E::TABLE, id = record.id(), reason = %e, "create rolled back");
            return Err(Self::rejected(e));
        }
        Ok(record)
    }

    pub fn update(&mut self, mut record: E) -> Result<E, MutationError> {
        record
            .validate()
            .map_err(|field| MutationError::ValidationFailed { field })?;
        let Some(snapshot) = E::collection(self.cache).get(record.id()).cloned() else {
            return Err(MutationError::NotFound {
                table: E::TABLE,
                id: record.id().to_string(),
            });
        };
        self.guard(&mut record);
        let patch = diff_rows(&Self::encode(&snapshot)?, &Self::encode(&record)?);

        E::collection_mut(self.cache).replace(record.clone());
        self.cache.bump();

        if patch.is_empty() {
            return Ok(record);
        }
        if let Err(e) = self.store.update(E::TABLE, record.id(), &patch) {
            E::collection_mut(self.cache).replace(snapshot);
            self.cache.bump();
            tracing::warn!(table = %E::TABLE, id = record.id(), reason = %e, "update rolled back");
            return Err(Self::rejected(e));
        }
        Ok(record)
    }

    /// Soft delete when other records depend on `id` (after confirmation),
    /// hard delete otherwise. A class is only removed once no student
    /// points at it.
    pub fn delete(
        &mut self,
        id: &str,
        confirmer: &mut dyn Confirmer,
    ) -> Result<DeleteOutcome, MutationError> {
        let Some(existing) = E::collection(self.cache).get(id).cloned() else {
            return Err(MutationError::NotFound {
                table: E::TABLE,
                id: id.to_string(),
            });
        };

        let dependents = E::dependents(self.cache, id);
        if dependents > 0 && existing.status().is_some() {
            let prompt = ConfirmPrompt {
                table: E::TABLE.as_str().to_string(),
                id: id.to_string(),
                action: PromptAction::Inactivate,
                dependents,
            };
            if !confirmer.confirm(&prompt) {
                return Err(MutationError::DependencyBlocked { prompt });
            }
            let mut inactive = existing;
            inactive.set_status(RecordStatus::Inactive);
            self.update(inactive)?;
            return Ok(DeleteOutcome::Inactivated);
        }

        let Some((idx, removed)) = E::collection_mut(self.cache).remove(id) else {
            return Err(MutationError::NotFound {
                table: E::TABLE,
                id: id.to_string(),
            });
        };
        self.cache.bump();

        if let Err(e) = self.store.delete(E::TABLE, id) {
            E::collection_mut(self.cache).insert_at(idx, removed);
            self.cache.bump();
            tracing::warn!(table = %E::TABLE, id, reason = %e, "delete rolled back");
            return Err(Self::rejected(e));
        }
        Ok(DeleteOutcome::HardDeleted)
    }

    /// Flip active/inactive starting from `current`. Always asks first.
    pub fn toggle_status(
        &mut self,
        id: &str,
        current: RecordStatus,
        confirmer: &mut dyn Confirmer,
    ) -> Result<E, MutationError> {
        let Some(mut record) = E::collection(self.cache).get(id).cloned() else {
            return Err(MutationError::NotFound {
                table: E::TABLE,
                id: id.to_string(),
            });
        };
        if record.status().is_none() {
            return Err(MutationError::ValidationFailed { field: "status" });
        }
        let target = current.toggled();
        let prompt = ConfirmPrompt {
            table: E::TABLE.as_str().to_string(),
            id: id.to_string(),
            action: match target {
                RecordStatus::Active => PromptAction::Activate,
                RecordStatus::Inactive => PromptAction::Inactivate,
            },
            dependents: E::dependents(self.cache, id),
        };
        if !confirmer.confirm(&prompt) {
            return Err(MutationError::Declined { prompt });
        }
        record.set_status(target);
        self.update(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Assessment, AssessmentStatus, ClassDailyLog, ClassGroup, Skill, Student, User};
    use crate::store::memory::{Call, MemoryStore};
    use serde_json::json;

    struct Recording {
        answer: bool,
        prompts: Vec<ConfirmPrompt>,
    }

    impl Confirmer for Recording {
        fn confirm(&mut self, prompt: &ConfirmPrompt) -> bool {
            self.prompts.push(prompt.clone());
            self.answer
        }
    }

    fn class(id: &str) -> ClassGroup {
        serde_json::from_value(json!({ "id": id, "name": "1º Ano A", "year": 2024 }))
            .expect("class")
    }

    fn student(id: &str, class_id: Option<&str>) -> Student {
        serde_json::from_value(json!({ "id": id, "name": "Ana", "classId": class_id }))
            .expect("student")
    }

    fn assessment(id: &str, student_id: &str) -> Assessment {
        Assessment {
            id: id.into(),
            student_id: student_id.into(),
            skill_id: None,
            date: "2024-04-01".into(),
            status: AssessmentStatus::InProgress,
            term: None,
            participation_score: None,
            behavior_score: None,
            exam_score: None,
            notes: None,
        }
    }

    fn seeded() -> (LocalCache, MemoryStore) {
        let mut cache = LocalCache::default();
        let mut store = MemoryStore::new();
        MutationCoordinator::<ClassGroup>::new(&mut cache, &mut store)
            .create(class("c1"))
            .expect("seed class");
        store.calls.clear();
        (cache, store)
    }

    #[test]
    fn rejected_create_leaves_cache_as_before() {
        let (mut cache, mut store) = seeded();
        let before = cache.students.len();
        store.fail_next("fk violation");

        let err = MutationCoordinator::<Student>::new(&mut cache, &mut store)
            .create(student("s1", Some("c1")))
            .expect_err("rejected");

        assert!(err.to_string().contains("fk violation"), "{}", err);
        assert_eq!(err.code(), "remote_rejected");
        assert!(!cache.students.contains("s1"));
        assert_eq!(cache.students.len(), before);
    }

    #[test]
    fn committed_create_keeps_optimistic_values() {
        let (mut cache, mut store) = seeded();
        let s = student("s1", Some("c1"));
        MutationCoordinator::<Student>::new(&mut cache, &mut store)
            .create(s.clone())
            .expect("create");
        assert_eq!(cache.students.get("s1"), Some(&s));
        assert_eq!(store.rows(Table::Students).len(), 1);
    }

    #[test]
    fn validation_runs_before_any_mutation() {
        let (mut cache, mut store) = seeded();
        let mut s = student("s1", None);
        s.name = "  ".into();
        let err = MutationCoordinator::<Student>::new(&mut cache, &mut store)
            .create(s)
            .expect_err("invalid");
        assert_eq!(err, MutationError::ValidationFailed { field: "name" });
        assert!(store.calls.is_empty());
        assert!(cache.students.is_empty());
    }

    #[test]
    fn duplicate_id_is_refused() {
        let (mut cache, mut store) = seeded();
        let err = MutationCoordinator::<ClassGroup>::new(&mut cache, &mut store)
            .create(class("c1"))
            .expect_err("dup");
        assert_eq!(err, MutationError::ValidationFailed { field: "id" });
    }

    #[test]
    fn dangling_class_reference_is_nulled_before_sending() {
        let (mut cache, mut store) = seeded();
        let created = MutationCoordinator::<Student>::new(&mut cache, &mut store)
            .create(student("s1", Some("gone")))
            .expect("create");
        assert_eq!(created.class_id, None);
        match &store.calls[0] {
            Call::Insert(Table::Students, row) => {
                assert_eq!(row.get("class_id"), Some(&serde_json::Value::Null))
            }
            other => panic!("unexpected call {:?}", other),
        }
    }

    #[test]
    fn stale_teacher_ids_are_dropped() {
        let (mut cache, mut store) = seeded();
        let teacher: User = serde_json::from_value(json!({
            "id": "u1", "name": "Prof", "email": "p@escola.br", "role": "teacher"
        }))
        .expect("user");
        MutationCoordinator::<User>::new(&mut cache, &mut store)
            .create(teacher)
            .expect("user");
        let mut c = class("c2");
        c.teacher_ids = vec!["u1".into(), "ghost".into()];
        c.focus_skills = vec!["k1".into(), "k1".into(), "k2".into()];
        let created = MutationCoordinator::<ClassGroup>::new(&mut cache, &mut store)
            .create(c)
            .expect("class");
        assert_eq!(created.teacher_ids, vec!["u1".to_string()]);
        assert_eq!(created.focus_skills, vec!["k1".to_string(), "k2".to_string()]);
    }

    #[test]
    fn update_sends_only_changed_columns() {
        let (mut cache, mut store) = seeded();
        let mut c = class("c1");
        c.grade = "2".into();
        MutationCoordinator::<ClassGroup>::new(&mut cache, &mut store)
            .update(c)
            .expect("update");
        match &store.calls[0] {
            Call::Update(Table::Classes, id, patch) => {
                assert_eq!(id, "c1");
                assert_eq!(patch.len(), 1);
                assert_eq!(patch.get("grade"), Some(&json!("2")));
            }
            other => panic!("unexpected call {:?}", other),
        }
    }

    #[test]
    fn unchanged_update_skips_the_store() {
        let (mut cache, mut store) = seeded();
        MutationCoordinator::<ClassGroup>::new(&mut cache, &mut store)
            .update(class("c1"))
            .expect("update");
        assert!(store.calls.is_empty());
    }

    #[test]
    fn rejected_update_restores_snapshot() {
        let (mut cache, mut store) = seeded();
        let mut c = class("c1");
        c.name = "Renamed".into();
        store.fail_next("permission denied");
        let err = MutationCoordinator::<ClassGroup>::new(&mut cache, &mut store)
            .update(c)
            .expect_err("rejected");
        assert_eq!(err.code(), "remote_rejected");
        assert_eq!(cache.classes.get("c1").map(|c| c.name.as_str()), Some("1º Ano A"));
    }

    #[test]
    fn class_with_students_is_inactivated_after_confirmation() {
        let (mut cache, mut store) = seeded();
        MutationCoordinator::<Student>::new(&mut cache, &mut store)
            .create(student("s1", Some("c1")))
            .expect("student");

        let mut confirmer = Recording {
            answer: true,
            prompts: Vec::new(),
        };
        let outcome = MutationCoordinator::<ClassGroup>::new(&mut cache, &mut store)
            .delete("c1", &mut confirmer)
            .expect("delete");

        assert_eq!(outcome, DeleteOutcome::Inactivated);
        assert_eq!(confirmer.prompts.len(), 1);
        assert_eq!(confirmer.prompts[0].action, PromptAction::Inactivate);
        assert_eq!(confirmer.prompts[0].dependents, 1);
        let c = cache.classes.get("c1").expect("still present");
        assert_eq!(c.status, RecordStatus::Inactive);
    }

    #[test]
    fn declined_soft_delete_changes_nothing() {
        let (mut cache, mut store) = seeded();
        MutationCoordinator::<Student>::new(&mut cache, &mut store)
            .create(student("s1", Some("c1")))
            .expect("student");
        store.calls.clear();

        let err = MutationCoordinator::<ClassGroup>::new(&mut cache, &mut store)
            .delete("c1", &mut PreApproved(false))
            .expect_err("blocked");
        assert!(matches!(err, MutationError::DependencyBlocked { .. }));
        assert_eq!(err.code(), "confirm_required");
        assert!(store.calls.is_empty());
        assert_eq!(
            cache.classes.get("c1").map(|c| c.status),
            Some(RecordStatus::Active)
        );
    }

    #[test]
    fn empty_class_is_removed() {
        let (mut cache, mut store) = seeded();
        let outcome = MutationCoordinator::<ClassGroup>::new(&mut cache, &mut store)
            .delete("c1", &mut PreApproved(false))
            .expect("delete");
        assert_eq!(outcome, DeleteOutcome::HardDeleted);
        assert!(!cache.classes.contains("c1"));
        assert!(store.rows(Table::Classes).is_empty());
    }

    #[test]
    fn class_with_only_daily_logs_is_removed() {
        let (mut cache, mut store) = seeded();
        let log: ClassDailyLog = serde_json::from_value(json!({
            "id": "l1", "classId": "c1", "date": "2024-04-01", "attendance": {}
        }))
        .expect("log");
        MutationCoordinator::<ClassDailyLog>::new(&mut cache, &mut store)
            .create(log)
            .expect("log");

        let mut confirmer = Recording {
            answer: false,
            prompts: Vec::new(),
        };
        let outcome = MutationCoordinator::<ClassGroup>::new(&mut cache, &mut store)
            .delete("c1", &mut confirmer)
            .expect("delete");
        assert_eq!(outcome, DeleteOutcome::HardDeleted);
        assert!(confirmer.prompts.is_empty());
        assert!(!cache.classes.contains("c1"));
        assert!(cache.logs.contains("l1"));
    }

    #[test]
    fn no_student_points_at_a_hard_deleted_class() {
        let (mut cache, mut store) = seeded();
        MutationCoordinator::<Student>::new(&mut cache, &mut store)
            .create(student("s1", Some("c1")))
            .expect("student");

        let outcome = MutationCoordinator::<ClassGroup>::new(&mut cache, &mut store)
            .delete("c1", &mut PreApproved(true))
            .expect("delete");
        assert_eq!(outcome, DeleteOutcome::Inactivated);
        assert!(cache.classes.contains("c1"));

        MutationCoordinator::<Student>::new(&mut cache, &mut store)
            .update(student("s1", None))
            .expect("unassign");
        let outcome = MutationCoordinator::<ClassGroup>::new(&mut cache, &mut store)
            .delete("c1", &mut PreApproved(false))
            .expect("delete");
        assert_eq!(outcome, DeleteOutcome::HardDeleted);
        assert!(cache
            .students
            .iter()
            .all(|s| s.class_id.as_deref() != Some("c1")));
    }

    #[test]
    fn rejected_hard_delete_restores_position() {
        let (mut cache, mut store) = seeded();
        MutationCoordinator::<ClassGroup>::new(&mut cache, &mut store)
            .create(class("c2"))
            .expect("c2");
        store.fail_next("network down");
        let err = MutationCoordinator::<ClassGroup>::new(&mut cache, &mut store)
            .delete("c1", &mut PreApproved(true))
            .expect_err("rejected");
        assert_eq!(err.code(), "remote_rejected");
        let ids: Vec<&str> = cache.classes.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["c1", "c2"]);
    }

    #[test]
    fn student_with_history_is_soft_deleted() {
        let (mut cache, mut store) = seeded();
        MutationCoordinator::<Student>::new(&mut cache, &mut store)
            .create(student("s1", Some("c1")))
            .expect("student");
        MutationCoordinator::<Assessment>::new(&mut cache, &mut store)
            .create(assessment("a1", "s1"))
            .expect("assessment");
        let outcome = MutationCoordinator::<Student>::new(&mut cache, &mut store)
            .delete("s1", &mut PreApproved(true))
            .expect("delete");
        assert_eq!(outcome, DeleteOutcome::Inactivated);
        assert!(cache.students.contains("s1"));
    }

    #[test]
    fn skills_are_always_hard_deleted() {
        let (mut cache, mut store) = seeded();
        let skill = Skill {
            id: "k1".into(),
            code: "EF01LP01".into(),
            description: String::new(),
            subject: "Portuguese".into(),
        };
        MutationCoordinator::<Skill>::new(&mut cache, &mut store)
            .create(skill)
            .expect("skill");
        let outcome = MutationCoordinator::<Skill>::new(&mut cache, &mut store)
            .delete("k1", &mut PreApproved(false))
            .expect("delete");
        assert_eq!(outcome, DeleteOutcome::HardDeleted);
    }

    #[test]
    fn toggle_status_always_asks_and_rolls_back() {
        let (mut cache, mut store) = seeded();
        let mut confirmer = Recording {
            answer: false,
            prompts: Vec::new(),
        };
        let err = MutationCoordinator::<ClassGroup>::new(&mut cache, &mut store)
            .toggle_status("c1", RecordStatus::Active, &mut confirmer)
            .expect_err("declined");
        assert!(matches!(err, MutationError::Declined { .. }));
        assert_eq!(confirmer.prompts.len(), 1);

        store.fail_next("timeout");
        let err = MutationCoordinator::<ClassGroup>::new(&mut cache, &mut store)
            .toggle_status("c1", RecordStatus::Active, &mut PreApproved(true))
            .expect_err("rejected");
        assert_eq!(err.code(), "remote_rejected");
        assert_eq!(
            cache.classes.get("c1").map(|c| c.status),
            Some(RecordStatus::Active)
        );

        let toggled = MutationCoordinator::<ClassGroup>::new(&mut cache, &mut store)
            .toggle_status("c1", RecordStatus::Active, &mut PreApproved(true))
            .expect("toggle");
        assert_eq!(toggled.status, RecordStatus::Inactive);
    }

    #[test]
    fn toggle_status_on_statusless_entity_fails_validation() {
        let (mut cache, mut store) = seeded();
        MutationCoordinator::<Assessment>::new(&mut cache, &mut store)
            .create(assessment("a1", "s1"))
            .expect("assessment");
        let err = MutationCoordinator::<Assessment>::new(&mut cache, &mut store)
            .toggle_status("a1", RecordStatus::Active, &mut PreApproved(true))
            .expect_err("no status");
        assert_eq!(err, MutationError::ValidationFailed { field: "status" });
    }
}
