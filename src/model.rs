use crate::cache::{validate_ref, Collection, LocalCache};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A row as the remote store sees it: snake_case column names.
pub type Row = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Classes,
    Students,
    Skills,
    Assessments,
    ClassLogs,
    Users,
}

impl Table {
    pub const ALL: [Table; 6] = [
        Table::Classes,
        Table::Students,
        Table::Skills,
        Table::Assessments,
        Table::ClassLogs,
        Table::Users,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Table::Classes => "classes",
            Table::Students => "students",
            Table::Skills => "skills",
            Table::Assessments => "assessments",
            Table::ClassLogs => "class_logs",
            Table::Users => "users",
        }
    }

    pub fn parse(raw: &str) -> Option<Table> {
        Table::ALL.into_iter().find(|t| t.as_str() == raw)
    }

    pub fn fields(self) -> &'static [FieldMap] {
        match self {
            Table::Classes => CLASS_FIELDS,
            Table::Students => STUDENT_FIELDS,
            Table::Skills => SKILL_FIELDS,
            Table::Assessments => ASSESSMENT_FIELDS,
            Table::ClassLogs => LOG_FIELDS,
            Table::Users => USER_FIELDS,
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a column is stored remotely. Json columns hold arrays/maps as text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Text,
    Integer,
    Real,
    Bool,
    Json,
}

/// One entry of a field-name translation table.
#[derive(Debug, Clone, Copy)]
pub struct FieldMap {
    pub local: &'static str,
    pub remote: &'static str,
    pub kind: ColumnKind,
}

const fn field(local: &'static str, remote: &'static str, kind: ColumnKind) -> FieldMap {
    FieldMap {
        local,
        remote,
        kind,
    }
}

use self::ColumnKind::{Bool, Integer, Json, Real, Text};

const CLASS_FIELDS: &[FieldMap] = &[
    field("id", "id", Text),
    field("name", "name", Text),
    field("grade", "grade", Text),
    field("year", "year", Integer),
    field("shift", "shift", Text),
    field("status", "status", Text),
    field("teacherIds", "teacher_ids", Json),
    field("isRemediation", "is_remediation", Bool),
    field("focusSkills", "focus_skills", Json),
];

const STUDENT_FIELDS: &[FieldMap] = &[
    field("id", "id", Text),
    field("name", "name", Text),
    field("classId", "class_id", Text),
    field("avatarUrl", "avatar_url", Text),
    field("registrationNumber", "registration_number", Text),
    field("birthDate", "birth_date", Text),
    field("parentName", "parent_name", Text),
    field("phone", "phone", Text),
    field("status", "status", Text),
    field("remediationEntryDate", "remediation_entry_date", Text),
    field("remediationExitDate", "remediation_exit_date", Text),
];

const SKILL_FIELDS: &[FieldMap] = &[
    field("id", "id", Text),
    field("code", "code", Text),
    field("description", "description", Text),
    field("subject", "subject", Text),
];

const ASSESSMENT_FIELDS: &[FieldMap] = &[
    field("id", "id", Text),
    field("studentId", "student_id", Text),
    field("skillId", "skill_id", Text),
    field("date", "date", Text),
    field("status", "status", Text),
    field("term", "term", Text),
    field("participationScore", "participation_score", Real),
    field("behaviorScore", "behavior_score", Real),
    field("examScore", "exam_score", Real),
    field("notes", "notes", Text),
];

const LOG_FIELDS: &[FieldMap] = &[
    field("id", "id", Text),
    field("classId", "class_id", Text),
    field("date", "date", Text),
    field("content", "content", Text),
    field("attendance", "attendance", Json),
];

const USER_FIELDS: &[FieldMap] = &[
    field("id", "id", Text),
    field("name", "name", Text),
    field("email", "email", Text),
    field("password", "password", Text),
    field("role", "role", Text),
    field("status", "status", Text),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    #[default]
    Active,
    Inactive,
}

impl RecordStatus {
    pub fn toggled(self) -> RecordStatus {
        match self {
            RecordStatus::Active => RecordStatus::Inactive,
            RecordStatus::Inactive => RecordStatus::Active,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Shift {
    #[default]
    Morning,
    Afternoon,
    FullTime,
    Night,
}

/// Canonical four-tier scale. Reached and Exceeded count as success;
/// the other two put the assessment on the remediation track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssessmentStatus {
    NotReached,
    InProgress,
    Reached,
    Exceeded,
}

impl AssessmentStatus {
    pub const ALL: [AssessmentStatus; 4] = [
        AssessmentStatus::NotReached,
        AssessmentStatus::InProgress,
        AssessmentStatus::Reached,
        AssessmentStatus::Exceeded,
    ];

    pub fn is_success(self) -> bool {
        matches!(self, AssessmentStatus::Reached | AssessmentStatus::Exceeded)
    }

    pub fn needs_remediation(self) -> bool {
        !self.is_success()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Coordinator,
    #[default]
    Teacher,
}

impl Role {
    pub fn can_manage_team(self) -> bool {
        matches!(self, Role::Admin | Role::Coordinator)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassGroup {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub grade: String,
    #[serde(default)]
    pub year: i64,
    #[serde(default)]
    pub shift: Shift,
    #[serde(default)]
    pub status: RecordStatus,
    #[serde(default)]
    pub teacher_ids: Vec<String>,
    #[serde(default)]
    pub is_remediation: bool,
    #[serde(default)]
    pub focus_skills: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub class_id: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub registration_number: Option<String>,
    #[serde(default)]
    pub birth_date: Option<String>,
    #[serde(default)]
    pub parent_name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub status: RecordStatus,
    #[serde(default)]
    pub remediation_entry_date: Option<String>,
    #[serde(default)]
    pub remediation_exit_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Skill {
    pub id: String,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub subject: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assessment {
    pub id: String,
    #[serde(default)]
    pub student_id: String,
    /// None for a score-only entry not tied to a skill.
    #[serde(default)]
    pub skill_id: Option<String>,
    #[serde(default)]
    pub date: String,
    pub status: AssessmentStatus,
    #[serde(default)]
    pub term: Option<String>,
    #[serde(default)]
    pub participation_score: Option<f64>,
    #[serde(default)]
    pub behavior_score: Option<f64>,
    #[serde(default)]
    pub exam_score: Option<f64>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// One lesson/day of a class, with per-student presence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassDailyLog {
    pub id: String,
    #[serde(default)]
    pub class_id: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub attendance: BTreeMap<String, bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    /// Plaintext, as stored by the hosted backend. Never echoed to the UI.
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub status: RecordStatus,
}

impl User {
    pub fn without_password(&self) -> User {
        User {
            password: None,
            ..self.clone()
        }
    }
}

/// Per-entity knobs of the generic mutation protocol.
pub trait Entity: Clone + fmt::Debug + Serialize + DeserializeOwned {
    const TABLE: Table;

    /// Local field names the UI never sees. An edit only replaces them
    /// with a real string value.
    const WRITE_ONLY: &'static [&'static str] = &[];

    fn id(&self) -> &str;

    fn collection(cache: &LocalCache) -> &Collection<Self>;

    fn collection_mut(cache: &mut LocalCache) -> &mut Collection<Self>;

    /// Name of the first missing required field, if any.
    fn validate(&self) -> Result<(), &'static str> {
        Ok(())
    }

    /// Drop references that no longer resolve in the cache. Returns the
    /// local names of the fields that were cleared.
    fn guard_refs(&mut self, _cache: &LocalCache) -> Vec<&'static str> {
        Vec::new()
    }

    /// Number of records elsewhere in the cache that depend on `id`.
    fn dependents(_cache: &LocalCache, _id: &str) -> usize {
        0
    }

    fn status(&self) -> Option<RecordStatus> {
        None
    }

    fn set_status(&mut self, _status: RecordStatus) {}
}

fn require(value: &str, name: &'static str) -> Result<(), &'static str> {
    if value.trim().is_empty() {
        Err(name)
    } else {
        Ok(())
    }
}

impl Entity for ClassGroup {
    const TABLE: Table = Table::Classes;

    fn id(&self) -> &str {
        &self.id
    }

    fn collection(cache: &LocalCache) -> &Collection<Self> {
        &cache.classes
    }

    fn collection_mut(cache: &mut LocalCache) -> &mut Collection<Self> {
        &mut cache.classes
    }

    fn validate(&self) -> Result<(), &'static str> {
        require(&self.name, "name")
    }

    fn guard_refs(&mut self, cache: &LocalCache) -> Vec<&'static str> {
        let mut cleared = Vec::new();
        let before = self.teacher_ids.len();
        self.teacher_ids
            .retain(|id| validate_ref(&cache.users, Some(id.as_str())).is_some());
        if self.teacher_ids.len() != before {
            cleared.push("teacherIds");
        }
        // Stale focus skills are tolerated; only duplicates go.
        let mut seen = std::collections::HashSet::new();
        self.focus_skills.retain(|id| seen.insert(id.clone()));
        cleared
    }

    fn dependents(cache: &LocalCache, id: &str) -> usize {
        // Daily logs keep their class id as a weak reference.
        cache
            .students
            .iter()
            .filter(|s| s.class_id.as_deref() == Some(id))
            .count()
    }

    fn status(&self) -> Option<RecordStatus> {
        Some(self.status)
    }

    fn set_status(&mut self, status: RecordStatus) {
        self.status = status;
    }
}

impl Entity for Student {
    const TABLE: Table = Table::Students;

    fn id(&self) -> &str {
        &self.id
    }

    fn collection(cache: &LocalCache) -> &Collection<Self> {
        &cache.students
    }

    fn collection_mut(cache: &mut LocalCache) -> &mut Collection<Self> {
        &mut cache.students
    }

    fn validate(&self) -> Result<(), &'static str> {
        require(&self.name, "name")
    }

    fn guard_refs(&mut self, cache: &LocalCache) -> Vec<&'static str> {
        if self.class_id.is_none() {
            return Vec::new();
        }
        let checked = validate_ref(&cache.classes, self.class_id.as_deref());
        if checked.is_none() {
            self.class_id = None;
            return vec!["classId"];
        }
        Vec::new()
    }

    fn dependents(cache: &LocalCache, id: &str) -> usize {
        cache
            .assessments
            .iter()
            .filter(|a| a.student_id == id)
            .count()
    }

    fn status(&self) -> Option<RecordStatus> {
        Some(self.status)
    }

    fn set_status(&mut self, status: RecordStatus) {
        self.status = status;
    }
}

impl Entity for Skill {
    const TABLE: Table = Table::Skills;

    fn id(&self) -> &str {
        &self.id
    }

    fn collection(cache: &LocalCache) -> &Collection<Self> {
        &cache.skills
    }

    fn collection_mut(cache: &mut LocalCache) -> &mut Collection<Self> {
        &mut cache.skills
    }

    fn validate(&self) -> Result<(), &'static str> {
        require(&self.code, "code")?;
        require(&self.subject, "subject")
    }
}

impl Entity for Assessment {
    const TABLE: Table = Table::Assessments;

    fn id(&self) -> &str {
        &self.id
    }

    fn collection(cache: &LocalCache) -> &Collection<Self> {
        &cache.assessments
    }

    fn collection_mut(cache: &mut LocalCache) -> &mut Collection<Self> {
        &mut cache.assessments
    }

    fn validate(&self) -> Result<(), &'static str> {
        require(&self.student_id, "studentId")?;
        require(&self.date, "date")
    }

    fn guard_refs(&mut self, cache: &LocalCache) -> Vec<&'static str> {
        if self.skill_id.is_some() && validate_ref(&cache.skills, self.skill_id.as_deref()).is_none()
        {
            self.skill_id = None;
            return vec!["skillId"];
        }
        Vec::new()
    }
}

impl Entity for ClassDailyLog {
    const TABLE: Table = Table::ClassLogs;

    fn id(&self) -> &str {
        &self.id
    }

    fn collection(cache: &LocalCache) -> &Collection<Self> {
        &cache.logs
    }

    fn collection_mut(cache: &mut LocalCache) -> &mut Collection<Self> {
        &mut cache.logs
    }

    fn validate(&self) -> Result<(), &'static str> {
        require(&self.class_id, "classId")?;
        if chrono::NaiveDate::parse_from_str(self.date.trim(), "%Y-%m-%d").is_err() {
            return Err("date");
        }
        Ok(())
    }
}

impl Entity for User {
    const TABLE: Table = Table::Users;
    const WRITE_ONLY: &'static [&'static str] = &["password"];

    fn id(&self) -> &str {
        &self.id
    }

    fn collection(cache: &LocalCache) -> &Collection<Self> {
        &cache.users
    }

    fn collection_mut(cache: &mut LocalCache) -> &mut Collection<Self> {
        &mut cache.users
    }

    fn validate(&self) -> Result<(), &'static str> {
        require(&self.name, "name")?;
        require(&self.email, "email")
    }

    fn dependents(cache: &LocalCache, id: &str) -> usize {
        cache
            .classes
            .iter()
            .filter(|c| c.teacher_ids.iter().any(|t| t == id))
            .count()
    }

    fn status(&self) -> Option<RecordStatus> {
        Some(self.status)
    }

    fn set_status(&mut self, status: RecordStatus) {
        self.status = status;
    }
}

/// Local camelCase record -> remote snake_case row.
pub fn to_remote<E: Entity>(record: &E) -> serde_json::Result<Row> {
    let local = match serde_json::to_value(record)? {
        serde_json::Value::Object(m) => m,
        _ => Row::new(),
    };
    let mut row = Row::new();
    for f in E::TABLE.fields() {
        let v = local.get(f.local).cloned().unwrap_or(serde_json::Value::Null);
        row.insert(f.remote.to_string(), v);
    }
    Ok(row)
}

/// Remote row -> local record. Unknown columns are ignored and NULL
/// columns fall back to the field default.
pub fn from_remote<E: Entity>(row: &Row) -> serde_json::Result<E> {
    let mut local = serde_json::Map::new();
    for f in E::TABLE.fields() {
        match row.get(f.remote) {
            None | Some(serde_json::Value::Null) => {}
            Some(v) => {
                local.insert(f.local.to_string(), v.clone());
            }
        }
    }
    serde_json::from_value(serde_json::Value::Object(local))
}

/// Columns whose value differs between two rows of the same table. The id
/// column is never part of a patch.
pub fn diff_rows(before: &Row, after: &Row) -> Row {
    let mut patch = Row::new();
    for (k, v) in after {
        if k == "id" {
            continue;
        }
        if before.get(k) != Some(v) {
            patch.insert(k.clone(), v.clone());
        }
    }
    patch
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn student() -> Student {
        Student {
            id: "s1".into(),
            name: "Ana".into(),
            class_id: Some("c1".into()),
            avatar_url: None,
            registration_number: Some("2024-001".into()),
            birth_date: None,
            parent_name: Some("Maria".into()),
            phone: None,
            status: RecordStatus::Active,
            remediation_entry_date: None,
            remediation_exit_date: None,
        }
    }

    #[test]
    fn remote_rows_use_snake_case_columns() {
        let row = to_remote(&student()).expect("encode");
        assert_eq!(row.get("class_id"), Some(&json!("c1")));
        assert_eq!(row.get("registration_number"), Some(&json!("2024-001")));
        assert_eq!(row.get("parent_name"), Some(&json!("Maria")));
        assert!(row.get("classId").is_none());
        assert_eq!(row.len(), Table::Students.fields().len());

        let back: Student = from_remote(&row).expect("decode");
        assert_eq!(back, student());
    }

    #[test]
    fn null_json_columns_fall_back_to_defaults() {
        let mut row = Row::new();
        row.insert("id".into(), json!("c1"));
        row.insert("name".into(), json!("1A"));
        row.insert("teacher_ids".into(), serde_json::Value::Null);
        row.insert("is_remediation".into(), json!(true));
        let class: ClassGroup = from_remote(&row).expect("decode");
        assert!(class.teacher_ids.is_empty());
        assert!(class.is_remediation);
        assert_eq!(class.status, RecordStatus::Active);
    }

    #[test]
    fn diff_rows_skips_id_and_unchanged_columns() {
        let before = to_remote(&student()).expect("encode");
        let mut changed = student();
        changed.phone = Some("555".into());
        let after = to_remote(&changed).expect("encode");
        let patch = diff_rows(&before, &after);
        assert_eq!(patch.len(), 1);
        assert_eq!(patch.get("phone"), Some(&json!("555")));
    }

    #[test]
    fn assessment_status_success_tiers() {
        assert!(AssessmentStatus::Reached.is_success());
        assert!(AssessmentStatus::Exceeded.is_success());
        assert!(AssessmentStatus::InProgress.needs_remediation());
        assert!(AssessmentStatus::NotReached.needs_remediation());
        assert_eq!(
            serde_json::to_value(AssessmentStatus::NotReached).expect("encode"),
            json!("not_reached")
        );
    }

    #[test]
    fn log_validation_requires_iso_date() {
        let mut log = ClassDailyLog {
            id: "l1".into(),
            class_id: "c1".into(),
            date: "2024-03-01".into(),
            content: String::new(),
            attendance: BTreeMap::new(),
        };
        assert!(log.validate().is_ok());
        log.date = "01/03/2024".into();
        assert_eq!(log.validate(), Err("date"));
    }

    #[test]
    fn table_names_round_trip_through_parse() {
        for t in Table::ALL {
            assert_eq!(Table::parse(t.as_str()), Some(t));
        }
        assert_eq!(Table::parse("mark_sets"), None);
    }
}
