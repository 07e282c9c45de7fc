use crate::cache::LocalCache;
use crate::config::HighAchieverRule;
use crate::model::{Assessment, AssessmentStatus, ClassDailyLog, ClassGroup, Skill, Student};
use serde::Serialize;

pub const UNKNOWN_NAME: &str = "Unknown";

/// Nearest-integer percentage, halves rounded up: `Int(x + 0.5)`.
pub fn round_percent(x: f64) -> i64 {
    (x + 0.5).floor() as i64
}

fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        100.0 * (part as f64) / (whole as f64)
    }
}

fn skill_subject<'a>(cache: &'a LocalCache, skill_id: Option<&str>) -> Option<&'a str> {
    let skill = cache.skills.get(skill_id?)?;
    Some(skill.subject.as_str())
}

pub fn remediation_count(cache: &LocalCache) -> usize {
    cache
        .assessments
        .iter()
        .filter(|a| a.status.needs_remediation())
        .count()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Tally {
    pub success: usize,
    pub total: usize,
}

impl Tally {
    fn add(&mut self, status: AssessmentStatus) {
        self.total += 1;
        if status.is_success() {
            self.success += 1;
        }
    }
}

/// Success/total over assessments of skills in `subject`, optionally
/// narrowed to one student and one term.
fn subject_tally(
    cache: &LocalCache,
    subject: &str,
    student_id: Option<&str>,
    term: Option<&str>,
) -> Tally {
    let mut tally = Tally::default();
    for a in cache.assessments.iter() {
        if skill_subject(cache, a.skill_id.as_deref()) != Some(subject) {
            continue;
        }
        if student_id.is_some_and(|s| a.student_id != s) {
            continue;
        }
        if term.is_some_and(|t| a.term.as_deref() != Some(t)) {
            continue;
        }
        tally.add(a.status);
    }
    tally
}

/// None when the subject has no assessments yet.
pub fn subject_success_rate(cache: &LocalCache, subject: &str) -> Option<i64> {
    let tally = subject_tally(cache, subject, None, None);
    if tally.total == 0 {
        return None;
    }
    Some(round_percent(percent(tally.success, tally.total)))
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRate {
    pub attended: usize,
    /// Number of logs considered. Zero means "no data", not "never present".
    pub total: usize,
    pub percent: f64,
}

pub fn attendance_rate<'a, I>(student_id: &str, logs: I) -> AttendanceRate
where
    I: IntoIterator<Item = &'a ClassDailyLog>,
{
    let mut attended = 0;
    let mut total = 0;
    for log in logs {
        total += 1;
        if log.attendance.get(student_id).copied().unwrap_or(false) {
            attended += 1;
        }
    }
    AttendanceRate {
        attended,
        total,
        percent: percent(attended, total),
    }
}

/// Logs a student's attendance is measured against: the logs of their
/// class, or every log that mentions them when they have no class.
pub fn student_logs<'a>(cache: &'a LocalCache, student: &Student) -> Vec<&'a ClassDailyLog> {
    match student.class_id.as_deref() {
        Some(class_id) => cache.logs_for_class(class_id),
        None => cache
            .logs
            .iter()
            .filter(|l| l.attendance.contains_key(&student.id))
            .collect(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubScore {
    Participation,
    Behavior,
    Exam,
}

impl SubScore {
    pub fn parse(raw: &str) -> Option<SubScore> {
        match raw {
            "participation" | "participationScore" => Some(SubScore::Participation),
            "behavior" | "behaviorScore" => Some(SubScore::Behavior),
            "exam" | "examScore" => Some(SubScore::Exam),
            _ => None,
        }
    }

    fn of(self, a: &Assessment) -> Option<f64> {
        match self {
            SubScore::Participation => a.participation_score,
            SubScore::Behavior => a.behavior_score,
            SubScore::Exam => a.exam_score,
        }
    }
}

/// Mean over assessments that define the score. None is "no data"; 0.0
/// is a real average.
pub fn average_sub_score<'a, I>(assessments: I, field: SubScore) -> Option<f64>
where
    I: IntoIterator<Item = &'a Assessment>,
{
    let mut sum = 0.0;
    let mut n = 0usize;
    for v in assessments.into_iter().filter_map(|a| field.of(a)) {
        sum += v;
        n += 1;
    }
    if n == 0 {
        None
    } else {
        Some(sum / n as f64)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CellStatus {
    Success,
    Danger,
    Warning,
    Absent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportCardCell {
    pub status: CellStatus,
    pub success: usize,
    pub total: usize,
}

pub fn report_card_cell(
    cache: &LocalCache,
    student_id: Option<&str>,
    subject: &str,
    term: &str,
) -> ReportCardCell {
    let tally = subject_tally(cache, subject, student_id, Some(term));
    let status = if tally.total == 0 {
        CellStatus::Absent
    } else if tally.success == tally.total {
        CellStatus::Success
    } else if tally.success == 0 {
        CellStatus::Danger
    } else {
        CellStatus::Warning
    };
    ReportCardCell {
        status,
        success: tally.success,
        total: tally.total,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HighAchieverCheck {
    pub attendance: AttendanceRate,
    pub exam_average: Option<f64>,
    pub exceeded_count: usize,
    pub qualifies: bool,
}

pub fn high_achiever_check(
    cache: &LocalCache,
    student: &Student,
    rule: &HighAchieverRule,
) -> HighAchieverCheck {
    let attendance = attendance_rate(&student.id, student_logs(cache, student));
    let own: Vec<&Assessment> = cache
        .assessments
        .iter()
        .filter(|a| a.student_id == student.id)
        .collect();
    let exam_average = average_sub_score(own.iter().copied(), SubScore::Exam);
    let exceeded_count = own
        .iter()
        .filter(|a| a.status == AssessmentStatus::Exceeded)
        .count();

    let qualifies = attendance.percent >= rule.min_attendance_percent
        && (exam_average.is_some_and(|avg| avg >= rule.min_exam_average)
            || exceeded_count >= rule.min_exceeded_count);

    HighAchieverCheck {
        attendance,
        exam_average,
        exceeded_count,
        qualifies,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusCount {
    pub status: AssessmentStatus,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSummary {
    pub total_students: usize,
    pub total_skills: usize,
    pub remediation_cases: usize,
    pub success_cases: usize,
    /// Best tier first.
    pub distribution: Vec<StatusCount>,
}

pub fn dashboard(cache: &LocalCache) -> DashboardSummary {
    let count = |status: AssessmentStatus| {
        cache
            .assessments
            .iter()
            .filter(|a| a.status == status)
            .count()
    };
    let distribution: Vec<StatusCount> = AssessmentStatus::ALL
        .iter()
        .rev()
        .map(|s| StatusCount {
            status: *s,
            count: count(*s),
        })
        .collect();
    let success_cases = distribution
        .iter()
        .filter(|c| c.status.is_success())
        .map(|c| c.count)
        .sum();

    DashboardSummary {
        total_students: cache.students.len(),
        total_skills: cache.skills.len(),
        remediation_cases: remediation_count(cache),
        success_cases,
        distribution,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubjectPerformance {
    pub subject: String,
    pub success: usize,
    pub total: usize,
    pub rate: i64,
}

/// Subjects in order of first appearance in the skill list; subjects
/// with no assessments are left out.
pub fn subject_performance(cache: &LocalCache) -> Vec<SubjectPerformance> {
    let mut rows: Vec<(String, Tally)> = Vec::new();
    for skill in cache.skills.iter() {
        let mut tally = Tally::default();
        for a in cache.assessments.iter() {
            if a.skill_id.as_deref() == Some(skill.id.as_str()) {
                tally.add(a.status);
            }
        }
        if tally.total == 0 {
            continue;
        }
        match rows.iter_mut().find(|(s, _)| *s == skill.subject) {
            Some((_, t)) => {
                t.success += tally.success;
                t.total += tally.total;
            }
            None => rows.push((skill.subject.clone(), tally)),
        }
    }
    rows.into_iter()
        .map(|(subject, t)| SubjectPerformance {
            subject,
            success: t.success,
            total: t.total,
            rate: round_percent(percent(t.success, t.total)),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RemediationItem {
    pub student: Student,
    pub skill: Skill,
    pub assessment: Assessment,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RemediationGroup {
    pub class: ClassGroup,
    pub items: Vec<RemediationItem>,
}

pub fn remediation_list(cache: &LocalCache) -> Vec<RemediationGroup> {
    let mut groups: Vec<RemediationGroup> = Vec::new();
    for a in cache.assessments.iter() {
        if !a.status.needs_remediation() {
            continue;
        }
        let Some(student) = cache.students.get(&a.student_id) else {
            continue;
        };
        let Some(class) = student.class_id.as_deref().and_then(|c| cache.classes.get(c)) else {
            continue;
        };
        let Some(skill) = a.skill_id.as_deref().and_then(|k| cache.skills.get(k)) else {
            continue;
        };
        let item = RemediationItem {
            student: student.clone(),
            skill: skill.clone(),
            assessment: a.clone(),
        };
        match groups.iter_mut().find(|g| g.class.id == class.id) {
            Some(g) => g.items.push(item),
            None => groups.push(RemediationGroup {
                class: class.clone(),
                items: vec![item],
            }),
        }
    }
    groups
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoardEntry {
    pub skill: Skill,
    pub assessment: Option<Assessment>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubjectBoard {
    pub subject: String,
    pub entries: Vec<BoardEntry>,
}

/// Every skill, grouped by subject, with the student's latest assessment
/// of it. Dates are ISO strings so they compare lexically; on equal dates
/// the later-inserted assessment wins.
pub fn student_board(cache: &LocalCache, student_id: &str) -> Vec<SubjectBoard> {
    let mut boards: Vec<SubjectBoard> = Vec::new();
    for skill in cache.skills.iter() {
        let mut latest: Option<&Assessment> = None;
        for a in cache.assessments.iter() {
            if a.student_id != student_id || a.skill_id.as_deref() != Some(skill.id.as_str()) {
                continue;
            }
            if latest.map_or(true, |l| a.date >= l.date) {
                latest = Some(a);
            }
        }
        let entry = BoardEntry {
            skill: skill.clone(),
            assessment: latest.cloned(),
        };
        match boards.iter_mut().find(|b| b.subject == skill.subject) {
            Some(b) => b.entries.push(entry),
            None => boards.push(SubjectBoard {
                subject: skill.subject.clone(),
                entries: vec![entry],
            }),
        }
    }
    boards
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentRow {
    #[serde(flatten)]
    pub assessment: Assessment,
    pub student_name: String,
    pub skill_code: String,
    pub skill_description: String,
    pub class_name: String,
}

/// Newest first. With `class_id`, only assessments whose student is in
/// that class are kept.
pub fn assessment_rows(cache: &LocalCache, class_id: Option<&str>) -> Vec<AssessmentRow> {
    let unknown = || UNKNOWN_NAME.to_string();
    cache
        .assessments
        .iter()
        .rev()
        .filter_map(|a| {
            let student = cache.students.get(&a.student_id);
            if let Some(cid) = class_id {
                if student.and_then(|s| s.class_id.as_deref()) != Some(cid) {
                    return None;
                }
            }
            let skill = a.skill_id.as_deref().and_then(|k| cache.skills.get(k));
            let class = student
                .and_then(|s| s.class_id.as_deref())
                .and_then(|c| cache.classes.get(c));
            Some(AssessmentRow {
                assessment: a.clone(),
                student_name: student.map(|s| s.name.clone()).unwrap_or_else(unknown),
                skill_code: skill.map(|k| k.code.clone()).unwrap_or_else(unknown),
                skill_description: skill.map(|k| k.description.clone()).unwrap_or_default(),
                class_name: class.map(|c| c.name.clone()).unwrap_or_else(unknown),
            })
        })
        .collect()
}
