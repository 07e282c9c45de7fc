use crate::calc::{self, SubScore};
use crate::ipc::helpers::{optional_str, require_workspace, required_str, respond, to_json, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::model::{Assessment, Student};
use serde_json::json;

fn student<'a>(state: &'a AppState, params: &serde_json::Value) -> Result<&'a Student, HandlerErr> {
    let id = required_str(params, "studentId")?;
    state
        .cache
        .students
        .get(&id)
        .ok_or_else(|| HandlerErr::new("not_found", format!("students {} not found", id)))
}

fn handle_attendance(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let s = student(state, &req.params)?;
    let rate = match optional_str(&req.params, "classId")? {
        Some(class_id) => calc::attendance_rate(&s.id, state.cache.logs_for_class(&class_id)),
        None => calc::attendance_rate(&s.id, calc::student_logs(&state.cache, s)),
    };
    to_json(&rate)
}

fn handle_average(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let field_raw = required_str(&req.params, "field")?;
    let field = SubScore::parse(&field_raw)
        .ok_or_else(|| HandlerErr::bad_params(format!("unknown score field: {}", field_raw)))?;
    let student_id = optional_str(&req.params, "studentId")?;
    let scoped = state
        .cache
        .assessments
        .iter()
        .filter(|a: &&Assessment| student_id.as_deref().map_or(true, |s| a.student_id == s));
    let average = calc::average_sub_score(scoped, field);
    Ok(json!({ "field": field_raw, "average": average }))
}

fn handle_report_card(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let subject = required_str(&req.params, "subject")?;
    let term = required_str(&req.params, "term")?;
    let student_id = optional_str(&req.params, "studentId")?;
    let cell = calc::report_card_cell(&state.cache, student_id.as_deref(), &subject, &term);
    to_json(&cell)
}

fn handle(state: &AppState, req: &Request) -> Option<Result<serde_json::Value, HandlerErr>> {
    let cache = &state.cache;
    let result = match req.method.as_str() {
        "analytics.dashboard" => to_json(&calc::dashboard(cache)),
        "analytics.remediationCount" => Ok(json!({ "count": calc::remediation_count(cache) })),
        "analytics.subjectSuccessRate" => required_str(&req.params, "subject").map(|subject| {
            let rate = calc::subject_success_rate(cache, &subject);
            json!({ "subject": subject, "rate": rate })
        }),
        "analytics.subjectPerformance" => to_json(&calc::subject_performance(cache)),
        "analytics.attendanceRate" => handle_attendance(state, req),
        "analytics.averageSubScore" => handle_average(state, req),
        "analytics.reportCardCell" => handle_report_card(state, req),
        "analytics.highAchiever" => student(state, &req.params).and_then(|s| {
            to_json(&calc::high_achiever_check(cache, s, &state.config.high_achiever))
        }),
        "analytics.remediationList" => to_json(&calc::remediation_list(cache)),
        "analytics.studentBoard" => student(state, &req.params)
            .and_then(|s| to_json(&calc::student_board(cache, &s.id))),
        _ => return None,
    };
    Some(result)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    if !req.method.starts_with("analytics.") {
        return None;
    }
    if let Err(e) = require_workspace(state) {
        return Some(e.response(&req.id));
    }
    handle(state, req).map(|result| respond(&req.id, result))
}
