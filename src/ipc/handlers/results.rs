use crate::calc::{round_net, session_summary};
use crate::db;
use crate::entry::net::compute_net;
use crate::entry::PenaltyDivisor;
use crate::ipc::error::{err, ok};
use crate::ipc::handlers::setup::load_entry_settings;
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::json;

fn session_divisor(
    conn: &Connection,
    req: &Request,
    session_id: &str,
) -> Result<(db::SessionRow, PenaltyDivisor), serde_json::Value> {
    let session = match db::get_session(conn, session_id) {
        Ok(Some(s)) => s,
        Ok(None) => return Err(err(&req.id, "not_found", "session not found", None)),
        Err(e) => return Err(err(&req.id, "db_query_failed", e.to_string(), None)),
    };
    let exam_type = match db::get_exam_type(conn, &session.exam_type_id) {
        Ok(Some(t)) => t,
        Ok(None) => return Err(err(&req.id, "not_found", "exam type not found", None)),
        Err(e) => return Err(err(&req.id, "db_query_failed", e.to_string(), None)),
    };
    match PenaltyDivisor::new(exam_type.penalty_divisor) {
        Ok(d) => Ok((session, d)),
        Err(e) => Err(err(&req.id, e.code(), e.to_string(), None)),
    }
}

fn handle_results_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(session_id) = req.params.get("sessionId").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing sessionId", None);
    };
    let student_id = req.params.get("studentId").and_then(|v| v.as_str());

    let (_, divisor) = match session_divisor(conn, req, session_id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let records = match db::load_results(conn, session_id, student_id) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows: Vec<serde_json::Value> = records
        .iter()
        .map(|r| {
            json!({
                "studentId": r.student_id,
                "subjectId": r.subject_id,
                "correctCount": r.correct_count,
                "wrongCount": r.wrong_count,
                "emptyCount": r.empty_count,
                "net": compute_net(r.correct_count, r.wrong_count, divisor),
            })
        })
        .collect();

    ok(&req.id, json!({ "results": rows }))
}

fn handle_results_summary(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(session_id) = req.params.get("sessionId").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing sessionId", None);
    };

    let (session, divisor) = match session_divisor(conn, req, session_id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let subjects = match db::list_subjects(conn, &session.exam_type_id) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let students = match db::list_students(conn) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let records = match db::load_results(conn, session_id, None) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let decimals = match load_entry_settings(conn) {
        Ok(s) => s.net_display_decimals,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let summary = session_summary(&subjects, &students, &records, divisor);
    ok(
        &req.id,
        json!({
            "sessionId": session.id,
            "sessionName": session.name,
            "penaltyDivisor": divisor.get(),
            "subjects": summary.subjects,
            "students": summary.students,
            "avgTotalNet": summary.avg_total_net,
            "avgTotalNetDisplay": round_net(summary.avg_total_net, decimals),
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "results.list" => Some(handle_results_list(state, req)),
        "results.summary" => Some(handle_results_summary(state, req)),
        _ => None,
    }
}
