use crate::calc::round_net;
use crate::db;
use crate::entry::nav::{next_position, CellPos, NavKey};
use crate::entry::paste::{self, count_lines};
use crate::entry::{EntryError, Field, PenaltyDivisor, ResultGridStore, ResultRecord, StudentResult};
use crate::ipc::error::{err, ok};
use crate::ipc::handlers::setup::load_entry_settings;
use crate::ipc::types::{AppState, EntrySession, Request};
use serde_json::json;
use tracing::{info, warn};

const ENTRY_APPLY_MAX_RECORDS: usize = 5000;

struct HandlerErr {
    code: &'static str,
    message: String,
    details: Option<serde_json::Value>,
}

impl HandlerErr {
    fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }
}

impl From<EntryError> for HandlerErr {
    fn from(e: EntryError) -> Self {
        HandlerErr {
            code: e.code(),
            message: e.to_string(),
            details: None,
        }
    }
}

fn no_session(id: &str) -> serde_json::Value {
    err(id, "no_session", "open an entry session first", None)
}

fn param_str<'a>(req: &'a Request, key: &str) -> Result<&'a str, HandlerErr> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| HandlerErr {
            code: "bad_params",
            message: format!("missing {}", key),
            details: None,
        })
}

fn param_index(req: &Request, key: &str) -> Result<usize, HandlerErr> {
    match req.params.get(key).and_then(|v| v.as_i64()) {
        Some(v) if v >= 0 => Ok(v as usize),
        _ => Err(HandlerErr {
            code: "bad_params",
            message: format!("missing/invalid {}", key),
            details: None,
        }),
    }
}

fn param_field(req: &Request) -> Result<Field, HandlerErr> {
    let raw = param_str(req, "field")?;
    Field::parse(raw).ok_or_else(|| HandlerErr {
        code: "bad_params",
        message: "field must be one of: correct, wrong, empty".to_string(),
        details: Some(json!({ "field": raw })),
    })
}

/// Cell input as the user typed it. Numbers are rendered back to text so the
/// store applies the same coercion to both; integral floats such as `3.0`
/// count as integers.
fn cell_text(value: Option<&serde_json::Value>) -> String {
    match value {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(serde_json::Value::Number(n)) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => i.to_string(),
            (None, Some(f)) if f.is_finite() && f.fract() == 0.0 => (f as i64).to_string(),
            _ => n.to_string(),
        },
        _ => String::new(),
    }
}

fn student_json(r: &StudentResult, decimals: u32) -> serde_json::Value {
    json!({
        "studentId": r.student_id,
        "studentName": r.student_name,
        "subjects": r.subjects,
        "totalNet": r.total_net,
        "totalNetDisplay": round_net(r.total_net, decimals),
    })
}

fn handle_entry_open(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let session_id = match param_str(req, "sessionId") {
        Ok(v) => v.to_string(),
        Err(e) => return e.response(&req.id),
    };
    let only_student = req
        .params
        .get("studentId")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());

    let session = match db::get_session(conn, &session_id) {
        Ok(Some(s)) => s,
        Ok(None) => return err(&req.id, "not_found", "session not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let exam_type = match db::get_exam_type(conn, &session.exam_type_id) {
        Ok(Some(t)) => t,
        Ok(None) => return err(&req.id, "not_found", "exam type not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let divisor = match PenaltyDivisor::new(exam_type.penalty_divisor) {
        Ok(d) => d,
        Err(e) => return HandlerErr::from(e).response(&req.id),
    };
    let settings = match load_entry_settings(conn) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let subjects = match db::list_subjects(conn, &exam_type.id) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let mut students = match db::list_students(conn) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if let Some(sid) = only_student.as_deref() {
        students.retain(|s| s.id == sid);
        if students.is_empty() {
            return err(
                &req.id,
                "not_found",
                "student not found",
                Some(json!({ "studentId": sid })),
            );
        }
    }
    let records = match db::load_results(conn, &session_id, only_student.as_deref()) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let mut store = ResultGridStore::new(subjects, students, divisor);
    let hydrated = store.apply_records(&records);

    if let Some(prev) = state.entry.take() {
        warn!(session = %prev.session_id, "discarding unsaved entry session");
    }
    info!(
        session = %session.id,
        students = store.roster().len(),
        subjects = store.subjects().len(),
        hydrated_rows = hydrated.applied_rows,
        "entry session opened"
    );

    let decimals = settings.net_display_decimals;
    let students_json: Vec<serde_json::Value> = store
        .roster()
        .students()
        .iter()
        .map(|s| {
            json!({
                "id": s.id,
                "name": s.display_name(),
                "studentNo": s.student_no,
            })
        })
        .collect();
    let results: Vec<serde_json::Value> = store
        .snapshot()
        .iter()
        .map(|r| student_json(r, decimals))
        .collect();
    let result = json!({
        "sessionId": session.id,
        "sessionName": session.name,
        "examDate": session.exam_date,
        "examTypeId": exam_type.id,
        "examTypeName": exam_type.name,
        "penaltyDivisor": divisor.get(),
        "netDisplayDecimals": decimals,
        "subjects": store.subjects(),
        "students": students_json,
        "hydrated": hydrated,
        "results": results,
        "errorCount": store.error_count(),
        "errors": store.errors(),
    });

    state.entry = Some(EntrySession {
        session_id: session.id,
        exam_type_id: exam_type.id,
        settings,
        store,
    });

    ok(&req.id, result)
}

fn handle_entry_set_cell(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(session) = state.entry.as_mut() else {
        return no_session(&req.id);
    };
    let student_id = match param_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let subject_id = match param_str(req, "subjectId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let field = match param_field(req) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let text = cell_text(req.params.get("value"));

    let update = match session.store.set_cell(student_id, subject_id, field, &text) {
        Ok(u) => u,
        Err(e) => return HandlerErr::from(e).response(&req.id),
    };

    ok(
        &req.id,
        json!({
            "cell": update.cell,
            "totalNet": update.total_net,
            "totalNetDisplay": round_net(update.total_net, session.settings.net_display_decimals),
            "cellError": update.error,
            "errorCount": session.store.error_count(),
            "hasBlockingErrors": session.store.has_blocking_errors(),
        }),
    )
}

fn handle_entry_get_cell(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(session) = state.entry.as_ref() else {
        return no_session(&req.id);
    };
    let student_id = match param_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let subject_id = match param_str(req, "subjectId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    ok(
        &req.id,
        json!({ "cell": session.store.get_cell(student_id, subject_id) }),
    )
}

fn handle_entry_paste(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(session) = state.entry.as_mut() else {
        return no_session(&req.id);
    };
    let text = match param_str(req, "text") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    let total_lines = count_lines(text);
    let max_lines = session.settings.max_paste_lines;
    if total_lines > max_lines {
        return ok(
            &req.id,
            json!({
                "totalLines": total_lines,
                "appliedRows": 0,
                "skippedRows": total_lines,
                "limitExceeded": true,
                "warnings": [],
                "message": format!(
                    "pasted block exceeds max lines: {} > {}",
                    total_lines, max_lines
                ),
                "errorCount": session.store.error_count(),
            }),
        );
    }

    let store = &mut session.store;
    let import = paste::parse(text, store.subjects(), |token| {
        store.roster().resolve(token).map(|s| s.id.clone())
    });
    let report = store.bulk_apply(&import.rows);
    let skipped = import.unmatched_count() + report.skipped_rows;

    info!(
        session = %session.session_id,
        matched = report.applied_rows,
        total = total_lines,
        skipped,
        "paste applied"
    );

    ok(
        &req.id,
        json!({
            "totalLines": total_lines,
            "appliedRows": report.applied_rows,
            "skippedRows": skipped,
            "cellsWritten": report.cells_written,
            "invalidCells": report.invalid_cells,
            "limitExceeded": false,
            "warnings": import.warnings,
            "errorCount": store.error_count(),
        }),
    )
}

fn handle_entry_apply_records(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(session) = state.entry.as_mut() else {
        return no_session(&req.id);
    };
    let Some(raw) = req.params.get("records").and_then(|v| v.as_array()) else {
        return err(&req.id, "bad_params", "missing records[]", None);
    };
    if raw.len() > ENTRY_APPLY_MAX_RECORDS {
        return ok(
            &req.id,
            json!({
                "applied": 0,
                "skipped": raw.len(),
                "limitExceeded": true,
                "message": format!(
                    "records payload exceeds max records: {} > {}",
                    raw.len(), ENTRY_APPLY_MAX_RECORDS
                ),
            }),
        );
    }

    let mut records: Vec<ResultRecord> = Vec::with_capacity(raw.len());
    for (i, v) in raw.iter().enumerate() {
        match serde_json::from_value::<ResultRecord>(v.clone()) {
            Ok(r) => records.push(r),
            Err(e) => {
                return err(
                    &req.id,
                    "bad_params",
                    format!("record at index {} is invalid: {}", i, e),
                    None,
                )
            }
        }
    }

    let report = session.store.apply_records(&records);
    ok(
        &req.id,
        json!({
            "applied": report.applied_rows,
            "skipped": report.skipped_rows,
            "invalidCells": report.invalid_cells,
            "limitExceeded": false,
            "errorCount": session.store.error_count(),
        }),
    )
}

fn handle_entry_navigate(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(session) = state.entry.as_ref() else {
        return no_session(&req.id);
    };
    let from = match (
        param_index(req, "studentIndex"),
        param_index(req, "subjectIndex"),
        param_field(req),
    ) {
        (Ok(student_index), Ok(subject_index), Ok(field)) => CellPos {
            student_index,
            subject_index,
            field,
        },
        (Err(e), _, _) | (_, Err(e), _) | (_, _, Err(e)) => return e.response(&req.id),
    };
    let key_name = match param_str(req, "key") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let shift = req
        .params
        .get("shift")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    let Some(key) = NavKey::parse(key_name, shift) else {
        return err(
            &req.id,
            "bad_params",
            "key must be one of: Enter, ArrowDown, ArrowUp, Tab",
            Some(json!({ "key": key_name })),
        );
    };

    let next = next_position(session.store.shape(), from, key);
    ok(
        &req.id,
        json!({
            "moved": next.is_some(),
            "position": next.unwrap_or(from),
        }),
    )
}

fn handle_entry_snapshot(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(session) = state.entry.as_ref() else {
        return no_session(&req.id);
    };
    let decimals = session.settings.net_display_decimals;
    let students: Vec<serde_json::Value> = session
        .store
        .snapshot()
        .iter()
        .map(|r| student_json(r, decimals))
        .collect();
    ok(&req.id, json!({ "students": students }))
}

fn handle_entry_status(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(session) = state.entry.as_ref() else {
        return ok(&req.id, json!({ "open": false }));
    };
    ok(
        &req.id,
        json!({
            "open": true,
            "sessionId": session.session_id,
            "examTypeId": session.exam_type_id,
            "errorCount": session.store.error_count(),
            "hasBlockingErrors": session.store.has_blocking_errors(),
            "errors": session.store.errors(),
        }),
    )
}

fn handle_entry_clear(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(session) = state.entry.as_mut() else {
        return no_session(&req.id);
    };
    session.store.clear();
    ok(&req.id, json!({ "ok": true }))
}

fn handle_entry_close(state: &mut AppState, req: &Request) -> serde_json::Value {
    let closed = state.entry.take();
    if let Some(s) = &closed {
        info!(session = %s.session_id, "entry session closed");
    }
    ok(&req.id, json!({ "ok": true, "wasOpen": closed.is_some() }))
}

fn handle_entry_save(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(session) = state.entry.as_ref() else {
        return no_session(&req.id);
    };

    let store = &session.store;
    if store.has_blocking_errors() {
        let n = store.error_count();
        return err(
            &req.id,
            "validation_errors",
            format!("{} cell(s) have validation errors", n),
            Some(json!({ "errorCount": n, "errors": store.errors() })),
        );
    }

    let mut saved_students = 0usize;
    let mut saved_rows = 0usize;
    let mut failed: Vec<serde_json::Value> = Vec::new();
    for r in store.snapshot() {
        match db::save_student_results(conn, &session.session_id, &r, store.divisor()) {
            Ok(n) => {
                saved_students += 1;
                saved_rows += n;
            }
            Err(e) => {
                warn!(student = %r.student_id, error = %e, "saving student results failed");
                failed.push(json!({
                    "studentId": r.student_id,
                    "code": "db_insert_failed",
                    "message": e.to_string(),
                }));
            }
        }
    }

    info!(
        session = %session.session_id,
        saved_students,
        failed = failed.len(),
        "entry session saved"
    );

    ok(
        &req.id,
        json!({
            "savedStudents": saved_students,
            "savedRows": saved_rows,
            "failed": failed,
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "entry.open" => Some(handle_entry_open(state, req)),
        "entry.setCell" => Some(handle_entry_set_cell(state, req)),
        "entry.getCell" => Some(handle_entry_get_cell(state, req)),
        "entry.paste" => Some(handle_entry_paste(state, req)),
        "entry.applyRecords" => Some(handle_entry_apply_records(state, req)),
        "entry.navigate" => Some(handle_entry_navigate(state, req)),
        "entry.snapshot" => Some(handle_entry_snapshot(state, req)),
        "entry.status" => Some(handle_entry_status(state, req)),
        "entry.clear" => Some(handle_entry_clear(state, req)),
        "entry.close" => Some(handle_entry_close(state, req)),
        "entry.save" => Some(handle_entry_save(state, req)),
        _ => None,
    }
}
