use crate::db;
use crate::entry::PenaltyDivisor;
use crate::ipc::error::{err, ok};
use crate::ipc::handlers::setup::load_entry_settings;
use crate::ipc::types::{AppState, Request};
use chrono::NaiveDate;
use serde_json::json;
use uuid::Uuid;

const SUBJECT_MAX_QUESTIONS: i64 = 1000;

fn required_str(req: &Request, key: &str) -> Result<String, serde_json::Value> {
    match req.params.get(key).and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        Some(_) => Err(err(
            &req.id,
            "bad_params",
            format!("{} must not be empty", key),
            None,
        )),
        None => Err(err(&req.id, "bad_params", format!("missing {}", key), None)),
    }
}

fn next_sort_order(conn: &rusqlite::Connection, sql: &str, arg: Option<&str>) -> rusqlite::Result<i64> {
    match arg {
        Some(a) => conn.query_row(sql, [a], |r| r.get(0)),
        None => conn.query_row(sql, [], |r| r.get(0)),
    }
}

fn handle_exam_types_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let name = match required_str(req, "name") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let divisor_raw = match req.params.get("penaltyDivisor") {
        None | Some(serde_json::Value::Null) => match load_entry_settings(conn) {
            Ok(s) => s.default_penalty_divisor,
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        },
        Some(v) => match v.as_f64() {
            Some(n) => n,
            None => return err(&req.id, "bad_params", "penaltyDivisor must be a number", None),
        },
    };
    let divisor = match PenaltyDivisor::new(divisor_raw) {
        Ok(d) => d,
        Err(e) => {
            return err(
                &req.id,
                "bad_params",
                e.to_string(),
                Some(json!({ "penaltyDivisor": divisor_raw })),
            )
        }
    };

    let exam_type_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO exam_types(id, name, penalty_divisor) VALUES(?, ?, ?)",
        (&exam_type_id, &name, divisor.get()),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "exam_types" })),
        );
    }

    ok(
        &req.id,
        json!({
            "examTypeId": exam_type_id,
            "name": name,
            "penaltyDivisor": divisor.get()
        }),
    )
}

fn handle_exam_types_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "examTypes": [] }));
    };

    let mut stmt = match conn.prepare(
        "SELECT
           et.id,
           et.name,
           et.penalty_divisor,
           (SELECT COUNT(*) FROM subjects s WHERE s.exam_type_id = et.id) AS subject_count
         FROM exam_types et
         ORDER BY et.name",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map([], |row| {
            let id: String = row.get(0)?;
            let name: String = row.get(1)?;
            let penalty_divisor: f64 = row.get(2)?;
            let subject_count: i64 = row.get(3)?;
            Ok(json!({
                "id": id,
                "name": name,
                "penaltyDivisor": penalty_divisor,
                "subjectCount": subject_count
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(exam_types) => ok(&req.id, json!({ "examTypes": exam_types })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_subjects_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let exam_type_id = match required_str(req, "examTypeId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let name = match required_str(req, "name") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let question_count = match req.params.get("questionCount").and_then(|v| v.as_i64()) {
        Some(n) if n > 0 && n <= SUBJECT_MAX_QUESTIONS => n,
        Some(n) => {
            return err(
                &req.id,
                "bad_params",
                format!("questionCount must be in 1..={}", SUBJECT_MAX_QUESTIONS),
                Some(json!({ "questionCount": n })),
            )
        }
        None => return err(&req.id, "bad_params", "missing/invalid questionCount", None),
    };

    match db::get_exam_type(conn, &exam_type_id) {
        Ok(Some(_)) => {}
        Ok(None) => return err(&req.id, "not_found", "exam type not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    }

    let sort_order = match next_sort_order(
        conn,
        "SELECT COALESCE(MAX(sort_order) + 1, 0) FROM subjects WHERE exam_type_id = ?",
        Some(&exam_type_id),
    ) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let subject_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO subjects(id, exam_type_id, name, question_count, sort_order)
         VALUES(?, ?, ?, ?, ?)",
        (&subject_id, &exam_type_id, &name, question_count, sort_order),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "subjects" })),
        );
    }

    ok(
        &req.id,
        json!({
            "subjectId": subject_id,
            "name": name,
            "questionCount": question_count,
            "sortOrder": sort_order
        }),
    )
}

fn handle_subjects_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let exam_type_id = match required_str(req, "examTypeId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match db::list_subjects(conn, &exam_type_id) {
        Ok(subjects) => ok(&req.id, json!({ "subjects": subjects })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_students_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let first_name = match required_str(req, "firstName") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let last_name = req
        .params
        .get("lastName")
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .unwrap_or_default();
    let student_no = req
        .params
        .get("studentNo")
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    let sort_order = match next_sort_order(
        conn,
        "SELECT COALESCE(MAX(sort_order) + 1, 0) FROM students",
        None,
    ) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let student_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO students(id, first_name, last_name, student_no, sort_order)
         VALUES(?, ?, ?, ?, ?)",
        (&student_id, &first_name, &last_name, &student_no, sort_order),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "students" })),
        );
    }

    ok(&req.id, json!({ "studentId": student_id, "sortOrder": sort_order }))
}

fn handle_students_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "students": [] }));
    };
    match db::list_students(conn) {
        Ok(students) => {
            let rows: Vec<serde_json::Value> = students
                .iter()
                .map(|s| {
                    json!({
                        "id": s.id,
                        "firstName": s.first_name,
                        "lastName": s.last_name,
                        "studentNo": s.student_no,
                        "displayName": s.display_name()
                    })
                })
                .collect();
            ok(&req.id, json!({ "students": rows }))
        }
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_sessions_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let exam_type_id = match required_str(req, "examTypeId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let name = match required_str(req, "name") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let exam_date = match req.params.get("examDate") {
        None | Some(serde_json::Value::Null) => None,
        Some(v) => {
            let raw = v.as_str().unwrap_or("").trim();
            match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
                Ok(d) => Some(d.format("%Y-%m-%d").to_string()),
                Err(_) => {
                    return err(
                        &req.id,
                        "bad_params",
                        "examDate must be YYYY-MM-DD",
                        Some(json!({ "examDate": v })),
                    )
                }
            }
        }
    };

    match db::get_exam_type(conn, &exam_type_id) {
        Ok(Some(_)) => {}
        Ok(None) => return err(&req.id, "not_found", "exam type not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    }

    let session_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO exam_sessions(id, exam_type_id, name, exam_date) VALUES(?, ?, ?, ?)",
        (&session_id, &exam_type_id, &name, &exam_date),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "exam_sessions" })),
        );
    }

    ok(
        &req.id,
        json!({ "sessionId": session_id, "name": name, "examDate": exam_date }),
    )
}

fn handle_sessions_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "sessions": [] }));
    };
    let exam_type_id = req
        .params
        .get("examTypeId")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());

    let mut stmt = match conn.prepare(
        "SELECT
           es.id,
           es.exam_type_id,
           es.name,
           es.exam_date,
           (SELECT COUNT(DISTINCT r.student_id) FROM exam_results r WHERE r.session_id = es.id)
         FROM exam_sessions es
         WHERE (?1 IS NULL OR es.exam_type_id = ?1)
         ORDER BY es.exam_date IS NULL, es.exam_date, es.name",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map([&exam_type_id], |row| {
            let id: String = row.get(0)?;
            let exam_type_id: String = row.get(1)?;
            let name: String = row.get(2)?;
            let exam_date: Option<String> = row.get(3)?;
            let student_count: i64 = row.get(4)?;
            Ok(json!({
                "id": id,
                "examTypeId": exam_type_id,
                "name": name,
                "examDate": exam_date,
                "resultStudentCount": student_count
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(sessions) => ok(&req.id, json!({ "sessions": sessions })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "examTypes.create" => Some(handle_exam_types_create(state, req)),
        "examTypes.list" => Some(handle_exam_types_list(state, req)),
        "subjects.create" => Some(handle_subjects_create(state, req)),
        "subjects.list" => Some(handle_subjects_list(state, req)),
        "students.create" => Some(handle_students_create(state, req)),
        "students.list" => Some(handle_students_list(state, req)),
        "sessions.create" => Some(handle_sessions_create(state, req)),
        "sessions.list" => Some(handle_sessions_list(state, req)),
        _ => None,
    }
}
