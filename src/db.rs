use crate::entry::net::compute_net;
use crate::entry::{PenaltyDivisor, ResultRecord, Student, StudentResult, Subject};
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;
use uuid::Uuid;

pub const DB_FILE_NAME: &str = "examd.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS exam_types(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            penalty_divisor REAL NOT NULL CHECK (penalty_divisor > 0)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS subjects(
            id TEXT PRIMARY KEY,
            exam_type_id TEXT NOT NULL,
            name TEXT NOT NULL,
            question_count INTEGER NOT NULL CHECK (question_count > 0),
            sort_order INTEGER NOT NULL,
            FOREIGN KEY(exam_type_id) REFERENCES exam_types(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_subjects_exam_type_sort ON subjects(exam_type_id, sort_order)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            student_no TEXT,
            sort_order INTEGER NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS exam_sessions(
            id TEXT PRIMARY KEY,
            exam_type_id TEXT NOT NULL,
            name TEXT NOT NULL,
            exam_date TEXT,
            FOREIGN KEY(exam_type_id) REFERENCES exam_types(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_exam_sessions_exam_type ON exam_sessions(exam_type_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS exam_results(
            id TEXT PRIMARY KEY,
            session_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            subject_id TEXT NOT NULL,
            correct_count INTEGER NOT NULL,
            wrong_count INTEGER NOT NULL,
            empty_count INTEGER NOT NULL,
            net REAL NOT NULL,
            updated_at TEXT,
            FOREIGN KEY(session_id) REFERENCES exam_sessions(id),
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(subject_id) REFERENCES subjects(id),
            UNIQUE(session_id, student_id, subject_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_exam_results_session ON exam_results(session_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    Ok(conn)
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(s) => Ok(Some(serde_json::from_str(&s)?)),
        None => Ok(None),
    }
}

pub fn settings_set_json(
    conn: &Connection,
    key: &str,
    value: &serde_json::Value,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct ExamTypeRow {
    pub id: String,
    pub name: String,
    pub penalty_divisor: f64,
}

#[derive(Debug, Clone)]
pub struct SessionRow {
    pub id: String,
    pub exam_type_id: String,
    pub name: String,
    pub exam_date: Option<String>,
}

pub fn get_exam_type(conn: &Connection, exam_type_id: &str) -> anyhow::Result<Option<ExamTypeRow>> {
    Ok(conn
        .query_row(
            "SELECT id, name, penalty_divisor FROM exam_types WHERE id = ?",
            [exam_type_id],
            |r| {
                Ok(ExamTypeRow {
                    id: r.get(0)?,
                    name: r.get(1)?,
                    penalty_divisor: r.get(2)?,
                })
            },
        )
        .optional()?)
}

pub fn get_session(conn: &Connection, session_id: &str) -> anyhow::Result<Option<SessionRow>> {
    Ok(conn
        .query_row(
            "SELECT id, exam_type_id, name, exam_date FROM exam_sessions WHERE id = ?",
            [session_id],
            |r| {
                Ok(SessionRow {
                    id: r.get(0)?,
                    exam_type_id: r.get(1)?,
                    name: r.get(2)?,
                    exam_date: r.get(3)?,
                })
            },
        )
        .optional()?)
}

pub fn list_subjects(conn: &Connection, exam_type_id: &str) -> anyhow::Result<Vec<Subject>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, question_count FROM subjects
         WHERE exam_type_id = ?
         ORDER BY sort_order",
    )?;
    let rows = stmt
        .query_map([exam_type_id], |r| {
            Ok(Subject {
                id: r.get(0)?,
                name: r.get(1)?,
                question_count: r.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn list_students(conn: &Connection) -> anyhow::Result<Vec<Student>> {
    let mut stmt = conn.prepare(
        "SELECT id, first_name, last_name, student_no FROM students ORDER BY sort_order",
    )?;
    let rows = stmt
        .query_map([], |r| {
            Ok(Student {
                id: r.get(0)?,
                first_name: r.get(1)?,
                last_name: r.get(2)?,
                student_no: r.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Persisted rows for a session, optionally narrowed to one student.
pub fn load_results(
    conn: &Connection,
    session_id: &str,
    student_id: Option<&str>,
) -> anyhow::Result<Vec<ResultRecord>> {
    let map_row = |r: &rusqlite::Row<'_>| {
        Ok(ResultRecord {
            student_id: r.get(0)?,
            subject_id: r.get(1)?,
            correct_count: r.get(2)?,
            wrong_count: r.get(3)?,
            empty_count: r.get(4)?,
        })
    };
    let rows = match student_id {
        Some(sid) => {
            let mut stmt = conn.prepare(
                "SELECT student_id, subject_id, correct_count, wrong_count, empty_count
                 FROM exam_results
                 WHERE session_id = ? AND student_id = ?
                 ORDER BY rowid",
            )?;
            let v = stmt
                .query_map((session_id, sid), map_row)?
                .collect::<Result<Vec<_>, _>>()?;
            v
        }
        None => {
            let mut stmt = conn.prepare(
                "SELECT student_id, subject_id, correct_count, wrong_count, empty_count
                 FROM exam_results
                 WHERE session_id = ?
                 ORDER BY rowid",
            )?;
            let v = stmt
                .query_map([session_id], map_row)?
                .collect::<Result<Vec<_>, _>>()?;
            v
        }
    };
    Ok(rows)
}

/// Upserts one student's subject rows in a single transaction. Either every
/// row lands or none does.
pub fn save_student_results(
    conn: &Connection,
    session_id: &str,
    result: &StudentResult,
    divisor: PenaltyDivisor,
) -> anyhow::Result<usize> {
    let now = chrono::Utc::now().to_rfc3339();
    let tx = conn.unchecked_transaction()?;
    let mut written = 0usize;
    for sr in &result.subjects {
        let net = compute_net(sr.correct_count, sr.wrong_count, divisor);
        tx.execute(
            "INSERT INTO exam_results(
               id, session_id, student_id, subject_id,
               correct_count, wrong_count, empty_count, net, updated_at)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(session_id, student_id, subject_id) DO UPDATE SET
               correct_count = excluded.correct_count,
               wrong_count = excluded.wrong_count,
               empty_count = excluded.empty_count,
               net = excluded.net,
               updated_at = excluded.updated_at",
            rusqlite::params![
                Uuid::new_v4().to_string(),
                session_id,
                &result.student_id,
                &sr.subject_id,
                sr.correct_count,
                sr.wrong_count,
                sr.empty_count,
                net,
                &now,
            ],
        )?;
        written += 1;
    }
    tx.commit()?;
    Ok(written)
}
