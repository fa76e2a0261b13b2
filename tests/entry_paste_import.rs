use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_examd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn examd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn str_field(v: &serde_json::Value, key: &str) -> String {
    v.get(key)
        .and_then(|x| x.as_str())
        .unwrap_or_else(|| panic!("missing {} in {}", key, v))
        .to_string()
}

struct Seed {
    tur: String,
    mat: String,
    students: Vec<String>,
    session_id: String,
}

fn seed_workspace(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    prefix: &str,
) -> Seed {
    let workspace = temp_dir(prefix);
    let _ = request_ok(
        stdin,
        reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let exam_type = request_ok(
        stdin,
        reader,
        "et",
        "examTypes.create",
        json!({ "name": "TYT", "penaltyDivisor": 4 }),
    );
    let exam_type_id = str_field(&exam_type, "examTypeId");
    let tur = request_ok(
        stdin,
        reader,
        "sub-tur",
        "subjects.create",
        json!({ "examTypeId": exam_type_id, "name": "Turkce", "questionCount": 40 }),
    );
    let mat = request_ok(
        stdin,
        reader,
        "sub-mat",
        "subjects.create",
        json!({ "examTypeId": exam_type_id, "name": "Matematik", "questionCount": 20 }),
    );

    let mut students = Vec::new();
    for (i, (first, last, no)) in [
        ("Ali", "Yilmaz", Some("1024")),
        ("Zeynep", "Kaya", Some("1025")),
        ("Can", "Demir", None),
    ]
    .iter()
    .enumerate()
    {
        let created = request_ok(
            stdin,
            reader,
            &format!("st-{}", i),
            "students.create",
            json!({ "firstName": first, "lastName": last, "studentNo": no }),
        );
        students.push(str_field(&created, "studentId"));
    }

    let session = request_ok(
        stdin,
        reader,
        "sess",
        "sessions.create",
        json!({ "examTypeId": exam_type_id, "name": "Deneme 3", "examDate": "2026-03-14" }),
    );

    Seed {
        tur: str_field(&tur, "subjectId"),
        mat: str_field(&mat, "subjectId"),
        students,
        session_id: str_field(&session, "sessionId"),
    }
}

const CLASS_PASTE: &str = "Ogrenci\tTurkce D\tTurkce Y\tTurkce B\tMat D\tMat Y\tMat B\r\n\
1024\t30\t8\t2\t15\t5\t0\r\n\
Zeynep Kaya\t36\t4\t0\t17\t2\t1\r\n\
\r\n\
candemir\t20\t10\r\n";

fn snapshot_totals(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
) -> Vec<(String, f64)> {
    let snap = request_ok(stdin, reader, "snap", "entry.snapshot", json!({}));
    snap.get("students")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default()
        .iter()
        .map(|s| {
            (
                str_field(s, "studentId"),
                s.get("totalNet").and_then(|v| v.as_f64()).unwrap_or(-1.0),
            )
        })
        .collect()
}

#[test]
fn paste_matches_by_number_name_and_compact_name() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let seed = seed_workspace(&mut stdin, &mut reader, "examd-paste-match");
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "open",
        "entry.open",
        json!({ "sessionId": seed.session_id }),
    );

    let pasted = request_ok(
        &mut stdin,
        &mut reader,
        "paste",
        "entry.paste",
        json!({ "text": CLASS_PASTE }),
    );
    assert_eq!(pasted.get("totalLines").and_then(|v| v.as_u64()), Some(4));
    assert_eq!(pasted.get("appliedRows").and_then(|v| v.as_u64()), Some(3));
    assert_eq!(pasted.get("skippedRows").and_then(|v| v.as_u64()), Some(1));
    assert_eq!(pasted.get("invalidCells").and_then(|v| v.as_u64()), Some(0));
    assert_eq!(pasted.get("limitExceeded").and_then(|v| v.as_bool()), Some(false));

    let warnings = pasted
        .get("warnings")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();
    let kinds: Vec<&str> = warnings
        .iter()
        .filter_map(|w| w.get("kind").and_then(|v| v.as_str()))
        .collect();
    assert_eq!(kinds, vec!["unmatched_student", "short_row"]);
    assert_eq!(warnings[0].get("token").and_then(|v| v.as_str()), Some("Ogrenci"));
    assert_eq!(warnings[1].get("line").and_then(|v| v.as_u64()), Some(5));

    let totals = snapshot_totals(&mut stdin, &mut reader);
    assert_eq!(
        totals,
        vec![
            (seed.students[0].clone(), 41.75),
            (seed.students[1].clone(), 51.5),
            (seed.students[2].clone(), 17.5),
        ]
    );

    let can_mat = request_ok(
        &mut stdin,
        &mut reader,
        "get",
        "entry.getCell",
        json!({ "studentId": seed.students[2], "subjectId": seed.mat }),
    );
    assert_eq!(can_mat.pointer("/cell/correctCount").and_then(|v| v.as_u64()), Some(0));
}

#[test]
fn pasted_cells_are_validated_like_typed_ones() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let seed = seed_workspace(&mut stdin, &mut reader, "examd-paste-validate");
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "open",
        "entry.open",
        json!({ "sessionId": seed.session_id }),
    );

    let pasted = request_ok(
        &mut stdin,
        &mut reader,
        "paste",
        "entry.paste",
        json!({ "text": "Ali Yilmaz\t30\tx\t2\t0\t0\t25" }),
    );
    assert_eq!(pasted.get("appliedRows").and_then(|v| v.as_u64()), Some(1));
    assert_eq!(pasted.get("invalidCells").and_then(|v| v.as_u64()), Some(1));
    assert_eq!(pasted.get("errorCount").and_then(|v| v.as_u64()), Some(1));
    let warning = pasted.pointer("/warnings/0").cloned().unwrap_or_default();
    assert_eq!(warning.get("kind").and_then(|v| v.as_str()), Some("non_numeric"));
    assert_eq!(warning.get("column").and_then(|v| v.as_u64()), Some(3));

    let status = request_ok(&mut stdin, &mut reader, "status", "entry.status", json!({}));
    assert_eq!(
        status.pointer("/errors/0/code").and_then(|v| v.as_str()),
        Some("exceeds_question_count")
    );
    assert_eq!(
        status.pointer("/errors/0/subjectId").and_then(|v| v.as_str()),
        Some(seed.mat.as_str())
    );
    assert_eq!(
        status.pointer("/errors/0/field").and_then(|v| v.as_str()),
        Some("empty")
    );
}

#[test]
fn paste_over_line_limit_applies_nothing() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let seed = seed_workspace(&mut stdin, &mut reader, "examd-paste-limit");
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "setup",
        "setup.update",
        json!({ "section": "entry", "patch": { "maxPasteLines": 2 } }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "open",
        "entry.open",
        json!({ "sessionId": seed.session_id }),
    );

    let pasted = request_ok(
        &mut stdin,
        &mut reader,
        "paste",
        "entry.paste",
        json!({ "text": CLASS_PASTE }),
    );
    assert_eq!(pasted.get("limitExceeded").and_then(|v| v.as_bool()), Some(true));
    assert_eq!(pasted.get("appliedRows").and_then(|v| v.as_u64()), Some(0));
    assert!(snapshot_totals(&mut stdin, &mut reader).is_empty());
}

#[test]
fn apply_records_skips_unknown_ids() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let seed = seed_workspace(&mut stdin, &mut reader, "examd-apply-records");
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "open",
        "entry.open",
        json!({ "sessionId": seed.session_id }),
    );

    let applied = request_ok(
        &mut stdin,
        &mut reader,
        "apply",
        "entry.applyRecords",
        json!({
            "records": [
                { "studentId": seed.students[1], "subjectId": seed.tur, "correctCount": 20, "wrongCount": 4 },
                { "studentId": seed.students[1], "subjectId": "no-such-subject", "correctCount": 1 },
                { "studentId": "ghost", "subjectId": seed.mat, "correctCount": 1 }
            ]
        }),
    );
    assert_eq!(applied.get("applied").and_then(|v| v.as_u64()), Some(1));
    assert_eq!(applied.get("skipped").and_then(|v| v.as_u64()), Some(2));

    let totals = snapshot_totals(&mut stdin, &mut reader);
    assert_eq!(totals, vec![(seed.students[1].clone(), 19.0)]);

    let bad = request(
        &mut stdin,
        &mut reader,
        "apply-bad",
        "entry.applyRecords",
        json!({ "records": [{ "studentId": seed.students[0] }] }),
    );
    assert_eq!(bad.pointer("/error/code").and_then(|v| v.as_str()), Some("bad_params"));
}
