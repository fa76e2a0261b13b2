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
    let _ = request_ok(
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
        students,
        session_id: str_field(&session, "sessionId"),
    }
}

#[test]
fn setup_entry_defaults_and_updates_persist() {
    let workspace = temp_dir("examd-setup-entry");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let initial = request_ok(&mut stdin, &mut reader, "get-1", "setup.get", json!({}));
    assert_eq!(
        initial.pointer("/entry/defaultPenaltyDivisor").and_then(|v| v.as_f64()),
        Some(4.0)
    );
    assert_eq!(
        initial.pointer("/entry/netDisplayDecimals").and_then(|v| v.as_u64()),
        Some(2)
    );
    assert_eq!(
        initial.pointer("/entry/maxPasteLines").and_then(|v| v.as_u64()),
        Some(2000)
    );

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "upd",
        "setup.update",
        json!({
            "section": "entry",
            "patch": { "defaultPenaltyDivisor": 3, "netDisplayDecimals": 1 }
        }),
    );

    let exam_type = request_ok(
        &mut stdin,
        &mut reader,
        "et",
        "examTypes.create",
        json!({ "name": "LGS" }),
    );
    assert_eq!(exam_type.get("penaltyDivisor").and_then(|v| v.as_f64()), Some(3.0));
    drop(stdin);

    // A fresh process sees the saved section.
    let (_child2, mut stdin2, mut reader2) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin2,
        &mut reader2,
        "ws-2",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let after = request_ok(&mut stdin2, &mut reader2, "get-2", "setup.get", json!({}));
    assert_eq!(
        after.pointer("/entry/defaultPenaltyDivisor").and_then(|v| v.as_f64()),
        Some(3.0)
    );
    assert_eq!(
        after.pointer("/entry/netDisplayDecimals").and_then(|v| v.as_u64()),
        Some(1)
    );
    assert_eq!(
        after.pointer("/entry/maxPasteLines").and_then(|v| v.as_u64()),
        Some(2000)
    );
}

#[test]
fn setup_update_rejects_out_of_range_values() {
    let workspace = temp_dir("examd-setup-invalid");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    for (i, patch) in [
        json!({ "defaultPenaltyDivisor": 0 }),
        json!({ "defaultPenaltyDivisor": 11 }),
        json!({ "netDisplayDecimals": 5 }),
        json!({ "maxPasteLines": 0 }),
        json!({ "colour": "blue" }),
    ]
    .into_iter()
    .enumerate()
    {
        let resp = request(
            &mut stdin,
            &mut reader,
            &format!("bad-{}", i),
            "setup.update",
            json!({ "section": "entry", "patch": patch }),
        );
        assert_eq!(
            resp.pointer("/error/code").and_then(|v| v.as_str()),
            Some("bad_params"),
            "patch {} should be rejected",
            patch
        );
    }

    let section = request(
        &mut stdin,
        &mut reader,
        "bad-section",
        "setup.update",
        json!({ "section": "reports", "patch": {} }),
    );
    assert_eq!(section.pointer("/error/code").and_then(|v| v.as_str()), Some("bad_params"));

    let unchanged = request_ok(&mut stdin, &mut reader, "get", "setup.get", json!({}));
    assert_eq!(
        unchanged.pointer("/entry/defaultPenaltyDivisor").and_then(|v| v.as_f64()),
        Some(4.0)
    );
}

#[test]
fn net_display_decimals_applies_to_display_totals() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let seed = seed_workspace(&mut stdin, &mut reader, "examd-setup-decimals");
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "upd",
        "setup.update",
        json!({ "section": "entry", "patch": { "netDisplayDecimals": 0 } }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "open",
        "entry.open",
        json!({ "sessionId": seed.session_id }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "c1",
        "entry.setCell",
        json!({ "studentId": seed.students[0], "subjectId": seed.tur, "field": "correct", "value": "7" }),
    );
    let cell = request_ok(
        &mut stdin,
        &mut reader,
        "c2",
        "entry.setCell",
        json!({ "studentId": seed.students[0], "subjectId": seed.tur, "field": "wrong", "value": "2" }),
    );
    assert_eq!(cell.get("totalNet").and_then(|v| v.as_f64()), Some(6.5));
    assert_eq!(cell.get("totalNetDisplay").and_then(|v| v.as_f64()), Some(7.0));
}
