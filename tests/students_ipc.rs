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
    let exe = env!("CARGO_BIN_EXE_gradebookd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn gradebookd");
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
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown error")
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn request_err_code(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> String {
    let value = request(stdin, reader, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(false),
        "{} unexpectedly succeeded: {}",
        method,
        value
    );
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string()
}

const STUDENTS_CSV: &str = "class_no,student_id,title,first_name,last_name,class,status\n\
1,101,Mr,Arthit,Chai,M.1/1,active\n\
2,102,Ms,Kanya,Suk,M.1/1,active\n\
3,103,Mr,Nop,Wong,M.1/1,active\n";

const SCORES_CSV: &str = "class_no,student_id,math_midterm,math_final,sci_lab,sci_exam\n\
1,101,40,45,30,25\n\
2,102,30,28,,20\n\
4,104,10,10,10,10\n";

fn seed_workspace(stdin: &mut ChildStdin, reader: &mut BufReader<ChildStdout>, prefix: &str) -> PathBuf {
    let workspace = temp_dir(prefix);
    let _ = request_ok(
        stdin,
        reader,
        "seed-ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _ = request_ok(
        stdin,
        reader,
        "seed-students",
        "worksheets.importCsv",
        json!({ "name": "student_master", "text": STUDENTS_CSV }),
    );
    let _ = request_ok(
        stdin,
        reader,
        "seed-scores",
        "worksheets.importCsv",
        json!({ "name": "scores_master", "text": SCORES_CSV }),
    );
    workspace
}

fn student_ids(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    worksheet: &str,
) -> Vec<i64> {
    let ws = request_ok(stdin, reader, id, "worksheets.get", json!({ "name": worksheet }));
    let columns = ws["columns"].as_array().cloned().unwrap_or_default();
    let idx = columns
        .iter()
        .position(|c| c.as_str() == Some("student_id"))
        .expect("student_id column");
    ws["rows"]
        .as_array()
        .cloned()
        .unwrap_or_default()
        .iter()
        .filter_map(|r| r.get(idx).and_then(|v| v.as_f64()).map(|v| v as i64))
        .collect()
}

#[test]
fn create_adds_roster_row_and_zeroed_scores() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let workspace = seed_workspace(&mut stdin, &mut reader, "gradebook-students-create");

    // Warm the cache so the write has something to invalidate.
    let _ = request_ok(&mut stdin, &mut reader, "0", "report.open", json!({}));

    let created = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "students.create",
        json!({
            "studentId": 105,
            "title": "Ms",
            "firstName": "  Mali ",
            "lastName": "Dee"
        }),
    );
    let student = &created["student"];
    assert_eq!(student["studentId"], json!(105));
    assert_eq!(student["classNo"], json!(4));
    assert_eq!(student["firstName"], json!("Mali"));
    assert_eq!(student["status"], json!("active"));

    let scores = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "worksheets.get",
        json!({ "name": "scores_master" }),
    );
    let last = scores["rows"]
        .as_array()
        .and_then(|rows| rows.last().cloned())
        .expect("new score row");
    assert_eq!(last[1].as_f64(), Some(105.0));
    for v in last.as_array().expect("cells").iter().skip(2) {
        assert_eq!(v.as_f64(), Some(0.0));
    }

    let report = request_ok(&mut stdin, &mut reader, "3", "report.open", json!({}));
    let rows = report["rows"].as_array().cloned().expect("rows");
    assert_eq!(rows.len(), 3);
    let mali = rows
        .iter()
        .find(|r| r["student_id"] == json!(105))
        .expect("new student in report");
    assert_eq!(mali["math_total"].as_f64(), Some(0.0));
    assert_eq!(mali["math_grade"].as_f64(), Some(0.0));

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn create_rejects_invalid_input_without_writing() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let workspace = seed_workspace(&mut stdin, &mut reader, "gradebook-students-invalid");

    let cases = [
        json!({ "studentId": 200, "firstName": " ", "lastName": "Dee" }),
        json!({ "studentId": 200, "firstName": "Mali" }),
        json!({ "studentId": 0, "firstName": "Mali", "lastName": "Dee" }),
        json!({ "studentId": -4, "firstName": "Mali", "lastName": "Dee" }),
        json!({ "studentId": 101, "firstName": "Mali", "lastName": "Dee" }),
    ];
    for (i, params) in cases.into_iter().enumerate() {
        let code = request_err_code(
            &mut stdin,
            &mut reader,
            &format!("bad-{}", i),
            "students.create",
            params,
        );
        assert_eq!(code, "validation_failed", "case {}", i);
    }

    let code = request_err_code(
        &mut stdin,
        &mut reader,
        "missing-id",
        "students.create",
        json!({ "firstName": "Mali", "lastName": "Dee" }),
    );
    assert_eq!(code, "bad_params");

    assert_eq!(
        student_ids(&mut stdin, &mut reader, "roster", "student_master"),
        vec![101, 102, 103]
    );
    assert_eq!(
        student_ids(&mut stdin, &mut reader, "scores", "scores_master"),
        vec![101, 102, 104]
    );

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn create_then_delete_restores_both_worksheets() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let workspace = seed_workspace(&mut stdin, &mut reader, "gradebook-students-roundtrip");

    let roster_before = student_ids(&mut stdin, &mut reader, "r0", "student_master");
    let scores_before = student_ids(&mut stdin, &mut reader, "s0", "scores_master");

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "students.create",
        json!({ "studentId": 150, "firstName": "Tee", "lastName": "Ra" }),
    );
    assert_eq!(
        student_ids(&mut stdin, &mut reader, "r1", "student_master").len(),
        roster_before.len() + 1
    );

    let deleted = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "students.delete",
        json!({ "studentIds": [150] }),
    );
    assert_eq!(deleted["removedStudents"], json!(1));
    assert_eq!(deleted["removedScoreRows"], json!(1));

    assert_eq!(
        student_ids(&mut stdin, &mut reader, "r2", "student_master"),
        roster_before
    );
    assert_eq!(
        student_ids(&mut stdin, &mut reader, "s2", "scores_master"),
        scores_before
    );

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn delete_removes_from_both_tables_and_ignores_unknown_ids() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let workspace = seed_workspace(&mut stdin, &mut reader, "gradebook-students-delete");

    let roster_ws = request_ok(
        &mut stdin,
        &mut reader,
        "0",
        "worksheets.get",
        json!({ "name": "student_master" }),
    );

    let none = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "students.delete",
        json!({ "studentIds": [] }),
    );
    assert_eq!(none["removedStudents"], json!(0));
    let unknown = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "students.delete",
        json!({ "studentIds": [999] }),
    );
    assert_eq!(unknown["removedScoreRows"], json!(0));
    let unchanged = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "worksheets.get",
        json!({ "name": "student_master" }),
    );
    assert_eq!(unchanged, roster_ws);

    // 104 only exists in the scores worksheet.
    let res = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "students.delete",
        json!({ "studentIds": [101, 104] }),
    );
    assert_eq!(res["removedStudents"], json!(1));
    assert_eq!(res["removedScoreRows"], json!(2));

    let report = request_ok(&mut stdin, &mut reader, "5", "report.open", json!({}));
    let rows = report["rows"].as_array().cloned().expect("rows");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["student_id"], json!(102));

    let code = request_err_code(
        &mut stdin,
        &mut reader,
        "6",
        "students.delete",
        json!({ "studentIds": ["abc"] }),
    );
    assert_eq!(code, "bad_params");

    let _ = std::fs::remove_dir_all(workspace);
}
