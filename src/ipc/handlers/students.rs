use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::mutate::{MutationManager, NewStudent};
use crate::settings::ReportSettings;
use crate::store::SqliteStore;
use serde_json::json;
use std::collections::HashSet;

fn opt_str(params: &serde_json::Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

fn opt_i64(params: &serde_json::Value, key: &str) -> Result<Option<i64>, HandlerErr> {
    match params.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(v) => v
            .as_i64()
            .map(Some)
            .ok_or_else(|| HandlerErr::bad_params(format!("{} must be integer", key))),
    }
}

fn parse_new_student(params: &serde_json::Value) -> Result<NewStudent, HandlerErr> {
    let Some(student_id) = opt_i64(params, "studentId")? else {
        return Err(HandlerErr::bad_params("missing studentId"));
    };
    Ok(NewStudent {
        student_id,
        class_no: opt_i64(params, "classNo")?,
        title: opt_str(params, "title").unwrap_or_default(),
        first_name: opt_str(params, "firstName").unwrap_or_default(),
        last_name: opt_str(params, "lastName").unwrap_or_default(),
        class: opt_str(params, "class"),
        status: opt_str(params, "status"),
    })
}

fn students_create(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let new = parse_new_student(&req.params)?;
    let conn = state
        .db
        .as_ref()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))?;
    let settings = ReportSettings::load(conn);
    let names = settings.worksheet_names();
    let mut store = SqliteStore::new(conn);
    let mut mgr = MutationManager::new(&mut store, &mut state.cache, &names);
    let student = mgr.insert(new, &settings.student_defaults())?;
    Ok(json!({ "student": student }))
}

fn students_delete(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let Some(raw) = req.params.get("studentIds").and_then(|v| v.as_array()) else {
        return Err(HandlerErr::bad_params("missing studentIds"));
    };
    let mut ids: HashSet<i64> = HashSet::with_capacity(raw.len());
    for v in raw {
        let id = v
            .as_i64()
            .ok_or_else(|| HandlerErr::bad_params("studentIds must be integers"))?;
        ids.insert(id);
    }

    let conn = state
        .db
        .as_ref()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))?;
    let names = ReportSettings::load(conn).worksheet_names();
    let mut store = SqliteStore::new(conn);
    let mut mgr = MutationManager::new(&mut store, &mut state.cache, &names);
    let (removed_students, removed_score_rows) = mgr.delete(&ids)?;
    Ok(json!({
        "removedStudents": removed_students,
        "removedScoreRows": removed_score_rows,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "students.create" => students_create(state, req),
        "students.delete" => students_delete(state, req),
        _ => return None,
    };
    Some(match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}
