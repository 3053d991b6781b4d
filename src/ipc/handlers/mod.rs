pub mod core;
pub mod report;
pub mod setup;
pub mod students;
pub mod worksheets;

use crate::ipc::error::HandlerErr;
use crate::ipc::types::AppState;
use rusqlite::Connection;

pub(crate) fn require_db(state: &AppState) -> Result<&Connection, HandlerErr> {
    state
        .db
        .as_ref()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

pub(crate) fn get_required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}
