use crate::csv_import;
use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::handlers::{get_required_str, require_db};
use crate::ipc::types::{AppState, Request};
use crate::store::{SqliteStore, WorksheetStore};
use serde_json::json;
use std::path::PathBuf;

fn worksheets_list(state: &mut AppState) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let list = SqliteStore::new(conn).list()?;
    Ok(json!({ "worksheets": list }))
}

fn worksheets_get(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let name = get_required_str(&req.params, "name")?;
    let conn = require_db(state)?;
    let ws = SqliteStore::new(conn).fetch(&name)?;
    let rows: Vec<Vec<serde_json::Value>> = ws
        .rows
        .iter()
        .map(|r| r.iter().map(|c| c.to_json()).collect())
        .collect();
    Ok(json!({
        "name": name,
        "columns": ws.columns,
        "rows": rows,
    }))
}

/// Loads a CSV export (file path or inline text) as a full worksheet replacement.
fn worksheets_import_csv(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let name = get_required_str(&req.params, "name")?;
    if name.trim().is_empty() {
        return Err(HandlerErr::bad_params("name must not be empty"));
    }
    let parsed = match (
        req.params.get("path").and_then(|v| v.as_str()),
        req.params.get("text").and_then(|v| v.as_str()),
    ) {
        (Some(path), _) => csv_import::read_csv_file(&PathBuf::from(path)),
        (None, Some(text)) => csv_import::parse_csv(text),
        (None, None) => return Err(HandlerErr::bad_params("missing path or text")),
    };
    let ws = parsed.map_err(|e| HandlerErr::new("csv_parse_failed", format!("{e:#}")))?;

    let conn = require_db(state)?;
    SqliteStore::new(conn).replace(&name, &ws)?;
    state.cache.invalidate(&name);
    tracing::info!(worksheet = %name, rows = ws.rows.len(), "worksheet imported from csv");
    Ok(json!({
        "name": name,
        "columnCount": ws.columns.len(),
        "rowCount": ws.rows.len(),
    }))
}

fn worksheets_export_csv(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let name = get_required_str(&req.params, "name")?;
    let conn = require_db(state)?;
    let ws = SqliteStore::new(conn).fetch(&name)?;
    let text = csv_import::export_csv(&ws);
    if let Some(out) = req.params.get("outPath").and_then(|v| v.as_str()) {
        std::fs::write(out, &text)
            .map_err(|e| HandlerErr::new("io_failed", format!("write {}: {}", out, e)))?;
        return Ok(json!({ "name": name, "outPath": out }));
    }
    Ok(json!({ "name": name, "text": text }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "worksheets.list" => worksheets_list(state),
        "worksheets.get" => worksheets_get(state, req),
        "worksheets.importCsv" => worksheets_import_csv(state, req),
        "worksheets.exportCsv" => worksheets_export_csv(state, req),
        _ => return None,
    };
    Some(match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}
