use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::handlers::{get_required_str, require_db};
use crate::ipc::types::{AppState, Request};
use crate::settings::ReportSettings;
use serde_json::json;

#[derive(Clone, Copy)]
enum SetupSection {
    Report,
}

impl SetupSection {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "report" => Some(Self::Report),
            _ => None,
        }
    }
}

fn section_param(req: &Request) -> Result<SetupSection, HandlerErr> {
    let name = get_required_str(&req.params, "section")?;
    SetupSection::parse(&name)
        .ok_or_else(|| HandlerErr::bad_params(format!("unknown section: {}", name)))
}

fn setup_get(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    match section_param(req)? {
        SetupSection::Report => Ok(json!({ "report": ReportSettings::load(conn) })),
    }
}

fn setup_update(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let section = section_param(req)?;
    let Some(patch) = req.params.get("patch") else {
        return Err(HandlerErr::bad_params("missing patch"));
    };
    let conn = require_db(state)?;
    match section {
        SetupSection::Report => {
            let current = ReportSettings::load(conn);
            let next = current.apply_patch(patch).map_err(HandlerErr::bad_params)?;
            next.save(conn)
                .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;
            // Worksheet names or grading inputs may have changed.
            state.cache.invalidate_all();
            state.cache.set_ttl(next.cache_ttl());
            Ok(json!({ "report": next }))
        }
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "setup.get" => setup_get(state, req),
        "setup.update" => setup_update(state, req),
        _ => return None,
    };
    Some(match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}
