use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::handlers::{get_required_str, require_db};
use crate::ipc::types::{AppState, Request};
use crate::report::{build_report, subject_summary, Report};
use crate::settings::ReportSettings;
use crate::sheet::{Roster, ScoreTable};
use crate::store::{SqliteStore, WorksheetStore};
use chrono::Utc;
use serde_json::json;

/// Reads both source worksheets through the cache and builds a fresh report.
fn load_report(state: &mut AppState) -> Result<Report, HandlerErr> {
    let conn = state
        .db
        .as_ref()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))?;
    let settings = ReportSettings::load(conn);
    let store = SqliteStore::new(conn);
    let cache = &mut state.cache;
    cache.set_ttl(settings.cache_ttl());

    let now = Utc::now();
    let roster_ws = cache.get_or_fetch(&settings.student_worksheet, now, |n| store.fetch(n))?;
    let scores_ws = cache.get_or_fetch(&settings.scores_worksheet, now, |n| store.fetch(n))?;

    let roster = Roster::from_worksheet(&settings.student_worksheet, &roster_ws)?;
    let scores = ScoreTable::from_worksheet(&settings.scores_worksheet, &scores_ws)?;
    Ok(build_report(
        &roster,
        &scores,
        &settings.scores_worksheet,
        &settings.grade_scale(),
    )?)
}

fn report_open(state: &mut AppState) -> Result<serde_json::Value, HandlerErr> {
    let report = load_report(state)?;
    let rows: Vec<serde_json::Value> = report.rows.iter().map(|r| report.row_json(r)).collect();
    Ok(json!({
        "columns": report.columns(),
        "scoreColumns": report.score_columns,
        "subjects": report.subjects,
        "rows": rows,
    }))
}

fn report_subjects(state: &mut AppState) -> Result<serde_json::Value, HandlerErr> {
    let report = load_report(state)?;
    Ok(json!({ "subjects": report.subjects }))
}

fn report_subject_summary(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let subject = get_required_str(&req.params, "subject")?;
    let report = load_report(state)?;
    let summary = subject_summary(&report, &subject)
        .ok_or_else(|| HandlerErr::new("not_found", format!("unknown subject: {}", subject)))?;
    Ok(json!({ "summary": summary }))
}

fn report_refresh(state: &mut AppState) -> Result<serde_json::Value, HandlerErr> {
    require_db(state)?;
    state.cache.invalidate_all();
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "report.open" => report_open(state),
        "report.subjects" => report_subjects(state),
        "report.subjectSummary" => report_subject_summary(state, req),
        "report.refresh" => report_refresh(state),
        _ => return None,
    };
    Some(match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}
