use crate::cache::DEFAULT_TTL_SECONDS;
use crate::db;
use crate::grade::DEFAULT_MAX_SCORE;
use crate::mutate::{StudentDefaults, WorksheetNames};
use crate::report::GradeScale;
use crate::subjects::SubjectId;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

pub const REPORT_SECTION_KEY: &str = "setup.report";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSettings {
    pub student_worksheet: String,
    pub scores_worksheet: String,
    pub max_score: f64,
    pub subject_max_scores: BTreeMap<String, f64>,
    pub cache_ttl_seconds: i64,
    pub default_class: String,
    pub default_status: String,
}

impl Default for ReportSettings {
    fn default() -> Self {
        let names = WorksheetNames::default();
        let defaults = StudentDefaults::default();
        Self {
            student_worksheet: names.students,
            scores_worksheet: names.scores,
            max_score: DEFAULT_MAX_SCORE,
            subject_max_scores: BTreeMap::new(),
            cache_ttl_seconds: DEFAULT_TTL_SECONDS,
            default_class: defaults.class,
            default_status: defaults.status,
        }
    }
}

impl ReportSettings {
    /// Stored section merged over the defaults. Unreadable values fall back
    /// to defaults field by field.
    pub fn load(conn: &Connection) -> Self {
        let mut merged = serde_json::to_value(Self::default()).unwrap_or_else(|_| json!({}));
        let stored = match db::settings_get_json(conn, REPORT_SECTION_KEY) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(
                    key = REPORT_SECTION_KEY,
                    error = %format!("{e:#}"),
                    "report settings unreadable, using defaults"
                );
                None
            }
        };
        if let Some(Value::Object(stored)) = stored {
            if let Some(target) = merged.as_object_mut() {
                for (k, v) in stored {
                    let mut candidate = Value::Object(target.clone());
                    candidate[k.as_str()] = v.clone();
                    if serde_json::from_value::<Self>(candidate).is_ok() {
                        target.insert(k, v);
                    }
                }
            }
        }
        serde_json::from_value(merged).unwrap_or_default()
    }

    pub fn save(&self, conn: &Connection) -> anyhow::Result<()> {
        db::settings_set_json(conn, REPORT_SECTION_KEY, &serde_json::to_value(self)?)
    }

    pub fn worksheet_names(&self) -> WorksheetNames {
        WorksheetNames {
            students: self.student_worksheet.clone(),
            scores: self.scores_worksheet.clone(),
        }
    }

    pub fn grade_scale(&self) -> GradeScale {
        GradeScale {
            default_max: self.max_score,
            per_subject: self
                .subject_max_scores
                .iter()
                .map(|(k, v)| (SubjectId::new(k.clone()), *v))
                .collect(),
        }
    }

    pub fn student_defaults(&self) -> StudentDefaults {
        StudentDefaults {
            class: self.default_class.clone(),
            status: self.default_status.clone(),
        }
    }

    pub fn cache_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.cache_ttl_seconds)
    }

    /// Applies a camelCase JSON patch, validating every field it touches.
    pub fn apply_patch(&self, patch: &Value) -> Result<Self, String> {
        let Some(obj) = patch.as_object() else {
            return Err("patch must be an object".to_string());
        };
        let mut next = self.clone();
        for (key, v) in obj {
            match key.as_str() {
                "studentWorksheet" => next.student_worksheet = parse_name(v, key)?,
                "scoresWorksheet" => next.scores_worksheet = parse_name(v, key)?,
                "maxScore" => next.max_score = parse_max_score(v, key)?,
                "subjectMaxScores" => next.subject_max_scores = parse_subject_max(v, key)?,
                "cacheTtlSeconds" => next.cache_ttl_seconds = parse_i64_range(v, key, 0, 3600)?,
                "defaultClass" => next.default_class = parse_string_max(v, key, 64)?,
                "defaultStatus" => next.default_status = parse_string_max(v, key, 64)?,
                _ => return Err(format!("unknown setting {}", key)),
            }
        }
        if next.student_worksheet == next.scores_worksheet {
            return Err("studentWorksheet and scoresWorksheet must differ".to_string());
        }
        Ok(next)
    }
}

fn parse_i64_range(v: &Value, key: &str, min: i64, max: i64) -> Result<i64, String> {
    let n = v
        .as_i64()
        .ok_or_else(|| format!("{} must be integer", key))?;
    if !(min..=max).contains(&n) {
        return Err(format!("{} must be in {}..={}", key, min, max));
    }
    Ok(n)
}

fn parse_string_max(v: &Value, key: &str, max_len: usize) -> Result<String, String> {
    let s = v.as_str().ok_or_else(|| format!("{} must be string", key))?;
    let s = s.trim();
    if s.len() > max_len {
        return Err(format!("{} length must be <= {}", key, max_len));
    }
    Ok(s.to_string())
}

fn parse_name(v: &Value, key: &str) -> Result<String, String> {
    let s = parse_string_max(v, key, 100)?;
    if s.is_empty() {
        return Err(format!("{} must not be empty", key));
    }
    Ok(s)
}

fn parse_max_score(v: &Value, key: &str) -> Result<f64, String> {
    let n = v
        .as_f64()
        .ok_or_else(|| format!("{} must be a number", key))?;
    if !n.is_finite() || n < 0.0 {
        return Err(format!("{} must be a non-negative number", key));
    }
    Ok(n)
}

fn parse_subject_max(v: &Value, key: &str) -> Result<BTreeMap<String, f64>, String> {
    let obj: &Map<String, Value> = v
        .as_object()
        .ok_or_else(|| format!("{} must be an object", key))?;
    let mut out = BTreeMap::new();
    for (subject, max) in obj {
        let subject = subject.trim();
        if subject.is_empty() {
            return Err(format!("{} has a blank subject", key));
        }
        out.insert(
            subject.to_string(),
            parse_max_score(max, &format!("{}.{}", key, subject))?,
        );
    }
    Ok(out)
}
