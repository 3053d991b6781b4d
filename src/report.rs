//! Unified report: roster/scores join, per-subject aggregation and summary
//! statistics. Everything here is recomputed from the source tables on each
//! read and borrows them immutably.

use crate::error::GradebookError;
use crate::grade::{grade_point, DEFAULT_MAX_SCORE};
use crate::sheet::{format_number, Roster, ScoreRecord, ScoreTable, StudentRecord, ROSTER_COLUMNS};
use crate::subjects::{columns_for_subject, detect_subjects, SubjectId};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

/// Maximum score per subject used when converting totals to grade points.
#[derive(Debug, Clone, PartialEq)]
pub struct GradeScale {
    pub default_max: f64,
    pub per_subject: BTreeMap<SubjectId, f64>,
}

impl Default for GradeScale {
    fn default() -> Self {
        Self {
            default_max: DEFAULT_MAX_SCORE,
            per_subject: BTreeMap::new(),
        }
    }
}

impl GradeScale {
    pub fn max_for(&self, subject: &SubjectId) -> f64 {
        self.per_subject
            .get(subject)
            .copied()
            .unwrap_or(self.default_max)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct JoinedRow<'a> {
    pub student: &'a StudentRecord,
    pub scores: &'a ScoreRecord,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectResult {
    pub total: f64,
    pub grade: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReportRow {
    pub student: StudentRecord,
    pub scores: Vec<Option<f64>>,
    /// Aligned with `Report::subjects`.
    pub results: Vec<SubjectResult>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub score_columns: Vec<String>,
    pub subjects: Vec<SubjectId>,
    pub rows: Vec<ReportRow>,
}

/// Inner join on `(student_id, class_no)`, in roster order.
///
/// Students without scores and orphaned score rows are dropped. A composite
/// key that appears more than once in the scores table is rejected rather
/// than fanned out.
pub fn join<'a>(
    roster: &'a Roster,
    scores: &'a ScoreTable,
    scores_sheet: &str,
) -> Result<Vec<JoinedRow<'a>>, GradebookError> {
    let mut by_key: HashMap<(i64, i64), &ScoreRecord> = HashMap::new();
    for (i, r) in scores.rows.iter().enumerate() {
        if by_key.insert((r.student_id, r.class_no), r).is_some() {
            return Err(GradebookError::integrity(
                scores_sheet,
                i + 1,
                format!(
                    "duplicate key (student_id {}, class_no {})",
                    r.student_id, r.class_no
                ),
            ));
        }
    }

    Ok(roster
        .students
        .iter()
        .filter_map(|s| {
            by_key
                .get(&(s.student_id, s.class_no))
                .map(|sc| JoinedRow {
                    student: s,
                    scores: *sc,
                })
        })
        .collect())
}

/// Adds a total and a grade point per detected subject to each joined row.
pub fn aggregate(rows: &[JoinedRow<'_>], score_columns: &[String], scale: &GradeScale) -> Report {
    let subjects = detect_subjects(score_columns.iter().map(String::as_str));
    let members: Vec<Vec<usize>> = subjects
        .iter()
        .map(|s| columns_for_subject(score_columns, s))
        .collect();

    let rows = rows
        .iter()
        .map(|r| {
            let results = subjects
                .iter()
                .zip(members.iter())
                .map(|(subject, idx)| {
                    let total: f64 = idx
                        .iter()
                        .map(|i| r.scores.scores.get(*i).copied().flatten().unwrap_or(0.0))
                        .sum();
                    SubjectResult {
                        total,
                        grade: grade_point(total, scale.max_for(subject)),
                    }
                })
                .collect();
            ReportRow {
                student: r.student.clone(),
                scores: r.scores.scores.clone(),
                results,
            }
        })
        .collect();

    Report {
        score_columns: score_columns.to_vec(),
        subjects,
        rows,
    }
}

pub fn build_report(
    roster: &Roster,
    scores: &ScoreTable,
    scores_sheet: &str,
    scale: &GradeScale,
) -> Result<Report, GradebookError> {
    let joined = join(roster, scores, scores_sheet)?;
    Ok(aggregate(&joined, &scores.columns, scale))
}

impl Report {
    pub fn subject_index(&self, subject: &str) -> Option<usize> {
        self.subjects.iter().position(|s| s.as_str() == subject)
    }

    /// Display header: roster columns, component columns, then
    /// `<s>_total`/`<s>_grade` per subject.
    pub fn columns(&self) -> Vec<String> {
        let mut out: Vec<String> = ROSTER_COLUMNS.iter().map(|s| s.to_string()).collect();
        out.extend(self.score_columns.iter().cloned());
        for s in &self.subjects {
            out.push(s.total_column());
            out.push(s.grade_column());
        }
        out
    }

    pub fn row_json(&self, row: &ReportRow) -> Value {
        let s = &row.student;
        let mut obj = Map::new();
        obj.insert("class_no".into(), json!(s.class_no));
        obj.insert("student_id".into(), json!(s.student_id));
        obj.insert("title".into(), json!(s.title));
        obj.insert("first_name".into(), json!(s.first_name));
        obj.insert("last_name".into(), json!(s.last_name));
        obj.insert("class".into(), json!(s.class));
        obj.insert("status".into(), json!(s.status));
        for (col, v) in self.score_columns.iter().zip(row.scores.iter()) {
            obj.insert(col.clone(), json!(v));
        }
        for (subject, r) in self.subjects.iter().zip(row.results.iter()) {
            obj.insert(subject.total_column(), json!(r.total));
            obj.insert(subject.grade_column(), json!(r.grade));
        }
        Value::Object(obj)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeCount {
    pub grade: f64,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectSummary {
    pub subject: SubjectId,
    pub student_count: usize,
    pub mean_total: Option<f64>,
    pub mean_grade: Option<f64>,
    pub max_total: Option<f64>,
    pub distribution: Vec<GradeCount>,
}

/// KPIs and grade distribution for one subject. `None` for an unknown subject.
pub fn subject_summary(report: &Report, subject: &str) -> Option<SubjectSummary> {
    let idx = report.subject_index(subject)?;
    let results: Vec<SubjectResult> = report.rows.iter().map(|r| r.results[idx]).collect();
    let n = results.len();

    let (mean_total, mean_grade, max_total) = if n == 0 {
        (None, None, None)
    } else {
        let sum_total: f64 = results.iter().map(|r| r.total).sum();
        let sum_grade: f64 = results.iter().map(|r| r.grade).sum();
        let max = results
            .iter()
            .map(|r| r.total)
            .fold(f64::NEG_INFINITY, f64::max);
        (
            Some(sum_total / n as f64),
            Some(sum_grade / n as f64),
            Some(max),
        )
    };

    // Grade points come from a fixed table, so keying on the printed value is exact.
    let mut counts: BTreeMap<String, (f64, usize)> = BTreeMap::new();
    for r in &results {
        counts.entry(format_number(r.grade)).or_insert((r.grade, 0)).1 += 1;
    }
    let mut distribution: Vec<GradeCount> = counts
        .into_values()
        .map(|(grade, count)| GradeCount { grade, count })
        .collect();
    distribution.sort_by(|a, b| a.grade.partial_cmp(&b.grade).unwrap_or(Ordering::Equal));

    Some(SubjectSummary {
        subject: report.subjects[idx].clone(),
        student_count: n,
        mean_total,
        mean_grade,
        max_total,
        distribution,
    })
}
