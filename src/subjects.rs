//! Subject discovery from score column names.
//!
//! A component score column is named `<subject>_<component>`. The subject is
//! everything before the first `_`; a column without a separator is a
//! single-component subject named after the whole column.

use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

pub const SUBJECT_SEPARATOR: char = '_';
pub const KEY_COLUMNS: [&str; 2] = ["class_no", "student_id"];

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct SubjectId(String);

impl SubjectId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn total_column(&self) -> String {
        format!("{}_total", self.0)
    }

    pub fn grade_column(&self) -> String {
        format!("{}_grade", self.0)
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn is_key_column(column: &str) -> bool {
    KEY_COLUMNS.contains(&column)
}

pub fn subject_of(column: &str) -> SubjectId {
    let prefix = column
        .split_once(SUBJECT_SEPARATOR)
        .map(|(head, _)| head)
        .unwrap_or(column);
    SubjectId::new(prefix)
}

/// Component score columns, in input order.
pub fn score_columns<'a, I>(columns: I) -> Vec<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    columns.into_iter().filter(|c| !is_key_column(c)).collect()
}

/// Sorted, deduplicated subjects found among the non-key columns.
pub fn detect_subjects<'a, I>(columns: I) -> Vec<SubjectId>
where
    I: IntoIterator<Item = &'a str>,
{
    let set: BTreeSet<SubjectId> = score_columns(columns).into_iter().map(subject_of).collect();
    set.into_iter().collect()
}

/// Indices (into `columns`) of the component columns belonging to `subject`.
pub fn columns_for_subject(columns: &[String], subject: &SubjectId) -> Vec<usize> {
    columns
        .iter()
        .enumerate()
        .filter(|(_, c)| !is_key_column(c) && subject_of(c) == *subject)
        .map(|(i, _)| i)
        .collect()
}
