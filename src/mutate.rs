//! Student insert/delete against the roster and scores worksheets.
//!
//! Both operations produce complete replacement tables for the two
//! worksheets, written together through `WorksheetStore::replace_all`.

use crate::cache::WorksheetCache;
use crate::error::GradebookError;
use crate::sheet::{Roster, ScoreRecord, ScoreTable, StudentRecord};
use crate::store::WorksheetStore;
use std::collections::HashSet;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewStudent {
    pub student_id: i64,
    pub class_no: Option<i64>,
    pub title: String,
    pub first_name: String,
    pub last_name: String,
    pub class: Option<String>,
    pub status: Option<String>,
}

/// Values filled in for fields a new student does not carry.
#[derive(Debug, Clone, PartialEq)]
pub struct StudentDefaults {
    pub class: String,
    pub status: String,
}

impl Default for StudentDefaults {
    fn default() -> Self {
        Self {
            class: String::new(),
            status: "active".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TablePair {
    pub roster: Roster,
    pub scores: ScoreTable,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteOutcome {
    pub tables: TablePair,
    pub removed_students: usize,
    pub removed_score_rows: usize,
}

fn non_empty(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Required-field checks that need no table access.
pub fn validate_new_student(new: &NewStudent) -> Result<(), GradebookError> {
    if new.first_name.trim().is_empty() {
        return Err(GradebookError::validation("firstName", "must not be empty"));
    }
    if new.last_name.trim().is_empty() {
        return Err(GradebookError::validation("lastName", "must not be empty"));
    }
    if new.student_id <= 0 {
        return Err(GradebookError::validation("studentId", "must be greater than 0"));
    }
    if matches!(new.class_no, Some(n) if n <= 0) {
        return Err(GradebookError::validation("classNo", "must be greater than 0"));
    }
    Ok(())
}

/// Appends a student and a zeroed score row. Inputs are left untouched.
pub fn insert_student(
    roster: &Roster,
    scores: &ScoreTable,
    new: NewStudent,
    defaults: &StudentDefaults,
) -> Result<(TablePair, StudentRecord), GradebookError> {
    validate_new_student(&new)?;
    let first_name = new.first_name.trim().to_string();
    let last_name = new.last_name.trim().to_string();
    if roster.contains(new.student_id)
        || scores.rows.iter().any(|r| r.student_id == new.student_id)
    {
        return Err(GradebookError::validation(
            "studentId",
            format!("student_id {} already exists", new.student_id),
        ));
    }
    let class_no = match new.class_no {
        Some(n) => n,
        None => {
            roster
                .students
                .iter()
                .map(|s| s.class_no)
                .max()
                .unwrap_or(0)
                + 1
        }
    };

    let student = StudentRecord {
        class_no,
        student_id: new.student_id,
        title: new.title.trim().to_string(),
        first_name,
        last_name,
        class: non_empty(new.class).unwrap_or_else(|| defaults.class.clone()),
        status: non_empty(new.status).unwrap_or_else(|| defaults.status.clone()),
        source_row: Vec::new(),
    };

    let mut roster = roster.clone();
    roster.students.push(student.clone());
    let mut scores = scores.clone();
    scores.rows.push(ScoreRecord {
        class_no,
        student_id: student.student_id,
        scores: vec![Some(0.0); scores.columns.len()],
    });

    Ok((TablePair { roster, scores }, student))
}

/// Drops every roster and score row whose `student_id` is in `ids`.
pub fn delete_students(roster: &Roster, scores: &ScoreTable, ids: &HashSet<i64>) -> DeleteOutcome {
    let mut roster = roster.clone();
    let mut scores = scores.clone();
    let before_students = roster.students.len();
    let before_scores = scores.rows.len();
    if !ids.is_empty() {
        roster.students.retain(|s| !ids.contains(&s.student_id));
        scores.rows.retain(|r| !ids.contains(&r.student_id));
    }
    DeleteOutcome {
        removed_students: before_students - roster.students.len(),
        removed_score_rows: before_scores - scores.rows.len(),
        tables: TablePair { roster, scores },
    }
}

/// Names of the two source worksheets.
#[derive(Debug, Clone, PartialEq)]
pub struct WorksheetNames {
    pub students: String,
    pub scores: String,
}

impl Default for WorksheetNames {
    fn default() -> Self {
        Self {
            students: "student_master".to_string(),
            scores: "scores_master".to_string(),
        }
    }
}

/// Loads both source tables, applies a mutation and writes both back.
pub struct MutationManager<'a, S: WorksheetStore> {
    store: &'a mut S,
    cache: &'a mut WorksheetCache,
    names: &'a WorksheetNames,
}

impl<'a, S: WorksheetStore> MutationManager<'a, S> {
    pub fn new(store: &'a mut S, cache: &'a mut WorksheetCache, names: &'a WorksheetNames) -> Self {
        Self {
            store,
            cache,
            names,
        }
    }

    /// Writes read fresh from the store, never from the cache.
    fn load(&self) -> Result<(Roster, ScoreTable), GradebookError> {
        let roster_ws = self.store.fetch(&self.names.students)?;
        let scores_ws = self.store.fetch(&self.names.scores)?;
        Ok((
            Roster::from_worksheet(&self.names.students, &roster_ws)?,
            ScoreTable::from_worksheet(&self.names.scores, &scores_ws)?,
        ))
    }

    fn commit(&mut self, tables: &TablePair) -> Result<(), GradebookError> {
        let roster_ws = tables.roster.to_worksheet();
        let scores_ws = tables.scores.to_worksheet();
        let result = self.store.replace_all(&[
            (self.names.students.as_str(), &roster_ws),
            (self.names.scores.as_str(), &scores_ws),
        ]);
        self.invalidate_sources();
        result
    }

    fn invalidate_sources(&mut self) {
        self.cache.invalidate(&self.names.students);
        self.cache.invalidate(&self.names.scores);
    }

    pub fn insert(
        &mut self,
        new: NewStudent,
        defaults: &StudentDefaults,
    ) -> Result<StudentRecord, GradebookError> {
        validate_new_student(&new)?;
        let (roster, scores) = self.load()?;
        let (tables, student) = insert_student(&roster, &scores, new, defaults)?;
        self.commit(&tables)?;
        tracing::info!(student_id = student.student_id, "student inserted");
        Ok(student)
    }

    /// Returns `(removed_students, removed_score_rows)`. Nothing is written
    /// when no row matches.
    pub fn delete(&mut self, ids: &HashSet<i64>) -> Result<(usize, usize), GradebookError> {
        if ids.is_empty() {
            self.invalidate_sources();
            return Ok((0, 0));
        }
        let (roster, scores) = self.load()?;
        let outcome = delete_students(&roster, &scores, ids);
        if outcome.removed_students > 0 || outcome.removed_score_rows > 0 {
            self.commit(&outcome.tables)?;
        } else {
            self.invalidate_sources();
        }
        tracing::info!(
            requested = ids.len(),
            removed_students = outcome.removed_students,
            removed_score_rows = outcome.removed_score_rows,
            "students deleted"
        );
        Ok((outcome.removed_students, outcome.removed_score_rows))
    }
}
