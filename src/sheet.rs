use crate::error::GradebookError;
use crate::subjects::is_key_column;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

pub const ROSTER_COLUMNS: [&str; 7] = [
    "class_no",
    "student_id",
    "title",
    "first_name",
    "last_name",
    "class",
    "status",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    Empty,
    Number(f64),
    Text(String),
}

impl Cell {
    pub fn is_empty(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(s) => s.trim().is_empty(),
            Cell::Number(_) => false,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Number(v) => Some(*v),
            Cell::Text(s) => s.trim().parse::<f64>().ok(),
            Cell::Empty => None,
        }
    }

    /// Integer value; accepts `3`, `3.0` and `"3"`.
    pub fn as_i64(&self) -> Option<i64> {
        let v = self.as_f64()?;
        if v.fract() != 0.0 || !v.is_finite() {
            return None;
        }
        Some(v as i64)
    }

    pub fn text(&self) -> String {
        match self {
            Cell::Empty => String::new(),
            Cell::Number(v) => format_number(*v),
            Cell::Text(s) => s.clone(),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Cell::Empty => serde_json::Value::Null,
            Cell::Number(v) => serde_json::json!(v),
            Cell::Text(s) => serde_json::Value::String(s.clone()),
        }
    }
}

pub fn format_number(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        format!("{}", v)
    }
}

/// A named table as the backing store holds it: a header and untyped cells.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Worksheet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl Worksheet {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentRecord {
    pub class_no: i64,
    pub student_id: i64,
    pub title: String,
    pub first_name: String,
    pub last_name: String,
    pub class: String,
    pub status: String,
    /// Cells as read from the roster worksheet; columns the roster does not
    /// model are written back from here.
    #[serde(skip)]
    pub source_row: Vec<Cell>,
}

impl StudentRecord {
    fn cells(&self) -> Vec<Cell> {
        vec![
            Cell::Number(self.class_no as f64),
            Cell::Number(self.student_id as f64),
            Cell::Text(self.title.clone()),
            Cell::Text(self.first_name.clone()),
            Cell::Text(self.last_name.clone()),
            Cell::Text(self.class.clone()),
            Cell::Text(self.status.clone()),
        ]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoreRecord {
    pub class_no: i64,
    pub student_id: i64,
    /// Aligned with `ScoreTable::columns`; `None` is a blank cell.
    pub scores: Vec<Option<f64>>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Roster {
    /// Header of the source worksheet. Empty means `ROSTER_COLUMNS`.
    pub columns: Vec<String>,
    pub students: Vec<StudentRecord>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScoreTable {
    /// Component score columns only; keys are implicit.
    pub columns: Vec<String>,
    pub rows: Vec<ScoreRecord>,
}

fn required_index(ws: &Worksheet, sheet: &str, name: &str) -> Result<usize, GradebookError> {
    ws.column_index(name)
        .ok_or_else(|| GradebookError::integrity(sheet, 0, format!("missing column {}", name)))
}

fn key_value(
    row: &[Cell],
    idx: usize,
    sheet: &str,
    row_no: usize,
    name: &str,
) -> Result<i64, GradebookError> {
    let cell = row.get(idx).unwrap_or(&Cell::Empty);
    if cell.is_empty() {
        return Err(GradebookError::integrity(sheet, row_no, format!("missing {}", name)));
    }
    cell.as_i64().ok_or_else(|| {
        GradebookError::integrity(
            sheet,
            row_no,
            format!("{} must be an integer, got {:?}", name, cell.text()),
        )
    })
}

fn text_value(row: &[Cell], idx: Option<usize>) -> String {
    idx.and_then(|i| row.get(i))
        .map(|c| c.text().trim().to_string())
        .unwrap_or_default()
}

impl Roster {
    /// Parses the roster worksheet. Row numbers in errors are 1-based data rows.
    pub fn from_worksheet(sheet: &str, ws: &Worksheet) -> Result<Self, GradebookError> {
        let class_no_idx = required_index(ws, sheet, "class_no")?;
        let student_id_idx = required_index(ws, sheet, "student_id")?;
        let title_idx = ws.column_index("title");
        let first_idx = ws.column_index("first_name");
        let last_idx = ws.column_index("last_name");
        let class_idx = ws.column_index("class");
        let status_idx = ws.column_index("status");

        let mut seen: HashSet<i64> = HashSet::new();
        let mut students = Vec::with_capacity(ws.rows.len());
        for (i, row) in ws.rows.iter().enumerate() {
            let row_no = i + 1;
            if row.iter().all(Cell::is_empty) {
                continue;
            }
            let class_no = key_value(row, class_no_idx, sheet, row_no, "class_no")?;
            let student_id = key_value(row, student_id_idx, sheet, row_no, "student_id")?;
            if !seen.insert(student_id) {
                return Err(GradebookError::integrity(
                    sheet,
                    row_no,
                    format!("duplicate student_id {}", student_id),
                ));
            }
            students.push(StudentRecord {
                class_no,
                student_id,
                title: text_value(row, title_idx),
                first_name: text_value(row, first_idx),
                last_name: text_value(row, last_idx),
                class: text_value(row, class_idx),
                status: text_value(row, status_idx),
                source_row: row.clone(),
            });
        }
        Ok(Self {
            columns: ws.columns.clone(),
            students,
        })
    }

    /// Writes the roster back under its source header. Unmodelled columns
    /// keep their cells; modelled columns absent from the header stay absent.
    pub fn to_worksheet(&self) -> Worksheet {
        if self.columns.is_empty() {
            let mut ws = Worksheet::new(ROSTER_COLUMNS.iter().map(|s| s.to_string()).collect());
            ws.rows = self.students.iter().map(StudentRecord::cells).collect();
            return ws;
        }
        let mut ws = Worksheet::new(self.columns.clone());
        let targets: Vec<Option<usize>> =
            ROSTER_COLUMNS.iter().map(|c| ws.column_index(c)).collect();
        for student in &self.students {
            let mut row = student.source_row.clone();
            row.resize(ws.columns.len(), Cell::Empty);
            for (target, cell) in targets.iter().zip(student.cells()) {
                if let Some(i) = target {
                    row[*i] = cell;
                }
            }
            ws.rows.push(row);
        }
        ws
    }

    pub fn contains(&self, student_id: i64) -> bool {
        self.students.iter().any(|s| s.student_id == student_id)
    }
}

impl ScoreTable {
    /// Parses the scores worksheet. Blank score cells become `None`; text or
    /// negative scores are integrity errors.
    pub fn from_worksheet(sheet: &str, ws: &Worksheet) -> Result<Self, GradebookError> {
        let class_no_idx = required_index(ws, sheet, "class_no")?;
        let student_id_idx = required_index(ws, sheet, "student_id")?;
        let score_idx: Vec<usize> = ws
            .columns
            .iter()
            .enumerate()
            .filter(|(_, c)| !is_key_column(c))
            .map(|(i, _)| i)
            .collect();
        let columns: Vec<String> = score_idx.iter().map(|i| ws.columns[*i].clone()).collect();

        let mut rows = Vec::with_capacity(ws.rows.len());
        for (i, row) in ws.rows.iter().enumerate() {
            let row_no = i + 1;
            if row.iter().all(Cell::is_empty) {
                continue;
            }
            let class_no = key_value(row, class_no_idx, sheet, row_no, "class_no")?;
            let student_id = key_value(row, student_id_idx, sheet, row_no, "student_id")?;
            let mut scores = Vec::with_capacity(score_idx.len());
            for (col, idx) in columns.iter().zip(score_idx.iter()) {
                let cell = row.get(*idx).unwrap_or(&Cell::Empty);
                if cell.is_empty() {
                    scores.push(None);
                    continue;
                }
                let Some(v) = cell.as_f64() else {
                    return Err(GradebookError::integrity(
                        sheet,
                        row_no,
                        format!("{} is not a number: {:?}", col, cell.text()),
                    ));
                };
                if !v.is_finite() {
                    return Err(GradebookError::integrity(
                        sheet,
                        row_no,
                        format!("{} is not a finite number: {:?}", col, cell.text()),
                    ));
                }
                if v < 0.0 {
                    return Err(GradebookError::integrity(
                        sheet,
                        row_no,
                        format!("{} is negative: {}", col, v),
                    ));
                }
                scores.push(Some(v));
            }
            rows.push(ScoreRecord {
                class_no,
                student_id,
                scores,
            });
        }
        Ok(Self { columns, rows })
    }

    pub fn to_worksheet(&self) -> Worksheet {
        let mut columns = vec!["class_no".to_string(), "student_id".to_string()];
        columns.extend(self.columns.iter().cloned());
        let rows = self
            .rows
            .iter()
            .map(|r| {
                let mut cells = vec![
                    Cell::Number(r.class_no as f64),
                    Cell::Number(r.student_id as f64),
                ];
                cells.extend(r.scores.iter().map(|s| match s {
                    Some(v) => Cell::Number(*v),
                    None => Cell::Empty,
                }));
                cells
            })
            .collect();
        Worksheet { columns, rows }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ws(columns: &[&str], rows: Vec<Vec<Cell>>) -> Worksheet {
        Worksheet {
            columns: columns.iter().map(|s| s.to_string()).collect(),
            rows,
        }
    }

    fn n(v: f64) -> Cell {
        Cell::Number(v)
    }

    fn t(s: &str) -> Cell {
        Cell::Text(s.to_string())
    }

    #[test]
    fn roster_parses_text_keys_and_trims_names() {
        let sheet = ws(
            &["student_id", "class_no", "first_name", "last_name"],
            vec![vec![t("7"), n(3.0), t(" Ann "), t("Lee")]],
        );
        let roster = Roster::from_worksheet("student_master", &sheet).expect("parse");
        assert_eq!(roster.students.len(), 1);
        let s = &roster.students[0];
        assert_eq!((s.student_id, s.class_no), (7, 3));
        assert_eq!(s.first_name, "Ann");
        assert_eq!(s.status, "");
    }

    #[test]
    fn roster_rejects_missing_key_and_duplicates() {
        let missing = ws(
            &["class_no", "student_id"],
            vec![vec![n(1.0), n(1.0)], vec![n(2.0), Cell::Empty]],
        );
        let e = Roster::from_worksheet("student_master", &missing).unwrap_err();
        assert_eq!(e.code(), "data_integrity");
        assert!(matches!(e, GradebookError::DataIntegrity { row: 2, .. }));

        let dup = ws(
            &["class_no", "student_id"],
            vec![vec![n(1.0), n(5.0)], vec![n(2.0), n(5.0)]],
        );
        assert!(Roster::from_worksheet("student_master", &dup).is_err());

        let no_column = ws(&["class_no"], vec![]);
        assert!(Roster::from_worksheet("student_master", &no_column).is_err());
    }

    #[test]
    fn scores_keep_blanks_and_reject_bad_values() {
        let sheet = ws(
            &["class_no", "student_id", "math_a", "math_b"],
            vec![vec![n(1.0), n(1.0), n(40.0), Cell::Empty]],
        );
        let table = ScoreTable::from_worksheet("scores_master", &sheet).expect("parse");
        assert_eq!(table.columns, vec!["math_a", "math_b"]);
        assert_eq!(table.rows[0].scores, vec![Some(40.0), None]);

        let negative = ws(
            &["class_no", "student_id", "math_a"],
            vec![vec![n(1.0), n(1.0), n(-1.0)]],
        );
        assert!(ScoreTable::from_worksheet("scores_master", &negative).is_err());

        let text = ws(
            &["class_no", "student_id", "math_a"],
            vec![vec![n(1.0), n(1.0), t("absent")]],
        );
        assert!(ScoreTable::from_worksheet("scores_master", &text).is_err());
    }

    #[test]
    fn scores_reject_nan_and_infinity() {
        for raw in ["NaN", "inf", "-inf", "infinity"] {
            let sheet = ws(
                &["class_no", "student_id", "math_a"],
                vec![vec![n(1.0), n(1.0), n(10.0)], vec![n(2.0), n(2.0), t(raw)]],
            );
            let e = ScoreTable::from_worksheet("scores_master", &sheet).unwrap_err();
            assert_eq!(e.code(), "data_integrity", "{raw}");
            assert!(matches!(e, GradebookError::DataIntegrity { row: 2, .. }), "{raw}");
        }
        let stored_nan = ws(
            &["class_no", "student_id", "math_a"],
            vec![vec![n(1.0), n(1.0), n(f64::NAN)]],
        );
        assert!(ScoreTable::from_worksheet("scores_master", &stored_nan).is_err());
    }

    #[test]
    fn roster_round_trips_unmodelled_columns() {
        let sheet = ws(
            &["class_no", "student_id", "first_name", "last_name", "email"],
            vec![vec![n(1.0), n(1.0), t("A"), t("B"), t("a@x.org")]],
        );
        let roster = Roster::from_worksheet("student_master", &sheet).expect("parse");
        let out = roster.to_worksheet();
        assert_eq!(out.columns, sheet.columns);
        assert_eq!(out.rows[0][4], t("a@x.org"));
        assert_eq!(out.rows[0][0], n(1.0));
    }

    #[test]
    fn roster_without_source_header_uses_standard_columns() {
        let roster = Roster {
            columns: Vec::new(),
            students: vec![StudentRecord {
                class_no: 2,
                student_id: 8,
                title: String::new(),
                first_name: "C".into(),
                last_name: "D".into(),
                class: String::new(),
                status: "active".into(),
                source_row: Vec::new(),
            }],
        };
        let out = roster.to_worksheet();
        assert_eq!(out.columns, ROSTER_COLUMNS);
        assert_eq!(out.rows[0][1], n(8.0));
    }

    #[test]
    fn blank_rows_are_skipped() {
        let sheet = ws(
            &["class_no", "student_id", "sci_a"],
            vec![vec![Cell::Empty, t(" "), Cell::Empty], vec![n(1.0), n(2.0), n(5.0)]],
        );
        let table = ScoreTable::from_worksheet("scores_master", &sheet).expect("parse");
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rows[0].student_id, 2);
    }

    #[test]
    fn score_table_writes_keys_first() {
        let table = ScoreTable {
            columns: vec!["sci_a".into()],
            rows: vec![ScoreRecord {
                class_no: 4,
                student_id: 9,
                scores: vec![None],
            }],
        };
        let out = table.to_worksheet();
        assert_eq!(out.columns, vec!["class_no", "student_id", "sci_a"]);
        assert_eq!(out.rows[0], vec![n(4.0), n(9.0), Cell::Empty]);
    }

    #[test]
    fn cell_integer_parsing() {
        assert_eq!(t("12").as_i64(), Some(12));
        assert_eq!(n(12.0).as_i64(), Some(12));
        assert_eq!(n(12.5).as_i64(), None);
        assert_eq!(Cell::Empty.as_i64(), None);
        assert_eq!(n(3.0).text(), "3");
        assert_eq!(n(3.25).text(), "3.25");
    }
}
