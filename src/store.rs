//! Worksheet storage. Reads and writes are always whole worksheets: a write
//! fully overwrites the previous contents and the last writer wins.

use crate::error::GradebookError;
use crate::sheet::Worksheet;
use rusqlite::{Connection, OptionalExtension};

pub trait WorksheetStore {
    fn fetch(&self, name: &str) -> Result<Worksheet, GradebookError>;

    /// Replaces every listed worksheet, all or nothing.
    fn replace_all(&mut self, updates: &[(&str, &Worksheet)]) -> Result<(), GradebookError>;

    fn replace(&mut self, name: &str, worksheet: &Worksheet) -> Result<(), GradebookError> {
        self.replace_all(&[(name, worksheet)])
    }
}

pub struct SqliteStore<'c> {
    conn: &'c Connection,
}

impl<'c> SqliteStore<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    pub fn list(&self) -> Result<Vec<WorksheetInfo>, GradebookError> {
        let mut stmt = self.conn.prepare(
            "SELECT name, columns_json, rows_json, updated_at FROM worksheets ORDER BY name",
        )?;
        let rows = stmt
            .query_map([], |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                    r.get::<_, Option<String>>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut out = Vec::with_capacity(rows.len());
        for (name, columns_json, rows_json, updated_at) in rows {
            let ws = decode(&name, &columns_json, &rows_json)?;
            out.push(WorksheetInfo {
                name,
                column_count: ws.columns.len(),
                row_count: ws.rows.len(),
                updated_at,
            });
        }
        Ok(out)
    }
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorksheetInfo {
    pub name: String,
    pub column_count: usize,
    pub row_count: usize,
    pub updated_at: Option<String>,
}

fn decode(name: &str, columns_json: &str, rows_json: &str) -> Result<Worksheet, GradebookError> {
    let columns: Vec<String> = serde_json::from_str(columns_json)
        .map_err(|e| GradebookError::source_unavailable(name, format!("bad header: {}", e)))?;
    let rows = serde_json::from_str(rows_json)
        .map_err(|e| GradebookError::source_unavailable(name, format!("bad rows: {}", e)))?;
    Ok(Worksheet { columns, rows })
}

impl WorksheetStore for SqliteStore<'_> {
    fn fetch(&self, name: &str) -> Result<Worksheet, GradebookError> {
        let found: Option<(String, String)> = self
            .conn
            .query_row(
                "SELECT columns_json, rows_json FROM worksheets WHERE name = ?",
                [name],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()
            .map_err(|e| GradebookError::source_unavailable(name, e.to_string()))?;
        let Some((columns_json, rows_json)) = found else {
            return Err(GradebookError::source_unavailable(name, "worksheet not found"));
        };
        tracing::debug!(worksheet = name, "worksheet fetched");
        decode(name, &columns_json, &rows_json)
    }

    fn replace_all(&mut self, updates: &[(&str, &Worksheet)]) -> Result<(), GradebookError> {
        let now = chrono::Utc::now().to_rfc3339();
        let tx = self.conn.unchecked_transaction()?;
        for (name, ws) in updates {
            let columns_json = serde_json::to_string(&ws.columns)
                .map_err(|e| GradebookError::Storage(e.to_string()))?;
            let rows_json = serde_json::to_string(&ws.rows)
                .map_err(|e| GradebookError::Storage(e.to_string()))?;
            tx.execute(
                "INSERT INTO worksheets(name, columns_json, rows_json, updated_at)
                 VALUES(?, ?, ?, ?)
                 ON CONFLICT(name) DO UPDATE SET
                   columns_json = excluded.columns_json,
                   rows_json = excluded.rows_json,
                   updated_at = excluded.updated_at",
                (name, &columns_json, &rows_json, &now),
            )?;
        }
        tx.commit()?;
        tracing::info!(
            worksheets = ?updates.iter().map(|(n, _)| *n).collect::<Vec<_>>(),
            "worksheets replaced"
        );
        Ok(())
    }
}

/// In-process store for tests.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemoryStore {
    pub sheets: std::collections::HashMap<String, Worksheet>,
    /// Writes touching this worksheet fail, leaving every worksheet untouched.
    pub fail_writes_to: Option<String>,
}

#[cfg(test)]
impl MemoryStore {
    pub fn with(sheets: Vec<(&str, Worksheet)>) -> Self {
        Self {
            sheets: sheets
                .into_iter()
                .map(|(n, w)| (n.to_string(), w))
                .collect(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
impl WorksheetStore for MemoryStore {
    fn fetch(&self, name: &str) -> Result<Worksheet, GradebookError> {
        self.sheets
            .get(name)
            .cloned()
            .ok_or_else(|| GradebookError::source_unavailable(name, "worksheet not found"))
    }

    fn replace_all(&mut self, updates: &[(&str, &Worksheet)]) -> Result<(), GradebookError> {
        if let Some(bad) = self.fail_writes_to.as_deref() {
            if updates.iter().any(|(n, _)| *n == bad) {
                return Err(GradebookError::Storage(format!("write to {} rejected", bad)));
            }
        }
        for (name, ws) in updates {
            self.sheets.insert(name.to_string(), (*ws).clone());
        }
        Ok(())
    }
}
