use serde_json::json;

/// Errors raised by the report pipeline and the record mutation path.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GradebookError {
    #[error("worksheet {worksheet} unavailable: {reason}")]
    SourceUnavailable { worksheet: String, reason: String },

    #[error("{worksheet} row {row}: {reason}")]
    DataIntegrity {
        worksheet: String,
        row: usize,
        reason: String,
    },

    #[error("{field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("storage error: {0}")]
    Storage(String),
}

impl GradebookError {
    pub fn source_unavailable(worksheet: &str, reason: impl Into<String>) -> Self {
        Self::SourceUnavailable {
            worksheet: worksheet.to_string(),
            reason: reason.into(),
        }
    }

    pub fn integrity(worksheet: &str, row: usize, reason: impl Into<String>) -> Self {
        Self::DataIntegrity {
            worksheet: worksheet.to_string(),
            row,
            reason: reason.into(),
        }
    }

    pub fn validation(field: &str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    /// Stable IPC error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::SourceUnavailable { .. } => "source_unavailable",
            Self::DataIntegrity { .. } => "data_integrity",
            Self::Validation { .. } => "validation_failed",
            Self::Storage(_) => "db_failed",
        }
    }

    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::SourceUnavailable { worksheet, .. } => Some(json!({ "worksheet": worksheet })),
            Self::DataIntegrity { worksheet, row, .. } => {
                Some(json!({ "worksheet": worksheet, "row": row }))
            }
            Self::Validation { field, .. } => Some(json!({ "field": field })),
            Self::Storage(_) => None,
        }
    }
}

impl From<rusqlite::Error> for GradebookError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Storage(e.to_string())
    }
}
