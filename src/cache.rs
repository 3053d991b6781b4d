use crate::error::GradebookError;
use crate::sheet::Worksheet;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

pub const DEFAULT_TTL_SECONDS: i64 = 30;

#[derive(Debug, Clone)]
struct CacheEntry {
    worksheet: Worksheet,
    fetched_at: DateTime<Utc>,
}

/// Read-through cache of fetched worksheets, keyed by worksheet name.
///
/// An entry is served while `now - fetched_at < ttl`; otherwise the worksheet
/// is fetched again and the entry replaced. Writers must call `invalidate`
/// for every worksheet they touch. A zero TTL disables caching.
#[derive(Debug, Clone)]
pub struct WorksheetCache {
    ttl: Duration,
    entries: HashMap<String, CacheEntry>,
}

impl Default for WorksheetCache {
    fn default() -> Self {
        Self::new(Duration::seconds(DEFAULT_TTL_SECONDS))
    }
}

impl WorksheetCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: HashMap::new(),
        }
    }

    /// Changing the TTL drops existing entries.
    pub fn set_ttl(&mut self, ttl: Duration) {
        if ttl != self.ttl {
            self.ttl = ttl;
            self.entries.clear();
        }
    }

    pub fn get_or_fetch<F>(
        &mut self,
        name: &str,
        now: DateTime<Utc>,
        fetch: F,
    ) -> Result<Worksheet, GradebookError>
    where
        F: FnOnce(&str) -> Result<Worksheet, GradebookError>,
    {
        if let Some(entry) = self.entries.get(name) {
            if now - entry.fetched_at < self.ttl {
                tracing::debug!(worksheet = name, "worksheet cache hit");
                return Ok(entry.worksheet.clone());
            }
        }

        let worksheet = fetch(name)?;
        if self.ttl > Duration::zero() {
            self.entries.insert(
                name.to_string(),
                CacheEntry {
                    worksheet: worksheet.clone(),
                    fetched_at: now,
                },
            );
        }
        Ok(worksheet)
    }

    pub fn invalidate(&mut self, name: &str) {
        if self.entries.remove(name).is_some() {
            tracing::debug!(worksheet = name, "worksheet cache entry invalidated");
        }
    }

    pub fn invalidate_all(&mut self) {
        self.entries.clear();
    }

    #[cfg(test)]
    pub fn is_cached(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }
}
