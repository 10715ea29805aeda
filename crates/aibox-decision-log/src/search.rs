// search.rs — Reading the decision log back.
//
// Search streams the rotated history oldest-first, then the current file,
// so results come back in persistence order. Only flushed content is
// visible; buffered entries appear after the next flush.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use aibox_policy::Decision;

use crate::entry::DecisionEntry;
use crate::error::DecisionLogError;
use crate::logger::{rotated_path, DecisionLogger};

/// Filter for [`DecisionLogger::search`]. Empty filter matches everything.
#[derive(Debug, Clone, Default)]
pub struct SearchFilter {
    pub user: Option<String>,
    pub action: Option<String>,
    pub decision: Option<Decision>,
    /// Inclusive lower bound on the entry timestamp.
    pub since: Option<DateTime<Utc>>,
    /// Exclusive upper bound on the entry timestamp.
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl SearchFilter {
    fn matches(&self, entry: &DecisionEntry) -> bool {
        if let Some(user) = &self.user {
            if &entry.user != user {
                return false;
            }
        }
        if let Some(action) = &self.action {
            if &entry.action != action {
                return false;
            }
        }
        if let Some(decision) = self.decision {
            if entry.decision != decision {
                return false;
            }
        }
        if let Some(since) = self.since {
            if entry.timestamp < since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if entry.timestamp >= until {
                return false;
            }
        }
        true
    }
}

impl DecisionLogger {
    /// Stream all persisted entries oldest-first through the filter.
    pub fn search(&self, filter: &SearchFilter) -> Result<Vec<DecisionEntry>, DecisionLogError> {
        let limit = filter.limit.unwrap_or(usize::MAX);
        let mut out = Vec::new();

        for path in self.files_oldest_first() {
            if out.len() >= limit {
                break;
            }
            read_entries(&path, |entry| {
                if out.len() < limit && filter.matches(&entry) {
                    out.push(entry);
                }
            })?;
        }
        Ok(out)
    }

    /// Fetch the k-th persisted entry (0-based, insertion order), or None
    /// past the end.
    pub fn read_entry(&self, index: usize) -> Result<Option<DecisionEntry>, DecisionLogError> {
        let mut seen = 0usize;
        let mut found = None;
        for path in self.files_oldest_first() {
            if found.is_some() {
                break;
            }
            read_entries(&path, |entry| {
                if seen == index && found.is_none() {
                    found = Some(entry);
                }
                seen += 1;
            })?;
        }
        Ok(found)
    }

    /// Existing log files, oldest rotation first, current file last.
    fn files_oldest_first(&self) -> Vec<PathBuf> {
        let config = self.config();
        let mut files = Vec::new();
        for i in (1..=config.max_rotated.max(1)).rev() {
            let path = rotated_path(&config.path, i);
            if path.exists() {
                files.push(path);
            }
        }
        if config.path.exists() {
            files.push(config.path.clone());
        }
        files
    }
}

fn read_entries(
    path: &Path,
    mut sink: impl FnMut(DecisionEntry),
) -> Result<(), DecisionLogError> {
    let file = File::open(path).map_err(|source| DecisionLogError::ReadFailed {
        path: path.to_path_buf(),
        source,
    })?;
    for line in BufReader::new(file).lines() {
        let line = line.map_err(|source| DecisionLogError::ReadFailed {
            path: path.to_path_buf(),
            source,
        })?;
        if line.trim().is_empty() {
            continue;
        }
        let entry: DecisionEntry = serde_json::from_str(&line)?;
        sink(entry);
    }
    Ok(())
}
