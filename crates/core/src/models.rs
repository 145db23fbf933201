use crate::error::InvalidModeError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    Naive,
    Local,
    Global,
    #[default]
    Hybrid,
}

impl SearchMode {
    pub const ALL: [SearchMode; 4] = [
        SearchMode::Naive,
        SearchMode::Local,
        SearchMode::Global,
        SearchMode::Hybrid,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SearchMode::Naive => "naive",
            SearchMode::Local => "local",
            SearchMode::Global => "global",
            SearchMode::Hybrid => "hybrid",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            SearchMode::Naive => "Simple keyword matching",
            SearchMode::Local => "Focus on specific details",
            SearchMode::Global => "Focus on broad themes",
            SearchMode::Hybrid => "Combined approach (recommended)",
        }
    }
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SearchMode {
    type Err = InvalidModeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let lowered = value.trim().to_lowercase();
        SearchMode::ALL
            .into_iter()
            .find(|mode| mode.as_str() == lowered)
            .ok_or_else(|| InvalidModeError(value.trim().to_string()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FailedDocument {
    pub name: String,
    pub reason: String,
}

/// Outcome of one incremental indexing run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexReport {
    pub total: usize,
    pub already_indexed: usize,
    pub pending: usize,
    pub succeeded: usize,
    pub failed: Vec<FailedDocument>,
    pub interrupted: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl IndexReport {
    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }

    pub fn total_indexed(&self) -> usize {
        self.already_indexed + self.succeeded
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct StorageStats {
    pub document_count: usize,
    pub chunk_count: usize,
    pub entity_count: usize,
    pub storage_size_bytes: u64,
}

impl StorageStats {
    pub fn storage_size_mb(&self) -> f64 {
        self.storage_size_bytes as f64 / (1024.0 * 1024.0)
    }
}
