// Processed-file history kept in memory

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, PoisonError};
use tracing::info;

use crate::machine::traits::HistoryStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedFile {
    pub name: String,
    pub processed_at: DateTime<Utc>,
}

/// `HistoryStore` that keeps every processed file, oldest first
#[derive(Debug, Default)]
pub struct MemoryHistory {
    entries: Mutex<Vec<ProcessedFile>>,
}

impl MemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<ProcessedFile> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|entry| entry.name == name)
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl HistoryStore for MemoryHistory {
    fn add_processed_file(&self, name: &str) {
        let entry = ProcessedFile {
            name: name.to_string(),
            processed_at: Utc::now(),
        };
        info!(file = %entry.name, "Recorded processed file");
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry);
    }
}
