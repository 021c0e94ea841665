//! Process-local run storage.

use std::sync::{Mutex, PoisonError};

use super::{run_matches, AnalysisRun, Persisted, ResultStore, StoreError};

/// Keeps runs in memory for the lifetime of the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    runs: Mutex<Vec<AnalysisRun>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored runs.
    pub fn len(&self) -> usize {
        self.runs.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Returns `true` if no run has been stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ResultStore for MemoryStore {
    fn append(&self, run: AnalysisRun) -> Result<Persisted, StoreError> {
        self.runs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(run);
        Ok(Persisted::Primary)
    }

    fn history(
        &self,
        owner: Option<&str>,
        repo: Option<&str>,
    ) -> Result<Vec<AnalysisRun>, StoreError> {
        Ok(self
            .runs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .rev()
            .filter(|run| run_matches(run, owner, repo))
            .cloned()
            .collect())
    }
}
