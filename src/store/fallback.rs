//! Durable store with an in-memory safety net.
//!
//! Writes go to the durable backend until it fails once. From then on every
//! run is kept in memory for the rest of the process and reported as
//! [`Persisted::Fallback`] carrying the first failure, so a broken backend is
//! visible instead of silently swallowed.

use std::sync::OnceLock;

use tracing::warn;

use super::{AnalysisRun, MemoryStore, Persisted, ResultStore, StoreError};

/// Durable backend paired with a process-local fallback.
pub struct FallbackStore {
    durable: Box<dyn ResultStore>,
    memory: MemoryStore,
    degraded: OnceLock<String>,
}

impl FallbackStore {
    /// Wraps a durable backend.
    pub fn new(durable: Box<dyn ResultStore>) -> Self {
        Self {
            durable,
            memory: MemoryStore::new(),
            degraded: OnceLock::new(),
        }
    }

    /// Returns `true` once any durable write has failed.
    pub fn is_degraded(&self) -> bool {
        self.degraded.get().is_some()
    }
}

impl ResultStore for FallbackStore {
    fn append(&self, run: AnalysisRun) -> Result<Persisted, StoreError> {
        if let Some(reason) = self.degraded.get() {
            self.memory.append(run)?;
            return Ok(Persisted::Fallback {
                reason: reason.clone(),
            });
        }

        match self.durable.append(run.clone()) {
            Ok(persisted) => Ok(persisted),
            Err(e) => {
                warn!(error = %e, "Durable result store write failed, keeping runs in memory");
                let reason = self.degraded.get_or_init(|| e.to_string()).clone();
                self.memory.append(run)?;
                Ok(Persisted::Fallback { reason })
            }
        }
    }

    fn history(
        &self,
        owner: Option<&str>,
        repo: Option<&str>,
    ) -> Result<Vec<AnalysisRun>, StoreError> {
        let mut runs = self.memory.history(owner, repo)?;
        match self.durable.history(owner, repo) {
            Ok(durable) => runs.extend(durable),
            Err(e) => {
                warn!(error = %e, "Durable result store read failed, serving in-memory runs only");
            }
        }
        // Stable sort keeps append order among equal timestamps.
        runs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(runs)
    }
}
