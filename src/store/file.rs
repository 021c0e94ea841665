//! Durable run storage in a JSON-lines file.
//!
//! One run per line, appended in creation order. Unreadable lines are
//! skipped with a warning rather than failing the whole read.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tracing::warn;

use super::{run_matches, AnalysisRun, Persisted, ResultStore, StoreError};

/// Appends runs to a JSON-lines file.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    /// Creates a store backed by `path`. The file is created on first write.
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Returns the default store location, `$HOME/.authorscope/history.jsonl`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".authorscope").join("history.jsonl"))
    }

    /// Returns the backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn read_all(&self) -> Result<Vec<AnalysisRun>, StoreError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(self.io_error(e)),
        };

        Ok(content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .filter_map(|(index, line)| match serde_json::from_str(line) {
                Ok(run) => Some(run),
                Err(e) => {
                    warn!(
                        path = %self.path.display(),
                        line = index + 1,
                        error = %e,
                        "Skipping unreadable analysis run"
                    );
                    None
                }
            })
            .collect())
    }
}

impl ResultStore for FileStore {
    fn append(&self, run: AnalysisRun) -> Result<Persisted, StoreError> {
        let mut line = serde_json::to_string(&run)?;
        line.push('\n');

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| self.io_error(e))?;
        file.write_all(line.as_bytes())
            .map_err(|e| self.io_error(e))?;

        Ok(Persisted::Primary)
    }

    fn history(
        &self,
        owner: Option<&str>,
        repo: Option<&str>,
    ) -> Result<Vec<AnalysisRun>, StoreError> {
        let mut runs = self.read_all()?;
        runs.retain(|run| run_matches(run, owner, repo));
        runs.reverse();
        Ok(runs)
    }
}
