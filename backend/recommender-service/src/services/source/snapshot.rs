use crate::error::{RecommenderError, Result};
use crate::models::SolvedProblem;
use serde::Deserialize;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
struct SnapshotFile {
    #[serde(default)]
    items: Vec<SolvedProblem>,
}

/// Cached "top solved" responses, one `top_100_{handle}.json` per user.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Snapshot file for `handle`. Handles that could name a file outside the
    /// snapshot directory are rejected.
    pub fn path_for(&self, handle: &str) -> Result<PathBuf> {
        if handle.is_empty() || handle.contains(['/', '\\']) || handle.contains("..") {
            return Err(RecommenderError::InvalidInput(format!("invalid handle {:?}", handle)));
        }
        Ok(self.dir.join(format!("top_100_{}.json", handle)))
    }

    /// `Ok(None)` when no snapshot exists for the handle.
    pub fn load(&self, handle: &str) -> Result<Option<Vec<SolvedProblem>>> {
        let raw = match fs::read_to_string(self.path_for(handle)?) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let snapshot: SnapshotFile = serde_json::from_str(&raw)?;
        Ok(Some(snapshot.items))
    }

    /// Write a snapshot in the same shape as the live response.
    pub fn save(&self, handle: &str, problems: &[SolvedProblem]) -> Result<()> {
        let path = self.path_for(handle)?;
        fs::create_dir_all(&self.dir)?;
        let body = serde_json::json!({ "items": problems });
        fs::write(path, serde_json::to_vec_pretty(&body)?)?;
        Ok(())
    }
}
