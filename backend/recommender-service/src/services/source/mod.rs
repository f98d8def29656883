//! Where a user's solved problems come from at query time.
//!
//! The live solved.ac API is tried first; when it fails, a single cached
//! snapshot lookup is attempted, and when that is absent too the user is
//! treated as having solved nothing.

mod snapshot;
mod solved_ac;

pub use snapshot::SnapshotStore;
pub use solved_ac::SolvedAcClient;

use crate::error::Result;
use crate::models::SolvedProblem;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

/// Pluggable provider of a user's top solved problems.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SolvedProblemSource: Send + Sync {
    async fn top_solved(&self, handle: &str) -> Result<Vec<SolvedProblem>>;
}

/// Live source with a snapshot fallback. Never fails.
#[derive(Clone)]
pub struct FallbackSource {
    live: Arc<dyn SolvedProblemSource>,
    snapshots: SnapshotStore,
}

impl FallbackSource {
    pub fn new(live: Arc<dyn SolvedProblemSource>, snapshots: SnapshotStore) -> Self {
        Self { live, snapshots }
    }

    pub async fn fetch(&self, handle: &str) -> Vec<SolvedProblem> {
        let live_error = match self.live.top_solved(handle).await {
            Ok(problems) => {
                debug!(handle, count = problems.len(), "Fetched solved problems");
                return problems;
            }
            Err(e) => e,
        };
        warn!(handle, error = %live_error, "Live fetch failed, trying snapshot");

        match self.snapshots.load(handle) {
            Ok(Some(problems)) => {
                debug!(handle, count = problems.len(), "Loaded solved problems from snapshot");
                problems
            }
            Ok(None) => {
                warn!(handle, "No snapshot available, using empty solved set");
                Vec::new()
            }
            Err(e) => {
                warn!(handle, error = %e, "Snapshot unreadable, using empty solved set");
                Vec::new()
            }
        }
    }
}
