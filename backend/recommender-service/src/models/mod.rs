use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// External problem identifier (BOJ problem number).
pub type ProblemId = i64;

/// One observed (handle, problem) pair as it appears in the source table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RawInteraction {
    pub user_id: String,
    pub item_id: ProblemId,
}

impl RawInteraction {
    pub fn new(user_id: impl Into<String>, item_id: ProblemId) -> Self {
        Self {
            user_id: user_id.into(),
            item_id,
        }
    }
}

/// Interaction rewritten to dense zero-based indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EncodedInteraction {
    pub user: usize,
    pub item: usize,
}

impl EncodedInteraction {
    pub fn new(user: usize, item: usize) -> Self {
        Self { user, item }
    }
}

/// Static reference row for a problem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProblemMetadata {
    pub problem_id: ProblemId,
    pub title: String,
    pub tags: Vec<String>,
    /// 1..=30 for rated problems, 0 for unrated.
    pub level: u32,
    /// Columns not interpreted by the engine, passed through unchanged.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

/// Entry of a user's "top solved problems" list, live or from a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolvedProblem {
    #[serde(rename = "problemId")]
    pub problem_id: ProblemId,
    #[serde(default)]
    pub level: Option<u32>,
    #[serde(flatten)]
    pub rest: serde_json::Map<String, serde_json::Value>,
}

impl SolvedProblem {
    pub fn new(problem_id: ProblemId) -> Self {
        Self {
            problem_id,
            level: None,
            rest: serde_json::Map::new(),
        }
    }
}

/// A problem in a ranked candidate list, metadata already joined.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedProblem {
    pub problem: ProblemMetadata,
    pub score: f32,
}

impl RankedProblem {
    pub fn problem_id(&self) -> ProblemId {
        self.problem.problem_id
    }
}

/// Output row handed back to the calling agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProblemRow {
    pub problem_id: ProblemId,
    pub title: String,
    pub tags: Vec<String>,
    pub difficulty: String,
}

/// Summary of one training run.
#[derive(Debug, Clone, Default)]
pub struct TrainingReport {
    pub epoch_losses: Vec<f32>,
    /// (epoch, recall@k); only filled when a held-out split exists.
    pub validation_recalls: Vec<(usize, f64)>,
}

impl TrainingReport {
    pub fn final_loss(&self) -> Option<f32> {
        self.epoch_losses.last().copied()
    }
}
