//! Post-filtering and pagination of ranked candidate lists.

pub mod expression;
pub mod tier;

pub use expression::TagExpr;
pub use tier::{describe_level, level_to_tier, tier_to_level, Tier, TierName, UNRATED};

use crate::error::Result;
use crate::models::RankedProblem;

/// Tag expression plus inclusive level range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProblemFilter {
    tags: Option<TagExpr>,
    min_level: u32,
    max_level: u32,
}

impl Default for ProblemFilter {
    fn default() -> Self {
        Self {
            tags: None,
            min_level: 0,
            max_level: u32::MAX,
        }
    }
}

impl ProblemFilter {
    /// Absent arguments widen the filter: no tag expression matches every
    /// row, and missing tiers leave that end of the level range open. Blank
    /// strings count as absent.
    pub fn new(tags: Option<&str>, min_tier: Option<&str>, max_tier: Option<&str>) -> Result<Self> {
        let tags = non_blank(tags).map(TagExpr::parse).transpose()?;
        let min_level = non_blank(min_tier).map(tier_to_level).transpose()?.unwrap_or(0);
        let max_level = non_blank(max_tier).map(tier_to_level).transpose()?.unwrap_or(u32::MAX);
        Ok(Self {
            tags,
            min_level,
            max_level,
        })
    }

    pub fn tags(&self) -> Option<&TagExpr> {
        self.tags.as_ref()
    }

    pub fn level_range(&self) -> (u32, u32) {
        (self.min_level, self.max_level)
    }

    pub fn accepts(&self, tags: &[String], level: u32) -> bool {
        let tag_ok = self.tags.as_ref().map_or(true, |expr| expr.matches(tags));
        tag_ok && (self.min_level..=self.max_level).contains(&level)
    }

    /// Keep the accepted candidates, preserving their order.
    pub fn apply(&self, candidates: Vec<RankedProblem>) -> Vec<RankedProblem> {
        candidates
            .into_iter()
            .filter(|c| self.accepts(&c.problem.tags, c.problem.level))
            .collect()
    }
}

fn non_blank(arg: Option<&str>) -> Option<&str> {
    arg.filter(|s| !s.trim().is_empty())
}

/// Rows `[page_size * page_index, page_size * (page_index + 1))`.
pub fn page<T>(rows: Vec<T>, page_size: usize, page_index: usize) -> Vec<T> {
    let start = page_size.saturating_mul(page_index);
    rows.into_iter().skip(start).take(page_size).collect()
}
