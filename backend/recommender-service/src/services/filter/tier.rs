use crate::error::{RecommenderError, Result};
use std::fmt;
use std::str::FromStr;

pub const SUB_LEVELS: u32 = 5;
pub const MAX_LEVEL: u32 = 30;

/// Shown for problems whose level is outside the rated range.
pub const UNRATED: &str = "Unrated";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TierName {
    Bronze,
    Silver,
    Gold,
    Platinum,
    Diamond,
    Ruby,
}

impl TierName {
    pub const ALL: [TierName; 6] = [
        TierName::Bronze,
        TierName::Silver,
        TierName::Gold,
        TierName::Platinum,
        TierName::Diamond,
        TierName::Ruby,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TierName::Bronze => "Bronze",
            TierName::Silver => "Silver",
            TierName::Gold => "Gold",
            TierName::Platinum => "Platinum",
            TierName::Diamond => "Diamond",
            TierName::Ruby => "Ruby",
        }
    }

    fn index(&self) -> u32 {
        *self as u32
    }
}

/// A named difficulty band plus its sub-level (5 = easiest, 1 = hardest).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tier {
    pub name: TierName,
    pub sub_level: u32,
}

impl Tier {
    pub fn level(&self) -> u32 {
        self.name.index() * SUB_LEVELS + (SUB_LEVELS - self.sub_level) + 1
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name.as_str(), self.sub_level)
    }
}

impl FromStr for Tier {
    type Err = RecommenderError;

    /// Parses `"Gold 3"`; the tier name is case-insensitive.
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || RecommenderError::InvalidDifficulty(s.to_string());
        let mut parts = s.split_whitespace();
        let (Some(name), Some(sub), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(invalid());
        };
        let name = TierName::ALL
            .iter()
            .copied()
            .find(|t| t.as_str().eq_ignore_ascii_case(name))
            .ok_or_else(invalid)?;
        let sub_level: u32 = sub.parse().map_err(|_| invalid())?;
        if !(1..=SUB_LEVELS).contains(&sub_level) {
            return Err(invalid());
        }
        Ok(Tier { name, sub_level })
    }
}

/// Level 1..=30 to its tier, e.g. 1 -> "Bronze 5", 30 -> "Ruby 1".
pub fn level_to_tier(level: u32) -> Result<Tier> {
    if !(1..=MAX_LEVEL).contains(&level) {
        return Err(RecommenderError::InvalidDifficulty(format!(
            "level {} outside 1..={}",
            level, MAX_LEVEL
        )));
    }
    let index = (level - 1) / SUB_LEVELS;
    let sub_level = SUB_LEVELS - (level - 1) % SUB_LEVELS;
    Ok(Tier {
        name: TierName::ALL[index as usize],
        sub_level,
    })
}

pub fn tier_to_level(tier: &str) -> Result<u32> {
    Ok(tier.parse::<Tier>()?.level())
}

/// Display string for a stored level; unrated levels render as [`UNRATED`].
pub fn describe_level(level: u32) -> String {
    level_to_tier(level)
        .map(|t| t.to_string())
        .unwrap_or_else(|_| UNRATED.to_string())
}
