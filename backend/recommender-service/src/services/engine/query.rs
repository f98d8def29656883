use crate::models::{ProblemId, ProblemRow};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryType {
    /// Personalized ranking for the caller.
    Recommend,
    /// Problems closest to `target_problem_id`.
    Similar,
    /// Caller's ranking restricted to what `target_user_handle` solved and the caller did not.
    #[serde(alias = "difference")]
    User,
}

/// Structured filter request, as produced by the calling agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterQuery {
    #[serde(rename = "type")]
    pub kind: QueryType,
    #[serde(default)]
    pub target_problem_id: Option<ProblemId>,
    #[serde(default)]
    pub target_user_handle: Option<String>,
    /// Tag expression, e.g. `"dp && greedy || math"`.
    #[serde(default)]
    pub tags: Option<String>,
    /// Tier string such as `"Silver 3"`.
    #[serde(default)]
    pub min_difficulty: Option<String>,
    #[serde(default)]
    pub max_difficulty: Option<String>,
    /// Page index.
    #[serde(default)]
    pub alternative: usize,
}

impl FilterQuery {
    pub fn recommend() -> Self {
        Self {
            kind: QueryType::Recommend,
            target_problem_id: None,
            target_user_handle: None,
            tags: None,
            min_difficulty: None,
            max_difficulty: None,
            alternative: 0,
        }
    }

    pub fn similar(problem_id: ProblemId) -> Self {
        Self {
            kind: QueryType::Similar,
            target_problem_id: Some(problem_id),
            ..Self::recommend()
        }
    }

    pub fn difference(target_handle: impl Into<String>) -> Self {
        Self {
            kind: QueryType::User,
            target_user_handle: Some(target_handle.into()),
            ..Self::recommend()
        }
    }

    pub fn with_tags(mut self, tags: impl Into<String>) -> Self {
        self.tags = Some(tags.into());
        self
    }

    pub fn with_difficulty(mut self, min: Option<&str>, max: Option<&str>) -> Self {
        self.min_difficulty = min.map(str::to_string);
        self.max_difficulty = max.map(str::to_string);
        self
    }

    pub fn with_page(mut self, page: usize) -> Self {
        self.alternative = page;
        self
    }
}

/// One page of results plus the keywords describing what was asked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub rows: Vec<ProblemRow>,
    pub keywords: Vec<String>,
}

impl QueryResponse {
    /// One `ID: .., Title: .., Tags: .., Difficulty: ..` line per row.
    pub fn render(&self) -> String {
        self.rows
            .iter()
            .map(|row| {
                format!(
                    "ID: {}, Title: {}, Tags: {}, Difficulty: {}",
                    row.problem_id,
                    row.title,
                    row.tags.join(", "),
                    row.difficulty
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_agent_payload() {
        let query: FilterQuery = serde_json::from_str(
            r#"{"type": "similar", "target_problem_id": 1753, "tags": "dp || graphs", "alternative": 2}"#,
        )
        .unwrap();
        assert_eq!(query.kind, QueryType::Similar);
        assert_eq!(query.target_problem_id, Some(1753));
        assert_eq!(query.alternative, 2);
        assert!(query.min_difficulty.is_none());
    }

    #[test]
    fn test_difference_alias() {
        let a: FilterQuery = serde_json::from_str(r#"{"type": "user", "target_user_handle": "x"}"#).unwrap();
        let b: FilterQuery = serde_json::from_str(r#"{"type": "difference", "target_user_handle": "x"}"#).unwrap();
        assert_eq!(a, b);
        assert_eq!(a, FilterQuery::difference("x"));
        assert!(serde_json::from_str::<FilterQuery>(r#"{"type": "popular"}"#).is_err());
    }

    #[test]
    fn test_render() {
        let response = QueryResponse {
            rows: vec![
                ProblemRow {
                    problem_id: 1000,
                    title: "A+B".into(),
                    tags: vec!["math".into(), "implementation".into()],
                    difficulty: "Bronze 5".into(),
                },
                ProblemRow {
                    problem_id: 9999,
                    title: "Untitled".into(),
                    tags: vec![],
                    difficulty: "Unrated".into(),
                },
            ],
            keywords: vec!["none".into()],
        };
        assert_eq!(
            response.render(),
            "ID: 1000, Title: A+B, Tags: math, implementation, Difficulty: Bronze 5\n\
             ID: 9999, Title: Untitled, Tags: , Difficulty: Unrated"
        );
    }
}
