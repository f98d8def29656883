use super::SolvedProblemSource;
use crate::error::{RecommenderError, Result};
use crate::models::SolvedProblem;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct TopSolvedResponse {
    #[serde(default)]
    items: Vec<SolvedProblem>,
}

/// solved.ac REST client for a user's top 100 solved problems.
pub struct SolvedAcClient {
    client: Client,
    base_url: String,
}

impl SolvedAcClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn top_100_url(&self) -> String {
        format!("{}/v3/user/top_100", self.base_url)
    }
}

#[async_trait]
impl SolvedProblemSource for SolvedAcClient {
    async fn top_solved(&self, handle: &str) -> Result<Vec<SolvedProblem>> {
        let url = self.top_100_url();
        debug!(handle, url = %url, "Requesting top solved problems");

        let response = self
            .client
            .get(&url)
            .query(&[("handle", handle)])
            .header("Accept", "application/json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(RecommenderError::ExternalFetch(format!(
                "solved.ac returned {} for {}",
                status, handle
            )));
        }

        let body: TopSolvedResponse = response.json().await?;
        Ok(body.items)
    }
}
