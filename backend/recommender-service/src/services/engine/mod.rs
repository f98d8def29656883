//! Recommendation orchestrator.
//!
//! Built once at startup from trained checkpoints and shared read-only by
//! every caller (wrap it in an `Arc`). Each query is a pure function of the
//! loaded parameters, its arguments and the solved lists fetched for it.

mod corpus;
mod query;

pub use corpus::Corpus;
pub use query::{FilterQuery, QueryResponse, QueryType};

use crate::config::Config;
use crate::error::{RecommenderError, Result};
use crate::models::{ProblemId, ProblemMetadata, ProblemRow, RankedProblem};
use crate::services::encoder::InteractionEncoder;
use crate::services::filter::{describe_level, page, ProblemFilter};
use crate::services::lightgcn::LightGcn;
use crate::services::multivae::MultiVae;
use crate::services::nn::{Checkpoint, Model};
use crate::services::source::{FallbackSource, SnapshotStore, SolvedProblemSource};
use crate::utils::{argsort_desc, cosine_similarity};
use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

pub struct RecommendationEngine {
    encoder: InteractionEncoder,
    /// Propagated LightGCN item embeddings, computed once at construction.
    item_embeddings: Array2<f32>,
    multivae: MultiVae,
    metadata: BTreeMap<ProblemId, ProblemMetadata>,
    source: FallbackSource,
    page_size: usize,
}

impl RecommendationEngine {
    pub fn new(
        encoder: InteractionEncoder,
        lightgcn: &LightGcn,
        mut multivae: MultiVae,
        metadata: BTreeMap<ProblemId, ProblemMetadata>,
        source: FallbackSource,
        page_size: usize,
    ) -> Result<Self> {
        let items = encoder.item_count();
        if lightgcn.item_count() != items || multivae.item_count() != items {
            return Err(RecommenderError::Integrity(format!(
                "encoder knows {} items, LightGCN {} and MultiVAE {}",
                items,
                lightgcn.item_count(),
                multivae.item_count()
            )));
        }
        if page_size == 0 {
            return Err(RecommenderError::InvalidInput("page size must be positive".into()));
        }

        multivae.set_training(false);
        let (_, item_embeddings) = lightgcn.final_embeddings()?;

        Ok(Self {
            encoder,
            item_embeddings,
            multivae,
            metadata,
            source,
            page_size,
        })
    }

    /// Rebuild the corpus from the configured tables and restore both
    /// checkpoints. A missing checkpoint is fatal.
    pub fn load(config: &Config, live: Arc<dyn SolvedProblemSource>) -> Result<Self> {
        let corpus = Corpus::load(&config.service)?;
        let mut rng = StdRng::seed_from_u64(config.service.seed);

        let mut lightgcn = LightGcn::new(&corpus.dataset, &config.lightgcn, &mut rng)?;
        Checkpoint::restore(&mut lightgcn, config.service.lightgcn_checkpoint())?;

        let mut multivae = MultiVae::new(&corpus.dataset, &config.multivae, &mut rng)?;
        Checkpoint::restore(&mut multivae, config.service.multivae_checkpoint())?;

        let source = FallbackSource::new(live, SnapshotStore::new(config.service.snapshot_dir()));
        let engine = Self::new(
            corpus.encoder,
            &lightgcn,
            multivae,
            corpus.metadata,
            source,
            config.service.page_size,
        )?;
        info!(
            items = engine.encoder.item_count(),
            page_size = engine.page_size,
            "Recommendation engine ready"
        );
        Ok(engine)
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// MultiVAE ranking for a user, from their live (or cached) solved list.
    pub async fn recommend(&self, handle: &str) -> Result<Vec<RankedProblem>> {
        let solved: Vec<ProblemId> = self
            .source
            .fetch(handle)
            .await
            .iter()
            .map(|p| p.problem_id)
            .collect();
        self.recommend_for_solved(&solved)
    }

    /// Solved problems are excluded; unknown ids are ignored.
    pub fn recommend_for_solved(&self, solved: &[ProblemId]) -> Result<Vec<RankedProblem>> {
        let solved = self.encoder.encode_items(solved);
        let mut scores = self.multivae.score_items(&solved)?;
        for &item in &solved {
            scores[item] = f32::NEG_INFINITY;
        }
        let solved: HashSet<usize> = solved.into_iter().collect();
        let order = argsort_desc(scores.view())
            .into_iter()
            .filter(|item| !solved.contains(item));
        Ok(self.join_metadata(order, &scores))
    }

    /// Problems ranked by cosine similarity of LightGCN item embeddings.
    /// The query problem itself is included (it ranks first).
    pub fn similar(&self, problem_id: ProblemId) -> Result<Vec<RankedProblem>> {
        let item = self
            .encoder
            .encode_item(problem_id)
            .ok_or(RecommenderError::UnknownItem(problem_id))?;
        let target = self.item_embeddings.row(item);
        let scores: Array1<f32> = self
            .item_embeddings
            .outer_iter()
            .map(|row| cosine_similarity(target, row))
            .collect();
        Ok(self.join_metadata(argsort_desc(scores.view()).into_iter(), &scores))
    }

    /// Subsequence of `recommended` solved by `target` but not by `base`.
    pub async fn difference(
        &self,
        recommended: Vec<RankedProblem>,
        base: &str,
        target: &str,
    ) -> Vec<RankedProblem> {
        let (base_solved, target_solved) = tokio::join!(self.source.fetch(base), self.source.fetch(target));
        let base_ids: HashSet<ProblemId> = base_solved.iter().map(|p| p.problem_id).collect();
        let wanted: HashSet<ProblemId> = target_solved
            .iter()
            .map(|p| p.problem_id)
            .filter(|id| !base_ids.contains(id))
            .collect();
        debug!(base, target, candidates = wanted.len(), "Computed solved-set difference");

        recommended
            .into_iter()
            .filter(|r| wanted.contains(&r.problem_id()))
            .collect()
    }

    /// Answer one filter query on behalf of `caller`.
    pub async fn query(&self, caller: &str, query: &FilterQuery) -> Result<QueryResponse> {
        let filter = ProblemFilter::new(
            query.tags.as_deref(),
            query.min_difficulty.as_deref(),
            query.max_difficulty.as_deref(),
        )?;

        let candidates = match query.kind {
            QueryType::Recommend => self.recommend(caller).await?,
            QueryType::Similar => {
                let problem_id = query.target_problem_id.ok_or_else(|| {
                    RecommenderError::InvalidInput("similar query needs target_problem_id".into())
                })?;
                self.similar(problem_id)?
            }
            QueryType::User => {
                let target = query.target_user_handle.as_deref().ok_or_else(|| {
                    RecommenderError::InvalidInput("user query needs target_user_handle".into())
                })?;
                let recommended = self.recommend(caller).await?;
                self.difference(recommended, caller, target).await
            }
        };

        let total = candidates.len();
        let filtered = filter.apply(candidates);
        let matched = filtered.len();
        let rows: Vec<ProblemRow> = page(filtered, self.page_size, query.alternative)
            .into_iter()
            .map(to_row)
            .collect();

        debug!(
            caller,
            kind = ?query.kind,
            candidates = total,
            matched,
            page = query.alternative,
            returned = rows.len(),
            "Query answered"
        );

        Ok(QueryResponse {
            rows,
            keywords: keywords(query, &filter),
        })
    }

    fn join_metadata(&self, order: impl Iterator<Item = usize>, scores: &Array1<f32>) -> Vec<RankedProblem> {
        order
            .filter_map(|item| {
                let problem_id = self.encoder.decode_item(item)?;
                let problem = self.metadata.get(&problem_id)?;
                Some(RankedProblem {
                    problem: problem.clone(),
                    score: scores[item],
                })
            })
            .collect()
    }
}

fn to_row(ranked: RankedProblem) -> ProblemRow {
    let difficulty = describe_level(ranked.problem.level);
    ProblemRow {
        problem_id: ranked.problem.problem_id,
        title: ranked.problem.title,
        tags: ranked.problem.tags,
        difficulty,
    }
}

fn keywords(query: &FilterQuery, filter: &ProblemFilter) -> Vec<String> {
    let mut keywords: Vec<String> = filter
        .tags()
        .map(|expr| {
            expr.literals()
                .into_iter()
                .map(|tag| format!("{}_recommended", tag))
                .collect()
        })
        .unwrap_or_default();
    if let Some(problem_id) = query.target_problem_id {
        keywords.push(format!("problem_{}", problem_id));
    }
    if let Some(handle) = &query.target_user_handle {
        keywords.push(format!("user_{}", handle));
    }
    if keywords.is_empty() {
        keywords.push("none".to_string());
    }
    keywords
}
