use crate::error::{RecommenderError, Result};
use crate::services::dataset::Dataset;
use rand::seq::{index, SliceRandom};
use rand::Rng;
use tracing::debug;

/// One training row: a user, one positive item and `k` negative items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairwiseSample {
    pub user: usize,
    pub positive: usize,
    pub negatives: Vec<usize>,
}

/// Draws (user, positive, negatives...) triples for pairwise ranking.
///
/// Positives are uniform with replacement over the user's train items;
/// the negatives of one row are uniform without replacement over the
/// complement.
pub struct NegativeSampler<'a> {
    dataset: &'a Dataset,
    samples_per_user: usize,
    negatives_per_sample: usize,
}

impl<'a> NegativeSampler<'a> {
    pub fn new(dataset: &'a Dataset, samples_per_user: usize, negatives_per_sample: usize) -> Self {
        Self {
            dataset,
            samples_per_user,
            negatives_per_sample,
        }
    }

    /// Samples for every user index in the dataset.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Vec<PairwiseSample>> {
        let mut samples = Vec::with_capacity(self.dataset.user_count() * self.samples_per_user);
        for user in 0..self.dataset.user_count() {
            samples.extend(self.sample_user(user, rng)?);
        }
        debug!(samples = samples.len(), "Drew pairwise samples");
        Ok(samples)
    }

    /// Samples for a single user. Fails when the user has no positives or fewer
    /// non-interacted items than the configured negative count.
    pub fn sample_user<R: Rng + ?Sized>(&self, user: usize, rng: &mut R) -> Result<Vec<PairwiseSample>> {
        let matrix = self.dataset.interaction_matrix();
        if user >= self.dataset.user_count() {
            return Err(RecommenderError::Sampling(format!(
                "user index {} out of range",
                user
            )));
        }
        let positives = matrix.row_indices(user);
        if positives.is_empty() {
            return Err(RecommenderError::Sampling(format!(
                "user {} has no positive items",
                user
            )));
        }

        let negatives = complement(positives, self.dataset.item_count());
        if negatives.len() < self.negatives_per_sample {
            return Err(RecommenderError::Sampling(format!(
                "user {} has {} candidate negatives, {} required",
                user,
                negatives.len(),
                self.negatives_per_sample
            )));
        }

        let mut rows = Vec::with_capacity(self.samples_per_user);
        for _ in 0..self.samples_per_user {
            let positive = *positives
                .choose(rng)
                .ok_or_else(|| RecommenderError::Sampling("empty positive set".into()))?;
            let picked = index::sample(rng, negatives.len(), self.negatives_per_sample)
                .into_iter()
                .map(|i| negatives[i])
                .collect();
            rows.push(PairwiseSample {
                user,
                positive,
                negatives: picked,
            });
        }
        Ok(rows)
    }
}

/// Sorted `0..item_count` minus the sorted `positives`.
fn complement(positives: &[usize], item_count: usize) -> Vec<usize> {
    let mut out = Vec::with_capacity(item_count.saturating_sub(positives.len()));
    let mut p = positives.iter().peekable();
    for item in 0..item_count {
        if p.peek() == Some(&&item) {
            p.next();
        } else {
            out.push(item);
        }
    }
    out
}
