use crate::config::ServiceConfig;
use crate::error::Result;
use crate::models::{ProblemId, ProblemMetadata, RawInteraction};
use crate::services::dataset::{leave_n_out_split, load_interactions, load_problem_metadata, Dataset};
use crate::services::encoder::InteractionEncoder;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::BTreeMap;
use tracing::info;

/// Everything derived from the two input tables: the fitted encoder, the
/// encoded dataset and the problem metadata.
///
/// Training and serving both build it through [`Corpus::load`], so with the
/// same inputs and seed the encoder mapping and model shapes agree.
pub struct Corpus {
    pub encoder: InteractionEncoder,
    pub dataset: Dataset,
    pub metadata: BTreeMap<ProblemId, ProblemMetadata>,
}

impl Corpus {
    pub fn load(config: &ServiceConfig) -> Result<Self> {
        let interactions = load_interactions(config.solved_info_path())?;
        let metadata = load_problem_metadata(config.problem_info_path())?;
        Self::from_interactions(&interactions, metadata, config.holdout_n, config.seed)
    }

    /// With `holdout_n > 0`, a seeded leave-n-out split provides the held-out
    /// rows used for validation; the encoder is fitted on train rows only.
    pub fn from_interactions(
        interactions: &[RawInteraction],
        metadata: BTreeMap<ProblemId, ProblemMetadata>,
        holdout_n: usize,
        seed: u64,
    ) -> Result<Self> {
        let (encoder, dataset) = if holdout_n == 0 {
            let (encoder, train) = InteractionEncoder::fit_transform(interactions);
            (encoder, Dataset::new(train, None)?)
        } else {
            let mut rng = StdRng::seed_from_u64(seed);
            let (train_raw, test_raw) = leave_n_out_split(interactions, holdout_n, true, &mut rng);
            let (encoder, train) = InteractionEncoder::fit_transform(&train_raw);
            let test = encoder.transform(&test_raw);
            (encoder, Dataset::new(train, Some(test))?)
        };

        info!(
            users = dataset.user_count(),
            items = dataset.item_count(),
            problems = metadata.len(),
            density = dataset.density(),
            "Corpus loaded"
        );

        Ok(Self {
            encoder,
            dataset,
            metadata,
        })
    }
}
