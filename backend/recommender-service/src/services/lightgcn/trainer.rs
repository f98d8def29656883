use super::LightGcn;
use crate::config::LightGcnConfig;
use crate::error::Result;
use crate::models::TrainingReport;
use crate::services::dataset::Dataset;
use crate::services::nn::{adam, evaluate_recall, Model};
use crate::services::sampler::NegativeSampler;
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::{debug, info};

/// BPR training loop: fresh negative samples every epoch, shuffled
/// mini-batches, Adam over both embedding tables.
pub struct LightGcnTrainer<'a> {
    dataset: &'a Dataset,
    config: &'a LightGcnConfig,
}

impl<'a> LightGcnTrainer<'a> {
    pub fn new(dataset: &'a Dataset, config: &'a LightGcnConfig) -> Self {
        Self { dataset, config }
    }

    pub fn train<R: Rng + ?Sized>(&self, model: &mut LightGcn, rng: &mut R) -> Result<TrainingReport> {
        let sampler = NegativeSampler::new(
            self.dataset,
            self.config.samples_per_user,
            self.config.negatives_per_sample,
        );
        let truth = self.dataset.held_out_by_user();
        let mut optimizer = adam(model.varmap(), self.config.learning_rate)?;
        let mut report = TrainingReport::default();
        let batch_size = self.config.batch_size.max(1);
        let mut steps = 0usize;

        model.set_training(true);
        for epoch in 1..=self.config.epochs {
            let mut samples = sampler.sample(rng)?;
            samples.shuffle(rng);

            let mut total = 0.0f32;
            let mut batches = 0usize;
            for batch in samples.chunks(batch_size) {
                total += model.train_step(batch, &mut optimizer)?;
                batches += 1;
            }
            steps += batches;
            let epoch_loss = if batches == 0 { 0.0 } else { total / batches as f32 };
            report.epoch_losses.push(epoch_loss);
            info!(epoch, loss = epoch_loss, "LightGCN epoch finished");

            if let Some(truth) = &truth {
                if self.config.validate_every > 0 && epoch % self.config.validate_every == 0 {
                    let recall = evaluate_recall(model, truth, self.config.top_k)?;
                    info!(epoch, k = self.config.top_k, recall, "LightGCN validation");
                    report.validation_recalls.push((epoch, recall));
                }
            }
        }

        model.set_training(false);
        debug!(steps, "LightGCN training finished");
        Ok(report)
    }
}
