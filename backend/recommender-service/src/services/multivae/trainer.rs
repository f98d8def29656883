use super::MultiVae;
use crate::config::MultiVaeConfig;
use crate::error::Result;
use crate::models::TrainingReport;
use crate::services::dataset::Dataset;
use crate::services::nn::{adam, evaluate_recall, Model};
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::{debug, info};

/// Mini-batch training over shuffled users, one dense interaction row each.
pub struct MultiVaeTrainer<'a> {
    dataset: &'a Dataset,
    config: &'a MultiVaeConfig,
}

impl<'a> MultiVaeTrainer<'a> {
    pub fn new(dataset: &'a Dataset, config: &'a MultiVaeConfig) -> Self {
        Self { dataset, config }
    }

    pub fn train<R: Rng + ?Sized>(&self, model: &mut MultiVae, rng: &mut R) -> Result<TrainingReport> {
        let truth = self.dataset.held_out_by_user();
        let mut optimizer = adam(model.varmap(), self.config.learning_rate)?;
        let mut report = TrainingReport::default();
        let batch_size = self.config.batch_size.max(1);
        let mut steps = 0usize;
        let mut users: Vec<usize> = (0..self.dataset.user_count()).collect();

        model.set_training(true);
        for epoch in 1..=self.config.epochs {
            users.shuffle(rng);

            let mut total = 0.0f32;
            let mut batches = 0usize;
            for chunk in users.chunks(batch_size) {
                let batch = model.interaction_rows(chunk)?;
                total += model.train_step(&batch, &mut optimizer, self.config.kl_weight)?;
                batches += 1;
            }
            steps += batches;
            let epoch_loss = if batches == 0 { 0.0 } else { total / batches as f32 };
            report.epoch_losses.push(epoch_loss);
            info!(epoch, loss = epoch_loss, "MultiVAE epoch finished");

            if let Some(truth) = &truth {
                if self.config.validate_every > 0 && epoch % self.config.validate_every == 0 {
                    let recall = evaluate_recall(model, truth, self.config.top_k)?;
                    info!(epoch, k = self.config.top_k, recall, "MultiVAE validation");
                    report.validation_recalls.push((epoch, recall));
                }
            }
        }

        model.set_training(false);
        debug!(steps, "MultiVAE training finished");
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EncodedInteraction;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn rows(pairs: &[(usize, usize)]) -> Vec<EncodedInteraction> {
        pairs.iter().map(|&(u, i)| EncodedInteraction::new(u, i)).collect()
    }

    fn config() -> MultiVaeConfig {
        MultiVaeConfig {
            hidden_dims: vec![8, 4],
            learning_rate: 0.01,
            batch_size: 2,
            epochs: 10,
            validate_every: 5,
            top_k: 2,
            ..MultiVaeConfig::default()
        }
    }

    #[test]
    fn test_train_reports_every_epoch() {
        let dataset = Dataset::new(rows(&[(0, 0), (0, 1), (1, 1), (1, 2), (2, 0), (2, 3)]), None).unwrap();
        let config = config();
        let mut rng = StdRng::seed_from_u64(11);
        let mut model = MultiVae::new(&dataset, &config, &mut rng).unwrap();

        let report = MultiVaeTrainer::new(&dataset, &config).train(&mut model, &mut rng).unwrap();
        assert_eq!(report.epoch_losses.len(), 10);
        assert!(report.epoch_losses.iter().all(|l| l.is_finite() && *l > 0.0));
        assert!(report.validation_recalls.is_empty());
        assert!(!model.is_training());
    }

    #[test]
    fn test_validation_runs_on_schedule() {
        let train = rows(&[(0, 0), (0, 1), (1, 1), (1, 2), (2, 2), (2, 3), (3, 0), (3, 3)]);
        let test = rows(&[(1, 0)]);
        let dataset = Dataset::new(train, Some(test)).unwrap();
        let config = config();
        let mut rng = StdRng::seed_from_u64(12);
        let mut model = MultiVae::new(&dataset, &config, &mut rng).unwrap();

        let report = MultiVaeTrainer::new(&dataset, &config).train(&mut model, &mut rng).unwrap();
        assert_eq!(
            report.validation_recalls,
            vec![(5, 1.0), (10, 1.0)],
            "two unseen items per user always fit in top-2"
        );
        let top = model.top_k(2).unwrap();
        assert!(top.iter().all(|row| row.len() == 2));
    }
}
