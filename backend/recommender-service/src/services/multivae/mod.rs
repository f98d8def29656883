// ============================================
// Variational Autoencoder Model (MultiVAE)
// ============================================
//
// Encodes a user's binary interaction row into a Gaussian latent
// (mu, log_var) and decodes it into logits over every item.
//
//   x'     = dropout(l2_normalize(x))
//   h      = encoder(x')              tanh between layers, none on the last
//   mu     = h[:, :d],  log_var = h[:, d:]
//   z      = mu + eps * exp(0.5 * log_var)   (training)  |  mu  (inference)
//   logits = decoder(z)
//
// Loss per row: -sum(log_softmax(logits) * x) + beta * KL(N(mu, var) || N(0, 1)).

mod trainer;

pub use trainer::MultiVaeTrainer;

use crate::config::MultiVaeConfig;
use crate::error::{RecommenderError, Result};
use crate::services::dataset::{CsrMatrix, Dataset};
use crate::services::nn::tensor::dense_rows;
use crate::services::nn::{linear_layer, to_array2, Model};
use crate::utils::{top_k_rows, MASKED_SCORE};
use candle_core::{Device, Module, Tensor, D};
use candle_nn::{ops, AdamW, Linear, Optimizer, VarMap};
use ndarray::{s, Array1, Array2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Bernoulli, Distribution, StandardNormal};
use std::sync::{Mutex, PoisonError};
use tracing::debug;

pub const MULTIVAE_MODEL_NAME: &str = "MultiVAE";

const NORM_EPS: f64 = 1e-12;
const SCORING_CHUNK: usize = 1024;

/// Reconstruction logits plus the latent parameters that produced them.
#[derive(Debug, Clone)]
pub struct VaeOutput {
    pub logits: Tensor,
    pub mu: Tensor,
    pub log_var: Tensor,
}

pub struct MultiVae {
    varmap: VarMap,
    encoder: Vec<Linear>,
    decoder: Vec<Linear>,
    latent_dim: usize,
    dropout: f32,
    training: bool,
    noise_rng: Mutex<StdRng>,
    train_matrix: CsrMatrix,
    device: Device,
}

impl MultiVae {
    pub fn new<R: Rng + ?Sized>(dataset: &Dataset, config: &MultiVaeConfig, rng: &mut R) -> Result<Self> {
        let items = dataset.item_count();
        let Some(&last) = config.hidden_dims.last() else {
            return Err(RecommenderError::InvalidInput("MultiVAE needs at least one hidden dimension".into()));
        };
        if last < 2 || last % 2 != 0 {
            return Err(RecommenderError::InvalidInput(format!(
                "last encoder dimension must be even and >= 2, got {}",
                last
            )));
        }
        if !(0.0..1.0).contains(&config.dropout) {
            return Err(RecommenderError::InvalidInput(format!(
                "dropout must be in [0, 1), got {}",
                config.dropout
            )));
        }
        let latent_dim = last / 2;
        let device = Device::Cpu;
        let varmap = VarMap::new();

        // [items, h1, ..., hn]
        let mut encoder_dims = vec![items];
        encoder_dims.extend(config.hidden_dims.iter().copied());
        // [hn / 2, h(n-1), ..., h1, items]
        let mut decoder_dims = vec![latent_dim];
        decoder_dims.extend(config.hidden_dims.iter().rev().skip(1).copied());
        decoder_dims.push(items);

        let mut stack = |prefix: &str, dims: &[usize]| -> Result<Vec<Linear>> {
            dims.windows(2)
                .enumerate()
                .map(|(i, w)| linear_layer(&varmap, &format!("{}.{}", prefix, i), w[0], w[1], &mut *rng, &device))
                .collect()
        };
        let encoder = stack("encoder", &encoder_dims)?;
        let decoder = stack("decoder", &decoder_dims)?;
        let noise_rng = Mutex::new(StdRng::seed_from_u64(rng.gen()));

        debug!(?encoder_dims, ?decoder_dims, dropout = config.dropout, "MultiVAE initialized");

        Ok(Self {
            varmap,
            encoder,
            decoder,
            latent_dim,
            dropout: config.dropout,
            training: true,
            noise_rng,
            train_matrix: dataset.interaction_matrix().clone(),
            device,
        })
    }

    pub fn item_count(&self) -> usize {
        self.train_matrix.shape().1
    }

    pub fn latent_dim(&self) -> usize {
        self.latent_dim
    }

    pub fn is_training(&self) -> bool {
        self.training
    }

    /// Dense train interaction rows of the given users.
    pub fn interaction_rows(&self, users: &[usize]) -> Result<Tensor> {
        dense_rows(&self.train_matrix, users, &self.device)
    }

    /// Item logits for a user described by the problems they solved,
    /// always in inference mode.
    pub fn score_items(&self, solved: &[usize]) -> Result<Array1<f32>> {
        let items = self.item_count();
        let mut row = vec![0.0f32; items];
        for &item in solved {
            if item >= items {
                return Err(RecommenderError::InvalidInput(format!(
                    "item index {} out of range",
                    item
                )));
            }
            row[item] = 1.0;
        }
        let x = Tensor::from_vec(row, (1, items), &self.device)?;
        let output = self.run(&x, false)?;
        Ok(Array1::from(output.logits.squeeze(0)?.to_vec1::<f32>()?))
    }

    fn run(&self, x: &Tensor, stochastic: bool) -> Result<VaeOutput> {
        let (_, cols) = x.dims2()?;
        if cols != self.item_count() {
            return Err(RecommenderError::InvalidInput(format!(
                "input has {} columns, model expects {}",
                cols,
                self.item_count()
            )));
        }

        let mut noise_rng = if stochastic {
            Some(self.noise_rng.lock().unwrap_or_else(PoisonError::into_inner))
        } else {
            None
        };

        let norm = x.sqr()?.sum_keepdim(1)?.sqrt()?.maximum(NORM_EPS)?;
        let mut h = x.broadcast_div(&norm)?;
        if let Some(rng) = noise_rng.as_deref_mut() {
            if self.dropout > 0.0 {
                let mask = self.dropout_mask(h.dims(), rng)?;
                h = h.mul(&mask)?;
            }
        }

        let last_encoder = self.encoder.len() - 1;
        for (i, layer) in self.encoder.iter().enumerate() {
            h = layer.forward(&h)?;
            if i < last_encoder {
                h = h.tanh()?;
            }
        }

        let mu = h.narrow(1, 0, self.latent_dim)?;
        let log_var = h.narrow(1, self.latent_dim, self.latent_dim)?;

        let mut h = match noise_rng.as_deref_mut() {
            Some(rng) => {
                let values: Vec<f32> = (0..mu.elem_count())
                    .map(|_| -> f32 { StandardNormal.sample(&mut *rng) })
                    .collect();
                let eps = Tensor::from_vec(values, mu.dims(), &self.device)?;
                let std = log_var.affine(0.5, 0.0)?.exp()?;
                mu.add(&eps.mul(&std)?)?
            }
            None => mu.clone(),
        };
        drop(noise_rng);

        let last_decoder = self.decoder.len() - 1;
        for (i, layer) in self.decoder.iter().enumerate() {
            h = layer.forward(&h)?;
            if i < last_decoder {
                h = h.tanh()?;
            }
        }

        Ok(VaeOutput {
            logits: h,
            mu,
            log_var,
        })
    }

    /// Inverted-dropout mask: kept entries scaled by 1 / (1 - p).
    fn dropout_mask(&self, shape: &[usize], rng: &mut StdRng) -> Result<Tensor> {
        let keep = 1.0 - self.dropout;
        let bernoulli = Bernoulli::new(keep as f64)
            .map_err(|e| RecommenderError::InvalidInput(format!("invalid dropout: {}", e)))?;
        let scale = 1.0 / keep;
        let count: usize = shape.iter().product();
        let values: Vec<f32> = (0..count)
            .map(|_| if bernoulli.sample(&mut *rng) { scale } else { 0.0 })
            .collect();
        Ok(Tensor::from_vec(values, shape, &self.device)?)
    }

    /// Mean per-row loss of a dense batch. With `stochastic` the forward pass
    /// applies dropout and samples the latent; otherwise it uses `z = mu`.
    pub fn loss(&self, batch: &Tensor, kl_weight: f32, stochastic: bool) -> Result<Tensor> {
        let rows = batch.dim(0)?;
        if rows == 0 {
            return Err(RecommenderError::InvalidInput("empty training batch".into()));
        }
        let output = self.run(batch, stochastic)?;

        let log_probs = ops::log_softmax(&output.logits, D::Minus1)?;
        let reconstruction = log_probs.mul(batch)?.sum_all()?.neg()?;
        // KL(N(mu, var) || N(0, 1)) = -0.5 * sum(1 + log_var - mu^2 - var)
        let kl = output
            .log_var
            .affine(1.0, 1.0)?
            .sub(&output.mu.sqr()?)?
            .sub(&output.log_var.exp()?)?
            .sum_all()?
            .affine(-0.5, 0.0)?;

        let total = reconstruction.add(&kl.affine(kl_weight as f64, 0.0)?)?;
        Ok(total.affine(1.0 / rows as f64, 0.0)?)
    }

    /// One optimization step on a dense batch of interaction rows; returns
    /// the mean per-row loss.
    pub fn train_step(&self, batch: &Tensor, optimizer: &mut AdamW, kl_weight: f32) -> Result<f32> {
        let loss = self.loss(batch, kl_weight, true)?;
        optimizer.backward_step(&loss)?;
        Ok(loss.to_scalar::<f32>()?)
    }

    /// Inference-mode logits for every train user, in chunks.
    fn all_user_scores(&self) -> Result<Array2<f32>> {
        let (users, items) = self.train_matrix.shape();
        let mut scores = Array2::<f32>::zeros((users, items));
        let all: Vec<usize> = (0..users).collect();
        for (chunk_index, chunk) in all.chunks(SCORING_CHUNK).enumerate() {
            let start = chunk_index * SCORING_CHUNK;
            let x = self.interaction_rows(chunk)?;
            let logits = to_array2(&self.run(&x, false)?.logits)?;
            scores.slice_mut(s![start..start + chunk.len(), ..]).assign(&logits);
        }
        Ok(scores)
    }
}

impl Model for MultiVae {
    /// Dense `(batch, items)` interaction rows.
    type Input = Tensor;
    type Output = VaeOutput;

    fn name(&self) -> &'static str {
        MULTIVAE_MODEL_NAME
    }

    fn forward(&self, input: &Tensor) -> Result<VaeOutput> {
        self.run(input, self.training)
    }

    fn varmap(&self) -> &VarMap {
        &self.varmap
    }

    fn set_training(&mut self, training: bool) {
        self.training = training;
    }

    fn top_k(&self, k: usize) -> Result<Vec<Vec<usize>>> {
        let mut scores = self.all_user_scores()?;
        for (user, mut row) in scores.outer_iter_mut().enumerate() {
            for &item in self.train_matrix.row_indices(user) {
                row[item] = MASKED_SCORE;
            }
        }
        Ok(top_k_rows(scores.view(), k))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EncodedInteraction;
    use crate::services::nn::adam;

    fn dataset() -> Dataset {
        let rows = [(0, 0), (0, 1), (1, 1), (1, 2), (1, 4), (2, 3), (2, 4), (3, 0), (3, 2)]
            .iter()
            .map(|&(u, i)| EncodedInteraction::new(u, i))
            .collect();
        Dataset::new(rows, None).unwrap()
    }

    fn small_config() -> MultiVaeConfig {
        MultiVaeConfig {
            hidden_dims: vec![6, 4],
            ..MultiVaeConfig::default()
        }
    }

    fn rows(values: &[[f32; 5]]) -> Tensor {
        let flat: Vec<f32> = values.iter().flatten().copied().collect();
        Tensor::from_vec(flat, (values.len(), 5), &Device::Cpu).unwrap()
    }

    #[test]
    fn test_layer_shapes_and_parameter_names() {
        let mut rng = StdRng::seed_from_u64(0);
        let model = MultiVae::new(&dataset(), &small_config(), &mut rng).unwrap();
        let params = model.parameters().unwrap();

        assert_eq!(model.latent_dim(), 2);
        assert_eq!(params["encoder.0.weight"].shape(), &[6, 5]);
        assert_eq!(params["encoder.1.weight"].shape(), &[4, 6]);
        assert_eq!(params["decoder.0.weight"].shape(), &[6, 2]);
        assert_eq!(params["decoder.1.weight"].shape(), &[5, 6]);
        assert_eq!(params["decoder.1.bias"].shape(), &[5]);
        assert_eq!(params.len(), 8);
    }

    #[test]
    fn test_rejects_odd_latent_split() {
        let mut rng = StdRng::seed_from_u64(0);
        let config = MultiVaeConfig {
            hidden_dims: vec![6, 3],
            ..MultiVaeConfig::default()
        };
        assert!(MultiVae::new(&dataset(), &config, &mut rng).is_err());
    }

    #[test]
    fn test_inference_is_deterministic() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut model = MultiVae::new(&dataset(), &small_config(), &mut rng).unwrap();
        model.set_training(false);

        let x = rows(&[[1.0, 0.0, 1.0, 0.0, 0.0], [0.0, 0.0, 0.0, 1.0, 1.0]]);
        let a = to_array2(&model.forward(&x).unwrap().logits).unwrap();
        let b = to_array2(&model.forward(&x).unwrap().logits).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.dim(), (2, 5));
        assert_eq!(model.forward(&x).unwrap().mu.dims(), &[2, 2]);

        let single = model.score_items(&[0, 2]).unwrap();
        for (s, l) in single.iter().zip(a.row(0).iter()) {
            assert!((s - l).abs() < 1e-5);
        }
        assert!(model.score_items(&[7]).is_err());
    }

    #[test]
    fn test_training_forward_is_stochastic() {
        let mut rng = StdRng::seed_from_u64(2);
        let model = MultiVae::new(&dataset(), &small_config(), &mut rng).unwrap();
        assert!(model.is_training());

        let x = rows(&[[1.0, 1.0, 0.0, 1.0, 0.0]]);
        let a = to_array2(&model.forward(&x).unwrap().logits).unwrap();
        let b = to_array2(&model.forward(&x).unwrap().logits).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_zero_row_is_finite() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut model = MultiVae::new(&dataset(), &small_config(), &mut rng).unwrap();
        model.set_training(false);
        let out = model.forward(&rows(&[[0.0; 5]])).unwrap();
        assert!(to_array2(&out.logits).unwrap().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_deterministic_loss_matches_closed_form() {
        let mut rng = StdRng::seed_from_u64(4);
        let model = MultiVae::new(&dataset(), &small_config(), &mut rng).unwrap();
        let x = rows(&[[1.0, 0.0, 1.0, 0.0, 0.0], [0.0, 1.0, 0.0, 1.0, 1.0]]);
        let beta = 0.3f32;

        let output = model.run(&x, false).unwrap();
        let logits = to_array2(&output.logits).unwrap();
        let mu = to_array2(&output.mu).unwrap();
        let log_var = to_array2(&output.log_var).unwrap();
        let targets = to_array2(&x).unwrap();

        let mut expected = 0.0f32;
        for r in 0..2 {
            let row = logits.row(r);
            let max = row.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
            let log_sum = row.iter().map(|v| (v - max).exp()).sum::<f32>().ln();
            for c in 0..5 {
                expected -= targets[[r, c]] * ((row[c] - max) - log_sum);
            }
            for d in 0..2 {
                let (m, lv) = (mu[[r, d]], log_var[[r, d]]);
                expected += beta * -0.5 * (1.0 + lv - m * m - lv.exp());
            }
        }
        expected /= 2.0;

        let loss = model.loss(&x, beta, false).unwrap().to_scalar::<f32>().unwrap();
        assert!((loss - expected).abs() < 1e-4, "loss {} vs {}", loss, expected);
    }

    #[test]
    fn test_log_softmax_is_stable_for_large_logits() {
        let logits = Tensor::new(&[[1.0f32, 2.0, 3.0], [1000.0, 1000.0, 1000.0]], &Device::Cpu).unwrap();
        let log_probs = to_array2(&ops::log_softmax(&logits, D::Minus1).unwrap()).unwrap();
        for row in log_probs.outer_iter() {
            let total: f32 = row.mapv(f32::exp).sum();
            assert!((total - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_train_step_reduces_loss() {
        let dataset = dataset();
        let mut rng = StdRng::seed_from_u64(4);
        let config = MultiVaeConfig {
            dropout: 0.0,
            ..small_config()
        };
        let model = MultiVae::new(&dataset, &config, &mut rng).unwrap();
        let batch = model.interaction_rows(&[0, 1, 2, 3]).unwrap();
        let mut optimizer = adam(model.varmap(), 0.01).unwrap();

        let first = model.loss(&batch, 0.05, false).unwrap().to_scalar::<f32>().unwrap();
        for _ in 0..200 {
            model.train_step(&batch, &mut optimizer, 0.05).unwrap();
        }
        let last = model.loss(&batch, 0.05, false).unwrap().to_scalar::<f32>().unwrap();
        assert!(last < first, "loss {} -> {}", first, last);
    }

    #[test]
    fn test_top_k_masks_train_items() {
        let dataset = dataset();
        let mut rng = StdRng::seed_from_u64(5);
        let model = MultiVae::new(&dataset, &small_config(), &mut rng).unwrap();

        // user 1 has seen 3 of 5 items, so only 2 come back even for k = 3
        let top = model.top_k(3).unwrap();
        assert_eq!(top.len(), 4);
        assert_eq!(top.iter().map(Vec::len).collect::<Vec<_>>(), vec![3, 2, 3, 3]);
        for (user, row) in top.iter().enumerate() {
            let seen = dataset.interaction_matrix().row_indices(user);
            assert!(row.iter().all(|i| !seen.contains(i)), "user {} got {:?}", user, row);
        }
    }

    #[test]
    fn test_load_parameters_round_trip() {
        let dataset = dataset();
        let mut rng = StdRng::seed_from_u64(6);
        let source = MultiVae::new(&dataset, &small_config(), &mut rng).unwrap();
        let mut target = MultiVae::new(&dataset, &small_config(), &mut rng).unwrap();

        target.load_parameters(source.parameters().unwrap()).unwrap();
        assert_eq!(target.parameters().unwrap(), source.parameters().unwrap());
        assert_eq!(target.score_items(&[1]).unwrap(), source.score_items(&[1]).unwrap());

        let mut wrong = target.parameters().unwrap();
        wrong.remove("decoder.1.bias");
        assert!(matches!(
            target.load_parameters(wrong),
            Err(RecommenderError::CheckpointMismatch(_))
        ));
    }
}
