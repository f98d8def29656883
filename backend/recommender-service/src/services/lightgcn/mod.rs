// ============================================
// Graph-Propagation Model (LightGCN)
// ============================================
//
// Learns user/item embeddings by neighborhood aggregation over the
// normalized user-item adjacency.
//
//   E_0 = [user_table; item_table]
//   E_k = A_norm · E_{k-1}             (k = 1..=num_layers)
//   F   = mean(E_0, ..., E_L)
//   score(u, i) = F_u · F_i
//
// Training minimizes BPR loss mean(softplus(s_neg - s_pos)) with Adam over
// both raw tables; gradients flow back through the sparse propagation.

mod trainer;

pub use trainer::LightGcnTrainer;

use crate::config::LightGcnConfig;
use crate::error::{RecommenderError, Result};
use crate::services::dataset::{CsrMatrix, Dataset};
use crate::services::nn::{new_var, softplus, to_array2, Model, SparseAdjacency};
use crate::services::sampler::PairwiseSample;
use crate::utils::{cosine_similarity, top_k_rows, MASKED_SCORE};
use candle_core::{Device, Tensor};
use candle_nn::{AdamW, Embedding, Optimizer, VarMap};
use ndarray::Array2;
use rand::Rng;
use rand_distr::{Distribution, Normal};
use tracing::debug;

pub const LIGHTGCN_MODEL_NAME: &str = "LightGCN";

const USER_EMBEDDING_KEY: &str = "user_embedding.weight";
const ITEM_EMBEDDING_KEY: &str = "item_embedding.weight";

pub struct LightGcn {
    varmap: VarMap,
    user_embedding: Embedding,
    item_embedding: Embedding,
    adjacency: SparseAdjacency,
    train_matrix: CsrMatrix,
    num_layers: usize,
    training: bool,
    device: Device,
}

impl LightGcn {
    pub fn new<R: Rng + ?Sized>(dataset: &Dataset, config: &LightGcnConfig, rng: &mut R) -> Result<Self> {
        let normal = Normal::new(0.0f32, config.init_std).map_err(|e| {
            RecommenderError::InvalidInput(format!("invalid LightGCN init std: {}", e))
        })?;
        let dim = config.embedding_dim;
        if dim == 0 {
            return Err(RecommenderError::InvalidInput("embedding dimension must be positive".into()));
        }
        let device = Device::Cpu;
        let varmap = VarMap::new();

        let (users, items) = (dataset.user_count(), dataset.item_count());
        let user_values: Vec<f32> = (0..users * dim).map(|_| normal.sample(&mut *rng)).collect();
        let item_values: Vec<f32> = (0..items * dim).map(|_| normal.sample(&mut *rng)).collect();
        let user_table = new_var(&varmap, USER_EMBEDDING_KEY, (users, dim), user_values, &device)?;
        let item_table = new_var(&varmap, ITEM_EMBEDDING_KEY, (items, dim), item_values, &device)?;

        debug!(users, items, dim, num_layers = config.num_layers, "LightGCN initialized");

        Ok(Self {
            user_embedding: Embedding::new(user_table, dim),
            item_embedding: Embedding::new(item_table, dim),
            adjacency: SparseAdjacency::from_csr(dataset.normalized_adjacency(), &device)?,
            train_matrix: dataset.interaction_matrix().clone(),
            num_layers: config.num_layers,
            training: true,
            varmap,
            device,
        })
    }

    pub fn user_count(&self) -> usize {
        self.train_matrix.shape().0
    }

    pub fn item_count(&self) -> usize {
        self.train_matrix.shape().1
    }

    pub fn num_layers(&self) -> usize {
        self.num_layers
    }

    pub fn is_training(&self) -> bool {
        self.training
    }

    /// mean(E_0, A E_0, ..., A^L E_0), split back into (users, items).
    fn propagate(&self) -> Result<(Tensor, Tensor)> {
        let table = Tensor::cat(&[self.user_embedding.embeddings(), self.item_embedding.embeddings()], 0)?;
        let mut sum = table.clone();
        let mut current = table;
        for _ in 0..self.num_layers {
            current = self.adjacency.matmul(&current)?;
            sum = sum.add(&current)?;
        }
        let mean = sum.affine(1.0 / (self.num_layers + 1) as f64, 0.0)?;
        let users = mean.narrow(0, 0, self.user_count())?;
        let items = mean.narrow(0, self.user_count(), self.item_count())?;
        Ok((users, items))
    }

    /// Propagated (user, item) embeddings.
    pub fn final_embeddings(&self) -> Result<(Array2<f32>, Array2<f32>)> {
        let (users, items) = self.propagate()?;
        Ok((to_array2(&users)?, to_array2(&items)?))
    }

    /// Cosine similarity of two items' final embeddings.
    pub fn similarity(&self, item_a: usize, item_b: usize) -> Result<f32> {
        for item in [item_a, item_b] {
            if item >= self.item_count() {
                return Err(RecommenderError::InvalidInput(format!(
                    "item index {} out of range",
                    item
                )));
            }
        }
        let (_, items) = self.final_embeddings()?;
        Ok(cosine_similarity(items.row(item_a), items.row(item_b)))
    }

    /// Mean BPR loss of a batch; every row must carry the same number of negatives.
    pub fn bpr_loss(&self, batch: &[PairwiseSample]) -> Result<Tensor> {
        let negatives = batch.first().map(|s| s.negatives.len()).unwrap_or(0);
        if batch.is_empty() || negatives == 0 {
            return Err(RecommenderError::InvalidInput(
                "training batch needs at least one row with negatives".into(),
            ));
        }

        let mut user_ids = Vec::with_capacity(batch.len());
        let mut positive_ids = Vec::with_capacity(batch.len());
        let mut negative_ids = Vec::with_capacity(batch.len() * negatives);
        for sample in batch {
            if sample.negatives.len() != negatives {
                return Err(RecommenderError::InvalidInput(
                    "all batch rows must have the same number of negatives".into(),
                ));
            }
            let out_of_range = sample.user >= self.user_count()
                || sample.positive >= self.item_count()
                || sample.negatives.iter().any(|&n| n >= self.item_count());
            if out_of_range {
                return Err(RecommenderError::InvalidInput(format!(
                    "sample for user {} references an unknown index",
                    sample.user
                )));
            }
            user_ids.push(sample.user as u32);
            positive_ids.push(sample.positive as u32);
            negative_ids.extend(sample.negatives.iter().map(|&n| n as u32));
        }

        let rows = batch.len();
        let dim = self.user_embedding.embeddings().dim(1)?;
        let (users, items) = self.propagate()?;
        let u = users.index_select(&Tensor::from_vec(user_ids, rows, &self.device)?, 0)?;
        let p = items.index_select(&Tensor::from_vec(positive_ids, rows, &self.device)?, 0)?;
        let n = items
            .index_select(&Tensor::from_vec(negative_ids, rows * negatives, &self.device)?, 0)?
            .reshape((rows, negatives, dim))?;

        let positive_scores = u.mul(&p)?.sum_keepdim(1)?;
        let negative_scores = n.broadcast_mul(&u.unsqueeze(1)?)?.sum(2)?;
        let diff = negative_scores.broadcast_sub(&positive_scores)?;
        Ok(softplus(&diff)?.mean_all()?)
    }

    /// One BPR optimization step over a batch; returns the batch loss.
    pub fn train_step(&self, batch: &[PairwiseSample], optimizer: &mut AdamW) -> Result<f32> {
        let loss = self.bpr_loss(batch)?;
        optimizer.backward_step(&loss)?;
        Ok(loss.to_scalar::<f32>()?)
    }
}

impl Model for LightGcn {
    /// (user index, item index) pairs
    type Input = [(usize, usize)];
    /// One score per pair
    type Output = Tensor;

    fn name(&self) -> &'static str {
        LIGHTGCN_MODEL_NAME
    }

    fn forward(&self, pairs: &[(usize, usize)]) -> Result<Tensor> {
        if let Some(&(u, i)) = pairs
            .iter()
            .find(|&&(u, i)| u >= self.user_count() || i >= self.item_count())
        {
            return Err(RecommenderError::InvalidInput(format!(
                "pair ({}, {}) out of range",
                u, i
            )));
        }
        let user_ids: Vec<u32> = pairs.iter().map(|&(u, _)| u as u32).collect();
        let item_ids: Vec<u32> = pairs.iter().map(|&(_, i)| i as u32).collect();

        let (users, items) = self.propagate()?;
        let u = users.index_select(&Tensor::from_vec(user_ids, pairs.len(), &self.device)?, 0)?;
        let i = items.index_select(&Tensor::from_vec(item_ids, pairs.len(), &self.device)?, 0)?;
        Ok(u.mul(&i)?.sum(1)?)
    }

    fn varmap(&self) -> &VarMap {
        &self.varmap
    }

    fn set_training(&mut self, training: bool) {
        self.training = training;
    }

    fn top_k(&self, k: usize) -> Result<Vec<Vec<usize>>> {
        let (users, items) = self.propagate()?;
        let mut scores = to_array2(&users.matmul(&items.t()?)?)?;
        for (user, mut row) in scores.outer_iter_mut().enumerate() {
            for &item in self.train_matrix.row_indices(user) {
                row[item] = MASKED_SCORE;
            }
        }
        Ok(top_k_rows(scores.view(), k))
    }
}
