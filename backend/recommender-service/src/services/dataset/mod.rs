/// Interaction Dataset
///
/// Holds encoded train interactions (and an optional held-out split) and
/// derives the sparse user-item matrix plus the symmetrically normalized
/// bipartite adjacency used for graph propagation.
///
/// # Derived matrices
/// - **interaction matrix**: users × items, 1.0 where a user solved a problem
/// - **normalized adjacency**: `D^-1/2 A D^-1/2` over the (users + items)
///   square block matrix `[[0, R], [R^T, 0]]`; zero-degree nodes use degree 1
pub mod loader;
pub mod sparse;
pub mod splitter;

pub use loader::{load_interactions, load_problem_metadata};
pub use sparse::CsrMatrix;
pub use splitter::leave_n_out_split;

use crate::error::{RecommenderError, Result};
use crate::models::EncodedInteraction;
use once_cell::sync::OnceCell;
use std::collections::HashSet;
use tracing::info;

#[derive(Debug)]
pub struct Dataset {
    train: Vec<EncodedInteraction>,
    test: Option<Vec<EncodedInteraction>>,
    user_count: usize,
    item_count: usize,
    interaction_matrix: OnceCell<CsrMatrix>,
    normalized_adjacency: OnceCell<CsrMatrix>,
}

impl Dataset {
    /// Fails with an integrity error unless train user and item indices each
    /// form the dense range `0..count`.
    pub fn new(
        train: Vec<EncodedInteraction>,
        test: Option<Vec<EncodedInteraction>>,
    ) -> Result<Self> {
        let user_count = check_dense_range("user", train.iter().map(|r| r.user))?;
        let item_count = check_dense_range("item", train.iter().map(|r| r.item))?;

        if let Some(test) = &test {
            if let Some(row) = test
                .iter()
                .find(|r| r.user >= user_count || r.item >= item_count)
            {
                return Err(RecommenderError::Integrity(format!(
                    "held-out interaction ({}, {}) outside the train index range",
                    row.user, row.item
                )));
            }
        }

        info!(
            users = user_count,
            items = item_count,
            interactions = train.len(),
            held_out = test.as_ref().map(|t| t.len()).unwrap_or(0),
            "Dataset constructed"
        );

        Ok(Self {
            train,
            test,
            user_count,
            item_count,
            interaction_matrix: OnceCell::new(),
            normalized_adjacency: OnceCell::new(),
        })
    }

    pub fn user_count(&self) -> usize {
        self.user_count
    }

    pub fn item_count(&self) -> usize {
        self.item_count
    }

    pub fn interaction_count(&self) -> usize {
        self.train.len()
    }

    pub fn density(&self) -> f64 {
        self.interaction_count() as f64 / (self.user_count * self.item_count) as f64
    }

    pub fn train_interactions(&self) -> &[EncodedInteraction] {
        &self.train
    }

    pub fn test_interactions(&self) -> Option<&[EncodedInteraction]> {
        self.test.as_deref()
    }

    pub fn interaction_matrix(&self) -> &CsrMatrix {
        self.interaction_matrix.get_or_init(|| {
            let triplets: Vec<(usize, usize, f32)> =
                self.train.iter().map(|r| (r.user, r.item, 1.0)).collect();
            CsrMatrix::from_triplets(self.user_count, self.item_count, &triplets)
        })
    }

    pub fn normalized_adjacency(&self) -> &CsrMatrix {
        self.normalized_adjacency.get_or_init(|| {
            let r = self.interaction_matrix();
            let n = self.user_count + self.item_count;

            let mut triplets = Vec::with_capacity(r.nnz() * 2);
            for (u, i, v) in r.iter() {
                triplets.push((u, self.user_count + i, v));
                triplets.push((self.user_count + i, u, v));
            }
            let extended = CsrMatrix::from_triplets(n, n, &triplets);

            let inv_sqrt_degree: Vec<f32> = extended
                .row_sums()
                .iter()
                .map(|&d| if d == 0.0 { 1.0 } else { d }.powf(-0.5))
                .collect();

            let normalized: Vec<(usize, usize, f32)> = extended
                .iter()
                .map(|(a, b, v)| (a, b, inv_sqrt_degree[a] * v * inv_sqrt_degree[b]))
                .collect();
            CsrMatrix::from_triplets(n, n, &normalized)
        })
    }

    /// Items each user interacted with in the train split.
    pub fn train_items_by_user(&self) -> Vec<&[usize]> {
        let matrix = self.interaction_matrix();
        (0..self.user_count).map(|u| matrix.row_indices(u)).collect()
    }

    /// Held-out items per user index (empty lists for users without any),
    /// or `None` when no held-out split exists.
    pub fn held_out_by_user(&self) -> Option<Vec<Vec<usize>>> {
        let test = self.test.as_ref()?;
        let mut truth = vec![Vec::new(); self.user_count];
        for row in test {
            truth[row.user].push(row.item);
        }
        Some(truth)
    }
}

fn check_dense_range(kind: &str, values: impl Iterator<Item = usize>) -> Result<usize> {
    let unique: HashSet<usize> = values.collect();
    if unique.is_empty() {
        return Err(RecommenderError::Integrity(format!(
            "no {} indices in train interactions",
            kind
        )));
    }
    let min = unique.iter().copied().min().unwrap_or(0);
    let max = unique.iter().copied().max().unwrap_or(0);
    if min != 0 || max != unique.len() - 1 {
        return Err(RecommenderError::Integrity(format!(
            "{} indices must cover 0..{} without gaps (min={}, max={}, unique={})",
            kind,
            unique.len(),
            min,
            max,
            unique.len()
        )));
    }
    Ok(unique.len())
}
