/// Shared building blocks for the two scoring models
///
/// # Architecture
/// - **Model**: common capability set (forward, named parameters, strict
///   parameter loading, train/eval switch, masked top-k) over a candle `VarMap`
/// - **tensor**: seeded variable creation, `Linear` layers, Adam, ndarray bridges
/// - **graph**: sparse normalized adjacency as index tensors
/// - **Checkpoint**: versioned, shape-checked parameter snapshot on disk
pub mod checkpoint;
pub mod graph;
pub mod tensor;

pub use checkpoint::{check_parameter_shapes, Checkpoint, TensorData, CHECKPOINT_FORMAT_VERSION};
pub use graph::SparseAdjacency;
pub use tensor::{adam, linear_layer, new_var, softplus, to_array2};

use crate::error::Result;
use candle_core::Tensor;
use candle_nn::VarMap;
use ndarray::{ArrayD, IxDyn};
use std::collections::{BTreeMap, HashMap};
use std::sync::{MutexGuard, PoisonError};

/// Named parameter tensors, keyed the same way in memory and on disk.
pub type ParameterSet = BTreeMap<String, ArrayD<f32>>;

/// Capability set shared by the graph-propagation and autoencoder models.
pub trait Model {
    type Input: ?Sized;
    type Output;

    /// Stable identifier written into checkpoints.
    fn name(&self) -> &'static str;

    fn forward(&self, input: &Self::Input) -> Result<Self::Output>;

    /// Every trainable variable, keyed by its checkpoint name.
    fn varmap(&self) -> &VarMap;

    /// Snapshot of every learned tensor.
    fn parameters(&self) -> Result<ParameterSet> {
        parameters_of(self.varmap())
    }

    /// Replace every learned tensor. Missing keys, unexpected keys and shape
    /// differences are errors; nothing is modified on failure.
    fn load_parameters(&mut self, parameters: ParameterSet) -> Result<()> {
        load_into(self.varmap(), parameters)
    }

    fn set_training(&mut self, training: bool);

    /// Up to `k` best unseen items per train user. Rows are shorter than `k`
    /// when the user has fewer unseen items.
    fn top_k(&self, k: usize) -> Result<Vec<Vec<usize>>>;
}

/// recall@k of the model's masked top-k against held-out items per user.
///
/// Runs in evaluation mode and switches the model back to training afterwards.
pub fn evaluate_recall<M: Model + ?Sized>(model: &mut M, truth: &[Vec<usize>], k: usize) -> Result<f64> {
    model.set_training(false);
    let top = model.top_k(k);
    model.set_training(true);
    Ok(crate::utils::recall(truth, &top?))
}

pub(crate) fn lock_vars(varmap: &VarMap) -> MutexGuard<'_, HashMap<String, candle_core::Var>> {
    varmap.data().lock().unwrap_or_else(PoisonError::into_inner)
}

fn parameters_of(varmap: &VarMap) -> Result<ParameterSet> {
    lock_vars(varmap)
        .iter()
        .map(|(name, var)| {
            let tensor = var.as_tensor();
            let values = tensor.flatten_all()?.to_vec1::<f32>()?;
            let array = ArrayD::from_shape_vec(IxDyn(tensor.dims()), values).map_err(|e| {
                crate::error::RecommenderError::CheckpointMismatch(format!("tensor {}: {}", name, e))
            })?;
            Ok((name.clone(), array))
        })
        .collect()
}

fn load_into(varmap: &VarMap, parameters: ParameterSet) -> Result<()> {
    check_parameter_shapes(&parameters_of(varmap)?, &parameters)?;
    let vars = lock_vars(varmap);
    for (name, array) in parameters {
        if let Some(var) = vars.get(&name) {
            let values: Vec<f32> = array.iter().copied().collect();
            let tensor = Tensor::from_vec(values, array.shape(), var.device())?;
            var.set(&tensor)?;
        }
    }
    Ok(())
}
