use super::{Model, ParameterSet};
use crate::error::{RecommenderError, Result};
use ndarray::{ArrayD, IxDyn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use tracing::info;

/// Bumped whenever the on-disk layout or tensor naming changes.
pub const CHECKPOINT_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TensorData {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

/// Bincode-encoded parameter snapshot of one model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub format_version: u32,
    pub model: String,
    pub tensors: BTreeMap<String, TensorData>,
}

impl Checkpoint {
    pub fn from_model<M: Model + ?Sized>(model: &M) -> Result<Self> {
        let tensors = model
            .parameters()?
            .into_iter()
            .map(|(name, tensor)| {
                let shape = tensor.shape().to_vec();
                let data = tensor.iter().copied().collect();
                (name, TensorData { shape, data })
            })
            .collect();
        Ok(Self {
            format_version: CHECKPOINT_FORMAT_VERSION,
            model: model.name().to_string(),
            tensors,
        })
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let writer = BufWriter::new(File::create(path)?);
        bincode::serialize_into(writer, self)?;
        info!(path = %path.display(), model = %self.model, tensors = self.tensors.len(), "Checkpoint saved");
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(RecommenderError::MissingCheckpoint(path.display().to_string()));
        }
        let reader = BufReader::new(File::open(path)?);
        let checkpoint: Checkpoint = bincode::deserialize_from(reader)?;
        if checkpoint.format_version != CHECKPOINT_FORMAT_VERSION {
            return Err(RecommenderError::CheckpointMismatch(format!(
                "{}: format version {} (expected {})",
                path.display(),
                checkpoint.format_version,
                CHECKPOINT_FORMAT_VERSION
            )));
        }
        Ok(checkpoint)
    }

    /// Convert to tensors after checking the model name.
    pub fn into_parameters(self, expected_model: &str) -> Result<ParameterSet> {
        if self.model != expected_model {
            return Err(RecommenderError::CheckpointMismatch(format!(
                "checkpoint holds {} parameters, expected {}",
                self.model, expected_model
            )));
        }
        self.tensors
            .into_iter()
            .map(|(name, tensor)| {
                let array = ArrayD::from_shape_vec(IxDyn(&tensor.shape), tensor.data).map_err(|e| {
                    RecommenderError::CheckpointMismatch(format!("tensor {}: {}", name, e))
                })?;
                Ok((name, array))
            })
            .collect()
    }

    /// Load the file at `path` into `model`.
    pub fn restore<M: Model + ?Sized, P: AsRef<Path>>(model: &mut M, path: P) -> Result<()> {
        let parameters = Self::load(path.as_ref())?.into_parameters(model.name())?;
        model.load_parameters(parameters)?;
        info!(path = %path.as_ref().display(), model = model.name(), "Checkpoint restored");
        Ok(())
    }
}

/// Strict key and shape comparison between the model's current tensors and
/// an incoming parameter set.
pub fn check_parameter_shapes(expected: &ParameterSet, incoming: &ParameterSet) -> Result<()> {
    for (name, tensor) in expected {
        let Some(other) = incoming.get(name) else {
            return Err(RecommenderError::CheckpointMismatch(format!(
                "missing tensor {}",
                name
            )));
        };
        if other.shape() != tensor.shape() {
            return Err(RecommenderError::CheckpointMismatch(format!(
                "tensor {} has shape {:?}, model expects {:?}",
                name,
                other.shape(),
                tensor.shape()
            )));
        }
    }
    if let Some(name) = incoming.keys().find(|k| !expected.contains_key(*k)) {
        return Err(RecommenderError::CheckpointMismatch(format!(
            "unexpected tensor {}",
            name
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn params(rows: usize) -> ParameterSet {
        let mut set = ParameterSet::new();
        set.insert(
            "w".to_string(),
            Array2::<f32>::from_elem((rows, 2), 0.5).into_dyn(),
        );
        set
    }

    #[test]
    fn test_shape_check() {
        assert!(check_parameter_shapes(&params(3), &params(3)).is_ok());
        assert!(matches!(
            check_parameter_shapes(&params(3), &params(4)),
            Err(RecommenderError::CheckpointMismatch(_))
        ));

        let mut extra = params(3);
        extra.insert("b".into(), Array2::<f32>::zeros((1, 1)).into_dyn());
        assert!(check_parameter_shapes(&params(3), &extra).is_err());
        assert!(check_parameter_shapes(&extra, &params(3)).is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Checkpoint::load(dir.path().join("nope.bin")).unwrap_err();
        assert!(matches!(err, RecommenderError::MissingCheckpoint(_)));
    }

    #[test]
    fn test_save_load_and_name_check() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("model.bin");
        let mut tensors = BTreeMap::new();
        tensors.insert(
            "w".to_string(),
            TensorData {
                shape: vec![2, 2],
                data: vec![1.0, 2.0, 3.0, 4.0],
            },
        );
        let checkpoint = Checkpoint {
            format_version: CHECKPOINT_FORMAT_VERSION,
            model: "LightGCN".into(),
            tensors,
        };
        checkpoint.save(&path).unwrap();

        let loaded = Checkpoint::load(&path).unwrap();
        assert_eq!(loaded, checkpoint);
        assert!(loaded.clone().into_parameters("MultiVAE").is_err());

        let params = loaded.into_parameters("LightGCN").unwrap();
        assert_eq!(params["w"].shape(), &[2, 2]);
        assert_eq!(params["w"][&[1, 0][..]], 3.0);
    }

    #[test]
    fn test_rejects_other_format_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("old.bin");
        Checkpoint {
            format_version: CHECKPOINT_FORMAT_VERSION + 1,
            model: "LightGCN".into(),
            tensors: BTreeMap::new(),
        }
        .save(&path)
        .unwrap();

        assert!(matches!(
            Checkpoint::load(&path),
            Err(RecommenderError::CheckpointMismatch(_))
        ));
    }
}
