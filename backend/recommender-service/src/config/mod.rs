use serde::Deserialize;
use std::path::PathBuf;

use crate::error::Result;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub lightgcn: LightGcnConfig,
    pub multivae: MultiVaeConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Defaults to `{data_dir}/solved_info.csv`
    pub solved_info_path: Option<PathBuf>,
    /// Defaults to `{data_dir}/problem_info.csv`
    pub problem_info_path: Option<PathBuf>,
    /// Defaults to `{data_dir}/top_100_for_demo`
    pub snapshot_dir: Option<PathBuf>,
    #[serde(default = "default_model_dir")]
    pub model_dir: PathBuf,
    #[serde(default = "default_solved_ac_api_url")]
    pub solved_ac_api_url: String,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Per-user hold-out size for validation; 0 trains on everything.
    #[serde(default)]
    pub holdout_n: usize,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LightGcnConfig {
    #[serde(default = "default_embedding_dim")]
    pub embedding_dim: usize,
    #[serde(default = "default_init_std")]
    pub init_std: f32,
    /// Propagation hops averaged with the raw embedding table.
    #[serde(default = "default_num_layers")]
    pub num_layers: usize,
    #[serde(default = "default_lightgcn_lr")]
    pub learning_rate: f32,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_lightgcn_epochs")]
    pub epochs: usize,
    #[serde(default = "default_samples_per_user")]
    pub samples_per_user: usize,
    #[serde(default = "default_negatives_per_sample")]
    pub negatives_per_sample: usize,
    #[serde(default = "default_lightgcn_validate_every")]
    pub validate_every: usize,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MultiVaeConfig {
    /// Encoder widths after the input layer; the last one is split into mu / log_var.
    #[serde(default = "default_hidden_dims")]
    pub hidden_dims: Vec<usize>,
    #[serde(default = "default_dropout")]
    pub dropout: f32,
    #[serde(default = "default_kl_weight")]
    pub kl_weight: f32,
    #[serde(default = "default_multivae_lr")]
    pub learning_rate: f32,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_multivae_epochs")]
    pub epochs: usize,
    #[serde(default = "default_multivae_validate_every")]
    pub validate_every: usize,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_model_dir() -> PathBuf {
    PathBuf::from("saved")
}

fn default_solved_ac_api_url() -> String {
    "https://solved.ac/api".to_string()
}

fn default_page_size() -> usize {
    10
}

fn default_seed() -> u64 {
    42
}

fn default_embedding_dim() -> usize {
    128
}

fn default_init_std() -> f32 {
    0.1
}

fn default_num_layers() -> usize {
    1
}

fn default_lightgcn_lr() -> f32 {
    0.001
}

fn default_batch_size() -> usize {
    512
}

fn default_lightgcn_epochs() -> usize {
    10
}

fn default_samples_per_user() -> usize {
    100
}

fn default_negatives_per_sample() -> usize {
    1
}

fn default_lightgcn_validate_every() -> usize {
    1
}

fn default_top_k() -> usize {
    10
}

fn default_hidden_dims() -> Vec<usize> {
    vec![2000, 300]
}

fn default_dropout() -> f32 {
    0.5
}

fn default_kl_weight() -> f32 {
    0.05
}

fn default_multivae_lr() -> f32 {
    0.0005
}

fn default_multivae_epochs() -> usize {
    60
}

fn default_multivae_validate_every() -> usize {
    5
}

impl Default for LightGcnConfig {
    fn default() -> Self {
        Self {
            embedding_dim: default_embedding_dim(),
            init_std: default_init_std(),
            num_layers: default_num_layers(),
            learning_rate: default_lightgcn_lr(),
            batch_size: default_batch_size(),
            epochs: default_lightgcn_epochs(),
            samples_per_user: default_samples_per_user(),
            negatives_per_sample: default_negatives_per_sample(),
            validate_every: default_lightgcn_validate_every(),
            top_k: default_top_k(),
        }
    }
}

impl Default for MultiVaeConfig {
    fn default() -> Self {
        Self {
            hidden_dims: default_hidden_dims(),
            dropout: default_dropout(),
            kl_weight: default_kl_weight(),
            learning_rate: default_multivae_lr(),
            batch_size: default_batch_size(),
            epochs: default_multivae_epochs(),
            validate_every: default_multivae_validate_every(),
            top_k: default_top_k(),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            solved_info_path: None,
            problem_info_path: None,
            snapshot_dir: None,
            model_dir: default_model_dir(),
            solved_ac_api_url: default_solved_ac_api_url(),
            page_size: default_page_size(),
            holdout_n: 0,
            seed: default_seed(),
        }
    }
}

impl ServiceConfig {
    pub fn solved_info_path(&self) -> PathBuf {
        self.solved_info_path
            .clone()
            .unwrap_or_else(|| self.data_dir.join("solved_info.csv"))
    }

    pub fn problem_info_path(&self) -> PathBuf {
        self.problem_info_path
            .clone()
            .unwrap_or_else(|| self.data_dir.join("problem_info.csv"))
    }

    pub fn snapshot_dir(&self) -> PathBuf {
        self.snapshot_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("top_100_for_demo"))
    }

    pub fn lightgcn_checkpoint(&self) -> PathBuf {
        self.model_dir.join("LightGCN_model.bin")
    }

    pub fn multivae_checkpoint(&self) -> PathBuf {
        self.model_dir.join("MultiVAE_model.bin")
    }
}

impl Config {
    /// Load `.env` (if present) and read each section from the environment.
    ///
    /// Service keys are unprefixed (`DATA_DIR`, `PAGE_SIZE`, ...); model keys use
    /// `LIGHTGCN_` and `MULTIVAE_` prefixes. `MULTIVAE_HIDDEN_DIMS` is a comma
    /// separated list.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let service: ServiceConfig = envy::from_env()?;
        let lightgcn: LightGcnConfig = envy::prefixed("LIGHTGCN_").from_env()?;
        let multivae: MultiVaeConfig = envy::prefixed("MULTIVAE_").from_env()?;

        let config = Config {
            service,
            lightgcn,
            multivae,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        use crate::error::RecommenderError::Config as ConfigError;

        if self.service.page_size == 0 {
            return Err(ConfigError("PAGE_SIZE must be positive".into()));
        }
        if self.lightgcn.embedding_dim == 0 || self.lightgcn.batch_size == 0 {
            return Err(ConfigError(
                "LIGHTGCN_EMBEDDING_DIM and LIGHTGCN_BATCH_SIZE must be positive".into(),
            ));
        }
        if self.lightgcn.negatives_per_sample == 0 {
            return Err(ConfigError(
                "LIGHTGCN_NEGATIVES_PER_SAMPLE must be positive".into(),
            ));
        }
        if self.multivae.hidden_dims.is_empty() {
            return Err(ConfigError("MULTIVAE_HIDDEN_DIMS must not be empty".into()));
        }
        let latent = self.multivae.hidden_dims[self.multivae.hidden_dims.len() - 1];
        if latent < 2 || latent % 2 != 0 {
            return Err(ConfigError(format!(
                "last MULTIVAE_HIDDEN_DIMS entry must be even (mu / log_var halves), got {}",
                latent
            )));
        }
        if !(0.0..1.0).contains(&self.multivae.dropout) {
            return Err(ConfigError("MULTIVAE_DROPOUT must be in [0, 1)".into()));
        }
        if self.multivae.batch_size == 0 {
            return Err(ConfigError("MULTIVAE_BATCH_SIZE must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        Config::default()
    }

    #[test]
    fn test_default_hyperparameters() {
        let lightgcn = LightGcnConfig::default();
        assert_eq!(lightgcn.embedding_dim, 128);
        assert_eq!(lightgcn.num_layers, 1);
        assert_eq!(lightgcn.epochs, 10);
        assert_eq!(lightgcn.batch_size, 512);
        assert!((lightgcn.learning_rate - 0.001).abs() < f32::EPSILON);

        let multivae = MultiVaeConfig::default();
        assert_eq!(multivae.hidden_dims, vec![2000, 300]);
        assert_eq!(multivae.epochs, 60);
        assert_eq!(multivae.validate_every, 5);
        assert!((multivae.kl_weight - 0.05).abs() < f32::EPSILON);
    }

    #[test]
    fn test_derived_paths() {
        let config = base_config();
        assert_eq!(
            config.service.solved_info_path(),
            PathBuf::from("data/solved_info.csv")
        );
        assert_eq!(
            config.service.snapshot_dir(),
            PathBuf::from("data/top_100_for_demo")
        );
        assert_eq!(
            config.service.multivae_checkpoint(),
            PathBuf::from("saved/MultiVAE_model.bin")
        );
    }

    #[test]
    fn test_validate_rejects_odd_latent_width() {
        let mut config = base_config();
        config.multivae.hidden_dims = vec![64, 33];
        assert!(config.validate().is_err());

        config.multivae.hidden_dims = vec![64, 32];
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_page_size() {
        let mut config = base_config();
        config.service.page_size = 0;
        assert!(config.validate().is_err());
    }
}
