pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

pub use config::Config;
pub use error::{RecommenderError, Result};
pub use services::{
    Checkpoint, Corpus, FilterQuery, LightGcn, LightGcnTrainer, Model, MultiVae, MultiVaeTrainer,
    QueryResponse, RecommendationEngine, SolvedAcClient,
};
