pub mod dataset;
pub mod encoder;
pub mod engine;
pub mod filter;
pub mod lightgcn;
pub mod multivae;
pub mod nn;
pub mod sampler;
pub mod source;

pub use dataset::Dataset;
pub use encoder::InteractionEncoder;
pub use engine::{Corpus, FilterQuery, QueryResponse, QueryType, RecommendationEngine};
pub use filter::ProblemFilter;
pub use lightgcn::{LightGcn, LightGcnTrainer};
pub use multivae::{MultiVae, MultiVaeTrainer};
pub use nn::{Checkpoint, Model};
pub use sampler::NegativeSampler;
pub use source::{FallbackSource, SnapshotStore, SolvedAcClient, SolvedProblemSource};
