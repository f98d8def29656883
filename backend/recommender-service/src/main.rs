//! Recommender Service - Main entry point
//!
//! # Commands
//! - `train <lightgcn|multivae|all>`: fit models on the configured tables and
//!   write checkpoints to `MODEL_DIR`
//! - `query <handle>`: load both checkpoints, then answer one JSON
//!   `FilterQuery` per stdin line with a JSON `QueryResponse`

use anyhow::{bail, Context, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;
use recommender_service::{
    Checkpoint, Config, Corpus, FilterQuery, LightGcn, LightGcnTrainer, MultiVae, MultiVaeTrainer,
    RecommendationEngine, SolvedAcClient,
};
use std::env;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, PartialEq)]
enum Command {
    Train(TrainTarget),
    Query { handle: String },
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum TrainTarget {
    LightGcn,
    MultiVae,
    All,
}

impl Command {
    fn from_args() -> Result<Self> {
        let args: Vec<String> = env::args().skip(1).collect();
        match args.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
            ["train"] | ["train", "all"] => Ok(Command::Train(TrainTarget::All)),
            ["train", "lightgcn"] => Ok(Command::Train(TrainTarget::LightGcn)),
            ["train", "multivae"] => Ok(Command::Train(TrainTarget::MultiVae)),
            ["query", handle] => Ok(Command::Query {
                handle: handle.to_string(),
            }),
            _ => bail!("usage: recommender-service train <lightgcn|multivae|all> | query <handle>"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let command = Command::from_args()?;
    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        anyhow::anyhow!("Configuration error: {}", e)
    })?;

    info!(?command, data_dir = %config.service.data_dir.display(), "Starting recommender-service");

    match command {
        Command::Train(target) => train(&config, target),
        Command::Query { handle } => serve_queries(&config, &handle).await,
    }
}

fn train(config: &Config, target: TrainTarget) -> Result<()> {
    let corpus = Corpus::load(&config.service).context("failed to load training data")?;
    let mut rng = StdRng::seed_from_u64(config.service.seed);

    // Both models are always initialized in the same order so that a
    // single-model run draws the same initial weights as `all`.
    let mut lightgcn = LightGcn::new(&corpus.dataset, &config.lightgcn, &mut rng)?;
    let mut multivae = MultiVae::new(&corpus.dataset, &config.multivae, &mut rng)?;

    if matches!(target, TrainTarget::LightGcn | TrainTarget::All) {
        let report = LightGcnTrainer::new(&corpus.dataset, &config.lightgcn).train(&mut lightgcn, &mut rng)?;
        Checkpoint::from_model(&lightgcn)?.save(config.service.lightgcn_checkpoint())?;
        info!(
            final_loss = report.final_loss(),
            validations = report.validation_recalls.len(),
            "LightGCN trained"
        );
    }

    if matches!(target, TrainTarget::MultiVae | TrainTarget::All) {
        let report = MultiVaeTrainer::new(&corpus.dataset, &config.multivae).train(&mut multivae, &mut rng)?;
        Checkpoint::from_model(&multivae)?.save(config.service.multivae_checkpoint())?;
        info!(
            final_loss = report.final_loss(),
            validations = report.validation_recalls.len(),
            "MultiVAE trained"
        );
    }

    Ok(())
}

async fn serve_queries(config: &Config, handle: &str) -> Result<()> {
    let live = Arc::new(SolvedAcClient::new(&config.service.solved_ac_api_url));
    let engine = RecommendationEngine::load(config, live).context("failed to load recommendation engine")?;

    let stdin = io::stdin();
    let mut stdout = io::stdout().lock();
    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let query: FilterQuery = match serde_json::from_str(&line) {
            Ok(query) => query,
            Err(e) => {
                warn!(error = %e, "Ignoring malformed query");
                writeln!(stdout, "{}", serde_json::json!({ "error": e.to_string() }))?;
                continue;
            }
        };

        match engine.query(handle, &query).await {
            Ok(response) => writeln!(stdout, "{}", serde_json::to_string(&response)?)?,
            Err(e) if e.is_caller_error() => {
                warn!(error = %e, "Query rejected");
                writeln!(stdout, "{}", serde_json::json!({ "error": e.to_string() }))?;
            }
            Err(e) => return Err(e.into()),
        }
        stdout.flush()?;
    }

    Ok(())
}
