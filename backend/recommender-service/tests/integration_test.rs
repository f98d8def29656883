use async_trait::async_trait;
use mockall::mock;
use rand::rngs::StdRng;
use rand::SeedableRng;
use recommender_service::config::{LightGcnConfig, MultiVaeConfig, ServiceConfig};
use recommender_service::models::SolvedProblem;
use recommender_service::services::SolvedProblemSource;
use recommender_service::{
    Checkpoint, Config, Corpus, FilterQuery, LightGcn, LightGcnTrainer, Model, MultiVae, MultiVaeTrainer,
    RecommendationEngine, RecommenderError,
};
use std::fs;
use std::path::Path;
use std::sync::Arc;

mock! {
    Source {}

    #[async_trait]
    impl SolvedProblemSource for Source {
        async fn top_solved(&self, handle: &str) -> recommender_service::Result<Vec<SolvedProblem>>;
    }
}

const PROBLEMS: [(i64, &str, &str, u32); 8] = [
    (1000, "A+B", "['math', 'implementation']", 1),
    (1003, "Fibonacci", "['dp']", 8),
    (1149, "RGB Street", "['dp']", 11),
    (1260, "DFS and BFS", "['graphs', 'graph_traversal']", 9),
    (1753, "Shortest Path", "['graphs', 'dijkstra']", 12),
    (1912, "Max Subarray", "['dp']", 7),
    (2178, "Maze", "['graphs', 'bfs']", 10),
    (9999, "Unrated One", "[]", 0),
];

fn write_inputs(dir: &Path) {
    let mut solved = String::from(",handle,problemId\n");
    let users: [(&str, &[i64]); 6] = [
        ("alice", &[1000, 1003, 1149, 1912]),
        ("bob", &[1260, 1753, 2178, 1000]),
        ("carol", &[1003, 1149, 1912, 9999]),
        ("dave", &[1260, 2178, 1753, 9999]),
        ("erin", &[1000, 1003, 1260, 2178]),
        ("frank", &[1149, 1912, 1753, 1000]),
    ];
    let mut row = 0;
    for (handle, items) in users {
        for item in items {
            solved.push_str(&format!("{},{},{}\n", row, handle, item));
            row += 1;
        }
    }
    // duplicate row is dropped at load time
    solved.push_str(&format!("{},alice,1000\n", row));
    fs::write(dir.join("solved_info.csv"), solved).unwrap();

    let mut problems = String::from("problemId,titleKo,tags,level,acceptedUserCount\n");
    for (id, title, tags, level) in PROBLEMS {
        problems.push_str(&format!("{},{},\"{}\",{},100\n", id, title, tags, level));
    }
    fs::write(dir.join("problem_info.csv"), problems).unwrap();

    let snapshots = dir.join("top_100_for_demo");
    fs::create_dir_all(&snapshots).unwrap();
    fs::write(
        snapshots.join("top_100_dave.json"),
        r#"{"items": [{"problemId": 1260, "level": 9}, {"problemId": 2178, "level": 10}]}"#,
    )
    .unwrap();
}

fn tiny_config(dir: &Path) -> Config {
    Config {
        service: ServiceConfig {
            data_dir: dir.to_path_buf(),
            model_dir: dir.join("saved"),
            page_size: 3,
            ..ServiceConfig::default()
        },
        lightgcn: LightGcnConfig {
            embedding_dim: 8,
            learning_rate: 0.01,
            batch_size: 32,
            epochs: 3,
            samples_per_user: 8,
            ..LightGcnConfig::default()
        },
        multivae: MultiVaeConfig {
            hidden_dims: vec![16, 8],
            learning_rate: 0.005,
            batch_size: 4,
            epochs: 5,
            ..MultiVaeConfig::default()
        },
    }
}

fn train_and_save(config: &Config) {
    let corpus = Corpus::load(&config.service).unwrap();
    let mut rng = StdRng::seed_from_u64(config.service.seed);

    let mut lightgcn = LightGcn::new(&corpus.dataset, &config.lightgcn, &mut rng).unwrap();
    let report = LightGcnTrainer::new(&corpus.dataset, &config.lightgcn)
        .train(&mut lightgcn, &mut rng)
        .unwrap();
    assert_eq!(report.epoch_losses.len(), 3);
    Checkpoint::from_model(&lightgcn).unwrap().save(config.service.lightgcn_checkpoint()).unwrap();

    let mut multivae = MultiVae::new(&corpus.dataset, &config.multivae, &mut rng).unwrap();
    let report = MultiVaeTrainer::new(&corpus.dataset, &config.multivae)
        .train(&mut multivae, &mut rng)
        .unwrap();
    assert_eq!(report.epoch_losses.len(), 5);
    Checkpoint::from_model(&multivae).unwrap().save(config.service.multivae_checkpoint()).unwrap();
}

fn live_source() -> MockSource {
    let mut live = MockSource::new();
    live.expect_top_solved().returning(|handle| match handle {
        "alice" => Ok(vec![SolvedProblem::new(1000), SolvedProblem::new(1003)]),
        "bob" => Ok(vec![SolvedProblem::new(1260), SolvedProblem::new(1753), SolvedProblem::new(1000)]),
        _ => Err(RecommenderError::ExternalFetch("rate limited".into())),
    });
    live
}

#[tokio::test]
async fn test_train_save_load_and_query() {
    let dir = tempfile::tempdir().unwrap();
    write_inputs(dir.path());
    let config = tiny_config(dir.path());
    train_and_save(&config);

    let engine = RecommendationEngine::load(&config, Arc::new(live_source())).unwrap();

    // recommend: solved problems never come back, pages are page_size long
    let ranked = engine.recommend("alice").await.unwrap();
    assert_eq!(ranked.len(), PROBLEMS.len() - 2);
    assert!(ranked.iter().all(|r| ![1000, 1003].contains(&r.problem_id())));

    let page0 = engine.query("alice", &FilterQuery::recommend()).await.unwrap();
    let page1 = engine
        .query("alice", &FilterQuery::recommend().with_page(1))
        .await
        .unwrap();
    let joined: Vec<i64> = page0.rows.iter().chain(&page1.rows).map(|r| r.problem_id).collect();
    let expected: Vec<i64> = ranked.iter().take(6).map(|r| r.problem_id()).collect();
    assert_eq!(joined, expected);
    assert_eq!(page0.keywords, vec!["none"]);

    // similar: query problem first, tag filter applied
    let similar = engine.query("alice", &FilterQuery::similar(1753).with_tags("graphs")).await.unwrap();
    assert_eq!(similar.rows[0].problem_id, 1753);
    assert!(similar.rows.iter().all(|r| r.tags.iter().any(|t| t.contains("graphs"))));
    assert_eq!(similar.keywords, vec!["graphs_recommended", "problem_1753"]);
    assert!(similar.render().starts_with("ID: 1753, Title: Shortest Path, Tags: graphs, dijkstra, Difficulty: Gold 4"));

    // difference against a user whose live fetch fails falls back to the snapshot
    let diff = engine.query("alice", &FilterQuery::difference("dave")).await.unwrap();
    let mut got: Vec<i64> = diff.rows.iter().map(|r| r.problem_id).collect();
    got.sort();
    assert_eq!(got, vec![1260, 2178]);

    // unknown problem id is a caller error, not a crash
    let err = engine.query("alice", &FilterQuery::similar(31337)).await.unwrap_err();
    assert!(err.is_caller_error());
}

#[tokio::test]
async fn test_checkpoints_restore_identical_parameters() {
    let dir = tempfile::tempdir().unwrap();
    write_inputs(dir.path());
    let config = tiny_config(dir.path());
    train_and_save(&config);

    let corpus = Corpus::load(&config.service).unwrap();
    let mut rng = StdRng::seed_from_u64(99);
    let mut restored = MultiVae::new(&corpus.dataset, &config.multivae, &mut rng).unwrap();
    Checkpoint::restore(&mut restored, config.service.multivae_checkpoint()).unwrap();

    let saved = Checkpoint::load(config.service.multivae_checkpoint()).unwrap();
    assert_eq!(Checkpoint::from_model(&restored).unwrap(), saved);

    // a checkpoint for the other model is rejected
    let mut lightgcn = LightGcn::new(&corpus.dataset, &config.lightgcn, &mut rng).unwrap();
    let err = Checkpoint::restore(&mut lightgcn, config.service.multivae_checkpoint()).unwrap_err();
    assert!(matches!(err, RecommenderError::CheckpointMismatch(_)));

    // a differently sized model is rejected rather than truncated
    let wider = MultiVaeConfig {
        hidden_dims: vec![32, 8],
        ..config.multivae.clone()
    };
    let mut mismatched = MultiVae::new(&corpus.dataset, &wider, &mut rng).unwrap();
    let err = Checkpoint::restore(&mut mismatched, config.service.multivae_checkpoint()).unwrap_err();
    assert!(matches!(err, RecommenderError::CheckpointMismatch(_)));
    assert_eq!(mismatched.name(), "MultiVAE");
}

#[tokio::test]
async fn test_missing_checkpoint_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    write_inputs(dir.path());
    let config = tiny_config(dir.path());

    let err = RecommendationEngine::load(&config, Arc::new(MockSource::new()))
        .err()
        .unwrap();
    assert!(matches!(err, RecommenderError::MissingCheckpoint(_)));
    assert!(err.to_string().contains("Train the model first"));
}
