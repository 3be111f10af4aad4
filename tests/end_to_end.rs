use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fs;
use std::path::{Path, PathBuf};
use tiny_gpt::{
    generate_from_checkpoint, train, ConfigError, CpuGraph, Dataset, GptError, LanguageModel,
    ModelConfig, SimpleTokenizer, Tokenizer, TrainConfig,
};

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("tiny-gpt-e2e-{name}-{}", std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    dir
}

fn abab_configs(dir: &Path) -> (SimpleTokenizer, ModelConfig, TrainConfig) {
    let tokenizer = SimpleTokenizer::new("abab");
    let model_config = ModelConfig {
        vocab_size: tokenizer.vocab_size(),
        n_embd: 8,
        n_head: 2,
        n_layer: 1,
        block_size: 2,
        dropout: 0.2,
    };
    let train_config = TrainConfig {
        batch_size: 1,
        max_iters: 20,
        eval_iters: 2,
        learning_rate: 1e-2,
        checkpoint_path: dir.join("models").join("model"),
        log_path: Some(dir.join("log.csv")),
        ..TrainConfig::default()
    };
    (tokenizer, model_config, train_config)
}

fn run_training(
    tokenizer: &SimpleTokenizer,
    model_config: &ModelConfig,
    train_config: &TrainConfig,
    text: &str,
) -> Result<Vec<tiny_gpt::Evaluation>, GptError> {
    let mut rng = StdRng::seed_from_u64(train_config.seed);
    let mut model = LanguageModel::new(&mut rng, CpuGraph::new(), model_config)?;
    let dataset = Dataset::split(tokenizer.tokenize(text)?, train_config.train_fraction);
    train(&mut model, &mut rng, &dataset, train_config)
}

#[test]
fn abab_train_then_generate() {
    let dir = scratch_dir("abab");
    let (tokenizer, model_config, train_config) = abab_configs(&dir);
    assert_eq!(tokenizer.vocab_size(), 2);

    let evaluations = run_training(&tokenizer, &model_config, &train_config, "abab").unwrap();
    assert!(train_config.checkpoint_path.is_file());
    assert_eq!(evaluations.len(), 10);
    assert_eq!(evaluations[0].step, 0);
    assert_eq!(evaluations[9].step, 18);
    for evaluation in &evaluations {
        assert!(evaluation.train_loss.is_finite() && evaluation.train_loss >= 0.0);
        // One held-out token cannot fill a window.
        assert_eq!(evaluation.val_loss, None);
    }
    let log = fs::read_to_string(dir.join("log.csv")).unwrap();
    assert_eq!(log.lines().count(), 11);

    let mut rng = StdRng::seed_from_u64(42);
    let text = generate_from_checkpoint(
        &mut rng,
        &tokenizer,
        &model_config,
        &train_config.checkpoint_path,
        10,
    )
    .unwrap();
    assert_eq!(text.chars().count(), 10);
    assert!(text.chars().all(|c| c == 'a' || c == 'b'));

    fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn same_seed_gives_identical_checkpoints() {
    let snapshots = ["first", "second"].map(|name| {
        let dir = scratch_dir(name);
        let (tokenizer, model_config, train_config) = abab_configs(&dir);
        let train_config = TrainConfig {
            log_path: None,
            ..train_config
        };
        run_training(&tokenizer, &model_config, &train_config, "abab").unwrap();
        let bytes = fs::read(&train_config.checkpoint_path).unwrap();
        fs::remove_dir_all(&dir).unwrap();
        bytes
    });
    assert_eq!(snapshots[0], snapshots[1]);
}

#[test]
fn corpus_shorter_than_a_window_is_rejected() {
    let dir = scratch_dir("short");
    let (_, model_config, train_config) = abab_configs(&dir);
    let tokenizer = SimpleTokenizer::new("ab");
    let result = run_training(&tokenizer, &model_config, &train_config, "ab");
    assert!(matches!(
        result,
        Err(GptError::Config(ConfigError::CorpusTooShort { len: 1, needed: 3 }))
    ));
    assert!(!train_config.checkpoint_path.exists());
}

#[test]
fn generating_needs_a_checkpoint() {
    let dir = scratch_dir("nothing");
    let (tokenizer, model_config, train_config) = abab_configs(&dir);
    let mut rng = StdRng::seed_from_u64(0);
    let result = generate_from_checkpoint(
        &mut rng,
        &tokenizer,
        &model_config,
        &train_config.checkpoint_path,
        10,
    );
    assert!(matches!(result, Err(GptError::Checkpoint(_))));
}
