use tiny_gpt::{
    generate_from_checkpoint, sample_text, train, CpuGraph, Dataset, GptError, LanguageModel,
    ModelConfig, SimpleTokenizer, Tokenizer, TrainConfig,
};

use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fs;
use std::path::PathBuf;

const OUTPUT_PATH: &str = "output.txt";

/// Train a character-level GPT on a text file, or sample from a trained one.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input training file
    #[arg(short = 'f', long = "file")]
    file: PathBuf,
    /// Iterations for learning
    #[arg(short = 'i', long = "max-iters", alias = "max_iters", default_value_t = 5000)]
    max_iters: usize,
    /// Skip training and write this many characters, sampled from the saved
    /// model, to output.txt
    #[arg(short = 'g', long = "generate")]
    generate: Option<usize>,
}

fn main() -> Result<(), GptError> {
    let cli = Cli::parse();
    println!("Defaulting device to cpu");

    let text = fs::read_to_string(&cli.file)?;
    let tokenizer = SimpleTokenizer::new(&text);
    println!("Vocabulary: {} unique characters", tokenizer.vocab_size());

    let model_config = ModelConfig::with_vocab_size(tokenizer.vocab_size());
    model_config.validate()?;
    let train_config = TrainConfig {
        max_iters: cli.max_iters,
        ..TrainConfig::default()
    };

    match cli.generate {
        Some(count) => run_generation(&tokenizer, &model_config, &train_config, count),
        None => run_training(&text, &tokenizer, &model_config, &train_config),
    }
}

fn run_generation(
    tokenizer: &SimpleTokenizer,
    model_config: &ModelConfig,
    train_config: &TrainConfig,
    count: usize,
) -> Result<(), GptError> {
    let mut rng = StdRng::from_entropy();
    let text = generate_from_checkpoint(
        &mut rng,
        tokenizer,
        model_config,
        &train_config.checkpoint_path,
        count,
    )?;
    fs::write(OUTPUT_PATH, text)?;
    println!("Wrote {count} characters to {OUTPUT_PATH}");
    Ok(())
}

fn run_training(
    text: &str,
    tokenizer: &SimpleTokenizer,
    model_config: &ModelConfig,
    train_config: &TrainConfig,
) -> Result<(), GptError> {
    train_config.validate()?;
    let dataset = Dataset::split(tokenizer.tokenize(text)?, train_config.train_fraction);
    println!(
        "Dataset: {} training tokens, {} held-out tokens",
        dataset.train.len(),
        dataset.val.len()
    );

    let mut rng = StdRng::seed_from_u64(train_config.seed);
    let mut model = LanguageModel::new(&mut rng, CpuGraph::new(), model_config)?;
    println!("Model initialized with {} parameters.", model.num_params()?);

    train(&mut model, &mut rng, &dataset, train_config)?;
    println!(
        "{}",
        sample_text(&mut model, &mut rng, tokenizer, train_config.sample_len)?
    );
    Ok(())
}
