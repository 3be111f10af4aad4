//! Text sampling from a trained model.

use crate::checkpoint;
use crate::config::ModelConfig;
use crate::gpt::{GptResult, LanguageModel};
use crate::graph::{CpuGraph, Graph};
use crate::tensor::{Tensor, TensorOps};
use crate::tokenizer::Tokenizer;
use rand::Rng;
use std::path::Path;

/// Id every sample starts from: the smallest symbol of the vocabulary. It is
/// not part of the returned text.
pub const START_TOKEN: usize = 0;

/// Samples `count` symbols from `model`, starting from [`START_TOKEN`].
pub fn sample_text<G: Graph, R: Rng, T: Tokenizer>(
    model: &mut LanguageModel<G>,
    rng: &mut R,
    tokenizer: &T,
    count: usize,
) -> GptResult<String> {
    let seed = Tensor::raw(&[1, 1], vec![START_TOKEN])?;
    let tokens = model.generate(rng, &seed, count)?;
    Ok(tokenizer.untokenize(&tokens.blob()[1..])?)
}

/// Builds a model from `config`, loads the checkpoint at `path` into it and
/// samples `count` symbols.
pub fn generate_from_checkpoint<R: Rng, T: Tokenizer>(
    rng: &mut R,
    tokenizer: &T,
    config: &ModelConfig,
    path: &Path,
    count: usize,
) -> GptResult<String> {
    let snapshot = checkpoint::load(path)?;
    let mut model = LanguageModel::new(rng, CpuGraph::new(), config)?;
    model.load_snapshot(&snapshot)?;
    println!(
        "Loaded {} parameters from {}",
        model.num_params()?,
        path.display()
    );
    sample_text(&mut model, rng, tokenizer, count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::SimpleTokenizer;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_sample_length() {
        let tokenizer = SimpleTokenizer::new("hello");
        let config = ModelConfig::tiny(tokenizer.vocab_size());
        let mut rng = StdRng::seed_from_u64(9);
        let mut model = LanguageModel::new(&mut rng, CpuGraph::new(), &config).unwrap();
        for count in [0, 3, 20] {
            let text = sample_text(&mut model, &mut rng, &tokenizer, count).unwrap();
            assert_eq!(text.chars().count(), count);
            assert!(text.chars().all(|c| "helo".contains(c)));
        }
    }

    #[test]
    fn test_missing_checkpoint_is_reported() {
        let tokenizer = SimpleTokenizer::new("ab");
        let config = ModelConfig::tiny(2);
        let mut rng = StdRng::seed_from_u64(0);
        let path = std::env::temp_dir().join("tiny-gpt-no-such-checkpoint");
        assert!(matches!(
            generate_from_checkpoint(&mut rng, &tokenizer, &config, &path, 5),
            Err(crate::gpt::GptError::Checkpoint(
                checkpoint::CheckpointError::NotFound(_)
            ))
        ));
    }
}
