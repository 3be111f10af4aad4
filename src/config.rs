//! Hyperparameters of the model and of the training run.
//!
//! Both objects are plain data: build one, call `validate`, then pass it by
//! reference to whatever needs it. Nothing mutates a configuration after
//! construction.

use std::path::PathBuf;
use thiserror::Error;

/// Invalid hyperparameters, or inputs the configured model cannot handle.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// A size that must be positive is zero.
    #[error("{0} must be greater than zero")]
    ZeroDimension(&'static str),
    /// Attention heads cannot split the embedding evenly.
    #[error("n_embd ({n_embd}) must be divisible by n_head ({n_head})")]
    HeadsDoNotDivide {
        /// Embedding width.
        n_embd: usize,
        /// Requested number of heads.
        n_head: usize,
    },
    /// Dropout outside `[0, 1)`.
    #[error("dropout must be in [0, 1), got {0}")]
    InvalidDropout(f32),
    /// The corpus has no characters.
    #[error("the corpus is empty, the vocabulary has no symbols")]
    EmptyVocabulary,
    /// The input holds more tokens than the position embedding covers.
    #[error("context of {time} tokens does not fit a block size of {block_size}")]
    ContextTooLong {
        /// Tokens in the input.
        time: usize,
        /// Longest supported context.
        block_size: usize,
    },
    /// An input with no tokens.
    #[error("context must hold at least one token")]
    EmptyContext,
    /// Not even one context/target window fits in the data.
    #[error("the training split holds {len} tokens, a window needs {needed}")]
    CorpusTooShort {
        /// Tokens available.
        len: usize,
        /// Tokens one window needs (`block_size + 1`).
        needed: usize,
    },
    /// Train fraction outside `(0, 1]`.
    #[error("train fraction must be in (0, 1], got {0}")]
    InvalidTrainFraction(f64),
    /// Learning rate that is not positive and finite.
    #[error("learning rate must be positive and finite, got {0}")]
    InvalidLearningRate(f32),
}

/// Shape of the Transformer.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelConfig {
    /// Number of distinct tokens; taken from the tokenizer.
    pub vocab_size: usize,
    /// Width of the residual stream.
    pub n_embd: usize,
    /// Attention heads per block; must divide `n_embd`.
    pub n_head: usize,
    /// Number of residual blocks.
    pub n_layer: usize,
    /// Longest context the model attends to.
    pub block_size: usize,
    /// Dropout probability used in training mode.
    pub dropout: f32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            vocab_size: 0,
            n_embd: 384,
            n_head: 3,
            n_layer: 3,
            block_size: 256,
            dropout: 0.2,
        }
    }
}

impl ModelConfig {
    /// Default shape for a vocabulary of `vocab_size` symbols.
    pub fn with_vocab_size(vocab_size: usize) -> Self {
        Self {
            vocab_size,
            ..Self::default()
        }
    }

    /// A model small enough to train in seconds, for tests and smoke runs.
    pub fn tiny(vocab_size: usize) -> Self {
        Self {
            vocab_size,
            n_embd: 16,
            n_head: 2,
            n_layer: 1,
            block_size: 8,
            dropout: 0.0,
        }
    }

    /// Width of each attention head.
    pub const fn head_size(&self) -> usize {
        self.n_embd / self.n_head
    }

    /// Checks every dimension and the dropout rate.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.vocab_size == 0 {
            return Err(ConfigError::EmptyVocabulary);
        }
        for (name, value) in [
            ("n_embd", self.n_embd),
            ("n_head", self.n_head),
            ("n_layer", self.n_layer),
            ("block_size", self.block_size),
        ] {
            if value == 0 {
                return Err(ConfigError::ZeroDimension(name));
            }
        }
        if self.n_embd % self.n_head != 0 {
            return Err(ConfigError::HeadsDoNotDivide {
                n_embd: self.n_embd,
                n_head: self.n_head,
            });
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(ConfigError::InvalidDropout(self.dropout));
        }
        Ok(())
    }

    /// Checks that a context of `time` tokens can be fed to the model.
    pub const fn check_context(&self, time: usize) -> Result<(), ConfigError> {
        if time == 0 {
            Err(ConfigError::EmptyContext)
        } else if time > self.block_size {
            Err(ConfigError::ContextTooLong {
                time,
                block_size: self.block_size,
            })
        } else {
            Ok(())
        }
    }
}

/// Settings of a training run.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainConfig {
    /// Context/target pairs per step.
    pub batch_size: usize,
    /// Number of optimization steps.
    pub max_iters: usize,
    /// Batches averaged per split when estimating the loss.
    pub eval_iters: usize,
    /// Fixed step size of the optimizer.
    pub learning_rate: f32,
    /// Decoupled weight decay of AdamW.
    pub weight_decay: f32,
    /// Seed of the random number generator driving the run.
    pub seed: u64,
    /// Where parameters are checkpointed.
    pub checkpoint_path: PathBuf,
    /// Leading share of the corpus used for training; the rest is held out.
    pub train_fraction: f64,
    /// Characters sampled once training ends.
    pub sample_len: usize,
    /// Optional CSV file receiving one row per evaluation.
    pub log_path: Option<PathBuf>,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            batch_size: 64,
            max_iters: 5000,
            eval_iters: 200,
            learning_rate: 3e-4,
            weight_decay: 0.01,
            seed: 1337,
            checkpoint_path: PathBuf::from("models/model"),
            train_fraction: 0.9,
            sample_len: 400,
            log_path: None,
        }
    }
}

impl TrainConfig {
    /// Steps between two evaluations.
    pub fn eval_interval(&self) -> usize {
        (self.max_iters / 10).max(1)
    }

    /// Rejects values the training loop cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::ZeroDimension("batch_size"));
        }
        if self.eval_iters == 0 {
            return Err(ConfigError::ZeroDimension("eval_iters"));
        }
        if !(self.train_fraction > 0.0 && self.train_fraction <= 1.0) {
            return Err(ConfigError::InvalidTrainFraction(self.train_fraction));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(ConfigError::InvalidLearningRate(self.learning_rate));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(ModelConfig::with_vocab_size(65).validate().is_ok());
        assert!(TrainConfig::default().validate().is_ok());
        assert_eq!(ModelConfig::with_vocab_size(65).head_size(), 128);
        assert_eq!(TrainConfig::default().eval_interval(), 500);
    }

    #[test]
    fn test_eval_interval_is_at_least_one() {
        let config = TrainConfig {
            max_iters: 5,
            ..TrainConfig::default()
        };
        assert_eq!(config.eval_interval(), 1);
    }

    #[test]
    fn test_invalid_model_configs() {
        let config = ModelConfig {
            n_embd: 10,
            n_head: 3,
            ..ModelConfig::tiny(4)
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::HeadsDoNotDivide {
                n_embd: 10,
                n_head: 3
            })
        );
        assert_eq!(
            ModelConfig::tiny(0).validate(),
            Err(ConfigError::EmptyVocabulary)
        );
        let config = ModelConfig {
            dropout: 1.0,
            ..ModelConfig::tiny(4)
        };
        assert_eq!(config.validate(), Err(ConfigError::InvalidDropout(1.0)));
    }

    #[test]
    fn test_check_context() {
        let config = ModelConfig::tiny(4);
        assert!(config.check_context(1).is_ok());
        assert!(config.check_context(8).is_ok());
        assert_eq!(config.check_context(0), Err(ConfigError::EmptyContext));
        assert_eq!(
            config.check_context(9),
            Err(ConfigError::ContextTooLong {
                time: 9,
                block_size: 8
            })
        );
    }
}
