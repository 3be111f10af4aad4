//! # tiny-gpt
//!
//! `tiny-gpt` trains a small character-level Transformer decoder on a text
//! file and samples new text from it. Everything runs on the CPU; tensor
//! kernels are parallelized with `rayon`.
//!
//! ## Key Components:
//!
//! *   [`LanguageModel`]: token and position embeddings, a stack of residual
//!     [`gpt::Block`]s, a final layer norm and the projection to vocabulary
//!     logits. Provides the forward pass, a training step and sampling.
//! *   [`Tensor`]: a dense n-dimensional array used for all numerical data.
//! *   [`Graph`]: records the computations of a forward pass and runs
//!     reverse-mode differentiation over them. [`CpuGraph`] is the
//!     implementation.
//! *   [`Optimizer`]: parameter update rules; [`AdamW`] is the one used for
//!     training.
//! *   [`SimpleTokenizer`]: maps every distinct character of a corpus to an id.
//! *   [`mod@train`] and [`mod@generate`]: the training loop and the sampling driver.
//!
//! ## Example
//!
//! ```no_run
//! use tiny_gpt::{
//!     sample_text, train, CpuGraph, Dataset, GptError, LanguageModel, ModelConfig,
//!     SimpleTokenizer, Tokenizer, TrainConfig,
//! };
//! use rand::{rngs::StdRng, SeedableRng};
//!
//! # fn main() -> Result<(), GptError> {
//! let text = std::fs::read_to_string("input.txt")?;
//! let tokenizer = SimpleTokenizer::new(&text);
//! let model_config = ModelConfig::with_vocab_size(tokenizer.vocab_size());
//! let train_config = TrainConfig::default();
//!
//! let mut rng = StdRng::seed_from_u64(train_config.seed);
//! let mut model = LanguageModel::new(&mut rng, CpuGraph::new(), &model_config)?;
//! let dataset = Dataset::split(tokenizer.tokenize(&text)?, train_config.train_fraction);
//! train(&mut model, &mut rng, &dataset, &train_config)?;
//!
//! println!("{}", sample_text(&mut model, &mut rng, &tokenizer, 400)?);
//! # Ok(())
//! # }
//! ```

/// Parameter snapshots and their on-disk format.
pub mod checkpoint;
/// Model and training hyperparameters.
pub mod config;
/// Differentiable operations recorded by the computation graph.
pub mod funcs;
/// Sampling text from a trained model.
pub mod generate;
/// The Transformer decoder.
pub mod gpt;
/// The computation graph (`Graph`) and its CPU implementation.
pub mod graph;
/// Update rules for model parameters.
pub mod optimizer;
/// The multi-dimensional array (`Tensor`) and its basic operations.
pub mod tensor;
/// Conversion between text and token ids.
pub mod tokenizer;
/// Training loop.
pub mod train;
/// CSV log of evaluation results.
pub mod training_logger;

pub use checkpoint::{CheckpointError, Snapshot};
pub use config::{ConfigError, ModelConfig, TrainConfig};
pub use generate::{generate_from_checkpoint, sample_text, START_TOKEN};
pub use gpt::{GptError, GptResult, LanguageModel, Mode};
pub use graph::{CpuGraph, Graph, GraphError, TensorId};
pub use optimizer::{AdamW, Optimizer, OptimizerState};
pub use tensor::{GeneralTensor, Tensor, TensorError, TensorOps};
pub use tokenizer::{SimpleTokenizer, Tokenizer, TokenizerError};
pub use train::{estimate_loss, get_batch, train, Dataset, Evaluation};
pub use training_logger::TrainingLogger;
