//! The decoder-only Transformer.
//!
//! Parameters are allocated in the graph once, when the model is built.
//! Every forward pass resets the graph's activations and records a fresh
//! computation on top of the parameters, so the same model serves training
//! (with a backward pass and an optimizer step) and sampling.

mod attention;
mod block;
mod layers;

pub use attention::{Head, MultiHeadAttention};
pub use block::{Block, FeedForward};
pub use layers::{LayerNorm, Linear};

use crate::checkpoint::{CheckpointError, Snapshot};
use crate::config::{ConfigError, ModelConfig};
use crate::funcs::{softmax_row, Add, CrossEntropy, Embedding};
use crate::graph::{Graph, GraphError, TensorId};
use crate::optimizer::{Optimizer, OptimizerState};
use crate::tensor::{Tensor, TensorError, TensorOps};
use crate::tokenizer::TokenizerError;
use layers::GraphExt;
use rand::distributions::{WeightedError, WeightedIndex};
use rand::prelude::*;
use thiserror::Error;

/// Anything that can go wrong while building, training or sampling a model.
#[derive(Error, Debug)]
pub enum GptError {
    /// Recording or differentiating the forward pass failed.
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),
    /// A tensor operation outside the graph failed.
    #[error("Tensor error: {0}")]
    Tensor(#[from] TensorError),
    /// Invalid hyperparameters or inputs.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    /// Text could not be encoded or decoded.
    #[error("Tokenizer error: {0}")]
    Tokenizer(#[from] TokenizerError),
    /// Saving or loading parameters failed.
    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),
    /// Next-token probabilities were not a valid distribution.
    #[error("Sampling error: {0}")]
    Sampling(#[from] WeightedError),
    /// Reading the corpus or writing output failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result of model-level operations.
pub type GptResult<T> = Result<T, GptError>;

/// Whether a forward pass is part of training. Dropout is only active in
/// [`Mode::Train`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Dropout is applied.
    Train,
    /// Dropout is disabled.
    Eval,
}

fn same_shape(idx: &Tensor<usize>, targets: &Tensor<usize>) -> Result<(), TensorError> {
    if idx.shape() == targets.shape() {
        Ok(())
    } else {
        Err(TensorError::ShapeMismatch {
            lhs: idx.shape().to_vec(),
            rhs: targets.shape().to_vec(),
        })
    }
}

/// Character-level GPT whose parameters live in a [`Graph`].
#[derive(Debug)]
pub struct LanguageModel<G: Graph> {
    graph: G,
    config: ModelConfig,
    token_embedding: TensorId,
    position_embedding: TensorId,
    blocks: Vec<Block>,
    ln_f: LayerNorm,
    lm_head: Linear,
}

impl<G: Graph> LanguageModel<G> {
    /// Builds a randomly initialized model inside `graph`, which must not
    /// hold any activations yet.
    pub fn new<R: Rng>(rng: &mut R, mut graph: G, config: &ModelConfig) -> GptResult<Self> {
        config.validate()?;
        let token_embedding =
            graph.alloc_param(rng, &[config.vocab_size, config.n_embd], "token_embedding")?;
        let position_embedding =
            graph.alloc_param(rng, &[config.block_size, config.n_embd], "position_embedding")?;
        let blocks = (0..config.n_layer)
            .map(|l| Block::new(&mut graph, rng, &format!("blocks.{l}"), config))
            .collect::<GptResult<Vec<_>>>()?;
        let ln_f = LayerNorm::new(&mut graph, "ln_f", config.n_embd)?;
        let lm_head = Linear::new(
            &mut graph,
            rng,
            "lm_head",
            config.n_embd,
            config.vocab_size,
            true,
        )?;
        Ok(Self {
            graph,
            config: config.clone(),
            token_embedding,
            position_embedding,
            blocks,
            ln_f,
            lm_head,
        })
    }

    /// Hyperparameters the model was built with.
    pub const fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// The graph holding parameters and the last recorded pass.
    pub const fn graph(&self) -> &G {
        &self.graph
    }

    /// Total number of trainable scalars.
    pub fn num_params(&self) -> GptResult<usize> {
        let mut count = 0;
        for p in self.graph.params() {
            count += self.graph.get(*p)?.as_float()?.size();
        }
        Ok(count)
    }

    /// Records the computation of the logits `[B, T, vocab_size]` of the
    /// token ids `idx` (`[B, T]`).
    fn record_logits<R: Rng>(
        &mut self,
        rng: &mut R,
        mode: Mode,
        idx: &Tensor<usize>,
    ) -> GptResult<TensorId> {
        let time = match idx.shape() {
            [batch, time] if *batch > 0 => *time,
            shape => return Err(TensorError::UnexpectedShape(shape.to_vec()).into()),
        };
        self.config.check_context(time)?;

        self.graph.reset();
        let g = &mut self.graph;
        let tokens = g.alloc_usize(idx.clone(), "tokens".into())?;
        let positions = g.alloc_usize(Tensor::raw(&[time], (0..time).collect())?, "positions".into())?;
        let tok_emb = g.call(Embedding::new(), &[tokens, self.token_embedding])?;
        let pos_emb = g.call(Embedding::new(), &[positions, self.position_embedding])?;
        let mut x = g.call(Add::new(), &[tok_emb, pos_emb])?;
        for block in &self.blocks {
            x = block.forward(g, rng, mode, x)?;
        }
        let x = self.ln_f.forward(g, x)?;
        Ok(self.lm_head.forward(g, x)?)
    }

    fn record_loss(&mut self, logits: TensorId, targets: &Tensor<usize>) -> GptResult<TensorId> {
        let target = self.graph.alloc_usize(targets.clone(), "targets".into())?;
        Ok(self.graph.call(CrossEntropy::new(), &[logits, target])?)
    }

    /// Computes the logits of `idx` and, when `targets` are given, the mean
    /// cross-entropy against them.
    ///
    /// Fails before any computation if `idx` is not `[B, T]` with `B >= 1`
    /// and `1 <= T <= block_size`.
    pub fn forward<R: Rng>(
        &mut self,
        rng: &mut R,
        mode: Mode,
        idx: &Tensor<usize>,
        targets: Option<&Tensor<usize>>,
    ) -> GptResult<(Tensor<f32>, Option<f32>)> {
        if let Some(targets) = targets {
            same_shape(idx, targets)?;
        }
        let logits = self.record_logits(rng, mode, idx)?;
        let loss = match targets {
            Some(targets) => {
                let loss = self.record_loss(logits, targets)?;
                Some(self.graph.get(loss)?.as_float()?.mean())
            }
            None => None,
        };
        Ok((self.graph.get(logits)?.as_float()?.clone(), loss))
    }

    /// Mean cross-entropy of `idx` against `targets`, without gradients.
    pub fn loss<R: Rng>(
        &mut self,
        rng: &mut R,
        mode: Mode,
        idx: &Tensor<usize>,
        targets: &Tensor<usize>,
    ) -> GptResult<f32> {
        same_shape(idx, targets)?;
        let logits = self.record_logits(rng, mode, idx)?;
        let loss = self.record_loss(logits, targets)?;
        Ok(self.graph.get(loss)?.as_float()?.mean())
    }

    /// One optimization step on a batch: forward in training mode, backward,
    /// then a single optimizer update. Returns the batch loss.
    pub fn train_step<R: Rng, O: Optimizer>(
        &mut self,
        rng: &mut R,
        xs: &Tensor<usize>,
        ys: &Tensor<usize>,
        optimizer: &O,
        optimizer_state: &mut OptimizerState,
        learning_rate: f32,
    ) -> GptResult<f32> {
        same_shape(xs, ys)?;
        let logits = self.record_logits(rng, Mode::Train, xs)?;
        let loss = self.record_loss(logits, ys)?;
        self.graph.zero_grad();
        let loss = self.graph.backward_all(loss)?;
        self.graph.optimize(optimizer, optimizer_state, learning_rate)?;
        Ok(loss)
    }

    /// Extends every row of `seed` (`[B, T]`) by `count` sampled tokens.
    ///
    /// Each step looks at the last `block_size` tokens only, runs in
    /// evaluation mode and samples from the softmax of the final position.
    pub fn generate<R: Rng>(
        &mut self,
        rng: &mut R,
        seed: &Tensor<usize>,
        count: usize,
    ) -> GptResult<Tensor<usize>> {
        let (batch, mut time) = match seed.shape() {
            [batch, time] => (*batch, *time),
            shape => return Err(TensorError::UnexpectedShape(shape.to_vec()).into()),
        };
        if count == 0 {
            return Ok(seed.clone());
        }
        if time == 0 {
            return Err(ConfigError::EmptyContext.into());
        }
        let mut rows = seed
            .blob()
            .chunks(time)
            .map(<[usize]>::to_vec)
            .collect::<Vec<_>>();

        for _ in 0..count {
            let start = time.saturating_sub(self.config.block_size);
            let context = rows
                .iter()
                .flat_map(|r| r[start..].iter().copied())
                .collect();
            let context = Tensor::raw(&[batch, time - start], context)?;
            let (logits, _) = self.forward(rng, Mode::Eval, &context, None)?;
            for (b, row) in rows.iter_mut().enumerate() {
                let sequence = logits.get(b)?;
                let last = sequence.get(time - start - 1)?;
                let dist = WeightedIndex::new(softmax_row(last.blob()))?;
                row.push(dist.sample(rng));
            }
            time += 1;
        }

        Ok(Tensor::raw(&[batch, time], rows.concat())?)
    }

    /// Copies every parameter out of the graph, keyed by name.
    pub fn snapshot(&self) -> GptResult<Snapshot> {
        let mut tensors = Snapshot::new();
        for p in self.graph.params() {
            let name = self.graph.name_of(*p)?.to_string();
            tensors.insert(name, self.graph.get(*p)?.as_float()?.clone());
        }
        Ok(tensors)
    }

    /// Replaces the parameters with those of `snapshot`. Every parameter must
    /// be present with its exact shape and the snapshot may hold nothing
    /// else; on failure the model is left unchanged.
    pub fn load_snapshot(&mut self, snapshot: &Snapshot) -> GptResult<()> {
        let params = self.graph.params().to_vec();
        let mut updates = Vec::with_capacity(params.len());
        for p in &params {
            let name = self.graph.name_of(*p)?;
            let stored = snapshot
                .get(name)
                .ok_or_else(|| CheckpointError::MissingParameter(name.to_string()))?;
            let expected = self.graph.get(*p)?.shape();
            if stored.shape() != expected {
                return Err(CheckpointError::ShapeMismatch {
                    name: name.to_string(),
                    expected: expected.to_vec(),
                    got: stored.shape().to_vec(),
                }
                .into());
            }
            updates.push((*p, stored));
        }
        if snapshot.len() != params.len() {
            for name in snapshot.keys() {
                let known = params
                    .iter()
                    .any(|p| self.graph.name_of(*p).is_ok_and(|n| n == name.as_str()));
                if !known {
                    return Err(CheckpointError::UnexpectedParameter(name.clone()).into());
                }
            }
        }
        for (p, stored) in updates {
            self.graph.load(p, stored)?;
        }
        Ok(())
    }
}
