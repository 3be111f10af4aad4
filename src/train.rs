//! Mini-batch training with periodic evaluation and checkpointing.

use crate::checkpoint;
use crate::config::{ConfigError, TrainConfig};
use crate::gpt::{GptResult, LanguageModel, Mode};
use crate::graph::Graph;
use crate::optimizer::{AdamW, OptimizerState};
use crate::tensor::Tensor;
use crate::training_logger::TrainingLogger;
use rand::Rng;
use std::fmt;
use std::path::Path;
use std::time::Instant;

/// Encoded corpus split into a leading training part and a held-out tail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dataset {
    /// Leading part of the corpus, used for gradient steps.
    pub train: Vec<usize>,
    /// Held-out tail, only evaluated.
    pub val: Vec<usize>,
}

impl Dataset {
    /// Keeps the first `floor(train_fraction * len)` tokens for training.
    #[allow(clippy::cast_sign_loss)]
    pub fn split(mut tokens: Vec<usize>, train_fraction: f64) -> Self {
        let n = ((tokens.len() as f64 * train_fraction) as usize).min(tokens.len());
        let val = tokens.split_off(n);
        Self { train: tokens, val }
    }
}

/// Samples `batch_size` windows of `block_size` tokens, with replacement,
/// together with the same windows shifted by one token.
pub fn get_batch<R: Rng>(
    rng: &mut R,
    data: &[usize],
    batch_size: usize,
    block_size: usize,
) -> GptResult<(Tensor<usize>, Tensor<usize>)> {
    if data.len() <= block_size {
        return Err(too_short(data.len(), block_size).into());
    }
    let mut xs = Vec::with_capacity(batch_size * block_size);
    let mut ys = Vec::with_capacity(batch_size * block_size);
    for _ in 0..batch_size {
        let start = rng.gen_range(0..data.len() - block_size);
        xs.extend_from_slice(&data[start..start + block_size]);
        ys.extend_from_slice(&data[start + 1..start + block_size + 1]);
    }
    Ok((
        Tensor::raw(&[batch_size, block_size], xs)?,
        Tensor::raw(&[batch_size, block_size], ys)?,
    ))
}

const fn too_short(len: usize, block_size: usize) -> ConfigError {
    ConfigError::CorpusTooShort {
        len,
        needed: block_size + 1,
    }
}

/// Mean loss over `eval_iters` batches in evaluation mode, or `None` when
/// `data` is too short to hold a single window.
pub fn estimate_loss<G: Graph, R: Rng>(
    model: &mut LanguageModel<G>,
    rng: &mut R,
    data: &[usize],
    config: &TrainConfig,
) -> GptResult<Option<f32>> {
    let block_size = model.config().block_size;
    if data.len() <= block_size {
        return Ok(None);
    }
    let mut total = 0.0;
    for _ in 0..config.eval_iters {
        let (xs, ys) = get_batch(rng, data, config.batch_size, block_size)?;
        total += model.loss(rng, Mode::Eval, &xs, &ys)?;
    }
    Ok(Some(total / config.eval_iters as f32))
}

/// Losses measured at one evaluation point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    /// Iteration at which the losses were measured.
    pub step: usize,
    /// Mean loss on the training split.
    pub train_loss: f32,
    /// `None` when the held-out split is shorter than one window.
    pub val_loss: Option<f32>,
}

impl fmt::Display for Evaluation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "step {}: train loss {:.4}, ", self.step, self.train_loss)?;
        match self.val_loss {
            Some(val) => write!(f, "val loss {val:.4}"),
            None => write!(f, "val loss n/a"),
        }
    }
}

/// Persists the model parameters at `path`, reporting how long it took.
pub fn save_model<G: Graph>(model: &LanguageModel<G>, path: &Path) -> GptResult<()> {
    let start_time = Instant::now();
    checkpoint::save(&model.snapshot()?, path)?;
    println!(
        "Saved checkpoint to {} in {:.2}s",
        path.display(),
        start_time.elapsed().as_secs_f32()
    );
    Ok(())
}

/// Trains `model` for `config.max_iters` steps.
///
/// Every `eval_interval` steps (starting with step 0) both splits are
/// evaluated, the parameters are checkpointed and the losses printed. The
/// final parameters are checkpointed once more after the last step. Returns
/// every evaluation in order.
pub fn train<G: Graph, R: Rng>(
    model: &mut LanguageModel<G>,
    rng: &mut R,
    dataset: &Dataset,
    config: &TrainConfig,
) -> GptResult<Vec<Evaluation>> {
    config.validate()?;
    let block_size = model.config().block_size;
    if dataset.train.len() <= block_size {
        return Err(too_short(dataset.train.len(), block_size).into());
    }
    if dataset.val.len() <= block_size {
        eprintln!(
            "Warning: held-out split has {} tokens, validation loss will not be reported.",
            dataset.val.len()
        );
    }

    let optimizer = AdamW::with_weight_decay(config.weight_decay);
    let mut optimizer_state = OptimizerState::default();
    let mut logger = config
        .log_path
        .as_deref()
        .map(TrainingLogger::new)
        .transpose()?;
    let eval_interval = config.eval_interval();
    let mut evaluations = Vec::new();

    println!("Beginning training");
    for iter in 0..config.max_iters {
        if iter % eval_interval == 0 {
            let evaluation = Evaluation {
                step: iter,
                train_loss: estimate_loss(model, rng, &dataset.train, config)?
                    .ok_or_else(|| too_short(dataset.train.len(), block_size))?,
                val_loss: estimate_loss(model, rng, &dataset.val, config)?,
            };
            save_model(model, &config.checkpoint_path)?;
            println!("{evaluation}");
            if let Some(logger) = logger.as_mut() {
                logger.log(
                    iter,
                    config.learning_rate,
                    evaluation.train_loss,
                    evaluation.val_loss,
                )?;
            }
            evaluations.push(evaluation);
        }

        let (xs, ys) = get_batch(rng, &dataset.train, config.batch_size, block_size)?;
        model.train_step(
            rng,
            &xs,
            &ys,
            &optimizer,
            &mut optimizer_state,
            config.learning_rate,
        )?;
    }

    save_model(model, &config.checkpoint_path)?;
    Ok(evaluations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelConfig;
    use crate::gpt::GptError;
    use crate::graph::CpuGraph;
    use crate::tensor::TensorOps;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_split() {
        let dataset = Dataset::split(vec![0, 1, 0, 1], 0.9);
        assert_eq!(dataset.train, vec![0, 1, 0]);
        assert_eq!(dataset.val, vec![1]);
        let dataset = Dataset::split((0..10).collect(), 0.9);
        assert_eq!(dataset.train.len(), 9);
        assert_eq!(dataset.val, vec![9]);
    }

    #[test]
    fn test_get_batch_windows() {
        let mut rng = StdRng::seed_from_u64(0);
        let data = (0..20).collect::<Vec<_>>();
        let (xs, ys) = get_batch(&mut rng, &data, 4, 5).unwrap();
        assert_eq!(xs.shape(), &[4, 5]);
        for (x, y) in xs.blob().chunks(5).zip(ys.blob().chunks(5)) {
            for i in 0..5 {
                assert_eq!(y[i], x[i] + 1);
            }
            assert!(x[0] < 15);
        }
    }

    #[test]
    fn test_get_batch_needs_a_full_window() {
        let mut rng = StdRng::seed_from_u64(0);
        assert!(get_batch(&mut rng, &[0, 1, 0], 1, 2).is_ok());
        assert!(matches!(
            get_batch(&mut rng, &[0, 1], 1, 2),
            Err(GptError::Config(ConfigError::CorpusTooShort { len: 2, needed: 3 }))
        ));
    }

    #[test]
    fn test_estimate_loss_short_split() {
        let mut rng = StdRng::seed_from_u64(0);
        let config = ModelConfig {
            block_size: 2,
            ..ModelConfig::tiny(2)
        };
        let mut model = LanguageModel::new(&mut rng, CpuGraph::new(), &config).unwrap();
        let train_config = TrainConfig {
            batch_size: 1,
            eval_iters: 3,
            ..TrainConfig::default()
        };
        let loss = estimate_loss(&mut model, &mut rng, &[0, 1, 0], &train_config).unwrap();
        assert!(loss.unwrap().is_finite());
        assert_eq!(
            estimate_loss(&mut model, &mut rng, &[1], &train_config).unwrap(),
            None
        );
    }

    #[test]
    fn test_evaluation_display() {
        let evaluation = Evaluation {
            step: 10,
            train_loss: 1.23456,
            val_loss: None,
        };
        assert_eq!(
            evaluation.to_string(),
            "step 10: train loss 1.2346, val loss n/a"
        );
    }
}
