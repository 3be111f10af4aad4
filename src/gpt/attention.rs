use super::layers::{dropout, Linear};
use super::{GptResult, Mode};
use crate::config::{ConfigError, ModelConfig};
use crate::funcs::{Cat, Coeff, Mask, MatMul, Softmax, Transpose};
use crate::graph::{Graph, TensorId};
use crate::tensor::{Tensor, TensorError};
use rand::Rng;

/// One head of causal self-attention: `[B, T, n_embd] -> [B, T, head_size]`.
#[derive(Debug, Clone)]
pub struct Head {
    key: Linear,
    query: Linear,
    value: Linear,
    /// Lower-triangular `block_size x block_size` mask, cropped per call.
    tril: Tensor<bool>,
    head_size: usize,
    dropout: f32,
}

impl Head {
    /// Allocates the key, query and value projections of one head.
    pub fn new<G: Graph, R: Rng>(
        graph: &mut G,
        rng: &mut R,
        name: &str,
        config: &ModelConfig,
    ) -> GptResult<Self> {
        let head_size = config.head_size();
        Ok(Self {
            key: Linear::new(graph, rng, &format!("{name}.key"), config.n_embd, head_size, false)?,
            query: Linear::new(
                graph,
                rng,
                &format!("{name}.query"),
                config.n_embd,
                head_size,
                false,
            )?,
            value: Linear::new(
                graph,
                rng,
                &format!("{name}.value"),
                config.n_embd,
                head_size,
                false,
            )?,
            tril: Tensor::tril(config.block_size),
            head_size,
            dropout: config.dropout,
        })
    }

    /// Attends `x` (`[B, T, n_embd]`) causally, returning `[B, T, head_size]`.
    pub fn forward<G: Graph, R: Rng>(
        &self,
        graph: &mut G,
        rng: &mut R,
        mode: Mode,
        x: TensorId,
    ) -> GptResult<TensorId> {
        let shape = graph.get(x)?.shape().to_vec();
        let time = match shape.as_slice() {
            [.., t, _] => *t,
            _ => return Err(TensorError::UnexpectedShape(shape).into()),
        };
        let k = self.key.forward(graph, x)?;
        let q = self.query.forward(graph, x)?;
        let v = self.value.forward(graph, x)?;

        let k_t = graph.call(Transpose::new(), &[k])?;
        let scores = graph.call(MatMul::new(), &[q, k_t])?;
        let scores = graph.call(Coeff::new((self.head_size as f32).powf(-0.5)), &[scores])?;
        let future = !&self.tril.crop(time)?;
        let scores = graph.call(Mask::new(future, f32::NEG_INFINITY), &[scores])?;
        let weights = graph.call(Softmax::new(), &[scores])?;
        let weights = dropout(graph, rng, mode, self.dropout, weights)?;
        Ok(graph.call(MatMul::new(), &[weights, v])?)
    }
}

/// Heads side by side, concatenated and projected back to `n_embd`.
#[derive(Debug, Clone)]
pub struct MultiHeadAttention {
    heads: Vec<Head>,
    proj: Linear,
    dropout: f32,
}

impl MultiHeadAttention {
    /// Fails unless `n_head` divides `n_embd`.
    pub fn new<G: Graph, R: Rng>(
        graph: &mut G,
        rng: &mut R,
        name: &str,
        config: &ModelConfig,
    ) -> GptResult<Self> {
        if config.n_head == 0 || config.n_embd % config.n_head != 0 {
            return Err(ConfigError::HeadsDoNotDivide {
                n_embd: config.n_embd,
                n_head: config.n_head,
            }
            .into());
        }
        let heads = (0..config.n_head)
            .map(|h| Head::new(graph, rng, &format!("{name}.heads.{h}"), config))
            .collect::<GptResult<Vec<_>>>()?;
        let proj = Linear::new(
            graph,
            rng,
            &format!("{name}.proj"),
            config.n_embd,
            config.n_embd,
            true,
        )?;
        Ok(Self {
            heads,
            proj,
            dropout: config.dropout,
        })
    }

    /// Runs every head on `x`, then projects the concatenation.
    pub fn forward<G: Graph, R: Rng>(
        &self,
        graph: &mut G,
        rng: &mut R,
        mode: Mode,
        x: TensorId,
    ) -> GptResult<TensorId> {
        let outs = self
            .heads
            .iter()
            .map(|head| head.forward(graph, rng, mode, x))
            .collect::<GptResult<Vec<_>>>()?;
        let out = graph.call(Cat::new(), &outs)?;
        let out = self.proj.forward(graph, out)?;
        Ok(dropout(graph, rng, mode, self.dropout, out)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpt::GptError;
    use crate::graph::CpuGraph;
    use crate::tensor::TensorOps;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn input<G: Graph, R: Rng>(graph: &mut G, rng: &mut R, shape: &[usize]) -> TensorId {
        graph
            .alloc(Tensor::rand(rng, shape), false, "x".into())
            .unwrap()
    }

    #[test]
    fn test_multi_head_keeps_shape() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut graph = CpuGraph::new();
        let config = ModelConfig::tiny(5);
        let mha = MultiHeadAttention::new(&mut graph, &mut rng, "sa", &config).unwrap();
        let x = input(&mut graph, &mut rng, &[2, 3, config.n_embd]);
        let out = mha.forward(&mut graph, &mut rng, Mode::Train, x).unwrap();
        assert_eq!(graph.get(out).unwrap().shape(), &[2, 3, config.n_embd]);
    }

    #[test]
    fn test_head_output_width() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut graph = CpuGraph::new();
        let config = ModelConfig::tiny(5);
        let head = Head::new(&mut graph, &mut rng, "head", &config).unwrap();
        let x = input(&mut graph, &mut rng, &[1, config.block_size, config.n_embd]);
        let out = head.forward(&mut graph, &mut rng, Mode::Eval, x).unwrap();
        assert_eq!(
            graph.get(out).unwrap().shape(),
            &[1, config.block_size, config.head_size()]
        );
    }

    #[test]
    fn test_first_position_attends_to_itself_only() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut graph = CpuGraph::new();
        let config = ModelConfig::tiny(5);
        let head = Head::new(&mut graph, &mut rng, "head", &config).unwrap();

        let a = Tensor::rand(&mut rng, &[1, 2, config.n_embd]);
        let mut b = a.clone();
        for v in &mut b.blob_mut()[config.n_embd..] {
            *v += 1.0;
        }
        let mut first_rows = Vec::new();
        for t in [a, b] {
            graph.reset();
            let x = graph.alloc(t, false, "x".into()).unwrap();
            let out = head.forward(&mut graph, &mut rng, Mode::Eval, x).unwrap();
            let out = graph.get(out).unwrap().as_float().unwrap().clone();
            first_rows.push(out.blob()[..config.head_size()].to_vec());
        }
        assert_eq!(first_rows[0], first_rows[1]);
    }

    #[test]
    fn test_non_divisible_heads_rejected() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut graph = CpuGraph::new();
        let config = ModelConfig {
            n_embd: 10,
            n_head: 3,
            ..ModelConfig::tiny(5)
        };
        assert!(matches!(
            MultiHeadAttention::new(&mut graph, &mut rng, "sa", &config),
            Err(GptError::Config(ConfigError::HeadsDoNotDivide { .. }))
        ));
    }
}
