use super::attention::MultiHeadAttention;
use super::layers::{dropout, LayerNorm, Linear};
use super::{GptResult, Mode};
use crate::config::ModelConfig;
use crate::funcs::{Add, Relu};
use crate::graph::{Graph, TensorId};
use rand::Rng;

const FEEDFORWARD_MULTIPLIER: usize = 4;

/// Position-wise `n_embd -> 4 * n_embd -> n_embd` network.
#[derive(Debug, Clone)]
pub struct FeedForward {
    fc: Linear,
    proj: Linear,
    dropout: f32,
}

impl FeedForward {
    /// Allocates the expansion and the projection back to `n_embd`.
    pub fn new<G: Graph, R: Rng>(
        graph: &mut G,
        rng: &mut R,
        name: &str,
        config: &ModelConfig,
    ) -> GptResult<Self> {
        let hidden = FEEDFORWARD_MULTIPLIER * config.n_embd;
        Ok(Self {
            fc: Linear::new(graph, rng, &format!("{name}.fc"), config.n_embd, hidden, true)?,
            proj: Linear::new(graph, rng, &format!("{name}.proj"), hidden, config.n_embd, true)?,
            dropout: config.dropout,
        })
    }

    /// Applies the network to each position of `x`.
    pub fn forward<G: Graph, R: Rng>(
        &self,
        graph: &mut G,
        rng: &mut R,
        mode: Mode,
        x: TensorId,
    ) -> GptResult<TensorId> {
        let h = self.fc.forward(graph, x)?;
        let h = graph.call(Relu::new(), &[h])?;
        let out = self.proj.forward(graph, h)?;
        Ok(dropout(graph, rng, mode, self.dropout, out)?)
    }
}

/// Pre-norm residual block: `x + sa(ln1(x))`, then `x + ffwd(ln2(x))`.
#[derive(Debug, Clone)]
pub struct Block {
    ln1: LayerNorm,
    sa: MultiHeadAttention,
    ln2: LayerNorm,
    ffwd: FeedForward,
}

impl Block {
    /// Allocates both layer norms, the attention and the feed-forward network.
    pub fn new<G: Graph, R: Rng>(
        graph: &mut G,
        rng: &mut R,
        name: &str,
        config: &ModelConfig,
    ) -> GptResult<Self> {
        Ok(Self {
            ln1: LayerNorm::new(graph, &format!("{name}.ln1"), config.n_embd)?,
            sa: MultiHeadAttention::new(graph, rng, &format!("{name}.sa"), config)?,
            ln2: LayerNorm::new(graph, &format!("{name}.ln2"), config.n_embd)?,
            ffwd: FeedForward::new(graph, rng, &format!("{name}.ffwd"), config)?,
        })
    }

    /// Applies both residual sub-layers.
    pub fn forward<G: Graph, R: Rng>(
        &self,
        graph: &mut G,
        rng: &mut R,
        mode: Mode,
        x: TensorId,
    ) -> GptResult<TensorId> {
        let normed = self.ln1.forward(graph, x)?;
        let attended = self.sa.forward(graph, rng, mode, normed)?;
        let x = graph.call(Add::new(), &[x, attended])?;
        let normed = self.ln2.forward(graph, x)?;
        let fed = self.ffwd.forward(graph, rng, mode, normed)?;
        Ok(graph.call(Add::new(), &[x, fed])?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::CpuGraph;
    use crate::tensor::{Tensor, TensorOps};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_block_keeps_shape() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut graph = CpuGraph::new();
        let config = ModelConfig {
            dropout: 0.1,
            ..ModelConfig::tiny(7)
        };
        let block = Block::new(&mut graph, &mut rng, "blocks.0", &config).unwrap();
        let x = graph
            .alloc(Tensor::rand(&mut rng, &[2, 5, config.n_embd]), false, "x".into())
            .unwrap();
        for mode in [Mode::Train, Mode::Eval] {
            let out = block.forward(&mut graph, &mut rng, mode, x).unwrap();
            assert_eq!(graph.get(out).unwrap().shape(), &[2, 5, config.n_embd]);
        }
    }

    #[test]
    fn test_feed_forward_is_position_wise() {
        let mut rng = StdRng::seed_from_u64(4);
        let mut graph = CpuGraph::new();
        let config = ModelConfig::tiny(7);
        let ffwd = FeedForward::new(&mut graph, &mut rng, "ffwd", &config).unwrap();
        let row = Tensor::rand(&mut rng, &[1, 1, config.n_embd]);
        let pair = Tensor::cat(&[&row, &Tensor::rand(&mut rng, &[1, 1, config.n_embd])])
            .unwrap()
            .reshape(&[1, 2, config.n_embd])
            .unwrap()
            .to_tensor();

        let single = graph.alloc(row, false, "row".into()).unwrap();
        let single = ffwd.forward(&mut graph, &mut rng, Mode::Eval, single).unwrap();
        let single = graph.get(single).unwrap().as_float().unwrap().clone();
        let both = graph.alloc(pair, false, "pair".into()).unwrap();
        let both = ffwd.forward(&mut graph, &mut rng, Mode::Eval, both).unwrap();
        let both = graph.get(both).unwrap().as_float().unwrap();
        for (a, b) in single.blob().iter().zip(&both.blob()[..config.n_embd]) {
            assert!((a - b).abs() < 1e-6);
        }
    }
}
