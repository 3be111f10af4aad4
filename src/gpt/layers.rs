use super::Mode;
use crate::funcs::{Add, Dropout, LayerNorm as LayerNormFn, MatMul};
use crate::graph::{Graph, GraphError, TensorId};
use crate::tensor::Tensor;
use rand::Rng;

/// Parameter allocation helpers.
pub(crate) trait GraphExt: Graph {
    fn alloc_param<R: Rng>(
        &mut self,
        rng: &mut R,
        shape: &[usize],
        name: &str,
    ) -> Result<TensorId, GraphError> {
        self.alloc(Tensor::<f32>::rand(rng, shape), true, name.into())
    }

    fn alloc_param_zeros(&mut self, shape: &[usize], name: &str) -> Result<TensorId, GraphError> {
        self.alloc(Tensor::<f32>::zeros(shape), true, name.into())
    }

    fn alloc_param_ones(&mut self, shape: &[usize], name: &str) -> Result<TensorId, GraphError> {
        self.alloc(Tensor::<f32>::ones(shape), true, name.into())
    }
}

impl<G: Graph> GraphExt for G {}

/// Affine map over the innermost dimension.
#[derive(Debug, Clone)]
pub struct Linear {
    weight: TensorId,
    bias: Option<TensorId>,
}

impl Linear {
    /// A `fan_in x fan_out` weight, plus a zero bias when `bias` is set.
    pub fn new<G: Graph, R: Rng>(
        graph: &mut G,
        rng: &mut R,
        name: &str,
        fan_in: usize,
        fan_out: usize,
        bias: bool,
    ) -> Result<Self, GraphError> {
        let weight = graph.alloc_param(rng, &[fan_in, fan_out], &format!("{name}.weight"))?;
        let bias = if bias {
            Some(graph.alloc_param_zeros(&[fan_out], &format!("{name}.bias"))?)
        } else {
            None
        };
        Ok(Self { weight, bias })
    }

    /// Computes `x . weight + bias`.
    pub fn forward<G: Graph>(&self, graph: &mut G, x: TensorId) -> Result<TensorId, GraphError> {
        let out = graph.call(MatMul::new(), &[x, self.weight])?;
        match self.bias {
            Some(bias) => graph.call(Add::new(), &[out, bias]),
            None => Ok(out),
        }
    }
}

/// Layer normalization with a learned gain (starting at one) and offset
/// (starting at zero).
#[derive(Debug, Clone)]
pub struct LayerNorm {
    coeff: TensorId,
    bias: TensorId,
}

impl LayerNorm {
    /// Allocates the gain and offset for vectors of `width` elements.
    pub fn new<G: Graph>(graph: &mut G, name: &str, width: usize) -> Result<Self, GraphError> {
        Ok(Self {
            coeff: graph.alloc_param_ones(&[width], &format!("{name}.coeff"))?,
            bias: graph.alloc_param_zeros(&[width], &format!("{name}.bias"))?,
        })
    }

    /// Normalizes `x` over its innermost dimension.
    pub fn forward<G: Graph>(&self, graph: &mut G, x: TensorId) -> Result<TensorId, GraphError> {
        graph.call(LayerNormFn::new(), &[x, self.coeff, self.bias])
    }
}

/// Inverted dropout. Only recorded in training mode with a non-zero rate;
/// otherwise the input passes through untouched.
pub fn dropout<G: Graph, R: Rng>(
    graph: &mut G,
    rng: &mut R,
    mode: Mode,
    rate: f32,
    x: TensorId,
) -> Result<TensorId, GraphError> {
    if mode == Mode::Eval || rate <= 0.0 {
        return Ok(x);
    }
    let shape = graph.get(x)?.shape().to_vec();
    graph.call(Dropout::new(rng, rate, &shape), &[x])
}
