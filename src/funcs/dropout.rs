use super::{expect_inputs, Function};
use crate::tensor::*;
use rand::Rng;

/// Inverted dropout with a mask drawn up front, so the caller's random
/// number generator decides which activations are dropped.
#[derive(Debug, Clone)]
pub struct Dropout {
    mask: Tensor<f32>,
}
impl Dropout {
    /// Drops each element with probability `rate` and scales the rest by `1 / (1 - rate)`.
    pub fn new<R: Rng>(rng: &mut R, rate: f32, shape: &[usize]) -> Box<dyn Function> {
        let mut mask = Tensor::constant(shape, 1. / (1. - rate));
        for m in mask.blob_mut() {
            if rng.gen::<f32>() < rate {
                *m = 0.;
            }
        }
        Box::new(Self { mask })
    }
}

impl Function for Dropout {
    fn run(&mut self, inps: &[&GeneralTensor]) -> Result<Tensor<f32>, TensorError> {
        expect_inputs(inps, 1, "Dropout")?;
        inps[0].as_float()? * &self.mask
    }
    fn grad(
        &self,
        _inps: &[&GeneralTensor],
        out_grad: &Tensor<f32>,
    ) -> Result<Vec<Tensor<f32>>, TensorError> {
        Ok(vec![(out_grad * &self.mask)?])
    }
}
