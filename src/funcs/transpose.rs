use super::{expect_inputs, Function};
use crate::tensor::*;

/// Swaps the two innermost dimensions.
#[derive(Debug, Clone)]
pub struct Transpose;
impl Transpose {
    /// Swaps the two innermost dimensions.
    pub fn new() -> Box<dyn Function> {
        Box::new(Self)
    }
}

impl Function for Transpose {
    fn run(&mut self, inps: &[&GeneralTensor]) -> Result<Tensor<f32>, TensorError> {
        expect_inputs(inps, 1, "Transpose")?;
        inps[0].as_float()?.transpose()
    }
    fn grad(
        &self,
        _inps: &[&GeneralTensor],
        out_grad: &Tensor<f32>,
    ) -> Result<Vec<Tensor<f32>>, TensorError> {
        Ok(vec![out_grad.transpose()?])
    }
}
