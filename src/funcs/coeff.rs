use super::{expect_inputs, Function};
use crate::tensor::*;

/// Multiplies by a constant.
#[derive(Debug, Clone)]
pub struct Coeff {
    coeff: f32,
}
impl Coeff {
    /// Multiplies the input by `coeff`.
    pub fn new(coeff: f32) -> Box<dyn Function> {
        Box::new(Self { coeff })
    }
}
impl Function for Coeff {
    fn run(&mut self, inps: &[&GeneralTensor]) -> Result<Tensor<f32>, TensorError> {
        expect_inputs(inps, 1, "Coeff")?;
        Ok(inps[0].as_float()?.map_values(|f| f * self.coeff))
    }
    fn grad(
        &self,
        _inps: &[&GeneralTensor],
        out_grad: &Tensor<f32>,
    ) -> Result<Vec<Tensor<f32>>, TensorError> {
        Ok(vec![out_grad.map_values(|d| d * self.coeff)])
    }
}
