use super::{expect_inputs, Function};
use crate::tensor::*;

/// Rectified linear unit.
#[derive(Debug, Clone)]
pub struct Relu;
impl Relu {
    /// Boxed for recording in a graph.
    pub fn new() -> Box<dyn Function> {
        Box::new(Self)
    }
}
impl Function for Relu {
    fn run(&mut self, inps: &[&GeneralTensor]) -> Result<Tensor<f32>, TensorError> {
        expect_inputs(inps, 1, "Relu")?;
        Ok(inps[0].as_float()?.map_values(|f| f.max(0.)))
    }
    fn grad(
        &self,
        inps: &[&GeneralTensor],
        out_grad: &Tensor<f32>,
    ) -> Result<Vec<Tensor<f32>>, TensorError> {
        let der = inps[0]
            .as_float()?
            .map_values(|f| if f > 0. { 1. } else { 0. });
        Ok(vec![(&der * out_grad)?])
    }
}
