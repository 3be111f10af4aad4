use super::Function;
use crate::tensor::*;

/// Concatenates equally shaped inputs along the innermost dimension.
#[derive(Debug, Clone)]
pub struct Cat;
impl Cat {
    /// Concatenates all inputs along their innermost dimension.
    pub fn new() -> Box<dyn Function> {
        Box::new(Self)
    }
}

impl Function for Cat {
    fn run(&mut self, inps: &[&GeneralTensor]) -> Result<Tensor<f32>, TensorError> {
        let inps = inps
            .iter()
            .map(|t| t.as_float())
            .collect::<Result<Vec<_>, TensorError>>()?;
        Tensor::cat(&inps)
    }
    fn grad(
        &self,
        inps: &[&GeneralTensor],
        out_grad: &Tensor<f32>,
    ) -> Result<Vec<Tensor<f32>>, TensorError> {
        Tensor::split(out_grad, inps.len())
    }
}
