use super::{expect_inputs, Function};
use crate::tensor::*;

/// Matrix product of two inputs, batched over leading dimensions.
#[derive(Debug, Clone)]
pub struct MatMul;
impl MatMul {
    /// Boxed for recording in a graph.
    pub fn new() -> Box<dyn Function> {
        Box::new(Self)
    }
}
impl Function for MatMul {
    fn run(&mut self, inps: &[&GeneralTensor]) -> Result<Tensor<f32>, TensorError> {
        expect_inputs(inps, 2, "MatMul")?;
        inps[0].as_float()? ^ inps[1].as_float()?
    }
    fn grad(
        &self,
        inps: &[&GeneralTensor],
        out_grad: &Tensor<f32>,
    ) -> Result<Vec<Tensor<f32>>, TensorError> {
        let (lhs, rhs) = (inps[0].as_float()?, inps[1].as_float()?);
        Ok(vec![
            (out_grad ^ &rhs.transpose()?)?,
            (&lhs.transpose()? ^ out_grad)?,
        ])
    }
}
