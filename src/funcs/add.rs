use super::{expect_inputs, Function};
use crate::tensor::{GeneralTensor, Tensor, TensorError};

/// Element-wise addition: `Output = Input1 + Input2`.
///
/// The smaller operand may be a trailing-dimension suffix of the larger one
/// (a bias vector, or position embeddings added to a whole batch).
#[derive(Debug, Clone, Default)]
pub struct Add;

impl Add {
    /// Element-wise sum of two inputs.
    pub fn new() -> Box<dyn Function> {
        Box::new(Self)
    }
}

impl Function for Add {
    fn run(&mut self, inps: &[&GeneralTensor]) -> Result<Tensor<f32>, TensorError> {
        expect_inputs(inps, 2, "Add")?;
        inps[0].as_float()? + inps[1].as_float()?
    }

    /// Both inputs receive the output gradient unchanged.
    fn grad(
        &self,
        inps: &[&GeneralTensor],
        out_grad: &Tensor<f32>,
    ) -> Result<Vec<Tensor<f32>>, TensorError> {
        expect_inputs(inps, 2, "Add::grad")?;
        Ok(vec![out_grad.clone(), out_grad.clone()])
    }
}
