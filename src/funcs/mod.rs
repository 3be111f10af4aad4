//! Differentiable building blocks recorded by the computation graph.

mod add;
mod cat;
mod coeff;
mod crossentropy;
mod dropout;
mod embedding;
mod layer_norm;
mod mask;
mod matmul;
mod relu;
mod softmax;
mod transpose;

pub use add::*;
pub use cat::*;
pub use coeff::*;
pub use crossentropy::*;
pub use dropout::*;
pub use embedding::*;
pub use layer_norm::*;
pub use mask::*;
pub use matmul::*;
pub use relu::*;
pub use softmax::*;
pub use transpose::*;

use crate::tensor::{GeneralTensor, Tensor, TensorError};

/// A node of the computation graph.
///
/// `run` computes the output from the inputs and may cache whatever the
/// backward pass needs; `grad` maps the gradient of the output to one
/// gradient per input, in input order. Gradients may carry extra leading
/// dimensions when an input was broadcast; the graph folds them back.
pub trait Function: std::fmt::Debug + Send + Sync {
    /// Computes the output of the function.
    fn run(&mut self, inps: &[&GeneralTensor]) -> Result<Tensor<f32>, TensorError>;
    /// Gradients with respect to each input, given the output gradient.
    fn grad(
        &self,
        inps: &[&GeneralTensor],
        out_grad: &Tensor<f32>,
    ) -> Result<Vec<Tensor<f32>>, TensorError>;
}

pub(crate) fn expect_inputs(
    inps: &[&GeneralTensor],
    expected: usize,
    func_name: &str,
) -> Result<(), TensorError> {
    if inps.len() == expected {
        Ok(())
    } else {
        Err(TensorError::UnexpectedInputCount {
            expected,
            got: inps.len(),
            func_name: func_name.to_string(),
        })
    }
}
