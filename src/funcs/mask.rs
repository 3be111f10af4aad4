use super::{expect_inputs, Function};
use crate::tensor::*;

/// Overwrites the positions where `mask` is true with a constant. The mask
/// covers the innermost dimensions of the input and is repeated over the
/// rest of them.
#[derive(Debug, Clone)]
pub struct Mask {
    mask: Tensor<bool>,
    keep: Tensor<f32>,
    value: f32,
}
impl Mask {
    /// Replaces every position where `mask` is true with `value`.
    pub fn new(mask: Tensor<bool>, value: f32) -> Box<dyn Function> {
        Box::new(Self {
            keep: mask.map_values(|m| if m { 0. } else { 1. }),
            mask,
            value,
        })
    }
}

impl Function for Mask {
    fn run(&mut self, inps: &[&GeneralTensor]) -> Result<Tensor<f32>, TensorError> {
        expect_inputs(inps, 1, "Mask")?;
        inps[0].as_float()?.map(self.mask.dim(), |t| {
            if t.shape() != self.mask.shape() {
                return Err(TensorError::ShapeMismatch {
                    lhs: t.shape().to_vec(),
                    rhs: self.mask.shape().to_vec(),
                });
            }
            let dat = t
                .blob()
                .iter()
                .zip(self.mask.blob())
                .map(|(v, m)| if *m { self.value } else { *v })
                .collect();
            Tensor::raw(t.shape(), dat)
        })
    }
    fn grad(
        &self,
        _inps: &[&GeneralTensor],
        out_grad: &Tensor<f32>,
    ) -> Result<Vec<Tensor<f32>>, TensorError> {
        Ok(vec![(out_grad * &self.keep)?])
    }
}
