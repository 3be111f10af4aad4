use super::{expect_inputs, Function};
use crate::tensor::*;
use rayon::prelude::*;

/// Per-position cross-entropy between logits `[.., classes]` and integer
/// targets `[..]`. The output has the shape of the targets; the graph takes
/// the mean when it seeds the backward pass.
#[derive(Debug, Clone)]
pub struct CrossEntropy;
impl CrossEntropy {
    /// Per-row cross-entropy of logits against target ids.
    pub fn new() -> Box<dyn Function> {
        Box::new(Self)
    }
}

fn rows<'a>(
    logits: &'a Tensor<f32>,
    target: &'a Tensor<usize>,
) -> Result<(usize, Vec<(&'a [f32], usize)>), TensorError> {
    let classes = *logits
        .shape()
        .last()
        .ok_or_else(|| TensorError::UnexpectedShape(Vec::new()))?;
    if classes == 0 || logits.shape()[..logits.dim() - 1] != *target.shape() {
        return Err(TensorError::ShapeMismatch {
            lhs: logits.shape().to_vec(),
            rhs: target.shape().to_vec(),
        });
    }
    let pairs = logits
        .blob()
        .chunks(classes)
        .zip(target.blob().iter().copied())
        .map(|(o, t)| {
            if t < classes {
                Ok((o, t))
            } else {
                Err(TensorError::IndexOutOfBounds {
                    index: t,
                    len: classes,
                })
            }
        })
        .collect::<Result<Vec<_>, TensorError>>()?;
    Ok((classes, pairs))
}

fn log_sum_exp(o: &[f32]) -> f32 {
    let max = o.iter().fold(f32::NEG_INFINITY, |a, b| a.max(*b));
    max + o.iter().map(|f| (f - max).exp()).sum::<f32>().ln()
}

impl Function for CrossEntropy {
    fn run(&mut self, inps: &[&GeneralTensor]) -> Result<Tensor<f32>, TensorError> {
        expect_inputs(inps, 2, "CrossEntropy")?;
        let target = inps[1].as_usize()?;
        let (_, pairs) = rows(inps[0].as_float()?, target)?;
        let losses = pairs
            .par_iter()
            .map(|(o, t)| log_sum_exp(o) - o[*t])
            .collect();
        Tensor::raw(target.shape(), losses)
    }
    fn grad(
        &self,
        inps: &[&GeneralTensor],
        out_grad: &Tensor<f32>,
    ) -> Result<Vec<Tensor<f32>>, TensorError> {
        let logits = inps[0].as_float()?;
        let (_, pairs) = rows(logits, inps[1].as_usize()?)?;
        let data = pairs
            .par_iter()
            .zip(out_grad.blob().par_iter())
            .flat_map_iter(|((o, t), g)| {
                let lse = log_sum_exp(o);
                o.iter()
                    .enumerate()
                    .map(move |(c, f)| {
                        let p = (f - lse).exp();
                        g * if c == *t { p - 1. } else { p }
                    })
                    .collect::<Vec<_>>()
            })
            .collect();
        Ok(vec![Tensor::raw(logits.shape(), data)?, Tensor::scalar(0.)])
    }
}
