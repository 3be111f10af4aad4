use super::{expect_inputs, Function};
use crate::tensor::*;
use rayon::prelude::*;

const EPSILON: f32 = 1e-5;

/// Layer normalization over the innermost dimension.
///
/// Inputs: `[x, coeff, bias]` where `coeff` and `bias` have the size of the
/// innermost dimension of `x`.
#[derive(Debug, Clone)]
pub struct LayerNorm {
    norm: Tensor<f32>,
    inv_std: Vec<f32>,
}
impl LayerNorm {
    /// Normalizes the innermost dimension, then scales and shifts it.
    pub fn new() -> Box<dyn Function> {
        Box::new(Self {
            norm: Tensor::scalar(0.),
            inv_std: Vec::new(),
        })
    }
}

impl Function for LayerNorm {
    fn run(&mut self, inps: &[&GeneralTensor]) -> Result<Tensor<f32>, TensorError> {
        expect_inputs(inps, 3, "LayerNorm")?;
        let x = inps[0].as_float()?;
        let n = *x
            .shape()
            .last()
            .ok_or_else(|| TensorError::UnexpectedShape(Vec::new()))?;
        if n == 0 {
            return Err(TensorError::UnexpectedShape(x.shape().to_vec()));
        }
        let (rows, inv_std): (Vec<Vec<f32>>, Vec<f32>) = x
            .blob()
            .par_chunks(n)
            .map(|l| {
                let avg = l.iter().sum::<f32>() / n as f32;
                let var = l.iter().map(|f| (f - avg).powi(2)).sum::<f32>() / n as f32;
                let inv = 1. / (var + EPSILON).sqrt();
                (l.iter().map(|v| (v - avg) * inv).collect(), inv)
            })
            .unzip();
        self.norm = Tensor::raw(x.shape(), rows.into_iter().flatten().collect())?;
        self.inv_std = inv_std;
        &(&self.norm * inps[1].as_float()?)? + inps[2].as_float()?
    }
    fn grad(
        &self,
        inps: &[&GeneralTensor],
        out_grad: &Tensor<f32>,
    ) -> Result<Vec<Tensor<f32>>, TensorError> {
        expect_inputs(inps, 3, "LayerNorm::grad")?;
        let n = *self
            .norm
            .shape()
            .last()
            .ok_or_else(|| TensorError::UnexpectedShape(Vec::new()))?;
        // dx = inv_std * (dy - mean(dy) - norm * mean(dy * norm)), dy = out_grad * coeff
        let dy = (out_grad * inps[1].as_float()?)?;
        let dx = dy
            .blob()
            .par_chunks(n)
            .zip(self.norm.blob().par_chunks(n))
            .zip(self.inv_std.par_iter())
            .flat_map_iter(|((dy, norm), inv)| {
                let mean_dy = dy.iter().sum::<f32>() / n as f32;
                let mean_dy_norm = dy.iter().zip(norm).map(|(d, x)| d * x).sum::<f32>() / n as f32;
                dy.iter()
                    .zip(norm)
                    .map(move |(d, x)| inv * (d - mean_dy - x * mean_dy_norm))
                    .collect::<Vec<_>>()
            })
            .collect();
        Ok(vec![
            Tensor::raw(out_grad.shape(), dx)?,
            (out_grad * &self.norm)?,
            out_grad.clone(),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::funcs::gradcheck;

    fn inputs() -> Vec<GeneralTensor> {
        let mut rng = rand::thread_rng();
        vec![
            GeneralTensor::Float(Tensor::<f32>::rand(&mut rng, &[2, 3, 5]).map_values(|v| v * 50.)),
            GeneralTensor::Float(Tensor::<f32>::rand(&mut rng, &[5]).map_values(|v| 1. + v * 10.)),
            GeneralTensor::Float(Tensor::<f32>::rand(&mut rng, &[5])),
        ]
    }

    #[test]
    fn test_layer_norm_normalizes() {
        let x = GeneralTensor::Float(Tensor::raw(&[1, 4], vec![1., 2., 3., 4.]).unwrap());
        let coeff = GeneralTensor::Float(Tensor::ones(&[4]));
        let bias = GeneralTensor::Float(Tensor::zeros(&[4]));
        let out = LayerNorm::new().run(&[&x, &coeff, &bias]).unwrap();
        assert!(out.blob().iter().sum::<f32>().abs() < 1e-5);
        let var = out.blob().iter().map(|v| v * v).sum::<f32>() / 4.;
        assert!((var - 1.).abs() < 1e-3);
    }

    #[test]
    fn test_layer_norm_grad_input() {
        gradcheck::check(LayerNorm::new, &inputs(), 0, 3e-2);
    }

    #[test]
    fn test_layer_norm_grad_coeff() {
        let inputs = inputs();
        let refs = inputs.iter().collect::<Vec<_>>();
        let mut f = LayerNorm::new();
        let out = f.run(&refs).unwrap();
        let grads = f.grad(&refs, &Tensor::ones(out.shape())).unwrap();
        // Per-row coefficient gradients are the normalized values themselves.
        assert_eq!(grads[1].shape(), &[2, 3, 5]);
        assert_eq!(grads[2], Tensor::ones(&[2, 3, 5]));
    }
}
