use super::{expect_inputs, Function};
use crate::tensor::*;
use rayon::prelude::*;

/// Softmax over the innermost dimension. Entries equal to negative infinity
/// get zero probability.
#[derive(Debug, Clone)]
pub struct Softmax {
    out: Tensor<f32>,
}
impl Softmax {
    /// Softmax over the innermost dimension.
    pub fn new() -> Box<dyn Function> {
        Box::new(Self {
            out: Tensor::scalar(0.),
        })
    }
}

pub(crate) fn softmax_row(row: &[f32]) -> Vec<f32> {
    let max = row.iter().fold(f32::NEG_INFINITY, |a, b| a.max(*b));
    if max == f32::NEG_INFINITY {
        return vec![0.; row.len()];
    }
    let exps = row.iter().map(|f| (f - max).exp()).collect::<Vec<_>>();
    let sum = exps.iter().sum::<f32>();
    exps.into_iter().map(|e| e / sum).collect()
}

impl Function for Softmax {
    fn run(&mut self, inps: &[&GeneralTensor]) -> Result<Tensor<f32>, TensorError> {
        expect_inputs(inps, 1, "Softmax")?;
        self.out = inps[0]
            .as_float()?
            .map(1, |l| Tensor::raw(l.shape(), softmax_row(l.blob())))?;
        Ok(self.out.clone())
    }
    fn grad(
        &self,
        _inps: &[&GeneralTensor],
        out_grad: &Tensor<f32>,
    ) -> Result<Vec<Tensor<f32>>, TensorError> {
        let n = *self
            .out
            .shape()
            .last()
            .ok_or_else(|| TensorError::UnexpectedShape(Vec::new()))?;
        if n == 0 {
            return Ok(vec![out_grad.clone()]);
        }
        // dx_i = s_i * (g_i - sum_j s_j g_j)
        let data = self
            .out
            .blob()
            .par_chunks(n)
            .zip(out_grad.blob().par_chunks(n))
            .flat_map_iter(|(s, g)| {
                let dot = s.iter().zip(g).map(|(s, g)| s * g).sum::<f32>();
                s.iter()
                    .zip(g)
                    .map(move |(s, g)| s * (g - dot))
                    .collect::<Vec<_>>()
            })
            .collect();
        Ok(vec![Tensor::raw(out_grad.shape(), data)?])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::funcs::gradcheck;

    #[test]
    fn test_softmax_rows_sum_to_one() {
        let inp = GeneralTensor::Float(
            Tensor::raw(&[2, 3], vec![1., 2., 3., f32::NEG_INFINITY, 0., 0.]).unwrap(),
        );
        let out = Softmax::new().run(&[&inp]).unwrap();
        let first = out.blob()[..3].iter().sum::<f32>();
        assert!((first - 1.).abs() < 1e-6);
        assert_eq!(out.blob()[3], 0.);
        assert!((out.blob()[4] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_softmax_grad() {
        let mut rng = rand::thread_rng();
        let inputs = [GeneralTensor::Float(
            Tensor::<f32>::rand(&mut rng, &[3, 4]).map_values(|v| v * 50.),
        )];
        gradcheck::check(Softmax::new, &inputs, 0, 2e-2);
    }
}
