use crate::tensor::{Tensor, TensorError, TensorOps};
use rayon::prelude::*;
use std::collections::HashMap;
use std::fmt;

/// Persistent state of an optimizer across training steps.
///
/// Holds the step count and any optimizer-specific tensors (first and second
/// moments for AdamW), keyed by `"{param}_m"` / `"{param}_v"`.
#[derive(Debug, Clone, Default)]
pub struct OptimizerState {
    /// Number of optimization steps taken so far.
    pub step: usize,
    /// Optimizer-specific state tensors.
    pub state: HashMap<String, Tensor<f32>>,
}

/// Update rule for model parameters.
///
/// Optimizers themselves are stateless; everything that evolves between
/// steps lives in [`OptimizerState`].
pub trait Optimizer: Clone + Send + Sync + fmt::Debug {
    /// Performs a single optimization step.
    ///
    /// `params` maps each parameter name to the parameter tensor and its
    /// gradient.
    fn step(
        &self,
        params: HashMap<String, (&mut Tensor<f32>, &Tensor<f32>)>,
        optimizer_state: &mut OptimizerState,
        learning_rate: f32,
    ) -> Result<(), TensorError>;
}

const DEFAULT_EPSILON: f32 = 1e-8;

/// Adam with decoupled weight decay (<https://arxiv.org/abs/1711.05101>).
#[derive(Debug, Clone)]
pub struct AdamW {
    /// Decay rate of the first moment.
    pub beta1: f32,
    /// Decay rate of the second moment.
    pub beta2: f32,
    /// Decoupled weight decay factor.
    pub weight_decay: f32,
    /// Added to the denominator for stability.
    pub epsilon: f32,
}

impl AdamW {
    /// AdamW with explicit hyperparameters.
    pub const fn new(beta1: f32, beta2: f32, weight_decay: f32, epsilon: f32) -> Self {
        Self {
            beta1,
            beta2,
            weight_decay,
            epsilon,
        }
    }

    /// Default moments and epsilon with a custom weight decay.
    pub fn with_weight_decay(weight_decay: f32) -> Self {
        Self {
            weight_decay,
            ..Self::default()
        }
    }
}

impl Default for AdamW {
    fn default() -> Self {
        Self::new(0.9, 0.999, 0.01, DEFAULT_EPSILON)
    }
}

impl Optimizer for AdamW {
    fn step(
        &self,
        params: HashMap<String, (&mut Tensor<f32>, &Tensor<f32>)>,
        optimizer_state: &mut OptimizerState,
        learning_rate: f32,
    ) -> Result<(), TensorError> {
        let current_step = optimizer_state.step + 1;
        let bias_correction1 = 1.0 - self.beta1.powi(current_step as i32);
        let bias_correction2 = 1.0 - self.beta2.powi(current_step as i32);

        let state = &optimizer_state.state;
        let updated_states = params
            .into_par_iter()
            .map(|(name, (param, grad))| {
                let moment = |key: &str| match state.get(key) {
                    Some(t) if t.shape() == param.shape() => Ok(t.clone()),
                    Some(t) => Err(TensorError::ShapeMismatch {
                        lhs: param.shape().to_vec(),
                        rhs: t.shape().to_vec(),
                    }),
                    None => Ok(Tensor::zeros(param.shape())),
                };
                if grad.shape() != param.shape() {
                    return Err(TensorError::ShapeMismatch {
                        lhs: param.shape().to_vec(),
                        rhs: grad.shape().to_vec(),
                    });
                }
                let m_key = format!("{name}_m");
                let v_key = format!("{name}_v");
                let mut m = moment(&m_key)?;
                let mut v = moment(&v_key)?;

                for (((p, g), m), v) in param
                    .blob_mut()
                    .iter_mut()
                    .zip(grad.blob())
                    .zip(m.blob_mut().iter_mut())
                    .zip(v.blob_mut().iter_mut())
                {
                    *p -= learning_rate * self.weight_decay * *p;
                    *m = self.beta1 * *m + (1.0 - self.beta1) * g;
                    *v = self.beta2 * *v + (1.0 - self.beta2) * g * g;
                    let m_hat = *m / bias_correction1;
                    let v_hat = *v / bias_correction2;
                    *p -= learning_rate * m_hat / (v_hat.sqrt() + self.epsilon);
                }

                Ok([(m_key, m), (v_key, v)])
            })
            .collect::<Result<Vec<_>, TensorError>>()?;

        optimizer_state
            .state
            .extend(updated_states.into_iter().flatten());
        optimizer_state.step = current_step;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_step_moves_by_learning_rate() {
        let opt = AdamW::new(0.9, 0.999, 0.0, 1e-8);
        let mut state = OptimizerState::default();
        let mut w = Tensor::vector(&[1.0, -1.0]);
        let g = Tensor::vector(&[0.5, -2.0]);
        let mut params = HashMap::new();
        params.insert("w".to_string(), (&mut w, &g));
        opt.step(params, &mut state, 0.1).unwrap();
        // Bias-corrected first step is lr * sign(grad).
        assert!((w.blob()[0] - 0.9).abs() < 1e-5);
        assert!((w.blob()[1] + 0.9).abs() < 1e-5);
        assert_eq!(state.step, 1);
        assert!(state.state.contains_key("w_m"));
        assert!(state.state.contains_key("w_v"));
    }

    #[test]
    fn test_weight_decay_without_gradient() {
        let opt = AdamW::with_weight_decay(0.5);
        let mut state = OptimizerState::default();
        let mut w = Tensor::vector(&[2.0]);
        let g = Tensor::vector(&[0.0]);
        let mut params = HashMap::new();
        params.insert("w".to_string(), (&mut w, &g));
        opt.step(params, &mut state, 0.1).unwrap();
        assert!((w.blob()[0] - 1.9).abs() < 1e-6);
    }
}
