use crate::funcs::Function;
use crate::optimizer::{Optimizer, OptimizerState};
use crate::tensor::*;
use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// Index of a slot in a [`Graph`].
pub type TensorId = usize;

/// Computation graph with reverse-mode differentiation.
///
/// Parameters are allocated once and survive [`Graph::reset`]. Every call to
/// [`Graph::call`] evaluates its function immediately and records it, so a
/// forward pass is simply a sequence of calls; [`Graph::backward_all`] then
/// walks the recording backwards.
pub trait Graph {
    /// Allocates a float slot. Parameters must be allocated before any
    /// activation is recorded.
    fn alloc(&mut self, t: Tensor<f32>, is_param: bool, name: String)
        -> Result<TensorId, GraphError>;
    /// Allocates a slot of token ids. Ids are never differentiated.
    fn alloc_usize(&mut self, t: Tensor<usize>, name: String) -> Result<TensorId, GraphError>;
    /// Replaces the value of a float slot; the shape must not change.
    fn load(&mut self, tensor_id: TensorId, tensor: &Tensor<f32>) -> Result<(), GraphError>;
    /// Sets every gradient to zero.
    fn zero_grad(&mut self);
    /// Name given to the slot at allocation.
    fn name_of(&self, id: TensorId) -> Result<&str, GraphError>;
    /// Current value of the slot.
    fn get(&self, id: TensorId) -> Result<&GeneralTensor, GraphError>;
    /// Accumulated gradient of the slot.
    fn get_grad(&self, id: TensorId) -> Result<&Tensor<f32>, GraphError>;
    /// Ids of the trainable slots, in allocation order.
    fn params(&self) -> &[TensorId];
    /// Evaluates `f` on the given slots and records it for the backward pass.
    fn call(&mut self, f: Box<dyn Function>, tensor_ids: &[TensorId])
        -> Result<TensorId, GraphError>;
    /// Back-propagates the mean of the tensor `id` and returns that mean.
    fn backward_all(&mut self, id: TensorId) -> Result<f32, GraphError>;
    /// Drops every activation and recorded computation, keeping parameters.
    fn reset(&mut self);
    /// Applies one optimizer step to every parameter.
    fn optimize<O: Optimizer>(
        &mut self,
        opt: &O,
        optimizer_state: &mut OptimizerState,
        learning_rate: f32,
    ) -> Result<(), GraphError>;
}

#[derive(Debug)]
struct Computation {
    out: TensorId,
    inps: Vec<TensorId>,
    func: Box<dyn Function>,
}

/// Graph evaluated on the CPU.
#[derive(Debug, Default)]
pub struct CpuGraph {
    tensors: Vec<GeneralTensor>,
    grads: Vec<Tensor<f32>>,
    names: Vec<String>,
    params: Vec<TensorId>,
    computations: Vec<Computation>,
}

/// Failures of graph bookkeeping or of the recorded functions.
#[derive(Error, Debug)]
pub enum GraphError {
    /// A recorded function failed.
    #[error("tensor error: {0}")]
    TensorError(#[from] TensorError),
    /// No slot has this id.
    #[error("tensor with id {0} not found")]
    TensorNotFound(TensorId),
    /// Parameters must be allocated before any activation.
    #[error("parameter '{0}' allocated after activations were recorded")]
    LateParameter(String),
    /// The tensor to back-propagate from has no elements.
    #[error("cannot back-propagate from an empty tensor")]
    EmptyLoss,
}

/// Adds `add` into the gradient slot of `id`, summing away any leading
/// dimensions the slot does not have. Id slots have no gradient.
fn accumulate(
    tensors: &[GeneralTensor],
    grads: &mut [Tensor<f32>],
    id: TensorId,
    add: &Tensor<f32>,
) -> Result<(), GraphError> {
    let shape = match tensors.get(id).ok_or(GraphError::TensorNotFound(id))? {
        GeneralTensor::Float(t) => t.shape(),
        GeneralTensor::Usize(_) => return Ok(()),
    };
    let grad = grads.get_mut(id).ok_or(GraphError::TensorNotFound(id))?;
    if !add.shape().ends_with(shape) {
        return Err(TensorError::ShapeMismatch {
            lhs: shape.to_vec(),
            rhs: add.shape().to_vec(),
        }
        .into());
    }
    let n = grad.size();
    if n == 0 {
        return Ok(());
    }
    let blob = grad.blob_mut();
    for (i, a) in add.blob().iter().enumerate() {
        blob[i % n] += a;
    }
    Ok(())
}

impl CpuGraph {
    /// An empty graph.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Graph for CpuGraph {
    fn alloc(
        &mut self,
        t: Tensor<f32>,
        is_param: bool,
        name: String,
    ) -> Result<TensorId, GraphError> {
        let id = self.tensors.len();
        if is_param {
            if self.params.len() != id {
                return Err(GraphError::LateParameter(name));
            }
            self.params.push(id);
        }
        self.grads.push(Tensor::zeros(t.shape()));
        self.tensors.push(GeneralTensor::Float(t));
        self.names.push(name);
        Ok(id)
    }
    fn alloc_usize(&mut self, t: Tensor<usize>, name: String) -> Result<TensorId, GraphError> {
        self.grads.push(Tensor::scalar(0.));
        self.tensors.push(GeneralTensor::Usize(t));
        self.names.push(name);
        Ok(self.tensors.len() - 1)
    }
    fn load(&mut self, tensor_id: TensorId, tensor: &Tensor<f32>) -> Result<(), GraphError> {
        let slot = self
            .tensors
            .get_mut(tensor_id)
            .ok_or(GraphError::TensorNotFound(tensor_id))?
            .as_float_mut()?;
        if slot.shape() != tensor.shape() {
            return Err(TensorError::ShapeMismatch {
                lhs: slot.shape().to_vec(),
                rhs: tensor.shape().to_vec(),
            }
            .into());
        }
        *slot = tensor.clone();
        Ok(())
    }
    fn zero_grad(&mut self) {
        self.grads.iter_mut().for_each(|t| {
            t.blob_mut().fill(0.);
        });
    }
    fn name_of(&self, id: TensorId) -> Result<&str, GraphError> {
        self.names
            .get(id)
            .map(String::as_str)
            .ok_or(GraphError::TensorNotFound(id))
    }
    fn get(&self, id: TensorId) -> Result<&GeneralTensor, GraphError> {
        self.tensors.get(id).ok_or(GraphError::TensorNotFound(id))
    }
    fn get_grad(&self, id: TensorId) -> Result<&Tensor<f32>, GraphError> {
        self.grads.get(id).ok_or(GraphError::TensorNotFound(id))
    }
    fn params(&self) -> &[TensorId] {
        &self.params
    }
    fn call(
        &mut self,
        mut f: Box<dyn Function>,
        tensor_ids: &[TensorId],
    ) -> Result<TensorId, GraphError> {
        let tensors = tensor_ids
            .iter()
            .map(|id| self.get(*id))
            .collect::<Result<Vec<_>, GraphError>>()?;
        let out = f.run(&tensors)?;
        let child = self.alloc(out, false, String::new())?;
        self.computations.push(Computation {
            out: child,
            inps: tensor_ids.to_vec(),
            func: f,
        });
        Ok(child)
    }
    fn backward_all(&mut self, id: TensorId) -> Result<f32, GraphError> {
        let output = self.get(id)?.as_float()?;
        if output.size() == 0 {
            return Err(GraphError::EmptyLoss);
        }
        let loss = output.mean();
        let seed = Tensor::constant(output.shape(), 1. / output.size() as f32);
        accumulate(&self.tensors, &mut self.grads, id, &seed)?;

        for comp in self.computations.iter().rev() {
            let inps = comp
                .inps
                .iter()
                .map(|id| self.tensors.get(*id).ok_or(GraphError::TensorNotFound(*id)))
                .collect::<Result<Vec<_>, GraphError>>()?;
            let grad_out = self
                .grads
                .get(comp.out)
                .ok_or(GraphError::TensorNotFound(comp.out))?;
            let grads = comp.func.grad(&inps, grad_out)?;
            for (id, grad) in comp.inps.iter().zip(grads.iter()) {
                accumulate(&self.tensors, &mut self.grads, *id, grad)?;
            }
        }

        Ok(loss)
    }
    fn reset(&mut self) {
        let keep = self.params.len();
        self.tensors.truncate(keep);
        self.grads.truncate(keep);
        self.names.truncate(keep);
        self.computations.clear();
    }
    fn optimize<O: Optimizer>(
        &mut self,
        opt: &O,
        optimizer_state: &mut OptimizerState,
        learning_rate: f32,
    ) -> Result<(), GraphError> {
        let is_param = self.params.iter().copied().collect::<HashSet<_>>();
        let params = self
            .tensors
            .iter_mut()
            .zip(self.grads.iter())
            .zip(self.names.iter())
            .enumerate()
            .filter(|(id, _)| is_param.contains(id))
            .map(|(_, ((tensor, grad), name))| Ok((name.clone(), (tensor.as_float_mut()?, grad))))
            .collect::<Result<HashMap<_, _>, GraphError>>()?;
        opt.step(params, optimizer_state, learning_rate)?;
        Ok(())
    }
}
