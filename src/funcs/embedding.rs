use super::{expect_inputs, Function};
use crate::tensor::*;

/// Table lookup: inputs are `[ids, table]`, output has the shape of `ids`
/// followed by the row width of `table`.
#[derive(Debug, Clone)]
pub struct Embedding;
impl Embedding {
    /// Looks up rows of a table (second input) by id (first input).
    pub fn new() -> Box<dyn Function> {
        Box::new(Self)
    }
}
impl Function for Embedding {
    fn run(&mut self, inps: &[&GeneralTensor]) -> Result<Tensor<f32>, TensorError> {
        expect_inputs(inps, 2, "Embedding")?;
        let inp = inps[0].as_usize()?;
        let emb = inps[1].as_float()?;
        if emb.dim() != 2 {
            return Err(TensorError::UnexpectedShape(emb.shape().to_vec()));
        }
        inp.map(0, |s| Ok(emb.get(s.scalar()?)?.to_tensor()))
    }
    fn grad(
        &self,
        inps: &[&GeneralTensor],
        out_grad: &Tensor<f32>,
    ) -> Result<Vec<Tensor<f32>>, TensorError> {
        let inp = inps[0].as_usize()?;
        let table_shape = inps[1].as_float()?.shape();
        let width = table_shape[1];
        let mut grad = Tensor::<f32>::zeros(table_shape);
        if width == 0 {
            return Ok(vec![Tensor::scalar(0.), grad]);
        }
        let rows = grad.blob_mut();
        for (ch, embed) in inp.blob().iter().zip(out_grad.blob().chunks(width)) {
            let row = &mut rows[ch * width..(ch + 1) * width];
            for (r, e) in row.iter_mut().zip(embed) {
                *r += e;
            }
        }
        Ok(vec![Tensor::scalar(0.), grad])
    }
}
