mod elements;
mod error;
mod ops;
pub use elements::*;
pub use error::*;

use rand::Rng;
use rand_distr::StandardNormal;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Standard deviation of freshly initialized weights.
pub const INIT_STD: f32 = 0.02;

/// Dense row-major n-dimensional array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tensor<V: TensorElement> {
    blob: Vec<V>,
    shape: Vec<usize>,
}

/// Borrowed, read-only window over a contiguous part of a [`Tensor`].
#[derive(Debug, Clone)]
pub struct TensorView<'a, V: TensorElement> {
    blob: &'a [V],
    shape: Vec<usize>,
}

/// A graph slot holds either activations/parameters or token ids.
#[derive(Debug, Clone, PartialEq)]
pub enum GeneralTensor {
    /// Floating point data.
    Float(Tensor<f32>),
    /// Token ids and positions.
    Usize(Tensor<usize>),
}

impl GeneralTensor {
    /// Borrows the float payload.
    pub fn as_float(&self) -> Result<&Tensor<f32>, TensorError> {
        match self {
            Self::Float(t) => Ok(t),
            Self::Usize(_) => Err(TensorError::UnexpectedType { expected: "f32" }),
        }
    }
    /// Mutably borrows the float payload.
    pub fn as_float_mut(&mut self) -> Result<&mut Tensor<f32>, TensorError> {
        match self {
            Self::Float(t) => Ok(t),
            Self::Usize(_) => Err(TensorError::UnexpectedType { expected: "f32" }),
        }
    }
    /// Borrows the id payload.
    pub fn as_usize(&self) -> Result<&Tensor<usize>, TensorError> {
        match self {
            Self::Usize(t) => Ok(t),
            Self::Float(_) => Err(TensorError::UnexpectedType { expected: "usize" }),
        }
    }
    /// Shape of whichever payload is stored.
    pub fn shape(&self) -> &[usize] {
        match self {
            Self::Float(t) => t.shape(),
            Self::Usize(t) => t.shape(),
        }
    }
}

/// Read-only operations shared by owned tensors and views.
pub trait TensorOps<V: TensorElement>: Sized + Send + Sync {
    /// Dimensions, outermost first.
    fn shape(&self) -> &[usize];
    /// Underlying elements in row-major order.
    fn blob(&self) -> &[V];

    /// Number of dimensions.
    fn dim(&self) -> usize {
        self.shape().len()
    }
    /// Total number of elements.
    fn size(&self) -> usize {
        self.shape().iter().product()
    }
    /// Length of the outermost dimension. Scalars have none.
    fn len(&self) -> Result<usize, TensorError> {
        self.shape()
            .first()
            .copied()
            .ok_or_else(|| TensorError::UnexpectedShape(Vec::new()))
    }
    /// Value of a zero-dimensional tensor.
    fn scalar(&self) -> Result<V, TensorError> {
        if self.dim() == 0 {
            Ok(self.blob()[0])
        } else {
            Err(TensorError::UnexpectedShape(self.shape().to_vec()))
        }
    }
    /// Copies the viewed elements into a new owned tensor.
    fn to_tensor(&self) -> Tensor<V> {
        Tensor {
            blob: self.blob().to_vec(),
            shape: self.shape().to_vec(),
        }
    }
    /// Same elements under a different shape.
    fn reshape(&self, shape: &[usize]) -> Result<TensorView<'_, V>, TensorError> {
        if shape.iter().product::<usize>() != self.size() {
            return Err(TensorError::InvalidBlob {
                shape: shape.to_vec(),
                got: self.size(),
            });
        }
        Ok(TensorView {
            blob: self.blob(),
            shape: shape.to_vec(),
        })
    }
    /// Keeps the `dims` innermost dimensions and folds everything to their left
    /// into a single leading dimension (which is 1 when there is nothing to fold).
    fn keep_right(&self, dims: usize) -> Result<TensorView<'_, V>, TensorError> {
        if dims > self.dim() {
            return Err(TensorError::UnexpectedShape(self.shape().to_vec()));
        }
        let split = self.dim() - dims;
        let mut new_shape = vec![self.shape()[..split].iter().product()];
        new_shape.extend_from_slice(&self.shape()[split..]);
        self.reshape(&new_shape)
    }
    /// Sub-tensor at index `ind` of the outermost dimension.
    fn get(&self, ind: usize) -> Result<TensorView<'_, V>, TensorError> {
        let len = self.len()?;
        if ind >= len {
            return Err(TensorError::IndexOutOfBounds { index: ind, len });
        }
        let sub_size = self.size() / len;
        Ok(TensorView {
            blob: &self.blob()[ind * sub_size..(ind + 1) * sub_size],
            shape: self.shape()[1..].to_vec(),
        })
    }
    /// Every sub-tensor along the outermost dimension.
    fn inners(&self) -> Result<Vec<TensorView<'_, V>>, TensorError> {
        (0..self.len()?).map(|i| self.get(i)).collect()
    }
    /// Applies `f` to every element.
    fn map_values<W: TensorElement, F: Fn(V) -> W + Sync + Send>(&self, f: F) -> Tensor<W> {
        Tensor {
            blob: self.blob().par_iter().map(|v| f(*v)).collect(),
            shape: self.shape().to_vec(),
        }
    }
    /// Applies `f` to every sub-tensor made of the `dim` innermost dimensions
    /// and stitches the results back together behind the untouched outer
    /// dimensions.
    fn map<W, F>(&self, dim: usize, f: F) -> Result<Tensor<W>, TensorError>
    where
        W: TensorElement,
        F: Fn(TensorView<'_, V>) -> Result<Tensor<W>, TensorError> + Sync + Send,
    {
        let results = self
            .keep_right(dim)?
            .inners()?
            .into_par_iter()
            .map(|v| f(v))
            .collect::<Result<Vec<_>, TensorError>>()?;
        let inner_shape = match results.first() {
            Some(t) => t.shape.clone(),
            None => return Err(TensorError::UnexpectedShape(self.shape().to_vec())),
        };
        if results.iter().any(|t| t.shape != inner_shape) {
            return Err(TensorError::UnexpectedShape(inner_shape));
        }
        let mut out_shape = self.shape()[..self.dim() - dim].to_vec();
        out_shape.extend(&inner_shape);
        Ok(Tensor {
            blob: results.into_iter().flat_map(|t| t.blob).collect(),
            shape: out_shape,
        })
    }
    /// Swaps the two innermost dimensions.
    fn transpose(&self) -> Result<Tensor<V>, TensorError> {
        if self.dim() < 2 {
            return Err(TensorError::UnexpectedShape(self.shape().to_vec()));
        }
        self.map(2, |m| {
            let (d0, d1) = (m.shape()[0], m.shape()[1]);
            let blob = m.blob();
            let mut dat = Vec::with_capacity(d0 * d1);
            for j in 0..d1 {
                for i in 0..d0 {
                    dat.push(blob[i * d1 + j]);
                }
            }
            Tensor::raw(&[d1, d0], dat)
        })
    }
}

impl<V: TensorElement> TensorOps<V> for Tensor<V> {
    fn shape(&self) -> &[usize] {
        &self.shape
    }
    fn blob(&self) -> &[V] {
        &self.blob
    }
}

impl<V: TensorElement> TensorOps<V> for TensorView<'_, V> {
    fn shape(&self) -> &[usize] {
        &self.shape
    }
    fn blob(&self) -> &[V] {
        self.blob
    }
}

impl<V: TensorElement> Tensor<V> {
    /// Wraps `blob`, which must hold exactly as many elements as `shape` asks for.
    pub fn raw(shape: &[usize], blob: Vec<V>) -> Result<Self, TensorError> {
        if shape.iter().product::<usize>() != blob.len() {
            return Err(TensorError::InvalidBlob {
                shape: shape.to_vec(),
                got: blob.len(),
            });
        }
        Ok(Self {
            blob,
            shape: shape.to_vec(),
        })
    }
    /// Zero-dimensional tensor.
    pub fn scalar(v: V) -> Self {
        Self {
            blob: vec![v],
            shape: vec![],
        }
    }
    /// One-dimensional tensor copied from `v`.
    pub fn vector(v: &[V]) -> Self {
        Self {
            blob: v.to_vec(),
            shape: vec![v.len()],
        }
    }
    /// Tensor of `shape` filled with `value`.
    pub fn constant(shape: &[usize], value: V) -> Self {
        Self {
            blob: vec![value; shape.iter().product()],
            shape: shape.to_vec(),
        }
    }
    /// Tensor of zeros.
    pub fn zeros(shape: &[usize]) -> Self {
        Self::constant(shape, V::zero())
    }
    /// Tensor of ones.
    pub fn ones(shape: &[usize]) -> Self {
        Self::constant(shape, V::one())
    }
    /// `n x n` matrix with ones on and below the diagonal.
    pub fn tril(n: usize) -> Self {
        Self {
            blob: (0..n * n)
                .map(|i| if i % n <= i / n { V::one() } else { V::zero() })
                .collect(),
            shape: vec![n, n],
        }
    }
    /// Top-left `n x n` corner of a square matrix.
    pub fn crop(&self, n: usize) -> Result<Self, TensorError> {
        if self.dim() != 2 || self.shape[0] != self.shape[1] || n > self.shape[0] {
            return Err(TensorError::UnexpectedShape(self.shape.clone()));
        }
        let side = self.shape[0];
        let blob = self
            .blob
            .chunks(side)
            .take(n)
            .flat_map(|row| row[..n].iter().copied())
            .collect();
        Self::raw(&[n, n], blob)
    }
    /// Concatenates equally shaped tensors along their innermost dimension.
    pub fn cat<T: TensorOps<V>>(inps: &[&T]) -> Result<Self, TensorError> {
        let first = inps
            .first()
            .ok_or_else(|| TensorError::UnexpectedShape(Vec::new()))?;
        let shape = first.shape().to_vec();
        if let Some(other) = inps.iter().find(|t| t.shape() != shape.as_slice()) {
            return Err(TensorError::ShapeMismatch {
                lhs: shape,
                rhs: other.shape().to_vec(),
            });
        }
        let group_size = *shape
            .last()
            .ok_or_else(|| TensorError::UnexpectedShape(shape.clone()))?;
        let each_sz = first.size();
        let mut data = Vec::with_capacity(each_sz * inps.len());
        let mut offset = 0;
        while offset < each_sz {
            for inp in inps {
                data.extend(&inp.blob()[offset..offset + group_size]);
            }
            offset += group_size;
        }
        let mut target_shape = shape;
        if let Some(last) = target_shape.last_mut() {
            *last *= inps.len();
        }
        Self::raw(&target_shape, data)
    }
    /// Inverse of [`Tensor::cat`]: cuts the innermost dimension into `cnt` equal parts.
    pub fn split<T: TensorOps<V>>(inp: &T, cnt: usize) -> Result<Vec<Self>, TensorError> {
        let last = *inp
            .shape()
            .last()
            .ok_or_else(|| TensorError::UnexpectedShape(inp.shape().to_vec()))?;
        if cnt == 0 || last % cnt != 0 {
            return Err(TensorError::UnexpectedShape(inp.shape().to_vec()));
        }
        let group_size = last / cnt;
        let mut result = vec![Vec::with_capacity(inp.size() / cnt); cnt];
        if group_size > 0 {
            for (i, chunk) in inp.blob().chunks(group_size).enumerate() {
                result[i % cnt].extend_from_slice(chunk);
            }
        }
        let mut target_shape = inp.shape().to_vec();
        if let Some(last) = target_shape.last_mut() {
            *last = group_size;
        }
        result
            .into_iter()
            .map(|d| Self::raw(&target_shape, d))
            .collect()
    }
}

impl Tensor<f32> {
    /// Normally distributed values with standard deviation [`INIT_STD`].
    pub fn rand<R: Rng>(r: &mut R, shape: &[usize]) -> Self {
        Self {
            blob: (0..shape.iter().product::<usize>())
                .map(|_| r.sample::<f32, _>(StandardNormal) * INIT_STD)
                .collect(),
            shape: shape.to_vec(),
        }
    }
    pub(crate) fn blob_mut(&mut self) -> &mut [f32] {
        &mut self.blob
    }
    /// Mean of all elements.
    pub fn mean(&self) -> f32 {
        self.blob.iter().sum::<f32>() / self.blob.len() as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keep_right_and_get() {
        let t = Tensor::raw(&[2, 3, 2], (0..12).collect::<Vec<usize>>()).unwrap();
        let rows = t.keep_right(1).unwrap();
        assert_eq!(rows.shape(), &[6, 2]);
        assert_eq!(rows.get(4).unwrap().blob(), &[8, 9]);
        assert_eq!(t.keep_right(3).unwrap().shape(), &[1, 2, 3, 2]);
        assert!(t.get(2).is_err());
    }

    #[test]
    fn test_transpose_batched() {
        let t = Tensor::raw(&[2, 2, 3], (0..12).map(|v| v as f32).collect()).unwrap();
        let tt = t.transpose().unwrap();
        assert_eq!(tt.shape(), &[2, 3, 2]);
        assert_eq!(
            tt.blob(),
            &[0., 3., 1., 4., 2., 5., 6., 9., 7., 10., 8., 11.]
        );
    }

    #[test]
    fn test_tril_and_crop() {
        let t = Tensor::<bool>::tril(3);
        assert_eq!(
            t.blob(),
            &[true, false, false, true, true, false, true, true, true]
        );
        let c = t.crop(2).unwrap();
        assert_eq!(c.blob(), &[true, false, true, true]);
        assert!(t.crop(4).is_err());
    }

    #[test]
    fn test_cat_split() {
        let a = Tensor::raw(&[2, 2], vec![1., 2., 3., 4.]).unwrap();
        let b = Tensor::raw(&[2, 2], vec![5., 6., 7., 8.]).unwrap();
        let c = Tensor::cat(&[&a, &b]).unwrap();
        assert_eq!(c.shape(), &[2, 4]);
        assert_eq!(c.blob(), &[1., 2., 5., 6., 3., 4., 7., 8.]);
        let parts = Tensor::split(&c, 2).unwrap();
        assert_eq!(parts, vec![a, b]);
    }

    #[test]
    fn test_raw_rejects_bad_blob() {
        assert_eq!(
            Tensor::<f32>::raw(&[2, 2], vec![0.; 3]),
            Err(TensorError::InvalidBlob {
                shape: vec![2, 2],
                got: 3
            })
        );
    }
}
