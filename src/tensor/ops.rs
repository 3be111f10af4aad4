use super::*;
use std::ops::{Add, BitXor, Mul, Not};

/// Element-wise combination. Shapes must be equal, or one must be a suffix
/// of the other, in which case the shorter operand is repeated over the
/// leading dimensions of the longer one (scalars broadcast everywhere).
fn combine<V, F>(lhs: &Tensor<V>, rhs: &Tensor<V>, f: F) -> Result<Tensor<V>, TensorError>
where
    V: TensorElement,
    F: Fn(V, V) -> V + Sync + Send,
{
    let (l, r) = (lhs.shape(), rhs.shape());
    let blob = if l == r {
        lhs.blob()
            .par_iter()
            .zip(rhs.blob().par_iter())
            .map(|(a, b)| f(*a, *b))
            .collect()
    } else if l.ends_with(r) {
        let n = rhs.size();
        lhs.blob()
            .par_iter()
            .enumerate()
            .map(|(i, a)| f(*a, rhs.blob()[i % n]))
            .collect()
    } else if r.ends_with(l) {
        let n = lhs.size();
        rhs.blob()
            .par_iter()
            .enumerate()
            .map(|(i, b)| f(lhs.blob()[i % n], *b))
            .collect()
    } else {
        return Err(TensorError::ShapeMismatch {
            lhs: l.to_vec(),
            rhs: r.to_vec(),
        });
    };
    let shape = if l.len() >= r.len() { l } else { r };
    Tensor::raw(shape, blob)
}

/// Batched matrix product `[.., m, k] x [.., k, n]`. A two-dimensional
/// right-hand side is shared by every matrix of the left-hand batch.
fn matmul(a: &Tensor<f32>, b: &Tensor<f32>) -> Result<Tensor<f32>, TensorError> {
    let mismatch = || TensorError::ShapeMismatch {
        lhs: a.shape().to_vec(),
        rhs: b.shape().to_vec(),
    };
    if a.dim() < 2 || b.dim() < 2 {
        return Err(mismatch());
    }
    let (m, k) = (a.shape()[a.dim() - 2], a.shape()[a.dim() - 1]);
    let (k2, n) = (b.shape()[b.dim() - 2], b.shape()[b.dim() - 1]);
    let a_batch = &a.shape()[..a.dim() - 2];
    let b_batch = &b.shape()[..b.dim() - 2];
    let shared_rhs = b_batch.is_empty();
    if k != k2 || (!shared_rhs && a_batch != b_batch) {
        return Err(mismatch());
    }

    let mut out_shape = a_batch.to_vec();
    out_shape.extend([m, n]);
    let mut blob = vec![0.; out_shape.iter().product()];
    if n > 0 {
        let (a_blob, b_blob) = (a.blob(), b.blob());
        blob.par_chunks_mut(n).enumerate().for_each(|(row, out)| {
            let b_offset = if shared_rhs { 0 } else { (row / m) * k * n };
            let a_row = &a_blob[row * k..(row + 1) * k];
            for (kk, a_ik) in a_row.iter().enumerate() {
                let b_row = &b_blob[b_offset + kk * n..b_offset + (kk + 1) * n];
                for (o, b_kj) in out.iter_mut().zip(b_row) {
                    *o += a_ik * b_kj;
                }
            }
        });
    }
    Tensor::raw(&out_shape, blob)
}

impl<V: TensorElement + Add<Output = V>> Add for &Tensor<V> {
    type Output = Result<Tensor<V>, TensorError>;
    fn add(self, other: &Tensor<V>) -> Self::Output {
        combine(self, other, |a, b| a + b)
    }
}

impl<V: TensorElement + Mul<Output = V>> Mul for &Tensor<V> {
    type Output = Result<Tensor<V>, TensorError>;
    fn mul(self, other: &Tensor<V>) -> Self::Output {
        combine(self, other, |a, b| a * b)
    }
}

impl BitXor for &Tensor<f32> {
    type Output = Result<Tensor<f32>, TensorError>;
    fn bitxor(self, other: &Tensor<f32>) -> Self::Output {
        matmul(self, other)
    }
}

impl Not for &Tensor<bool> {
    type Output = Tensor<bool>;
    fn not(self) -> Self::Output {
        self.map_values(|b| !b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broadcast_add() {
        let a = Tensor::raw(&[2, 2, 3], (0..12).map(|v| v as f32).collect()).unwrap();
        let bias = Tensor::vector(&[10., 20., 30.]);
        let out = (&a + &bias).unwrap();
        assert_eq!(out.shape(), &[2, 2, 3]);
        assert_eq!(&out.blob()[..6], &[10., 21., 32., 13., 24., 35.]);
        let scaled = (&Tensor::scalar(2.) * &a).unwrap();
        assert_eq!(scaled.blob()[11], 22.);
        assert!((&a + &Tensor::vector(&[1., 2.])).is_err());
    }

    #[test]
    fn test_matmul_shared_rhs() {
        let a = Tensor::raw(&[2, 1, 2], vec![1., 2., 3., 4.]).unwrap();
        let w = Tensor::raw(&[2, 2], vec![1., 0., 0., 2.]).unwrap();
        let out = (&a ^ &w).unwrap();
        assert_eq!(out.shape(), &[2, 1, 2]);
        assert_eq!(out.blob(), &[1., 4., 3., 8.]);
    }

    #[test]
    fn test_matmul_batched() {
        let a = Tensor::raw(&[2, 1, 2], vec![1., 2., 3., 4.]).unwrap();
        let b = Tensor::raw(&[2, 2, 1], vec![1., 1., 2., 0.]).unwrap();
        let out = (&a ^ &b).unwrap();
        assert_eq!(out.shape(), &[2, 1, 1]);
        assert_eq!(out.blob(), &[3., 6.]);
        let bad = Tensor::raw(&[3, 2, 1], vec![0.; 6]).unwrap();
        assert!((&a ^ &bad).is_err());
    }
}
