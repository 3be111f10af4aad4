/// Scalar types a [`Tensor`](super::Tensor) can hold.
pub trait TensorElement: Clone + Copy + Sized + Send + Sync + PartialEq + std::fmt::Debug {
    /// Additive identity.
    fn zero() -> Self;
    /// Multiplicative identity.
    fn one() -> Self;
}

impl TensorElement for f32 {
    fn zero() -> Self {
        0.
    }
    fn one() -> Self {
        1.
    }
}

impl TensorElement for usize {
    fn zero() -> Self {
        0
    }
    fn one() -> Self {
        1
    }
}

impl TensorElement for bool {
    fn zero() -> Self {
        false
    }
    fn one() -> Self {
        true
    }
}
