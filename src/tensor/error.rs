use thiserror::Error;

/// Errors raised by tensor kernels and differentiable functions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TensorError {
    /// Two operands cannot be combined, even with broadcasting.
    #[error("incompatible tensor shapes {lhs:?} and {rhs:?}")]
    ShapeMismatch {
        /// Shape of the left operand.
        lhs: Vec<usize>,
        /// Shape of the right operand.
        rhs: Vec<usize>,
    },
    /// A tensor has a shape the operation cannot work with.
    #[error("unexpected tensor shape {0:?}")]
    UnexpectedShape(Vec<usize>),
    /// The number of elements does not match the requested shape.
    #[error("{got} elements do not fit shape {shape:?}")]
    InvalidBlob {
        /// Requested shape.
        shape: Vec<usize>,
        /// Number of elements supplied.
        got: usize,
    },
    /// Indexing past the end of a dimension.
    #[error("index {index} out of bounds for dimension of length {len}")]
    IndexOutOfBounds {
        /// Requested index.
        index: usize,
        /// Length of the indexed dimension.
        len: usize,
    },
    /// A float tensor was expected where an index tensor was found, or vice versa.
    #[error("expected a tensor of {expected} elements")]
    UnexpectedType {
        /// Element type that was expected.
        expected: &'static str,
    },
    /// A function received the wrong number of inputs.
    #[error("{func_name} expected {expected} inputs, got {got}")]
    UnexpectedInputCount {
        /// Expected number of inputs.
        expected: usize,
        /// Number of inputs received.
        got: usize,
        /// Name of the function that complained.
        func_name: String,
    },
}
