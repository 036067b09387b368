use thiserror::Error;

/// The closed failure taxonomy of the marshalling engine.
///
/// Every variant is returned explicitly to the caller; the engine never
/// recovers from one of these on its own.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("unsupported field type tag `{tag}`")]
    UnsupportedType { tag: &'static str },

    #[error("missing required field `{field}`")]
    MissingField { field: String },

    #[error("marshalled length {actual} of `{class}` does not match declared size {expected}")]
    SizeMismatch {
        class: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("list `{field}` size expression evaluated to {expected} but {actual} elements are stored")]
    ListSizeMismatch {
        field: String,
        expected: i64,
        actual: usize,
    },

    #[error("declared size {declared} is smaller than the {parsed} bytes already parsed")]
    DeclaredSizeTooSmall { declared: usize, parsed: usize },

    #[error("declared size {declared} exceeds the {available} bytes available in the input")]
    InputTooShort { declared: usize, available: usize },

    #[error("union `{class}` member encoded to {actual} bytes, exceeding its declared size {size}")]
    UnionOverflow {
        class: &'static str,
        size: usize,
        actual: usize,
    },

    #[error("size expression did not evaluate to a non-negative integer: {reason}")]
    BadSizeExpression { reason: String },

    #[error("bit pattern of {bits_len} bytes is wider than the {width}-byte float it was decoded for")]
    BadFloat { width: u8, bits_len: usize },
}

pub type Result<T> = std::result::Result<T, Error>;
