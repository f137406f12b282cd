/// Errors that can occur while encoding or parsing sipc messages.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// A token is malformed or is not the canonical spelling of its value.
    #[error("invalid encoding at byte {offset}")]
    InvalidEncoding { offset: usize },

    /// Array/map nesting exceeded the parser bound.
    #[error("nesting exceeds {max} levels at byte {offset}")]
    TooDeep { max: usize, offset: usize },

    /// A map contains the same key twice.
    #[error("duplicate map key at byte {offset}")]
    DuplicateKey { offset: usize },

    /// A string/bytes length claims more data than the buffer safely holds.
    #[error("insufficient data: token needs {needed} bytes, {available} available")]
    InsufficientData { needed: u64, available: usize },

    /// A framed message would not fit the 16-bit length header.
    #[error("frame of {len} bytes exceeds {max}")]
    FrameTooLarge { len: usize, max: usize },

    /// A value has no representation in the wire format.
    #[error("unknown value kind: {0}")]
    UnknownValueKind(String),
}

pub type Result<T> = std::result::Result<T, CodecError>;
