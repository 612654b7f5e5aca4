use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid {strategy} id: {value:?}")]
    InvalidId { strategy: String, value: String },

    #[error("id generator exhausted for the current millisecond")]
    IdExhausted,

    #[error("invalid blob text: {0}")]
    InvalidBlob(String),

    #[error("invalid hex string: {0}")]
    InvalidHex(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}
