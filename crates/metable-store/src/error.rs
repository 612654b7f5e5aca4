use metable_codec::CodecError;
use metable_types::{EntityId, TypeError};

/// Errors from metadata record storage and queries.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No record with this id (also returned for malformed id text).
    #[error("meta record not found: {0}")]
    RecordNotFound(String),

    /// A record was persisted before its owner had an id.
    #[error("meta record '{key}' for {owner_type} has no owner id")]
    DetachedRecord { owner_type: String, key: String },

    /// An update targeted a record that was never inserted.
    #[error("meta record '{0}' has not been persisted")]
    NotPersisted(String),

    /// Record ids of another strategy were handed to this store.
    #[error("id {id} does not match the store's {expected} id strategy")]
    IdStrategyMismatch { id: EntityId, expected: String },

    /// A LIKE pattern could not be compiled.
    #[error("invalid pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Type(#[from] TypeError),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
