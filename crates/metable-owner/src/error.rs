use metable_codec::CodecError;
use metable_store::StoreError;

use crate::schema::AttributeKind;

/// Errors from owner-side metadata operations.
#[derive(Debug, thiserror::Error)]
pub enum MetaError {
    /// The key is not allowed by the owner's schema.
    #[error("meta key '{key}' is not allowed on {owner_type}")]
    InvalidKey { owner_type: String, key: String },

    /// The key names a real attribute of the owner and is not explicitly
    /// allowed as metadata.
    #[error("meta key '{key}' collides with the {kind} attribute of {owner_type}")]
    ModelAttributeCollision {
        owner_type: String,
        key: String,
        kind: AttributeKind,
    },

    /// A commit was attempted before the owner itself was persisted.
    #[error("{owner_type} has not been persisted yet")]
    OwnerNotPersisted { owner_type: String },

    /// Publish-time text could not be parsed.
    #[error("invalid publish time: {0}")]
    InvalidPublishTime(String),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl MetaError {
    /// Both key-policy denials belong to the invalid-key family.
    pub fn is_invalid_key(&self) -> bool {
        matches!(self, Self::InvalidKey { .. } | Self::ModelAttributeCollision { .. })
    }
}

/// Result alias for owner-side operations.
pub type MetaResult<T> = Result<T, MetaError>;
