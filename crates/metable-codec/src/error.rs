use metable_types::TypeError;

/// Errors from classifying, serializing or deserializing metadata values.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// No registered handler for a type id, or no handler claims a value.
    #[error("no type handler found for {0}")]
    HandlerNotFound(String),

    /// A handler was asked to serialize a value outside its domain.
    #[error("type handler '{handler}' cannot serialize a {value} value")]
    UnsupportedValue { handler: String, value: String },

    /// A referenced entity no longer exists.
    #[error("referenced {entity_type} #{id} not found")]
    ReferenceNotFound { entity_type: String, id: String },

    /// Stored text could not be decoded by its handler.
    #[error("malformed '{type_id}' value: {reason}")]
    Malformed { type_id: String, reason: String },

    #[error(transparent)]
    Type(#[from] TypeError),
}

impl CodecError {
    pub fn unsupported(handler: &str, value: &metable_types::MetaValue) -> Self {
        Self::UnsupportedValue {
            handler: handler.to_string(),
            value: value.describe(),
        }
    }

    pub fn malformed(type_id: &str, reason: impl Into<String>) -> Self {
        Self::Malformed {
            type_id: type_id.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result alias for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;
