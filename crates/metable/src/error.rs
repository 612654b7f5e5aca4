use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetableError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("codec error: {0}")]
    Codec(#[from] metable_codec::CodecError),

    #[error("store error: {0}")]
    Store(#[from] metable_store::StoreError),

    #[error("meta error: {0}")]
    Meta(#[from] metable_owner::MetaError),
}

pub type MetableResult<T> = Result<T, MetableError>;
