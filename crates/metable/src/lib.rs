//! Typed, time-versioned key/value metadata for application entities.
//!
//! Owners embed a [`MetaBag`] and implement [`HasMeta`]. Values are encoded
//! by the [`HandlerRegistry`] into a `(raw text, type id)` pair, stored as
//! append-only [`MetaRecord`] history in a [`MetaStore`], and resolved to a
//! current value as of any instant by the [`TemporalResolver`].
//!
//! [`MetaConfig`] and [`MetaRuntime`] wire these pieces from a TOML file:
//!
//! ```ignore
//! let runtime = MetaRuntime::in_memory(MetaConfig::load("metable.toml")?)?;
//! let ctx = runtime.context();
//! post.set_meta(&ctx, "color", "red")?;
//! post.save_meta(&ctx)?;
//! ```

pub mod config;
pub mod error;
pub mod runtime;
pub mod telemetry;

pub use config::MetaConfig;
pub use error::{MetableError, MetableResult};
pub use runtime::MetaRuntime;

pub use metable_codec::{
    default_registry, type_ids, CodecError, EntityResolver, EnumCatalog, HandlerRegistry,
    InMemoryEntityResolver, TypeHandler, DEFAULT_HANDLER_ORDER,
};
pub use metable_owner::{
    AttributeKind, BroadcastObserver, HasMeta, KeyAccess, MetaBag, MetaContext, MetaError,
    MetaEvent, MetaObserver, MetaSchema, NullObserver, RecordingObserver,
};
pub use metable_store::{
    CompareOp, InMemoryMetaStore, MetaQuery, MetaRecord, MetaStore, MetaTableSchema, SortDirection,
    StoreError, TemporalResolver,
};
pub use metable_types::{
    DynObject, EntityCollection, EntityId, EntityRef, EnumMember, IdStrategy, MetaValue,
    OpaqueBlob, OwnerKey, Timestamp,
};
