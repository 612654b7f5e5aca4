//! Type handler registry for metable.
//!
//! A [`TypeHandler`] is a codec plus classifier for one value kind. The
//! [`HandlerRegistry`] holds handlers in priority order: classification is a
//! linear scan returning the first handler that claims a value, so the order
//! is part of the configuration, not an implementation detail.
//!
//! # Default order
//!
//! `boolean, null, integer, float, string, datetime, date, array, model,
//! collection, serializable, enum, object`
//!
//! More specific handlers precede the `object` catch-all, which claims every
//! object-like value left over.
//!
//! # Collaborators
//!
//! Handlers that reference other entities or enumerations resolve them
//! through the [`EntityResolver`] and [`EnumCatalog`] seams supplied by the
//! host application.

pub mod error;
pub mod handler;
pub mod handlers;
pub mod registry;

pub use error::{CodecError, CodecResult};
pub use handler::{type_ids, TypeHandler};
pub use handlers::{
    ArrayHandler, BooleanHandler, CollectionHandler, DateHandler, DateTimeHandler, EntityResolver,
    EnumCatalog, EnumHandler, FloatHandler, InMemoryEntityResolver, IntegerHandler, ModelHandler,
    NullHandler, ObjectHandler, SerializableHandler, StringHandler,
};
pub use registry::{default_registry, HandlerRegistry, DEFAULT_HANDLER_ORDER};
