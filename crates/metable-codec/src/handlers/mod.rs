//! Default type handlers.

pub mod array;
pub mod blob;
pub mod entity;
pub mod enumeration;
pub mod null;
pub mod object;
pub mod scalar;
pub mod temporal;

pub use array::ArrayHandler;
pub use blob::SerializableHandler;
pub use entity::{CollectionHandler, EntityResolver, InMemoryEntityResolver, ModelHandler};
pub use enumeration::{EnumCatalog, EnumHandler};
pub use null::NullHandler;
pub use object::ObjectHandler;
pub use scalar::{BooleanHandler, FloatHandler, IntegerHandler, StringHandler};
pub use temporal::{DateHandler, DateTimeHandler};
