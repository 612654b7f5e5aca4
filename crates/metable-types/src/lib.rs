//! Foundation types for metable, a typed and time-versioned metadata store.
//!
//! Every other metable crate depends on `metable-types`.
//!
//! # Key Types
//!
//! - [`MetaValue`]: tagged union of every value kind a metadata slot can hold
//! - [`EntityId`]: integer, UUID or ULID identifier of an owner or record
//! - [`IdStrategy`]: which identifier family a deployment uses
//! - [`OwnerKey`]: polymorphic `(owner_type, owner_id)` pair
//! - [`Timestamp`]: UTC instant used for publish times and time travel

pub mod error;
pub mod ids;
pub mod time;
pub mod value;

pub use error::TypeError;
pub use ids::{EntityId, IdGenerator, IdStrategy, OwnerKey};
pub use time::Timestamp;
pub use value::{
    DynObject, EntityCollection, EntityRef, EnumBacking, EnumMember, MetaValue, OpaqueBlob,
    GENERIC_OBJECT_CLASS,
};
