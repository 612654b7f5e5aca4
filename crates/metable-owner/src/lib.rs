//! Owner-side metadata capability for metable.
//!
//! An owner entity embeds a [`MetaBag`] and implements [`HasMeta`] to gain
//! typed, time-versioned key/value metadata. Writes are checked against the
//! owner's [`MetaSchema`] by the [`KeyPolicy`], buffered in the bag, and
//! committed to the [`MetaStore`](metable_store::MetaStore) carried by a
//! [`MetaContext`]. Commits and deletes are reported to a [`MetaObserver`].
//!
//! # Key policy
//!
//! First match wins:
//!
//! 1. unguarded context: any key;
//! 2. explicitly allowed key (allow-list entry or meta-backed attribute);
//! 3. key naming a real owner attribute: denied, as a collision;
//! 4. otherwise allowed only under the `*` wildcard.

pub mod bag;
pub mod context;
pub mod error;
pub mod observer;
pub mod owner;
pub mod policy;
pub mod schema;

pub use bag::MetaBag;
pub use context::MetaContext;
pub use error::{MetaError, MetaResult};
pub use observer::{BroadcastObserver, MetaEvent, MetaObserver, NullObserver, RecordingObserver};
pub use owner::HasMeta;
pub use policy::{KeyAccess, KeyPolicy};
pub use schema::{AttributeKind, MetaSchema, ValueHook};
