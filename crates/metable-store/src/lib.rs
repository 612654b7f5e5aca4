//! Versioned metadata storage for metable.
//!
//! Every write for an owner's key appends a [`MetaRecord`]; the per-key
//! history chain is resolved to a single current value as of any instant by
//! the [`TemporalResolver`]:
//!
//! 1. latest `published_at <= T` per key,
//! 2. latest id per `(key, published_at)`,
//! 3. the row matching both wins.
//!
//! [`MetaStore`] is the storage seam ([`InMemoryMetaStore`] ships here),
//! [`MetaQuery`] filters owners by their current metadata, and
//! [`MetaTableSchema`] describes the backing table for hosts that persist
//! records in SQL.

pub mod error;
pub mod memory;
pub mod query;
pub mod record;
pub mod resolver;
pub mod schema;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use memory::InMemoryMetaStore;
pub use query::{CompareOp, MetaFilter, MetaOrder, MetaQuery, SortDirection};
pub use record::{normalize_key, MetaRecord};
pub use resolver::TemporalResolver;
pub use schema::{ColumnDef, IndexDef, MetaTableSchema};
pub use traits::{DeletedKeys, MetaStore};
