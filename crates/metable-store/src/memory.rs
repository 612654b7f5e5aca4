use std::collections::BTreeMap;
use std::sync::RwLock;

use metable_types::{time, EntityId, IdGenerator, IdStrategy, OwnerKey, Timestamp};
use tracing::{debug, info};

use crate::error::{StoreError, StoreResult};
use crate::record::MetaRecord;
use crate::resolver::TemporalResolver;
use crate::traits::{DeletedKeys, MetaStore};

struct Inner {
    records: BTreeMap<EntityId, MetaRecord>,
    ids: IdGenerator,
}

/// In-memory, `BTreeMap`-based metadata store.
///
/// Intended for tests and embedding. Records live behind a `RwLock`; every
/// mutating call holds the write lock for its whole duration, which makes
/// it the transaction boundary.
pub struct InMemoryMetaStore {
    inner: RwLock<Inner>,
}

impl InMemoryMetaStore {
    /// A store minting integer ids.
    pub fn new() -> Self {
        Self::with_strategy(IdStrategy::Integer)
    }

    pub fn with_strategy(strategy: IdStrategy) -> Self {
        Self {
            inner: RwLock::new(Inner {
                records: BTreeMap::new(),
                ids: IdGenerator::new(strategy),
            }),
        }
    }

    /// Number of records, history included, across all owners.
    pub fn len(&self) -> usize {
        self.inner.read().expect("lock poisoned").records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().expect("lock poisoned").records.is_empty()
    }

    pub fn clear(&self) {
        self.inner.write().expect("lock poisoned").records.clear();
    }

    fn owner_of(record: &MetaRecord) -> StoreResult<OwnerKey> {
        record.owner().ok_or_else(|| StoreError::DetachedRecord {
            owner_type: record.owner_type().to_string(),
            key: record.key().to_string(),
        })
    }
}

impl Default for InMemoryMetaStore {
    fn default() -> Self {
        Self::new()
    }
}

fn belongs_to(record: &MetaRecord, owner: &OwnerKey) -> bool {
    record.owner_type() == owner.owner_type && record.owner_id() == Some(&owner.owner_id)
}

impl MetaStore for InMemoryMetaStore {
    fn id_strategy(&self) -> IdStrategy {
        self.inner.read().expect("lock poisoned").ids.strategy()
    }

    fn insert(&self, record: &MetaRecord) -> StoreResult<MetaRecord> {
        let owner = Self::owner_of(record)?;
        let mut inner = self.inner.write().expect("lock poisoned");
        let id = inner.ids.next_id()?;
        let mut stored = record.clone();
        stored.mark_inserted(id.clone(), time::now());
        debug!(%owner, key = stored.key(), %id, published_at = ?stored.published_at(), "inserted meta record");
        inner.records.insert(id, stored.clone());
        Ok(stored)
    }

    fn update(&self, record: &MetaRecord) -> StoreResult<MetaRecord> {
        let id = record
            .id()
            .ok_or_else(|| StoreError::NotPersisted(record.key().to_string()))?;
        let mut inner = self.inner.write().expect("lock poisoned");
        let expected = inner.ids.strategy();
        if id.strategy() != expected {
            return Err(StoreError::IdStrategyMismatch {
                id: id.clone(),
                expected: expected.to_string(),
            });
        }
        let stored = inner
            .records
            .get_mut(id)
            .ok_or_else(|| StoreError::RecordNotFound(id.to_string()))?;
        stored.set_raw(
            record.raw_value().map(str::to_string),
            record.type_id().map(str::to_string),
        );
        stored.set_published_at(record.published_at());
        stored.mark_updated(time::now());
        debug!(%id, key = stored.key(), "amended meta record");
        Ok(stored.clone())
    }

    fn find(&self, id: &EntityId) -> StoreResult<Option<MetaRecord>> {
        let inner = self.inner.read().expect("lock poisoned");
        Ok(inner.records.get(id).cloned())
    }

    fn records_for(&self, owner: &OwnerKey) -> StoreResult<Vec<MetaRecord>> {
        let inner = self.inner.read().expect("lock poisoned");
        Ok(inner
            .records
            .values()
            .filter(|r| belongs_to(r, owner))
            .cloned()
            .collect())
    }

    fn records_for_type(&self, owner_type: &str) -> StoreResult<Vec<MetaRecord>> {
        let inner = self.inner.read().expect("lock poisoned");
        Ok(inner
            .records
            .values()
            .filter(|r| r.owner_type() == owner_type)
            .cloned()
            .collect())
    }

    fn delete_keys(
        &self,
        owner: &OwnerKey,
        keys: &[String],
        at: Timestamp,
    ) -> StoreResult<DeletedKeys> {
        let mut inner = self.inner.write().expect("lock poisoned");
        let owned: Vec<MetaRecord> = inner
            .records
            .values()
            .filter(|r| belongs_to(r, owner))
            .cloned()
            .collect();
        let resolver = TemporalResolver::at(&owned, at);
        let current = keys
            .iter()
            .filter_map(|key| resolver.current_for(key).cloned())
            .collect();

        let doomed: Vec<EntityId> = owned
            .iter()
            .filter(|r| keys.iter().any(|k| k == r.key()))
            .filter_map(|r| r.id().cloned())
            .collect();
        for id in &doomed {
            inner.records.remove(id);
        }
        info!(%owner, keys = ?keys, rows = doomed.len(), "deleted meta keys");
        Ok(DeletedKeys {
            rows: doomed.len(),
            current,
        })
    }

    fn purge_owner(&self, owner: &OwnerKey) -> StoreResult<usize> {
        let mut inner = self.inner.write().expect("lock poisoned");
        let before = inner.records.len();
        inner.records.retain(|_, r| !belongs_to(r, owner));
        let removed = before - inner.records.len();
        info!(%owner, rows = removed, "purged owner meta");
        Ok(removed)
    }
}

impl std::fmt::Debug for InMemoryMetaStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read().expect("lock poisoned");
        f.debug_struct("InMemoryMetaStore")
            .field("strategy", &inner.ids.strategy())
            .field("record_count", &inner.records.len())
            .finish()
    }
}
