use metable_types::{EntityId, IdStrategy, OwnerKey, Timestamp};

use crate::error::{StoreError, StoreResult};
use crate::record::MetaRecord;
use crate::resolver::TemporalResolver;

/// Outcome of deleting keys from an owner.
#[derive(Clone, Debug, Default)]
pub struct DeletedKeys {
    /// History rows removed, across all keys.
    pub rows: usize,
    /// The records that were current, immediately before the delete, for
    /// each key that had a current value.
    pub current: Vec<MetaRecord>,
}

/// Storage for versioned metadata records.
///
/// Implementations must satisfy these invariants:
/// - Ids increase with insertion order. Resolution breaks publish-time ties
///   by id, so id order is write order.
/// - Records are appended, never rewritten, except by [`update`](Self::update)
///   which the owner layer only uses to amend a record that is still planned.
/// - `delete_keys` is atomic: either every requested key's history is gone
///   or nothing changed.
pub trait MetaStore: Send + Sync {
    /// Strategy used to mint record ids.
    fn id_strategy(&self) -> IdStrategy;

    /// Persist a new record and return it with id and timestamps assigned.
    ///
    /// A record without a publish time is published at the moment of insert.
    fn insert(&self, record: &MetaRecord) -> StoreResult<MetaRecord>;

    /// Overwrite the stored pair and publish time of an existing record.
    fn update(&self, record: &MetaRecord) -> StoreResult<MetaRecord>;

    /// Read one record by id.
    fn find(&self, id: &EntityId) -> StoreResult<Option<MetaRecord>>;

    /// Every record, history included, for one owner.
    fn records_for(&self, owner: &OwnerKey) -> StoreResult<Vec<MetaRecord>>;

    /// Every record for every owner of `owner_type`.
    fn records_for_type(&self, owner_type: &str) -> StoreResult<Vec<MetaRecord>>;

    /// Delete the full history of `keys` for `owner`, reporting what was
    /// current at `at` just before.
    fn delete_keys(&self, owner: &OwnerKey, keys: &[String], at: Timestamp)
        -> StoreResult<DeletedKeys>;

    /// Delete every record for `owner`. Returns the number of rows removed.
    fn purge_owner(&self, owner: &OwnerKey) -> StoreResult<usize>;

    /// Look up a record by id text, validating it against the id strategy.
    /// Malformed ids are reported as not found.
    fn find_by_text(&self, text: &str) -> StoreResult<MetaRecord> {
        let not_found = || StoreError::RecordNotFound(text.to_string());
        let id = self.id_strategy().parse(text).map_err(|_| not_found())?;
        self.find(&id)?.ok_or_else(not_found)
    }

    // -----------------------------------------------------------------------
    // Resolved views
    // -----------------------------------------------------------------------

    /// The owner's current snapshot as of `at`, one record per key.
    fn current(&self, owner: &OwnerKey, at: Timestamp) -> StoreResult<Vec<MetaRecord>> {
        let records = self.records_for(owner)?;
        Ok(cloned(TemporalResolver::at(&records, at).current()))
    }

    fn current_record(
        &self,
        owner: &OwnerKey,
        key: &str,
        at: Timestamp,
    ) -> StoreResult<Option<MetaRecord>> {
        let records = self.records_for(owner)?;
        Ok(TemporalResolver::at(&records, at).current_for(key).cloned())
    }

    fn has_meta(&self, owner: &OwnerKey, key: &str, at: Timestamp) -> StoreResult<bool> {
        Ok(self.current_record(owner, key, at)?.is_some())
    }

    fn published(&self, owner: &OwnerKey, at: Timestamp) -> StoreResult<Vec<MetaRecord>> {
        let records = self.records_for(owner)?;
        Ok(cloned(TemporalResolver::at(&records, at).published()))
    }

    fn not_published(&self, owner: &OwnerKey, at: Timestamp) -> StoreResult<Vec<MetaRecord>> {
        let records = self.records_for(owner)?;
        Ok(cloned(TemporalResolver::at(&records, at).not_published()))
    }

    fn without_current(&self, owner: &OwnerKey, at: Timestamp) -> StoreResult<Vec<MetaRecord>> {
        let records = self.records_for(owner)?;
        Ok(cloned(TemporalResolver::at(&records, at).without_current()))
    }

    fn without_history(&self, owner: &OwnerKey, at: Timestamp) -> StoreResult<Vec<MetaRecord>> {
        let records = self.records_for(owner)?;
        Ok(cloned(TemporalResolver::at(&records, at).without_history()))
    }

    /// Full chain for `key`, oldest first.
    fn history(&self, owner: &OwnerKey, key: &str) -> StoreResult<Vec<MetaRecord>> {
        let records = self.records_for(owner)?;
        Ok(cloned(TemporalResolver::at(&records, metable_types::time::now()).history(key)))
    }
}

fn cloned(records: Vec<&MetaRecord>) -> Vec<MetaRecord> {
    records.into_iter().cloned().collect()
}
