//! The per-owner change buffer and the write, commit, read and delete paths.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use metable_store::{normalize_key, MetaRecord, TemporalResolver};
use metable_types::{time, EntityId, MetaValue, OwnerKey, Timestamp};
use tracing::{debug, info};

use crate::context::MetaContext;
use crate::error::{MetaError, MetaResult};
use crate::policy::{KeyAccess, KeyPolicy};
use crate::schema::MetaSchema;

#[derive(Clone, Debug)]
struct Memo {
    generation: u64,
    records: Arc<Vec<MetaRecord>>,
}

/// Metadata state embedded in an owner entity.
///
/// Holds the owner's identity, the buffer of uncommitted changes (one per
/// key, committed in key order), shadowed column values captured at load
/// time, the owner-level travel instant, and a memo of the owner's stored
/// records. The memo is tagged with a generation counter; every write,
/// delete, travel change or [`refresh`](Self::refresh) bumps the counter
/// and so invalidates it.
#[derive(Clone, Debug)]
pub struct MetaBag {
    owner_type: String,
    owner_id: Option<EntityId>,
    changes: BTreeMap<String, MetaRecord>,
    shadow: HashMap<String, MetaValue>,
    travel: Option<Timestamp>,
    generation: u64,
    memo: RefCell<Option<Memo>>,
}

impl MetaBag {
    /// State for a new owner that has not been persisted yet.
    pub fn new(owner_type: impl Into<String>) -> Self {
        Self {
            owner_type: owner_type.into(),
            owner_id: None,
            changes: BTreeMap::new(),
            shadow: HashMap::new(),
            travel: None,
            generation: 0,
            memo: RefCell::new(None),
        }
    }

    /// State for an owner that already exists.
    pub fn for_owner(owner: OwnerKey) -> Self {
        let mut bag = Self::new(owner.owner_type);
        bag.owner_id = Some(owner.owner_id);
        bag
    }

    pub fn owner_type(&self) -> &str {
        &self.owner_type
    }

    pub fn owner_id(&self) -> Option<&EntityId> {
        self.owner_id.as_ref()
    }

    pub fn owner(&self) -> Option<OwnerKey> {
        self.owner_id
            .as_ref()
            .map(|id| OwnerKey::new(self.owner_type.clone(), id.clone()))
    }

    /// Whether the owner has been persisted.
    pub fn exists(&self) -> bool {
        self.owner_id.is_some()
    }

    /// Give a newly persisted owner its id.
    pub fn attach(&mut self, owner_id: EntityId) {
        for record in self.changes.values_mut() {
            record.attach_owner(owner_id.clone());
        }
        self.owner_id = Some(owner_id);
        self.bump();
    }

    /// Buffered changes, in commit order.
    pub fn pending(&self) -> impl Iterator<Item = &MetaRecord> {
        self.changes.values()
    }

    pub fn is_dirty(&self) -> bool {
        !self.changes.is_empty()
    }

    pub fn is_dirty_key(&self, key: &str) -> bool {
        self.changes.contains_key(&normalize_key(key))
    }

    pub fn travel(&self) -> Option<Timestamp> {
        self.travel
    }

    /// Resolve and publish as of `at` for this owner only.
    pub fn travel_to(&mut self, at: Timestamp) {
        self.travel = Some(at);
        self.bump();
    }

    pub fn travel_back(&mut self) {
        self.travel = None;
        self.bump();
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Drop the memoized records so the next read goes to the store.
    pub fn refresh(&mut self) {
        self.bump();
    }

    fn bump(&mut self) {
        self.generation += 1;
    }

    /// Instant reads resolve at: owner travel, then context travel, then now.
    pub fn resolution_instant(&self, ctx: &MetaContext) -> Timestamp {
        self.travel.or(ctx.travel()).unwrap_or_else(time::now)
    }

    fn default_publish_time(&self, ctx: &MetaContext) -> Option<Timestamp> {
        self.travel.or(ctx.travel())
    }

    fn require_owner(&self) -> MetaResult<OwnerKey> {
        self.owner().ok_or_else(|| MetaError::OwnerNotPersisted {
            owner_type: self.owner_type.clone(),
        })
    }

    /// The owner's stored records, history included.
    pub fn stored(&self, ctx: &MetaContext) -> MetaResult<Arc<Vec<MetaRecord>>> {
        let Some(owner) = self.owner() else {
            return Ok(Arc::new(Vec::new()));
        };
        if let Some(memo) = self.memo.borrow().as_ref() {
            if memo.generation == self.generation {
                return Ok(memo.records.clone());
            }
        }
        let records = Arc::new(ctx.store().records_for(&owner)?);
        debug!(%owner, records = records.len(), generation = self.generation, "loaded meta records");
        *self.memo.borrow_mut() = Some(Memo {
            generation: self.generation,
            records: records.clone(),
        });
        Ok(records)
    }

    // -----------------------------------------------------------------------
    // Write path
    // -----------------------------------------------------------------------

    /// Buffer a write. Returns `false` when the value and type equal what is
    /// already stored as current at the target instant.
    pub fn set(
        &mut self,
        schema: &MetaSchema,
        ctx: &MetaContext,
        key: &str,
        value: MetaValue,
        publish_at: Option<Timestamp>,
    ) -> MetaResult<bool> {
        let key = KeyPolicy::new(schema, ctx.is_unguarded()).check_write(key)?;
        let value = schema.mutate(&key, value);

        let mut candidate = MetaRecord::new(self.owner_type.clone(), &key);
        candidate.force_type(schema.forced_type(&key));
        candidate.set_value(ctx.registry(), &value)?;
        candidate.set_published_at(publish_at.or_else(|| self.default_publish_time(ctx)));
        self.stage(ctx, candidate)
    }

    /// Buffer several writes; every key is checked before any is buffered.
    pub fn set_many<I, K>(
        &mut self,
        schema: &MetaSchema,
        ctx: &MetaContext,
        values: I,
    ) -> MetaResult<usize>
    where
        I: IntoIterator<Item = (K, MetaValue)>,
        K: AsRef<str>,
    {
        let values: Vec<(K, MetaValue)> = values.into_iter().collect();
        KeyPolicy::new(schema, ctx.is_unguarded()).check_all(values.iter().map(|(k, _)| k))?;
        let mut changed = 0;
        for (key, value) in values {
            if self.set(schema, ctx, key.as_ref(), value, None)? {
                changed += 1;
            }
        }
        Ok(changed)
    }

    fn stage(&mut self, ctx: &MetaContext, mut candidate: MetaRecord) -> MetaResult<bool> {
        let key = candidate.key().to_string();
        let target = candidate.published_at();
        let stored = self.stored(ctx)?;
        let existing = TemporalResolver::at(&stored, target.unwrap_or_else(time::now))
            .current_for(&key)
            .cloned();

        if existing.as_ref().is_some_and(|r| r.same_content(&candidate)) {
            debug!(owner_type = %self.owner_type, key = %key, "meta write is a no-op");
            self.changes.remove(&key);
            return Ok(false);
        }

        // A planned record at the very same instant is amended rather than
        // superseded, so unpublished drafts leave no history behind.
        let amend = existing.filter(|r| target.is_some() && r.published_at() == target && r.is_planned());
        let staged = match amend {
            Some(mut record) => {
                record.set_raw(
                    candidate.raw_value().map(str::to_string),
                    candidate.type_id().map(str::to_string),
                );
                record
            }
            None => {
                if let Some(owner_id) = &self.owner_id {
                    candidate.attach_owner(owner_id.clone());
                }
                candidate
            }
        };
        debug!(
            owner_type = %self.owner_type,
            key = %key,
            type_id = staged.type_id(),
            amend = staged.is_persisted(),
            "buffered meta change"
        );
        self.changes.insert(key, staged);
        Ok(true)
    }

    // -----------------------------------------------------------------------
    // Commit path
    // -----------------------------------------------------------------------

    /// Persist every buffered change. Returns whether anything was written.
    pub fn save(&mut self, ctx: &MetaContext) -> MetaResult<bool> {
        if self.changes.is_empty() {
            return Ok(false);
        }
        self.require_owner()?;
        let keys: Vec<String> = self.changes.keys().cloned().collect();
        let mut saved = 0;
        for key in keys {
            if self.save_key(ctx, &key)? {
                saved += 1;
            }
        }
        info!(owner_type = %self.owner_type, saved, "committed meta changes");
        Ok(saved > 0)
    }

    /// Persist the buffered change for one key, if there is one.
    pub fn save_key(&mut self, ctx: &MetaContext, key: &str) -> MetaResult<bool> {
        let key = normalize_key(key);
        let Some(record) = self.changes.get(&key) else {
            return Ok(false);
        };
        let owner = self.require_owner()?;
        let mut record = record.clone();
        record.attach_owner(owner.owner_id.clone());
        let stored = if record.is_persisted() {
            ctx.store().update(&record)?
        } else {
            ctx.store().insert(&record)?
        };
        self.changes.remove(&key);
        self.bump();
        ctx.observer().on_meta_added(&stored);
        debug!(%owner, key = %key, id = ?stored.id(), "persisted meta record");
        Ok(true)
    }

    // -----------------------------------------------------------------------
    // Read path
    // -----------------------------------------------------------------------

    /// The record in effect for `key`: a buffered change once its publish
    /// instant has arrived and is not older than the stored current record,
    /// otherwise the stored current record.
    pub fn record(&self, ctx: &MetaContext, key: &str) -> MetaResult<Option<MetaRecord>> {
        let key = normalize_key(key);
        let at = self.resolution_instant(ctx);
        let stored = self.stored(ctx)?;
        let current = TemporalResolver::at(&stored, at).current_for(&key);
        let pending = self.changes.get(&key);
        Ok(pick(pending, current, at).cloned())
    }

    /// Every key's value in effect, with accessor hooks applied.
    pub fn all(&self, schema: &MetaSchema, ctx: &MetaContext) -> MetaResult<BTreeMap<String, MetaValue>> {
        let at = self.resolution_instant(ctx);
        let stored = self.stored(ctx)?;
        let current = TemporalResolver::at(&stored, at).current_map();

        let mut keys: Vec<&str> = current.keys().copied().collect();
        keys.extend(self.changes.keys().map(String::as_str));
        keys.sort_unstable();
        keys.dedup();

        let mut out = BTreeMap::new();
        for key in keys {
            if let Some(record) = pick(self.changes.get(key), current.get(key).copied(), at) {
                let value = record.value(ctx.registry())?;
                out.insert(key.to_string(), schema.access(key, value));
            }
        }
        for (key, value) in &self.shadow {
            if !out.contains_key(key) {
                out.insert(key.clone(), schema.access(key, value.clone()));
            }
        }
        Ok(out)
    }

    /// Read a key.
    ///
    /// Keys the policy rejects fall through to `real` (the owner's own
    /// attribute). Wildcard-allowed keys also prefer a non-null real value;
    /// explicitly allowed keys always read metadata. A key with no metadata
    /// falls back to the column value shadowed at load time.
    pub fn lookup(
        &self,
        schema: &MetaSchema,
        ctx: &MetaContext,
        key: &str,
        real: &dyn Fn(&str) -> Option<MetaValue>,
    ) -> MetaResult<Option<MetaValue>> {
        let key = normalize_key(key);
        match KeyPolicy::new(schema, ctx.is_unguarded()).evaluate(&key) {
            KeyAccess::Collision(_) | KeyAccess::Denied => return Ok(real(&key)),
            KeyAccess::Allowed => {
                if let Some(value) = real(&key).filter(|v| !v.is_null()) {
                    return Ok(Some(value));
                }
            }
            KeyAccess::Explicit => {}
        }
        let value = match self.record(ctx, &key)? {
            Some(record) => Some(record.value(ctx.registry())?),
            None => self.shadow.get(&key).cloned(),
        };
        Ok(value.map(|v| schema.access(&key, v)))
    }

    /// History chain for `key`, oldest first. Buffered changes are not included.
    pub fn history(&self, ctx: &MetaContext, key: &str) -> MetaResult<Vec<MetaRecord>> {
        let key = normalize_key(key);
        let stored = self.stored(ctx)?;
        let resolver = TemporalResolver::at(&stored, self.resolution_instant(ctx));
        Ok(resolver.history(&key).into_iter().cloned().collect())
    }

    /// Stored records scheduled after the resolution instant.
    pub fn planned(&self, ctx: &MetaContext) -> MetaResult<Vec<MetaRecord>> {
        let stored = self.stored(ctx)?;
        let resolver = TemporalResolver::at(&stored, self.resolution_instant(ctx));
        Ok(resolver.not_published().into_iter().cloned().collect())
    }

    pub fn has(&self, ctx: &MetaContext, key: &str) -> MetaResult<bool> {
        Ok(self.record(ctx, key)?.is_some())
    }

    // -----------------------------------------------------------------------
    // Delete path
    // -----------------------------------------------------------------------

    /// Delete the full history of `keys`. Every key is checked first; if any
    /// is rejected nothing is deleted. Returns the number of rows removed.
    pub fn delete<I, S>(&mut self, schema: &MetaSchema, ctx: &MetaContext, keys: I) -> MetaResult<usize>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keys = KeyPolicy::new(schema, ctx.is_unguarded()).check_all(keys)?;
        let mut rows = 0;
        if let Some(owner) = self.owner() {
            let deleted = ctx
                .store()
                .delete_keys(&owner, &keys, self.resolution_instant(ctx))?;
            for record in &deleted.current {
                ctx.observer().on_meta_removed(record);
            }
            rows = deleted.rows;
        }
        for key in &keys {
            self.changes.remove(key);
        }
        self.bump();
        Ok(rows)
    }

    /// Make the stored key set exactly `values`: keys not listed are
    /// deleted, the rest are written and committed.
    pub fn sync<I, K>(&mut self, schema: &MetaSchema, ctx: &MetaContext, values: I) -> MetaResult<bool>
    where
        I: IntoIterator<Item = (K, MetaValue)>,
        K: AsRef<str>,
    {
        let values: Vec<(K, MetaValue)> = values.into_iter().collect();
        let policy = KeyPolicy::new(schema, ctx.is_unguarded());
        let keep = policy.check_all(values.iter().map(|(k, _)| k))?;
        self.require_owner()?;

        let stored = self.stored(ctx)?;
        let stale: Vec<String> = TemporalResolver::at(&stored, self.resolution_instant(ctx))
            .current()
            .into_iter()
            .map(|r| r.key().to_string())
            .filter(|k| !keep.contains(k))
            .collect();
        let removed = if stale.is_empty() {
            0
        } else {
            self.delete(schema, &ctx.unguarded(), &stale)?
        };
        self.set_many(schema, ctx, values)?;
        let saved = self.save(ctx)?;
        Ok(saved || removed > 0)
    }

    /// Delete every record of this owner and drop buffered changes.
    pub fn purge(&mut self, ctx: &MetaContext) -> MetaResult<usize> {
        self.changes.clear();
        let mut rows = 0;
        if let Some(owner) = self.owner() {
            rows = ctx.store().purge_owner(&owner)?;
            info!(%owner, rows, "purged owner meta");
        }
        self.bump();
        Ok(rows)
    }

    // -----------------------------------------------------------------------
    // Owner lifecycle
    // -----------------------------------------------------------------------

    /// Capture values of explicitly allowed keys from the owner's freshly
    /// loaded raw attributes. Returns the captured keys; the owner should
    /// stop exposing them as its own attributes.
    pub fn on_loaded<I, K>(&mut self, schema: &MetaSchema, raw_attributes: I) -> Vec<String>
    where
        I: IntoIterator<Item = (K, MetaValue)>,
        K: AsRef<str>,
    {
        let mut captured = Vec::new();
        for (key, value) in raw_attributes {
            let key = normalize_key(key.as_ref());
            if schema.is_explicit(&key) {
                self.shadow.insert(key.clone(), value);
                captured.push(key);
            }
        }
        captured
    }

    /// Hook for the owner's save: attach a newly assigned id, then commit
    /// buffered changes unless `autosave` is off.
    pub fn after_owner_saved(
        &mut self,
        ctx: &MetaContext,
        owner_id: Option<EntityId>,
        autosave: bool,
    ) -> MetaResult<bool> {
        if self.owner_id.is_none() {
            if let Some(id) = owner_id {
                self.attach(id);
            }
        }
        if autosave {
            self.save(ctx)
        } else {
            Ok(false)
        }
    }

    /// Hook for the owner's deletion.
    pub fn after_owner_deleted(&mut self, ctx: &MetaContext) -> MetaResult<usize> {
        self.purge(ctx)
    }
}

fn pick<'r>(
    pending: Option<&'r MetaRecord>,
    current: Option<&'r MetaRecord>,
    at: Timestamp,
) -> Option<&'r MetaRecord> {
    let pending = pending.filter(|p| p.published_at().map_or(true, |t| t <= at));
    match (pending, current) {
        (Some(p), Some(c)) => {
            let pending_at = p.published_at().unwrap_or(at);
            let current_at = c.published_at().unwrap_or(at);
            Some(if pending_at >= current_at { p } else { c })
        }
        (p, c) => p.or(c),
    }
}
