use std::fmt;
use std::sync::OnceLock;

use metable_codec::{CodecResult, HandlerRegistry};
use metable_types::{time, EntityId, MetaValue, OwnerKey, Timestamp};
use serde::{Deserialize, Serialize};

/// Keys are case-insensitive and stored lowercase.
pub fn normalize_key(key: &str) -> String {
    key.trim().to_lowercase()
}

/// One version of one metadata key on one owner.
///
/// Records form an append-only history per `(owner, key)`. The stored
/// `(raw_value, type_id)` pair is authoritative; the decoded value is derived
/// from it on demand and memoized until either half is reassigned.
#[derive(Clone, Serialize, Deserialize)]
pub struct MetaRecord {
    id: Option<EntityId>,
    owner_type: String,
    owner_id: Option<EntityId>,
    key: String,
    raw_value: Option<String>,
    type_id: Option<String>,
    published_at: Option<Timestamp>,
    created_at: Option<Timestamp>,
    updated_at: Option<Timestamp>,
    #[serde(skip)]
    forced_type: Option<String>,
    #[serde(skip)]
    cached: OnceLock<MetaValue>,
}

impl MetaRecord {
    /// A new, unpersisted record for `key` on an owner of `owner_type`.
    pub fn new(owner_type: impl Into<String>, key: &str) -> Self {
        Self {
            id: None,
            owner_type: owner_type.into(),
            owner_id: None,
            key: normalize_key(key),
            raw_value: None,
            type_id: None,
            published_at: None,
            created_at: None,
            updated_at: None,
            forced_type: None,
            cached: OnceLock::new(),
        }
    }

    /// A new record attached to an existing owner.
    pub fn for_owner(owner: &OwnerKey, key: &str) -> Self {
        let mut record = Self::new(owner.owner_type.clone(), key);
        record.owner_id = Some(owner.owner_id.clone());
        record
    }

    pub fn id(&self) -> Option<&EntityId> {
        self.id.as_ref()
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn owner_type(&self) -> &str {
        &self.owner_type
    }

    pub fn owner_id(&self) -> Option<&EntityId> {
        self.owner_id.as_ref()
    }

    /// The owner key, once the owner has an id.
    pub fn owner(&self) -> Option<OwnerKey> {
        self.owner_id
            .as_ref()
            .map(|id| OwnerKey::new(self.owner_type.clone(), id.clone()))
    }

    /// Stored text, exactly as persisted.
    pub fn raw_value(&self) -> Option<&str> {
        self.raw_value.as_deref()
    }

    pub fn type_id(&self) -> Option<&str> {
        self.type_id.as_deref()
    }

    pub fn published_at(&self) -> Option<Timestamp> {
        self.published_at
    }

    pub fn created_at(&self) -> Option<Timestamp> {
        self.created_at
    }

    pub fn updated_at(&self) -> Option<Timestamp> {
        self.updated_at
    }

    pub fn is_persisted(&self) -> bool {
        self.id.is_some()
    }

    /// Whether this record becomes current only after wall-clock now.
    pub fn is_planned(&self) -> bool {
        self.is_planned_at(time::now())
    }

    pub fn is_planned_at(&self, at: Timestamp) -> bool {
        self.published_at.is_some_and(|published| published > at)
    }

    /// Whether this record and `other` store the same typed value.
    pub fn same_content(&self, other: &MetaRecord) -> bool {
        self.raw_value == other.raw_value && self.type_id == other.type_id
    }

    // -----------------------------------------------------------------------
    // Value
    // -----------------------------------------------------------------------

    /// Override classification for the next [`set_value`](Self::set_value) only.
    pub fn force_type(&mut self, type_id: Option<&str>) {
        self.forced_type = type_id.map(str::to_string);
    }

    /// Serialize `value` into this record.
    ///
    /// The type is the forced type if one is pending, otherwise the first
    /// handler that claims the value. Null is stored with a null raw value.
    pub fn set_value(&mut self, registry: &HandlerRegistry, value: &MetaValue) -> CodecResult<()> {
        let forced = self.forced_type.take();
        let (raw, type_id) = registry.serialize(value, forced.as_deref())?;
        self.set_raw(raw, Some(type_id));
        Ok(())
    }

    /// Assign the stored pair directly, bypassing the registry.
    pub fn set_raw(&mut self, raw_value: Option<String>, type_id: Option<String>) {
        self.raw_value = raw_value;
        self.type_id = type_id;
        self.cached = OnceLock::new();
    }

    /// Decoded value. Unset records read as null.
    pub fn value(&self, registry: &HandlerRegistry) -> CodecResult<MetaValue> {
        if let Some(value) = self.cached.get() {
            return Ok(value.clone());
        }
        let Some(type_id) = self.type_id.as_deref() else {
            return Ok(MetaValue::Null);
        };
        let value = registry.deserialize(type_id, self.raw_value.as_deref())?;
        let _ = self.cached.set(value.clone());
        Ok(value)
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    pub fn set_published_at(&mut self, published_at: Option<Timestamp>) {
        self.published_at = published_at;
    }

    pub fn attach_owner(&mut self, owner_id: EntityId) {
        self.owner_id = Some(owner_id);
    }

    /// Stamp the record for its first persist: id, missing publish time, and
    /// both bookkeeping timestamps.
    pub fn mark_inserted(&mut self, id: EntityId, now: Timestamp) {
        self.id = Some(id);
        self.published_at.get_or_insert(now);
        self.created_at = Some(now);
        self.updated_at = Some(now);
    }

    pub fn mark_updated(&mut self, now: Timestamp) {
        self.published_at.get_or_insert(now);
        self.updated_at = Some(now);
    }
}

impl fmt::Debug for MetaRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetaRecord")
            .field("id", &self.id)
            .field("owner_type", &self.owner_type)
            .field("owner_id", &self.owner_id)
            .field("key", &self.key)
            .field("raw_value", &self.raw_value)
            .field("type_id", &self.type_id)
            .field("published_at", &self.published_at)
            .finish()
    }
}
