//! Handlers for references to other owner entities.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use metable_types::{EntityCollection, EntityId, EntityRef, IdStrategy, MetaValue};
use serde_json::{json, Map, Value as JsonValue};
use tracing::{debug, warn};

use crate::error::{CodecError, CodecResult};
use crate::handler::{type_ids, TypeHandler};

// ---------------------------------------------------------------------------
// EntityResolver
// ---------------------------------------------------------------------------

/// Host-side lookup of persisted entities by type and primary key.
pub trait EntityResolver: Send + Sync {
    /// Whether `entity_type` names a known entity type.
    fn knows_type(&self, entity_type: &str) -> bool;

    /// Id strategy used by `entity_type`; governs id validation on reads.
    fn id_strategy(&self, entity_type: &str) -> IdStrategy;

    /// Whether an entity of `entity_type` with `id` exists.
    fn exists(&self, entity_type: &str, id: &EntityId) -> bool;

    /// The subset of `ids` that exist. Implementations should answer with a
    /// single lookup.
    fn find_many(&self, entity_type: &str, ids: &[EntityId]) -> BTreeSet<EntityId> {
        ids.iter()
            .filter(|id| self.exists(entity_type, id))
            .cloned()
            .collect()
    }
}

#[derive(Debug, Default)]
struct KnownType {
    strategy: IdStrategy,
    ids: BTreeSet<EntityId>,
}

/// In-memory [`EntityResolver`] for tests and embedding.
///
/// Counts every lookup so callers can verify batching.
#[derive(Debug, Default)]
pub struct InMemoryEntityResolver {
    types: RwLock<HashMap<String, KnownType>>,
    lookups: AtomicUsize,
}

impl InMemoryEntityResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_type(&self, entity_type: impl Into<String>, strategy: IdStrategy) {
        let mut types = self.types.write().expect("lock poisoned");
        types.entry(entity_type.into()).or_default().strategy = strategy;
    }

    /// Record that an entity exists, registering its type on first use.
    pub fn insert(&self, entity_type: impl Into<String>, id: impl Into<EntityId>) {
        let id = id.into();
        let mut types = self.types.write().expect("lock poisoned");
        let known = types.entry(entity_type.into()).or_insert_with(|| KnownType {
            strategy: id.strategy(),
            ids: BTreeSet::new(),
        });
        known.ids.insert(id);
    }

    pub fn remove(&self, entity_type: &str, id: &EntityId) -> bool {
        let mut types = self.types.write().expect("lock poisoned");
        types
            .get_mut(entity_type)
            .map(|known| known.ids.remove(id))
            .unwrap_or(false)
    }

    /// Number of lookups served so far.
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::Relaxed)
    }
}

impl EntityResolver for InMemoryEntityResolver {
    fn knows_type(&self, entity_type: &str) -> bool {
        let types = self.types.read().expect("lock poisoned");
        types.contains_key(entity_type)
    }

    fn id_strategy(&self, entity_type: &str) -> IdStrategy {
        let types = self.types.read().expect("lock poisoned");
        types.get(entity_type).map(|k| k.strategy).unwrap_or_default()
    }

    fn exists(&self, entity_type: &str, id: &EntityId) -> bool {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        let types = self.types.read().expect("lock poisoned");
        types
            .get(entity_type)
            .is_some_and(|known| known.ids.contains(id))
    }

    fn find_many(&self, entity_type: &str, ids: &[EntityId]) -> BTreeSet<EntityId> {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        let types = self.types.read().expect("lock poisoned");
        match types.get(entity_type) {
            Some(known) => ids.iter().filter(|id| known.ids.contains(id)).cloned().collect(),
            None => BTreeSet::new(),
        }
    }
}

fn not_found(entity_type: &str, id: &str) -> CodecError {
    CodecError::ReferenceNotFound {
        entity_type: entity_type.to_string(),
        id: id.to_string(),
    }
}

// ---------------------------------------------------------------------------
// ModelHandler
// ---------------------------------------------------------------------------

/// Handler for a single entity reference, stored as `<type>#<id>` (or just
/// `<type>` for a transient instance).
///
/// A persisted reference whose target has since been deleted is a hard
/// [`CodecError::ReferenceNotFound`] on read.
#[derive(Clone)]
pub struct ModelHandler {
    resolver: Arc<dyn EntityResolver>,
}

impl ModelHandler {
    pub fn new(resolver: Arc<dyn EntityResolver>) -> Self {
        Self { resolver }
    }
}

impl TypeHandler for ModelHandler {
    fn type_id(&self) -> &str {
        type_ids::MODEL
    }

    fn can_handle(&self, value: &MetaValue) -> bool {
        matches!(value, MetaValue::Entity(_))
    }

    fn serialize(&self, value: &MetaValue) -> CodecResult<String> {
        match value {
            MetaValue::Entity(EntityRef {
                entity_type,
                id: Some(id),
            }) => Ok(format!("{entity_type}#{id}")),
            MetaValue::Entity(EntityRef { entity_type, id: None }) => Ok(entity_type.clone()),
            other => Err(CodecError::unsupported(self.type_id(), other)),
        }
    }

    fn deserialize(&self, raw: Option<&str>) -> CodecResult<MetaValue> {
        let Some(raw) = raw else {
            return Ok(MetaValue::Null);
        };
        let Some((entity_type, id_text)) = raw.split_once('#') else {
            return Ok(MetaValue::Entity(EntityRef::transient(raw)));
        };
        if !self.resolver.knows_type(entity_type) {
            return Err(not_found(entity_type, id_text));
        }
        let id = self
            .resolver
            .id_strategy(entity_type)
            .parse(id_text)
            .map_err(|_| not_found(entity_type, id_text))?;
        if !self.resolver.exists(entity_type, &id) {
            return Err(not_found(entity_type, id_text));
        }
        Ok(MetaValue::Entity(EntityRef::persisted(entity_type, id)))
    }
}

// ---------------------------------------------------------------------------
// CollectionHandler
// ---------------------------------------------------------------------------

/// Handler for keyed collections of entity references.
///
/// Stored as `{"class": .., "items": {key: {"class": .., "key": id|null}}}`.
/// Reads batch existence checks per entity class and silently drop items
/// whose target is gone.
#[derive(Clone)]
pub struct CollectionHandler {
    resolver: Arc<dyn EntityResolver>,
}

impl CollectionHandler {
    pub fn new(resolver: Arc<dyn EntityResolver>) -> Self {
        Self { resolver }
    }

    fn parse_id(&self, class: &str, key: &JsonValue) -> Option<EntityId> {
        let text = match key {
            JsonValue::String(s) => s.clone(),
            JsonValue::Number(n) => n.to_string(),
            _ => return None,
        };
        self.resolver.id_strategy(class).parse(&text).ok()
    }
}

impl TypeHandler for CollectionHandler {
    fn type_id(&self) -> &str {
        type_ids::COLLECTION
    }

    fn can_handle(&self, value: &MetaValue) -> bool {
        matches!(value, MetaValue::Collection(_))
    }

    fn serialize(&self, value: &MetaValue) -> CodecResult<String> {
        let MetaValue::Collection(collection) = value else {
            return Err(CodecError::unsupported(self.type_id(), value));
        };
        let items: Map<String, JsonValue> = collection
            .items
            .iter()
            .map(|(key, item)| {
                let id = item.id.as_ref().map(EntityId::to_json).unwrap_or(JsonValue::Null);
                (key.clone(), json!({"class": item.entity_type, "key": id}))
            })
            .collect();
        let envelope = json!({"class": collection.collection_type, "items": items});
        serde_json::to_string(&envelope).map_err(|e| CodecError::malformed(self.type_id(), e.to_string()))
    }

    fn deserialize(&self, raw: Option<&str>) -> CodecResult<MetaValue> {
        let Some(raw) = raw else {
            return Ok(MetaValue::Null);
        };
        let envelope: JsonValue = serde_json::from_str(raw)
            .map_err(|e| CodecError::malformed(self.type_id(), e.to_string()))?;
        let class = envelope
            .get("class")
            .and_then(JsonValue::as_str)
            .ok_or_else(|| CodecError::malformed(self.type_id(), "missing collection class"))?;
        let items = envelope
            .get("items")
            .and_then(JsonValue::as_object)
            .ok_or_else(|| CodecError::malformed(self.type_id(), "missing collection items"))?;

        // Pass 1: decode entries and group persisted ids by class.
        let mut entries = Vec::with_capacity(items.len());
        let mut wanted: BTreeMap<String, Vec<EntityId>> = BTreeMap::new();
        for (key, item) in items {
            let Some(item_class) = item.get("class").and_then(JsonValue::as_str) else {
                warn!(key, "collection item without class dropped");
                continue;
            };
            match item.get("key").unwrap_or(&JsonValue::Null) {
                JsonValue::Null => entries.push((key.clone(), EntityRef::transient(item_class))),
                id_json => match self.parse_id(item_class, id_json) {
                    Some(id) => {
                        wanted.entry(item_class.to_string()).or_default().push(id.clone());
                        entries.push((key.clone(), EntityRef::persisted(item_class, id)));
                    }
                    None => warn!(key, class = item_class, "malformed collection item id dropped"),
                },
            }
        }

        // Pass 2: one lookup per class.
        let found: HashMap<String, BTreeSet<EntityId>> = wanted
            .into_iter()
            .map(|(item_class, ids)| {
                let hits = self.resolver.find_many(&item_class, &ids);
                debug!(class = %item_class, requested = ids.len(), found = hits.len(), "resolved collection items");
                (item_class, hits)
            })
            .collect();

        let mut collection = EntityCollection::new(class);
        for (key, item) in entries {
            let keep = match &item.id {
                None => true,
                Some(id) => found.get(&item.entity_type).is_some_and(|hits| hits.contains(id)),
            };
            if keep {
                collection.insert(key, item);
            } else {
                warn!(key, class = %item.entity_type, "stale collection item dropped");
            }
        }
        Ok(MetaValue::Collection(collection))
    }
}
