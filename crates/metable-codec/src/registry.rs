use std::fmt;
use std::sync::Arc;

use metable_types::MetaValue;
use tracing::debug;

use crate::error::{CodecError, CodecResult};
use crate::handler::{type_ids, TypeHandler};
use crate::handlers::{
    ArrayHandler, BooleanHandler, CollectionHandler, DateHandler, DateTimeHandler, EntityResolver,
    EnumCatalog, EnumHandler, FloatHandler, InMemoryEntityResolver, IntegerHandler, ModelHandler,
    NullHandler, ObjectHandler, SerializableHandler, StringHandler,
};

/// Classification order of the default registry.
pub const DEFAULT_HANDLER_ORDER: [&str; 13] = [
    type_ids::BOOLEAN,
    type_ids::NULL,
    type_ids::INTEGER,
    type_ids::FLOAT,
    type_ids::STRING,
    type_ids::DATETIME,
    type_ids::DATE,
    type_ids::ARRAY,
    type_ids::MODEL,
    type_ids::COLLECTION,
    type_ids::SERIALIZABLE,
    type_ids::ENUM,
    type_ids::OBJECT,
];

// ---------------------------------------------------------------------------
// HandlerRegistry
// ---------------------------------------------------------------------------

/// Ordered set of type handlers, unique by type id.
///
/// Insertion order is classification priority. Built once at startup and
/// shared behind an `Arc`; the mutators exist for setup and tests.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: Vec<Arc<dyn TypeHandler>>,
}

impl HandlerRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The thirteen default handlers in [`DEFAULT_HANDLER_ORDER`].
    pub fn with_defaults(resolver: Arc<dyn EntityResolver>, catalog: Arc<EnumCatalog>) -> Self {
        let mut registry = Self::new();
        for type_id in DEFAULT_HANDLER_ORDER {
            if let Some(handler) = Self::builtin(type_id, &resolver, &catalog) {
                registry.add_handler(handler);
            }
        }
        registry
    }

    /// Build a registry from an ordered list of built-in type ids.
    pub fn from_type_ids<I, S>(
        type_ids: I,
        resolver: Arc<dyn EntityResolver>,
        catalog: Arc<EnumCatalog>,
    ) -> CodecResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut registry = Self::new();
        for type_id in type_ids {
            let type_id = type_id.as_ref();
            let handler = Self::builtin(type_id, &resolver, &catalog)
                .ok_or_else(|| CodecError::HandlerNotFound(type_id.to_string()))?;
            registry.add_handler(handler);
        }
        Ok(registry)
    }

    /// Construct the built-in handler for `type_id`, if there is one.
    pub fn builtin(
        type_id: &str,
        resolver: &Arc<dyn EntityResolver>,
        catalog: &Arc<EnumCatalog>,
    ) -> Option<Arc<dyn TypeHandler>> {
        let handler: Arc<dyn TypeHandler> = match type_id {
            type_ids::BOOLEAN => Arc::new(BooleanHandler),
            type_ids::NULL => Arc::new(NullHandler),
            type_ids::INTEGER => Arc::new(IntegerHandler),
            type_ids::FLOAT => Arc::new(FloatHandler),
            type_ids::STRING => Arc::new(StringHandler),
            type_ids::DATETIME => Arc::new(DateTimeHandler),
            type_ids::DATE => Arc::new(DateHandler),
            type_ids::ARRAY => Arc::new(ArrayHandler),
            type_ids::MODEL => Arc::new(ModelHandler::new(resolver.clone())),
            type_ids::COLLECTION => Arc::new(CollectionHandler::new(resolver.clone())),
            type_ids::SERIALIZABLE => Arc::new(SerializableHandler),
            type_ids::ENUM => Arc::new(EnumHandler::new(catalog.clone())),
            type_ids::OBJECT => Arc::new(ObjectHandler),
            _ => return None,
        };
        Some(handler)
    }

    /// Insert a handler. A new type id goes last; an existing one is
    /// replaced where it stands.
    pub fn add_handler(&mut self, handler: Arc<dyn TypeHandler>) {
        match self
            .handlers
            .iter()
            .position(|h| h.type_id() == handler.type_id())
        {
            Some(index) => self.handlers[index] = handler,
            None => self.handlers.push(handler),
        }
    }

    pub fn has_handler(&self, type_id: &str) -> bool {
        self.handlers.iter().any(|h| h.type_id() == type_id)
    }

    pub fn get_handler(&self, type_id: &str) -> CodecResult<&Arc<dyn TypeHandler>> {
        self.handlers
            .iter()
            .find(|h| h.type_id() == type_id)
            .ok_or_else(|| CodecError::HandlerNotFound(type_id.to_string()))
    }

    /// Remove the handler for `type_id`; no-op if absent.
    pub fn remove_handler(&mut self, type_id: &str) {
        self.handlers.retain(|h| h.type_id() != type_id);
    }

    /// Type id of the first handler that claims `value`.
    pub fn classify(&self, value: &MetaValue) -> CodecResult<&str> {
        self.handlers
            .iter()
            .find(|h| h.can_handle(value))
            .map(|h| h.type_id())
            .ok_or_else(|| CodecError::HandlerNotFound(value.describe()))
    }

    /// Serialize `value` to its `(raw, type_id)` storage pair.
    ///
    /// `forced` overrides classification. Null is stored as a null raw value.
    pub fn serialize(
        &self,
        value: &MetaValue,
        forced: Option<&str>,
    ) -> CodecResult<(Option<String>, String)> {
        let handler = match forced {
            Some(type_id) => self.get_handler(type_id)?,
            None => {
                let type_id = self.classify(value)?;
                self.get_handler(type_id)?
            }
        };
        let raw = if value.is_null() {
            None
        } else {
            Some(handler.serialize(value)?)
        };
        debug!(type_id = handler.type_id(), kind = value.kind_name(), "serialized meta value");
        Ok((raw, handler.type_id().to_string()))
    }

    /// Deserialize stored text with the handler registered for `type_id`.
    pub fn deserialize(&self, type_id: &str, raw: Option<&str>) -> CodecResult<MetaValue> {
        self.get_handler(type_id)?.deserialize(raw)
    }

    /// Numeric projection of `value` under `type_id`, if that type is numeric.
    pub fn numeric_value(&self, type_id: &str, value: &MetaValue) -> Option<f64> {
        self.get_handler(type_id).ok()?.numeric_value(value)
    }

    /// Registered type ids in classification order.
    pub fn type_ids(&self) -> Vec<&str> {
        self.handlers.iter().map(|h| h.type_id()).collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("handlers", &self.type_ids())
            .finish()
    }
}

/// A default registry with empty in-memory collaborators.
pub fn default_registry() -> HandlerRegistry {
    HandlerRegistry::with_defaults(
        Arc::new(InMemoryEntityResolver::new()),
        Arc::new(EnumCatalog::new()),
    )
}
