use std::fmt;

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::error::TypeError;
use crate::ids::EntityId;
use crate::time;

/// Class name given to objects rebuilt from their JSON form.
pub const GENERIC_OBJECT_CLASS: &str = "object";

/// A value that can be stored in a metadata slot.
///
/// Each variant is claimed by one (or, for the object catch-all, several)
/// type handlers, which turn it into stored text and back.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum MetaValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Date(NaiveDate),
    DateTime(DateTime<FixedOffset>),
    /// Ordered container of JSON primitives.
    List(Vec<JsonValue>),
    /// Keyed container of JSON primitives.
    Map(Map<String, JsonValue>),
    Object(DynObject),
    Enum(EnumMember),
    Entity(EntityRef),
    Collection(EntityCollection),
    Blob(OpaqueBlob),
}

impl MetaValue {
    /// Short name of the variant, used in diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "string",
            Self::Date(_) => "date",
            Self::DateTime(_) => "datetime",
            Self::List(_) => "list",
            Self::Map(_) => "map",
            Self::Object(_) => "object",
            Self::Enum(_) => "enum",
            Self::Entity(_) => "entity",
            Self::Collection(_) => "collection",
            Self::Blob(_) => "blob",
        }
    }

    /// Human-readable description used when no handler claims a value.
    pub fn describe(&self) -> String {
        match self {
            Self::Object(o) => format!("object of class {}", o.class),
            Self::Enum(e) => format!("enum {}", e.enum_type),
            Self::Entity(e) => format!("entity {}", e.entity_type),
            Self::Collection(c) => format!("collection {}", c.collection_type),
            Self::Blob(b) => format!("blob {}", b.tag),
            other => other.kind_name().to_string(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Scalars are the values the scalar handlers can coerce between.
    pub fn is_scalar(&self) -> bool {
        matches!(
            self,
            Self::Null | Self::Bool(_) | Self::Int(_) | Self::Float(_) | Self::Str(_)
        )
    }

    /// Object-like values are the ones the generic object handler may claim.
    pub fn is_object_like(&self) -> bool {
        matches!(
            self,
            Self::Object(_)
                | Self::Enum(_)
                | Self::Entity(_)
                | Self::Collection(_)
                | Self::Blob(_)
                | Self::DateTime(_)
        )
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Int(n) => Some(*n as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// JSON rendering of the value's public state.
    ///
    /// Class identity is not part of the output: the generic object handler
    /// uses this, which is why objects it stores come back as
    /// [`GENERIC_OBJECT_CLASS`].
    pub fn to_json(&self) -> JsonValue {
        match self {
            Self::Null => JsonValue::Null,
            Self::Bool(b) => JsonValue::Bool(*b),
            Self::Int(n) => JsonValue::from(*n),
            Self::Float(f) => serde_json::Number::from_f64(*f)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            Self::Str(s) => JsonValue::String(s.clone()),
            Self::Date(d) => JsonValue::String(time::format_date(d)),
            Self::DateTime(dt) => {
                let mut map = Map::new();
                map.insert("date".into(), dt.format("%Y-%m-%d %H:%M:%S%.6f").to_string().into());
                map.insert("timezone".into(), dt.format("%:z").to_string().into());
                JsonValue::Object(map)
            }
            Self::List(items) => JsonValue::Array(items.clone()),
            Self::Map(map) => JsonValue::Object(map.clone()),
            Self::Object(o) => JsonValue::Object(o.fields.clone()),
            Self::Enum(e) => {
                let mut map = Map::new();
                map.insert("name".into(), e.enum_type.clone().into());
                map.insert("value".into(), e.backing.to_json());
                JsonValue::Object(map)
            }
            Self::Entity(e) => e.to_json(),
            Self::Collection(c) => {
                let items = c
                    .items
                    .iter()
                    .map(|(key, item)| (key.clone(), item.to_json()))
                    .collect::<Map<_, _>>();
                JsonValue::Object(items)
            }
            Self::Blob(b) => {
                let mut map = Map::new();
                map.insert("tag".into(), b.tag.clone().into());
                map.insert("payload".into(), hex::encode(&b.payload).into());
                JsonValue::Object(map)
            }
        }
    }
}

impl fmt::Display for MetaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(n) => write!(f, "{n}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Str(s) => write!(f, "{s}"),
            Self::Date(d) => write!(f, "{}", time::format_date(d)),
            Self::DateTime(dt) => write!(f, "{}", time::format_datetime(dt)),
            other => write!(f, "{}", other.to_json()),
        }
    }
}

impl From<bool> for MetaValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for MetaValue {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<i32> for MetaValue {
    fn from(n: i32) -> Self {
        Self::Int(n.into())
    }
}

impl From<f64> for MetaValue {
    fn from(x: f64) -> Self {
        Self::Float(x)
    }
}

impl From<&str> for MetaValue {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for MetaValue {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<NaiveDate> for MetaValue {
    fn from(d: NaiveDate) -> Self {
        Self::Date(d)
    }
}

impl From<DateTime<FixedOffset>> for MetaValue {
    fn from(dt: DateTime<FixedOffset>) -> Self {
        Self::DateTime(dt)
    }
}

impl From<DateTime<Utc>> for MetaValue {
    fn from(dt: DateTime<Utc>) -> Self {
        Self::DateTime(dt.fixed_offset())
    }
}

impl From<Vec<JsonValue>> for MetaValue {
    fn from(items: Vec<JsonValue>) -> Self {
        Self::List(items)
    }
}

impl From<Map<String, JsonValue>> for MetaValue {
    fn from(map: Map<String, JsonValue>) -> Self {
        Self::Map(map)
    }
}

impl From<DynObject> for MetaValue {
    fn from(o: DynObject) -> Self {
        Self::Object(o)
    }
}

impl From<EnumMember> for MetaValue {
    fn from(e: EnumMember) -> Self {
        Self::Enum(e)
    }
}

impl From<EntityRef> for MetaValue {
    fn from(e: EntityRef) -> Self {
        Self::Entity(e)
    }
}

impl From<EntityCollection> for MetaValue {
    fn from(c: EntityCollection) -> Self {
        Self::Collection(c)
    }
}

impl From<OpaqueBlob> for MetaValue {
    fn from(b: OpaqueBlob) -> Self {
        Self::Blob(b)
    }
}

impl<T: Into<MetaValue>> From<Option<T>> for MetaValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Self::Null)
    }
}

// ---------------------------------------------------------------------------
// Payload types
// ---------------------------------------------------------------------------

/// An instance of some class, known only by its public fields.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DynObject {
    pub class: String,
    pub fields: Map<String, JsonValue>,
}

impl DynObject {
    pub fn new(class: impl Into<String>, fields: Map<String, JsonValue>) -> Self {
        Self {
            class: class.into(),
            fields,
        }
    }

    /// An object of [`GENERIC_OBJECT_CLASS`].
    pub fn generic(fields: Map<String, JsonValue>) -> Self {
        Self::new(GENERIC_OBJECT_CLASS, fields)
    }

    pub fn get(&self, field: &str) -> Option<&JsonValue> {
        self.fields.get(field)
    }
}

/// Backing value of a backed enumeration member.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EnumBacking {
    Int(i64),
    Str(String),
}

impl EnumBacking {
    pub fn to_json(&self) -> JsonValue {
        match self {
            Self::Int(n) => JsonValue::from(*n),
            Self::Str(s) => JsonValue::String(s.clone()),
        }
    }
}

impl fmt::Display for EnumBacking {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(n) => write!(f, "{n}"),
            Self::Str(s) => write!(f, "{s}"),
        }
    }
}

/// A member of a backed enumeration, identified by its backing value.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EnumMember {
    /// Fully-qualified enumeration type name.
    pub enum_type: String,
    pub backing: EnumBacking,
}

impl EnumMember {
    pub fn new(enum_type: impl Into<String>, backing: EnumBacking) -> Self {
        Self {
            enum_type: enum_type.into(),
            backing,
        }
    }

    pub fn int(enum_type: impl Into<String>, value: i64) -> Self {
        Self::new(enum_type, EnumBacking::Int(value))
    }

    pub fn str(enum_type: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(enum_type, EnumBacking::Str(value.into()))
    }
}

/// Reference to an owner entity. `id` is `None` for a transient instance
/// that has never been persisted.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub entity_type: String,
    pub id: Option<EntityId>,
}

impl EntityRef {
    pub fn transient(entity_type: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            id: None,
        }
    }

    pub fn persisted(entity_type: impl Into<String>, id: impl Into<EntityId>) -> Self {
        Self {
            entity_type: entity_type.into(),
            id: Some(id.into()),
        }
    }

    pub fn is_persisted(&self) -> bool {
        self.id.is_some()
    }

    fn to_json(&self) -> JsonValue {
        let mut map = Map::new();
        map.insert("entity_type".into(), self.entity_type.clone().into());
        map.insert(
            "id".into(),
            self.id.as_ref().map(EntityId::to_json).unwrap_or(JsonValue::Null),
        );
        JsonValue::Object(map)
    }
}

/// Keyed collection of entity references, preserving item order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityCollection {
    pub collection_type: String,
    pub items: Vec<(String, EntityRef)>,
}

impl EntityCollection {
    pub fn new(collection_type: impl Into<String>) -> Self {
        Self {
            collection_type: collection_type.into(),
            items: Vec::new(),
        }
    }

    /// Append an item under the next integer key.
    pub fn push(&mut self, item: EntityRef) {
        let key = self.items.len().to_string();
        self.items.push((key, item));
    }

    /// Insert or replace an item under an explicit key.
    pub fn insert(&mut self, key: impl Into<String>, item: EntityRef) {
        let key = key.into();
        match self.items.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = item,
            None => self.items.push((key, item)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&EntityRef> {
        self.items.iter().find(|(k, _)| k == key).map(|(_, item)| item)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(|(k, _)| k.as_str())
    }
}

/// Opaque serialized value of an explicitly serializable type.
///
/// The payload is produced with `bincode`; the tag names the Rust type so a
/// reader knows what to unpack it as.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OpaqueBlob {
    pub tag: String,
    pub payload: Vec<u8>,
}

impl OpaqueBlob {
    pub fn pack<T: Serialize>(tag: impl Into<String>, value: &T) -> Result<Self, TypeError> {
        let payload =
            bincode::serialize(value).map_err(|e| TypeError::Serialization(e.to_string()))?;
        Ok(Self {
            tag: tag.into(),
            payload,
        })
    }

    pub fn unpack<T: DeserializeOwned>(&self) -> Result<T, TypeError> {
        bincode::deserialize(&self.payload).map_err(|e| TypeError::Serialization(e.to_string()))
    }

    /// Stored text form: `<tag>:<hex payload>`.
    pub fn to_text(&self) -> String {
        format!("{}:{}", self.tag, hex::encode(&self.payload))
    }

    pub fn from_text(text: &str) -> Result<Self, TypeError> {
        let (tag, payload) = text
            .rsplit_once(':')
            .ok_or_else(|| TypeError::InvalidBlob(format!("missing tag separator in {text:?}")))?;
        if tag.is_empty() {
            return Err(TypeError::InvalidBlob("empty tag".into()));
        }
        let payload = hex::decode(payload).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        Ok(Self {
            tag: tag.to_string(),
            payload,
        })
    }
}
