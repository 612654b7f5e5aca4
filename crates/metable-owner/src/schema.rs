use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use metable_store::normalize_key;
use metable_types::MetaValue;
use serde::{Deserialize, Serialize};

/// Kinds of real owner attributes a meta key may collide with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttributeKind {
    /// A backing-store column.
    Column,
    /// A relation accessor.
    Relation,
    /// An attribute with a custom mutator.
    Mutator,
    /// An attribute cast to an enum or class.
    ClassCast,
    /// A path into a JSON column, e.g. `settings->theme`.
    JsonPath,
}

impl fmt::Display for AttributeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Column => "column",
            Self::Relation => "relation",
            Self::Mutator => "mutator",
            Self::ClassCast => "class-cast",
            Self::JsonPath => "json-path",
        };
        write!(f, "{s}")
    }
}

/// Value transform applied on the way into or out of storage.
pub type ValueHook = Arc<dyn Fn(MetaValue) -> MetaValue + Send + Sync>;

/// Per-owner-type metadata declaration.
///
/// Holds the allow-list, the catalog of real attributes that meta keys must
/// not shadow, and the key-specific mutator and accessor hooks. Attribute
/// and key names are case-insensitive.
#[derive(Clone, Default)]
pub struct MetaSchema {
    owner_type: String,
    wildcard: bool,
    allowed: BTreeMap<String, Option<String>>,
    meta_attributes: BTreeSet<String>,
    attributes: BTreeMap<String, AttributeKind>,
    mutators: HashMap<String, ValueHook>,
    accessors: HashMap<String, ValueHook>,
}

impl MetaSchema {
    pub fn new(owner_type: impl Into<String>) -> Self {
        Self {
            owner_type: owner_type.into(),
            ..Self::default()
        }
    }

    /// Allow a key; `*` allows every key that does not collide.
    pub fn allow(mut self, key: &str) -> Self {
        if key.trim() == "*" {
            self.wildcard = true;
        } else {
            self.allowed.insert(normalize_key(key), None);
        }
        self
    }

    pub fn allow_keys<'k>(self, keys: impl IntoIterator<Item = &'k str>) -> Self {
        keys.into_iter().fold(self, Self::allow)
    }

    /// Allow a key whose values are always stored as `type_id`.
    pub fn allow_typed(mut self, key: &str, type_id: &str) -> Self {
        self.allowed.insert(normalize_key(key), Some(type_id.to_string()));
        self
    }

    /// Declare an attribute as meta-backed. It is explicitly allowed even
    /// when a column of the same name exists, and the meta value wins on read.
    pub fn meta_attribute(mut self, key: &str) -> Self {
        self.meta_attributes.insert(normalize_key(key));
        self
    }

    pub fn attribute(mut self, name: &str, kind: AttributeKind) -> Self {
        self.attributes.insert(normalize_key(name), kind);
        self
    }

    pub fn columns<'c>(self, names: impl IntoIterator<Item = &'c str>) -> Self {
        names
            .into_iter()
            .fold(self, |schema, name| schema.attribute(name, AttributeKind::Column))
    }

    pub fn relation(self, name: &str) -> Self {
        self.attribute(name, AttributeKind::Relation)
    }

    pub fn with_mutator(
        mut self,
        key: &str,
        hook: impl Fn(MetaValue) -> MetaValue + Send + Sync + 'static,
    ) -> Self {
        self.mutators.insert(normalize_key(key), Arc::new(hook));
        self
    }

    pub fn with_accessor(
        mut self,
        key: &str,
        hook: impl Fn(MetaValue) -> MetaValue + Send + Sync + 'static,
    ) -> Self {
        self.accessors.insert(normalize_key(key), Arc::new(hook));
        self
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn owner_type(&self) -> &str {
        &self.owner_type
    }

    pub fn allows_wildcard(&self) -> bool {
        self.wildcard
    }

    /// Whether `key` is allow-listed by name or declared meta-backed.
    pub fn is_explicit(&self, key: &str) -> bool {
        self.allowed.contains_key(key) || self.meta_attributes.contains(key)
    }

    /// Type every value of `key` is forced to, if declared.
    pub fn forced_type(&self, key: &str) -> Option<&str> {
        self.allowed.get(key).and_then(|t| t.as_deref())
    }

    /// The real attribute `key` would shadow, if any.
    ///
    /// `a->b` and `a.b` paths collide when `a` is a column or cast attribute.
    pub fn attribute_kind(&self, key: &str) -> Option<AttributeKind> {
        if let Some(kind) = self.attributes.get(key) {
            return Some(*kind);
        }
        let root = key.split("->").next().and_then(|k| k.split('.').next())?;
        if root == key {
            return None;
        }
        match self.attributes.get(root) {
            Some(AttributeKind::Column | AttributeKind::ClassCast) => Some(AttributeKind::JsonPath),
            _ => None,
        }
    }

    /// Apply the mutator hook for `key`, if any.
    pub fn mutate(&self, key: &str, value: MetaValue) -> MetaValue {
        match self.mutators.get(key) {
            Some(hook) => hook(value),
            None => value,
        }
    }

    /// Apply the accessor hook for `key`, if any.
    pub fn access(&self, key: &str, value: MetaValue) -> MetaValue {
        match self.accessors.get(key) {
            Some(hook) => hook(value),
            None => value,
        }
    }
}

impl fmt::Debug for MetaSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetaSchema")
            .field("owner_type", &self.owner_type)
            .field("wildcard", &self.wildcard)
            .field("allowed", &self.allowed)
            .field("meta_attributes", &self.meta_attributes)
            .field("attributes", &self.attributes)
            .field("mutators", &self.mutators.keys().collect::<Vec<_>>())
            .field("accessors", &self.accessors.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allow_list_and_wildcard() {
        let schema = MetaSchema::new("post").allow_keys(["Color", "size"]);
        assert!(schema.is_explicit("color"));
        assert!(!schema.allows_wildcard());
        let schema = schema.allow("*");
        assert!(schema.allows_wildcard());
        assert!(!schema.is_explicit("*"));
    }

    #[test]
    fn typed_and_meta_backed_keys() {
        let schema = MetaSchema::new("post")
            .allow_typed("age", "integer")
            .meta_attribute("title");
        assert_eq!(schema.forced_type("age"), Some("integer"));
        assert_eq!(schema.forced_type("title"), None);
        assert!(schema.is_explicit("title"));
    }

    #[test]
    fn json_paths_collide_with_their_root() {
        let schema = MetaSchema::new("post")
            .columns(["settings", "title"])
            .relation("author");
        assert_eq!(schema.attribute_kind("settings->theme"), Some(AttributeKind::JsonPath));
        assert_eq!(schema.attribute_kind("settings.theme"), Some(AttributeKind::JsonPath));
        assert_eq!(schema.attribute_kind("author"), Some(AttributeKind::Relation));
        assert_eq!(schema.attribute_kind("author.name"), None);
        assert_eq!(schema.attribute_kind("color"), None);
    }

    #[test]
    fn hooks() {
        let schema = MetaSchema::new("post")
            .with_mutator("slug", |v| match v {
                MetaValue::Str(s) => MetaValue::Str(s.to_lowercase().replace(' ', "-")),
                other => other,
            })
            .with_accessor("slug", |v| match v {
                MetaValue::Str(s) => MetaValue::Str(format!("/{s}")),
                other => other,
            });
        let stored = schema.mutate("slug", MetaValue::from("Hello World"));
        assert_eq!(stored, MetaValue::from("hello-world"));
        assert_eq!(schema.access("slug", stored), MetaValue::from("/hello-world"));
        assert_eq!(schema.mutate("other", MetaValue::Int(1)), MetaValue::Int(1));
    }
}
