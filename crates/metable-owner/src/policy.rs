use metable_store::normalize_key;

use crate::error::{MetaError, MetaResult};
use crate::schema::{AttributeKind, MetaSchema};

/// How the key policy classifies one key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyAccess {
    /// Allow-listed by name or meta-backed. Meta always wins on read.
    Explicit,
    /// Allowed by the wildcard or an unguarded context. A non-null real
    /// attribute wins on read.
    Allowed,
    /// Names a real attribute without being explicitly allowed.
    Collision(AttributeKind),
    /// Not allowed at all.
    Denied,
}

impl KeyAccess {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Explicit | Self::Allowed)
    }
}

/// Evaluates keys against one owner schema.
#[derive(Clone, Copy, Debug)]
pub struct KeyPolicy<'a> {
    schema: &'a MetaSchema,
    unguarded: bool,
}

impl<'a> KeyPolicy<'a> {
    pub fn new(schema: &'a MetaSchema, unguarded: bool) -> Self {
        Self { schema, unguarded }
    }

    /// Classify an already normalized key.
    pub fn evaluate(&self, key: &str) -> KeyAccess {
        let explicit = self.schema.is_explicit(key);
        if self.unguarded {
            return if explicit {
                KeyAccess::Explicit
            } else {
                KeyAccess::Allowed
            };
        }
        if explicit {
            return KeyAccess::Explicit;
        }
        if let Some(kind) = self.schema.attribute_kind(key) {
            return KeyAccess::Collision(kind);
        }
        if self.schema.allows_wildcard() {
            KeyAccess::Allowed
        } else {
            KeyAccess::Denied
        }
    }

    /// Normalize `key` and reject it if it may not be written.
    pub fn check_write(&self, key: &str) -> MetaResult<String> {
        let key = normalize_key(key);
        match self.evaluate(&key) {
            KeyAccess::Explicit | KeyAccess::Allowed => Ok(key),
            KeyAccess::Collision(kind) => Err(MetaError::ModelAttributeCollision {
                owner_type: self.schema.owner_type().to_string(),
                key,
                kind,
            }),
            KeyAccess::Denied => Err(MetaError::InvalidKey {
                owner_type: self.schema.owner_type().to_string(),
                key,
            }),
        }
    }

    /// Check a whole batch before anything is touched.
    pub fn check_all<I, S>(&self, keys: I) -> MetaResult<Vec<String>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        keys.into_iter()
            .map(|key| self.check_write(key.as_ref()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> MetaSchema {
        MetaSchema::new("post")
            .allow("color")
            .meta_attribute("title")
            .columns(["title", "body", "settings"])
            .relation("author")
    }

    #[test]
    fn first_match_wins() {
        let schema = schema();
        let policy = KeyPolicy::new(&schema, false);
        assert_eq!(policy.evaluate("color"), KeyAccess::Explicit);
        assert_eq!(policy.evaluate("title"), KeyAccess::Explicit);
        assert_eq!(policy.evaluate("body"), KeyAccess::Collision(AttributeKind::Column));
        assert_eq!(policy.evaluate("author"), KeyAccess::Collision(AttributeKind::Relation));
        assert_eq!(
            policy.evaluate("settings->theme"),
            KeyAccess::Collision(AttributeKind::JsonPath)
        );
        assert_eq!(policy.evaluate("size"), KeyAccess::Denied);

        let wildcard = schema.clone().allow("*");
        let policy = KeyPolicy::new(&wildcard, false);
        assert_eq!(policy.evaluate("size"), KeyAccess::Allowed);
        assert_eq!(policy.evaluate("body"), KeyAccess::Collision(AttributeKind::Column));
    }

    #[test]
    fn unguarded_allows_everything() {
        let schema = schema();
        let policy = KeyPolicy::new(&schema, true);
        assert_eq!(policy.evaluate("body"), KeyAccess::Allowed);
        assert_eq!(policy.evaluate("anything"), KeyAccess::Allowed);
        assert_eq!(policy.evaluate("color"), KeyAccess::Explicit);
    }

    #[test]
    fn write_errors_are_distinct() {
        let schema = schema();
        let policy = KeyPolicy::new(&schema, false);
        assert_eq!(policy.check_write("COLOR").unwrap(), "color");
        let collision = policy.check_write("Body").unwrap_err();
        assert!(matches!(collision, MetaError::ModelAttributeCollision { ref key, .. } if key == "body"));
        assert!(collision.to_string().contains("collides"));
        let invalid = policy.check_write("size").unwrap_err();
        assert!(matches!(invalid, MetaError::InvalidKey { .. }));
        assert!(invalid.is_invalid_key() && collision.is_invalid_key());
    }

    #[test]
    fn batch_check_fails_as_a_whole() {
        let schema = schema();
        let policy = KeyPolicy::new(&schema, false);
        assert_eq!(policy.check_all(["color", "title"]).unwrap(), vec!["color", "title"]);
        assert!(policy.check_all(["color", "size"]).is_err());
    }
}
