use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use metable_types::{EnumBacking, EnumMember, MetaValue};
use tracing::{debug, warn};

use crate::error::{CodecError, CodecResult};
use crate::handler::{type_ids, TypeHandler};

const SEPARATOR: &str = "::";

#[derive(Clone, Debug)]
enum EnumShape {
    Backed(Vec<EnumBacking>),
    Pure,
}

/// The enumerations known to the host application.
///
/// Stored enum values name their type, so reading history back needs to
/// know which types still exist, whether they are backed, and which backing
/// values they still have.
#[derive(Debug, Default)]
pub struct EnumCatalog {
    enums: RwLock<HashMap<String, EnumShape>>,
}

impl EnumCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or redefine) a backed enumeration and its backing values.
    pub fn register_backed(
        &self,
        enum_type: impl Into<String>,
        values: impl IntoIterator<Item = EnumBacking>,
    ) {
        let mut enums = self.enums.write().expect("lock poisoned");
        enums.insert(enum_type.into(), EnumShape::Backed(values.into_iter().collect()));
    }

    /// Register an enumeration without backing values. Such types can not be
    /// stored, and references to them read back as null.
    pub fn register_pure(&self, enum_type: impl Into<String>) {
        let mut enums = self.enums.write().expect("lock poisoned");
        enums.insert(enum_type.into(), EnumShape::Pure);
    }

    pub fn remove(&self, enum_type: &str) {
        let mut enums = self.enums.write().expect("lock poisoned");
        enums.remove(enum_type);
    }

    pub fn contains(&self, enum_type: &str) -> bool {
        let enums = self.enums.read().expect("lock poisoned");
        enums.contains_key(enum_type)
    }

    pub fn is_backed(&self, enum_type: &str) -> bool {
        let enums = self.enums.read().expect("lock poisoned");
        matches!(enums.get(enum_type), Some(EnumShape::Backed(_)))
    }

    /// Look up the member of `enum_type` whose backing value renders as `text`.
    pub fn resolve(&self, enum_type: &str, text: &str) -> Option<EnumMember> {
        let enums = self.enums.read().expect("lock poisoned");
        match enums.get(enum_type)? {
            EnumShape::Backed(values) => values
                .iter()
                .find(|backing| backing.to_string() == text)
                .map(|backing| EnumMember::new(enum_type, backing.clone())),
            EnumShape::Pure => None,
        }
    }
}

/// Handler for backed enumeration members, stored as `<type>::<backing>`.
///
/// Reads never fail: a type or case that has disappeared since the value
/// was written reads back as null.
#[derive(Debug, Clone, Default)]
pub struct EnumHandler {
    catalog: Arc<EnumCatalog>,
}

impl EnumHandler {
    pub fn new(catalog: Arc<EnumCatalog>) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &Arc<EnumCatalog> {
        &self.catalog
    }
}

impl TypeHandler for EnumHandler {
    fn type_id(&self) -> &str {
        type_ids::ENUM
    }

    fn can_handle(&self, value: &MetaValue) -> bool {
        matches!(value, MetaValue::Enum(_))
    }

    fn serialize(&self, value: &MetaValue) -> CodecResult<String> {
        match value {
            MetaValue::Enum(member) => Ok(format!("{}{SEPARATOR}{}", member.enum_type, member.backing)),
            other => Err(CodecError::unsupported(self.type_id(), other)),
        }
    }

    fn deserialize(&self, raw: Option<&str>) -> CodecResult<MetaValue> {
        let Some(raw) = raw else {
            return Ok(MetaValue::Null);
        };
        // Type names contain the separator themselves, so try every split.
        for (pos, _) in raw.match_indices(SEPARATOR) {
            let enum_type = &raw[..pos];
            let backing = &raw[pos + SEPARATOR.len()..];
            if !self.catalog.is_backed(enum_type) {
                continue;
            }
            if let Some(member) = self.catalog.resolve(enum_type, backing) {
                debug!(enum_type, backing, "resolved enum member");
                return Ok(MetaValue::Enum(member));
            }
        }
        warn!(raw, "stale enum reference, reading as null");
        Ok(MetaValue::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> Arc<EnumCatalog> {
        let catalog = EnumCatalog::new();
        catalog.register_backed(
            "app::Status",
            [EnumBacking::Str("active".into()), EnumBacking::Str("banned".into())],
        );
        catalog.register_backed("app::Priority", [EnumBacking::Int(1), EnumBacking::Int(2)]);
        catalog.register_pure("app::Suit");
        Arc::new(catalog)
    }

    #[test]
    fn string_and_int_backed_roundtrip() {
        let handler = EnumHandler::new(catalog());
        let status = MetaValue::Enum(EnumMember::str("app::Status", "banned"));
        let text = handler.serialize(&status).unwrap();
        assert_eq!(text, "app::Status::banned");
        assert_eq!(handler.deserialize(Some(&text)).unwrap(), status);

        let priority = MetaValue::Enum(EnumMember::int("app::Priority", 2));
        let text = handler.serialize(&priority).unwrap();
        assert_eq!(text, "app::Priority::2");
        assert_eq!(handler.deserialize(Some(&text)).unwrap(), priority);
    }

    #[test]
    fn stale_references_read_as_null() {
        let catalog = catalog();
        let handler = EnumHandler::new(catalog.clone());
        assert_eq!(handler.deserialize(Some("app::Status::deleted")).unwrap(), MetaValue::Null);
        assert_eq!(handler.deserialize(Some("app::Gone::1")).unwrap(), MetaValue::Null);
        assert_eq!(handler.deserialize(Some("app::Suit::hearts")).unwrap(), MetaValue::Null);
        assert_eq!(handler.deserialize(Some("no separator")).unwrap(), MetaValue::Null);
        assert_eq!(handler.deserialize(None).unwrap(), MetaValue::Null);

        catalog.remove("app::Status");
        assert_eq!(handler.deserialize(Some("app::Status::active")).unwrap(), MetaValue::Null);
    }

    #[test]
    fn only_claims_enum_members() {
        let handler = EnumHandler::new(catalog());
        assert!(handler.can_handle(&MetaValue::Enum(EnumMember::int("x::Y", 1))));
        assert!(!handler.can_handle(&MetaValue::Str("app::Status::active".into())));
        assert!(handler.serialize(&MetaValue::Int(1)).is_err());
    }
}
