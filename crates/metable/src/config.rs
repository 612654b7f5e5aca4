use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use metable_codec::{EntityResolver, EnumCatalog, HandlerRegistry, DEFAULT_HANDLER_ORDER};
use metable_store::MetaTableSchema;
use metable_types::IdStrategy;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{MetableError, MetableResult};

/// Deployment configuration.
///
/// ```toml
/// handlers = ["boolean", "null", "integer", "float", "string"]
/// auto_migrate = false
/// publish_date_column = "published_at"
/// id_strategy = "ulid"
/// table = "meta"
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetaConfig {
    /// Registry bootstrap, in classification priority order.
    pub handlers: Vec<String>,
    /// Whether the host should create the meta table on startup.
    pub auto_migrate: bool,
    /// Column holding each record's publish time.
    pub publish_date_column: String,
    /// How record ids are minted and validated.
    pub id_strategy: IdStrategy,
    pub table: String,
}

impl Default for MetaConfig {
    fn default() -> Self {
        Self {
            handlers: DEFAULT_HANDLER_ORDER.iter().map(|s| s.to_string()).collect(),
            auto_migrate: true,
            publish_date_column: "published_at".into(),
            id_strategy: IdStrategy::Integer,
            table: "meta".into(),
        }
    }
}

impl MetaConfig {
    pub fn from_toml_str(text: &str) -> MetableResult<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> MetableResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        debug!(path = %path.display(), "loading meta config");
        Self::from_toml_str(&text)
    }

    /// Reject unknown or repeated handler names and blank identifiers.
    pub fn validate(&self) -> MetableResult<()> {
        let mut seen = HashSet::new();
        for handler in &self.handlers {
            if !DEFAULT_HANDLER_ORDER.contains(&handler.as_str()) {
                return Err(MetableError::Config(format!("unknown handler `{handler}`")));
            }
            if !seen.insert(handler.as_str()) {
                return Err(MetableError::Config(format!("handler `{handler}` listed twice")));
            }
        }
        if self.table.trim().is_empty() {
            return Err(MetableError::Config("table name is empty".into()));
        }
        if self.publish_date_column.trim().is_empty() {
            return Err(MetableError::Config("publish date column is empty".into()));
        }
        Ok(())
    }

    pub fn table_schema(&self) -> MetaTableSchema {
        MetaTableSchema::new(
            self.table.clone(),
            self.id_strategy,
            self.publish_date_column.clone(),
        )
    }

    /// Build the handler registry in configured order.
    pub fn build_registry(
        &self,
        resolver: Arc<dyn EntityResolver>,
        catalog: Arc<EnumCatalog>,
    ) -> MetableResult<HandlerRegistry> {
        self.validate()?;
        Ok(HandlerRegistry::from_type_ids(&self.handlers, resolver, catalog)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metable_codec::InMemoryEntityResolver;

    #[test]
    fn default_config() {
        let c = MetaConfig::default();
        assert_eq!(c.handlers.len(), 13);
        assert_eq!(c.handlers[0], "boolean");
        assert_eq!(c.handlers[12], "object");
        assert!(c.auto_migrate);
        assert_eq!(c.publish_date_column, "published_at");
        assert_eq!(c.id_strategy, IdStrategy::Integer);
        assert_eq!(c.table, "meta");
        assert!(c.validate().is_ok());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let c = MetaConfig::from_toml_str("id_strategy = \"uuid\"\nauto_migrate = false\n").unwrap();
        assert_eq!(c.id_strategy, IdStrategy::Uuid);
        assert!(!c.auto_migrate);
        assert_eq!(c.handlers, MetaConfig::default().handlers);
    }

    #[test]
    fn unknown_handler_rejected() {
        let err = MetaConfig::from_toml_str("handlers = [\"string\", \"money\"]").unwrap_err();
        assert!(matches!(err, MetableError::Config(msg) if msg.contains("money")));
    }

    #[test]
    fn duplicate_handler_rejected() {
        let err = MetaConfig::from_toml_str("handlers = [\"string\", \"string\"]").unwrap_err();
        assert!(matches!(err, MetableError::Config(_)));
    }

    #[test]
    fn malformed_toml() {
        assert!(matches!(
            MetaConfig::from_toml_str("handlers = "),
            Err(MetableError::Toml(_))
        ));
        assert!(matches!(
            MetaConfig::from_toml_str("id_strategy = \"serial\""),
            Err(MetableError::Toml(_))
        ));
    }

    #[test]
    fn registry_follows_configured_order() {
        let c = MetaConfig::from_toml_str("handlers = [\"string\", \"integer\"]").unwrap();
        let registry = c
            .build_registry(Arc::new(InMemoryEntityResolver::new()), Arc::new(EnumCatalog::new()))
            .unwrap();
        assert_eq!(registry.type_ids(), vec!["string", "integer"]);
    }

    #[test]
    fn table_schema_uses_overrides() {
        let c = MetaConfig::from_toml_str(
            "table = \"post_meta\"\npublish_date_column = \"live_at\"\nid_strategy = \"ulid\"",
        )
        .unwrap();
        let schema = c.table_schema();
        assert_eq!(schema.table, "post_meta");
        assert_eq!(schema.publish_column, "live_at");
        assert_eq!(schema.id_strategy, IdStrategy::Ulid);
    }
}
