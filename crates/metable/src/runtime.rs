use std::sync::Arc;

use metable_codec::{EntityResolver, EnumCatalog, HandlerRegistry, InMemoryEntityResolver};
use metable_owner::{MetaContext, MetaObserver, NullObserver};
use metable_store::{InMemoryMetaStore, MetaQuery, MetaStore};
use metable_types::EntityId;
use tracing::info;

use crate::config::MetaConfig;
use crate::error::{MetableError, MetableResult};

/// Everything an application needs to work with metadata, wired from one
/// [`MetaConfig`].
#[derive(Clone)]
pub struct MetaRuntime {
    config: MetaConfig,
    registry: Arc<HandlerRegistry>,
    store: Arc<dyn MetaStore>,
    resolver: Arc<dyn EntityResolver>,
    catalog: Arc<EnumCatalog>,
    observer: Arc<dyn MetaObserver>,
}

impl MetaRuntime {
    /// Wire a runtime over caller-supplied collaborators. The store must mint
    /// ids of the configured strategy.
    pub fn new(
        config: MetaConfig,
        store: Arc<dyn MetaStore>,
        resolver: Arc<dyn EntityResolver>,
        catalog: Arc<EnumCatalog>,
    ) -> MetableResult<Self> {
        if store.id_strategy() != config.id_strategy {
            return Err(MetableError::Config(format!(
                "store mints {} ids but config requires {}",
                store.id_strategy(),
                config.id_strategy
            )));
        }
        let registry = Arc::new(config.build_registry(resolver.clone(), catalog.clone())?);
        info!(
            handlers = registry.len(),
            id_strategy = %config.id_strategy,
            table = %config.table,
            "meta runtime ready"
        );
        Ok(Self {
            config,
            registry,
            store,
            resolver,
            catalog,
            observer: Arc::new(NullObserver),
        })
    }

    /// A runtime backed by in-memory collaborators.
    pub fn in_memory(config: MetaConfig) -> MetableResult<Self> {
        let store = Arc::new(InMemoryMetaStore::with_strategy(config.id_strategy));
        Self::new(
            config,
            store,
            Arc::new(InMemoryEntityResolver::new()),
            Arc::new(EnumCatalog::new()),
        )
    }

    pub fn with_observer(mut self, observer: Arc<dyn MetaObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn config(&self) -> &MetaConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn MetaStore> {
        &self.store
    }

    pub fn resolver(&self) -> &Arc<dyn EntityResolver> {
        &self.resolver
    }

    pub fn catalog(&self) -> &Arc<EnumCatalog> {
        &self.catalog
    }

    /// A fresh, guarded, present-time context.
    pub fn context(&self) -> MetaContext {
        MetaContext::new(self.registry.clone(), self.store.clone()).with_observer(self.observer.clone())
    }

    /// DDL the host should run at startup; empty when auto-migrate is off.
    pub fn migrations(&self) -> Vec<String> {
        if self.config.auto_migrate {
            self.config.table_schema().create_statements()
        } else {
            Vec::new()
        }
    }

    /// Filter `candidates` with `query`, resolving at the context's travel
    /// instant unless the query sets its own.
    pub fn run_query(
        &self,
        ctx: &MetaContext,
        query: MetaQuery,
        candidates: &[EntityId],
    ) -> MetableResult<Vec<EntityId>> {
        let query = match (query.instant(), ctx.travel()) {
            (None, Some(at)) => query.as_of(Some(at)),
            _ => query,
        };
        Ok(query.run(self.store.as_ref(), &self.registry, candidates)?)
    }
}

impl std::fmt::Debug for MetaRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetaRuntime")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metable_types::IdStrategy;

    #[test]
    fn in_memory_runtime_uses_configured_strategy() {
        let config = MetaConfig {
            id_strategy: IdStrategy::Ulid,
            ..MetaConfig::default()
        };
        let runtime = MetaRuntime::in_memory(config).unwrap();
        assert_eq!(runtime.store().id_strategy(), IdStrategy::Ulid);
        assert_eq!(runtime.registry().len(), 13);
    }

    #[test]
    fn mismatched_store_rejected() {
        let config = MetaConfig {
            id_strategy: IdStrategy::Uuid,
            ..MetaConfig::default()
        };
        let err = MetaRuntime::new(
            config,
            Arc::new(InMemoryMetaStore::new()),
            Arc::new(InMemoryEntityResolver::new()),
            Arc::new(EnumCatalog::new()),
        )
        .unwrap_err();
        assert!(matches!(err, MetableError::Config(_)));
    }

    #[test]
    fn migrations_follow_auto_migrate() {
        let runtime = MetaRuntime::in_memory(MetaConfig::default()).unwrap();
        let ddl = runtime.migrations();
        assert_eq!(ddl.len(), 3);
        assert!(ddl[0].starts_with("CREATE TABLE IF NOT EXISTS \"meta\""));

        let quiet = MetaRuntime::in_memory(MetaConfig {
            auto_migrate: false,
            ..MetaConfig::default()
        })
        .unwrap();
        assert!(quiet.migrations().is_empty());
    }
}
