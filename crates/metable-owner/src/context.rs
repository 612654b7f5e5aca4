use std::sync::Arc;

use metable_codec::HandlerRegistry;
use metable_store::MetaStore;
use metable_types::{time, Timestamp};

use crate::error::{MetaError, MetaResult};
use crate::observer::{MetaObserver, NullObserver};

/// Collaborators and scope flags passed to every owner-side operation.
///
/// Scoped overrides are copies: [`unguarded`](Self::unguarded) and
/// [`travel_to`](Self::travel_to) return a new context and leave `self`
/// untouched, so the override ends when the copy is dropped.
#[derive(Clone)]
pub struct MetaContext {
    registry: Arc<HandlerRegistry>,
    store: Arc<dyn MetaStore>,
    observer: Arc<dyn MetaObserver>,
    unguarded: bool,
    travel: Option<Timestamp>,
}

impl MetaContext {
    pub fn new(registry: Arc<HandlerRegistry>, store: Arc<dyn MetaStore>) -> Self {
        Self {
            registry,
            store,
            observer: Arc::new(NullObserver),
            unguarded: false,
            travel: None,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn MetaObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    pub fn store(&self) -> &dyn MetaStore {
        self.store.as_ref()
    }

    pub fn observer(&self) -> &dyn MetaObserver {
        self.observer.as_ref()
    }

    pub fn is_unguarded(&self) -> bool {
        self.unguarded
    }

    /// Context-wide travel instant, if any.
    pub fn travel(&self) -> Option<Timestamp> {
        self.travel
    }

    /// A copy that skips the key policy.
    pub fn unguarded(&self) -> Self {
        Self {
            unguarded: true,
            ..self.clone()
        }
    }

    /// A copy that resolves and publishes as of `at`.
    pub fn travel_to(&self, at: Timestamp) -> Self {
        Self {
            travel: Some(at),
            ..self.clone()
        }
    }

    /// A copy without a travel instant.
    pub fn travel_back(&self) -> Self {
        Self {
            travel: None,
            ..self.clone()
        }
    }

    /// The travel instant, or wall-clock now.
    pub fn now(&self) -> Timestamp {
        self.travel.unwrap_or_else(time::now)
    }

    /// Parse publish-time text such as `+1h`, `tomorrow` or an RFC 3339
    /// timestamp, relative to [`now`](Self::now).
    pub fn parse_publish_time(&self, text: &str) -> MetaResult<Timestamp> {
        time::parse_lenient(text, self.now())
            .map(|at| at.with_timezone(&chrono::Utc))
            .ok_or_else(|| MetaError::InvalidPublishTime(text.to_string()))
    }
}

impl std::fmt::Debug for MetaContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetaContext")
            .field("registry", &self.registry)
            .field("unguarded", &self.unguarded)
            .field("travel", &self.travel)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use metable_codec::default_registry;
    use metable_store::InMemoryMetaStore;

    fn context() -> MetaContext {
        MetaContext::new(Arc::new(default_registry()), Arc::new(InMemoryMetaStore::new()))
    }

    #[test]
    fn scoped_copies_leave_original_alone() {
        let ctx = context();
        let at = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let scoped = ctx.unguarded().travel_to(at);
        assert!(scoped.is_unguarded());
        assert_eq!(scoped.now(), at);
        assert!(!ctx.is_unguarded());
        assert_eq!(ctx.travel(), None);
        assert_eq!(scoped.travel_back().travel(), None);
    }

    #[test]
    fn publish_time_is_relative_to_travel() {
        let at = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let ctx = context().travel_to(at);
        assert_eq!(ctx.parse_publish_time("+1h").unwrap(), at + Duration::hours(1));
        assert!(matches!(
            ctx.parse_publish_time("whenever"),
            Err(MetaError::InvalidPublishTime(_))
        ));
    }
}
