use std::collections::BTreeMap;
use std::sync::Arc;

use metable_store::MetaRecord;
use metable_types::{EntityId, MetaValue, Timestamp};

use crate::bag::MetaBag;
use crate::context::MetaContext;
use crate::error::MetaResult;
use crate::schema::MetaSchema;

/// Capability trait for entities that carry metadata.
///
/// Implementors supply their schema, their embedded [`MetaBag`], and
/// optionally read access to their own attributes. Everything else is
/// provided.
///
/// ```ignore
/// struct Post { id: Option<EntityId>, title: String, meta: MetaBag }
///
/// impl HasMeta for Post {
///     fn meta_schema(&self) -> Arc<MetaSchema> { POST_SCHEMA.clone() }
///     fn meta(&self) -> &MetaBag { &self.meta }
///     fn meta_mut(&mut self) -> &mut MetaBag { &mut self.meta }
///     fn attribute(&self, key: &str) -> Option<MetaValue> {
///         (key == "title").then(|| self.title.clone().into())
///     }
/// }
/// ```
pub trait HasMeta {
    fn meta_schema(&self) -> Arc<MetaSchema>;

    fn meta(&self) -> &MetaBag;

    fn meta_mut(&mut self) -> &mut MetaBag;

    /// The owner's own attribute named `key`, if it has one.
    fn attribute(&self, _key: &str) -> Option<MetaValue> {
        None
    }

    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    /// Buffer `value` under `key`. Returns `false` for a no-op write.
    fn set_meta(&mut self, ctx: &MetaContext, key: &str, value: impl Into<MetaValue>) -> MetaResult<bool>
    where
        Self: Sized,
    {
        let schema = self.meta_schema();
        self.meta_mut().set(&schema, ctx, key, value.into(), None)
    }

    /// Buffer `value` under `key`, published at `publish_at`.
    fn set_meta_at(
        &mut self,
        ctx: &MetaContext,
        key: &str,
        value: impl Into<MetaValue>,
        publish_at: Timestamp,
    ) -> MetaResult<bool>
    where
        Self: Sized,
    {
        let schema = self.meta_schema();
        self.meta_mut()
            .set(&schema, ctx, key, value.into(), Some(publish_at))
    }

    fn set_many_meta<I, K>(&mut self, ctx: &MetaContext, values: I) -> MetaResult<usize>
    where
        Self: Sized,
        I: IntoIterator<Item = (K, MetaValue)>,
        K: AsRef<str>,
    {
        let schema = self.meta_schema();
        self.meta_mut().set_many(&schema, ctx, values)
    }

    fn save_meta(&mut self, ctx: &MetaContext) -> MetaResult<bool> {
        self.meta_mut().save(ctx)
    }

    fn save_meta_key(&mut self, ctx: &MetaContext, key: &str) -> MetaResult<bool> {
        self.meta_mut().save_key(ctx, key)
    }

    /// Write and commit one key immediately.
    fn save_meta_value(&mut self, ctx: &MetaContext, key: &str, value: impl Into<MetaValue>) -> MetaResult<bool>
    where
        Self: Sized,
    {
        self.set_meta(ctx, key, value)?;
        self.save_meta_key(ctx, key)
    }

    fn save_meta_value_at(
        &mut self,
        ctx: &MetaContext,
        key: &str,
        value: impl Into<MetaValue>,
        publish_at: Timestamp,
    ) -> MetaResult<bool>
    where
        Self: Sized,
    {
        self.set_meta_at(ctx, key, value, publish_at)?;
        self.save_meta_key(ctx, key)
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Read `key`, or null when nothing answers for it.
    fn get_meta(&self, ctx: &MetaContext, key: &str) -> MetaResult<MetaValue> {
        self.get_meta_or(ctx, key, MetaValue::Null)
    }

    fn get_meta_or(&self, ctx: &MetaContext, key: &str, default: MetaValue) -> MetaResult<MetaValue> {
        let schema = self.meta_schema();
        let real = |k: &str| self.attribute(k);
        Ok(self.meta().lookup(&schema, ctx, key, &real)?.unwrap_or(default))
    }

    fn get_all_meta(&self, ctx: &MetaContext) -> MetaResult<BTreeMap<String, MetaValue>> {
        let schema = self.meta_schema();
        self.meta().all(&schema, ctx)
    }

    fn get_meta_record(&self, ctx: &MetaContext, key: &str) -> MetaResult<Option<MetaRecord>> {
        self.meta().record(ctx, key)
    }

    fn meta_history(&self, ctx: &MetaContext, key: &str) -> MetaResult<Vec<MetaRecord>> {
        self.meta().history(ctx, key)
    }

    fn planned_meta(&self, ctx: &MetaContext) -> MetaResult<Vec<MetaRecord>> {
        self.meta().planned(ctx)
    }

    fn has_meta(&self, ctx: &MetaContext, key: &str) -> MetaResult<bool> {
        self.meta().has(ctx, key)
    }

    // -----------------------------------------------------------------------
    // Deletes
    // -----------------------------------------------------------------------

    fn delete_meta<I, S>(&mut self, ctx: &MetaContext, keys: I) -> MetaResult<usize>
    where
        Self: Sized,
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let schema = self.meta_schema();
        self.meta_mut().delete(&schema, ctx, keys)
    }

    fn sync_meta<I, K>(&mut self, ctx: &MetaContext, values: I) -> MetaResult<bool>
    where
        Self: Sized,
        I: IntoIterator<Item = (K, MetaValue)>,
        K: AsRef<str>,
    {
        let schema = self.meta_schema();
        self.meta_mut().sync(&schema, ctx, values)
    }

    fn purge_meta(&mut self, ctx: &MetaContext) -> MetaResult<usize> {
        self.meta_mut().purge(ctx)
    }

    // -----------------------------------------------------------------------
    // Time travel and lifecycle
    // -----------------------------------------------------------------------

    fn travel_to(&mut self, at: Timestamp) {
        self.meta_mut().travel_to(at);
    }

    fn travel_back(&mut self) {
        self.meta_mut().travel_back();
    }

    fn after_owner_saved(&mut self, ctx: &MetaContext, owner_id: Option<EntityId>, autosave: bool) -> MetaResult<bool> {
        self.meta_mut().after_owner_saved(ctx, owner_id, autosave)
    }

    fn after_owner_deleted(&mut self, ctx: &MetaContext) -> MetaResult<usize> {
        self.meta_mut().after_owner_deleted(ctx)
    }

    /// Feed the owner's loaded attributes to the bag; returns the keys now
    /// served as metadata.
    fn on_loaded<I, K>(&mut self, raw_attributes: I) -> Vec<String>
    where
        Self: Sized,
        I: IntoIterator<Item = (K, MetaValue)>,
        K: AsRef<str>,
    {
        let schema = self.meta_schema();
        self.meta_mut().on_loaded(&schema, raw_attributes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use metable_codec::default_registry;
    use metable_store::InMemoryMetaStore;
    use metable_types::{time, OwnerKey};

    struct Post {
        title: String,
        meta: MetaBag,
        schema: Arc<MetaSchema>,
    }

    impl Post {
        fn persisted(id: i64) -> Self {
            Self {
                title: "Hello".into(),
                meta: MetaBag::for_owner(OwnerKey::new("post", id)),
                schema: Arc::new(MetaSchema::new("post").allow("*").columns(["title"])),
            }
        }
    }

    impl HasMeta for Post {
        fn meta_schema(&self) -> Arc<MetaSchema> {
            self.schema.clone()
        }

        fn meta(&self) -> &MetaBag {
            &self.meta
        }

        fn meta_mut(&mut self) -> &mut MetaBag {
            &mut self.meta
        }

        fn attribute(&self, key: &str) -> Option<MetaValue> {
            (key == "title").then(|| self.title.clone().into())
        }
    }

    fn context() -> MetaContext {
        MetaContext::new(Arc::new(default_registry()), Arc::new(InMemoryMetaStore::new()))
    }

    #[test]
    fn provided_methods_round_trip() {
        let ctx = context();
        let mut post = Post::persisted(1);
        post.set_meta(&ctx, "views", 10i64).unwrap();
        post.save_meta(&ctx).unwrap();
        assert_eq!(post.get_meta(&ctx, "views").unwrap(), MetaValue::Int(10));
        assert_eq!(post.get_meta(&ctx, "missing").unwrap(), MetaValue::Null);
        assert_eq!(
            post.get_meta_or(&ctx, "missing", "fallback".into()).unwrap(),
            MetaValue::from("fallback")
        );
        assert!(post.has_meta(&ctx, "views").unwrap());
    }

    #[test]
    fn colliding_read_returns_real_attribute() {
        let ctx = context();
        let post = Post::persisted(1);
        assert_eq!(post.get_meta(&ctx, "title").unwrap(), MetaValue::from("Hello"));
    }

    #[test]
    fn save_value_commits_only_that_key() {
        let ctx = context();
        let mut post = Post::persisted(2);
        post.set_meta(&ctx, "draft", true).unwrap();
        post.save_meta_value(&ctx, "views", 1i64).unwrap();
        assert!(post.meta().is_dirty_key("draft"));
        assert!(!post.meta().is_dirty_key("views"));
    }

    #[test]
    fn traveling_owner_sees_planned_value() {
        let ctx = context();
        let mut post = Post::persisted(3);
        let later = time::now() + Duration::hours(2);
        post.save_meta_value(&ctx, "status", "draft").unwrap();
        post.save_meta_value_at(&ctx, "status", "live", later).unwrap();

        assert_eq!(post.get_meta(&ctx, "status").unwrap(), MetaValue::from("draft"));
        assert_eq!(post.planned_meta(&ctx).unwrap().len(), 1);
        post.travel_to(later);
        assert_eq!(post.get_meta(&ctx, "status").unwrap(), MetaValue::from("live"));
        post.travel_back();
        assert_eq!(post.meta_history(&ctx, "status").unwrap().len(), 2);
    }

    #[test]
    fn delete_and_purge() {
        let ctx = context();
        let mut post = Post::persisted(4);
        post.set_many_meta(&ctx, [("a", MetaValue::from(1i64)), ("b", MetaValue::from(2i64))])
            .unwrap();
        post.save_meta(&ctx).unwrap();
        assert_eq!(post.delete_meta(&ctx, ["a"]).unwrap(), 1);
        assert_eq!(post.get_all_meta(&ctx).unwrap().len(), 1);
        assert_eq!(post.after_owner_deleted(&ctx).unwrap(), 1);
        assert!(post.get_all_meta(&ctx).unwrap().is_empty());
    }
}
