use std::sync::Arc;

use chrono::Duration;
use metable::{
    AttributeKind, BroadcastObserver, CodecError, CompareOp, EntityId, EntityRef, EnumCatalog,
    HasMeta, InMemoryEntityResolver, InMemoryMetaStore, MetaBag, MetaConfig, MetaContext,
    MetaError, MetaEvent, MetaQuery, MetaRuntime, MetaSchema, MetaStore, MetaValue,
    MetableError, OwnerKey, RecordingObserver, SortDirection, TemporalResolver,
};
use metable_types::time;

struct Post {
    id: Option<EntityId>,
    title: String,
    schema: Arc<MetaSchema>,
    meta: MetaBag,
}

impl Post {
    fn new(schema: Arc<MetaSchema>) -> Self {
        Self {
            id: None,
            title: "Untitled".into(),
            schema,
            meta: MetaBag::new("post"),
        }
    }

    fn existing(id: i64, schema: Arc<MetaSchema>) -> Self {
        Self {
            id: Some(EntityId::Int(id)),
            title: "Untitled".into(),
            schema,
            meta: MetaBag::for_owner(OwnerKey::new("post", id)),
        }
    }

    /// Stand-in for the host's own persistence: assign an id, then run the
    /// meta commit hook.
    fn save(&mut self, ctx: &MetaContext, id: i64) -> Result<bool, MetaError> {
        self.id.get_or_insert(EntityId::Int(id));
        let id = self.id.clone();
        self.after_owner_saved(ctx, id, true)
    }

    fn owner(&self) -> OwnerKey {
        OwnerKey::new("post", self.id.clone().expect("saved"))
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
        (key == "title").then(|| MetaValue::from(self.title.clone()))
    }
}

fn wildcard_schema() -> Arc<MetaSchema> {
    Arc::new(MetaSchema::new("post").allow("*").columns(["id", "title"]))
}

fn runtime() -> MetaRuntime {
    MetaRuntime::in_memory(MetaConfig::default()).expect("default config")
}

// ---------------------------------------------------------------------------
// Write, commit and resolve
// ---------------------------------------------------------------------------

#[test]
fn string_value_then_future_value() -> anyhow::Result<()> {
    let runtime = runtime();
    let ctx = runtime.context();
    let mut post = Post::new(wildcard_schema());

    post.set_meta(&ctx, "foo", "bar")?;
    post.save(&ctx, 1)?;

    let records = runtime.store().records_for(&post.owner())?;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].key(), "foo");
    assert_eq!(records[0].raw_value(), Some("bar"));
    assert_eq!(records[0].type_id(), Some("string"));

    let in_an_hour = ctx.parse_publish_time("+1h")?;
    post.save_meta_value_at(&ctx, "foo", "future", in_an_hour)?;

    let records = runtime.store().records_for(&post.owner())?;
    assert_eq!(records.len(), 2);
    assert_eq!(post.get_meta(&ctx, "foo")?, MetaValue::from("bar"));

    let later = ctx.travel_to(time::now() + Duration::minutes(61));
    assert_eq!(post.get_meta(&later, "foo")?, MetaValue::from("future"));
    Ok(())
}

#[test]
fn clean_write_is_idempotent() -> anyhow::Result<()> {
    let runtime = runtime();
    let ctx = runtime.context();
    let mut post = Post::existing(1, wildcard_schema());

    assert!(post.save_meta_value(&ctx, "views", 10i64)?);
    assert!(!post.save_meta_value(&ctx, "views", 10i64)?);
    assert!(!post.save_meta(&ctx)?);
    assert_eq!(runtime.store().records_for(&post.owner())?.len(), 1);
    Ok(())
}

#[test]
fn resolution_across_publish_times() -> anyhow::Result<()> {
    let runtime = runtime();
    let ctx = runtime.context();
    let mut post = Post::existing(1, wildcard_schema());
    let now = time::now();

    for (value, at) in [
        ("two-ago", now - Duration::hours(2)),
        ("one-ago", now - Duration::hours(1)),
        ("ahead", now + Duration::hours(1)),
    ] {
        post.save_meta_value_at(&ctx, "k", value, at)?;
    }

    let records = runtime.store().records_for(&post.owner())?;
    assert_eq!(records.len(), 3);
    let raw_at = |at| {
        TemporalResolver::at(&records, at)
            .current_for("k")
            .and_then(|r| r.raw_value())
            .map(str::to_string)
    };
    assert_eq!(raw_at(now).as_deref(), Some("one-ago"));
    assert_eq!(raw_at(now + Duration::hours(1)).as_deref(), Some("ahead"));
    assert_eq!(raw_at(now - Duration::hours(3)), None);
    Ok(())
}

#[test]
fn same_publish_time_later_write_wins() -> anyhow::Result<()> {
    let runtime = runtime();
    let ctx = runtime.context();
    let mut post = Post::existing(1, wildcard_schema());
    let t0 = time::now() - Duration::minutes(5);

    post.save_meta_value_at(&ctx, "k", "first", t0)?;
    post.save_meta_value_at(&ctx, "k", "second", t0)?;

    let records = runtime.store().records_for(&post.owner())?;
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.published_at() == Some(t0)));
    assert_eq!(post.get_meta(&ctx, "k")?, MetaValue::from("second"));
    Ok(())
}

#[test]
fn owner_travel_publishes_and_reads_in_the_past() -> anyhow::Result<()> {
    let runtime = runtime();
    let ctx = runtime.context();
    let mut post = Post::existing(1, wildcard_schema());
    let past = time::now() - Duration::days(7);

    post.save_meta_value(&ctx, "status", "live")?;
    post.travel_to(past);
    assert_eq!(post.get_meta(&ctx, "status")?, MetaValue::Null);
    post.save_meta_value(&ctx, "status", "draft")?;
    assert_eq!(post.get_meta(&ctx, "status")?, MetaValue::from("draft"));
    post.travel_back();

    assert_eq!(post.get_meta(&ctx, "status")?, MetaValue::from("live"));
    assert_eq!(post.meta_history(&ctx, "status")?.len(), 2);
    Ok(())
}

// ---------------------------------------------------------------------------
// Deletion and notifications
// ---------------------------------------------------------------------------

#[test]
fn delete_removes_all_history_and_notifies_once() -> anyhow::Result<()> {
    let sink = Arc::new(BroadcastObserver::new(16));
    let mut events = sink.subscribe();
    let runtime = runtime().with_observer(sink.clone());
    let ctx = runtime.context();
    let mut post = Post::existing(1, wildcard_schema());

    post.save_meta_value(&ctx, "color", "red")?;
    post.save_meta_value(&ctx, "color", "blue")?;
    let rows = post.delete_meta(&ctx, ["color", "never-set"])?;
    assert_eq!(rows, 2);
    assert!(runtime.store().records_for(&post.owner())?.is_empty());

    let mut removed = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let MetaEvent::Removed(record) = event {
            removed.push(record);
        }
    }
    assert_eq!(removed.len(), 1);
    assert_eq!(removed[0].raw_value(), Some("blue"));
    Ok(())
}

#[test]
fn deleting_owner_purges_meta() -> anyhow::Result<()> {
    let recorder = Arc::new(RecordingObserver::new());
    let runtime = runtime().with_observer(recorder.clone());
    let ctx = runtime.context();
    let mut post = Post::existing(3, wildcard_schema());

    post.set_many_meta(
        &ctx,
        [("a", MetaValue::from(1i64)), ("b", MetaValue::from(true))],
    )?;
    post.save_meta(&ctx)?;
    assert_eq!(recorder.added().len(), 2);

    assert_eq!(post.after_owner_deleted(&ctx)?, 2);
    assert!(runtime.store().records_for(&post.owner())?.is_empty());
    Ok(())
}

// ---------------------------------------------------------------------------
// Key policy
// ---------------------------------------------------------------------------

#[test]
fn column_collision_then_allow_listed() -> anyhow::Result<()> {
    let runtime = runtime();
    let ctx = runtime.context();
    let mut post = Post::existing(1, wildcard_schema());
    post.title = "From column".into();

    let err = post.set_meta(&ctx, "title", "From meta").unwrap_err();
    assert!(matches!(
        err,
        MetaError::ModelAttributeCollision {
            kind: AttributeKind::Column,
            ..
        }
    ));
    assert_eq!(post.get_meta(&ctx, "title")?, MetaValue::from("From column"));

    post.schema = Arc::new(MetaSchema::new("post").allow("*").allow("title").columns(["id", "title"]));
    post.set_meta(&ctx, "title", "From meta")?;
    post.save_meta(&ctx)?;
    assert_eq!(post.get_meta(&ctx, "title")?, MetaValue::from("From meta"));
    Ok(())
}

#[test]
fn unguarded_context_accepts_any_key() -> anyhow::Result<()> {
    let runtime = runtime();
    let ctx = runtime.context();
    let mut post = Post::existing(1, Arc::new(MetaSchema::new("post").allow("color")));

    assert!(post.set_meta(&ctx, "size", 3i64).unwrap_err().is_invalid_key());
    post.set_meta(&ctx.unguarded(), "size", 3i64)?;
    post.save_meta(&ctx)?;
    assert!(post.has_meta(&ctx, "size")?);
    Ok(())
}

// ---------------------------------------------------------------------------
// Configuration and registry
// ---------------------------------------------------------------------------

#[test]
fn reduced_handler_set_cannot_classify_floats() -> anyhow::Result<()> {
    let config = MetaConfig::from_toml_str("handlers = [\"boolean\", \"integer\", \"string\"]")?;
    let runtime = MetaRuntime::in_memory(config)?;
    let err = runtime.registry().classify(&MetaValue::Float(2.5)).unwrap_err();
    assert!(matches!(err, CodecError::HandlerNotFound(_)));
    assert_eq!(runtime.registry().classify(&MetaValue::Bool(true))?, "boolean");

    let ctx = runtime.context();
    let mut post = Post::existing(1, wildcard_schema());
    assert!(matches!(
        post.set_meta(&ctx, "ratio", 2.5),
        Err(MetaError::Codec(CodecError::HandlerNotFound(_)))
    ));
    Ok(())
}

#[test]
fn config_loaded_from_file() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("metable.toml");
    std::fs::write(
        &path,
        "id_strategy = \"ulid\"\ntable = \"post_meta\"\nauto_migrate = true\n",
    )?;
    let config = MetaConfig::load(&path)?;
    let runtime = MetaRuntime::in_memory(config)?;
    let ddl = runtime.migrations();
    assert!(ddl[0].contains("\"post_meta\""));
    assert!(ddl[0].contains("CHAR(26)"));

    assert!(matches!(
        MetaConfig::load(dir.path().join("missing.toml")),
        Err(MetableError::Io(_))
    ));
    Ok(())
}

#[test]
fn stale_entity_reference_is_a_hard_failure() -> anyhow::Result<()> {
    let users = Arc::new(InMemoryEntityResolver::new());
    users.insert("user", 7i64);
    let runtime = MetaRuntime::new(
        MetaConfig::default(),
        Arc::new(InMemoryMetaStore::new()),
        users.clone(),
        Arc::new(EnumCatalog::new()),
    )?;
    let ctx = runtime.context();
    let mut post = Post::existing(1, wildcard_schema());

    post.save_meta_value(&ctx, "author", EntityRef::persisted("user", 7i64))?;
    assert_eq!(
        post.get_meta(&ctx, "author")?,
        MetaValue::Entity(EntityRef::persisted("user", 7i64))
    );

    users.remove("user", &EntityId::Int(7));
    post.meta_mut().refresh();
    let err = post.get_meta(&ctx, "author").unwrap_err();
    assert!(matches!(
        err,
        MetaError::Codec(CodecError::ReferenceNotFound { .. })
    ));
    Ok(())
}

// ---------------------------------------------------------------------------
// Owner queries
// ---------------------------------------------------------------------------

#[test]
fn query_owners_by_current_meta() -> anyhow::Result<()> {
    let runtime = runtime();
    let ctx = runtime.context();
    let schema = wildcard_schema();
    let mut ids = Vec::new();
    for (id, rank, status) in [(1, 30i64, "live"), (2, 5, "live"), (3, 12, "draft")] {
        let mut post = Post::existing(id, schema.clone());
        post.set_meta(&ctx, "rank", rank)?;
        post.set_meta(&ctx, "status", status)?;
        post.save_meta(&ctx)?;
        ids.push(EntityId::Int(id));
    }

    let live = MetaQuery::new("post")
        .where_meta("status", CompareOp::Eq, "live")
        .order_by_meta("rank", SortDirection::Asc, true);
    assert_eq!(
        runtime.run_query(&ctx, live, &ids)?,
        vec![EntityId::Int(2), EntityId::Int(1)]
    );

    let high = MetaQuery::new("post").where_meta("rank", CompareOp::Gt, 10i64);
    assert_eq!(
        runtime.run_query(&ctx, high, &ids)?,
        vec![EntityId::Int(1), EntityId::Int(3)]
    );

    let before = ctx.travel_to(time::now() - Duration::days(1));
    let nothing_yet = MetaQuery::new("post").where_has_meta(["status"]);
    assert!(runtime.run_query(&before, nothing_yet, &ids)?.is_empty());
    Ok(())
}

#[test]
fn query_uses_query_instant_over_context() -> anyhow::Result<()> {
    let runtime = runtime();
    let ctx = runtime.context();
    let mut post = Post::existing(1, wildcard_schema());
    post.save_meta_value(&ctx, "flag", true)?;

    let before = ctx.travel_to(time::now() - Duration::days(1));
    let query = MetaQuery::new("post")
        .where_has_meta(["flag"])
        .as_of(Some(time::now() + Duration::seconds(1)));
    assert_eq!(runtime.run_query(&before, query, &[EntityId::Int(1)])?, vec![EntityId::Int(1)]);
    Ok(())
}

#[test]
fn new_owner_meta_committed_on_first_save() -> anyhow::Result<()> {
    let runtime = runtime();
    let ctx = runtime.context();
    let mut post = Post::new(wildcard_schema());
    post.set_meta(&ctx, "draft", true)?;
    assert!(matches!(
        post.save_meta(&ctx),
        Err(MetaError::OwnerNotPersisted { .. })
    ));
    assert!(post.save(&ctx, 9)?);
    assert_eq!(post.get_meta(&ctx, "draft")?, MetaValue::Bool(true));
    Ok(())
}
