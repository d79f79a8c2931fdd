//! Integration tests for cache population, invalidation and tombstones.

mod common;

use common::*;
use proptest::prelude::*;
use tabula_core::proto::{EntityId, SelectOptions, Value};
use tabula_core::store::Operation;
use tabula_core::{CacheKey, EngineConfig, RelationalStore};

fn user_key(id: i64) -> CacheKey {
    CacheKey::derive("user", &values(&[("user_id", Value::Int(id))]))
}

fn tag_key(id: &str) -> CacheKey {
    CacheKey::derive("tag", &values(&[("tag_id", id.into())]))
}

#[test]
fn test_lookup_populates_cache() {
    let ctx = TestContext::new();
    create_user(&ctx.session(), "Ann", "ann@example.com");
    assert!(!ctx.cache.contains(&user_key(1)));

    let reader = ctx.session();
    let id = EntityId::single("user_id", Value::Int(1));
    reader.get_from_id("user", &id).unwrap().unwrap();
    assert!(ctx.cache.contains(&user_key(1)));

    let before = ctx.cache.stats();
    reader.get_from_id("user", &id).unwrap().unwrap();
    assert_eq!(ctx.cache.stats().hits, before.hits + 1);
}

#[test]
fn test_missing_entity_is_not_cached() {
    let ctx = TestContext::new();
    let reader = ctx.session();

    let found = reader
        .get_from_id("user", &EntityId::single("user_id", Value::Int(9)))
        .unwrap();
    assert!(found.is_none());
    assert!(ctx.cache.is_empty());
}

#[test]
fn test_tombstone_masks_cache_until_commit() {
    let ctx = TestContext::new();
    let mut user = create_user(&ctx.session(), "Ann", "ann@example.com");
    let id = user.id().unwrap();
    ctx.session().get_from_id("user", &id).unwrap().unwrap();
    assert!(ctx.cache.contains(&user_key(1)));

    let writer = ctx.session();
    ctx.store.begin_atomic().unwrap();
    writer.set_value(&mut user, "name", "Annie").unwrap();
    writer.save(&mut user).unwrap();

    // the outer section is still open, so the stale entry survives
    assert!(ctx.cache.contains(&user_key(1)));
    assert!(writer.tombstones().contains(&user_key(1)));

    let own = writer.get_from_id("user", &id).unwrap().unwrap();
    assert_eq!(own.get("name"), Some(&Value::from("Annie")));
    let other = ctx.session().get_from_id("user", &id).unwrap().unwrap();
    assert_eq!(other.get("name"), Some(&Value::from("Ann")));

    ctx.store.commit_atomic().unwrap();
    assert!(!ctx.cache.contains(&user_key(1)));
    let other = ctx.session().get_from_id("user", &id).unwrap().unwrap();
    assert_eq!(other.get("name"), Some(&Value::from("Annie")));
}

#[test]
fn test_rollback_discards_cache_deletion() {
    let ctx = TestContext::new();
    let mut user = create_user(&ctx.session(), "Ann", "ann@example.com");
    let id = user.id().unwrap();
    ctx.session().get_from_id("user", &id).unwrap().unwrap();

    let writer = ctx.session();
    ctx.store.begin_atomic().unwrap();
    writer.set_value(&mut user, "name", "Annie").unwrap();
    writer.save(&mut user).unwrap();
    ctx.store.rollback_atomic().unwrap();

    assert!(ctx.cache.contains(&user_key(1)));
    let own = writer.get_from_id("user", &id).unwrap().unwrap();
    assert_eq!(own.get("name"), Some(&Value::from("Ann")));
}

#[test]
fn test_failed_save_deletes_nothing() {
    let ctx = TestContext::new();
    let mut user = create_user(&ctx.session(), "Ann", "ann@example.com");
    let id = user.id().unwrap();
    ctx.session().get_from_id("user", &id).unwrap().unwrap();

    ctx.store.fail_on(Operation::Update, "users");
    let writer = ctx.session();
    writer.set_value(&mut user, "name", "Annie").unwrap();
    assert!(writer.save(&mut user).is_err());

    assert!(ctx.cache.contains(&user_key(1)));
    assert!(user.exists_in_store());
    assert_eq!(ctx.store.rows("users")[0].get("name"), Some(&Value::from("Ann")));
}

#[test]
fn test_many_to_many_change_invalidates_changed_tags_only() {
    let ctx = TestContext::new();
    let session = ctx.session();
    let author = create_user(&session, "Ann", "ann@example.com");
    for id in ["a", "b", "c", "d"] {
        create_tag(&session, id, &id.to_uppercase());
    }
    let mut post = session
        .new_from_values(
            "post",
            &values(&[
                ("title", "Hello".into()),
                ("author_id", author.get("user_id").cloned().unwrap()),
                ("tags", Value::Array(vec!["a".into(), "b".into(), "c".into()])),
            ]),
        )
        .unwrap();
    session.save(&mut post).unwrap();
    assert_eq!(ctx.store.row_count("post_tags"), 3);

    let reader = ctx.session();
    for id in ["a", "b", "c", "d"] {
        reader
            .get_from_id("tag", &EntityId::single("tag_id", id))
            .unwrap()
            .unwrap();
        assert!(ctx.cache.contains(&tag_key(id)));
    }

    let writer = ctx.session();
    writer
        .set_value(
            &mut post,
            "tags",
            Value::Array(vec!["b".into(), "c".into(), "d".into()]),
        )
        .unwrap();
    let plan = writer.plan_save(&post).unwrap();
    assert_eq!(plan.junction_inserts(), vec![&EntityId::single("tag_id", "d")]);
    assert_eq!(plan.junction_deletes(), vec![&EntityId::single("tag_id", "a")]);

    ctx.store.clear_mutations();
    writer.save(&mut post).unwrap();

    assert!(!ctx.cache.contains(&tag_key("a")));
    assert!(!ctx.cache.contains(&tag_key("d")));
    assert!(ctx.cache.contains(&tag_key("b")));
    assert!(ctx.cache.contains(&tag_key("c")));

    let junction: Vec<Operation> = ctx
        .store
        .mutations()
        .into_iter()
        .filter(|m| m.table == "post_tags")
        .map(|m| m.operation)
        .collect();
    assert_eq!(junction.len(), 2);
    assert!(junction.contains(&Operation::Insert));
    assert!(junction.contains(&Operation::Delete));

    let tag = ctx
        .session()
        .get_from_id("tag", &EntityId::single("tag_id", "d"))
        .unwrap()
        .unwrap();
    assert_eq!(tag.get("posts"), post.get("post_id").cloned().map(|id| Value::Array(vec![id])).as_ref());
}

#[test]
fn test_get_all_caches_addressable_queries_only() {
    let ctx = TestContext::new();
    let session = ctx.session();
    let author = create_user(&session, "Ann", "ann@example.com");
    create_post(&session, "Hello", &author);

    let by_author = values(&[("author_id", Value::Int(1))]);
    let reader = ctx.session();
    assert_eq!(
        reader.get_all("post", &by_author, &SelectOptions::default()).unwrap().len(),
        1
    );
    assert!(ctx.cache.contains(&CacheKey::derive_query("post", &by_author)));

    let both = values(&[("author_id", Value::Int(1)), ("title", "Hello".into())]);
    assert_eq!(
        reader.get_all("post", &both, &SelectOptions::default()).unwrap().len(),
        1
    );
    assert!(!ctx.cache.contains(&CacheKey::derive_query("post", &both)));

    reader
        .get_all("post", &values(&[]), &SelectOptions::default().with_limit(5))
        .unwrap();
    assert!(!ctx.cache.contains(&CacheKey::all("post")));

    create_post(&session, "World", &author);
    assert!(!ctx.cache.contains(&CacheKey::derive_query("post", &by_author)));
    assert_eq!(
        ctx.session()
            .get_all("post", &by_author, &SelectOptions::default())
            .unwrap()
            .len(),
        2
    );
}

#[test]
fn test_new_entity_invalidates_select_all() {
    let ctx = TestContext::new();
    let session = ctx.session();
    create_user(&session, "Ann", "ann@example.com");

    let empty = values(&[]);
    ctx.session()
        .get_all("user", &empty, &SelectOptions::default())
        .unwrap();
    assert!(ctx.cache.contains(&CacheKey::all("user")));

    create_user(&session, "Bob", "bob@example.com");
    assert!(!ctx.cache.contains(&CacheKey::all("user")));
    let users = ctx
        .session()
        .get_all("user", &empty, &SelectOptions::default())
        .unwrap();
    assert_eq!(users.len(), 2);
}

#[test]
fn test_unique_lookup_follows_changed_value() {
    let ctx = TestContext::new();
    let session = ctx.session();
    let mut user = create_user(&session, "Ann", "ann@example.com");

    let old_email = values(&[("email", "ann@example.com".into())]);
    ctx.session()
        .get_from_unique_group("user", &old_email)
        .unwrap()
        .unwrap();
    assert!(ctx.cache.contains(&CacheKey::derive("user", &old_email)));

    session
        .set_value(&mut user, "email", "ann@example.org")
        .unwrap();
    session.save(&mut user).unwrap();

    assert!(!ctx.cache.contains(&CacheKey::derive("user", &old_email)));
    let reader = ctx.session();
    assert!(reader
        .get_from_unique_group("user", &old_email)
        .unwrap()
        .is_none());
    let found = reader
        .get_from_unique_group("user", &values(&[("email", "ann@example.org".into())]))
        .unwrap()
        .unwrap();
    assert_eq!(found.id(), user.id());
}

#[test]
fn test_delete_invalidates_entity_and_queries() {
    let ctx = TestContext::new();
    let session = ctx.session();
    let mut tag = create_tag(&session, "rust", "Rust");

    let reader = ctx.session();
    reader
        .get_from_id("tag", &EntityId::single("tag_id", "rust"))
        .unwrap()
        .unwrap();
    reader
        .get_all("tag", &values(&[]), &SelectOptions::default())
        .unwrap();

    session.delete(&mut tag).unwrap();
    assert!(!ctx.cache.contains(&tag_key("rust")));
    assert!(!ctx.cache.contains(&CacheKey::all("tag")));
    assert!(ctx
        .session()
        .get_from_id("tag", &EntityId::single("tag_id", "rust"))
        .unwrap()
        .is_none());
}

#[test]
fn test_disabled_cache_stays_empty() {
    let ctx = TestContext::with_config(EngineConfig::default().with_cache_disabled());
    let session = ctx.session();
    let user = create_user(&session, "Ann", "ann@example.com");

    session.get_from_id("user", &user.id().unwrap()).unwrap().unwrap();
    session
        .get_all("user", &values(&[]), &SelectOptions::default())
        .unwrap();
    assert!(ctx.cache.is_empty());
}

proptest! {
    #[test]
    fn test_lookup_key_ignores_supply_order_and_case(
        first in "[a-zA-Z]{1,12}",
        last in "[a-zA-Z]{1,12}",
    ) {
        let forward = values(&[("first", first.as_str().into()), ("last", last.as_str().into())]);
        let backward = values(&[
            ("last", last.to_uppercase().into()),
            ("first", first.to_lowercase().into()),
        ]);
        prop_assert_eq!(
            CacheKey::derive("person", &forward),
            CacheKey::derive("person", &backward)
        );
        prop_assert_ne!(
            CacheKey::derive("person", &forward),
            CacheKey::derive_query("person", &forward)
        );
    }
}
