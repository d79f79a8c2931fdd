//! Shared fixture: a small blog schema over the in-memory store and cache.

#![allow(dead_code)]

use std::sync::{Arc, Once};
use tabula_core::catalog::{EntityDescriptor, FieldType, PropertyDef, RelationDef, SchemaDef};
use tabula_core::proto::{FieldValues, OrderSpec, Value};
use tabula_core::{
    AccessControl, Engine, EngineConfig, Entity, MemoryCache, MemoryStore, Session, Validator,
};

pub const EMAIL_PATTERN: &str = r"^[^@\s]+@[^@\s]+\.[a-z]+$";

pub struct User;
pub struct Post;
pub struct Tag;
pub struct Comment;

impl EntityDescriptor for User {
    fn entity_type(&self) -> &str {
        "user"
    }

    fn schema(&self) -> SchemaDef {
        SchemaDef::new("users", ["user_id"])
            .with_unique(["email"])
            .with_relationship(
                RelationDef::many_to_one("posts", "post").with_related_property("author_id"),
            )
    }

    fn properties(&self) -> Vec<PropertyDef> {
        vec![
            PropertyDef::field("user_id", FieldType::UnsignedInteger).with_autoincrement(),
            PropertyDef::field("name", FieldType::String)
                .with_required()
                .with_size(40),
            PropertyDef::field("email", FieldType::String)
                .with_required()
                .with_validator(Validator::Pattern(EMAIL_PATTERN.to_string())),
            PropertyDef::relationship("posts"),
        ]
    }
}

impl EntityDescriptor for Post {
    fn entity_type(&self) -> &str {
        "post"
    }

    fn schema(&self) -> SchemaDef {
        SchemaDef::new("posts", ["post_id"])
            .with_order(OrderSpec::asc("title"))
            .with_relationship(RelationDef::one_to_many("author_id", "user").with_related_property("posts"))
            .with_relationship(
                RelationDef::many_to_many("tags", "tag", "post_tags").with_related_property("posts"),
            )
            .with_relationship(
                RelationDef::many_to_one("comments", "comment").with_related_property("post_id"),
            )
    }

    fn properties(&self) -> Vec<PropertyDef> {
        vec![
            PropertyDef::field("post_id", FieldType::String),
            PropertyDef::field("title", FieldType::String)
                .with_required()
                .with_size(120),
            PropertyDef::field("author_id", FieldType::UnsignedInteger).with_required(),
            PropertyDef::field("body", FieldType::String),
            PropertyDef::relationship("tags"),
            PropertyDef::relationship("comments"),
        ]
    }
}

impl EntityDescriptor for Tag {
    fn entity_type(&self) -> &str {
        "tag"
    }

    fn schema(&self) -> SchemaDef {
        SchemaDef::new("tags", ["tag_id"])
            .with_unique(["label"])
            .with_relationship(
                RelationDef::many_to_many("posts", "post", "post_tags").with_related_property("tags"),
            )
    }

    fn properties(&self) -> Vec<PropertyDef> {
        vec![
            PropertyDef::field("tag_id", FieldType::String),
            PropertyDef::field("label", FieldType::String).with_required(),
            PropertyDef::field("color", FieldType::String)
                .with_default("#777777")
                .with_validator(Validator::HexColor),
            PropertyDef::relationship("posts"),
        ]
    }
}

impl EntityDescriptor for Comment {
    fn entity_type(&self) -> &str {
        "comment"
    }

    fn schema(&self) -> SchemaDef {
        SchemaDef::new("comments", ["comment_id"])
            .with_relationship(RelationDef::one_to_many("post_id", "post").with_related_property("comments"))
    }

    fn properties(&self) -> Vec<PropertyDef> {
        vec![
            PropertyDef::field("comment_id", FieldType::UnsignedInteger).with_autoincrement(),
            PropertyDef::field("body", FieldType::String).with_required(),
            PropertyDef::field("post_id", FieldType::String),
        ]
    }
}

/// A shelf holds books; a book slug is unique per shelf.
pub struct Shelf;
pub struct Book;

impl EntityDescriptor for Shelf {
    fn entity_type(&self) -> &str {
        "shelf"
    }

    fn schema(&self) -> SchemaDef {
        SchemaDef::new("shelves", ["shelf_id"]).with_relationship(
            RelationDef::many_to_one("books", "book").with_related_property("shelf_id"),
        )
    }

    fn properties(&self) -> Vec<PropertyDef> {
        vec![
            PropertyDef::field("shelf_id", FieldType::UnsignedInteger).with_autoincrement(),
            PropertyDef::field("name", FieldType::String).with_required(),
            PropertyDef::relationship("books"),
        ]
    }
}

impl EntityDescriptor for Book {
    fn entity_type(&self) -> &str {
        "book"
    }

    fn schema(&self) -> SchemaDef {
        SchemaDef::new("books", ["book_id"])
            .with_unique(["shelf_id", "slug"])
            .with_relationship(RelationDef::one_to_many("shelf_id", "shelf").with_related_property("books"))
    }

    fn properties(&self) -> Vec<PropertyDef> {
        vec![
            PropertyDef::field("book_id", FieldType::String),
            PropertyDef::field("slug", FieldType::String).with_required(),
            PropertyDef::field("shelf_id", FieldType::UnsignedInteger),
        ]
    }
}

/// A team and its members require each other: every member belongs to a
/// team and every team is led by a member.
pub struct Team;
pub struct Member;

impl EntityDescriptor for Team {
    fn entity_type(&self) -> &str {
        "team"
    }

    fn schema(&self) -> SchemaDef {
        SchemaDef::new("teams", ["team_id"])
            .with_relationship(RelationDef::one_to_many("leader_id", "member").with_related_property("led"))
            .with_relationship(
                RelationDef::many_to_one("members", "member").with_related_property("team_id"),
            )
    }

    fn properties(&self) -> Vec<PropertyDef> {
        vec![
            PropertyDef::field("team_id", FieldType::String),
            PropertyDef::field("leader_id", FieldType::String).with_required(),
            PropertyDef::relationship("members"),
        ]
    }
}

impl EntityDescriptor for Member {
    fn entity_type(&self) -> &str {
        "member"
    }

    fn schema(&self) -> SchemaDef {
        SchemaDef::new("members", ["member_id"])
            .with_relationship(RelationDef::one_to_many("team_id", "team").with_related_property("members"))
            .with_relationship(
                RelationDef::many_to_one("led", "team").with_related_property("leader_id"),
            )
    }

    fn properties(&self) -> Vec<PropertyDef> {
        vec![
            PropertyDef::field("member_id", FieldType::String),
            PropertyDef::field("team_id", FieldType::String).with_required(),
            PropertyDef::relationship("led"),
        ]
    }
}

/// An engine over the shelf and book types.
pub fn shelf_engine() -> (Engine, Arc<MemoryStore>) {
    init_tracing();
    let store = Arc::new(MemoryStore::new());
    store.create_table_with_autoincrement("shelves", "shelf_id");
    store.create_table("books");
    let engine = Engine::builder(store.clone(), Arc::new(MemoryCache::new()))
        .register(Shelf)
        .register(Book)
        .build()
        .unwrap();
    (engine, store)
}

/// An engine over the team and member types.
pub fn team_engine() -> (Engine, Arc<MemoryStore>) {
    init_tracing();
    let store = Arc::new(MemoryStore::new());
    store.create_table("teams");
    store.create_table("members");
    let engine = Engine::builder(store.clone(), Arc::new(MemoryCache::new()))
        .register(Team)
        .register(Member)
        .build()
        .unwrap();
    (engine, store)
}

/// Engine plus direct handles on its collaborators.
pub struct TestContext {
    pub engine: Engine,
    pub store: Arc<MemoryStore>,
    pub cache: Arc<MemoryCache>,
}

impl TestContext {
    pub fn new() -> Self {
        Self::build(None, EngineConfig::default())
    }

    pub fn with_access(access: Arc<dyn AccessControl>) -> Self {
        Self::build(Some(access), EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self::build(None, config)
    }

    fn build(access: Option<Arc<dyn AccessControl>>, config: EngineConfig) -> Self {
        init_tracing();

        let store = Arc::new(MemoryStore::new());
        store.create_table_with_autoincrement("users", "user_id");
        store.create_table("posts");
        store.create_table("tags");
        store.create_table("post_tags");
        store.create_table_with_autoincrement("comments", "comment_id");
        let cache = Arc::new(MemoryCache::new());

        let mut builder = Engine::builder(store.clone(), cache.clone())
            .with_config(config)
            .register(User)
            .register(Post)
            .register(Tag)
            .register(Comment);
        if let Some(access) = access {
            builder = builder.with_access_control(access);
        }
        let engine = builder.build().unwrap();

        Self {
            engine,
            store,
            cache,
        }
    }

    pub fn session(&self) -> Session<'_> {
        self.engine.session()
    }
}

pub fn values(pairs: &[(&str, Value)]) -> FieldValues {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

pub fn create_user(session: &Session<'_>, name: &str, email: &str) -> Entity {
    let mut user = session
        .new_from_values("user", &values(&[("name", name.into()), ("email", email.into())]))
        .unwrap();
    session.save(&mut user).unwrap();
    user
}

pub fn create_post(session: &Session<'_>, title: &str, author: &Entity) -> Entity {
    let author_id = author.get("user_id").cloned().unwrap();
    let mut post = session
        .new_from_values("post", &values(&[("title", title.into()), ("author_id", author_id)]))
        .unwrap();
    session.save(&mut post).unwrap();
    post
}

pub fn create_tag(session: &Session<'_>, tag_id: &str, label: &str) -> Entity {
    let mut tag = session
        .new_from_values("tag", &values(&[("tag_id", tag_id.into()), ("label", label.into())]))
        .unwrap();
    session.save(&mut tag).unwrap();
    tag
}

pub fn create_comment(session: &Session<'_>, body: &str, post: &Entity) -> Entity {
    let post_id = post.get("post_id").cloned().unwrap();
    let mut comment = session
        .new_from_values("comment", &values(&[("body", body.into()), ("post_id", post_id)]))
        .unwrap();
    session.save(&mut comment).unwrap();
    comment
}

fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}
