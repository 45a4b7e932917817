//! End-to-end session behaviour against an in-memory SQLite database.

use std::sync::Arc;

use rowkeep::prelude::*;
use rowkeep::{ActionKind, MappingErrorKind, SqliteGateway, StorageErrorKind};

#[derive(rowkeep::Entity, Debug, Clone, PartialEq)]
#[rowkeep(table = "person")]
struct Person {
    #[rowkeep(id, generated = "identity")]
    id: i64,
    first_name: String,
    last_name: String,
}

#[derive(rowkeep::Entity, Debug, Clone, PartialEq)]
struct Tag {
    #[rowkeep(id)]
    code: String,
    #[rowkeep(column = "label_text")]
    label: String,
    weight: Option<i32>,
    pinned: bool,
}

#[derive(rowkeep::Entity, Debug)]
struct Ticket {
    #[rowkeep(id, generated)]
    id: i64,
}

#[derive(rowkeep::Entity, Debug)]
#[rowkeep(table = "person")]
struct Headless {
    first_name: String,
}

const SCHEMA: &str = "
    CREATE TABLE person (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        first_name TEXT NOT NULL,
        last_name TEXT NOT NULL
    );
    CREATE TABLE tag (
        code TEXT PRIMARY KEY,
        label_text TEXT NOT NULL,
        weight INTEGER,
        pinned INTEGER NOT NULL
    );
    CREATE TABLE ticket (id INTEGER PRIMARY KEY AUTOINCREMENT);
    INSERT INTO person (id, first_name, last_name) VALUES (1, 'Ada', 'Lovelace');
";

fn factory() -> SessionFactory<SqliteGateway> {
    let factory = SessionFactory::sqlite(SqliteConfig::memory(), PoolConfig::new(1))
        .expect("create sqlite factory");
    factory.execute_batch(SCHEMA).expect("create schema");
    factory
}

fn person(id: i64, first: &str, last: &str) -> Person {
    Person {
        id,
        first_name: first.to_string(),
        last_name: last.to_string(),
    }
}

// ============================================================================
// Identity map
// ============================================================================

#[test]
fn find_returns_same_instance_within_session() {
    let factory = factory();
    let mut session = factory.open_session();

    let first = session.find::<Person>(1_i64).unwrap().unwrap();
    let second = session.find::<Person>(1_i64).unwrap().unwrap();

    assert!(EntityRef::ptr_eq(&first, &second));
    assert_eq!(*first.read(), person(1, "Ada", "Lovelace"));

    // One connection checked out for the single read, then returned.
    let stats = factory.gateway().pool().stats();
    assert_eq!(stats.acquire_count, 2); // schema setup + one select
    assert_eq!(stats.active_connections, 0);
}

#[test]
fn find_missing_row_is_absent() {
    let factory = factory();
    let mut session = factory.open_session();
    assert!(session.find::<Person>(42_i64).unwrap().is_none());
    assert_eq!(session.tracked_count(), 0);
}

#[test]
fn sessions_do_not_share_instances() {
    let factory = factory();
    let mut a = factory.open_session();
    let mut b = factory.open_session();

    let from_a = a.find::<Person>(1_i64).unwrap().unwrap();
    let from_b = b.find::<Person>(1_i64).unwrap().unwrap();
    assert!(!EntityRef::ptr_eq(&from_a, &from_b));
    assert!(!b.contains(&from_a));
}

// ============================================================================
// persist / flush
// ============================================================================

#[test]
fn persist_then_flush_makes_entity_findable() {
    let factory = factory();
    let mut session = factory.open_session();
    let grace = EntityRef::new(person(2, "Grace", "Hopper"));

    session.persist(&grace).unwrap();
    let result = session.flush().unwrap();
    assert_eq!(result.inserted, 1);

    let found = session.find::<Person>(2_i64).unwrap().unwrap();
    assert_eq!(*found.read(), person(2, "Grace", "Hopper"));

    // And it really reached storage.
    session.close().unwrap();
    let mut fresh = factory.open_session();
    let stored = fresh.find::<Person>(2_i64).unwrap().unwrap();
    assert_eq!(*stored.read(), person(2, "Grace", "Hopper"));
}

#[test]
fn nothing_is_written_before_flush() {
    let factory = factory();
    let mut writer = factory.open_session();
    writer
        .persist(&EntityRef::new(person(2, "Grace", "Hopper")))
        .unwrap();

    let mut reader = factory.open_session();
    assert!(reader.find::<Person>(2_i64).unwrap().is_none());

    writer.flush().unwrap();
    assert!(reader.find::<Person>(2_i64).unwrap().is_some());
}

#[test]
fn assigned_identifiers_and_codecs_round_trip() {
    let factory = factory();
    let mut session = factory.open_session();
    let rust = EntityRef::new(Tag {
        code: "rs".to_string(),
        label: "Rust".to_string(),
        weight: None,
        pinned: true,
    });
    session.persist(&rust).unwrap();
    session.close().unwrap();

    let mut session = factory.open_session();
    let tag = session.find::<Tag>("rs").unwrap().unwrap();
    let tag = tag.read();
    assert_eq!(tag.label, "Rust");
    assert_eq!(tag.weight, None);
    assert!(tag.pinned);
}

// ============================================================================
// remove / update
// ============================================================================

#[test]
fn removed_entity_visible_until_flush() {
    let factory = factory();
    let mut session = factory.open_session();
    let ada = session.find::<Person>(1_i64).unwrap().unwrap();

    session.remove(&ada).unwrap();
    let still_there = session.find::<Person>(1_i64).unwrap().unwrap();
    assert!(EntityRef::ptr_eq(&still_there, &ada));

    let result = session.flush().unwrap();
    assert_eq!(result.deleted, 1);
    assert!(session.find::<Person>(1_i64).unwrap().is_none());
}

#[test]
fn remove_of_untracked_entity_is_not_persisted() {
    let factory = factory();
    let mut session = factory.open_session();
    let stranger = EntityRef::new(person(9, "No", "Body"));

    let err = session.remove(&stranger).unwrap_err();
    assert!(matches!(err, Error::NotPersisted(_)));
    assert_eq!(session.pending_actions().len(), 0);
}

#[test]
fn update_then_remove_of_new_entity_leaves_no_row() {
    let factory = factory();
    let mut session = factory.open_session();
    let denys = EntityRef::new(person(2, "Denys", "Shelupets"));

    session.update(&denys).unwrap();
    session.remove(&denys).unwrap();
    let kinds: Vec<_> = session.pending_actions().map(|a| a.kind()).collect();
    assert_eq!(kinds, vec![ActionKind::Insert, ActionKind::Delete]);

    session.flush().unwrap();
    assert!(session.find::<Person>(2_i64).unwrap().is_none());

    let mut fresh = factory.open_session();
    assert!(fresh.find::<Person>(2_i64).unwrap().is_none());
    assert!(fresh.find::<Person>(1_i64).unwrap().is_some());
}

#[test]
fn explicit_update_writes_on_flush() {
    let factory = factory();
    let mut session = factory.open_session();
    let ada = session.find::<Person>(1_i64).unwrap().unwrap();

    ada.write().first_name = "Augusta".to_string();
    session.update(&ada).unwrap();
    assert_eq!(session.flush().unwrap().updated, 1);
    assert!(!session.is_dirty(&ada));

    let mut fresh = factory.open_session();
    let stored = fresh.find::<Person>(1_i64).unwrap().unwrap();
    assert_eq!(stored.read().first_name, "Augusta");
}

// ============================================================================
// close and dirty checking
// ============================================================================

#[test]
fn close_persists_in_place_mutation() {
    let factory = factory();
    let mut session = factory.open_session();
    let ada = session.find::<Person>(1_i64).unwrap().unwrap();
    ada.write().last_name = "King".to_string();

    let result = session.close().unwrap();
    assert_eq!(result.updated, 1);

    let mut fresh = factory.open_session();
    let stored = fresh.find::<Person>(1_i64).unwrap().unwrap();
    assert_eq!(stored.read().last_name, "King");
}

#[test]
fn flush_alone_ignores_unreported_mutation() {
    let factory = factory();
    let mut session = factory.open_session();
    let ada = session.find::<Person>(1_i64).unwrap().unwrap();
    ada.write().last_name = "King".to_string();

    assert_eq!(session.flush().unwrap().total(), 0);

    let mut fresh = factory.open_session();
    let stored = fresh.find::<Person>(1_i64).unwrap().unwrap();
    assert_eq!(stored.read().last_name, "Lovelace");
}

#[test]
fn operations_after_close_fail() {
    let factory = factory();
    let mut session = factory.open_session();
    let ada = session.find::<Person>(1_i64).unwrap().unwrap();
    session.close().unwrap();

    assert!(matches!(session.find::<Person>(1_i64), Err(Error::SessionClosed)));
    assert!(matches!(session.persist(&ada), Err(Error::SessionClosed)));
    assert!(matches!(session.update(&ada), Err(Error::SessionClosed)));
    assert!(matches!(session.remove(&ada), Err(Error::SessionClosed)));
    assert!(matches!(session.flush(), Err(Error::SessionClosed)));
    assert!(!session.is_open());
}

// ============================================================================
// Failures
// ============================================================================

#[test]
fn constraint_violation_keeps_session_open_and_queue_intact() {
    let factory = factory();
    let mut first = factory.open_session();
    let tag = || Tag {
        code: "db".to_string(),
        label: "Databases".to_string(),
        weight: Some(3),
        pinned: false,
    };
    first.persist(&EntityRef::new(tag())).unwrap();
    first.close().unwrap();

    let mut second = factory.open_session();
    second.persist(&EntityRef::new(tag())).unwrap();
    let err = second.flush().unwrap_err();

    assert!(err.is_storage_fault());
    assert_eq!(err.storage_kind(), Some(StorageErrorKind::Constraint));
    assert!(err.sql().is_some_and(|sql| sql.starts_with("INSERT INTO tag")));
    assert!(second.is_open());
    assert_eq!(second.pending_actions().len(), 1);

    // The failed insert left the connection in the pool.
    assert_eq!(factory.gateway().pool().stats().active_connections, 0);
}

#[test]
fn identifier_only_entity_round_trips() {
    let factory = factory();
    let mut session = factory.open_session();
    let ticket = EntityRef::new(Ticket { id: 1 });

    session.persist(&ticket).unwrap();
    session.update(&ticket).unwrap();
    let result = session.flush().unwrap();
    assert_eq!(result.inserted, 1);
    assert_eq!(result.updated, 1);

    let mut fresh = factory.open_session();
    let stored = fresh.find::<Ticket>(1_i64).unwrap().unwrap();
    assert_eq!(stored.read().id, 1);
}

#[test]
fn entity_without_identifier_is_a_mapping_error() {
    let factory = factory();
    let mut session = factory.open_session();
    let err = session.find::<Headless>(1_i64).unwrap_err();
    match err {
        Error::Mapping(e) => assert_eq!(e.kind, MappingErrorKind::MissingIdentifier),
        other => panic!("expected mapping error, got {other:?}"),
    }
}

#[test]
fn factory_gateway_can_be_shared_explicitly() {
    let factory = factory();
    let shared: Arc<SqliteGateway> = Arc::new(SqliteGateway::new(Arc::clone(
        factory.gateway().pool(),
    )));
    let mut session = Session::new(Arc::clone(&shared));
    assert!(session.find::<Person>(1_i64).unwrap().is_some());
}
