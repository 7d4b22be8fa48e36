//! Opening indexes over SQLite stores.

use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use symdb::store::sqlite::{initialize_schema, write_unit};
use symdb::store::{load_store_library, OccurrenceRecord, StoreLibraryRef, Unit};
use symdb::{Index, IndexError, IndexOptions, SymbolKind, SymbolRoleSet};
use tempfile::TempDir;

fn foo_units() -> Vec<Unit> {
    vec![
        Unit::new(
            "a.c",
            vec![OccurrenceRecord::new(
                "c:@F@foo",
                "foo",
                SymbolKind::Function,
                "a.c",
                3,
                5,
                SymbolRoleSet::DEFINITION | SymbolRoleSet::CANONICAL,
            )],
        ),
        Unit::new(
            "b.c",
            vec![OccurrenceRecord::new(
                "c:@F@foo",
                "foo",
                SymbolKind::Function,
                "b.c",
                10,
                1,
                SymbolRoleSet::REFERENCE | SymbolRoleSet::CALL,
            )
            .related(
                SymbolRoleSet::REL_CALLED_BY,
                "c:@F@main",
                "main",
                SymbolKind::Function,
            )],
        ),
    ]
}

fn setup_store(dir: &Path, units: &[Unit]) -> PathBuf {
    let path = dir.join("index.db");
    let conn = Connection::open(&path).unwrap();
    initialize_schema(&conn).unwrap();
    for unit in units {
        write_unit(&conn, unit).unwrap();
    }
    path
}

fn open(store: &Path, database: &Path, options: IndexOptions) -> symdb::Result<Index> {
    let library = load_store_library(store)?;
    Index::open(store, database, &move |_: &str| Some(library.clone()), options)
}

fn usr_locations(index: &Index, usr: &str) -> Vec<String> {
    let mut out = Vec::new();
    index.foreach_symbol_occurrence_by_usr(usr, SymbolRoleSet::empty(), |occ| {
        out.push(occ.location().to_string());
        true
    });
    out
}

#[test]
fn test_open_and_query() {
    let dir = TempDir::new().unwrap();
    let store = setup_store(dir.path(), &foo_units());
    let index = open(&store, &dir.path().join("db"), IndexOptions::default()).unwrap();

    assert_eq!(usr_locations(&index, "c:@F@foo"), vec!["a.c:3:5", "b.c:10:1"]);
    assert_eq!(index.library().map(|lib| lib.name()), Some("sqlite"));

    let mut callers = Vec::new();
    index.foreach_related_symbol_occurrence_by_usr(
        "c:@F@main",
        SymbolRoleSet::REL_CALLED_BY,
        |occ| {
            callers.push(occ.symbol().name().to_string());
            true
        },
    );
    assert_eq!(callers, vec!["foo"]);
}

#[test]
fn test_canonical_bit_survives_storage() {
    let dir = TempDir::new().unwrap();
    let store = setup_store(dir.path(), &foo_units());
    let index = open(&store, &dir.path().join("db"), IndexOptions::default()).unwrap();

    let mut found = Vec::new();
    index.foreach_symbol_occurrence_by_usr("c:@F@foo", SymbolRoleSet::CANONICAL, |occ| {
        found.push(occ.roles());
        true
    });
    assert_eq!(found, vec![SymbolRoleSet::DEFINITION | SymbolRoleSet::CANONICAL]);
}

#[test]
fn test_missing_store_is_reported() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("missing.db");
    let library: StoreLibraryRef = Arc::new(symdb::store::SqliteLibrary);
    let err = Index::open(
        &missing,
        dir.path().join("db"),
        &move |_: &str| Some(library.clone()),
        IndexOptions::default(),
    )
    .unwrap_err();
    assert!(matches!(err, IndexError::StoreNotFound { .. }));
    assert_eq!(err.error_code(), "SYM-E001");
}

#[test]
fn test_provider_without_library() {
    let dir = TempDir::new().unwrap();
    let store = setup_store(dir.path(), &foo_units());
    let asked = std::cell::RefCell::new(Vec::new());
    let err = Index::open(
        &store,
        dir.path().join("db"),
        &|path: &str| -> Option<StoreLibraryRef> {
            asked.borrow_mut().push(path.to_string());
            None
        },
        IndexOptions::default(),
    )
    .unwrap_err();
    assert!(matches!(err, IndexError::LibraryUnavailable { .. }));
    assert_eq!(err.error_code(), "SYM-E101");
    assert_eq!(asked.into_inner(), vec![store.to_str().unwrap().to_string()]);
}

#[test]
fn test_readonly_requires_database() {
    let dir = TempDir::new().unwrap();
    let store = setup_store(dir.path(), &foo_units());
    let database = dir.path().join("db");

    let err = open(&store, &database, IndexOptions::default().readonly(true)).unwrap_err();
    assert!(matches!(err, IndexError::DatabaseNotFound { .. }));
    assert!(!database.exists());

    std::fs::create_dir(&database).unwrap();
    let index = open(&store, &database, IndexOptions::default().readonly(true)).unwrap();
    assert_eq!(usr_locations(&index, "c:@F@foo").len(), 2);
    assert!(!database.join("state.json").exists());
}

#[test]
fn test_writable_open_writes_state() {
    let dir = TempDir::new().unwrap();
    let store = setup_store(dir.path(), &foo_units());
    let database = dir.path().join("nested").join("db");
    let _index = open(&store, &database, IndexOptions::default()).unwrap();

    let state: serde_json::Value =
        serde_json::from_slice(&std::fs::read(database.join("state.json")).unwrap()).unwrap();
    assert_eq!(state["state_version"], 1);
    assert_eq!(state["library"], "sqlite");
    assert_eq!(state["counts"]["units"], 2);
    assert_eq!(state["counts"]["occurrences"], 2);
}

#[test]
fn test_unsupported_store_format() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("notes.txt");
    std::fs::write(&path, "not a database").unwrap();
    let err = load_store_library(&path).unwrap_err();
    assert!(matches!(err, IndexError::UnsupportedStore { .. }));
}

#[test]
fn test_poll_picks_up_new_units() {
    let dir = TempDir::new().unwrap();
    let store = setup_store(dir.path(), &foo_units()[..1]);
    let index = open(&store, &dir.path().join("db"), IndexOptions::default()).unwrap();
    assert_eq!(usr_locations(&index, "c:@F@foo"), vec!["a.c:3:5"]);

    let writer = Connection::open(&store).unwrap();
    write_unit(&writer, &foo_units()[1]).unwrap();
    assert_eq!(usr_locations(&index, "c:@F@foo"), vec!["a.c:3:5"]);

    index.poll_for_unit_changes_and_wait();
    assert_eq!(usr_locations(&index, "c:@F@foo"), vec!["a.c:3:5", "b.c:10:1"]);
}

#[test]
fn test_listening_index_sees_updates_without_poll() {
    let dir = TempDir::new().unwrap();
    let store = setup_store(dir.path(), &foo_units()[..1]);
    let index = open(
        &store,
        &dir.path().join("db"),
        IndexOptions::default().listen_for_updates(true),
    )
    .unwrap();

    let writer = Connection::open(&store).unwrap();
    write_unit(&writer, &foo_units()[1]).unwrap();
    assert_eq!(usr_locations(&index, "c:@F@foo"), vec!["a.c:3:5", "b.c:10:1"]);
}

#[test]
fn test_rewritten_unit_replaces_rows() {
    let dir = TempDir::new().unwrap();
    let store = setup_store(dir.path(), &foo_units());
    let writer = Connection::open(&store).unwrap();
    write_unit(
        &writer,
        &Unit::new(
            "b.c",
            vec![OccurrenceRecord::new(
                "c:@F@foo",
                "foo",
                SymbolKind::Function,
                "b.c",
                12,
                3,
                SymbolRoleSet::REFERENCE,
            )],
        ),
    )
    .unwrap();

    let index = open(&store, &dir.path().join("db"), IndexOptions::default()).unwrap();
    assert_eq!(usr_locations(&index, "c:@F@foo"), vec!["a.c:3:5", "b.c:12:3"]);
}

#[test]
fn test_specialization_roles_survive_storage() {
    let dir = TempDir::new().unwrap();
    let units = vec![Unit::new(
        "box.cpp",
        vec![OccurrenceRecord::new(
            "c:@S@Box>#I",
            "Box",
            SymbolKind::Class,
            "box.cpp",
            8,
            7,
            SymbolRoleSet::DEFINITION,
        )
        .related(
            SymbolRoleSet::REL_SPECIALIZATION_OF,
            "c:@ST>1#T@Box",
            "Box",
            SymbolKind::Class,
        )],
    )];
    let store = setup_store(dir.path(), &units);
    let index = open(&store, &dir.path().join("db"), IndexOptions::default()).unwrap();

    let mut found = Vec::new();
    index.foreach_related_symbol_occurrence_by_usr(
        "c:@ST>1#T@Box",
        SymbolRoleSet::REL_SPECIALIZATION_OF,
        |occ| {
            found.push((occ.roles(), occ.relations()[0].roles()));
            true
        },
    );
    assert_eq!(
        found,
        vec![(
            SymbolRoleSet::DEFINITION | SymbolRoleSet::REL_SPECIALIZATION_OF,
            SymbolRoleSet::REL_SPECIALIZATION_OF
        )]
    );
}

#[test]
fn test_failed_open_leaves_no_database_dir() {
    let dir = TempDir::new().unwrap();
    let store = setup_store(dir.path(), &foo_units());
    Connection::open(&store)
        .unwrap()
        .execute("UPDATE meta SET value = '99' WHERE key = 'schema_version'", [])
        .unwrap();
    let database = dir.path().join("db");

    let err = open(&store, &database, IndexOptions::default()).unwrap_err();
    assert!(matches!(err, IndexError::SchemaMismatch { .. }));
    assert!(!database.exists());
}
