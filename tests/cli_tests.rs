//! End-to-end tests of the `symdb` binary.

use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use symdb::store::sqlite::{initialize_schema, write_unit};
use symdb::store::{OccurrenceRecord, Unit};
use symdb::{SymbolKind, SymbolRoleSet};
use tempfile::TempDir;

fn setup_store(dir: &Path) -> PathBuf {
    let path = dir.join("index.db");
    let conn = Connection::open(&path).unwrap();
    initialize_schema(&conn).unwrap();
    let canonical = SymbolRoleSet::DEFINITION | SymbolRoleSet::CANONICAL;
    write_unit(
        &conn,
        &Unit::new(
            "a.c",
            vec![
                OccurrenceRecord::new("c:@F@foo", "foo", SymbolKind::Function, "a.c", 3, 5, canonical),
                OccurrenceRecord::new(
                    "c:@F@fooBar",
                    "fooBar",
                    SymbolKind::Function,
                    "a.c",
                    5,
                    5,
                    canonical,
                ),
                OccurrenceRecord::new(
                    "c:@S@Point",
                    "Point",
                    SymbolKind::Struct,
                    "a.c",
                    1,
                    8,
                    canonical,
                ),
            ],
        ),
    )
    .unwrap();
    write_unit(
        &conn,
        &Unit::new(
            "b.c",
            vec![OccurrenceRecord::new(
                "c:@F@foo",
                "foo",
                SymbolKind::Function,
                "b.c",
                10,
                1,
                SymbolRoleSet::REFERENCE | SymbolRoleSet::CALL,
            )],
        ),
    )
    .unwrap();
    path
}

fn symdb(store: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_symdb"))
        .arg("--store")
        .arg(store)
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to run symdb")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn json(output: &Output) -> serde_json::Value {
    serde_json::from_slice(&output.stdout).expect("stdout is not JSON")
}

#[test]
fn test_usr_human_output() {
    let dir = TempDir::new().unwrap();
    let store = setup_store(dir.path());
    let output = symdb(&store, &["usr", "c:@F@foo"]);
    assert!(output.status.success());

    let text = stdout(&output);
    assert!(text.starts_with("total: 2"));
    assert!(text.contains("a.c:3:5 function foo [definition,canonical] c:@F@foo"));
    assert!(text.contains("b.c:10:1 function foo [reference,call] c:@F@foo"));
}

#[test]
fn test_usr_json_with_role_filter() {
    let dir = TempDir::new().unwrap();
    let store = setup_store(dir.path());
    let output = symdb(
        &store,
        &["usr", "c:@F@foo", "--roles", "definition", "--output", "json"],
    );
    assert!(output.status.success());

    let value = json(&output);
    assert_eq!(value["tool"], "symdb");
    assert_eq!(value["partial"], false);
    assert_eq!(value["data"]["total_count"], 1);
    assert_eq!(value["data"]["results"][0]["path"], "a.c");
    assert_eq!(value["data"]["results"][0]["line"], 3);
}

#[test]
fn test_limit_marks_partial() {
    let dir = TempDir::new().unwrap();
    let store = setup_store(dir.path());
    let output = symdb(&store, &["usr", "c:@F@foo", "--limit", "1", "--output", "json"]);
    let value = json(&output);
    assert_eq!(value["partial"], true);
    assert_eq!(value["data"]["total_count"], 1);

    let output = symdb(&store, &["usr", "c:@F@foo", "--limit", "2", "--output", "json"]);
    assert_eq!(json(&output)["partial"], false);
}

#[test]
fn test_at_location() {
    let dir = TempDir::new().unwrap();
    let store = setup_store(dir.path());
    let output = symdb(&store, &["at", "b.c:10:1", "--output", "json"]);
    let value = json(&output);
    assert_eq!(value["data"]["total_count"], 1);
    assert_eq!(value["data"]["results"][0]["usr"], "c:@F@foo");
}

#[test]
fn test_find_subsequence() {
    let dir = TempDir::new().unwrap();
    let store = setup_store(dir.path());
    let output = symdb(&store, &["find", "FB", "--subsequence", "-i", "--output", "json"]);
    let value = json(&output);
    assert_eq!(value["data"]["total_count"], 1);
    assert_eq!(value["data"]["results"][0]["name"], "fooBar");
}

#[test]
fn test_kind_count() {
    let dir = TempDir::new().unwrap();
    let store = setup_store(dir.path());
    let output = symdb(&store, &["kind", "function", "--count", "--output", "json"]);
    let value = json(&output);
    assert_eq!(value["data"]["kind"], "function");
    assert_eq!(value["data"]["total_count"], 2);
}

#[test]
fn test_names_and_stats() {
    let dir = TempDir::new().unwrap();
    let store = setup_store(dir.path());
    let output = symdb(&store, &["names"]);
    let text = stdout(&output);
    assert!(text.starts_with("total: 3"));

    let output = symdb(&store, &["stats", "--output", "json"]);
    let value = json(&output);
    assert_eq!(value["data"]["library"], "sqlite");
    assert_eq!(value["data"]["store"]["units"], 2);
    assert_eq!(value["data"]["store"]["occurrences"], 4);
}

#[test]
fn test_default_database_path_is_created() {
    let dir = TempDir::new().unwrap();
    let store = setup_store(dir.path());
    let output = symdb(&store, &["stats"]);
    assert!(output.status.success());
    assert!(dir.path().join("index.db.d").join("state.json").exists());
}

#[test]
fn test_readonly_without_database_fails() {
    let dir = TempDir::new().unwrap();
    let store = setup_store(dir.path());
    let output = symdb(&store, &["--readonly", "stats", "--output", "json"]);
    assert!(!output.status.success());
    let value = json(&output);
    assert_eq!(value["data"]["code"], "SYM-E002");
}

#[test]
fn test_missing_store_error() {
    let dir = TempDir::new().unwrap();
    let output = symdb(&dir.path().join("missing.db"), &["usr", "c:@F@foo"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("SYM-E001"));
}

#[test]
fn test_bad_location_is_rejected() {
    let dir = TempDir::new().unwrap();
    let store = setup_store(dir.path());
    let output = symdb(&store, &["at", "b.c:10"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("SYM-E301"));
}
