//! SQLite store collaborator.
//!
//! The store file is read once into a [`MemoryStore`] snapshot and served
//! from memory. `PRAGMA data_version` tells us when another connection
//! has committed, at which point the snapshot is rebuilt.

use super::memory::MemoryStore;
use super::{IndexReader, IndexSystem, OccurrenceRecord, RelationRecord, StoreLibrary, Unit};
use crate::error::{IndexError, Result};
use crate::index::IndexOptions;
use crate::symbol::SymbolKind;
use indexmap::IndexMap;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Schema version written to and expected in the `meta` table.
pub const SCHEMA_VERSION: &str = "1";

const REQUIRED_TABLES: &[&str] = &["symbols", "occurrences", "relations", "meta"];

const SCHEMA_SQL: &str = "
    CREATE TABLE IF NOT EXISTS symbols (
        usr TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        kind INTEGER NOT NULL
    );
    CREATE TABLE IF NOT EXISTS occurrences (
        id INTEGER PRIMARY KEY,
        unit TEXT NOT NULL,
        usr TEXT NOT NULL,
        path TEXT NOT NULL,
        line INTEGER NOT NULL,
        col INTEGER NOT NULL,
        is_system INTEGER NOT NULL DEFAULT 0,
        roles INTEGER NOT NULL
    );
    CREATE TABLE IF NOT EXISTS relations (
        occurrence_id INTEGER NOT NULL,
        roles INTEGER NOT NULL,
        usr TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS meta (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_occurrences_unit ON occurrences(unit);
    CREATE INDEX IF NOT EXISTS idx_relations_occurrence ON relations(occurrence_id);
";

/// Built-in library for SQLite symbol stores.
#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteLibrary;

impl StoreLibrary for SqliteLibrary {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn open_index_system(
        &self,
        store_path: &Path,
        options: &IndexOptions,
    ) -> Result<Arc<dyn IndexSystem>> {
        Ok(Arc::new(SqliteStore::open(store_path, options)?))
    }
}

struct Tracked {
    conn: Connection,
    data_version: i64,
}

/// Collaborator serving a SQLite store from an in-memory snapshot.
pub struct SqliteStore {
    tracked: Mutex<Tracked>,
    memory: MemoryStore,
    listen: bool,
    path: PathBuf,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("path", &self.path)
            .field("listen", &self.listen)
            .finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Open a store and load its content.
    ///
    /// A readonly open requires the schema to be present already; a
    /// writable open creates it when missing.
    pub fn open(path: &Path, options: &IndexOptions) -> Result<Self> {
        let conn = if options.readonly {
            Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?
        } else {
            let conn = Connection::open(path)?;
            initialize_schema(&conn)?;
            conn
        };
        check_schema(&conn)?;

        let data_version = data_version(&conn)?;
        let units = load_units(&conn)?;
        log::debug!(
            "Opened SQLite store {} ({} units, readonly={})",
            path.display(),
            units.len(),
            options.readonly
        );

        let memory = MemoryStore::new();
        memory.replace_all(units);

        Ok(Self {
            tracked: Mutex::new(Tracked { conn, data_version }),
            memory,
            listen: options.listen_for_updates,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reloads the snapshot if another connection committed since the
    /// last load. Returns true when a reload happened.
    pub fn refresh(&self) -> Result<bool> {
        let mut tracked = self.tracked.lock();
        let current = data_version(&tracked.conn)?;
        if current == tracked.data_version {
            return Ok(false);
        }
        let units = load_units(&tracked.conn)?;
        log::debug!(
            "Store {} changed (data_version {} -> {}), reloading {} units",
            self.path.display(),
            tracked.data_version,
            current,
            units.len()
        );
        self.memory.replace_all(units);
        tracked.data_version = current;
        Ok(true)
    }

    fn refresh_or_warn(&self) {
        if let Err(e) = self.refresh() {
            log::warn!(
                "Failed to reload store {}, keeping previous snapshot: {}",
                self.path.display(),
                e
            );
        }
    }
}

impl IndexSystem for SqliteStore {
    fn reader(&self) -> Box<dyn IndexReader> {
        if self.listen {
            self.refresh_or_warn();
        }
        self.memory.reader()
    }

    fn poll_for_unit_changes_and_wait(&self) {
        self.refresh_or_warn();
    }
}

/// Creates the store tables and records the schema version.
pub fn initialize_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;
    conn.execute(
        "INSERT OR IGNORE INTO meta (key, value) VALUES ('schema_version', ?1)",
        params![SCHEMA_VERSION],
    )?;
    Ok(())
}

fn check_schema(conn: &Connection) -> Result<()> {
    for table in REQUIRED_TABLES {
        let found: Option<String> = conn
            .query_row(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1",
                params![table],
                |row| row.get(0),
            )
            .optional()?;
        if found.is_none() {
            return Err(IndexError::StoreCorrupted {
                reason: format!("missing table '{}'", table),
            });
        }
    }

    let version: Option<String> = conn
        .query_row(
            "SELECT value FROM meta WHERE key = 'schema_version'",
            [],
            |row| row.get(0),
        )
        .optional()?;
    match version {
        Some(v) if v == SCHEMA_VERSION => Ok(()),
        Some(v) => Err(IndexError::SchemaMismatch {
            expected: SCHEMA_VERSION.to_string(),
            found: v,
        }),
        None => Err(IndexError::StoreCorrupted {
            reason: "missing schema_version in meta table".to_string(),
        }),
    }
}

fn data_version(conn: &Connection) -> Result<i64> {
    Ok(conn.query_row("PRAGMA data_version", [], |row| row.get(0))?)
}

fn to_u32(value: i64, column: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| IndexError::StoreCorrupted {
        reason: format!("{} value {} out of range", column, value),
    })
}

fn to_kind(raw: i64) -> SymbolKind {
    u32::try_from(raw)
        .map(SymbolKind::from_raw)
        .unwrap_or(SymbolKind::Unknown)
}

/// Reads every unit, occurrences ordered by id.
fn load_units(conn: &Connection) -> Result<Vec<Unit>> {
    let mut relations: HashMap<i64, Vec<RelationRecord>> = HashMap::new();
    {
        let mut stmt = conn.prepare(
            "SELECT r.occurrence_id, r.roles, r.usr, COALESCE(s.name, ''), COALESCE(s.kind, 0)
             FROM relations r
             LEFT JOIN symbols s ON s.usr = r.usr
             ORDER BY r.occurrence_id, r.rowid",
        )?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let occurrence_id: i64 = row.get(0)?;
            let roles: i64 = row.get(1)?;
            relations
                .entry(occurrence_id)
                .or_default()
                .push(RelationRecord {
                    roles: roles as u64,
                    usr: row.get(2)?,
                    name: row.get(3)?,
                    kind: to_kind(row.get(4)?),
                });
        }
    }

    let mut units: IndexMap<String, Vec<OccurrenceRecord>> = IndexMap::new();
    let mut stmt = conn.prepare(
        "SELECT o.id, o.unit, o.usr, COALESCE(s.name, ''), COALESCE(s.kind, 0),
                o.path, o.line, o.col, o.is_system, o.roles
         FROM occurrences o
         LEFT JOIN symbols s ON s.usr = o.usr
         ORDER BY o.id",
    )?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let id: i64 = row.get(0)?;
        let unit: String = row.get(1)?;
        let roles: i64 = row.get(9)?;
        let record = OccurrenceRecord {
            usr: row.get(2)?,
            name: row.get(3)?,
            kind: to_kind(row.get(4)?),
            path: row.get(5)?,
            line: to_u32(row.get(6)?, "line")?,
            column: to_u32(row.get(7)?, "col")?,
            is_system: row.get::<_, i64>(8)? != 0,
            roles: roles as u64,
            relations: relations.remove(&id).unwrap_or_default(),
        };
        units.entry(unit).or_default().push(record);
    }

    Ok(units
        .into_iter()
        .map(|(name, records)| Unit::new(name, records))
        .collect())
}

/// Writes `unit` into the store, replacing any rows previously written
/// under the same unit name.
pub fn write_unit(conn: &Connection, unit: &Unit) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "DELETE FROM relations WHERE occurrence_id IN
            (SELECT id FROM occurrences WHERE unit = ?1)",
        params![unit.name],
    )?;
    tx.execute("DELETE FROM occurrences WHERE unit = ?1", params![unit.name])?;

    for record in &unit.records {
        tx.execute(
            "INSERT OR IGNORE INTO symbols (usr, name, kind) VALUES (?1, ?2, ?3)",
            params![record.usr, record.name, record.kind.as_raw()],
        )?;
        tx.execute(
            "INSERT INTO occurrences (unit, usr, path, line, col, is_system, roles)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                unit.name,
                record.usr,
                record.path,
                record.line,
                record.column,
                record.is_system,
                record.roles as i64,
            ],
        )?;
        let occurrence_id = tx.last_insert_rowid();
        for relation in &record.relations {
            if !relation.name.is_empty() {
                tx.execute(
                    "INSERT OR IGNORE INTO symbols (usr, name, kind) VALUES (?1, ?2, ?3)",
                    params![relation.usr, relation.name, relation.kind.as_raw()],
                )?;
            }
            tx.execute(
                "INSERT INTO relations (occurrence_id, roles, usr) VALUES (?1, ?2, ?3)",
                params![occurrence_id, relation.roles as i64, relation.usr],
            )?;
        }
    }
    tx.commit()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roles::SymbolRoleSet;
    use tempfile::TempDir;

    fn sample_unit() -> Unit {
        Unit::new(
            "main.c",
            vec![
                OccurrenceRecord::new(
                    "c:@F@main",
                    "main",
                    SymbolKind::Function,
                    "main.c",
                    1,
                    5,
                    SymbolRoleSet::DEFINITION | SymbolRoleSet::CANONICAL,
                ),
                OccurrenceRecord::new(
                    "c:@F@puts",
                    "puts",
                    SymbolKind::Function,
                    "main.c",
                    2,
                    5,
                    SymbolRoleSet::REFERENCE | SymbolRoleSet::CALL,
                )
                .related(SymbolRoleSet::REL_CALLED_BY, "c:@F@main", "main", SymbolKind::Function),
            ],
        )
    }

    fn locations(store: &SqliteStore, usr: &str) -> Vec<String> {
        let mut out = Vec::new();
        store.reader().foreach_occurrence_by_usr(usr, &mut |occ| {
            out.push(occ.location().to_string());
            true
        });
        out
    }

    #[test]
    fn test_open_creates_schema() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.db");
        let store = SqliteStore::open(&path, &IndexOptions::default()).unwrap();
        assert_eq!(store.reader().counts().occurrences, 0);

        let conn = Connection::open(&path).unwrap();
        let version: String = conn
            .query_row("SELECT value FROM meta WHERE key = 'schema_version'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[test]
    fn test_readonly_open_requires_schema() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bare.db");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch("CREATE TABLE other (x INTEGER);").unwrap();
        drop(conn);

        let err = SqliteStore::open(&path, &IndexOptions::default().readonly(true)).unwrap_err();
        assert_eq!(err.error_code(), "SYM-E104");
    }

    #[test]
    fn test_schema_version_mismatch() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("future.db");
        let conn = Connection::open(&path).unwrap();
        initialize_schema(&conn).unwrap();
        conn.execute("UPDATE meta SET value = '99' WHERE key = 'schema_version'", [])
            .unwrap();
        drop(conn);

        let err = SqliteStore::open(&path, &IndexOptions::default()).unwrap_err();
        assert!(matches!(err, IndexError::SchemaMismatch { ref found, .. } if found == "99"));
    }

    #[test]
    fn test_round_trips_canonical_bit_and_relations() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.db");
        let conn = Connection::open(&path).unwrap();
        initialize_schema(&conn).unwrap();
        write_unit(&conn, &sample_unit()).unwrap();
        drop(conn);

        let store = SqliteStore::open(&path, &IndexOptions::default().readonly(true)).unwrap();
        let reader = store.reader();
        let mut roles = Vec::new();
        reader.foreach_occurrence_by_usr("c:@F@main", &mut |occ| {
            roles.push(occ.roles());
            true
        });
        assert_eq!(roles, vec![SymbolRoleSet::DEFINITION | SymbolRoleSet::CANONICAL]);

        let mut related = Vec::new();
        reader.foreach_related_occurrence_by_usr("c:@F@main", &mut |occ| {
            related.push((occ.symbol().name().to_string(), occ.relations()[0].roles()));
            true
        });
        assert_eq!(related, vec![("puts".to_string(), SymbolRoleSet::REL_CALLED_BY)]);
    }

    #[test]
    fn test_write_unit_replaces_previous_rows() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.db");
        let conn = Connection::open(&path).unwrap();
        initialize_schema(&conn).unwrap();
        write_unit(&conn, &sample_unit()).unwrap();
        write_unit(&conn, &sample_unit()).unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM occurrences", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 2);
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM relations", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_poll_picks_up_external_commits() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.db");
        let store = SqliteStore::open(&path, &IndexOptions::default()).unwrap();
        assert!(locations(&store, "c:@F@main").is_empty());

        let writer = Connection::open(&path).unwrap();
        write_unit(&writer, &sample_unit()).unwrap();

        // Not listening: the snapshot only moves on poll.
        assert!(locations(&store, "c:@F@main").is_empty());
        store.poll_for_unit_changes_and_wait();
        assert_eq!(locations(&store, "c:@F@main"), vec!["main.c:1:5"]);
        assert!(!store.refresh().unwrap());
    }

    #[test]
    fn test_listening_store_reloads_on_query() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.db");
        let options = IndexOptions::default().listen_for_updates(true);
        let store = SqliteStore::open(&path, &options).unwrap();

        let writer = Connection::open(&path).unwrap();
        write_unit(&writer, &sample_unit()).unwrap();
        assert_eq!(locations(&store, "c:@F@main"), vec!["main.c:1:5"]);
    }
}
