//! Store abstraction: the collaborator that owns persisted symbol data.
//!
//! The query facade never touches storage directly. It asks an
//! [`IndexSystem`] for an [`IndexReader`], a consistent view of the data for
//! the duration of one query, and walks it through these primitives:
//!
//! - occurrences of a USR
//! - occurrences that carry a relation to a USR
//! - occurrences in a file
//! - distinct symbol names, USRs by name, USRs by kind
//!
//! Every primitive streams through a receiver returning `true` to continue
//! and `false` to stop, and reports whether it ran to completion.
//!
//! A [`StoreLibrary`] knows how to open an `IndexSystem` for one store
//! format. Callers hand the index a [`LibraryProvider`] that maps a store
//! path to the library able to read it.

pub mod memory;
pub mod sqlite;

use crate::error::{IndexError, Result};
use crate::index::IndexOptions;
use crate::symbol::{SymbolKind, SymbolOccurrenceRef};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

pub use memory::{MemoryStore, Snapshot};
pub use sqlite::{SqliteLibrary, SqliteStore};

/// Receiver for occurrence streams.
pub type OccurrenceReceiver<'a> = dyn FnMut(&SymbolOccurrenceRef) -> bool + 'a;

/// Receiver for string streams (names, USRs).
pub type StrReceiver<'a> = dyn FnMut(&str) -> bool + 'a;

/// Read view over the store. Implementations must keep the view stable for
/// their whole lifetime, even while the store is being extended.
pub trait IndexReader {
    /// Occurrences whose symbol has this USR, in a deterministic order.
    fn foreach_occurrence_by_usr(&self, usr: &str, receiver: &mut OccurrenceReceiver<'_>) -> bool;

    /// Occurrences holding at least one relation whose target has this USR.
    fn foreach_related_occurrence_by_usr(
        &self,
        usr: &str,
        receiver: &mut OccurrenceReceiver<'_>,
    ) -> bool;

    /// Occurrences located in `path`, in a deterministic order.
    fn foreach_occurrence_in_file(&self, path: &str, receiver: &mut OccurrenceReceiver<'_>)
        -> bool;

    /// Every distinct symbol name, once.
    fn foreach_symbol_name(&self, receiver: &mut StrReceiver<'_>) -> bool;

    /// USRs of symbols named exactly `name`.
    fn foreach_usr_by_name(&self, name: &str, receiver: &mut StrReceiver<'_>) -> bool;

    /// USRs of symbols of the given kind.
    fn foreach_usr_of_kind(&self, kind: SymbolKind, receiver: &mut StrReceiver<'_>) -> bool;

    fn counts(&self) -> StoreCounts;
}

/// The storage collaborator behind an index.
pub trait IndexSystem: Send + Sync {
    /// Returns a read view for one query.
    fn reader(&self) -> Box<dyn IndexReader>;

    /// Blocks until updates that were pending at call time are visible.
    fn poll_for_unit_changes_and_wait(&self);
}

/// Element counts of a store view.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreCounts {
    pub units: usize,
    pub symbols: usize,
    pub occurrences: usize,
    pub files: usize,
}

/// A library able to open stores of one format.
pub trait StoreLibrary: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    fn open_index_system(
        &self,
        store_path: &Path,
        options: &IndexOptions,
    ) -> Result<Arc<dyn IndexSystem>>;
}

pub type StoreLibraryRef = Arc<dyn StoreLibrary>;

/// Maps a store path to the library that can read it.
///
/// Returning `None` means no library is available for that path. Closures
/// of the right shape implement this trait.
pub trait LibraryProvider {
    fn library_for_store_path(&self, store_path: &str) -> Option<StoreLibraryRef>;
}

impl<F> LibraryProvider for F
where
    F: Fn(&str) -> Option<StoreLibraryRef>,
{
    fn library_for_store_path(&self, store_path: &str) -> Option<StoreLibraryRef> {
        self(store_path)
    }
}

/// Store format detected from a file header.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StoreFormat {
    /// SQLite database format
    Sqlite,
    /// Unknown or unreadable format
    Unknown,
}

/// Detect the format of a store file by checking magic bytes.
///
/// An existing empty file counts as SQLite, since SQLite initializes empty
/// files as new databases.
pub fn detect_store_format(path: &Path) -> StoreFormat {
    use std::fs::File;
    use std::io::Read;

    let mut file = match File::open(path) {
        Ok(f) => f,
        Err(_) => return StoreFormat::Unknown,
    };
    match file.metadata() {
        Ok(meta) if meta.is_file() && meta.len() == 0 => return StoreFormat::Sqlite,
        Ok(meta) if !meta.is_file() => return StoreFormat::Unknown,
        Ok(_) => {}
        Err(_) => return StoreFormat::Unknown,
    }

    let mut header = [0u8; 16];
    if file.read_exact(&mut header).is_err() {
        return StoreFormat::Unknown;
    }

    // SQLite magic bytes: "SQLite format 3\0"
    if header[0..16] == *b"SQLite format 3\0" {
        return StoreFormat::Sqlite;
    }

    StoreFormat::Unknown
}

/// Resolves the built-in library able to read the store at `path`.
pub fn load_store_library(path: &Path) -> Result<StoreLibraryRef> {
    if !path.exists() {
        return Err(IndexError::StoreNotFound {
            path: path.display().to_string(),
        });
    }
    match detect_store_format(path) {
        StoreFormat::Sqlite => Ok(Arc::new(SqliteLibrary)),
        StoreFormat::Unknown => Err(IndexError::UnsupportedStore {
            path: path.display().to_string(),
            reason: "unrecognized file header".to_string(),
        }),
    }
}

/// One relation as recorded by the indexer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationRecord {
    pub roles: u64,
    pub usr: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub kind: SymbolKind,
}

/// One occurrence as recorded by the indexer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OccurrenceRecord {
    pub usr: String,
    pub name: String,
    pub kind: SymbolKind,
    pub path: String,
    pub line: u32,
    pub column: u32,
    #[serde(default)]
    pub is_system: bool,
    pub roles: u64,
    #[serde(default)]
    pub relations: Vec<RelationRecord>,
}

impl OccurrenceRecord {
    pub fn new(
        usr: &str,
        name: &str,
        kind: SymbolKind,
        path: &str,
        line: u32,
        column: u32,
        roles: crate::roles::SymbolRoleSet,
    ) -> Self {
        Self {
            usr: usr.to_string(),
            name: name.to_string(),
            kind,
            path: path.to_string(),
            line,
            column,
            is_system: false,
            roles: roles.bits(),
            relations: Vec::new(),
        }
    }

    pub fn system(mut self, is_system: bool) -> Self {
        self.is_system = is_system;
        self
    }

    pub fn related(
        mut self,
        roles: crate::roles::SymbolRoleSet,
        usr: &str,
        name: &str,
        kind: SymbolKind,
    ) -> Self {
        self.relations.push(RelationRecord {
            roles: roles.bits(),
            usr: usr.to_string(),
            name: name.to_string(),
            kind,
        });
        self
    }
}

/// A named batch of records, typically one translation unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    pub name: String,
    pub records: Vec<OccurrenceRecord>,
}

impl Unit {
    pub fn new(name: impl Into<String>, records: Vec<OccurrenceRecord>) -> Self {
        Self {
            name: name.into(),
            records,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_detect_sqlite_header() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.db");
        let conn = rusqlite::Connection::open(&path).unwrap();
        conn.execute_batch("CREATE TABLE t (x INTEGER);").unwrap();
        drop(conn);
        assert_eq!(detect_store_format(&path), StoreFormat::Sqlite);
    }

    #[test]
    fn test_detect_empty_file_as_sqlite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.db");
        std::fs::File::create(&path).unwrap();
        assert_eq!(detect_store_format(&path), StoreFormat::Sqlite);
    }

    #[test]
    fn test_detect_unknown_formats() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("notes.txt");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(b"definitely not a database header").unwrap();
        assert_eq!(detect_store_format(&path), StoreFormat::Unknown);
        assert_eq!(detect_store_format(dir.path()), StoreFormat::Unknown);
        assert_eq!(
            detect_store_format(&dir.path().join("missing.db")),
            StoreFormat::Unknown
        );
    }

    #[test]
    fn test_load_store_library_errors() {
        let dir = TempDir::new().unwrap();
        let missing = load_store_library(&dir.path().join("missing.db")).unwrap_err();
        assert_eq!(missing.error_code(), "SYM-E001");

        let path = dir.path().join("garbage.bin");
        std::fs::write(&path, b"0123456789abcdefghij").unwrap();
        let unsupported = load_store_library(&path).unwrap_err();
        assert_eq!(unsupported.error_code(), "SYM-E102");
    }

    #[test]
    fn test_closure_is_a_library_provider() {
        let provider = |path: &str| -> Option<StoreLibraryRef> {
            if path.ends_with(".db") {
                Some(Arc::new(SqliteLibrary))
            } else {
                None
            }
        };
        assert!(provider.library_for_store_path("a.db").is_some());
        assert!(provider.library_for_store_path("a.store").is_none());
    }
}
