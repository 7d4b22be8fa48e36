//! symdb - query interface over a persisted source-code symbol index.
//!
//! Given a store of previously extracted symbol occurrences, symdb looks up
//! occurrences by USR, by exact source position and by exact or fuzzy name,
//! and walks the relations between symbols (base-of, override-of,
//! called-by, child-of, ...).
//!
//! # Features
//!
//! - **Streaming queries**: results go to a receiver closure that can stop
//!   the query at any point
//! - **Role filtering**: 64-bit role sets with a reserved canonical bit
//! - **Name matching**: anchored, subsequence and case-insensitive patterns
//! - **Stores**: an in-memory store and a SQLite-backed store
//! - **C ABI**: reference-counted opaque handles, see `include/symdb.h`
//!
//! # Quick Start
//!
//! ```no_run
//! use symdb::store::load_store_library;
//! use symdb::{Index, IndexOptions, SymbolRoleSet};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let library = load_store_library("index.db".as_ref())?;
//! let index = Index::open(
//!     "index.db",
//!     "index.db.d",
//!     &move |_: &str| Some(library.clone()),
//!     IndexOptions::default().readonly(true),
//! )?;
//! index.foreach_symbol_occurrence_by_usr("c:@F@main", SymbolRoleSet::DEFINITION, |occ| {
//!     println!("{}", occ.location());
//!     true
//! });
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! - [`index`] - Query facade
//! - [`store`] - Store collaborators (memory, SQLite)
//! - [`matcher`] - Name patterns
//! - [`roles`] - Role bit sets
//! - [`symbol`] - Symbols, occurrences, locations, relations
//! - [`ffi`] - C boundary
//! - [`error`] - Error types
//! - [`output`] - Response types and formatting

pub mod error;
pub mod ffi;
pub mod index;
pub mod matcher;
pub mod output;
pub mod output_common;
pub mod roles;
pub mod store;
pub mod symbol;

pub use error::{IndexError, Result};
pub use index::{Index, IndexOptions, IndexStats, QueryStats};
pub use matcher::NamePattern;
pub use roles::SymbolRoleSet;
pub use store::{IndexReader, IndexSystem, LibraryProvider, MemoryStore, SqliteStore};
pub use symbol::{
    Symbol, SymbolKind, SymbolLocation, SymbolOccurrence, SymbolOccurrenceRef, SymbolRef,
    SymbolRelation,
};
