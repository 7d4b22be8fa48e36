//! Query facade over a store collaborator.
//!
//! Every query streams results through a receiver closure that returns
//! `true` to keep going and `false` to stop. The query returns `true` when
//! it exhausted all matches and `false` when the receiver stopped it. An
//! unknown USR, path or name is not an error: it is an empty stream that
//! returns `true`.

use crate::error::{IndexError, Result};
use crate::matcher::NamePattern;
use crate::roles::{SymbolRoleSet, RELATION_ROLES};
use crate::store::{IndexReader, IndexSystem, LibraryProvider, StoreCounts, StoreLibraryRef};
use crate::symbol::{SymbolKind, SymbolOccurrenceRef};
use serde::Serialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Version of the `state.json` document written into the database directory.
pub const STATE_VERSION: u32 = 1;

const STATE_FILE: &str = "state.json";

/// Options controlling how an index is opened.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexOptions {
    /// Never write: the database directory must exist and the store is
    /// opened read-only.
    pub readonly: bool,
    /// Check the store for committed changes before every query.
    pub listen_for_updates: bool,
}

impl IndexOptions {
    pub fn readonly(mut self, readonly: bool) -> Self {
        self.readonly = readonly;
        self
    }

    pub fn listen_for_updates(mut self, listen: bool) -> Self {
        self.listen_for_updates = listen;
        self
    }
}

#[derive(Debug, Default)]
struct QueryCounters {
    occurrences_by_usr: AtomicU64,
    related_occurrences_by_usr: AtomicU64,
    occurrences_at_location: AtomicU64,
    symbol_names: AtomicU64,
    canonical_by_name: AtomicU64,
    canonical_by_pattern: AtomicU64,
    canonical_by_usr: AtomicU64,
    canonical_by_kind: AtomicU64,
    canonical_kind_counts: AtomicU64,
    polls: AtomicU64,
}

impl QueryCounters {
    fn snapshot(&self) -> QueryStats {
        QueryStats {
            occurrences_by_usr: self.occurrences_by_usr.load(Ordering::Relaxed),
            related_occurrences_by_usr: self.related_occurrences_by_usr.load(Ordering::Relaxed),
            occurrences_at_location: self.occurrences_at_location.load(Ordering::Relaxed),
            symbol_names: self.symbol_names.load(Ordering::Relaxed),
            canonical_by_name: self.canonical_by_name.load(Ordering::Relaxed),
            canonical_by_pattern: self.canonical_by_pattern.load(Ordering::Relaxed),
            canonical_by_usr: self.canonical_by_usr.load(Ordering::Relaxed),
            canonical_by_kind: self.canonical_by_kind.load(Ordering::Relaxed),
            canonical_kind_counts: self.canonical_kind_counts.load(Ordering::Relaxed),
            polls: self.polls.load(Ordering::Relaxed),
        }
    }
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

/// Number of calls per query operation since the index was opened.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueryStats {
    pub occurrences_by_usr: u64,
    pub related_occurrences_by_usr: u64,
    pub occurrences_at_location: u64,
    pub symbol_names: u64,
    pub canonical_by_name: u64,
    pub canonical_by_pattern: u64,
    pub canonical_by_usr: u64,
    pub canonical_by_kind: u64,
    pub canonical_kind_counts: u64,
    pub polls: u64,
}

/// Store element counts plus query counters.
#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    pub store: StoreCounts,
    pub queries: QueryStats,
}

#[derive(Serialize)]
struct IndexState<'a> {
    state_version: u32,
    store_path: &'a str,
    library: &'a str,
    counts: StoreCounts,
    updated_at: String,
}

struct IndexInner {
    system: Arc<dyn IndexSystem>,
    library: Option<StoreLibraryRef>,
    options: IndexOptions,
    store_path: Option<PathBuf>,
    database_path: Option<PathBuf>,
    counters: QueryCounters,
}

/// Handle on an open index. Clones share the same collaborator.
#[derive(Clone)]
pub struct Index {
    inner: Arc<IndexInner>,
}

impl std::fmt::Debug for Index {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Index")
            .field("store_path", &self.inner.store_path)
            .field("database_path", &self.inner.database_path)
            .field("options", &self.inner.options)
            .finish_non_exhaustive()
    }
}

impl Index {
    /// Opens an index over the store at `store_path`.
    ///
    /// `provider` is asked, synchronously, for the library able to read
    /// the store. `database_path` is the index's own state directory.
    pub fn open(
        store_path: impl AsRef<Path>,
        database_path: impl AsRef<Path>,
        provider: &dyn LibraryProvider,
        options: IndexOptions,
    ) -> Result<Index> {
        let store_path = store_path.as_ref();
        let database_path = database_path.as_ref();

        if !store_path.exists() {
            return Err(IndexError::StoreNotFound {
                path: store_path.display().to_string(),
            });
        }
        let store_str = store_path.to_str().ok_or_else(|| IndexError::InvalidArgument {
            reason: format!("store path {:?} is not valid UTF-8", store_path),
        })?;

        let library = provider
            .library_for_store_path(store_str)
            .ok_or_else(|| IndexError::LibraryUnavailable {
                path: store_str.to_string(),
            })?;

        if options.readonly && !database_path.is_dir() {
            return Err(IndexError::DatabaseNotFound {
                path: database_path.display().to_string(),
            });
        }

        let system = library.open_index_system(store_path, &options)?;
        if !options.readonly {
            fs::create_dir_all(database_path)?;
        }
        log::debug!(
            "Opened index over {} with library '{}' (readonly={}, listen={})",
            store_path.display(),
            library.name(),
            options.readonly,
            options.listen_for_updates
        );

        let index = Index {
            inner: Arc::new(IndexInner {
                system,
                library: Some(library),
                options,
                store_path: Some(store_path.to_path_buf()),
                database_path: Some(database_path.to_path_buf()),
                counters: QueryCounters::default(),
            }),
        };
        if !options.readonly {
            index.write_state()?;
        }
        Ok(index)
    }

    /// Wraps an already built collaborator. Nothing is written to disk.
    pub fn with_system(system: Arc<dyn IndexSystem>) -> Index {
        Index {
            inner: Arc::new(IndexInner {
                system,
                library: None,
                options: IndexOptions::default().readonly(true),
                store_path: None,
                database_path: None,
                counters: QueryCounters::default(),
            }),
        }
    }

    pub fn options(&self) -> IndexOptions {
        self.inner.options
    }

    pub fn store_path(&self) -> Option<&Path> {
        self.inner.store_path.as_deref()
    }

    pub fn database_path(&self) -> Option<&Path> {
        self.inner.database_path.as_deref()
    }

    /// The library the index was opened with, if any.
    pub fn library(&self) -> Option<&StoreLibraryRef> {
        self.inner.library.as_ref()
    }

    fn reader(&self) -> Box<dyn IndexReader> {
        self.inner.system.reader()
    }

    /// Occurrences of the symbol `usr` whose roles pass `roles`.
    pub fn foreach_symbol_occurrence_by_usr(
        &self,
        usr: &str,
        roles: SymbolRoleSet,
        mut receiver: impl FnMut(&SymbolOccurrenceRef) -> bool,
    ) -> bool {
        bump(&self.inner.counters.occurrences_by_usr);
        log::trace!("occurrences by usr {} roles={}", usr, roles);
        let reader = self.reader();
        reader.foreach_occurrence_by_usr(usr, &mut |occ| {
            if !occ.roles().matches_filter(roles) {
                return true;
            }
            receiver(occ)
        })
    }

    /// Occurrences that carry a relation to `usr`.
    ///
    /// The filter is applied to the occurrence's own roles together with
    /// the roles of its relations to `usr`, so `REL_CALLED_BY` finds call
    /// sites and `CALL` finds the same occurrences by their own role.
    /// Relation bits from edges to other symbols do not count. The set
    /// tested is always a subset of the occurrence's `roles()`.
    pub fn foreach_related_symbol_occurrence_by_usr(
        &self,
        usr: &str,
        roles: SymbolRoleSet,
        mut receiver: impl FnMut(&SymbolOccurrenceRef) -> bool,
    ) -> bool {
        bump(&self.inner.counters.related_occurrences_by_usr);
        log::trace!("related occurrences of {} roles={}", usr, roles);
        let reader = self.reader();
        reader.foreach_related_occurrence_by_usr(usr, &mut |occ| {
            let combined = occ
                .relations_to(usr)
                .fold(occ.roles() - RELATION_ROLES, |acc, rel| acc | rel.roles());
            if !combined.matches_filter(roles) {
                return true;
            }
            receiver(occ)
        })
    }

    /// Occurrences starting exactly at `line`:`column` of `path`.
    ///
    /// Both coordinates are 1-based; a zero yields an empty stream.
    pub fn foreach_symbol_occurrence_at_location(
        &self,
        path: &str,
        line: u32,
        column: u32,
        roles: SymbolRoleSet,
        mut receiver: impl FnMut(&SymbolOccurrenceRef) -> bool,
    ) -> bool {
        bump(&self.inner.counters.occurrences_at_location);
        log::trace!("occurrences at {}:{}:{} roles={}", path, line, column, roles);
        if line == 0 || column == 0 {
            return true;
        }
        let reader = self.reader();
        reader.foreach_occurrence_in_file(path, &mut |occ| {
            if !occ.location().is_at(path, line, column) || !occ.roles().matches_filter(roles) {
                return true;
            }
            receiver(occ)
        })
    }

    /// Every distinct symbol name, once each.
    pub fn foreach_symbol_name(&self, mut receiver: impl FnMut(&str) -> bool) -> bool {
        bump(&self.inner.counters.symbol_names);
        let reader = self.reader();
        reader.foreach_symbol_name(&mut |name| receiver(name))
    }

    /// The canonical occurrence of each symbol named exactly `name`.
    pub fn foreach_canonical_symbol_occurrence_by_name(
        &self,
        name: &str,
        mut receiver: impl FnMut(&SymbolOccurrenceRef) -> bool,
    ) -> bool {
        bump(&self.inner.counters.canonical_by_name);
        log::trace!("canonical occurrences named {}", name);
        let reader = self.reader();
        let reader = reader.as_ref();
        let mut seen = HashSet::new();
        reader.foreach_usr_by_name(name, &mut |usr| {
            emit_canonical(reader, usr, false, &mut seen, &mut receiver)
        })
    }

    /// The canonical occurrence of each symbol whose name matches `pattern`.
    ///
    /// The pattern is tested once per distinct name.
    pub fn foreach_canonical_symbol_occurrence_containing_pattern(
        &self,
        pattern: &NamePattern,
        mut receiver: impl FnMut(&SymbolOccurrenceRef) -> bool,
    ) -> bool {
        bump(&self.inner.counters.canonical_by_pattern);
        log::trace!(
            "canonical occurrences matching '{}' (start={}, end={}, subsequence={}, ignore_case={})",
            pattern.pattern(),
            pattern.is_anchor_start(),
            pattern.is_anchor_end(),
            pattern.is_subsequence(),
            pattern.is_ignore_case()
        );
        let reader = self.reader();
        let reader = reader.as_ref();
        let mut seen = HashSet::new();
        reader.foreach_symbol_name(&mut |name| {
            if !pattern.matches(name) {
                return true;
            }
            reader.foreach_usr_by_name(name, &mut |usr| {
                emit_canonical(reader, usr, false, &mut seen, &mut receiver)
            })
        })
    }

    /// The canonical occurrence of the symbol `usr`, if it has one.
    pub fn foreach_canonical_symbol_occurrence_by_usr(
        &self,
        usr: &str,
        mut receiver: impl FnMut(&SymbolOccurrenceRef) -> bool,
    ) -> bool {
        bump(&self.inner.counters.canonical_by_usr);
        let reader = self.reader();
        let mut seen = HashSet::new();
        emit_canonical(reader.as_ref(), usr, false, &mut seen, &mut receiver)
    }

    /// The canonical occurrence of each symbol of `kind`.
    ///
    /// With `workspace_only`, symbols whose canonical occurrence is in a
    /// system location are skipped.
    pub fn foreach_canonical_symbol_occurrence_by_kind(
        &self,
        kind: SymbolKind,
        workspace_only: bool,
        mut receiver: impl FnMut(&SymbolOccurrenceRef) -> bool,
    ) -> bool {
        bump(&self.inner.counters.canonical_by_kind);
        log::trace!("canonical occurrences of kind {} workspace_only={}", kind, workspace_only);
        self.stream_canonical_of_kind(kind, workspace_only, &mut receiver)
    }

    pub fn count_of_canonical_symbols_with_kind(
        &self,
        kind: SymbolKind,
        workspace_only: bool,
    ) -> usize {
        bump(&self.inner.counters.canonical_kind_counts);
        let mut count = 0;
        self.stream_canonical_of_kind(kind, workspace_only, &mut |_| {
            count += 1;
            true
        });
        count
    }

    fn stream_canonical_of_kind(
        &self,
        kind: SymbolKind,
        workspace_only: bool,
        receiver: &mut dyn FnMut(&SymbolOccurrenceRef) -> bool,
    ) -> bool {
        let reader = self.reader();
        let reader = reader.as_ref();
        let mut seen = HashSet::new();
        reader.foreach_usr_of_kind(kind, &mut |usr| {
            emit_canonical(reader, usr, workspace_only, &mut seen, &mut *receiver)
        })
    }

    /// Blocks until pending store updates are visible to queries.
    pub fn poll_for_unit_changes_and_wait(&self) {
        bump(&self.inner.counters.polls);
        self.inner.system.poll_for_unit_changes_and_wait();
        if !self.inner.options.readonly {
            if let Err(e) = self.write_state() {
                log::warn!("Failed to update index state: {}", e);
            }
        }
    }

    pub fn stats(&self) -> IndexStats {
        IndexStats {
            store: self.reader().counts(),
            queries: self.inner.counters.snapshot(),
        }
    }

    fn write_state(&self) -> Result<()> {
        let Some(database_path) = self.inner.database_path.as_deref() else {
            return Ok(());
        };
        let store_path = self
            .inner
            .store_path
            .as_deref()
            .and_then(Path::to_str)
            .unwrap_or_default();
        let library = self
            .inner
            .library
            .as_ref()
            .map(|lib| lib.name())
            .unwrap_or_default();
        let state = IndexState {
            state_version: STATE_VERSION,
            store_path,
            library,
            counts: self.reader().counts(),
            updated_at: chrono::Utc::now().to_rfc3339(),
        };
        let json = serde_json::to_vec_pretty(&state)?;

        let target = database_path.join(STATE_FILE);
        let tmp = database_path.join(format!("{}.tmp", STATE_FILE));
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &target)?;
        log::debug!("Wrote index state to {}", target.display());
        Ok(())
    }
}

/// Streams the canonical occurrence of `usr` unless the USR was already
/// handled in this query. Returns the receiver's verdict.
fn emit_canonical(
    reader: &dyn IndexReader,
    usr: &str,
    workspace_only: bool,
    seen: &mut HashSet<String>,
    receiver: &mut dyn FnMut(&SymbolOccurrenceRef) -> bool,
) -> bool {
    if !seen.insert(usr.to_string()) {
        return true;
    }
    match canonical_occurrence(reader, usr) {
        Some(occ) if workspace_only && occ.location().is_system() => true,
        Some(occ) => receiver(&occ),
        None => true,
    }
}

/// Picks the representative occurrence of a symbol: the first one marked
/// canonical, else the first declaration or definition.
fn canonical_occurrence(reader: &dyn IndexReader, usr: &str) -> Option<SymbolOccurrenceRef> {
    let mut canonical = None;
    let mut fallback = None;
    reader.foreach_occurrence_by_usr(usr, &mut |occ| {
        if occ.roles().is_canonical() {
            canonical = Some(occ.clone());
            return false;
        }
        if fallback.is_none()
            && occ
                .roles()
                .intersects(SymbolRoleSet::DECLARATION | SymbolRoleSet::DEFINITION)
        {
            fallback = Some(occ.clone());
        }
        true
    });
    canonical.or(fallback)
}
