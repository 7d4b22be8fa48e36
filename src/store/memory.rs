//! In-memory store collaborator.
//!
//! Records are grouped into named units. Every change builds a fresh
//! immutable [`Snapshot`] and swaps it in, so a reader that grabbed the
//! previous snapshot keeps a consistent view until it is dropped.

use super::{
    IndexReader, IndexSystem, OccurrenceReceiver, OccurrenceRecord, StoreCounts, StrReceiver, Unit,
};
use crate::roles::SymbolRoleSet;
use crate::symbol::{
    Symbol, SymbolKind, SymbolLocation, SymbolOccurrence, SymbolOccurrenceRef, SymbolRef,
    SymbolRelation,
};
use indexmap::{IndexMap, IndexSet};
use parking_lot::{Mutex, RwLock};
use std::collections::VecDeque;
use std::sync::Arc;

type UnitTable = IndexMap<String, Arc<Vec<OccurrenceRecord>>>;

/// Immutable, fully indexed view of a set of units.
#[derive(Debug, Default)]
pub struct Snapshot {
    symbols: IndexMap<String, SymbolRef>,
    by_usr: IndexMap<String, Vec<SymbolOccurrenceRef>>,
    related_by_usr: IndexMap<String, Vec<SymbolOccurrenceRef>>,
    by_file: IndexMap<String, Vec<SymbolOccurrenceRef>>,
    names: IndexMap<String, IndexSet<String>>,
    kinds: IndexMap<SymbolKind, IndexSet<String>>,
    counts: StoreCounts,
}

impl Snapshot {
    fn build(units: &UnitTable) -> Snapshot {
        let mut symbols: IndexMap<String, SymbolRef> = IndexMap::new();

        // Occurrence symbols first so their names win over relation targets.
        for record in units.values().flat_map(|records| records.iter()) {
            symbols
                .entry(record.usr.clone())
                .or_insert_with(|| Arc::new(Symbol::new(&record.usr, &record.name, record.kind)));
        }
        for relation in units
            .values()
            .flat_map(|records| records.iter())
            .flat_map(|record| record.relations.iter())
        {
            symbols.entry(relation.usr.clone()).or_insert_with(|| {
                Arc::new(Symbol::new(&relation.usr, &relation.name, relation.kind))
            });
        }

        let mut by_usr: IndexMap<String, Vec<SymbolOccurrenceRef>> = IndexMap::new();
        let mut related_by_usr: IndexMap<String, Vec<SymbolOccurrenceRef>> = IndexMap::new();
        let mut by_file: IndexMap<String, Vec<SymbolOccurrenceRef>> = IndexMap::new();
        let mut occurrences = 0;

        for record in units.values().flat_map(|records| records.iter()) {
            let occurrence = Arc::new(occurrence_from_record(record, &symbols));
            occurrences += 1;

            by_usr
                .entry(record.usr.clone())
                .or_default()
                .push(occurrence.clone());
            by_file
                .entry(record.path.clone())
                .or_default()
                .push(occurrence.clone());

            let mut targets: IndexSet<&str> = IndexSet::new();
            for relation in &record.relations {
                if targets.insert(relation.usr.as_str()) {
                    related_by_usr
                        .entry(relation.usr.clone())
                        .or_default()
                        .push(occurrence.clone());
                }
            }
        }

        let mut names: IndexMap<String, IndexSet<String>> = IndexMap::new();
        let mut kinds: IndexMap<SymbolKind, IndexSet<String>> = IndexMap::new();
        for symbol in symbols.values() {
            if !symbol.name().is_empty() {
                names
                    .entry(symbol.name().to_string())
                    .or_default()
                    .insert(symbol.usr().to_string());
            }
            kinds
                .entry(symbol.kind())
                .or_default()
                .insert(symbol.usr().to_string());
        }

        let counts = StoreCounts {
            units: units.len(),
            symbols: symbols.len(),
            occurrences,
            files: by_file.len(),
        };

        Snapshot {
            symbols,
            by_usr,
            related_by_usr,
            by_file,
            names,
            kinds,
            counts,
        }
    }

    /// Looks up a symbol by USR.
    pub fn symbol(&self, usr: &str) -> Option<&SymbolRef> {
        self.symbols.get(usr)
    }

    pub fn counts(&self) -> StoreCounts {
        self.counts
    }
}

fn occurrence_from_record(
    record: &OccurrenceRecord,
    symbols: &IndexMap<String, SymbolRef>,
) -> SymbolOccurrence {
    let symbol = lookup_symbol(symbols, &record.usr, &record.name, record.kind);
    let relations = record
        .relations
        .iter()
        .map(|rel| {
            SymbolRelation::new(
                SymbolRoleSet::from_bits_retain(rel.roles),
                lookup_symbol(symbols, &rel.usr, &rel.name, rel.kind),
            )
        })
        .collect();
    SymbolOccurrence::new(
        symbol,
        SymbolRoleSet::from_bits_retain(record.roles),
        SymbolLocation::new(&record.path, record.line, record.column, record.is_system),
        relations,
    )
}

fn lookup_symbol(
    symbols: &IndexMap<String, SymbolRef>,
    usr: &str,
    name: &str,
    kind: SymbolKind,
) -> SymbolRef {
    match symbols.get(usr) {
        Some(symbol) => symbol.clone(),
        None => Arc::new(Symbol::new(usr, name, kind)),
    }
}

fn stream_occurrences(
    list: Option<&Vec<SymbolOccurrenceRef>>,
    receiver: &mut OccurrenceReceiver<'_>,
) -> bool {
    let Some(list) = list else {
        return true;
    };
    for occurrence in list {
        if !receiver(occurrence) {
            return false;
        }
    }
    true
}

fn stream_strings<'a>(
    items: impl IntoIterator<Item = &'a String>,
    receiver: &mut StrReceiver<'_>,
) -> bool {
    for item in items {
        if !receiver(item.as_str()) {
            return false;
        }
    }
    true
}

impl IndexReader for Snapshot {
    fn foreach_occurrence_by_usr(&self, usr: &str, receiver: &mut OccurrenceReceiver<'_>) -> bool {
        stream_occurrences(self.by_usr.get(usr), receiver)
    }

    fn foreach_related_occurrence_by_usr(
        &self,
        usr: &str,
        receiver: &mut OccurrenceReceiver<'_>,
    ) -> bool {
        stream_occurrences(self.related_by_usr.get(usr), receiver)
    }

    fn foreach_occurrence_in_file(
        &self,
        path: &str,
        receiver: &mut OccurrenceReceiver<'_>,
    ) -> bool {
        stream_occurrences(self.by_file.get(path), receiver)
    }

    fn foreach_symbol_name(&self, receiver: &mut StrReceiver<'_>) -> bool {
        stream_strings(self.names.keys(), receiver)
    }

    fn foreach_usr_by_name(&self, name: &str, receiver: &mut StrReceiver<'_>) -> bool {
        match self.names.get(name) {
            Some(usrs) => stream_strings(usrs, receiver),
            None => true,
        }
    }

    fn foreach_usr_of_kind(&self, kind: SymbolKind, receiver: &mut StrReceiver<'_>) -> bool {
        match self.kinds.get(&kind) {
            Some(usrs) => stream_strings(usrs, receiver),
            None => true,
        }
    }

    fn counts(&self) -> StoreCounts {
        self.counts
    }
}

/// Reader handed out by [`MemoryStore`]: a shared handle on one snapshot.
struct SnapshotReader(Arc<Snapshot>);

impl IndexReader for SnapshotReader {
    fn foreach_occurrence_by_usr(&self, usr: &str, receiver: &mut OccurrenceReceiver<'_>) -> bool {
        self.0.foreach_occurrence_by_usr(usr, receiver)
    }

    fn foreach_related_occurrence_by_usr(
        &self,
        usr: &str,
        receiver: &mut OccurrenceReceiver<'_>,
    ) -> bool {
        self.0.foreach_related_occurrence_by_usr(usr, receiver)
    }

    fn foreach_occurrence_in_file(
        &self,
        path: &str,
        receiver: &mut OccurrenceReceiver<'_>,
    ) -> bool {
        self.0.foreach_occurrence_in_file(path, receiver)
    }

    fn foreach_symbol_name(&self, receiver: &mut StrReceiver<'_>) -> bool {
        self.0.foreach_symbol_name(receiver)
    }

    fn foreach_usr_by_name(&self, name: &str, receiver: &mut StrReceiver<'_>) -> bool {
        self.0.foreach_usr_by_name(name, receiver)
    }

    fn foreach_usr_of_kind(&self, kind: SymbolKind, receiver: &mut StrReceiver<'_>) -> bool {
        self.0.foreach_usr_of_kind(kind, receiver)
    }

    fn counts(&self) -> StoreCounts {
        self.0.counts()
    }
}

/// Collaborator holding all data in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    units: Mutex<UnitTable>,
    current: RwLock<Arc<Snapshot>>,
    pending: Mutex<VecDeque<Unit>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a store holding `units`, applied in order.
    pub fn from_units(units: Vec<Unit>) -> Self {
        let store = Self::new();
        store.import_units(units);
        store
    }

    /// Applies one unit immediately, replacing any unit of the same name.
    pub fn import_unit(&self, unit: Unit) {
        self.import_units(vec![unit]);
    }

    pub fn import_units(&self, units: Vec<Unit>) {
        let mut table = self.units.lock();
        for unit in units {
            table.insert(unit.name, Arc::new(unit.records));
        }
        self.publish(&table);
    }

    /// Queues a unit. It becomes visible on the next
    /// [`IndexSystem::poll_for_unit_changes_and_wait`].
    pub fn submit_unit(&self, unit: Unit) {
        self.pending.lock().push_back(unit);
    }

    pub fn pending_units(&self) -> usize {
        self.pending.lock().len()
    }

    /// Drops a unit. Returns false if no unit had that name.
    pub fn remove_unit(&self, name: &str) -> bool {
        let mut table = self.units.lock();
        if table.shift_remove(name).is_none() {
            return false;
        }
        self.publish(&table);
        true
    }

    /// Replaces the whole content with `units`.
    pub fn replace_all(&self, units: Vec<Unit>) {
        let mut table = self.units.lock();
        table.clear();
        for unit in units {
            table.insert(unit.name, Arc::new(unit.records));
        }
        self.publish(&table);
    }

    /// The snapshot currently in service.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.current.read().clone()
    }

    fn publish(&self, table: &UnitTable) {
        let snapshot = Arc::new(Snapshot::build(table));
        log::debug!(
            "Published snapshot: {} units, {} symbols, {} occurrences",
            snapshot.counts.units,
            snapshot.counts.symbols,
            snapshot.counts.occurrences
        );
        *self.current.write() = snapshot;
    }
}

impl IndexSystem for MemoryStore {
    fn reader(&self) -> Box<dyn IndexReader> {
        Box::new(SnapshotReader(self.snapshot()))
    }

    fn poll_for_unit_changes_and_wait(&self) {
        let drained: Vec<Unit> = self.pending.lock().drain(..).collect();
        if drained.is_empty() {
            return;
        }
        log::debug!("Applying {} pending units", drained.len());
        self.import_units(drained);
    }
}
