//! C ABI for the index.
//!
//! Ownership rules, mirrored in `include/symdb.h`:
//!
//! - Every `symdb_object_t` returned by a function or handed to a receiver
//!   carries one reference owned by the caller, who must `symdb_release` it.
//! - Locations and relations are borrowed from their occurrence and must
//!   not be used after the occurrence is released. They cannot be retained.
//! - Strings returned by accessors live as long as the object they came
//!   from. Strings passed to name receivers are valid during the call only.
//! - Using a handle after its last release is undefined behavior.
//!
//! Lookups with null arguments produce an empty stream and return `true`.

pub mod error;
pub mod handle;

use self::handle::{
    as_index, as_library, as_occurrence, as_symbol, make_object, make_occurrence, make_symbol,
    to_cstring, LocationView, Object, RelationView,
};
use crate::error::{IndexError, Result};
use crate::index::{Index, IndexOptions};
use crate::matcher::NamePattern;
use crate::roles::SymbolRoleSet;
use crate::store::{load_store_library, LibraryProvider, StoreLibraryRef};
use crate::symbol::{SymbolKind, SymbolOccurrenceRef};
use std::ffi::{c_char, c_void, CStr};
use std::path::Path;
use std::ptr;

pub type SymdbObject = *mut c_void;
pub type SymdbError = *mut c_void;

/// Maps a store path to a borrowed library handle, or null.
pub type SymdbLibraryProvider =
    Option<unsafe extern "C" fn(context: *mut c_void, store_path: *const c_char) -> SymdbObject>;

/// Receives a +1 occurrence handle. Returns false to stop.
pub type SymdbOccurrenceReceiver =
    Option<unsafe extern "C" fn(context: *mut c_void, occurrence: SymdbObject) -> bool>;

/// Receives a name valid for the duration of the call. Returns false to stop.
pub type SymdbNameReceiver =
    Option<unsafe extern "C" fn(context: *mut c_void, name: *const c_char) -> bool>;

/// Receives a borrowed relation. Returns false to stop.
pub type SymdbRelationApplier =
    Option<unsafe extern "C" fn(context: *mut c_void, relation: *const c_void) -> bool>;

const EMPTY: &[u8; 1] = b"\0";

fn empty_str() -> *const c_char {
    EMPTY.as_ptr() as *const c_char
}

unsafe fn str_arg<'a>(ptr: *const c_char) -> Option<&'a str> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok()
}

unsafe fn path_arg<'a>(ptr: *const c_char, what: &str) -> Result<&'a str> {
    if ptr.is_null() {
        return Err(IndexError::InvalidArgument {
            reason: format!("{} is null", what),
        });
    }
    CStr::from_ptr(ptr)
        .to_str()
        .map_err(|_| IndexError::InvalidArgument {
            reason: format!("{} is not valid UTF-8", what),
        })
}

struct CallbackProvider {
    callback: unsafe extern "C" fn(*mut c_void, *const c_char) -> SymdbObject,
    context: *mut c_void,
}

impl LibraryProvider for CallbackProvider {
    fn library_for_store_path(&self, store_path: &str) -> Option<StoreLibraryRef> {
        let path = to_cstring(store_path);
        // The callback hands back a borrowed handle; keep our own clone.
        unsafe {
            let handle = (self.callback)(self.context, path.as_ptr());
            as_library(handle).cloned()
        }
    }
}

struct BuiltinProvider;

impl LibraryProvider for BuiltinProvider {
    fn library_for_store_path(&self, store_path: &str) -> Option<StoreLibraryRef> {
        match load_store_library(Path::new(store_path)) {
            Ok(library) => Some(library),
            Err(e) => {
                log::debug!("No built-in library for {}: {}", store_path, e);
                None
            }
        }
    }
}

/// Streams occurrences to a C receiver, each as a fresh +1 handle.
fn forward_occurrences(
    receiver: unsafe extern "C" fn(*mut c_void, SymdbObject) -> bool,
    context: *mut c_void,
) -> impl FnMut(&SymbolOccurrenceRef) -> bool {
    move |occ| unsafe { receiver(context, make_occurrence(occ.clone())) }
}

/// Opens an index. Returns null and fills `error` on failure.
///
/// A null `provider` selects the built-in library by store format.
///
/// # Safety
/// Paths must be null or NUL-terminated strings; `error` must be null or
/// writable; `provider` and `provider_context` must stay valid for the
/// duration of the call.
#[no_mangle]
pub unsafe extern "C" fn symdb_index_create(
    store_path: *const c_char,
    database_path: *const c_char,
    provider: SymdbLibraryProvider,
    provider_context: *mut c_void,
    readonly: bool,
    listen_for_updates: bool,
    error: *mut SymdbError,
) -> SymdbObject {
    let opened = (|| -> Result<Index> {
        let store = path_arg(store_path, "store path")?;
        let database = path_arg(database_path, "database path")?;
        let options = IndexOptions::default()
            .readonly(readonly)
            .listen_for_updates(listen_for_updates);
        match provider {
            Some(callback) => {
                let provider = CallbackProvider {
                    callback,
                    context: provider_context,
                };
                Index::open(store, database, &provider, options)
            }
            None => Index::open(store, database, &BuiltinProvider, options),
        }
    })();
    match opened {
        Ok(index) => make_object(Object::Index(index)),
        Err(e) => {
            error::report(error, &e);
            ptr::null_mut()
        }
    }
}

/// Resolves the built-in library able to read the store at `path`.
///
/// # Safety
/// `path` must be null or a NUL-terminated string; `error` must be null or
/// writable.
#[no_mangle]
pub unsafe extern "C" fn symdb_load_store_library(
    path: *const c_char,
    error: *mut SymdbError,
) -> SymdbObject {
    let loaded = path_arg(path, "store path").and_then(|p| load_store_library(Path::new(p)));
    match loaded {
        Ok(library) => make_object(Object::Library(library)),
        Err(e) => {
            error::report(error, &e);
            ptr::null_mut()
        }
    }
}

/// # Safety
/// `index` must be null or a live index handle.
#[no_mangle]
pub unsafe extern "C" fn symdb_index_poll_for_unit_changes_and_wait(index: SymdbObject) {
    if let Some(index) = as_index(index) {
        index.poll_for_unit_changes_and_wait();
    }
}

/// # Safety
/// `index` must be null or a live index handle; `usr` null or a
/// NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn symdb_index_symbol_occurrences_by_usr(
    index: SymdbObject,
    usr: *const c_char,
    roles: u64,
    receiver: SymdbOccurrenceReceiver,
    context: *mut c_void,
) -> bool {
    let (Some(index), Some(usr), Some(receiver)) = (as_index(index), str_arg(usr), receiver) else {
        return true;
    };
    index.foreach_symbol_occurrence_by_usr(
        usr,
        SymbolRoleSet::from_bits_retain(roles),
        forward_occurrences(receiver, context),
    )
}

/// # Safety
/// See [`symdb_index_symbol_occurrences_by_usr`].
#[no_mangle]
pub unsafe extern "C" fn symdb_index_related_symbol_occurrences_by_usr(
    index: SymdbObject,
    usr: *const c_char,
    roles: u64,
    receiver: SymdbOccurrenceReceiver,
    context: *mut c_void,
) -> bool {
    let (Some(index), Some(usr), Some(receiver)) = (as_index(index), str_arg(usr), receiver) else {
        return true;
    };
    index.foreach_related_symbol_occurrence_by_usr(
        usr,
        SymbolRoleSet::from_bits_retain(roles),
        forward_occurrences(receiver, context),
    )
}

/// # Safety
/// `index` must be null or a live index handle; `path` null or a
/// NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn symdb_index_symbol_occurrences_at_location(
    index: SymdbObject,
    path: *const c_char,
    line: u32,
    utf8_column: u32,
    roles: u64,
    receiver: SymdbOccurrenceReceiver,
    context: *mut c_void,
) -> bool {
    let (Some(index), Some(path), Some(receiver)) = (as_index(index), str_arg(path), receiver)
    else {
        return true;
    };
    index.foreach_symbol_occurrence_at_location(
        path,
        line,
        utf8_column,
        SymbolRoleSet::from_bits_retain(roles),
        forward_occurrences(receiver, context),
    )
}

/// # Safety
/// `index` must be null or a live index handle.
#[no_mangle]
pub unsafe extern "C" fn symdb_index_symbol_names(
    index: SymdbObject,
    receiver: SymdbNameReceiver,
    context: *mut c_void,
) -> bool {
    let (Some(index), Some(receiver)) = (as_index(index), receiver) else {
        return true;
    };
    index.foreach_symbol_name(|name| {
        let name = to_cstring(name);
        receiver(context, name.as_ptr())
    })
}

/// # Safety
/// `index` must be null or a live index handle; `name` null or a
/// NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn symdb_index_canonical_symbol_occurrences_by_name(
    index: SymdbObject,
    name: *const c_char,
    receiver: SymdbOccurrenceReceiver,
    context: *mut c_void,
) -> bool {
    let (Some(index), Some(name), Some(receiver)) = (as_index(index), str_arg(name), receiver)
    else {
        return true;
    };
    index.foreach_canonical_symbol_occurrence_by_name(name, forward_occurrences(receiver, context))
}

/// # Safety
/// `index` must be null or a live index handle; `pattern` null or a
/// NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn symdb_index_canonical_symbol_occurrences_containing_pattern(
    index: SymdbObject,
    pattern: *const c_char,
    anchor_start: bool,
    anchor_end: bool,
    subsequence: bool,
    ignore_case: bool,
    receiver: SymdbOccurrenceReceiver,
    context: *mut c_void,
) -> bool {
    let (Some(index), Some(pattern), Some(receiver)) =
        (as_index(index), str_arg(pattern), receiver)
    else {
        return true;
    };
    let pattern =
        NamePattern::with_options(pattern, anchor_start, anchor_end, subsequence, ignore_case);
    index.foreach_canonical_symbol_occurrence_containing_pattern(
        &pattern,
        forward_occurrences(receiver, context),
    )
}

/// # Safety
/// See [`symdb_index_symbol_occurrences_by_usr`].
#[no_mangle]
pub unsafe extern "C" fn symdb_index_canonical_symbol_occurrences_by_usr(
    index: SymdbObject,
    usr: *const c_char,
    receiver: SymdbOccurrenceReceiver,
    context: *mut c_void,
) -> bool {
    let (Some(index), Some(usr), Some(receiver)) = (as_index(index), str_arg(usr), receiver) else {
        return true;
    };
    index.foreach_canonical_symbol_occurrence_by_usr(usr, forward_occurrences(receiver, context))
}

/// # Safety
/// `index` must be null or a live index handle.
#[no_mangle]
pub unsafe extern "C" fn symdb_index_canonical_symbol_occurrences_by_kind(
    index: SymdbObject,
    kind: u32,
    workspace_only: bool,
    receiver: SymdbOccurrenceReceiver,
    context: *mut c_void,
) -> bool {
    let (Some(index), Some(receiver)) = (as_index(index), receiver) else {
        return true;
    };
    index.foreach_canonical_symbol_occurrence_by_kind(
        SymbolKind::from_raw(kind),
        workspace_only,
        forward_occurrences(receiver, context),
    )
}

/// # Safety
/// `index` must be null or a live index handle.
#[no_mangle]
pub unsafe extern "C" fn symdb_index_count_of_canonical_symbols_with_kind(
    index: SymdbObject,
    kind: u32,
    workspace_only: bool,
) -> u64 {
    match as_index(index) {
        Some(index) => {
            index.count_of_canonical_symbols_with_kind(SymbolKind::from_raw(kind), workspace_only)
                as u64
        }
        None => 0,
    }
}

/// # Safety
/// `symbol` must be null or a live symbol handle.
#[no_mangle]
pub unsafe extern "C" fn symdb_symbol_usr(symbol: SymdbObject) -> *const c_char {
    as_symbol(symbol).map_or_else(empty_str, |s| s.usr.as_ptr())
}

/// # Safety
/// `symbol` must be null or a live symbol handle.
#[no_mangle]
pub unsafe extern "C" fn symdb_symbol_name(symbol: SymdbObject) -> *const c_char {
    as_symbol(symbol).map_or_else(empty_str, |s| s.name.as_ptr())
}

/// # Safety
/// `symbol` must be null or a live symbol handle.
#[no_mangle]
pub unsafe extern "C" fn symdb_symbol_kind(symbol: SymdbObject) -> u32 {
    as_symbol(symbol).map_or(SymbolKind::Unknown.as_raw(), |s| s.symbol.kind().as_raw())
}

/// Returns a +1 symbol handle.
///
/// # Safety
/// `occurrence` must be null or a live occurrence handle.
#[no_mangle]
pub unsafe extern "C" fn symdb_symbol_occurrence_symbol(occurrence: SymdbObject) -> SymdbObject {
    match as_occurrence(occurrence) {
        Some(occ) => make_symbol(occ.occurrence.symbol().clone()),
        None => ptr::null_mut(),
    }
}

/// # Safety
/// `occurrence` must be null or a live occurrence handle.
#[no_mangle]
pub unsafe extern "C" fn symdb_symbol_occurrence_roles(occurrence: SymdbObject) -> u64 {
    as_occurrence(occurrence).map_or(0, |occ| occ.occurrence.roles().bits())
}

/// Returns a location borrowed from `occurrence`.
///
/// # Safety
/// `occurrence` must be null or a live occurrence handle.
#[no_mangle]
pub unsafe extern "C" fn symdb_symbol_occurrence_location(
    occurrence: SymdbObject,
) -> *const c_void {
    match as_occurrence(occurrence) {
        Some(occ) => &occ.location as *const LocationView as *const c_void,
        None => ptr::null(),
    }
}

/// Streams the relations of `occurrence` as borrowed handles.
///
/// # Safety
/// `occurrence` must be null or a live occurrence handle.
#[no_mangle]
pub unsafe extern "C" fn symdb_symbol_occurrence_relations(
    occurrence: SymdbObject,
    applier: SymdbRelationApplier,
    context: *mut c_void,
) -> bool {
    let (Some(occ), Some(applier)) = (as_occurrence(occurrence), applier) else {
        return true;
    };
    for relation in &occ.relations {
        if !applier(context, relation as *const RelationView as *const c_void) {
            return false;
        }
    }
    true
}

unsafe fn location<'a>(handle: *const c_void) -> Option<&'a LocationView> {
    (handle as *const LocationView).as_ref()
}

unsafe fn relation<'a>(handle: *const c_void) -> Option<&'a RelationView> {
    (handle as *const RelationView).as_ref()
}

/// # Safety
/// `loc` must be null or a location borrowed from a live occurrence.
#[no_mangle]
pub unsafe extern "C" fn symdb_symbol_location_path(loc: *const c_void) -> *const c_char {
    location(loc).map_or_else(empty_str, |l| l.path.as_ptr())
}

/// # Safety
/// See [`symdb_symbol_location_path`].
#[no_mangle]
pub unsafe extern "C" fn symdb_symbol_location_is_system(loc: *const c_void) -> bool {
    location(loc).map_or(false, |l| l.is_system)
}

/// # Safety
/// See [`symdb_symbol_location_path`].
#[no_mangle]
pub unsafe extern "C" fn symdb_symbol_location_line(loc: *const c_void) -> u32 {
    location(loc).map_or(0, |l| l.line)
}

/// # Safety
/// See [`symdb_symbol_location_path`].
#[no_mangle]
pub unsafe extern "C" fn symdb_symbol_location_column_utf8(loc: *const c_void) -> u32 {
    location(loc).map_or(0, |l| l.column)
}

/// # Safety
/// `rel` must be null or a relation borrowed from a live occurrence.
#[no_mangle]
pub unsafe extern "C" fn symdb_symbol_relation_get_roles(rel: *const c_void) -> u64 {
    relation(rel).map_or(0, |r| r.roles.bits())
}

/// Returns a +1 symbol handle.
///
/// # Safety
/// See [`symdb_symbol_relation_get_roles`].
#[no_mangle]
pub unsafe extern "C" fn symdb_symbol_relation_get_symbol(rel: *const c_void) -> SymdbObject {
    match relation(rel) {
        Some(r) => make_symbol(r.symbol.clone()),
        None => ptr::null_mut(),
    }
}

/// # Safety
/// `object` must be null or a live handle.
#[no_mangle]
pub unsafe extern "C" fn symdb_retain(object: SymdbObject) -> SymdbObject {
    handle::retain(object)
}

/// # Safety
/// `object` must be null or a live handle; the caller gives up one reference.
#[no_mangle]
pub unsafe extern "C" fn symdb_release(object: SymdbObject) {
    handle::release(object)
}

/// # Safety
/// `err` must be null or an undisposed error.
#[no_mangle]
pub unsafe extern "C" fn symdb_error_get_description(err: SymdbError) -> *const c_char {
    error::borrow(err).map_or_else(empty_str, |e| e.message().as_ptr())
}

/// Stable error code such as `SYM-E001`.
///
/// # Safety
/// `err` must be null or an undisposed error.
#[no_mangle]
pub unsafe extern "C" fn symdb_error_get_code(err: SymdbError) -> *const c_char {
    error::borrow(err).map_or_else(empty_str, |e| e.code().as_ptr())
}

/// # Safety
/// `err` must be null or an undisposed error.
#[no_mangle]
pub unsafe extern "C" fn symdb_error_dispose(err: SymdbError) {
    error::dispose(err)
}
