//! Reference-counted objects behind the opaque C handles.
//!
//! A handle is the raw pointer of an `Arc<Object>`. Retain and release map
//! straight onto the strong count; the object is dropped when it reaches
//! zero. Location and relation handles are not `Object`s: they point into
//! the [`OccurrenceObject`] that owns them.

use crate::index::Index;
use crate::roles::SymbolRoleSet;
use crate::store::StoreLibraryRef;
use crate::symbol::{SymbolOccurrenceRef, SymbolRef};
use std::ffi::{c_void, CString};
use std::sync::Arc;

pub enum Object {
    Index(Index),
    Library(StoreLibraryRef),
    Symbol(SymbolObject),
    Occurrence(OccurrenceObject),
}

pub struct SymbolObject {
    pub(crate) symbol: SymbolRef,
    pub(crate) usr: CString,
    pub(crate) name: CString,
}

impl SymbolObject {
    pub(crate) fn new(symbol: SymbolRef) -> Self {
        Self {
            usr: to_cstring(symbol.usr()),
            name: to_cstring(symbol.name()),
            symbol,
        }
    }
}

pub struct LocationView {
    pub(crate) path: CString,
    pub(crate) line: u32,
    pub(crate) column: u32,
    pub(crate) is_system: bool,
}

pub struct RelationView {
    pub(crate) roles: SymbolRoleSet,
    pub(crate) symbol: SymbolRef,
}

pub struct OccurrenceObject {
    pub(crate) occurrence: SymbolOccurrenceRef,
    pub(crate) location: LocationView,
    pub(crate) relations: Vec<RelationView>,
}

impl OccurrenceObject {
    pub(crate) fn new(occurrence: SymbolOccurrenceRef) -> Self {
        let loc = occurrence.location();
        let location = LocationView {
            path: to_cstring(loc.path()),
            line: loc.line(),
            column: loc.column_utf8(),
            is_system: loc.is_system(),
        };
        let relations = occurrence
            .relations()
            .iter()
            .map(|rel| RelationView {
                roles: rel.roles(),
                symbol: rel.symbol().clone(),
            })
            .collect();
        Self {
            occurrence,
            location,
            relations,
        }
    }
}

/// Converts to a C string, cutting at the first interior NUL.
pub(crate) fn to_cstring(s: &str) -> CString {
    let head = s.split('\0').next().unwrap_or_default();
    CString::new(head).unwrap_or_default()
}

/// Wraps `object` in a new handle with a count of one, owned by the caller.
pub(crate) fn make_object(object: Object) -> *mut c_void {
    Arc::into_raw(Arc::new(object)) as *mut c_void
}

pub(crate) fn make_symbol(symbol: SymbolRef) -> *mut c_void {
    make_object(Object::Symbol(SymbolObject::new(symbol)))
}

pub(crate) fn make_occurrence(occurrence: SymbolOccurrenceRef) -> *mut c_void {
    make_object(Object::Occurrence(OccurrenceObject::new(occurrence)))
}

/// # Safety
/// `handle` must be null or a live handle from [`make_object`].
pub(crate) unsafe fn object<'a>(handle: *const c_void) -> Option<&'a Object> {
    (handle as *const Object).as_ref()
}

/// # Safety
/// See [`object`].
pub(crate) unsafe fn as_index<'a>(handle: *const c_void) -> Option<&'a Index> {
    match object(handle) {
        Some(Object::Index(index)) => Some(index),
        _ => None,
    }
}

/// # Safety
/// See [`object`].
pub(crate) unsafe fn as_library<'a>(handle: *const c_void) -> Option<&'a StoreLibraryRef> {
    match object(handle) {
        Some(Object::Library(library)) => Some(library),
        _ => None,
    }
}

/// # Safety
/// See [`object`].
pub(crate) unsafe fn as_symbol<'a>(handle: *const c_void) -> Option<&'a SymbolObject> {
    match object(handle) {
        Some(Object::Symbol(symbol)) => Some(symbol),
        _ => None,
    }
}

/// # Safety
/// See [`object`].
pub(crate) unsafe fn as_occurrence<'a>(handle: *const c_void) -> Option<&'a OccurrenceObject> {
    match object(handle) {
        Some(Object::Occurrence(occurrence)) => Some(occurrence),
        _ => None,
    }
}

/// # Safety
/// `handle` must be null or a live handle from [`make_object`].
pub(crate) unsafe fn retain(handle: *mut c_void) -> *mut c_void {
    if !handle.is_null() {
        Arc::increment_strong_count(handle as *const Object);
    }
    handle
}

/// # Safety
/// `handle` must be null or a live handle from [`make_object`]; the caller
/// gives up one reference.
pub(crate) unsafe fn release(handle: *mut c_void) {
    if !handle.is_null() {
        Arc::decrement_strong_count(handle as *const Object);
    }
}
