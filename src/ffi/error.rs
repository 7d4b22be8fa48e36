//! Error objects handed across the C boundary.
//!
//! Errors are plain boxes, not reference counted: the caller owns the one
//! it receives and frees it with `symdb_error_dispose`.

use super::handle::to_cstring;
use crate::error::IndexError;
use std::ffi::{c_void, CString};

pub struct ErrorObject {
    code: CString,
    message: CString,
}

impl ErrorObject {
    pub(crate) fn from_error(err: &IndexError) -> Self {
        Self {
            code: to_cstring(err.error_code()),
            message: to_cstring(&err.to_string()),
        }
    }

    pub(crate) fn code(&self) -> &CString {
        &self.code
    }

    pub(crate) fn message(&self) -> &CString {
        &self.message
    }
}

/// Stores `err` into `out` when the caller asked for it.
///
/// # Safety
/// `out` must be null or valid for a pointer write.
pub(crate) unsafe fn report(out: *mut *mut c_void, err: &IndexError) {
    log::debug!("{} [{}]", err, err.error_code());
    if out.is_null() {
        return;
    }
    *out = Box::into_raw(Box::new(ErrorObject::from_error(err))) as *mut c_void;
}

/// # Safety
/// `handle` must be null or an error produced by [`report`].
pub(crate) unsafe fn borrow<'a>(handle: *const c_void) -> Option<&'a ErrorObject> {
    (handle as *const ErrorObject).as_ref()
}

/// # Safety
/// `handle` must be null or an error produced by [`report`] that has not
/// been disposed.
pub(crate) unsafe fn dispose(handle: *mut c_void) {
    if !handle.is_null() {
        drop(Box::from_raw(handle as *mut ErrorObject));
    }
}
