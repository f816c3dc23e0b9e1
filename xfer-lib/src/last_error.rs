use std::cell::RefCell;
use std::ffi::{CString, c_char};
use std::fmt;

thread_local! {
    static LAST_ERROR: RefCell<CString> = RefCell::new(CString::default());
}

/// Overwrite the calling thread's last-error slot. Each thread only ever
/// sees errors produced by its own calls.
pub(crate) fn set_last_error(msg: impl fmt::Display) {
    let rendered = CString::new(msg.to_string()).unwrap_or_default();
    LAST_ERROR.with(|slot| *slot.borrow_mut() = rendered);
}

/// Pointer handed across the ABI. Stays valid until the next failing call
/// on this thread replaces the slot.
pub(crate) fn last_error_ptr() -> *const c_char {
    LAST_ERROR.with(|slot| slot.borrow().as_ptr())
}
