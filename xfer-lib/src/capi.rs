//! C-ABI surface: opaque pointer-sized handles, enumerations as small
//! integers, one status return per operation. Errors never cross the ABI
//! as panics; every failure becomes a status value plus an entry in the
//! calling thread's error slot (see [`xfer_get_error_msg`]).

use std::ffi::{CStr, c_char, c_int, c_void};
use std::ptr;

use once_cell::sync::OnceCell;

use crate::api::{MemKind, MemToken, OpBatch, OpDesc, OpKind, ReqToken, TransferState};
use crate::error::XferLibError;
use crate::facade::Engine;
use crate::interface::PeerEngine;
use crate::last_error::{last_error_ptr, set_last_error};

pub type XferEngineHandle = *mut Engine;
pub type XferMemHandle = *mut c_void;
pub type XferRequestHandle = *mut c_void;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XferStatus {
    Success = 0,
    Error = 1,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XferMemKind {
    Device = 0,
    Host = 1,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XferOpKind {
    Read = 0,
    Write = 1,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct XferOpDesc {
    pub local_addr: usize,
    pub remote_addr: usize,
    pub len: usize,
}

/// Return values of [`xfer_check_transfer_status`].
pub const XFER_POLL_COMPLETED: c_int = 0;
pub const XFER_POLL_WAITING: c_int = 1;
pub const XFER_POLL_ERROR: c_int = -1;
pub const XFER_POLL_FAILED: c_int = -2;
pub const XFER_POLL_TIMEOUT: c_int = -3;

impl From<XferMemKind> for MemKind {
    fn from(kind: XferMemKind) -> Self {
        match kind {
            XferMemKind::Device => MemKind::Device,
            XferMemKind::Host => MemKind::Host,
        }
    }
}

impl From<XferOpKind> for OpKind {
    fn from(op: XferOpKind) -> Self {
        match op {
            XferOpKind::Read => OpKind::Read,
            XferOpKind::Write => OpKind::Write,
        }
    }
}

/// Constructor the embedder registers once; [`xfer_create`] draws every
/// backend instance from it.
pub type BackendFactory =
    Box<dyn Fn() -> std::result::Result<Box<dyn PeerEngine>, String> + Send + Sync>;

static BACKEND_FACTORY: OnceCell<BackendFactory> = OnceCell::new();

/// Install the process-wide backend constructor used by [`xfer_create`].
/// Only the first installation takes effect; returns whether this call
/// was the one that installed it.
pub fn install_backend_factory(factory: BackendFactory) -> bool {
    BACKEND_FACTORY.set(factory).is_ok()
}

fn null_handle() -> XferStatus {
    set_last_error(XferLibError::InvalidArgument("null engine handle"));
    XferStatus::Error
}

unsafe fn cstr_arg<'a>(ptr: *const c_char, what: &'static str) -> Option<&'a str> {
    if ptr.is_null() {
        set_last_error(XferLibError::InvalidArgument(what));
        return None;
    }
    match CStr::from_ptr(ptr).to_str() {
        Ok(s) => Some(s),
        Err(_) => {
            set_last_error(XferLibError::InvalidArgument("string is not valid UTF-8"));
            None
        }
    }
}

fn report(result: crate::error::Result<()>) -> XferStatus {
    match result {
        Ok(()) => XferStatus::Success,
        Err(err) => {
            set_last_error(&err);
            XferStatus::Error
        }
    }
}

/// Allocate a new, uninitialized engine handle. Returns null and records
/// the reason if no backend factory is installed or construction fails.
#[no_mangle]
pub extern "C" fn xfer_create() -> XferEngineHandle {
    let Some(factory) = BACKEND_FACTORY.get() else {
        set_last_error(XferLibError::ConstructBackend(
            "no backend factory installed".to_string(),
        ));
        return ptr::null_mut();
    };
    match factory() {
        Ok(backend) => Box::into_raw(Box::new(Engine::new(backend))),
        Err(reason) => {
            set_last_error(XferLibError::ConstructBackend(reason));
            ptr::null_mut()
        }
    }
}

/// Release the engine object. No-op on null.
///
/// # Safety
/// `handle` must be null or a pointer obtained from [`xfer_create`] that
/// has not been destroyed yet.
#[no_mangle]
pub unsafe extern "C" fn xfer_destroy(handle: XferEngineHandle) {
    if !handle.is_null() {
        drop(Box::from_raw(handle));
    }
}

/// # Safety
/// `handle` must be null or a live handle from [`xfer_create`];
/// `local_engine` must be null or a NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn xfer_initialize(
    handle: XferEngineHandle,
    local_engine: *const c_char,
) -> XferStatus {
    let Some(engine) = handle.as_ref() else {
        return null_handle();
    };
    let Some(local_engine) = cstr_arg(local_engine, "null local engine name") else {
        return XferStatus::Error;
    };
    report(engine.initialize(local_engine))
}

/// Best-effort teardown. No-op on null, never fails.
///
/// # Safety
/// `handle` must be null or a live handle from [`xfer_create`].
#[no_mangle]
pub unsafe extern "C" fn xfer_finalize(handle: XferEngineHandle) {
    if let Some(engine) = handle.as_ref() {
        engine.finalize();
    }
}

/// # Safety
/// `handle` must be null or a live handle; `out_handle` must be null or
/// writable. `(addr, len)` must describe memory valid for `kind` for the
/// registration's whole lifetime.
#[no_mangle]
pub unsafe extern "C" fn xfer_register_mem(
    handle: XferEngineHandle,
    addr: usize,
    len: usize,
    kind: XferMemKind,
    out_handle: *mut XferMemHandle,
) -> XferStatus {
    let Some(engine) = handle.as_ref() else {
        return null_handle();
    };
    if out_handle.is_null() {
        set_last_error(XferLibError::InvalidArgument("null registration out-param"));
        return XferStatus::Error;
    }
    match engine.register_mem(addr, len, kind.into()) {
        Ok(token) => {
            *out_handle = token.0 as XferMemHandle;
            XferStatus::Success
        }
        Err(err) => {
            set_last_error(&err);
            XferStatus::Error
        }
    }
}

/// # Safety
/// `handle` must be null or a live handle; `mem_handle` must have come
/// from [`xfer_register_mem`] on the same handle.
#[no_mangle]
pub unsafe extern "C" fn xfer_deregister_mem(
    handle: XferEngineHandle,
    mem_handle: XferMemHandle,
) -> XferStatus {
    let Some(engine) = handle.as_ref() else {
        return null_handle();
    };
    report(engine.deregister_mem(MemToken(mem_handle as usize)))
}

/// # Safety
/// `handle` must be null or a live handle; `remote_engine` must be null or
/// a NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn xfer_connect(
    handle: XferEngineHandle,
    remote_engine: *const c_char,
    timeout_ms: i32,
) -> XferStatus {
    let Some(engine) = handle.as_ref() else {
        return null_handle();
    };
    let Some(remote_engine) = cstr_arg(remote_engine, "null remote engine name") else {
        return XferStatus::Error;
    };
    report(engine.connect(remote_engine, timeout_ms))
}

/// # Safety
/// Same contract as [`xfer_connect`].
#[no_mangle]
pub unsafe extern "C" fn xfer_disconnect(
    handle: XferEngineHandle,
    remote_engine: *const c_char,
    timeout_ms: i32,
) -> XferStatus {
    let Some(engine) = handle.as_ref() else {
        return null_handle();
    };
    let Some(remote_engine) = cstr_arg(remote_engine, "null remote engine name") else {
        return XferStatus::Error;
    };
    report(engine.disconnect(remote_engine, timeout_ms))
}

/// Submit one asynchronous batch. Returns as soon as the backend accepts
/// it; poll the request handle with [`xfer_check_transfer_status`].
///
/// # Safety
/// `handle` must be null or a live handle; `descriptors` must be null or
/// point to `desc_count` readable entries; `out_req` must be null or
/// writable; `remote_engine` must be null or a NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn xfer_transfer_async(
    handle: XferEngineHandle,
    remote_engine: *const c_char,
    op: XferOpKind,
    descriptors: *const XferOpDesc,
    desc_count: usize,
    out_req: *mut XferRequestHandle,
) -> XferStatus {
    let Some(engine) = handle.as_ref() else {
        return null_handle();
    };
    let Some(remote_engine) = cstr_arg(remote_engine, "null remote engine name") else {
        return XferStatus::Error;
    };
    if descriptors.is_null() || out_req.is_null() {
        set_last_error(XferLibError::InvalidArgument("null transfer pointer"));
        return XferStatus::Error;
    }
    if desc_count == 0 {
        set_last_error(XferLibError::InvalidArgument("empty descriptor batch"));
        return XferStatus::Error;
    }
    let descs: OpBatch = std::slice::from_raw_parts(descriptors, desc_count)
        .iter()
        .map(|d| OpDesc {
            local_addr: d.local_addr,
            remote_addr: d.remote_addr,
            len: d.len,
        })
        .collect();
    match engine.transfer_async(remote_engine, op.into(), &descs) {
        Ok(token) => {
            *out_req = token.0 as XferRequestHandle;
            XferStatus::Success
        }
        Err(err) => {
            set_last_error(&err);
            XferStatus::Error
        }
    }
}

/// Non-blocking status query. Returns [`XFER_POLL_COMPLETED`],
/// [`XFER_POLL_WAITING`], [`XFER_POLL_FAILED`], [`XFER_POLL_TIMEOUT`], or
/// [`XFER_POLL_ERROR`] when the query itself fails.
///
/// # Safety
/// `handle` must be null or a live handle; `req` must have come from
/// [`xfer_transfer_async`] on the same handle.
#[no_mangle]
pub unsafe extern "C" fn xfer_check_transfer_status(
    handle: XferEngineHandle,
    req: XferRequestHandle,
) -> c_int {
    let Some(engine) = handle.as_ref() else {
        set_last_error(XferLibError::InvalidArgument("null engine handle"));
        return XFER_POLL_ERROR;
    };
    match engine.check_transfer(ReqToken(req as usize)) {
        Ok(TransferState::Completed) => XFER_POLL_COMPLETED,
        Ok(TransferState::Waiting) => XFER_POLL_WAITING,
        Ok(TransferState::Failed) => XFER_POLL_FAILED,
        Ok(TransferState::Timeout) => XFER_POLL_TIMEOUT,
        Err(err) => {
            set_last_error(&err);
            XFER_POLL_ERROR
        }
    }
}

/// Last error produced by a failing call on the current thread. The
/// pointer stays valid until the next failing call on this thread.
#[no_mangle]
pub extern "C" fn xfer_get_error_msg() -> *const c_char {
    last_error_ptr()
}
