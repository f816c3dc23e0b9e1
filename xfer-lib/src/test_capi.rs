use std::ffi::{CStr, CString};
use std::ptr;

use crate::capi::{
    install_backend_factory, xfer_check_transfer_status, xfer_connect, xfer_create,
    xfer_deregister_mem, xfer_destroy, xfer_disconnect, xfer_finalize, xfer_get_error_msg,
    xfer_initialize, xfer_register_mem, xfer_transfer_async, XferEngineHandle, XferMemHandle,
    XferMemKind, XferOpDesc, XferOpKind, XferRequestHandle, XferStatus, XFER_POLL_COMPLETED,
    XFER_POLL_ERROR, XFER_POLL_WAITING,
};
use crate::interface::PeerEngine;
use crate::loopback::LoopbackEngine;

fn last_msg() -> String {
    unsafe { CStr::from_ptr(xfer_get_error_msg()).to_string_lossy().into_owned() }
}

fn create_engine() -> XferEngineHandle {
    let _ = install_backend_factory(Box::new(|| {
        Ok(Box::new(LoopbackEngine::new()) as Box<dyn PeerEngine>)
    }));
    let handle = xfer_create();
    assert!(!handle.is_null());
    handle
}

fn initialized_engine(local: &str) -> XferEngineHandle {
    let handle = create_engine();
    let name = CString::new(local).unwrap();
    assert_eq!(unsafe { xfer_initialize(handle, name.as_ptr()) }, XferStatus::Success);
    handle
}

#[test]
fn full_lifecycle_scenario() {
    let handle = initialized_engine("local-a");
    let remote = CString::new("remote-b").unwrap();

    let src = vec![0xcdu8; 4096];
    let mut dst = vec![0u8; 4096];
    let dst_addr = dst.as_mut_ptr() as usize;
    let mut src_mem: XferMemHandle = ptr::null_mut();
    let mut dst_mem: XferMemHandle = ptr::null_mut();
    unsafe {
        assert_eq!(
            xfer_register_mem(handle, src.as_ptr() as usize, 4096, XferMemKind::Host, &mut src_mem),
            XferStatus::Success
        );
        assert_eq!(
            xfer_register_mem(handle, dst_addr, 4096, XferMemKind::Host, &mut dst_mem),
            XferStatus::Success
        );
    }
    assert!(!src_mem.is_null());
    assert!(!dst_mem.is_null());

    assert_eq!(unsafe { xfer_connect(handle, remote.as_ptr(), 5000) }, XferStatus::Success);

    let descs = [XferOpDesc {
        local_addr: src.as_ptr() as usize,
        remote_addr: dst_addr,
        len: 4096,
    }];
    let mut req: XferRequestHandle = ptr::null_mut();
    assert_eq!(
        unsafe {
            xfer_transfer_async(
                handle,
                remote.as_ptr(),
                XferOpKind::Write,
                descs.as_ptr(),
                descs.len(),
                &mut req,
            )
        },
        XferStatus::Success
    );
    assert!(!req.is_null());

    let mut status = XFER_POLL_WAITING;
    for _ in 0..100 {
        status = unsafe { xfer_check_transfer_status(handle, req) };
        if status != XFER_POLL_WAITING {
            break;
        }
    }
    assert_eq!(status, XFER_POLL_COMPLETED);
    assert!(dst.iter().all(|&b| b == 0xcd));

    unsafe {
        assert_eq!(xfer_deregister_mem(handle, src_mem), XferStatus::Success);
        assert_eq!(xfer_deregister_mem(handle, dst_mem), XferStatus::Success);
        assert_eq!(xfer_disconnect(handle, remote.as_ptr(), 5000), XferStatus::Success);
        xfer_finalize(handle);
        xfer_destroy(handle);
    }
}

#[test]
fn connect_twice_and_disconnect_unknown_both_succeed() {
    let handle = initialized_engine("local-a");
    let remote = CString::new("remote-b").unwrap();
    let unknown = CString::new("never-connected").unwrap();
    unsafe {
        assert_eq!(xfer_connect(handle, remote.as_ptr(), 5000), XferStatus::Success);
        assert_eq!(xfer_connect(handle, remote.as_ptr(), 5000), XferStatus::Success);
        assert_eq!(xfer_disconnect(handle, unknown.as_ptr(), 5000), XferStatus::Success);
        xfer_destroy(handle);
    }
}

#[test]
fn initialize_with_null_name_leaves_handle_unusable() {
    let handle = create_engine();
    assert_eq!(unsafe { xfer_initialize(handle, ptr::null()) }, XferStatus::Error);
    assert!(!last_msg().is_empty());

    // The handle was not promoted to ACTIVE.
    let mut mem: XferMemHandle = ptr::null_mut();
    assert_eq!(
        unsafe { xfer_register_mem(handle, 0x1000, 4096, XferMemKind::Device, &mut mem) },
        XferStatus::Error
    );
    assert!(mem.is_null());
    unsafe { xfer_destroy(handle) };
}

#[test]
fn null_handle_is_rejected_everywhere() {
    let name = CString::new("x").unwrap();
    unsafe {
        assert_eq!(xfer_initialize(ptr::null_mut(), name.as_ptr()), XferStatus::Error);
        assert!(!last_msg().is_empty());
        assert_eq!(xfer_connect(ptr::null_mut(), name.as_ptr(), 100), XferStatus::Error);
        assert_eq!(xfer_disconnect(ptr::null_mut(), name.as_ptr(), 100), XferStatus::Error);
        let mut mem: XferMemHandle = ptr::null_mut();
        assert_eq!(
            xfer_register_mem(ptr::null_mut(), 0x1000, 1, XferMemKind::Host, &mut mem),
            XferStatus::Error
        );
        assert_eq!(xfer_deregister_mem(ptr::null_mut(), ptr::null_mut()), XferStatus::Error);
        assert_eq!(
            xfer_check_transfer_status(ptr::null_mut(), ptr::null_mut()),
            XFER_POLL_ERROR
        );
        // Teardown entry points are no-ops on null.
        xfer_finalize(ptr::null_mut());
        xfer_destroy(ptr::null_mut());
    }
}

#[test]
fn transfer_rejects_empty_or_null_batches() {
    let handle = initialized_engine("local-a");
    let remote = CString::new("remote-b").unwrap();
    unsafe {
        assert_eq!(xfer_connect(handle, remote.as_ptr(), 5000), XferStatus::Success);
    }

    let sentinel = 0x77usize as XferRequestHandle;
    let mut req: XferRequestHandle = sentinel;
    let descs = [XferOpDesc { local_addr: 0x1000, remote_addr: 0x2000, len: 64 }];
    unsafe {
        assert_eq!(
            xfer_transfer_async(
                handle,
                remote.as_ptr(),
                XferOpKind::Write,
                descs.as_ptr(),
                0,
                &mut req,
            ),
            XferStatus::Error
        );
        assert_eq!(req, sentinel);
        assert!(!last_msg().is_empty());

        assert_eq!(
            xfer_transfer_async(
                handle,
                remote.as_ptr(),
                XferOpKind::Write,
                ptr::null(),
                1,
                &mut req,
            ),
            XferStatus::Error
        );
        assert_eq!(req, sentinel);
        xfer_destroy(handle);
    }
}

#[test]
fn succeeding_calls_leave_the_error_channel_alone() {
    let handle = initialized_engine("local-a");

    // Park a known message in this thread's slot.
    let name = CString::new("x").unwrap();
    assert_eq!(unsafe { xfer_initialize(ptr::null_mut(), name.as_ptr()) }, XferStatus::Error);
    let parked = last_msg();
    assert!(!parked.is_empty());

    let buf = vec![0u8; 256];
    let mut mem: XferMemHandle = ptr::null_mut();
    unsafe {
        assert_eq!(
            xfer_register_mem(handle, buf.as_ptr() as usize, 256, XferMemKind::Host, &mut mem),
            XferStatus::Success
        );
        assert_eq!(xfer_deregister_mem(handle, mem), XferStatus::Success);
    }
    assert_eq!(last_msg(), parked);
    unsafe { xfer_destroy(handle) };
}

#[test]
fn error_channel_is_thread_scoped() {
    let handle = initialized_engine("local-a");

    // Zero-length registration fails on this thread with a distinct text.
    let mut mem: XferMemHandle = ptr::null_mut();
    assert_eq!(
        unsafe { xfer_register_mem(handle, 0x1000, 0, XferMemKind::Host, &mut mem) },
        XferStatus::Error
    );
    let main_msg = last_msg();
    assert!(!main_msg.is_empty());

    std::thread::spawn(|| {
        // A fresh thread starts with an empty slot and only ever sees its
        // own failures.
        assert!(last_msg().is_empty());
        let name = CString::new("x").unwrap();
        assert_eq!(
            unsafe { xfer_initialize(ptr::null_mut(), name.as_ptr()) },
            XferStatus::Error
        );
        assert_eq!(last_msg(), "InvalidArgument: null engine handle");
    })
    .join()
    .unwrap();

    assert_eq!(last_msg(), main_msg);
    unsafe { xfer_destroy(handle) };
}

#[test]
fn query_failure_reports_error_code() {
    let handle = initialized_engine("local-a");
    let bogus = 0x9999usize as XferRequestHandle;
    assert_eq!(unsafe { xfer_check_transfer_status(handle, bogus) }, XFER_POLL_ERROR);
    assert_eq!(last_msg(), "GetTransferStatus failed with status: 1");
    unsafe { xfer_destroy(handle) };
}
