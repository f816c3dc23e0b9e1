use std::ffi::{CStr, CString};
use std::io::{stdout, Write};
use std::ptr;
use std::time::Duration;

use anyhow::{anyhow, Result};
use clap::Parser;
use xfer_lib::api::{MemKind, OpDesc, OpKind};
use xfer_lib::capi::{
    xfer_check_transfer_status, xfer_connect, xfer_create, xfer_deregister_mem, xfer_destroy,
    xfer_disconnect, xfer_finalize, xfer_get_error_msg, xfer_initialize, xfer_register_mem,
    xfer_transfer_async, XferMemHandle, XferMemKind, XferOpDesc, XferOpKind, XferRequestHandle,
    XferStatus, XFER_POLL_COMPLETED, XFER_POLL_WAITING,
};
use xfer_lib::{install_backend_factory, Engine, LoopbackEngine, PeerEngine};

#[derive(Debug, Parser)]
struct Opts {
    #[clap(flatten)]
    logging: logging_lib::LoggingOpts,

    /// Bytes moved per transfer.
    #[clap(long, default_value_t = 1 << 20)]
    bytes: usize,
}

fn fill_random_bytes(buf: &mut [u8], seed: u64) {
    let mut state = seed;
    for chunk in buf.chunks_mut(8) {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        chunk.copy_from_slice(&state.to_le_bytes()[..chunk.len()]);
    }
}

fn run_safe_api(bytes: usize) -> Result<()> {
    print!("safe API: create + initialize ...");
    stdout().flush()?;
    let engine = Engine::new(Box::new(LoopbackEngine::new()));
    engine.initialize("local-a")?;

    let mut src = vec![0u8; bytes];
    fill_random_bytes(&mut src, 0x1d0d_5eed);
    let mut dst = vec![0u8; bytes];
    let dst_addr = dst.as_mut_ptr() as usize;

    let src_tok = engine.register_mem(src.as_ptr() as usize, bytes, MemKind::Host)?;
    let dst_tok = engine.register_mem(dst_addr, bytes, MemKind::Host)?;
    engine.connect("remote-b", 5000)?;
    println!(" ok");

    print!("safe API: WRITE {} bytes ...", bytes);
    stdout().flush()?;
    let req = engine.transfer_async("remote-b", OpKind::Write, &[OpDesc {
        local_addr: src.as_ptr() as usize,
        remote_addr: dst_addr,
        len: bytes,
    }])?;
    engine.wait_transfer(req, Duration::from_secs(5))?;
    if src != dst {
        return Err(anyhow!("WRITE verification failed"));
    }
    println!(" VERIFIED");

    engine.deregister_mem(src_tok)?;
    engine.deregister_mem(dst_tok)?;
    engine.disconnect("remote-b", 5000)?;
    engine.finalize();
    Ok(())
}

fn last_msg() -> String {
    unsafe { CStr::from_ptr(xfer_get_error_msg()).to_string_lossy().into_owned() }
}

fn check(status: XferStatus, what: &str) -> Result<()> {
    match status {
        XferStatus::Success => Ok(()),
        XferStatus::Error => Err(anyhow!("{} failed: {}", what, last_msg())),
    }
}

fn run_c_abi(bytes: usize) -> Result<()> {
    print!("C ABI: create + initialize ...");
    stdout().flush()?;
    let handle = xfer_create();
    if handle.is_null() {
        return Err(anyhow!("xfer_create failed: {}", last_msg()));
    }
    let local = CString::new("local-a")?;
    let remote = CString::new("remote-b")?;
    check(unsafe { xfer_initialize(handle, local.as_ptr()) }, "xfer_initialize")?;

    let mut src = vec![0u8; bytes];
    fill_random_bytes(&mut src, 0xfab_c0de);
    let mut dst = vec![0u8; bytes];
    let dst_addr = dst.as_mut_ptr() as usize;

    let mut src_mem: XferMemHandle = ptr::null_mut();
    let mut dst_mem: XferMemHandle = ptr::null_mut();
    unsafe {
        check(
            xfer_register_mem(handle, src.as_ptr() as usize, bytes, XferMemKind::Host, &mut src_mem),
            "xfer_register_mem",
        )?;
        check(
            xfer_register_mem(handle, dst_addr, bytes, XferMemKind::Host, &mut dst_mem),
            "xfer_register_mem",
        )?;
        check(xfer_connect(handle, remote.as_ptr(), 5000), "xfer_connect")?;
    }
    println!(" ok");

    print!("C ABI: WRITE {} bytes ...", bytes);
    stdout().flush()?;
    let descs = [XferOpDesc {
        local_addr: src.as_ptr() as usize,
        remote_addr: dst_addr,
        len: bytes,
    }];
    let mut req: XferRequestHandle = ptr::null_mut();
    unsafe {
        check(
            xfer_transfer_async(
                handle,
                remote.as_ptr(),
                XferOpKind::Write,
                descs.as_ptr(),
                descs.len(),
                &mut req,
            ),
            "xfer_transfer_async",
        )?;
    }

    let mut status = XFER_POLL_WAITING;
    while status == XFER_POLL_WAITING {
        status = unsafe { xfer_check_transfer_status(handle, req) };
    }
    if status != XFER_POLL_COMPLETED {
        return Err(anyhow!("transfer ended with poll status {}: {}", status, last_msg()));
    }
    if src != dst {
        return Err(anyhow!("WRITE verification failed"));
    }
    println!(" VERIFIED");

    unsafe {
        check(xfer_deregister_mem(handle, src_mem), "xfer_deregister_mem")?;
        check(xfer_deregister_mem(handle, dst_mem), "xfer_deregister_mem")?;
        check(xfer_disconnect(handle, remote.as_ptr(), 5000), "xfer_disconnect")?;
        xfer_finalize(handle);
        xfer_destroy(handle);
    }
    Ok(())
}

fn main() -> Result<()> {
    let opts = Opts::parse();
    logging_lib::init(&opts.logging)?;

    install_backend_factory(Box::new(|| {
        Ok(Box::new(LoopbackEngine::new()) as Box<dyn PeerEngine>)
    }));

    run_safe_api(opts.bytes)?;
    run_c_abi(opts.bytes)?;
    println!("Done!");
    Ok(())
}
