use std::time::Duration;

use crate::api::{MemKind, OpDesc, OpKind, TransferState};
use crate::facade::Engine;
use crate::loopback::LoopbackEngine;

fn active_engine() -> Engine {
    let engine = Engine::new(Box::new(LoopbackEngine::new()));
    engine.initialize("local-a").unwrap();
    engine
}

#[test]
fn write_lifecycle_moves_bytes() {
    let engine = active_engine();

    let src = vec![0xabu8; 4096];
    let mut dst = vec![0u8; 4096];
    let src_tok = engine
        .register_mem(src.as_ptr() as usize, src.len(), MemKind::Host)
        .unwrap();
    let dst_tok = engine
        .register_mem(dst.as_mut_ptr() as usize, dst.len(), MemKind::Host)
        .unwrap();

    engine.connect("remote-b", 5000).unwrap();
    let req = engine
        .transfer_async("remote-b", OpKind::Write, &[OpDesc {
            local_addr: src.as_ptr() as usize,
            remote_addr: dst.as_mut_ptr() as usize,
            len: 4096,
        }])
        .unwrap();
    engine.wait_transfer(req, Duration::from_secs(1)).unwrap();
    assert!(dst.iter().all(|&b| b == 0xab));

    engine.deregister_mem(src_tok).unwrap();
    engine.deregister_mem(dst_tok).unwrap();
    engine.disconnect("remote-b", 5000).unwrap();
    engine.finalize();
}

#[test]
fn read_moves_remote_bytes_into_local() {
    let engine = active_engine();

    let mut local = vec![0u8; 64];
    let remote = vec![0x5au8; 64];
    engine
        .register_mem(local.as_mut_ptr() as usize, local.len(), MemKind::Host)
        .unwrap();

    engine.connect("remote-b", 5000).unwrap();
    let req = engine
        .transfer_async("remote-b", OpKind::Read, &[OpDesc {
            local_addr: local.as_mut_ptr() as usize,
            remote_addr: remote.as_ptr() as usize,
            len: 64,
        }])
        .unwrap();
    engine.wait_transfer(req, Duration::from_secs(1)).unwrap();
    assert!(local.iter().all(|&b| b == 0x5a));
}

#[test]
fn connect_is_idempotent_and_disconnect_tolerates_unknown_names() {
    let engine = active_engine();
    engine.connect("remote-b", 5000).unwrap();
    engine.connect("remote-b", 5000).unwrap();
    engine.disconnect("never-connected", 5000).unwrap();
    engine.disconnect("remote-b", 5000).unwrap();
    engine.disconnect("remote-b", 5000).unwrap();
}

#[test]
fn status_is_monotone_and_sticky() {
    let engine = Engine::new(Box::new(LoopbackEngine::with_poll_latency(3)));
    engine.initialize("local-a").unwrap();

    let mut buf = vec![1u8; 32];
    engine
        .register_mem(buf.as_mut_ptr() as usize, buf.len(), MemKind::Host)
        .unwrap();
    engine.connect("remote-b", 1000).unwrap();
    let req = engine
        .transfer_async("remote-b", OpKind::Write, &[OpDesc {
            local_addr: buf.as_mut_ptr() as usize,
            remote_addr: buf.as_mut_ptr() as usize,
            len: 32,
        }])
        .unwrap();

    for _ in 0..3 {
        assert_eq!(engine.check_transfer(req).unwrap(), TransferState::Waiting);
    }
    for _ in 0..5 {
        assert_eq!(engine.check_transfer(req).unwrap(), TransferState::Completed);
    }
}

#[test]
fn data_operations_before_initialize_are_rejected() {
    let engine = Engine::new(Box::new(LoopbackEngine::new()));
    let err = engine.register_mem(0x1000, 4096, MemKind::Device).unwrap_err();
    assert_eq!(err.to_string(), "RegisterMem failed with status: 2");
    let err = engine.connect("remote-b", 5000).unwrap_err();
    assert_eq!(err.to_string(), "Connect failed with status: 2");
}

#[test]
fn data_operations_after_finalize_are_rejected() {
    let engine = active_engine();
    engine.finalize();
    let err = engine.register_mem(0x1000, 4096, MemKind::Host).unwrap_err();
    assert_eq!(err.to_string(), "RegisterMem failed with status: 2");
}

#[test]
fn double_initialize_is_rejected() {
    let engine = active_engine();
    let err = engine.initialize("local-a").unwrap_err();
    assert_eq!(err.to_string(), "Initialize failed with status: 1");
}

#[test]
fn transfer_requires_connected_peer_and_registered_local_memory() {
    let engine = active_engine();
    let buf = vec![0u8; 128];
    let desc = OpDesc {
        local_addr: buf.as_ptr() as usize,
        remote_addr: buf.as_ptr() as usize,
        len: 128,
    };

    let err = engine.transfer_async("remote-b", OpKind::Write, &[desc]).unwrap_err();
    assert_eq!(err.to_string(), "TransferAsync failed with status: 4");

    engine.connect("remote-b", 5000).unwrap();
    let err = engine.transfer_async("remote-b", OpKind::Write, &[desc]).unwrap_err();
    assert_eq!(err.to_string(), "TransferAsync failed with status: 1");
}

#[test]
fn deregister_unknown_token_is_rejected() {
    let engine = active_engine();
    let err = engine.deregister_mem(crate::api::MemToken(999)).unwrap_err();
    assert_eq!(err.to_string(), "DeregisterMem failed with status: 1");
}

#[test]
fn polling_unknown_request_is_a_query_error() {
    let engine = active_engine();
    let err = engine.check_transfer(crate::api::ReqToken(999)).unwrap_err();
    assert_eq!(err.to_string(), "GetTransferStatus failed with status: 1");
}
