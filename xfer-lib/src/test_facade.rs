use std::time::Duration;

use mockall::Sequence;

use crate::api::{MemDesc, MemKind, OpDesc, OpKind, ReqToken, TransferState};
use crate::error::{BackendCallError, XferLibError};
use crate::facade::Engine;
use crate::interface::{EngineStatus, MockPeerEngine};

fn engine_with(mock: MockPeerEngine) -> Engine {
    Engine::new(Box::new(mock))
}

#[test]
fn backend_call_error_display() {
    let e = BackendCallError::new("Initialize", EngineStatus::Internal);
    assert_eq!(format!("{}", e), "Initialize failed with status: 7");
}

#[test]
fn initialize_forwards_name_and_empty_options() {
    let mut mock = MockPeerEngine::new();
    mock.expect_initialize()
        .withf(|name, options| name == "local-a" && options.is_empty())
        .times(1)
        .returning(|_, _| Ok(()));
    engine_with(mock).initialize("local-a").unwrap();
}

#[test]
fn initialize_failure_embeds_backend_code() {
    let mut mock = MockPeerEngine::new();
    mock.expect_initialize().returning(|_, _| Err(EngineStatus::Internal));
    let err = engine_with(mock).initialize("local-a").unwrap_err();
    assert_eq!(err.to_string(), "Initialize failed with status: 7");
}

#[test]
fn initialize_rejects_empty_name_without_backend_call() {
    let err = engine_with(MockPeerEngine::new()).initialize("").unwrap_err();
    assert!(matches!(err, XferLibError::InvalidArgument(_)));
}

#[test]
fn register_rejects_zero_length_without_backend_call() {
    let err = engine_with(MockPeerEngine::new())
        .register_mem(0x1000, 0, MemKind::Host)
        .unwrap_err();
    assert!(matches!(err, XferLibError::InvalidArgument(_)));
}

#[test]
fn register_forwards_descriptor_and_kind() {
    let mut mock = MockPeerEngine::new();
    mock.expect_register_mem()
        .withf(|desc, kind| {
            *desc == MemDesc { addr: 0x1000, len: 4096 } && *kind == MemKind::Device
        })
        .times(1)
        .returning(|_, _| Ok(crate::api::MemToken(42)));
    let token = engine_with(mock).register_mem(0x1000, 4096, MemKind::Device).unwrap();
    assert_eq!(token.0, 42);
}

#[test]
fn connect_absorbs_already_connected() {
    let mut mock = MockPeerEngine::new();
    mock.expect_connect()
        .withf(|remote, timeout| remote == "remote-b" && *timeout == 5000)
        .times(1)
        .returning(|_, _| Err(EngineStatus::AlreadyConnected));
    engine_with(mock).connect("remote-b", 5000).unwrap();
}

#[test]
fn connect_propagates_other_failures() {
    let mut mock = MockPeerEngine::new();
    mock.expect_connect().returning(|_, _| Err(EngineStatus::Unreachable));
    let err = engine_with(mock).connect("remote-b", 5000).unwrap_err();
    assert_eq!(err.to_string(), "Connect failed with status: 5");
}

#[test]
fn disconnect_absorbs_not_connected() {
    let mut mock = MockPeerEngine::new();
    mock.expect_disconnect().times(1).returning(|_, _| Err(EngineStatus::NotConnected));
    engine_with(mock).disconnect("never-connected", 5000).unwrap();
}

#[test]
fn transfer_rejects_empty_batch_without_backend_call() {
    let err = engine_with(MockPeerEngine::new())
        .transfer_async("remote-b", OpKind::Write, &[])
        .unwrap_err();
    assert!(matches!(err, XferLibError::InvalidArgument(_)));
}

#[test]
fn transfer_preserves_batch_order() {
    let descs = [
        OpDesc { local_addr: 0x1000, remote_addr: 0x2000, len: 64 },
        OpDesc { local_addr: 0x5000, remote_addr: 0x6000, len: 128 },
        OpDesc { local_addr: 0x3000, remote_addr: 0x4000, len: 32 },
    ];
    let mut mock = MockPeerEngine::new();
    mock.expect_transfer_async()
        .withf(move |remote, op, ops, _args| {
            remote == "remote-b" && *op == OpKind::Read && ops.as_slice() == &descs[..]
        })
        .times(1)
        .returning(|_, _, _, _| Ok(ReqToken(9)));
    let req = engine_with(mock)
        .transfer_async("remote-b", OpKind::Read, &descs)
        .unwrap();
    assert_eq!(req.0, 9);
}

#[test]
fn transfer_failure_embeds_backend_code() {
    let mut mock = MockPeerEngine::new();
    mock.expect_transfer_async().returning(|_, _, _, _| Err(EngineStatus::NotConnected));
    let err = engine_with(mock)
        .transfer_async("remote-b", OpKind::Write, &[OpDesc {
            local_addr: 0x1000,
            remote_addr: 0x2000,
            len: 4096,
        }])
        .unwrap_err();
    assert_eq!(err.to_string(), "TransferAsync failed with status: 4");
}

#[test]
fn check_transfer_query_failure_is_an_error() {
    let mut mock = MockPeerEngine::new();
    mock.expect_get_transfer_status().returning(|_| Err(EngineStatus::Internal));
    let err = engine_with(mock).check_transfer(ReqToken(1)).unwrap_err();
    assert_eq!(err.to_string(), "GetTransferStatus failed with status: 7");
}

#[test]
fn wait_transfer_polls_until_completed() {
    let mut seq = Sequence::new();
    let mut mock = MockPeerEngine::new();
    mock.expect_get_transfer_status()
        .times(2)
        .in_sequence(&mut seq)
        .returning(|_| Ok(TransferState::Waiting));
    mock.expect_get_transfer_status()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Ok(TransferState::Completed));
    engine_with(mock)
        .wait_transfer(ReqToken(1), Duration::from_secs(1))
        .unwrap();
}

#[test]
fn wait_transfer_distinguishes_failed_and_timeout() {
    let mut mock = MockPeerEngine::new();
    mock.expect_get_transfer_status().returning(|_| Ok(TransferState::Failed));
    let err = engine_with(mock)
        .wait_transfer(ReqToken(1), Duration::from_secs(1))
        .unwrap_err();
    assert!(matches!(err, XferLibError::TransferFailed));

    let mut mock = MockPeerEngine::new();
    mock.expect_get_transfer_status().returning(|_| Ok(TransferState::Timeout));
    let err = engine_with(mock)
        .wait_transfer(ReqToken(1), Duration::from_secs(1))
        .unwrap_err();
    assert!(matches!(err, XferLibError::TransferTimedOut));
}

#[test]
fn wait_transfer_gives_up_at_deadline() {
    let mut mock = MockPeerEngine::new();
    mock.expect_get_transfer_status().returning(|_| Ok(TransferState::Waiting));
    let err = engine_with(mock)
        .wait_transfer(ReqToken(1), Duration::from_millis(5))
        .unwrap_err();
    assert!(matches!(err, XferLibError::WaitDeadlineExceeded));
}

#[test]
fn finalize_is_forwarded_once() {
    let mut mock = MockPeerEngine::new();
    mock.expect_finalize().times(1).return_const(());
    engine_with(mock).finalize();
}
