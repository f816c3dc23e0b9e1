use std::collections::BTreeMap;

use mockall::automock;

use crate::api::{
    MemDesc, MemKind, MemToken, OpBatch, OpKind, ReqToken, TransferArgs, TransferState,
};

/// Options handed to a backend at initialization. The facade always passes
/// an empty map.
pub type InitOptions = BTreeMap<String, String>;

pub type EngineResult<T> = std::result::Result<T, EngineStatus>;

/// Non-success codes reported by a backend engine. The numeric values are
/// part of the backend contract and surface verbatim in diagnostics, so
/// they are assigned explicitly and never reordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineStatus {
    InvalidArgument,
    NotInitialized,
    AlreadyConnected,
    NotConnected,
    Unreachable,
    Timeout,
    Internal,
}

impl EngineStatus {
    pub fn code(&self) -> i32 {
        match self {
            EngineStatus::InvalidArgument => 1,
            EngineStatus::NotInitialized => 2,
            EngineStatus::AlreadyConnected => 3,
            EngineStatus::NotConnected => 4,
            EngineStatus::Unreachable => 5,
            EngineStatus::Timeout => 6,
            EngineStatus::Internal => 7,
        }
    }
}

/// The underlying transfer engine, consumed as an opaque object.
///
/// Methods take `&self`; a backend supplies its own synchronization. The
/// facade adds no locking and forwards concurrent calls as-is.
#[automock]
pub trait PeerEngine: Send + Sync {
    fn initialize(&self, local_engine: &str, options: &InitOptions) -> EngineResult<()>;

    fn register_mem(&self, desc: MemDesc, kind: MemKind) -> EngineResult<MemToken>;

    fn deregister_mem(&self, mem: MemToken) -> EngineResult<()>;

    fn connect(&self, remote_engine: &str, timeout_ms: i32) -> EngineResult<()>;

    fn disconnect(&self, remote_engine: &str, timeout_ms: i32) -> EngineResult<()>;

    fn transfer_async(
        &self,
        remote_engine: &str,
        op: OpKind,
        ops: OpBatch,
        args: TransferArgs,
    ) -> EngineResult<ReqToken>;

    fn get_transfer_status(&self, req: ReqToken) -> EngineResult<TransferState>;

    fn finalize(&self);
}
