//! Types used in public API

use serde::{Deserialize, Serialize};

/// Descriptor batches are almost always short; keep them inline.
pub type OpBatch = ::smallvec::SmallVec<[OpDesc; 4]>;

/// Kind of memory a region lives in, as understood by a backend engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MemKind {
    Device,
    Host,
}

/// Direction of a transfer batch. `Read` moves remote bytes into local
/// memory, `Write` moves local bytes into remote memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpKind {
    Read,
    Write,
}

/// A memory region handed to `register_mem`. Input-only; the backend keeps
/// its own bookkeeping and answers with a [`MemToken`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemDesc {
    pub addr: usize,
    pub len: usize,
}

/// One element of a transfer batch. Batch order defines which local region
/// pairs with which remote region and is preserved at every layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OpDesc {
    pub local_addr: usize,
    pub remote_addr: usize,
    pub len: usize,
}

/// Opaque registration token minted by a backend engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct MemToken(pub usize);

/// Opaque in-flight request token minted by a backend engine. Once a
/// terminal [`TransferState`] has been observed the token is spent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct ReqToken(pub usize);

/// State of an in-flight request. Single-directional: a request never
/// reports `Waiting` again after a terminal state, and never reports two
/// different terminal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransferState {
    Waiting,
    Completed,
    Failed,
    Timeout,
}

impl TransferState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransferState::Waiting)
    }
}

/// Per-request backend arguments. The facade always submits the default.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransferArgs;
