use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::api::{
    MemDesc, MemKind, MemToken, OpBatch, OpDesc, OpKind, ReqToken, TransferArgs, TransferState,
};
use crate::error::{BackendCallError, Result, XferLibError};
use crate::interface::{EngineStatus, InitOptions, PeerEngine};

/// Owns exactly one backend engine instance. Every registration and
/// request token minted through an `Engine` is scoped to its backend.
pub struct Engine {
    backend: Box<dyn PeerEngine>,
}

impl Engine {
    /// Wrap a freshly constructed backend. The engine is not usable for
    /// data operations until [`Engine::initialize`] succeeds.
    pub fn new(backend: Box<dyn PeerEngine>) -> Self {
        Self { backend }
    }

    /// Bind the backend to its local engine identity. The options map is
    /// always empty; backends that need options get them out of band.
    pub fn initialize(&self, local_engine: &str) -> Result<()> {
        if local_engine.is_empty() {
            return Err(XferLibError::InvalidArgument("empty local engine name"));
        }
        trace!(local_engine, "initializing engine");
        let options = InitOptions::new();
        self.backend
            .initialize(local_engine, &options)
            .map_err(|status| BackendCallError::new("Initialize", status).into())
    }

    /// Register `(addr, len)` as transferable memory of the given kind.
    /// The region must stay valid for the registration's whole lifetime.
    pub fn register_mem(&self, addr: usize, len: usize, kind: MemKind) -> Result<MemToken> {
        if len == 0 {
            return Err(XferLibError::InvalidArgument("zero-length memory region"));
        }
        trace!(addr, len, ?kind, "registering memory");
        self.backend
            .register_mem(MemDesc { addr, len }, kind)
            .map_err(|status| BackendCallError::new("RegisterMem", status).into())
    }

    /// No reference counting is performed against in-flight requests;
    /// deregistering memory a transfer still uses is a caller error.
    pub fn deregister_mem(&self, mem: MemToken) -> Result<()> {
        trace!(token = mem.0, "deregistering memory");
        self.backend
            .deregister_mem(mem)
            .map_err(|status| BackendCallError::new("DeregisterMem", status).into())
    }

    /// Idempotent: a backend reporting the connection as already
    /// established counts as success, with no parameter refresh.
    pub fn connect(&self, remote_engine: &str, timeout_ms: i32) -> Result<()> {
        if remote_engine.is_empty() {
            return Err(XferLibError::InvalidArgument("empty remote engine name"));
        }
        trace!(remote_engine, timeout_ms, "connecting");
        match self.backend.connect(remote_engine, timeout_ms) {
            Ok(()) | Err(EngineStatus::AlreadyConnected) => Ok(()),
            Err(status) => Err(BackendCallError::new("Connect", status).into()),
        }
    }

    /// Idempotent: disconnecting a name that is not connected counts as
    /// success.
    pub fn disconnect(&self, remote_engine: &str, timeout_ms: i32) -> Result<()> {
        if remote_engine.is_empty() {
            return Err(XferLibError::InvalidArgument("empty remote engine name"));
        }
        trace!(remote_engine, timeout_ms, "disconnecting");
        match self.backend.disconnect(remote_engine, timeout_ms) {
            Ok(()) | Err(EngineStatus::NotConnected) => Ok(()),
            Err(status) => Err(BackendCallError::new("Disconnect", status).into()),
        }
    }

    /// Submit one asynchronous batch against `remote_engine`. Returns as
    /// soon as the backend accepts the batch; completion is observed
    /// through [`Engine::check_transfer`]. Batch order is preserved.
    pub fn transfer_async(
        &self,
        remote_engine: &str,
        op: OpKind,
        descs: &[OpDesc],
    ) -> Result<ReqToken> {
        if remote_engine.is_empty() {
            return Err(XferLibError::InvalidArgument("empty remote engine name"));
        }
        if descs.is_empty() {
            return Err(XferLibError::InvalidArgument("empty descriptor batch"));
        }
        trace!(remote_engine, ?op, count = descs.len(), "submitting transfer");
        let ops: OpBatch = descs.iter().copied().collect();
        self.backend
            .transfer_async(remote_engine, op, ops, TransferArgs::default())
            .map_err(|status| BackendCallError::new("TransferAsync", status).into())
    }

    /// Non-blocking snapshot of a request's state at the instant of the
    /// call. Poll repeatedly until a terminal state is observed.
    pub fn check_transfer(&self, req: ReqToken) -> Result<TransferState> {
        self.backend
            .get_transfer_status(req)
            .map_err(|status| BackendCallError::new("GetTransferStatus", status).into())
    }

    /// Poll `req` until it reaches a terminal state or `timeout` elapses.
    /// A backend-reported `Timeout` and a facade-side deadline are
    /// distinct errors.
    pub fn wait_transfer(&self, req: ReqToken, timeout: Duration) -> Result<()> {
        let start = Instant::now();
        loop {
            match self.check_transfer(req)? {
                TransferState::Completed => return Ok(()),
                TransferState::Failed => return Err(XferLibError::TransferFailed),
                TransferState::Timeout => return Err(XferLibError::TransferTimedOut),
                TransferState::Waiting => {}
            }
            if start.elapsed() >= timeout {
                return Err(XferLibError::WaitDeadlineExceeded);
            }
            thread::sleep(Duration::from_millis(1));
        }
    }

    /// Best-effort teardown; never fails from the caller's perspective.
    pub fn finalize(&self) {
        debug!("finalizing engine");
        self.backend.finalize();
    }
}
