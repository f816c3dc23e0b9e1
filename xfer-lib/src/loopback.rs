//! In-process backend. The "remote" side of every connection is this
//! process, so transfers resolve to plain byte copies between the
//! caller's own buffers. Used by tests and xfer-debug.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::trace;

use crate::api::{
    MemDesc, MemKind, MemToken, OpBatch, OpKind, ReqToken, TransferArgs, TransferState,
};
use crate::interface::{EngineResult, EngineStatus, InitOptions, PeerEngine};

/// WAITING polls a request reports before turning COMPLETED.
const DEFAULT_POLL_LATENCY: u32 = 2;

enum Phase {
    Created,
    Active(String),
    Finalized,
}

struct Registration {
    desc: MemDesc,
    #[allow(dead_code)]
    kind: MemKind,
}

struct RequestSlot {
    state: TransferState,
    polls_left: u32,
}

pub struct LoopbackEngine {
    phase: RwLock<Phase>,
    connections: RwLock<HashSet<String>>,
    registrations: DashMap<usize, Registration>,
    requests: DashMap<usize, RequestSlot>,
    next_mem: AtomicUsize,
    next_req: AtomicUsize,
    poll_latency: u32,
}

impl LoopbackEngine {
    pub fn new() -> Self {
        Self::with_poll_latency(DEFAULT_POLL_LATENCY)
    }

    /// A request answers `polls` WAITING queries before completing, so the
    /// caller-driven polling path is always exercised.
    pub fn with_poll_latency(polls: u32) -> Self {
        Self {
            phase: RwLock::new(Phase::Created),
            connections: RwLock::new(HashSet::new()),
            registrations: DashMap::new(),
            requests: DashMap::new(),
            // Token 0 would collide with a null pointer on the ABI side.
            next_mem: AtomicUsize::new(1),
            next_req: AtomicUsize::new(1),
            poll_latency: polls,
        }
    }

    fn require_active(&self) -> EngineResult<()> {
        match &*self.phase.read() {
            Phase::Active(_) => Ok(()),
            Phase::Created | Phase::Finalized => Err(EngineStatus::NotInitialized),
        }
    }

    fn covers_local(&self, addr: usize, len: usize) -> bool {
        let Some(end) = addr.checked_add(len) else {
            return false;
        };
        self.registrations.iter().any(|r| {
            let MemDesc { addr: base, len: span } = r.desc;
            addr >= base && end <= base + span
        })
    }
}

impl Default for LoopbackEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PeerEngine for LoopbackEngine {
    fn initialize(&self, local_engine: &str, _options: &InitOptions) -> EngineResult<()> {
        let mut phase = self.phase.write();
        match &*phase {
            Phase::Created => {
                trace!(local_engine, "loopback engine initialized");
                *phase = Phase::Active(local_engine.to_string());
                Ok(())
            }
            Phase::Active(_) | Phase::Finalized => Err(EngineStatus::InvalidArgument),
        }
    }

    fn register_mem(&self, desc: MemDesc, kind: MemKind) -> EngineResult<MemToken> {
        self.require_active()?;
        if desc.len == 0 {
            return Err(EngineStatus::InvalidArgument);
        }
        let token = self.next_mem.fetch_add(1, Ordering::Relaxed);
        self.registrations.insert(token, Registration { desc, kind });
        Ok(MemToken(token))
    }

    fn deregister_mem(&self, mem: MemToken) -> EngineResult<()> {
        self.require_active()?;
        match self.registrations.remove(&mem.0) {
            Some(_) => Ok(()),
            None => Err(EngineStatus::InvalidArgument),
        }
    }

    fn connect(&self, remote_engine: &str, _timeout_ms: i32) -> EngineResult<()> {
        self.require_active()?;
        if self.connections.write().insert(remote_engine.to_string()) {
            Ok(())
        } else {
            Err(EngineStatus::AlreadyConnected)
        }
    }

    fn disconnect(&self, remote_engine: &str, _timeout_ms: i32) -> EngineResult<()> {
        self.require_active()?;
        if self.connections.write().remove(remote_engine) {
            Ok(())
        } else {
            Err(EngineStatus::NotConnected)
        }
    }

    fn transfer_async(
        &self,
        remote_engine: &str,
        op: OpKind,
        ops: OpBatch,
        _args: TransferArgs,
    ) -> EngineResult<ReqToken> {
        self.require_active()?;
        if !self.connections.read().contains(remote_engine) {
            return Err(EngineStatus::NotConnected);
        }
        for desc in &ops {
            if desc.len == 0 || !self.covers_local(desc.local_addr, desc.len) {
                return Err(EngineStatus::InvalidArgument);
            }
        }
        // The peer is this process; the copy happens at submission and the
        // request ages through WAITING polls afterwards.
        for desc in &ops {
            let (src, dst) = match op {
                OpKind::Read => (desc.remote_addr, desc.local_addr),
                OpKind::Write => (desc.local_addr, desc.remote_addr),
            };
            unsafe {
                std::ptr::copy(src as *const u8, dst as *mut u8, desc.len);
            }
        }
        let token = self.next_req.fetch_add(1, Ordering::Relaxed);
        self.requests.insert(
            token,
            RequestSlot {
                state: TransferState::Waiting,
                polls_left: self.poll_latency,
            },
        );
        trace!(remote_engine, ?op, token, "loopback transfer submitted");
        Ok(ReqToken(token))
    }

    fn get_transfer_status(&self, req: ReqToken) -> EngineResult<TransferState> {
        self.require_active()?;
        let Some(mut slot) = self.requests.get_mut(&req.0) else {
            return Err(EngineStatus::InvalidArgument);
        };
        if slot.state == TransferState::Waiting {
            if slot.polls_left == 0 {
                slot.state = TransferState::Completed;
            } else {
                slot.polls_left -= 1;
            }
        }
        Ok(slot.state)
    }

    fn finalize(&self) {
        let mut phase = self.phase.write();
        if let Phase::Active(_) = &*phase {
            *phase = Phase::Finalized;
        }
        self.connections.write().clear();
        self.registrations.clear();
        self.requests.clear();
    }
}
