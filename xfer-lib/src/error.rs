use crate::interface::EngineStatus;

pub type Result<T> = std::result::Result<T, XferLibError>;

#[derive(Clone, Debug, thiserror::Error)]
pub enum XferLibError {
    #[error("{0}")]
    Backend(#[from] BackendCallError),
    #[error("InvalidArgument: {0}")]
    InvalidArgument(&'static str),
    #[error("transfer failed on the remote engine")]
    TransferFailed,
    #[error("transfer timed out in the backend engine")]
    TransferTimedOut,
    #[error("deadline elapsed while waiting for transfer completion")]
    WaitDeadlineExceeded,
    #[error("backend construction failed: {0}")]
    ConstructBackend(String),
}

/// A backend call that returned non-success. The backend's numeric status
/// code is preserved in the rendered message.
#[derive(Clone, Debug)]
pub struct BackendCallError {
    pub op: &'static str,
    pub status: EngineStatus,
}

impl BackendCallError {
    pub fn new(op: &'static str, status: EngineStatus) -> Self {
        Self { op, status }
    }
}

impl std::fmt::Display for BackendCallError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} failed with status: {}", self.op, self.status.code())
    }
}

impl std::error::Error for BackendCallError {}
