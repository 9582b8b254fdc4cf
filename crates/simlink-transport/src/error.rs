/// Errors that can occur in simulator transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to connect to the simulator host.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        source: std::io::Error,
    },

    /// The host name did not resolve to any socket address.
    #[error("no socket address resolved for {addr}")]
    Resolve { addr: String },

    /// The operation could not make progress without blocking.
    #[error("operation would block")]
    WouldBlock,

    /// An I/O error occurred on the transport stream.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection has been closed locally.
    #[error("connection closed")]
    Closed,

    /// Readiness polling is not available on this platform.
    #[error("readiness polling is not supported on this platform")]
    Unsupported,
}

impl TransportError {
    /// True for the non-error "try again later" outcome.
    pub fn is_would_block(&self) -> bool {
        matches!(self, TransportError::WouldBlock)
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
