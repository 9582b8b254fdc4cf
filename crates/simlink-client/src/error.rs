/// Errors that can occur in client operations.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] simlink_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] simlink_frame::FrameError),

    /// JSON serialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The background worker could not be started.
    #[error("failed to spawn I/O worker: {0}")]
    Spawn(std::io::Error),

    /// The background worker panicked outside the handler guard.
    #[error("I/O worker panicked")]
    WorkerPanicked,
}

pub type Result<T> = std::result::Result<T, ClientError>;
