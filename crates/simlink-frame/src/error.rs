/// Errors that can occur while reassembling frames.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// A chunk contained bytes that can never form valid UTF-8.
    #[error("chunk is not valid UTF-8 (invalid byte after {offset} valid bytes)")]
    InvalidUtf8 { offset: usize },

    /// A complete candidate was not valid JSON, even after float repair.
    #[error("malformed JSON message: {0}")]
    Json(#[from] serde_json::Error),

    /// A fragment closed an object that was never opened with `{`.
    #[error("fragment does not belong to an open object ({len} bytes discarded)")]
    Unanchored { len: usize },

    /// The in-progress message grew past the configured limit.
    #[error("partial message too large ({size} bytes, max {max})")]
    PartialTooLarge { size: usize, max: usize },
}

impl FrameError {
    /// Fatal errors poison the stream; everything else only loses one message.
    pub fn is_fatal(&self) -> bool {
        matches!(self, FrameError::InvalidUtf8 { .. })
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
