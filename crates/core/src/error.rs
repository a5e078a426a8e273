/// Result alias that carries the custom [`PlayerError`] type.
pub type Result<T> = std::result::Result<T, PlayerError>;

/// Common error type for the core crate.
///
/// Platform faults raised by sinks and segment loaders never surface here; they
/// are classified into [`crate::source::Fault`] at the adapter boundary. This type
/// covers configuration, decode-graph construction and I/O performed by hosts.
#[derive(Debug, thiserror::Error)]
pub enum PlayerError {
    /// Free-form error message.
    #[error("{0}")]
    Message(String),
    /// A caller supplied a value outside the accepted range.
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    /// A decode context was asked to build a second source node for one sink.
    #[error("a decode source already exists for sink {0}")]
    DuplicateSource(u64),
    /// The decode context has been closed and can no longer be resumed.
    #[error("decode context is closed")]
    ContextClosed,
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// Configuration or command output could not be (de)serialized.
    #[error("{0}")]
    Json(#[from] serde_json::Error),
    /// The spectrum transform rejected its buffers.
    #[error("fft failed: {0}")]
    Fft(#[from] realfft::FftError),
}

impl PlayerError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }
}

impl From<&str> for PlayerError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for PlayerError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
