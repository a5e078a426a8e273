use serde::{Deserialize, Serialize};

use crate::sink::SinkEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PlaybackStatus {
    #[default]
    Idle,
    Loading,
    Playing,
    Buffering,
    Paused,
    Error,
}

impl PlaybackStatus {
    /// Status after the sink fires `event`. `reconnecting` is whether the
    /// reconnection policy will try to bring the stream back, in which case
    /// an interruption reads as buffering rather than a stop.
    pub fn on_sink_event(self, event: &SinkEvent, reconnecting: bool) -> Self {
        match event {
            SinkEvent::LoadStart => Self::Loading,
            SinkEvent::CanPlay if self == Self::Loading => Self::Buffering,
            SinkEvent::Playing => Self::Playing,
            SinkEvent::Waiting | SinkEvent::Stalled => Self::Buffering,
            SinkEvent::Pause => Self::Paused,
            SinkEvent::Ended | SinkEvent::Error(_) if reconnecting => Self::Buffering,
            SinkEvent::Ended => Self::Paused,
            SinkEvent::Error(_) => Self::Error,
            SinkEvent::CanPlay | SinkEvent::Suspend | SinkEvent::TimeUpdate => self,
        }
    }
}

/// Observable player state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlaybackState {
    pub status: PlaybackStatus,
    pub volume: f32,
    pub muted: bool,
}

impl PlaybackState {
    pub fn new(volume: f32) -> Self {
        Self {
            status: PlaybackStatus::Idle,
            volume,
            muted: false,
        }
    }

    pub fn is_playing(&self) -> bool {
        self.status == PlaybackStatus::Playing
    }

    /// The only progress indicator listeners see.
    pub fn is_buffering(&self) -> bool {
        matches!(
            self.status,
            PlaybackStatus::Buffering | PlaybackStatus::Loading
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreamMode {
    /// Continuous progressive stream with no seekable buffer.
    Live,
    /// Segmented manifest with a look-ahead buffer.
    Buffered,
}

impl StreamMode {
    /// Manifests (`.m3u8`, query string ignored) are segmented; everything
    /// else is treated as a progressive live stream.
    pub fn from_url(url: &str) -> Self {
        let path = url.split(['?', '#']).next().unwrap_or(url);
        if path.to_ascii_lowercase().ends_with(".m3u8") {
            Self::Buffered
        } else {
            Self::Live
        }
    }
}

/// The stream the controller currently targets. Replaced wholesale, never
/// edited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamEndpoint {
    url: String,
    mode: StreamMode,
}

impl StreamEndpoint {
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        let mode = StreamMode::from_url(&url);
        Self { url, mode }
    }

    pub fn with_mode(url: impl Into<String>, mode: StreamMode) -> Self {
        Self {
            url: url.into(),
            mode,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn mode(&self) -> StreamMode {
        self.mode
    }
}
