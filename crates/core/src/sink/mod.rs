//! Audio output sink abstraction.
//!
//! A sink is the platform element that actually plays the stream. The
//! controller drives it through [`MediaSink`] and learns about its lifecycle
//! through [`SinkEvent`]s the host forwards.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use serde::{Deserialize, Serialize};

static NEXT_SINK_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug)]
pub struct SinkToken {
    id: u64,
}

/// Identity of one physical sink.
///
/// The sink holds the only long-lived strong reference; registries keep a
/// [`Weak`] handle so their entries never keep a discarded sink alive.
#[derive(Debug, Clone)]
pub struct SinkIdentity(Arc<SinkToken>);

impl SinkIdentity {
    pub fn new() -> Self {
        let id = NEXT_SINK_ID.fetch_add(1, Ordering::Relaxed);
        Self(Arc::new(SinkToken { id }))
    }

    pub fn id(&self) -> u64 {
        self.0.id
    }

    pub fn downgrade(&self) -> Weak<SinkToken> {
        Arc::downgrade(&self.0)
    }

    /// Whether `weak` refers to this very sink.
    pub fn is(&self, weak: &Weak<SinkToken>) -> bool {
        weak.upgrade()
            .map(|token| Arc::ptr_eq(&token, &self.0))
            .unwrap_or(false)
    }
}

impl Default for SinkIdentity {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for SinkIdentity {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for SinkIdentity {}

/// Media error codes reported by a sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaErrorCode {
    Aborted,
    Network,
    Decode,
    SourceNotSupported,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinkFault {
    pub code: MediaErrorCode,
    pub message: String,
}

impl SinkFault {
    pub fn new(code: MediaErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Why a sink refused to start playing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlayRejection {
    /// Autoplay policy: playback requires a user gesture.
    NotAllowed,
    /// The play request was interrupted by a new load or a pause.
    Aborted,
    NotSupported,
    Other,
}

/// Lifecycle callbacks fired by a sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SinkEvent {
    LoadStart,
    CanPlay,
    Playing,
    Waiting,
    Pause,
    Ended,
    Error(SinkFault),
    Stalled,
    Suspend,
    TimeUpdate,
}

/// The platform audio-output element.
pub trait MediaSink {
    fn identity(&self) -> &SinkIdentity;
    fn set_source(&mut self, url: &str);
    /// Detaches the current source and aborts any in-flight download.
    fn clear_source(&mut self);
    fn play(&mut self) -> Result<(), PlayRejection>;
    fn pause(&mut self);
    fn is_paused(&self) -> bool;
    fn set_volume(&mut self, volume: f32);
    fn set_muted(&mut self, muted: bool);
}

/// Every mutating call a [`MemorySink`] received.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum SinkCall {
    SetSource(String),
    ClearSource,
    Play,
    Pause,
    SetVolume(f32),
    SetMuted(bool),
}

/// Headless sink that records calls instead of producing sound.
#[derive(Debug)]
pub struct MemorySink {
    identity: SinkIdentity,
    source: Option<String>,
    paused: bool,
    volume: f32,
    muted: bool,
    calls: Vec<SinkCall>,
    rejections: Vec<PlayRejection>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self {
            identity: SinkIdentity::new(),
            source: None,
            paused: true,
            volume: 1.0,
            muted: false,
            calls: Vec::new(),
            rejections: Vec::new(),
        }
    }

    /// Makes the next `play()` call fail with `rejection`.
    pub fn reject_next_play(&mut self, rejection: PlayRejection) {
        self.rejections.push(rejection);
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn muted(&self) -> bool {
        self.muted
    }

    pub fn calls(&self) -> &[SinkCall] {
        &self.calls
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    /// Simulates the element pausing on its own, e.g. when backgrounded.
    pub fn force_pause(&mut self) {
        self.paused = true;
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl MediaSink for MemorySink {
    fn identity(&self) -> &SinkIdentity {
        &self.identity
    }

    fn set_source(&mut self, url: &str) {
        self.calls.push(SinkCall::SetSource(url.to_string()));
        self.source = Some(url.to_string());
        self.paused = true;
    }

    fn clear_source(&mut self) {
        self.calls.push(SinkCall::ClearSource);
        self.source = None;
        self.paused = true;
    }

    fn play(&mut self) -> Result<(), PlayRejection> {
        self.calls.push(SinkCall::Play);
        if !self.rejections.is_empty() {
            return Err(self.rejections.remove(0));
        }
        self.paused = false;
        Ok(())
    }

    fn pause(&mut self) {
        self.calls.push(SinkCall::Pause);
        self.paused = true;
    }

    fn is_paused(&self) -> bool {
        self.paused
    }

    fn set_volume(&mut self, volume: f32) {
        self.calls.push(SinkCall::SetVolume(volume));
        self.volume = volume;
    }

    fn set_muted(&mut self, muted: bool) {
        self.calls.push(SinkCall::SetMuted(muted));
        self.muted = muted;
    }
}
