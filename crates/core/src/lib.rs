//! Core library for the embeddable live radio player.
//!
//! The crate owns playback control, reconnection, stream source selection,
//! the per-sink decode graph and the spectrum visualizer. Platform pieces (the
//! audio element, timers, segment loaders, decode contexts and the drawing
//! surface) are reached through small host traits, so the whole player runs
//! headless as well as behind a browser binding.

pub mod analysis;
pub mod audio;
pub mod config;
pub mod error;
pub mod metadata;
pub mod platform;
pub mod playback;
pub mod reconnect;
pub mod render;
pub mod sink;
pub mod source;
pub mod timer;

pub use analysis::SpectrumAnalyser;
pub use audio::{
    AudioGraphEntry, AudioGraphRegistry, ContextState, DecodeBackend, DecodeContext, GraphHandle,
    PcmTap, SoftwareDecodeBackend,
};
pub use config::{
    AnalyserConfig, LoaderConfig, PlaybackConfig, PlayerConfig, ReconnectConfig, VisualizerConfig,
};
pub use error::{PlayerError, Result};
pub use metadata::{NowPlaying, TrackMetadata};
pub use platform::{Capabilities, FeatureFlags};
pub use playback::{
    LoadOutcome, PlaybackController, PlaybackState, PlaybackStatus, StreamEndpoint, StreamMode,
};
pub use reconnect::{Effect, ReconnectState, ReconnectionPolicy};
pub use render::{CommandSurface, FrameOutcome, SpectrumRenderer, Surface};
pub use sink::{MediaSink, MemorySink, SinkEvent, SinkIdentity};
pub use source::{Fault, LoaderEvent, SegmentLoader, StreamSourceAdapter};
pub use timer::{ManualTimers, TimerHost, TimerToken};
