//! Playback controller.
//!
//! Owns the sink, the current endpoint and the observable [`PlaybackState`].
//! Hosts forward sink callbacks, loader events and elapsed timers; the
//! controller runs them through the reconnection policy and carries out the
//! resulting effects. Everything happens on the caller's thread, one event at
//! a time.

mod state;

pub use state::{PlaybackState, PlaybackStatus, StreamEndpoint, StreamMode};

use std::fmt;

use serde::Serialize;

use crate::audio::{AudioGraphRegistry, DecodeBackend, GraphHandle};
use crate::config::PlayerConfig;
use crate::metadata::TrackMetadata;
use crate::platform::Capabilities;
use crate::reconnect::{Effect, PolicyContext, ReconnectionPolicy};
use crate::sink::{MediaSink, SinkEvent};
use crate::source::{
    classify_rejection, classify_sink_fault, Fault, LoaderEvent, LoaderFactory, StreamSourceAdapter,
};
use crate::timer::{TimerHost, TimerToken};
use crate::Result;

/// What [`PlaybackController::load_streams`] did with a candidate list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LoadOutcome {
    /// Same list as last time, or the primary stream is already targeted.
    Unchanged,
    /// The sink is busy playing; the list is remembered but not applied.
    Deferred,
    /// The first stream was attached and awaits `play()`.
    Primed,
    /// No candidates; nothing changed.
    Empty,
}

/// Listener for newly seen track metadata.
pub type MetadataHook = Box<dyn FnMut(&TrackMetadata)>;

/// Drives one media sink through a live session: source selection, play and
/// stop, volume, and recovery from faults.
///
/// Every entry point runs to completion on the caller's thread. Sink events
/// and timer firings are fed back in through [`Self::handle_sink_event`] and
/// [`Self::handle_timer`].
pub struct PlaybackController<S: MediaSink, T: TimerHost> {
    config: PlayerConfig,
    capabilities: Capabilities,
    sink: S,
    timers: T,
    adapter: StreamSourceAdapter,
    policy: ReconnectionPolicy,
    registry: AudioGraphRegistry,
    decode: Option<Box<dyn DecodeBackend>>,
    endpoint: Option<StreamEndpoint>,
    streams: Vec<String>,
    state: PlaybackState,
    restore_volume: f32,
    metadata_hook: Option<MetadataHook>,
    last_metadata: Option<String>,
    /// Set by `play()`, cleared by `stop()` or a policy rejection. Sink events
    /// outside a session are ignored.
    session: bool,
}

impl<S: MediaSink, T: TimerHost> PlaybackController<S, T> {
    /// Validates `config` and applies the default volume to the sink.
    pub fn new(config: PlayerConfig, capabilities: Capabilities, mut sink: S, timers: T) -> Result<Self> {
        config.validate()?;
        let volume = config.playback.default_volume;
        sink.set_volume(volume);
        Ok(Self {
            adapter: StreamSourceAdapter::new(capabilities, &config.loader),
            policy: ReconnectionPolicy::new(config.reconnect.clone(), capabilities),
            registry: AudioGraphRegistry::new(),
            decode: None,
            endpoint: None,
            streams: Vec::new(),
            state: PlaybackState::new(volume),
            restore_volume: volume,
            metadata_hook: None,
            last_metadata: None,
            session: false,
            capabilities,
            config,
            sink,
            timers,
        })
    }

    pub fn with_loader_factory(mut self, factory: Box<dyn LoaderFactory>) -> Self {
        self.adapter.set_loader_factory(factory);
        self
    }

    pub fn with_decode_backend(mut self, backend: Box<dyn DecodeBackend>) -> Self {
        self.decode = Some(backend);
        self
    }

    /// Shares an existing registry, e.g. one the visualizer already holds.
    pub fn with_registry(mut self, registry: AudioGraphRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Called with each newly seen metadata record from segment tags.
    pub fn on_metadata(mut self, hook: impl FnMut(&TrackMetadata) + 'static) -> Self {
        self.metadata_hook = Some(Box::new(hook));
        self
    }

    /// Snapshot of what the UI should show.
    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.config
    }

    /// Stream currently targeted by the sink, if any.
    pub fn endpoint(&self) -> Option<&StreamEndpoint> {
        self.endpoint.as_ref()
    }

    /// Recovery bookkeeping, mostly of interest to tests and diagnostics.
    pub fn policy(&self) -> &ReconnectionPolicy {
        &self.policy
    }

    /// Registry shared with any visualizer reading this sink.
    pub fn registry(&self) -> &AudioGraphRegistry {
        &self.registry
    }

    /// The sink's decode graph, if playback has built one.
    pub fn graph(&self) -> Option<GraphHandle> {
        self.registry.lookup(self.sink.identity())
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Direct sink access. Calls made here bypass the controller's state.
    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn timers(&self) -> &T {
        &self.timers
    }

    /// Lets a host drive its timer queue, e.g. advancing a manual clock.
    pub fn timers_mut(&mut self) -> &mut T {
        &mut self.timers
    }

    /// Applies a refreshed candidate list. The first URL is primary.
    ///
    /// Lists are refreshed periodically, so an identical list, one whose
    /// primary is already targeted, or any list arriving while the sink plays
    /// leaves the session alone.
    pub fn load_streams<U: AsRef<str>>(&mut self, urls: &[U]) -> LoadOutcome {
        let urls: Vec<&str> = urls.iter().map(|url| url.as_ref()).collect();
        if self.streams == urls {
            return LoadOutcome::Unchanged;
        }
        self.streams = urls.iter().map(|url| url.to_string()).collect();

        let Some(primary) = self.streams.first().cloned() else {
            return LoadOutcome::Empty;
        };
        if self.endpoint.as_ref().map(StreamEndpoint::url) == Some(primary.as_str()) {
            return LoadOutcome::Unchanged;
        }
        if !self.sink.is_paused() {
            tracing::debug!(url = %primary, "sink busy, deferring stream switch");
            return LoadOutcome::Deferred;
        }

        self.end_session();
        let endpoint = StreamEndpoint::new(primary);
        self.adapter.attach(&mut self.sink, &endpoint);
        tracing::info!(url = endpoint.url(), mode = ?endpoint.mode(), "primed stream");
        self.endpoint = Some(endpoint);
        self.state.status = PlaybackStatus::Idle;
        self.last_metadata = None;
        LoadOutcome::Primed
    }

    /// Starts a listener-initiated session. No-op while playing or before a
    /// stream is primed.
    pub fn play(&mut self) {
        if self.state.is_playing() {
            return;
        }
        let Some(endpoint) = self.endpoint.clone() else {
            tracing::debug!("play requested without a stream");
            return;
        };
        if self.adapter.attached().is_none() {
            self.adapter.attach(&mut self.sink, &endpoint);
        }

        tracing::info!(url = endpoint.url(), "play");
        self.state.status = PlaybackStatus::Buffering;
        let effects = self.policy.enable();
        self.apply_effects(effects);
        self.session = true;
        self.ensure_graph();

        if let Err(rejection) = self.sink.play() {
            match classify_rejection(rejection) {
                Fault::Aborted => tracing::trace!("play request aborted"),
                fault => {
                    tracing::info!(?fault, "play rejected");
                    let effects = self.policy.disable();
                    self.apply_effects(effects);
                    self.session = false;
                    self.state.status = if fault == Fault::AutoplayRejected {
                        PlaybackStatus::Idle
                    } else {
                        PlaybackStatus::Error
                    };
                }
            }
        }
    }

    /// Ends the session: disarms reconnection before pausing so the pause
    /// cannot trigger a retry, then releases the source. The decode graph is
    /// kept for the visualizer.
    pub fn stop(&mut self) {
        if !self.session && self.state.status == PlaybackStatus::Idle {
            return;
        }
        tracing::info!("stop");
        self.end_session();
        self.state.status = PlaybackStatus::Idle;
    }

    /// Stops an active session, starts one otherwise.
    pub fn toggle_play(&mut self) {
        if self.session {
            self.stop();
        } else {
            self.play();
        }
    }

    /// Sets the output volume, clamped to `[0, 1]`.
    pub fn set_volume(&mut self, volume: f32) {
        if volume.is_nan() {
            return;
        }
        let volume = volume.clamp(0.0, 1.0);
        self.sink.set_volume(volume);
        self.state.volume = volume;
        if volume > 0.0 {
            self.restore_volume = volume;
        }
    }

    /// Muting shows a zero volume; unmuting brings back the last audible one.
    pub fn toggle_mute(&mut self) {
        let muted = !self.state.muted;
        self.sink.set_muted(muted);
        self.state.muted = muted;
        if muted {
            if self.state.volume > 0.0 {
                self.restore_volume = self.state.volume;
            }
            self.state.volume = 0.0;
        } else {
            self.state.volume = if self.restore_volume > 0.0 {
                self.restore_volume
            } else {
                self.config.playback.default_volume
            };
        }
    }

    pub fn handle_sink_event(&mut self, event: SinkEvent) {
        if !self.session {
            tracing::trace!(?event, "ignoring sink event outside a session");
            return;
        }
        if let SinkEvent::Error(fault) = &event {
            let kind = classify_sink_fault(fault);
            if kind == Fault::Aborted {
                tracing::trace!("sink request aborted");
                return;
            }
            tracing::debug!(?kind, "sink error");
        }

        let context = self.policy_context();
        let effects = self.policy.on_sink_event(&event, context);
        let status = self
            .state
            .status
            .on_sink_event(&event, self.policy.auto_reconnect());
        if status != self.state.status {
            tracing::debug!(from = ?self.state.status, to = ?status, ?event, "status");
            self.state.status = status;
        }
        self.apply_effects(effects);
    }

    pub fn handle_loader_event(&mut self, event: LoaderEvent) {
        match event {
            LoaderEvent::ManifestParsed => tracing::debug!("manifest parsed"),
            LoaderEvent::FragmentTags(tags) => self.deliver_metadata(&tags),
            LoaderEvent::Error(error) => {
                let Some(fault) = self.adapter.classify_loader_error(&error) else {
                    tracing::debug!(details = %error.details, "ignoring non-fatal loader error");
                    return;
                };
                if fault == Fault::Aborted {
                    tracing::trace!("loader request aborted");
                    return;
                }
                if !self.session {
                    return;
                }
                tracing::debug!(?fault, details = %error.details, "loader error");
                let context = self.policy_context();
                let effects = self.policy.on_fault(fault, context);
                self.apply_effects(effects);
            }
        }
    }

    /// Hands back a token the timer host scheduled. Stale tokens are ignored.
    pub fn handle_timer(&mut self, token: TimerToken) {
        let context = self.policy_context();
        let effects = self.policy.on_timer(token, context);
        self.apply_effects(effects);
    }

    fn end_session(&mut self) {
        let effects = self.policy.disable();
        self.apply_effects(effects);
        let was_active = self.session;
        self.session = false;
        if was_active || !self.sink.is_paused() {
            self.sink.pause();
        }
        self.adapter.release(&mut self.sink);
    }

    fn policy_context(&self) -> PolicyContext {
        PolicyContext {
            mode: self
                .endpoint
                .as_ref()
                .map(StreamEndpoint::mode)
                .unwrap_or(StreamMode::Live),
            loader_active: self.adapter.has_loader(),
            sink_paused: self.sink.is_paused(),
            intends_to_play: self.session,
        }
    }

    fn apply_effects(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            tracing::trace!(?effect, "apply");
            match effect {
                Effect::Schedule { token, delay } => self.timers.schedule(token, delay),
                Effect::Cancel(token) => self.timers.cancel(token),
                Effect::MarkBuffering => {
                    if self.session {
                        self.state.status = PlaybackStatus::Buffering;
                    }
                }
                Effect::Reconnect => self.reconnect(),
                Effect::ResumeLoader => {
                    if !self.adapter.resume_loading() {
                        tracing::debug!("no loader to resume");
                    }
                }
                Effect::RecoverMedia => {
                    if !self.adapter.recover_media() {
                        tracing::debug!("no loader to recover");
                    }
                }
                Effect::ReplaySink => self.play_sink(),
            }
        }
    }

    fn reconnect(&mut self) {
        let Some(endpoint) = self.endpoint.clone() else {
            return;
        };
        tracing::info!(url = endpoint.url(), attempts = self.policy.attempts(), "reconnecting");
        self.adapter.attach(&mut self.sink, &endpoint);
        self.state.status = PlaybackStatus::Buffering;
        self.play_sink();
    }

    /// `play()` on behalf of the policy. Only an autoplay rejection ends the
    /// session; anything else goes back through the policy.
    fn play_sink(&mut self) {
        let Err(rejection) = self.sink.play() else {
            return;
        };
        let fault = classify_rejection(rejection);
        if fault == Fault::Aborted {
            tracing::trace!("play request aborted");
            return;
        }
        let context = self.policy_context();
        let effects = self.policy.on_fault(fault, context);
        if fault == Fault::AutoplayRejected {
            self.session = false;
            self.state.status = PlaybackStatus::Idle;
        }
        self.apply_effects(effects);
    }

    /// Builds the decode graph on the first listener-initiated play and
    /// resumes it. Failures only cost the visualization.
    fn ensure_graph(&mut self) {
        let Some(backend) = self.decode.as_deref() else {
            return;
        };
        if !self.capabilities.decode_context {
            tracing::debug!("platform has no decode context");
            return;
        }
        match self
            .registry
            .get_or_create(self.sink.identity(), backend, &self.config.analyser)
        {
            Ok(graph) => {
                if !AudioGraphRegistry::resume_if_suspended(&graph) {
                    tracing::debug!("decode graph still suspended");
                }
            }
            Err(err) => tracing::warn!(%err, "unable to build decode graph"),
        }
    }

    fn deliver_metadata(&mut self, tags: &[(String, String)]) {
        let Some(metadata) = TrackMetadata::from_tag_list(tags) else {
            return;
        };
        let identity = metadata.identity();
        if self.last_metadata.as_deref() == Some(identity.as_str()) {
            return;
        }
        tracing::debug!(%identity, "track metadata");
        self.last_metadata = Some(identity);
        if let Some(hook) = self.metadata_hook.as_mut() {
            hook(&metadata);
        }
    }
}

impl<S: MediaSink, T: TimerHost> Drop for PlaybackController<S, T> {
    fn drop(&mut self) {
        for effect in self.policy.disable() {
            if let Effect::Cancel(token) = effect {
                self.timers.cancel(token);
            }
        }
    }
}

impl<S: MediaSink, T: TimerHost> fmt::Debug for PlaybackController<S, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaybackController")
            .field("state", &self.state)
            .field("endpoint", &self.endpoint)
            .field("session", &self.session)
            .field("policy", self.policy.state())
            .field("adapter", &self.adapter)
            .finish()
    }
}
