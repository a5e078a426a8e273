//! Stream source selection and fault classification.
//!
//! [`StreamSourceAdapter`] hides whether an endpoint is assigned straight to
//! the sink (progressive live streams, or segmented streams the platform plays
//! natively) or fed through a host-provided [`SegmentLoader`]. It is also the
//! boundary where every raw sink or loader error is translated into one of the
//! five [`Fault`] kinds; nothing downstream sees platform errors.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::LoaderConfig;
use crate::platform::Capabilities;
use crate::playback::{StreamEndpoint, StreamMode};
use crate::sink::{MediaErrorCode, MediaSink, PlayRejection, SinkFault, SinkIdentity};

/// Error taxonomy every platform failure is reduced to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Fault {
    /// Resumable by re-requesting data or segments.
    TransientNetwork,
    /// Recoverable in place once; escalates to a rebuild on recurrence.
    MediaDecode,
    /// The loader is gone; the source must be rebuilt from the endpoint.
    FatalLoader,
    /// Playback needs a fresh user gesture; never retried automatically.
    AutoplayRejected,
    /// A caller-cancelled request. Always swallowed.
    Aborted,
}

/// How the current endpoint reaches the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourcePath {
    Progressive,
    NativeSegmented,
    SegmentLoader,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoaderErrorKind {
    Network,
    Media,
    Other,
}

/// Error reported by a segment loader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoaderError {
    pub kind: LoaderErrorKind,
    pub fatal: bool,
    /// The request was cancelled by the caller rather than failing.
    pub aborted: bool,
    pub details: String,
}

impl LoaderError {
    pub fn new(kind: LoaderErrorKind, fatal: bool, details: impl Into<String>) -> Self {
        Self {
            kind,
            fatal,
            aborted: false,
            details: details.into(),
        }
    }

    pub fn aborted(details: impl Into<String>) -> Self {
        Self {
            kind: LoaderErrorKind::Network,
            fatal: false,
            aborted: true,
            details: details.into(),
        }
    }
}

/// Events a segment loader forwards to the controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LoaderEvent {
    ManifestParsed,
    /// Per-segment tags as `(name, value)` pairs, e.g. `("#X-TITLE", "Song")`.
    FragmentTags(Vec<(String, String)>),
    Error(LoaderError),
}

/// Parameters handed to a loader when it is attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoaderSettings {
    pub live_sync_segments: u32,
    pub max_live_sync_segments: u32,
    pub max_buffer_seconds: u32,
}

impl From<&LoaderConfig> for LoaderSettings {
    fn from(config: &LoaderConfig) -> Self {
        Self {
            live_sync_segments: config.live_sync_segments,
            max_live_sync_segments: config.max_live_sync_segments,
            max_buffer_seconds: config.max_buffer_seconds,
        }
    }
}

/// Host-side segmented-manifest loader bound to one sink.
pub trait SegmentLoader {
    fn attach(&mut self, sink: &SinkIdentity, url: &str, settings: &LoaderSettings);
    /// Resumes fetching from where loading stopped.
    fn start_load(&mut self);
    fn recover_media_error(&mut self);
    fn destroy(&mut self);
}

pub trait LoaderFactory {
    fn create(&mut self) -> Box<dyn SegmentLoader>;
}

pub struct StreamSourceAdapter {
    capabilities: Capabilities,
    settings: LoaderSettings,
    factory: Option<Box<dyn LoaderFactory>>,
    loader: Option<Box<dyn SegmentLoader>>,
    attached: Option<SourcePath>,
}

impl StreamSourceAdapter {
    pub fn new(capabilities: Capabilities, config: &LoaderConfig) -> Self {
        Self {
            capabilities,
            settings: LoaderSettings::from(config),
            factory: None,
            loader: None,
            attached: None,
        }
    }

    pub fn with_loader_factory(mut self, factory: Box<dyn LoaderFactory>) -> Self {
        self.set_loader_factory(factory);
        self
    }

    /// Takes effect on the next attach.
    pub fn set_loader_factory(&mut self, factory: Box<dyn LoaderFactory>) {
        self.factory = Some(factory);
    }

    pub fn attached(&self) -> Option<SourcePath> {
        self.attached
    }

    pub fn has_loader(&self) -> bool {
        self.loader.is_some()
    }

    /// Picks the path for an endpoint from capabilities resolved at
    /// construction.
    pub fn select_path(&self, endpoint: &StreamEndpoint) -> SourcePath {
        match endpoint.mode() {
            StreamMode::Live => SourcePath::Progressive,
            StreamMode::Buffered if self.capabilities.native_segmented => {
                SourcePath::NativeSegmented
            }
            StreamMode::Buffered if self.capabilities.segment_loader && self.factory.is_some() => {
                SourcePath::SegmentLoader
            }
            StreamMode::Buffered => {
                tracing::warn!(
                    url = endpoint.url(),
                    "no segmented playback support, handing manifest to the sink"
                );
                SourcePath::NativeSegmented
            }
        }
    }

    /// Primes the sink with `endpoint` without starting playback.
    pub fn attach<S: MediaSink>(&mut self, sink: &mut S, endpoint: &StreamEndpoint) -> SourcePath {
        self.release(sink);
        let path = self.select_path(endpoint);
        match (path, self.factory.as_mut()) {
            (SourcePath::SegmentLoader, Some(factory)) => {
                let mut loader = factory.create();
                loader.attach(sink.identity(), endpoint.url(), &self.settings);
                self.loader = Some(loader);
            }
            _ => sink.set_source(endpoint.url()),
        }
        tracing::debug!(url = endpoint.url(), ?path, "attached stream source");
        self.attached = Some(path);
        path
    }

    /// Destroys the loader and detaches the sink's source.
    pub fn release<S: MediaSink>(&mut self, sink: &mut S) {
        if self.attached.take().is_none() {
            return;
        }
        if let Some(mut loader) = self.loader.take() {
            loader.destroy();
        }
        sink.clear_source();
    }

    /// Asks the loader to continue fetching. Returns `false` without a loader.
    pub fn resume_loading(&mut self) -> bool {
        match self.loader.as_mut() {
            Some(loader) => {
                loader.start_load();
                true
            }
            None => false,
        }
    }

    pub fn recover_media(&mut self) -> bool {
        match self.loader.as_mut() {
            Some(loader) => {
                loader.recover_media_error();
                true
            }
            None => false,
        }
    }

    /// Translates a loader error. A fatal fault destroys the loader on the
    /// spot; rebuilding is the reconnection policy's call. Non-fatal errors of
    /// unknown kind are ignored.
    pub fn classify_loader_error(&mut self, error: &LoaderError) -> Option<Fault> {
        let fault = classify_loader_error(error)?;
        if fault == Fault::FatalLoader {
            if let Some(mut loader) = self.loader.take() {
                loader.destroy();
            }
        }
        Some(fault)
    }
}

impl fmt::Debug for StreamSourceAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamSourceAdapter")
            .field("capabilities", &self.capabilities)
            .field("settings", &self.settings)
            .field("factory", &self.factory.is_some())
            .field("loader", &self.loader.is_some())
            .field("attached", &self.attached)
            .finish()
    }
}

pub fn classify_loader_error(error: &LoaderError) -> Option<Fault> {
    if error.aborted {
        return Some(Fault::Aborted);
    }
    match (error.kind, error.fatal) {
        (LoaderErrorKind::Network, _) => Some(Fault::TransientNetwork),
        (LoaderErrorKind::Media, _) => Some(Fault::MediaDecode),
        (LoaderErrorKind::Other, true) => Some(Fault::FatalLoader),
        (LoaderErrorKind::Other, false) => None,
    }
}

pub fn classify_sink_fault(fault: &SinkFault) -> Fault {
    match fault.code {
        MediaErrorCode::Aborted => Fault::Aborted,
        MediaErrorCode::Network => Fault::TransientNetwork,
        MediaErrorCode::Decode => Fault::MediaDecode,
        MediaErrorCode::SourceNotSupported => Fault::FatalLoader,
    }
}

pub fn classify_rejection(rejection: PlayRejection) -> Fault {
    match rejection {
        PlayRejection::NotAllowed => Fault::AutoplayRejected,
        PlayRejection::Aborted => Fault::Aborted,
        PlayRejection::NotSupported => Fault::FatalLoader,
        PlayRejection::Other => Fault::TransientNetwork,
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::sink::{MemorySink, SinkCall};

    #[derive(Default)]
    struct Log(Rc<RefCell<Vec<String>>>);

    struct RecordingLoader(Rc<RefCell<Vec<String>>>);

    impl SegmentLoader for RecordingLoader {
        fn attach(&mut self, _sink: &SinkIdentity, url: &str, settings: &LoaderSettings) {
            self.0
                .borrow_mut()
                .push(format!("attach {url} {}", settings.live_sync_segments));
        }
        fn start_load(&mut self) {
            self.0.borrow_mut().push("start_load".into());
        }
        fn recover_media_error(&mut self) {
            self.0.borrow_mut().push("recover".into());
        }
        fn destroy(&mut self) {
            self.0.borrow_mut().push("destroy".into());
        }
    }

    impl LoaderFactory for Log {
        fn create(&mut self) -> Box<dyn SegmentLoader> {
            Box::new(RecordingLoader(self.0.clone()))
        }
    }

    fn loader_adapter() -> (StreamSourceAdapter, Rc<RefCell<Vec<String>>>) {
        let log = Log::default();
        let events = log.0.clone();
        let adapter = StreamSourceAdapter::new(Capabilities::headless(), &LoaderConfig::default())
            .with_loader_factory(Box::new(log));
        (adapter, events)
    }

    #[test]
    fn live_endpoints_go_straight_to_the_sink() {
        let (mut adapter, events) = loader_adapter();
        let mut sink = MemorySink::new();
        let endpoint = StreamEndpoint::new("https://radio.example/live.mp3");

        assert_eq!(adapter.attach(&mut sink, &endpoint), SourcePath::Progressive);
        assert_eq!(sink.source(), Some("https://radio.example/live.mp3"));
        assert!(events.borrow().is_empty());
    }

    #[test]
    fn segmented_endpoints_use_the_loader_without_native_support() {
        let (mut adapter, events) = loader_adapter();
        let mut sink = MemorySink::new();
        let endpoint = StreamEndpoint::new("https://radio.example/index.m3u8");

        assert_eq!(adapter.attach(&mut sink, &endpoint), SourcePath::SegmentLoader);
        assert!(adapter.has_loader());
        assert_eq!(sink.source(), None);
        assert_eq!(
            events.borrow().as_slice(),
            ["attach https://radio.example/index.m3u8 3"]
        );

        adapter.release(&mut sink);
        assert!(!adapter.has_loader());
        assert_eq!(events.borrow().last().map(String::as_str), Some("destroy"));
        assert_eq!(sink.calls().last(), Some(&SinkCall::ClearSource));
    }

    #[test]
    fn native_segmented_support_wins_over_the_loader() {
        let caps = Capabilities {
            native_segmented: true,
            ..Capabilities::headless()
        };
        let adapter = StreamSourceAdapter::new(caps, &LoaderConfig::default());
        let endpoint = StreamEndpoint::new("https://radio.example/index.m3u8");
        assert_eq!(adapter.select_path(&endpoint), SourcePath::NativeSegmented);
    }

    #[test]
    fn fatal_loader_errors_tear_the_loader_down() {
        let (mut adapter, events) = loader_adapter();
        let mut sink = MemorySink::new();
        adapter.attach(&mut sink, &StreamEndpoint::new("https://radio.example/a.m3u8"));

        let fatal = LoaderError::new(LoaderErrorKind::Other, true, "manifest gone");
        assert_eq!(adapter.classify_loader_error(&fatal), Some(Fault::FatalLoader));
        assert!(!adapter.has_loader());
        assert!(events.borrow().iter().any(|e| e == "destroy"));
    }

    #[test]
    fn classifies_every_error_source() {
        assert_eq!(
            classify_loader_error(&LoaderError::aborted("cancelled")),
            Some(Fault::Aborted)
        );
        assert_eq!(
            classify_loader_error(&LoaderError::new(LoaderErrorKind::Network, true, "")),
            Some(Fault::TransientNetwork)
        );
        assert_eq!(
            classify_loader_error(&LoaderError::new(LoaderErrorKind::Media, false, "")),
            Some(Fault::MediaDecode)
        );
        assert_eq!(
            classify_loader_error(&LoaderError::new(LoaderErrorKind::Other, false, "")),
            None
        );
        assert_eq!(
            classify_sink_fault(&SinkFault::new(MediaErrorCode::Aborted, "")),
            Fault::Aborted
        );
        assert_eq!(classify_rejection(PlayRejection::NotAllowed), Fault::AutoplayRejected);
        assert_eq!(classify_rejection(PlayRejection::Other), Fault::TransientNetwork);
    }
}
