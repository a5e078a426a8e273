use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use serde::{Deserialize, Serialize};

use crate::analysis::SpectrumAnalyser;
use crate::config::AnalyserConfig;
use crate::sink::{SinkIdentity, SinkToken};
use crate::{PlayerError, Result};

/// Lifecycle of a decode context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContextState {
    Running,
    /// Created or parked without a user gesture; yields no samples.
    Suspended,
    Closed,
}

/// A platform decode context tapping one sink's signal.
pub trait DecodeContext: Send {
    fn state(&self) -> ContextState;
    fn resume(&mut self) -> Result<()>;
    /// Creates the source node for `sink` and routes it through to the
    /// output. Platforms allow this exactly once per sink.
    fn connect_source(&mut self, sink: &SinkIdentity) -> Result<()>;
    /// Appends the samples the source produced since the last call.
    fn drain_samples(&mut self, out: &mut Vec<f32>);
}

/// Constructs decode contexts; resolved from platform capabilities.
pub trait DecodeBackend {
    fn create_context(&self) -> Result<Box<dyn DecodeContext>>;
}

/// Decode graph bound to one sink: context, source, analyser and the frequency
/// buffer readers sample into.
pub struct AudioGraphEntry {
    context: Box<dyn DecodeContext>,
    source: u64,
    analyser: SpectrumAnalyser,
    frequency: Vec<u8>,
    scratch: Vec<f32>,
}

impl AudioGraphEntry {
    pub fn context_state(&self) -> ContextState {
        self.context.state()
    }

    /// Id of the sink the source node was created for.
    pub fn source_sink(&self) -> u64 {
        self.source
    }

    pub fn frequency_bin_count(&self) -> usize {
        self.frequency.len()
    }

    /// Pulls fresh samples through the analyser and returns the latest byte
    /// spectrum.
    pub fn sample_frequencies(&mut self) -> Result<&[u8]> {
        self.scratch.clear();
        self.context.drain_samples(&mut self.scratch);
        self.analyser.push_samples(&self.scratch);
        self.analyser.byte_frequency_data(&mut self.frequency)?;
        Ok(&self.frequency)
    }
}

impl std::fmt::Debug for AudioGraphEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioGraphEntry")
            .field("state", &self.context.state())
            .field("source", &self.source)
            .field("analyser", &self.analyser)
            .finish()
    }
}

pub type GraphHandle = Arc<Mutex<AudioGraphEntry>>;

struct Slot {
    owner: Weak<SinkToken>,
    entry: GraphHandle,
}

/// One decode graph per sink, created at most once and dropped once the sink
/// is gone.
///
/// Clones share the same table. Construction happens under the table lock so
/// two callers can never both build a source for the same sink.
#[derive(Clone, Default)]
pub struct AudioGraphRegistry {
    entries: Arc<Mutex<HashMap<u64, Slot>>>,
}

impl AudioGraphRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the sink's graph, building it on first use. Only the playback
    /// side calls this, in response to a listener gesture.
    pub fn get_or_create(
        &self,
        sink: &SinkIdentity,
        backend: &dyn DecodeBackend,
        analyser: &AnalyserConfig,
    ) -> Result<GraphHandle> {
        let mut entries = self.lock()?;
        prune_dead(&mut entries);

        if let Some(slot) = entries.get(&sink.id()) {
            if sink.is(&slot.owner) {
                return Ok(slot.entry.clone());
            }
        }

        let mut context = backend.create_context()?;
        context.connect_source(sink)?;
        let analyser = SpectrumAnalyser::new(analyser.clone())?;
        let entry = AudioGraphEntry {
            frequency: vec![0; analyser.frequency_bin_count()],
            scratch: Vec::with_capacity(analyser.fft_size()),
            source: sink.id(),
            analyser,
            context,
        };
        let handle = Arc::new(Mutex::new(entry));
        entries.insert(
            sink.id(),
            Slot {
                owner: sink.downgrade(),
                entry: handle.clone(),
            },
        );
        tracing::debug!(sink = sink.id(), "created decode graph");
        Ok(handle)
    }

    /// Existing graph for the sink, never creating one. Graphs of discarded
    /// sinks are dropped on the way.
    pub fn lookup(&self, sink: &SinkIdentity) -> Option<GraphHandle> {
        let mut entries = self.lock().ok()?;
        prune_dead(&mut entries);
        entries
            .get(&sink.id())
            .filter(|slot| sink.is(&slot.owner))
            .map(|slot| slot.entry.clone())
    }

    /// Drops graphs whose sink has been discarded. Returns how many went.
    pub fn prune(&self) -> Result<usize> {
        let mut entries = self.lock()?;
        Ok(prune_dead(&mut entries))
    }

    pub fn len(&self) -> usize {
        self.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resumes a suspended context. A failed resume is not fatal: the graph
    /// simply yields no visualization until a later resume succeeds.
    pub fn resume_if_suspended(entry: &GraphHandle) -> bool {
        let mut guard = match entry.lock() {
            Ok(guard) => guard,
            Err(_) => {
                tracing::warn!("audio graph has been poisoned");
                return false;
            }
        };
        match guard.context.state() {
            ContextState::Running => true,
            ContextState::Closed => false,
            ContextState::Suspended => match guard.context.resume() {
                Ok(()) => guard.context.state() == ContextState::Running,
                Err(err) => {
                    tracing::warn!(%err, "unable to resume decode context");
                    false
                }
            },
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<u64, Slot>>> {
        self.entries
            .lock()
            .map_err(|_| PlayerError::msg("audio graph registry has been poisoned"))
    }
}

impl std::fmt::Debug for AudioGraphRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioGraphRegistry")
            .field("entries", &self.len())
            .finish()
    }
}

fn prune_dead(entries: &mut HashMap<u64, Slot>) -> usize {
    let before = entries.len();
    entries.retain(|_, slot| slot.owner.strong_count() > 0);
    before - entries.len()
}

/// PCM feed shared between a host's decoder and the contexts it backs.
#[derive(Debug, Clone)]
pub struct PcmTap {
    buffer: Arc<Mutex<VecDeque<f32>>>,
    capacity: usize,
}

impl PcmTap {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    /// Queues decoded samples, discarding the oldest beyond capacity.
    pub fn push(&self, samples: &[f32]) {
        if let Ok(mut buffer) = self.buffer.lock() {
            buffer.extend(samples.iter().copied());
            let overflow = buffer.len().saturating_sub(self.capacity);
            buffer.drain(..overflow);
        }
    }

    fn drain_into(&self, out: &mut Vec<f32>) {
        if let Ok(mut buffer) = self.buffer.lock() {
            out.extend(buffer.drain(..));
        }
    }
}

/// Decode backend for hosts that decode audio themselves and push PCM
/// through a [`PcmTap`].
#[derive(Debug, Clone)]
pub struct SoftwareDecodeBackend {
    tap: PcmTap,
    start_suspended: bool,
    fail_resume: bool,
}

impl SoftwareDecodeBackend {
    /// Contexts start suspended, as they do without a user gesture.
    pub fn new(tap: PcmTap) -> Self {
        Self {
            tap,
            start_suspended: true,
            fail_resume: false,
        }
    }

    pub fn start_running(mut self) -> Self {
        self.start_suspended = false;
        self
    }

    /// Makes every resume attempt fail, e.g. for a host without audio output.
    pub fn refuse_resume(mut self) -> Self {
        self.fail_resume = true;
        self
    }
}

impl DecodeBackend for SoftwareDecodeBackend {
    fn create_context(&self) -> Result<Box<dyn DecodeContext>> {
        Ok(Box::new(SoftwareDecodeContext {
            tap: self.tap.clone(),
            state: if self.start_suspended {
                ContextState::Suspended
            } else {
                ContextState::Running
            },
            fail_resume: self.fail_resume,
            source: None,
        }))
    }
}

#[derive(Debug)]
struct SoftwareDecodeContext {
    tap: PcmTap,
    state: ContextState,
    fail_resume: bool,
    source: Option<u64>,
}

impl DecodeContext for SoftwareDecodeContext {
    fn state(&self) -> ContextState {
        self.state
    }

    fn resume(&mut self) -> Result<()> {
        match self.state {
            ContextState::Closed => Err(PlayerError::ContextClosed),
            _ if self.fail_resume => Err(PlayerError::msg("resume refused by output device")),
            _ => {
                self.state = ContextState::Running;
                Ok(())
            }
        }
    }

    fn connect_source(&mut self, sink: &SinkIdentity) -> Result<()> {
        if let Some(existing) = self.source {
            return Err(PlayerError::DuplicateSource(existing));
        }
        self.source = Some(sink.id());
        Ok(())
    }

    fn drain_samples(&mut self, out: &mut Vec<f32>) {
        if self.state == ContextState::Running {
            self.tap.drain_into(out);
        }
    }
}
