//! Spectrum visualizer.
//!
//! The renderer is a read-only consumer of the decode graph: it looks graphs
//! up, never builds or resumes them. Each call to [`SpectrumRenderer::render_frame`]
//! is one animation frame; hosts keep calling it while
//! [`FrameOutcome::should_continue`] holds.

mod bars;
mod pulse;
mod surface;

pub use bars::{
    bar_height, bucket_index, canvas_extent, floor_value, mirrored_index, proportion, smooth, target_level,
    BarGeometry, BarState,
};
pub use pulse::BassPulse;
pub use surface::{
    Backdrop, CommandSurface, DrawCommand, GradientStop, Paint, Rect, Rgba, Ring, Surface,
};

use serde::Serialize;

use crate::audio::{AudioGraphRegistry, ContextState, GraphHandle};
use crate::config::VisualizerConfig;
use crate::sink::SinkIdentity;

const BAR_GRADIENT: [GradientStop; 3] = [
    GradientStop {
        offset: 0.0,
        color: Rgba::new(64, 169, 255, 0.0),
    },
    GradientStop {
        offset: 0.4,
        color: Rgba::new(120, 200, 255, 0.4),
    },
    GradientStop {
        offset: 1.0,
        color: Rgba::new(194, 163, 255, 0.9),
    },
];

const CAP_COLOR: Rgba = Rgba::new(255, 255, 255, 0.95);

/// Why a frame showed only the backdrop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FallbackReason {
    /// No graph exists for the sink yet; playback has not started.
    NoGraph,
    Suspended,
    /// The graph could not be sampled this frame.
    Unavailable,
}

/// Result of one animation frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FrameOutcome {
    /// The visualizer is closed; stop scheduling frames.
    Closed,
    Fallback(FallbackReason),
    Drawn,
}

impl FrameOutcome {
    /// Whether the host should schedule another frame.
    pub fn should_continue(self) -> bool {
        !matches!(self, FrameOutcome::Closed)
    }
}

/// Draws bars, peak caps and the bass ring for one sink's graph.
#[derive(Debug, Clone)]
pub struct SpectrumRenderer {
    config: VisualizerConfig,
    bars: BarState,
    pulse: BassPulse,
    spectrum: Vec<u8>,
    backdrop: Option<String>,
    open: bool,
}

impl SpectrumRenderer {
    pub fn new(config: VisualizerConfig) -> Self {
        Self {
            pulse: BassPulse::new(&config),
            bars: BarState::new(),
            spectrum: Vec::new(),
            backdrop: None,
            open: false,
            config,
        }
    }

    pub fn config(&self) -> &VisualizerConfig {
        &self.config
    }

    /// Per-bar levels and caps after the last drawn frame.
    pub fn bars(&self) -> &BarState {
        &self.bars
    }

    pub fn zoom(&self) -> f32 {
        self.pulse.zoom()
    }

    /// Whether frames are being drawn.
    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Starts drawing over `backdrop_url`, resetting the zoom spring. Bar
    /// levels survive a close and reopen.
    pub fn open(&mut self, backdrop_url: Option<String>) {
        self.backdrop = backdrop_url;
        self.pulse.reset(&self.config);
        self.open = true;
        tracing::debug!(bars = self.config.bar_count, "visualizer opened");
    }

    /// Stops drawing. The graph and its sink are left untouched.
    pub fn close(&mut self) {
        self.open = false;
        tracing::debug!("visualizer closed");
    }

    pub fn set_backdrop(&mut self, url: Option<String>) {
        self.backdrop = url;
    }

    /// Takes effect on the next frame, which reseeds the bars.
    pub fn set_bar_count(&mut self, count: usize) {
        self.config.bar_count = count.max(1);
    }

    /// Renders one frame for `sink`, looking its graph up without creating it.
    pub fn frame(
        &mut self,
        registry: &AudioGraphRegistry,
        sink: &SinkIdentity,
        surface: &mut dyn Surface,
    ) -> FrameOutcome {
        if !self.open {
            return FrameOutcome::Closed;
        }
        let graph = registry.lookup(sink);
        self.render_frame(graph.as_ref(), surface)
    }

    /// Renders one frame from an already resolved graph. Falls back to the
    /// backdrop alone when there is no running graph to sample.
    pub fn render_frame(&mut self, graph: Option<&GraphHandle>, surface: &mut dyn Surface) -> FrameOutcome {
        if !self.open {
            return FrameOutcome::Closed;
        }

        let sampled = match graph {
            None => Err(FallbackReason::NoGraph),
            Some(graph) => self.sample(graph),
        };
        if let Err(reason) = sampled {
            surface.set_backdrop(&Backdrop {
                url: self.backdrop.clone(),
                zoom: self.config.base_zoom,
            });
            return FrameOutcome::Fallback(reason);
        }

        let (width, height) = surface.size();
        let (width, height) = (canvas_extent(width), canvas_extent(height));
        self.bars.ensure(self.config.bar_count, height, &self.config);

        surface.fill_rect(
            Rect {
                x: 0.0,
                y: 0.0,
                width,
                height,
            },
            Paint::Solid(Rgba::new(8, 12, 26, self.config.trail_alpha)),
        );

        for bar in 0..self.bars.len() {
            let geometry = self.bars.advance(bar, &self.spectrum, (width, height), &self.config);
            draw_bar(surface, &geometry, height);
        }

        let bass = BassPulse::bass_level(&self.spectrum, &self.config);
        surface.stroke_ring(BassPulse::ring(bass, (width, height), &self.config));
        let zoom = self.pulse.step(bass, &self.config);
        surface.set_backdrop(&Backdrop {
            url: self.backdrop.clone(),
            zoom,
        });
        FrameOutcome::Drawn
    }

    /// Copies the latest spectrum out of the graph; the lock is released before
    /// anything is drawn.
    fn sample(&mut self, graph: &GraphHandle) -> std::result::Result<(), FallbackReason> {
        let mut entry = graph.lock().map_err(|_| FallbackReason::Unavailable)?;
        if entry.context_state() != ContextState::Running {
            return Err(FallbackReason::Suspended);
        }
        match entry.sample_frequencies() {
            Ok(bytes) => {
                self.spectrum.clear();
                self.spectrum.extend_from_slice(bytes);
                Ok(())
            }
            Err(err) => {
                tracing::debug!(%err, "unable to sample spectrum");
                Err(FallbackReason::Unavailable)
            }
        }
    }
}

fn draw_bar(surface: &mut dyn Surface, geometry: &BarGeometry, canvas_height: f32) {
    let slot = geometry.slot_width;
    surface.fill_rect(
        Rect {
            x: geometry.x + slot * 0.3,
            y: geometry.top,
            width: slot * 0.4,
            height: geometry.height,
        },
        Paint::Vertical {
            from_y: canvas_height,
            to_y: geometry.top,
            stops: &BAR_GRADIENT,
        },
    );
    surface.fill_rect(
        Rect {
            x: geometry.x + slot * 0.28,
            y: (geometry.peak_y - geometry.cap_height).max(0.0),
            width: slot * 0.44,
            height: geometry.cap_height,
        },
        Paint::Solid(CAP_COLOR),
    );
}
