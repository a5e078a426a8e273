//! Bar and peak-cap physics.
//!
//! Canvas coordinates grow downwards: a peak at `canvas_height` sits on the
//! floor, a peak at `0.0` touches the top edge.

use crate::config::VisualizerConfig;

/// Scratch state of one visualizer, mutated in place every frame.
#[derive(Debug, Clone, Default)]
pub struct BarState {
    levels: Vec<f32>,
    peak_y: Vec<f32>,
    peak_velocity: Vec<f32>,
}

/// Where one bar and its cap land on the canvas this frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BarGeometry {
    pub x: f32,
    pub slot_width: f32,
    pub top: f32,
    pub height: f32,
    pub peak_y: f32,
    pub cap_height: f32,
}

impl BarState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Smoothed level of `bar`, `None` past the end.
    pub fn level(&self, bar: usize) -> Option<f32> {
        self.levels.get(bar).copied()
    }

    /// Canvas y of the cap over `bar`.
    pub fn peak(&self, bar: usize) -> Option<f32> {
        self.peak_y.get(bar).copied()
    }

    pub fn peak_velocity(&self, bar: usize) -> Option<f32> {
        self.peak_velocity.get(bar).copied()
    }

    /// Reallocates when the bar count changed, seeding levels to each bar's
    /// floor and resting every cap on the canvas floor. Returns whether a
    /// reallocation happened. Caps are pulled back inside a shrunken canvas.
    pub fn ensure(&mut self, count: usize, canvas_height: f32, config: &VisualizerConfig) -> bool {
        let canvas_height = canvas_extent(canvas_height);
        if self.levels.len() != count {
            self.levels = (0..count)
                .map(|bar| floor_value(proportion(bar, count), config))
                .collect();
            self.peak_y = vec![canvas_height; count];
            self.peak_velocity = vec![0.0; count];
            return true;
        }
        for peak in &mut self.peak_y {
            *peak = peak.clamp(0.0, canvas_height);
        }
        false
    }

    /// Advances bar `bar` by one frame against the latest byte spectrum.
    pub fn advance(
        &mut self,
        bar: usize,
        spectrum: &[u8],
        canvas: (f32, f32),
        config: &VisualizerConfig,
    ) -> BarGeometry {
        let (width, canvas_height) = (canvas_extent(canvas.0), canvas_extent(canvas.1));
        let count = self.levels.len();
        let slot_width = width / count.max(1) as f32;

        let target = target_level(bar, count, spectrum, config);
        let level = smooth(self.levels[bar], target, config.retention);
        self.levels[bar] = level;

        let height = bar_height(level, canvas_height, config);
        let top = (canvas_height - height).max(0.0);
        let peak_y = self.update_peak(bar, top, canvas_height, config);

        BarGeometry {
            x: bar as f32 * slot_width,
            slot_width,
            top,
            height: canvas_height - top,
            peak_y,
            cap_height: (slot_width * 0.25).clamp(config.cap_min, config.cap_max),
        }
    }

    fn update_peak(&mut self, bar: usize, top: f32, canvas_height: f32, config: &VisualizerConfig) -> f32 {
        let current = self.peak_y[bar];
        if top < current - 1.0 {
            self.peak_y[bar] = top.clamp(0.0, canvas_height);
            self.peak_velocity[bar] = config.peak_boost;
        } else {
            let velocity = (self.peak_velocity[bar] - config.peak_gravity).max(config.peak_min_step);
            self.peak_velocity[bar] = velocity;
            self.peak_y[bar] = (current + velocity).clamp(0.0, canvas_height);
        }
        self.peak_y[bar]
    }
}

/// Surface extent usable for layout; negative or non-finite sizes collapse
/// to zero.
pub fn canvas_extent(value: f32) -> f32 {
    if value.is_finite() {
        value.max(0.0)
    } else {
        0.0
    }
}

/// Normalised position of a bar across the spectrum.
pub fn proportion(bar: usize, count: usize) -> f32 {
    bar as f32 / count.saturating_sub(1).max(1) as f32
}

/// Spectrum bin for a bar. The power-curve warp spends more bars on the low
/// and mid range.
pub fn bucket_index(bar: usize, count: usize, bins: usize, curve: f32) -> usize {
    let last = bins.saturating_sub(1);
    let curved = proportion(bar, count).powf(curve);
    ((curved * last as f32).floor() as usize).min(last)
}

/// High-frequency companion bin blended in for visual fullness.
pub fn mirrored_index(bar: usize, count: usize, bins: usize, span: f32) -> usize {
    let last = bins.saturating_sub(1);
    let position = (1.0 - proportion(bar, count) * span).max(0.0);
    ((position * last as f32).floor() as usize).min(last)
}

/// Minimum level of a bar; lower bars sit slightly higher.
pub fn floor_value(proportion: f32, config: &VisualizerConfig) -> f32 {
    config.floor_base + (1.0 - proportion) * config.floor_tilt
}

pub fn target_level(bar: usize, count: usize, spectrum: &[u8], config: &VisualizerConfig) -> f32 {
    let p = proportion(bar, count);
    let floor = floor_value(p, config);
    if spectrum.is_empty() {
        return floor;
    }
    let bins = spectrum.len();
    let raw = f32::from(spectrum[bucket_index(bar, count, bins, config.bucket_curve)]) / 255.0;
    let mirrored = f32::from(spectrum[mirrored_index(bar, count, bins, config.mirror_span)]) / 255.0;
    (raw * config.raw_weight + mirrored * config.mirror_weight + floor).min(1.0)
}

/// Exponential smoothing keeping `retention` of the previous level.
pub fn smooth(previous: f32, target: f32, retention: f32) -> f32 {
    previous * retention + target * (1.0 - retention)
}

/// Pixel height for a smoothed level; the gamma curve exaggerates peaks and
/// flattens the noise floor.
pub fn bar_height(level: f32, canvas_height: f32, config: &VisualizerConfig) -> f32 {
    (canvas_height * level.clamp(0.0, 1.0).powf(config.gamma) * config.height_scale)
        .max(config.min_bar_height)
}
