use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{PlayerError, Result};

/// Top-level configuration structure for the player.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    pub playback: PlaybackConfig,
    pub reconnect: ReconnectConfig,
    pub loader: LoaderConfig,
    pub analyser: AnalyserConfig,
    pub visualizer: VisualizerConfig,
}

impl PlayerConfig {
    /// Parses a JSON document. Missing sections and fields fall back to defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and validates a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// Rejects values the controller or renderer cannot operate with.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.playback.default_volume) {
            return Err(PlayerError::InvalidInput(
                "default volume must be within [0, 1]",
            ));
        }
        if self.playback.default_volume <= 0.0 {
            return Err(PlayerError::InvalidInput(
                "default volume must be audible so unmuting restores sound",
            ));
        }
        let size = self.analyser.fft_size;
        if !size.is_power_of_two() || !(32..=32_768).contains(&size) {
            return Err(PlayerError::InvalidInput(
                "fft size must be a power of two between 32 and 32768",
            ));
        }
        if !(0.0..=1.0).contains(&self.analyser.smoothing) {
            return Err(PlayerError::InvalidInput(
                "analyser smoothing must be within [0, 1]",
            ));
        }
        if self.analyser.min_decibels >= self.analyser.max_decibels {
            return Err(PlayerError::InvalidInput(
                "analyser min decibels must be below max decibels",
            ));
        }
        if self.loader.live_sync_segments == 0
            || self.loader.live_sync_segments > self.loader.max_live_sync_segments
        {
            return Err(PlayerError::InvalidInput(
                "live sync depth must be between 1 and the max live sync depth",
            ));
        }
        self.visualizer.validate()
    }
}

/// Listener-facing playback defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Initial volume, and the level restored when unmuting from zero.
    pub default_volume: f32,
    /// Artist shown when a stream carries no artist tag.
    pub station_name: String,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            default_volume: 0.7,
            station_name: "Live radio".to_string(),
        }
    }
}

/// Timings used by the reconnection policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    pub live_retry_delay_ms: u64,
    pub buffered_retry_delay_ms: u64,
    /// Delay before re-issuing play on platforms that drop the play state.
    pub buffer_recovery_delay_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            live_retry_delay_ms: 1_000,
            buffered_retry_delay_ms: 1_000,
            buffer_recovery_delay_ms: 1_500,
        }
    }
}

/// Segment loader tuning for segmented streams.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Segments kept between the playhead and the live edge.
    pub live_sync_segments: u32,
    /// Distance from the live edge after which the loader seeks forward.
    pub max_live_sync_segments: u32,
    pub max_buffer_seconds: u32,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            live_sync_segments: 3,
            max_live_sync_segments: 6,
            max_buffer_seconds: 30,
        }
    }
}

/// Analyser node parameters of the decode graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyserConfig {
    pub fft_size: usize,
    pub smoothing: f32,
    pub min_decibels: f32,
    pub max_decibels: f32,
}

impl Default for AnalyserConfig {
    fn default() -> Self {
        Self {
            fft_size: 512,
            smoothing: 0.8,
            min_decibels: -100.0,
            max_decibels: -30.0,
        }
    }
}

/// Bar, peak and pulse constants of the spectrum renderer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisualizerConfig {
    pub bar_count: usize,
    pub trail_alpha: f32,
    /// Share of the previous frame's level kept each frame.
    pub retention: f32,
    pub gamma: f32,
    pub height_scale: f32,
    pub min_bar_height: f32,
    pub bucket_curve: f32,
    pub mirror_span: f32,
    pub raw_weight: f32,
    pub mirror_weight: f32,
    pub floor_base: f32,
    pub floor_tilt: f32,
    pub peak_gravity: f32,
    pub peak_boost: f32,
    pub peak_min_step: f32,
    pub cap_min: f32,
    pub cap_max: f32,
    pub bass_bin: usize,
    pub bass_smoothing: f32,
    pub base_zoom: f32,
    pub zoom_from_bass: f32,
    pub spring_k: f32,
    pub damping: f32,
    pub zoom_min: f32,
    pub zoom_max: f32,
    pub ring_base_radius: f32,
    pub ring_bass_radius: f32,
    pub ring_base_hue: f32,
    pub ring_bass_hue: f32,
}

impl Default for VisualizerConfig {
    fn default() -> Self {
        Self {
            bar_count: 120,
            trail_alpha: 0.08,
            retention: 0.945,
            gamma: 1.3,
            height_scale: 0.75,
            min_bar_height: 4.0,
            bucket_curve: 0.85,
            mirror_span: 0.6,
            raw_weight: 0.55,
            mirror_weight: 0.35,
            floor_base: 0.08,
            floor_tilt: 0.05,
            peak_gravity: 0.45,
            peak_boost: 6.0,
            peak_min_step: 0.8,
            cap_min: 2.0,
            cap_max: 4.0,
            bass_bin: 5,
            bass_smoothing: 0.88,
            base_zoom: 1.035,
            zoom_from_bass: 0.045,
            spring_k: 0.12,
            damping: 0.1,
            zoom_min: 1.02,
            zoom_max: 1.14,
            ring_base_radius: 180.0,
            ring_bass_radius: 140.0,
            ring_base_hue: 210.0,
            ring_bass_hue: 25.0,
        }
    }
}

impl VisualizerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.bar_count == 0 || self.bar_count > 1_024 {
            return Err(PlayerError::InvalidInput(
                "bar count must be between 1 and 1024",
            ));
        }
        if !(0.0..1.0).contains(&self.retention) {
            return Err(PlayerError::InvalidInput("retention must be within [0, 1)"));
        }
        if self.gamma < 1.0 {
            return Err(PlayerError::InvalidInput("bar gamma must be at least 1"));
        }
        if self.peak_gravity <= 0.0 || self.peak_min_step <= 0.0 {
            return Err(PlayerError::InvalidInput(
                "peak gravity and minimum step must be positive",
            ));
        }
        if self.zoom_min > self.zoom_max {
            return Err(PlayerError::InvalidInput("zoom range is inverted"));
        }
        Ok(())
    }
}
