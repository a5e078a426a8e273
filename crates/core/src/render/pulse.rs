//! Bass response: the glow ring and the backdrop zoom spring.

use crate::config::VisualizerConfig;

use super::surface::Ring;

/// Bass-driven glow ring and the spring that makes the backdrop breathe.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BassPulse {
    zoom: f32,
    velocity: f32,
    bass_smooth: f32,
}

impl BassPulse {
    pub fn new(config: &VisualizerConfig) -> Self {
        Self {
            zoom: config.base_zoom,
            velocity: 0.0,
            bass_smooth: 0.0,
        }
    }

    /// Current backdrop zoom factor.
    pub fn zoom(&self) -> f32 {
        self.zoom
    }

    /// Level of the single bass bin in `[0, 1]`.
    pub fn bass_level(spectrum: &[u8], config: &VisualizerConfig) -> f32 {
        match spectrum.len() {
            0 => 0.0,
            len => f32::from(spectrum[config.bass_bin.min(len - 1)]) / 255.0,
        }
    }

    /// Glow ring centred on the canvas, growing and warming with the bass.
    pub fn ring(bass: f32, canvas: (f32, f32), config: &VisualizerConfig) -> Ring {
        Ring {
            center_x: canvas.0 / 2.0,
            center_y: canvas.1 / 2.0,
            radius: config.ring_base_radius + bass * config.ring_bass_radius,
            hue: config.ring_base_hue + bass * config.ring_bass_hue,
            alpha: 0.15,
            line_width: 1.5,
            glow: 30.0,
        }
    }

    /// Advances the damped spring towards the zoom the smoothed bass asks for.
    pub fn step(&mut self, bass: f32, config: &VisualizerConfig) -> f32 {
        let keep = config.bass_smoothing;
        self.bass_smooth = self.bass_smooth * keep + bass * (1.0 - keep);
        let target = config.base_zoom + self.bass_smooth * config.zoom_from_bass;
        let accel = (target - self.zoom) * config.spring_k - self.velocity * config.damping;
        self.velocity += accel;
        self.zoom = (self.zoom + self.velocity).clamp(config.zoom_min, config.zoom_max);
        self.zoom
    }

    pub fn reset(&mut self, config: &VisualizerConfig) {
        *self = Self::new(config);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zoom_settles_on_the_bass_target() {
        let config = VisualizerConfig::default();
        let mut pulse = BassPulse::new(&config);
        for _ in 0..600 {
            pulse.step(1.0, &config);
        }
        let expected = config.base_zoom + config.zoom_from_bass;
        assert!((pulse.zoom() - expected).abs() < 1e-3);
    }

    #[test]
    fn zoom_stays_within_bounds_under_jitter() {
        let config = VisualizerConfig::default();
        let mut pulse = BassPulse::new(&config);
        for frame in 0..500 {
            let bass = if frame % 2 == 0 { 1.0 } else { 0.0 };
            let zoom = pulse.step(bass, &config);
            assert!((config.zoom_min..=config.zoom_max).contains(&zoom));
        }
    }

    #[test]
    fn ring_grows_with_bass() {
        let config = VisualizerConfig::default();
        let quiet = BassPulse::ring(0.0, (800.0, 600.0), &config);
        let loud = BassPulse::ring(1.0, (800.0, 600.0), &config);
        assert_eq!(quiet.radius, 180.0);
        assert_eq!(loud.radius, 320.0);
        assert_eq!(loud.hue, 235.0);
        assert_eq!((loud.center_x, loud.center_y), (400.0, 300.0));
    }

    #[test]
    fn bass_bin_is_clamped_to_short_spectra() {
        let config = VisualizerConfig::default();
        assert_eq!(BassPulse::bass_level(&[255, 0], &config), 0.0);
        assert_eq!(BassPulse::bass_level(&[0, 255], &config), 1.0);
        assert_eq!(BassPulse::bass_level(&[], &config), 0.0);
    }
}
