use std::{collections::VecDeque, f32::consts::PI, fmt, sync::Arc};

use realfft::{num_complex::Complex32, RealFftPlanner, RealToComplex};

use crate::{config::AnalyserConfig, PlayerError, Result};

/// Analyser node of the decode graph.
///
/// Keeps the most recent `fft_size` time-domain samples and turns them into
/// byte frequency data the way a browser analyser does: Blackman window, real
/// FFT, magnitude normalised by the transform size, exponential smoothing over
/// time, then decibels mapped linearly from `[min_decibels, max_decibels]` onto
/// `0..=255`.
pub struct SpectrumAnalyser {
    config: AnalyserConfig,
    history: VecDeque<f32>,
    smoothed: Vec<f32>,
    window: Vec<f32>,
    fft: FftResources,
}

impl SpectrumAnalyser {
    pub fn new(config: AnalyserConfig) -> Result<Self> {
        let size = config.fft_size;
        if !size.is_power_of_two() || size < 32 {
            return Err(PlayerError::InvalidInput(
                "analyser fft size must be a power of two of at least 32",
            ));
        }

        let mut planner = RealFftPlanner::<f32>::new();
        let plan = planner.plan_fft_forward(size);
        let fft = FftResources {
            scratch: plan.make_scratch_vec(),
            spectrum: plan.make_output_vec(),
            input: plan.make_input_vec(),
            plan,
        };

        Ok(Self {
            history: VecDeque::from(vec![0.0; size]),
            smoothed: vec![0.0; size / 2],
            window: (0..size).map(|i| blackman_value(i, size)).collect(),
            config,
            fft,
        })
    }

    pub fn fft_size(&self) -> usize {
        self.config.fft_size
    }

    /// Number of frequency bins, half the transform size.
    pub fn frequency_bin_count(&self) -> usize {
        self.config.fft_size / 2
    }

    /// Appends time-domain samples, keeping only the latest `fft_size`.
    pub fn push_samples(&mut self, samples: &[f32]) {
        let size = self.config.fft_size;
        let skip = samples.len().saturating_sub(size);
        for sample in &samples[skip..] {
            if self.history.len() == size {
                self.history.pop_front();
            }
            self.history.push_back(*sample);
        }
    }

    /// Writes the current spectrum into `out`, one byte per bin. Extra output
    /// slots are left untouched.
    pub fn byte_frequency_data(&mut self, out: &mut [u8]) -> Result<()> {
        let size = self.config.fft_size;
        for (index, (slot, sample)) in self
            .fft
            .input
            .iter_mut()
            .zip(self.history.iter())
            .enumerate()
        {
            *slot = *sample * self.window[index];
        }

        self.fft
            .plan
            .process_with_scratch(&mut self.fft.input, &mut self.fft.spectrum, &mut self.fft.scratch)?;

        let tau = self.config.smoothing;
        let range = self.config.max_decibels - self.config.min_decibels;
        for (bin, (smoothed, value)) in self
            .smoothed
            .iter_mut()
            .zip(self.fft.spectrum.iter())
            .enumerate()
        {
            let magnitude = value.norm() / size as f32;
            *smoothed = tau * *smoothed + (1.0 - tau) * magnitude;

            if let Some(slot) = out.get_mut(bin) {
                let db = if *smoothed > 0.0 {
                    20.0 * smoothed.log10()
                } else {
                    f32::NEG_INFINITY
                };
                let scaled = 255.0 * (db - self.config.min_decibels) / range;
                *slot = scaled.clamp(0.0, 255.0) as u8;
            }
        }
        Ok(())
    }

    pub fn reset(&mut self) {
        self.history.iter_mut().for_each(|s| *s = 0.0);
        self.smoothed.iter_mut().for_each(|s| *s = 0.0);
    }
}

struct FftResources {
    plan: Arc<dyn RealToComplex<f32>>,
    scratch: Vec<Complex32>,
    spectrum: Vec<Complex32>,
    input: Vec<f32>,
}

impl fmt::Debug for SpectrumAnalyser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpectrumAnalyser")
            .field("config", &self.config)
            .field("history", &self.history.len())
            .finish()
    }
}

fn blackman_value(index: usize, len: usize) -> f32 {
    const ALPHA: f32 = 0.16;
    let a0 = 0.5 * (1.0 - ALPHA);
    let a1 = 0.5;
    let a2 = 0.5 * ALPHA;
    let x = index as f32 / len as f32;
    a0 - a1 * (2.0 * PI * x).cos() + a2 * (4.0 * PI * x).cos()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyser() -> SpectrumAnalyser {
        SpectrumAnalyser::new(AnalyserConfig::default()).unwrap()
    }

    fn sine(bin: usize, size: usize, amplitude: f32) -> Vec<f32> {
        (0..size)
            .map(|i| amplitude * (2.0 * PI * bin as f32 * i as f32 / size as f32).sin())
            .collect()
    }

    #[test]
    fn silence_maps_to_zero() {
        let mut analyser = analyser();
        let mut out = vec![7u8; analyser.frequency_bin_count()];
        analyser.byte_frequency_data(&mut out).unwrap();
        assert!(out.iter().all(|b| *b == 0));
    }

    #[test]
    fn tone_peaks_at_its_bin() {
        let mut analyser = analyser();
        let mut out = vec![0u8; analyser.frequency_bin_count()];
        let tone = sine(20, analyser.fft_size(), 0.05);
        for _ in 0..20 {
            analyser.push_samples(&tone);
            analyser.byte_frequency_data(&mut out).unwrap();
        }

        let (peak, value) = out
            .iter()
            .enumerate()
            .max_by_key(|(_, v)| **v)
            .unwrap();
        assert_eq!(peak, 20);
        assert!(*value > 180);
        assert!(out[100] < *value / 2);
    }

    #[test]
    fn rejects_odd_sizes() {
        let config = AnalyserConfig {
            fft_size: 300,
            ..Default::default()
        };
        assert!(SpectrumAnalyser::new(config).is_err());
    }

    #[test]
    fn keeps_only_the_latest_window() {
        let mut analyser = analyser();
        analyser.push_samples(&vec![1.0; 2_000]);
        assert_eq!(analyser.history.len(), analyser.fft_size());
    }
}
