//! Pitch Detection (YIN)
//!
//! Monophonic fundamental-frequency estimate after de Cheveigné & Kawahara
//! (2002):
//!
//! 1. **Difference function** - d(τ) = Σ(x[j] - x[j+τ])² over the first half
//!    of the frame
//! 2. **Cumulative mean normalised difference** - d'(τ)
//! 3. **Absolute threshold** - first local minimum of d'(τ) below the
//!    threshold, falling back to the global minimum
//! 4. **Parabolic interpolation** - sub-sample period
//!
//! Confidence is `1 - d'(τ)` at the chosen period.
//!
//! The difference function is computed directly, O(frame × max period). All
//! buffers are sized for the largest frame at construction.

use super::{AlgorithmConfig, AlgorithmKind, AnalysisError, FeatureAlgorithm};

/// Pitch is only reported above this confidence.
pub const CONFIDENCE_THRESHOLD: f32 = 0.5;

const DEFAULT_MIN_FREQ: f32 = 40.0;
const DEFAULT_MAX_FREQ: f32 = 5000.0;
const DEFAULT_TOLERANCE: f32 = 0.15;
const MIN_FRAME: usize = 64;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PitchEstimate {
    /// Fundamental frequency in Hz, 0.0 when unvoiced.
    pub frequency: f32,
    /// Periodicity of the frame, 0.0 - 1.0.
    pub confidence: f32,
}

impl PitchEstimate {
    pub fn is_confident(&self) -> bool {
        self.frequency > 0.0 && self.confidence > CONFIDENCE_THRESHOLD
    }
}

pub struct Yin {
    sample_rate: f32,
    min_freq: f32,
    max_freq: f32,
    tolerance: f32,
    frame_size: usize,

    difference: Vec<f32>,
    cmnd: Vec<f32>,
}

impl Yin {
    pub fn new(sample_rate: f32, frame_size: usize) -> Self {
        Self::with_range(sample_rate, frame_size, DEFAULT_MIN_FREQ, DEFAULT_MAX_FREQ)
    }

    pub fn with_range(sample_rate: f32, frame_size: usize, min_freq: f32, max_freq: f32) -> Self {
        let half = frame_size / 2;
        Self {
            sample_rate,
            min_freq,
            max_freq,
            tolerance: DEFAULT_TOLERANCE,
            frame_size,
            difference: vec![0.0; half + 1],
            cmnd: vec![1.0; half + 1],
        }
    }

    pub fn detect(&mut self, samples: &[f32]) -> PitchEstimate {
        let n = samples.len().min(self.frame_size);
        let half = n / 2;

        let min_tau = ((self.sample_rate / self.max_freq) as usize).max(2);
        let max_tau = ((self.sample_rate / self.min_freq).ceil() as usize)
            .min(half)
            .min(self.difference.len() - 1);

        if max_tau < min_tau + 2 {
            return PitchEstimate::default();
        }

        self.compute_difference(&samples[..n], half, max_tau);
        self.compute_cmnd(max_tau);

        let tau = self.find_period(min_tau, max_tau);
        let aperiodicity = self.cmnd[tau];
        let confidence = (1.0 - aperiodicity).clamp(0.0, 1.0);
        if confidence <= 0.0 {
            return PitchEstimate::default();
        }

        let period = self.parabolic_interpolation(tau, max_tau);
        PitchEstimate {
            frequency: self.sample_rate / period,
            confidence,
        }
    }

    fn compute_difference(&mut self, samples: &[f32], window: usize, max_tau: usize) {
        self.difference[0] = 0.0;
        for tau in 1..=max_tau {
            let mut sum = 0.0f64;
            for j in 0..window {
                let d = (samples[j] - samples[j + tau]) as f64;
                sum += d * d;
            }
            self.difference[tau] = sum as f32;
        }
    }

    fn compute_cmnd(&mut self, max_tau: usize) {
        self.cmnd[0] = 1.0;
        let mut running_sum = 0.0f32;
        for tau in 1..=max_tau {
            running_sum += self.difference[tau];
            self.cmnd[tau] = if running_sum > 1e-10 {
                self.difference[tau] * tau as f32 / running_sum
            } else {
                1.0
            };
        }
    }

    /// First dip under the tolerance (walked down to its local minimum), else
    /// the global minimum. Never returns `max_tau` so interpolation has a
    /// right neighbour.
    fn find_period(&self, min_tau: usize, max_tau: usize) -> usize {
        let last = max_tau - 1;
        let mut tau = min_tau;
        while tau < last {
            if self.cmnd[tau] < self.tolerance {
                while tau + 1 < last && self.cmnd[tau + 1] < self.cmnd[tau] {
                    tau += 1;
                }
                return tau;
            }
            tau += 1;
        }

        let mut best = min_tau;
        for tau in min_tau + 1..last {
            if self.cmnd[tau] < self.cmnd[best] {
                best = tau;
            }
        }
        best
    }

    fn parabolic_interpolation(&self, tau: usize, max_tau: usize) -> f32 {
        if tau < 1 || tau >= max_tau {
            return tau as f32;
        }
        let a = self.cmnd[tau - 1];
        let b = self.cmnd[tau];
        let c = self.cmnd[tau + 1];
        let denom = a - 2.0 * b + c;
        if denom.abs() < 1e-12 {
            return tau as f32;
        }
        let shift = (0.5 * (a - c) / denom).clamp(-1.0, 1.0);
        tau as f32 + shift
    }
}

/// Slot algorithm: reports the pitch of confident frames, 0.0 otherwise.
pub struct Pitch {
    yin: Yin,
}

impl Pitch {
    pub fn new(config: &AlgorithmConfig) -> Result<Self, AnalysisError> {
        config.validate()?;
        config.require_frame("Pitch (YIN)", MIN_FRAME)?;
        Ok(Self {
            yin: Yin::new(config.sample_rate, config.frame_size),
        })
    }
}

impl FeatureAlgorithm for Pitch {
    fn kind(&self) -> AlgorithmKind {
        AlgorithmKind::Pitch
    }

    fn compute(&mut self, input: &[f32]) -> f32 {
        let estimate = self.yin.detect(input);
        if estimate.is_confident() {
            estimate.frequency
        } else {
            0.0
        }
    }

    fn reset(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn sine(freq: f32, sr: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| 0.8 * (2.0 * PI * freq * i as f32 / sr).sin())
            .collect()
    }

    #[test]
    fn test_sine_pitch() {
        let sr = 48000.0;
        let mut yin = Yin::new(sr, 2048);
        for &freq in &[110.0, 220.0, 440.0, 1000.0] {
            let est = yin.detect(&sine(freq, sr, 2048));
            assert!((est.frequency - freq).abs() / freq < 0.01, "{} -> {}", freq, est.frequency);
            assert!(est.confidence > 0.9);
            assert!(est.is_confident());
        }
    }

    #[test]
    fn test_silence_is_unvoiced() {
        let mut yin = Yin::new(44100.0, 1024);
        let est = yin.detect(&[0.0; 1024]);
        assert_eq!(est.frequency, 0.0);
        assert!(!est.is_confident());
    }

    #[test]
    fn test_slot_reports_zero_when_unsure() {
        let mut pitch = Pitch::new(&AlgorithmConfig::new(48000.0, 1024)).unwrap();
        assert_eq!(pitch.compute(&[0.0; 1024]), 0.0);
        let f = pitch.compute(&sine(440.0, 48000.0, 1024));
        assert!((f - 440.0).abs() < 5.0);
    }

    #[test]
    fn test_rejects_short_frames() {
        assert!(Pitch::new(&AlgorithmConfig::new(48000.0, 32)).is_err());
    }
}
