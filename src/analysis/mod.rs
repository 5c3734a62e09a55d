//! Audio feature extraction.
//!
//! Every slot-selectable feature implements [`FeatureAlgorithm`] and is built
//! through the [`AlgorithmFactory`] table, keyed by [`AlgorithmKind`]. The
//! global per-block pipeline lives in [`pipeline`] and reuses the same
//! building blocks.

pub mod centroid;
pub mod dissonance;
pub mod factory;
pub mod loudness;
pub mod onset;
pub mod pipeline;
pub mod pitch;
pub mod spectrum;
pub mod tonal;

pub use factory::{AlgorithmDescriptor, AlgorithmFactory};
pub use pipeline::{GlobalAnalysis, GlobalFeatures};

use nih_plug::prelude::Enum;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lowest sample rate any algorithm accepts.
pub const MIN_SAMPLE_RATE: f32 = 8_000.0;
/// Highest sample rate any algorithm accepts.
pub const MAX_SAMPLE_RATE: f32 = 192_000.0;
/// Largest analysis frame. Host blocks above this are never analysed.
pub const MAX_FRAME_SIZE: usize = 16_384;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum AnalysisError {
    #[error("sample rate {0} Hz is outside 8000..192000 Hz")]
    InvalidSampleRate(f32),

    #[error("frame size {0} is outside 1..16384")]
    InvalidFrameSize(usize),

    #[error("{algorithm} needs frames of at least {required} samples, got {frame_size}")]
    FrameTooShort {
        algorithm: &'static str,
        required: usize,
        frame_size: usize,
    },
}

/// Construction parameters shared by all algorithms.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlgorithmConfig {
    pub sample_rate: f32,
    /// Largest number of samples passed to a single `compute` call.
    pub frame_size: usize,
}

impl AlgorithmConfig {
    pub fn new(sample_rate: f32, frame_size: usize) -> Self {
        Self {
            sample_rate,
            frame_size,
        }
    }

    pub fn validate(&self) -> Result<(), AnalysisError> {
        if !self.sample_rate.is_finite()
            || !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&self.sample_rate)
        {
            return Err(AnalysisError::InvalidSampleRate(self.sample_rate));
        }
        if self.frame_size == 0 || self.frame_size > MAX_FRAME_SIZE {
            return Err(AnalysisError::InvalidFrameSize(self.frame_size));
        }
        Ok(())
    }

    /// Fail with [`AnalysisError::FrameTooShort`] unless frames hold at least
    /// `required` samples.
    pub fn require_frame(&self, algorithm: &'static str, required: usize) -> Result<(), AnalysisError> {
        if self.frame_size < required {
            return Err(AnalysisError::FrameTooShort {
                algorithm,
                required,
                frame_size: self.frame_size,
            });
        }
        Ok(())
    }
}

/// Feature a slot can compute. `None` leaves the slot idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Enum)]
#[repr(usize)]
pub enum AlgorithmKind {
    #[serde(rename = "-")]
    #[name = "-"]
    None,
    #[serde(rename = "Loudness")]
    #[name = "Loudness"]
    Loudness,
    #[serde(rename = "Spectral Centroid")]
    #[name = "Spectral Centroid"]
    SpectralCentroid,
    #[serde(rename = "Pitch (YIN)")]
    #[name = "Pitch (YIN)"]
    Pitch,
    #[serde(rename = "Onset (HFC)")]
    #[name = "Onset (HFC)"]
    Onset,
    #[serde(rename = "Dissonance")]
    #[name = "Dissonance"]
    Dissonance,
}

impl Default for AlgorithmKind {
    fn default() -> Self {
        AlgorithmKind::None
    }
}

impl AlgorithmKind {
    pub const ALL: [AlgorithmKind; 6] = [
        AlgorithmKind::None,
        AlgorithmKind::Loudness,
        AlgorithmKind::SpectralCentroid,
        AlgorithmKind::Pitch,
        AlgorithmKind::Onset,
        AlgorithmKind::Dissonance,
    ];

    pub fn name(self) -> &'static str {
        match self {
            AlgorithmKind::None => "-",
            AlgorithmKind::Loudness => "Loudness",
            AlgorithmKind::SpectralCentroid => "Spectral Centroid",
            AlgorithmKind::Pitch => "Pitch (YIN)",
            AlgorithmKind::Onset => "Onset (HFC)",
            AlgorithmKind::Dissonance => "Dissonance",
        }
    }

    #[inline]
    pub fn is_none(self) -> bool {
        self == AlgorithmKind::None
    }

    /// Compact encoding for atomic storage.
    #[inline]
    pub fn ordinal(self) -> u8 {
        match self {
            AlgorithmKind::None => 0,
            AlgorithmKind::Loudness => 1,
            AlgorithmKind::SpectralCentroid => 2,
            AlgorithmKind::Pitch => 3,
            AlgorithmKind::Onset => 4,
            AlgorithmKind::Dissonance => 5,
        }
    }

    /// Inverse of [`AlgorithmKind::ordinal`]; unknown values map to `None`.
    #[inline]
    pub fn from_ordinal(value: u8) -> Self {
        Self::ALL
            .get(value as usize)
            .copied()
            .unwrap_or(AlgorithmKind::None)
    }
}

/// A hot-swappable feature extractor.
///
/// `compute` runs on the audio thread: implementations allocate everything
/// at construction and must not allocate, lock or panic afterwards.
pub trait FeatureAlgorithm: Send {
    fn kind(&self) -> AlgorithmKind;

    /// Analyse one frame (at most the configured frame size) and return the
    /// feature value.
    fn compute(&mut self, input: &[f32]) -> f32;

    /// Forget any state carried between frames.
    fn reset(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_validation() {
        assert!(AlgorithmConfig::new(48000.0, 512).validate().is_ok());
        assert_eq!(
            AlgorithmConfig::new(4000.0, 512).validate(),
            Err(AnalysisError::InvalidSampleRate(4000.0))
        );
        assert_eq!(
            AlgorithmConfig::new(48000.0, 0).validate(),
            Err(AnalysisError::InvalidFrameSize(0))
        );
        assert!(AlgorithmConfig::new(f32::NAN, 512).validate().is_err());
    }

    #[test]
    fn test_kind_ordinal_roundtrip() {
        for kind in AlgorithmKind::ALL {
            assert_eq!(AlgorithmKind::from_ordinal(kind.ordinal()), kind);
        }
        assert_eq!(AlgorithmKind::from_ordinal(200), AlgorithmKind::None);
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(AlgorithmKind::None.name(), "-");
        assert_eq!(AlgorithmKind::SpectralCentroid.name(), "Spectral Centroid");
    }
}
