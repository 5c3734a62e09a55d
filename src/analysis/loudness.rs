use super::{AlgorithmConfig, AlgorithmKind, AnalysisError, FeatureAlgorithm};
use crate::dsp::utils::frame_energy;

/// Stevens' power law exponent applied to frame energy.
const STEVENS_EXPONENT: f32 = 0.67;

/// Loudness of a frame as `energy ^ 0.67` (Stevens' power law).
pub fn stevens_loudness(frame: &[f32]) -> f32 {
    frame_energy(frame).powf(STEVENS_EXPONENT)
}

pub struct Loudness;

impl Loudness {
    pub fn new(config: &AlgorithmConfig) -> Result<Self, AnalysisError> {
        config.validate()?;
        Ok(Self)
    }
}

impl FeatureAlgorithm for Loudness {
    fn kind(&self) -> AlgorithmKind {
        AlgorithmKind::Loudness
    }

    fn compute(&mut self, input: &[f32]) -> f32 {
        stevens_loudness(input)
    }

    fn reset(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silence_is_zero() {
        assert_eq!(stevens_loudness(&[0.0; 256]), 0.0);
        assert_eq!(stevens_loudness(&[]), 0.0);
    }

    #[test]
    fn test_loudness_is_monotonic_in_level() {
        let quiet = [0.1f32; 256];
        let loud = [0.5f32; 256];
        assert!(stevens_loudness(&loud) > stevens_loudness(&quiet));

        // energy 256 * 0.25 = 64
        assert!((stevens_loudness(&loud) - 64f32.powf(0.67)).abs() < 1e-3);
    }
}
