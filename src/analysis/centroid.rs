use super::{AlgorithmConfig, AlgorithmKind, AnalysisError, FeatureAlgorithm};
use std::f32::consts::PI;

/// Spectral centroid estimated in the time domain.
///
/// For a sinusoid at `f`, the mean squared first difference relates to the
/// mean square of the signal by `4 sin^2(pi f / sr)`. Inverting that ratio
/// gives a power-weighted frequency estimate without an FFT.
pub fn time_domain_centroid(frame: &[f32], sample_rate: f32) -> f32 {
    if frame.len() < 2 {
        return 0.0;
    }

    let mut diff_energy = 0.0f32;
    let mut energy = 0.0f32;
    for w in frame.windows(2) {
        let d = w[1] - w[0];
        diff_energy += d * d;
        energy += w[1] * w[1];
    }

    if energy <= 1e-12 {
        return 0.0;
    }

    let ratio = (diff_energy / energy).sqrt() * 0.5;
    sample_rate / PI * ratio.clamp(0.0, 1.0).asin()
}

pub struct SpectralCentroid {
    sample_rate: f32,
}

impl SpectralCentroid {
    pub fn new(config: &AlgorithmConfig) -> Result<Self, AnalysisError> {
        config.validate()?;
        config.require_frame("Spectral Centroid", 2)?;
        Ok(Self {
            sample_rate: config.sample_rate,
        })
    }
}

impl FeatureAlgorithm for SpectralCentroid {
    fn kind(&self) -> AlgorithmKind {
        AlgorithmKind::SpectralCentroid
    }

    fn compute(&mut self, input: &[f32]) -> f32 {
        time_domain_centroid(input, self.sample_rate)
    }

    fn reset(&mut self) {}
}
