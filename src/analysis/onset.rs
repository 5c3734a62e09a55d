use super::spectrum::SpectrumAnalyzer;
use super::{AlgorithmConfig, AlgorithmKind, AnalysisError, FeatureAlgorithm};

/// High-frequency-content onset detection function.
///
/// `sum_k f_k * |X_k|^2` with `f_k` the bin frequency in kHz, so the value does
/// not depend on the FFT size. Percussive attacks push energy into the upper
/// bins and spike this value.
pub fn high_frequency_content(magnitudes: &[f32], bin_hz: f32) -> f32 {
    let bin_khz = bin_hz * 1e-3;
    magnitudes
        .iter()
        .enumerate()
        .map(|(k, &m)| k as f32 * bin_khz * m * m)
        .sum()
}

pub struct OnsetHfc {
    spectrum: SpectrumAnalyzer,
}

impl OnsetHfc {
    pub fn new(config: &AlgorithmConfig) -> Result<Self, AnalysisError> {
        config.validate()?;
        config.require_frame("Onset (HFC)", 32)?;
        Ok(Self {
            spectrum: SpectrumAnalyzer::new(config.frame_size, config.sample_rate),
        })
    }
}

impl FeatureAlgorithm for OnsetHfc {
    fn kind(&self) -> AlgorithmKind {
        AlgorithmKind::Onset
    }

    fn compute(&mut self, input: &[f32]) -> f32 {
        let bin_hz = self.spectrum.bin_hz();
        let mags = self.spectrum.analyze(input);
        high_frequency_content(mags, bin_hz)
    }

    fn reset(&mut self) {
        self.spectrum.reset();
    }
}
