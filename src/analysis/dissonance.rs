use super::spectrum::SpectrumAnalyzer;
use super::tonal::{Peak, SpectralPeaks};
use super::{AlgorithmConfig, AlgorithmKind, AnalysisError, FeatureAlgorithm};

// Plomp-Levelt curve as parameterised by Sethares
const B1: f32 = 3.5;
const B2: f32 = 5.75;
const S1: f32 = 0.021;
const S2: f32 = 19.0;
const X_STAR: f32 = 0.24;

/// Peak of `exp(-B1 x) - exp(-B2 x)`, used to scale pair dissonance to 0..1.
fn curve_max() -> f32 {
    let x = (B2 / B1).ln() / (B2 - B1);
    (-B1 * x).exp() - (-B2 * x).exp()
}

/// Roughness of two pure tones, 0 (consonant) to 1 (maximally rough).
pub fn pair_dissonance(f_low: f32, f_high: f32) -> f32 {
    let (lo, hi) = if f_low <= f_high {
        (f_low, f_high)
    } else {
        (f_high, f_low)
    };
    let s = X_STAR / (S1 * lo + S2);
    let x = s * (hi - lo);
    (((-B1 * x).exp() - (-B2 * x).exp()) / curve_max()).clamp(0.0, 1.0)
}

/// Sensory dissonance of a set of spectral peaks: pair roughness weighted by
/// the product of the pair's magnitudes, normalised by the total weight.
pub fn sensory_dissonance(peaks: &[Peak]) -> f32 {
    let mut total = 0.0f32;
    let mut weight = 0.0f32;
    for (i, a) in peaks.iter().enumerate() {
        for b in &peaks[i + 1..] {
            let w = a.magnitude * b.magnitude;
            total += w * pair_dissonance(a.frequency, b.frequency);
            weight += w;
        }
    }
    if weight > 1e-12 {
        total / weight
    } else {
        0.0
    }
}

pub struct Dissonance {
    spectrum: SpectrumAnalyzer,
    peaks: SpectralPeaks,
}

impl Dissonance {
    pub fn new(config: &AlgorithmConfig) -> Result<Self, AnalysisError> {
        config.validate()?;
        config.require_frame("Dissonance", 64)?;
        let spectrum = SpectrumAnalyzer::new(config.frame_size, config.sample_rate);
        let peaks = SpectralPeaks::new(spectrum.bin_count());
        Ok(Self { spectrum, peaks })
    }
}

impl FeatureAlgorithm for Dissonance {
    fn kind(&self) -> AlgorithmKind {
        AlgorithmKind::Dissonance
    }

    fn compute(&mut self, input: &[f32]) -> f32 {
        let bin_hz = self.spectrum.bin_hz();
        let mags = self.spectrum.analyze(input);
        sensory_dissonance(self.peaks.detect(mags, bin_hz))
    }

    fn reset(&mut self) {
        self.spectrum.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peak(frequency: f32) -> Peak {
        Peak {
            frequency,
            magnitude: 1.0,
        }
    }

    #[test]
    fn test_pair_curve() {
        assert!(pair_dissonance(440.0, 440.0).abs() < 1e-6);
        // Roughly a quarter of a critical band apart: near the maximum
        assert!(pair_dissonance(440.0, 466.16) > 0.8);
        assert!(pair_dissonance(440.0, 880.0) < 0.05);
        assert_eq!(pair_dissonance(466.16, 440.0), pair_dissonance(440.0, 466.16));
    }

    #[test]
    fn test_semitone_rougher_than_octave() {
        let semitone = sensory_dissonance(&[peak(440.0), peak(466.16)]);
        let octave = sensory_dissonance(&[peak(440.0), peak(880.0)]);
        assert!(semitone > octave);
        assert_eq!(sensory_dissonance(&[peak(440.0)]), 0.0);
        assert_eq!(sensory_dissonance(&[]), 0.0);
    }

    #[test]
    fn test_slot_on_audio() {
        let sr = 48000.0;
        let mut d = Dissonance::new(&AlgorithmConfig::new(sr, 8192)).unwrap();
        let tones = |f2: f32| -> Vec<f32> {
            (0..8192)
                .map(|i| {
                    let t = i as f32 / sr;
                    (2.0 * std::f32::consts::PI * 440.0 * t).sin()
                        + (2.0 * std::f32::consts::PI * f2 * t).sin()
                })
                .collect()
        };
        let rough = d.compute(&tones(466.16));
        let smooth = d.compute(&tones(880.0));
        assert!(rough > smooth);
    }
}
