//! Global Analysis Pipeline
//!
//! Runs once per block on the full-band mono signal, independent of the band
//! split and of the feature slots:
//!
//! window → spectrum → { HFC onset, spectral peaks → HPCP → chords,
//! peaks → dissonance } plus time-domain centroid, YIN pitch, Stevens
//! loudness and momentary EBU R128 loudness.
//!
//! # Design Notes
//! - Everything is allocated in `new`
//! - The 128-bin display spectrum is what the editor and the transport see

use ebur128::{EbuR128, Mode};

use super::centroid::time_domain_centroid;
use super::dissonance::sensory_dissonance;
use super::loudness::stevens_loudness;
use super::onset::high_frequency_content;
use super::pitch::Yin;
use super::spectrum::{downsample_spectrum, SpectrumAnalyzer};
use super::tonal::{compute_hpcp, detect_chord, Chord, ChordTracker, SpectralPeaks, HPCP_SIZE};
use super::{AlgorithmConfig, AnalysisError};

/// Bins of the spectrum published to the editor and the transport.
pub const SPECTRUM_SIGNAL_SIZE: usize = 128;
/// Reported momentary loudness for silence.
pub const LUFS_FLOOR: f32 = -70.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GlobalFeatures {
    pub spectral_centroid: f32,
    pub pitch: f32,
    pub pitch_confidence: f32,
    pub loudness: f32,
    pub onset: f32,
    pub dissonance: f32,
    pub momentary_lufs: f32,
    pub hpcp: [f32; HPCP_SIZE],
    pub chord: Option<Chord>,
    pub strongest_chord: Option<Chord>,
}

impl Default for GlobalFeatures {
    fn default() -> Self {
        Self {
            spectral_centroid: 0.0,
            pitch: 0.0,
            pitch_confidence: 0.0,
            loudness: 0.0,
            onset: 0.0,
            dissonance: 0.0,
            momentary_lufs: LUFS_FLOOR,
            hpcp: [0.0; HPCP_SIZE],
            chord: None,
            strongest_chord: None,
        }
    }
}

pub struct GlobalAnalysis {
    sample_rate: f32,
    spectrum: SpectrumAnalyzer,
    yin: Yin,
    peaks: SpectralPeaks,
    chords: ChordTracker,
    loudness_meter: Option<EbuR128>,

    features: GlobalFeatures,
    spectrum_bins: [f32; SPECTRUM_SIGNAL_SIZE],
}

impl GlobalAnalysis {
    pub fn new(config: &AlgorithmConfig) -> Result<Self, AnalysisError> {
        config.validate()?;

        let spectrum = SpectrumAnalyzer::new(config.frame_size, config.sample_rate);
        let peaks = SpectralPeaks::new(spectrum.bin_count());
        let loudness_meter = EbuR128::new(1, config.sample_rate as u32, Mode::M).ok();
        if loudness_meter.is_none() {
            log::warn!(
                "momentary loudness unavailable at {} Hz",
                config.sample_rate
            );
        }

        Ok(Self {
            sample_rate: config.sample_rate,
            spectrum,
            yin: Yin::new(config.sample_rate, config.frame_size),
            peaks,
            chords: ChordTracker::new(),
            loudness_meter,
            features: GlobalFeatures::default(),
            spectrum_bins: [0.0; SPECTRUM_SIGNAL_SIZE],
        })
    }

    pub fn features(&self) -> &GlobalFeatures {
        &self.features
    }

    pub fn spectrum(&self) -> &[f32; SPECTRUM_SIGNAL_SIZE] {
        &self.spectrum_bins
    }

    pub fn process(&mut self, frame: &[f32]) -> &GlobalFeatures {
        let f = &mut self.features;

        f.spectral_centroid = time_domain_centroid(frame, self.sample_rate);
        f.loudness = stevens_loudness(frame);

        let pitch = self.yin.detect(frame);
        f.pitch = pitch.frequency;
        f.pitch_confidence = pitch.confidence;

        let bin_hz = self.spectrum.bin_hz();
        let mags = self.spectrum.analyze(frame);
        f.onset = high_frequency_content(mags, bin_hz);
        downsample_spectrum(mags, &mut self.spectrum_bins);

        let peaks = self.peaks.detect(mags, bin_hz);
        f.dissonance = sensory_dissonance(peaks);
        compute_hpcp(peaks, &mut f.hpcp);

        f.chord = None;
        if let Some((chord, strength)) = detect_chord(&f.hpcp) {
            f.chord = Some(chord);
            f.strongest_chord = Some(self.chords.push(chord, strength));
        }

        if let Some(meter) = self.loudness_meter.as_mut() {
            if meter.add_frames_f32(frame).is_ok() {
                f.momentary_lufs = meter
                    .loudness_momentary()
                    .ok()
                    .map(|l| l as f32)
                    .filter(|l| l.is_finite())
                    .map_or(LUFS_FLOOR, |l| l.max(LUFS_FLOOR));
            }
        }

        &self.features
    }

    pub fn reset(&mut self) {
        self.spectrum.reset();
        self.chords.clear();
        if let Some(meter) = self.loudness_meter.as_mut() {
            meter.reset();
        }
        self.features = GlobalFeatures::default();
        self.spectrum_bins = [0.0; SPECTRUM_SIGNAL_SIZE];
    }
}
