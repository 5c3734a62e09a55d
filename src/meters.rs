//! Lock-free hand-off of analysis results.
//!
//! The audio thread latches the global features here once per block; the
//! presenter and the editor read them at their own pace. Floats are stored
//! as their bit patterns in `AtomicU32`.

use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};

use crate::analysis::pipeline::{GlobalFeatures, LUFS_FLOOR, SPECTRUM_SIGNAL_SIZE};
use crate::analysis::pitch::CONFIDENCE_THRESHOLD;
use crate::analysis::tonal::{Chord, HPCP_SIZE};

/// Displayed pitch when the estimate is not confident.
pub const NO_PITCH: f32 = -1.0;
const NO_CHORD: u8 = u8::MAX;

#[inline]
fn load(a: &AtomicU32) -> f32 {
    f32::from_bits(a.load(Ordering::Relaxed))
}

#[inline]
fn store(a: &AtomicU32, val: f32) {
    a.store(val.to_bits(), Ordering::Relaxed);
}

fn encode_chord(chord: Option<Chord>) -> u8 {
    chord.map_or(NO_CHORD, |c| c.index() as u8)
}

fn decode_chord(value: u8) -> Option<Chord> {
    Chord::from_index(value as usize)
}

pub struct FeatureMeters {
    spectral_centroid: AtomicU32,
    pitch: AtomicU32,
    pitch_confidence: AtomicU32,
    loudness: AtomicU32,
    onset: AtomicU32,
    dissonance: AtomicU32,
    momentary_lufs: AtomicU32,
    chord: AtomicU8,
    strongest_chord: AtomicU8,
    hpcp: [AtomicU32; HPCP_SIZE],
    spectrum: [AtomicU32; SPECTRUM_SIGNAL_SIZE],

    blocks_analysed: AtomicU64,
    blocks_skipped: AtomicU64,
}

impl Default for FeatureMeters {
    fn default() -> Self {
        Self::new()
    }
}

impl FeatureMeters {
    pub fn new() -> Self {
        Self {
            spectral_centroid: AtomicU32::new(0),
            pitch: AtomicU32::new(0),
            pitch_confidence: AtomicU32::new(0),
            loudness: AtomicU32::new(0),
            onset: AtomicU32::new(0),
            dissonance: AtomicU32::new(0),
            momentary_lufs: AtomicU32::new(LUFS_FLOOR.to_bits()),
            chord: AtomicU8::new(NO_CHORD),
            strongest_chord: AtomicU8::new(NO_CHORD),
            hpcp: std::array::from_fn(|_| AtomicU32::new(0)),
            spectrum: std::array::from_fn(|_| AtomicU32::new(0)),
            blocks_analysed: AtomicU64::new(0),
            blocks_skipped: AtomicU64::new(0),
        }
    }

    /// Latch one block's global features. Audio thread.
    pub fn store_global(&self, features: &GlobalFeatures, spectrum: &[f32; SPECTRUM_SIGNAL_SIZE]) {
        self.latch(features, spectrum);
        self.blocks_analysed.fetch_add(1, Ordering::Relaxed);
    }

    fn latch(&self, features: &GlobalFeatures, spectrum: &[f32; SPECTRUM_SIGNAL_SIZE]) {
        store(&self.spectral_centroid, features.spectral_centroid);
        store(&self.pitch, features.pitch);
        store(&self.pitch_confidence, features.pitch_confidence);
        store(&self.loudness, features.loudness);
        store(&self.onset, features.onset);
        store(&self.dissonance, features.dissonance);
        store(&self.momentary_lufs, features.momentary_lufs);
        self.chord.store(encode_chord(features.chord), Ordering::Relaxed);
        self.strongest_chord
            .store(encode_chord(features.strongest_chord), Ordering::Relaxed);

        for (a, &v) in self.hpcp.iter().zip(features.hpcp.iter()) {
            store(a, v);
        }
        for (a, &v) in self.spectrum.iter().zip(spectrum.iter()) {
            store(a, v);
        }
    }

    pub fn note_skipped_block(&self) {
        self.blocks_skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// Best-effort copy of the latest features. Fields may come from
    /// neighbouring blocks.
    pub fn snapshot(&self) -> GlobalFeatures {
        let mut hpcp = [0.0; HPCP_SIZE];
        for (v, a) in hpcp.iter_mut().zip(self.hpcp.iter()) {
            *v = load(a);
        }
        GlobalFeatures {
            spectral_centroid: load(&self.spectral_centroid),
            pitch: load(&self.pitch),
            pitch_confidence: load(&self.pitch_confidence),
            loudness: load(&self.loudness),
            onset: load(&self.onset),
            dissonance: load(&self.dissonance),
            momentary_lufs: load(&self.momentary_lufs),
            hpcp,
            chord: decode_chord(self.chord.load(Ordering::Relaxed)),
            strongest_chord: decode_chord(self.strongest_chord.load(Ordering::Relaxed)),
        }
    }

    pub fn spectrum_into(&self, out: &mut [f32; SPECTRUM_SIGNAL_SIZE]) {
        for (v, a) in out.iter_mut().zip(self.spectrum.iter()) {
            *v = load(a);
        }
    }

    pub fn get_spectral_centroid(&self) -> f32 {
        load(&self.spectral_centroid)
    }

    /// Pitch in Hz when the estimate is confident, [`NO_PITCH`] otherwise.
    pub fn get_pitch_display(&self) -> f32 {
        let pitch = load(&self.pitch);
        if pitch > 0.0 && load(&self.pitch_confidence) > CONFIDENCE_THRESHOLD {
            pitch
        } else {
            NO_PITCH
        }
    }

    pub fn get_loudness(&self) -> f32 {
        load(&self.loudness)
    }

    pub fn get_onset(&self) -> f32 {
        load(&self.onset)
    }

    pub fn get_dissonance(&self) -> f32 {
        load(&self.dissonance)
    }

    pub fn get_momentary_lufs(&self) -> f32 {
        load(&self.momentary_lufs)
    }

    pub fn get_strongest_chord(&self) -> Option<Chord> {
        decode_chord(self.strongest_chord.load(Ordering::Relaxed))
    }

    pub fn blocks_analysed(&self) -> u64 {
        self.blocks_analysed.load(Ordering::Relaxed)
    }

    pub fn blocks_skipped(&self) -> u64 {
        self.blocks_skipped.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.latch(&GlobalFeatures::default(), &[0.0; SPECTRUM_SIGNAL_SIZE]);
        self.blocks_analysed.store(0, Ordering::Relaxed);
        self.blocks_skipped.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_and_snapshot() {
        let meters = FeatureMeters::new();
        let mut features = GlobalFeatures::default();
        features.loudness = 12.5;
        features.pitch = 440.0;
        features.pitch_confidence = 0.9;
        features.strongest_chord = Chord::from_index(15);
        let mut spectrum = [0.0; SPECTRUM_SIGNAL_SIZE];
        spectrum[3] = 0.75;

        meters.store_global(&features, &spectrum);

        assert_eq!(meters.snapshot(), features);
        assert_eq!(meters.get_pitch_display(), 440.0);
        assert_eq!(meters.get_strongest_chord().map(|c| c.name()), Some("Cm"));

        let mut out = [0.0; SPECTRUM_SIGNAL_SIZE];
        meters.spectrum_into(&mut out);
        assert_eq!(out[3], 0.75);
        assert_eq!(meters.blocks_analysed(), 1);
    }

    #[test]
    fn test_unconfident_pitch_displays_sentinel() {
        let meters = FeatureMeters::new();
        let mut features = GlobalFeatures::default();
        features.pitch = 440.0;
        features.pitch_confidence = 0.3;
        meters.store_global(&features, &[0.0; SPECTRUM_SIGNAL_SIZE]);
        assert_eq!(meters.get_pitch_display(), NO_PITCH);
    }
}
