//! Frequency bands, band layout and the per-channel band buffers.

use nih_plug::prelude::Enum;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Frequency sub-band a feature slot is assigned to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Band {
    Low,
    Mid,
    High,
}

impl Band {
    pub const ALL: [Band; 3] = [Band::Low, Band::Mid, Band::High];

    #[inline]
    pub fn index(self) -> usize {
        match self {
            Band::Low => 0,
            Band::Mid => 1,
            Band::High => 2,
        }
    }

    /// Human-readable name used in signal names and the editor.
    pub fn label(self) -> &'static str {
        match self {
            Band::Low => "Low",
            Band::Mid => "Mid",
            Band::High => "High",
        }
    }

    /// Prefix of the band's parameter ids ("lowSlot1", "lowSolo", ...).
    pub fn param_prefix(self) -> &'static str {
        match self {
            Band::Low => "low",
            Band::Mid => "mid",
            Band::High => "high",
        }
    }
}

impl fmt::Display for Band {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Number of bands the input is split into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Enum)]
#[repr(usize)]
pub enum BandCount {
    #[serde(rename = "1")]
    #[name = "1"]
    One,
    #[serde(rename = "2")]
    #[name = "2"]
    Two,
    #[serde(rename = "3")]
    #[name = "3"]
    Three,
}

impl Default for BandCount {
    fn default() -> Self {
        BandCount::One
    }
}

impl BandCount {
    /// More than one band: the splitter and the band slots run.
    #[inline]
    pub fn is_multiband(self) -> bool {
        self != BandCount::One
    }

    /// Whether slots of `band` are computed in this layout.
    /// Two bands means low + high; the mid residual is still produced but
    /// its slots are skipped.
    #[inline]
    pub fn is_band_enabled(self, band: Band) -> bool {
        match self {
            BandCount::One => false,
            BandCount::Two => band != Band::Mid,
            BandCount::Three => true,
        }
    }

    /// Crossover frequencies actually used by the splitter.
    /// In two-band mode the highpass snaps to the lowpass cutoff.
    pub fn effective_cutoffs(self, lowpass_hz: f32, highpass_hz: f32) -> (f32, f32) {
        match self {
            BandCount::Two => (lowpass_hz, lowpass_hz),
            _ => (lowpass_hz, highpass_hz),
        }
    }
}

/// Solo state of the three bands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SoloMask {
    pub low: bool,
    pub mid: bool,
    pub high: bool,
}

impl SoloMask {
    pub fn is_soloed(&self, band: Band) -> bool {
        match band {
            Band::Low => self.low,
            Band::Mid => self.mid,
            Band::High => self.high,
        }
    }

    pub fn any(&self) -> bool {
        self.low || self.mid || self.high
    }

    /// Whether `band` is audible: every band plays when nothing is soloed.
    pub fn is_audible(&self, band: Band) -> bool {
        !self.any() || self.is_soloed(band)
    }
}

/// Low/mid/high sample buffers of one channel, preallocated to the maximum
/// block size. Only the first `len` samples of each band are valid.
pub struct BandBuffers {
    bands: [Vec<f32>; 3],
    len: usize,
}

impl BandBuffers {
    pub fn with_capacity(max_block_size: usize) -> Self {
        Self {
            bands: [
                vec![0.0; max_block_size],
                vec![0.0; max_block_size],
                vec![0.0; max_block_size],
            ],
            len: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.bands[0].len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Set the number of valid samples, clamped to the capacity.
    pub fn set_len(&mut self, len: usize) {
        self.len = len.min(self.capacity());
    }

    #[inline]
    pub fn get(&self, band: Band) -> &[f32] {
        &self.bands[band.index()][..self.len]
    }

    /// Mutable views of the valid part of all three bands.
    pub fn split_mut(&mut self) -> (&mut [f32], &mut [f32], &mut [f32]) {
        let len = self.len;
        let [low, mid, high] = &mut self.bands;
        (&mut low[..len], &mut mid[..len], &mut high[..len])
    }

    pub fn clear(&mut self) {
        for band in self.bands.iter_mut() {
            band.iter_mut().for_each(|s| *s = 0.0);
        }
    }
}
