//! Tonal Analysis
//!
//! Spectral peaks → harmonic pitch class profile (HPCP) → triad chord
//! detection, plus the short history that picks the strongest recent chord.
//!
//! # Design Notes
//! - HPCP bin 0 is the reference pitch class (A, 440 Hz); bins advance in
//!   semitones
//! - Chords are the 24 major/minor triads, scored by correlating the HPCP
//!   with binary triad templates
//! - Peak storage is preallocated; detection does not allocate

pub const MAX_PEAKS: usize = 100;
pub const HPCP_SIZE: usize = 12;
pub const REFERENCE_HZ: f32 = 440.0;
/// Detections kept before the strongest-chord history starts over.
pub const CHORD_HISTORY: usize = 10;

const PEAK_MIN_HZ: f32 = 20.0;
const PEAK_MAX_HZ: f32 = 5000.0;
/// Peaks further than this below the strongest bin are ignored.
const PEAK_FLOOR_DB: f32 = -50.0;

const HPCP_MIN_HZ: f32 = 40.0;
const HPCP_MAX_HZ: f32 = 5000.0;
/// Width of the squared-cosine weighting window, in semitones.
const HPCP_WINDOW_SEMITONES: f32 = 1.0;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Peak {
    pub frequency: f32,
    pub magnitude: f32,
}

/// Local maxima of a magnitude spectrum, refined by parabolic interpolation,
/// keeping the `MAX_PEAKS` strongest ordered by frequency.
pub struct SpectralPeaks {
    max_peaks: usize,
    peaks: Vec<Peak>,
}

impl SpectralPeaks {
    pub fn new(bin_count: usize) -> Self {
        Self {
            max_peaks: MAX_PEAKS,
            peaks: Vec::with_capacity(bin_count / 2 + 1),
        }
    }

    pub fn peaks(&self) -> &[Peak] {
        &self.peaks
    }

    pub fn detect(&mut self, magnitudes: &[f32], bin_hz: f32) -> &[Peak] {
        self.peaks.clear();
        if magnitudes.len() < 3 || bin_hz <= 0.0 {
            return &self.peaks;
        }

        let strongest = magnitudes.iter().copied().fold(0.0f32, f32::max);
        if strongest <= 0.0 {
            return &self.peaks;
        }
        let floor = strongest * 10f32.powf(PEAK_FLOOR_DB / 20.0);

        for k in 1..magnitudes.len() - 1 {
            let (a, b, c) = (magnitudes[k - 1], magnitudes[k], magnitudes[k + 1]);
            if b <= floor || b <= a || b < c {
                continue;
            }

            let denom = a - 2.0 * b + c;
            let (offset, magnitude) = if denom.abs() > 1e-12 {
                let p = (0.5 * (a - c) / denom).clamp(-0.5, 0.5);
                (p, b - 0.25 * (a - c) * p)
            } else {
                (0.0, b)
            };

            let frequency = (k as f32 + offset) * bin_hz;
            if !(PEAK_MIN_HZ..=PEAK_MAX_HZ).contains(&frequency) {
                continue;
            }
            if self.peaks.len() == self.peaks.capacity() {
                break;
            }
            self.peaks.push(Peak {
                frequency,
                magnitude,
            });
        }

        if self.peaks.len() > self.max_peaks {
            self.peaks
                .sort_unstable_by(|x, y| y.magnitude.total_cmp(&x.magnitude));
            self.peaks.truncate(self.max_peaks);
            self.peaks
                .sort_unstable_by(|x, y| x.frequency.total_cmp(&y.frequency));
        }

        &self.peaks
    }
}

/// Harmonic pitch class profile of `peaks`, normalised to a maximum of 1.
/// Leaves `hpcp` zeroed when no peak falls in range.
pub fn compute_hpcp(peaks: &[Peak], hpcp: &mut [f32; HPCP_SIZE]) {
    hpcp.iter_mut().for_each(|v| *v = 0.0);

    let half_window = HPCP_WINDOW_SEMITONES * 0.5;
    for peak in peaks {
        if !(HPCP_MIN_HZ..=HPCP_MAX_HZ).contains(&peak.frequency) {
            continue;
        }
        let semis = 12.0 * (peak.frequency / REFERENCE_HZ).log2();
        let pitch_class = semis.rem_euclid(12.0);
        let energy = peak.magnitude * peak.magnitude;

        for (bin, value) in hpcp.iter_mut().enumerate() {
            let mut distance = pitch_class - bin as f32;
            if distance > 6.0 {
                distance -= 12.0;
            } else if distance < -6.0 {
                distance += 12.0;
            }
            if distance.abs() < half_window {
                let w = (std::f32::consts::PI * distance / HPCP_WINDOW_SEMITONES).cos();
                *value += w * w * energy;
            }
        }
    }

    let max = hpcp.iter().copied().fold(0.0f32, f32::max);
    if max > 0.0 {
        hpcp.iter_mut().for_each(|v| *v /= max);
    }
}

const CHORD_NAMES: [&str; 24] = [
    "A", "A#", "B", "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", //
    "Am", "A#m", "Bm", "Cm", "C#m", "Dm", "D#m", "Em", "Fm", "F#m", "Gm", "G#m",
];

/// Major or minor triad. `root` counts semitones above A.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chord {
    pub root: u8,
    pub minor: bool,
}

impl Chord {
    pub const COUNT: usize = 24;

    pub fn index(self) -> usize {
        self.root as usize % 12 + if self.minor { 12 } else { 0 }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        (index < Self::COUNT).then(|| Self {
            root: (index % 12) as u8,
            minor: index >= 12,
        })
    }

    pub fn name(self) -> &'static str {
        CHORD_NAMES[self.index()]
    }

    fn template(self) -> [f32; HPCP_SIZE] {
        let third = if self.minor { 3 } else { 4 };
        let mut t = [0.0; HPCP_SIZE];
        for interval in [0, third, 7] {
            t[(self.root as usize + interval) % HPCP_SIZE] = 1.0;
        }
        t
    }
}

fn correlation(a: &[f32; HPCP_SIZE], b: &[f32; HPCP_SIZE]) -> f32 {
    let n = HPCP_SIZE as f32;
    let mean_a = a.iter().sum::<f32>() / n;
    let mean_b = b.iter().sum::<f32>() / n;

    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for i in 0..HPCP_SIZE {
        let da = a[i] - mean_a;
        let db = b[i] - mean_b;
        cov += da * db;
        var_a += da * da;
        var_b += db * db;
    }

    let denom = (var_a * var_b).sqrt();
    if denom > 1e-12 {
        cov / denom
    } else {
        0.0
    }
}

/// Best matching triad for `hpcp` and its correlation strength.
pub fn detect_chord(hpcp: &[f32; HPCP_SIZE]) -> Option<(Chord, f32)> {
    if hpcp.iter().all(|&v| v <= 0.0) {
        return None;
    }

    let mut best: Option<(Chord, f32)> = None;
    for minor in [false, true] {
        for root in 0..HPCP_SIZE as u8 {
            let chord = Chord { root, minor };
            let strength = correlation(hpcp, &chord.template());
            if best.map_or(true, |(_, s)| strength > s) {
                best = Some((chord, strength));
            }
        }
    }
    best
}

/// Strongest of the recent chord detections. The history starts over once it
/// holds more than [`CHORD_HISTORY`] entries.
pub struct ChordTracker {
    history: [(Chord, f32); CHORD_HISTORY + 1],
    len: usize,
}

impl Default for ChordTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ChordTracker {
    pub fn new() -> Self {
        Self {
            history: [(Chord { root: 0, minor: false }, 0.0); CHORD_HISTORY + 1],
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Record a detection and return the strongest chord seen since the last
    /// restart, including this one.
    pub fn push(&mut self, chord: Chord, strength: f32) -> Chord {
        self.history[self.len] = (chord, strength);
        self.len += 1;

        let strongest = self.history[..self.len]
            .iter()
            .fold((chord, strength), |best, &entry| {
                if entry.1 > best.1 {
                    entry
                } else {
                    best
                }
            })
            .0;

        if self.len > CHORD_HISTORY {
            self.len = 0;
        }
        strongest
    }

    pub fn clear(&mut self) {
        self.len = 0;
    }
}
