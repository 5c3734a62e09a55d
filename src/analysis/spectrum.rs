//! Windowed Magnitude Spectrum
//!
//! Blackman-Harris (62 dB, 3-term) window followed by a forward FFT. Frames
//! shorter than the FFT are zero padded. Magnitudes are normalised by the
//! window sum so a full-scale sinusoid peaks near 1.0.
//!
//! # Design Notes
//! - FFT plan, window and all buffers are allocated in `new`
//! - `analyze` is allocation-free and safe for the audio thread

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::f32::consts::PI;
use std::sync::Arc;

const BH62_A0: f32 = 0.44959;
const BH62_A1: f32 = 0.49364;
const BH62_A2: f32 = 0.05677;

/// Blackman-Harris 62 dB coefficient `i` of an `n`-point symmetric window.
#[inline]
pub fn blackman_harris_62(i: usize, n: usize) -> f32 {
    if n <= 1 {
        return 1.0;
    }
    let x = 2.0 * PI * i as f32 / (n - 1) as f32;
    BH62_A0 - BH62_A1 * x.cos() + BH62_A2 * (2.0 * x).cos()
}

pub fn make_blackman_harris_62(n: usize) -> Vec<f32> {
    (0..n).map(|i| blackman_harris_62(i, n)).collect()
}

pub struct SpectrumAnalyzer {
    fft: Arc<dyn Fft<f32>>,
    fft_size: usize,
    frame_size: usize,
    sample_rate: f32,

    window: Vec<f32>,
    window_sum: f32,

    buffer: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    magnitudes: Vec<f32>,
}

impl SpectrumAnalyzer {
    pub fn new(frame_size: usize, sample_rate: f32) -> Self {
        let frame_size = frame_size.max(2);
        let fft_size = frame_size.next_power_of_two();

        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(fft_size);
        let scratch_len = fft.get_inplace_scratch_len();

        let window = make_blackman_harris_62(frame_size);
        let window_sum = window.iter().sum();

        Self {
            fft,
            fft_size,
            frame_size,
            sample_rate,
            window,
            window_sum,
            buffer: vec![Complex::default(); fft_size],
            scratch: vec![Complex::default(); scratch_len],
            magnitudes: vec![0.0; fft_size / 2 + 1],
        }
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    pub fn bin_count(&self) -> usize {
        self.magnitudes.len()
    }

    /// Width of one bin in Hz.
    pub fn bin_hz(&self) -> f32 {
        self.sample_rate / self.fft_size as f32
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    /// Magnitudes of the last analysed frame.
    pub fn magnitudes(&self) -> &[f32] {
        &self.magnitudes
    }

    /// Analyse `frame`. Samples beyond the configured frame size are ignored.
    pub fn analyze(&mut self, frame: &[f32]) -> &[f32] {
        let n = frame.len().min(self.frame_size);

        let window_sum = if n == self.frame_size {
            for i in 0..n {
                self.buffer[i] = Complex::new(frame[i] * self.window[i], 0.0);
            }
            self.window_sum
        } else {
            // Short frame: window over its own length
            let mut sum = 0.0;
            for i in 0..n {
                let w = blackman_harris_62(i, n);
                sum += w;
                self.buffer[i] = Complex::new(frame[i] * w, 0.0);
            }
            sum
        };
        for c in self.buffer[n..].iter_mut() {
            *c = Complex::default();
        }

        self.fft
            .process_with_scratch(&mut self.buffer, &mut self.scratch);

        let norm = if window_sum > 1e-9 { 2.0 / window_sum } else { 0.0 };
        for (m, c) in self.magnitudes.iter_mut().zip(&self.buffer) {
            *m = c.norm() * norm;
        }

        &self.magnitudes
    }

    pub fn reset(&mut self) {
        self.magnitudes.iter_mut().for_each(|m| *m = 0.0);
    }
}

/// Average `magnitudes` down (or repeat them up) into `out.len()` bins.
pub fn downsample_spectrum(magnitudes: &[f32], out: &mut [f32]) {
    let src = magnitudes.len();
    let dst = out.len();
    if dst == 0 {
        return;
    }
    if src == 0 {
        out.iter_mut().for_each(|o| *o = 0.0);
        return;
    }

    for (j, o) in out.iter_mut().enumerate() {
        let start = j * src / dst;
        let end = ((j + 1) * src / dst).max(start + 1).min(src);
        let slice = &magnitudes[start..end];
        *o = slice.iter().sum::<f32>() / slice.len() as f32;
    }
}
