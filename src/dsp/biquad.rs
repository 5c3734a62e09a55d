//! Biquad Filter Implementation (IIR 2nd Order)
//!
//! Second-order recursive filter used by the band splitter. Only the
//! low-pass and high-pass RBJ designs are needed: the crossover derives the
//! mid band by subtraction instead of a third filter.
//!
//! # Design Notes
//! - All operations are safe for the audio thread (no allocations)
//! - Coefficient updates keep the delay state, so cutoff sweeps do not click

use std::f32::consts::PI;

/// Biquad filter implementation (IIR 2nd order, transposed direct form II)
#[derive(Debug, Clone, Copy)]
pub struct Biquad {
    a0: f32,
    a1: f32,
    a2: f32,
    b1: f32,
    b2: f32,
    z1: f32,
    z2: f32,
}

impl Default for Biquad {
    fn default() -> Self {
        Self::new()
    }
}

impl Biquad {
    /// Identity filter (passes input unchanged).
    pub fn new() -> Self {
        Self {
            a0: 1.0,
            a1: 0.0,
            a2: 0.0,
            b1: 0.0,
            b2: 0.0,
            z1: 0.0,
            z2: 0.0,
        }
    }

    /// Process a single sample
    #[inline]
    pub fn process(&mut self, input: f32) -> f32 {
        let out = input * self.a0 + self.z1;

        // Anti-denormal: tiny DC offset
        self.z1 = input * self.a1 + self.z2 - self.b1 * out + 1e-25;
        self.z2 = input * self.a2 - self.b2 * out + 1e-25;

        out
    }

    /// Filter `input` into `output` sample by sample.
    #[inline]
    pub fn process_block(&mut self, input: &[f32], output: &mut [f32]) {
        for (o, &i) in output.iter_mut().zip(input) {
            *o = self.process(i);
        }
    }

    /// Clear filter delay state. Coefficient updates never do this.
    #[inline]
    pub fn reset(&mut self) {
        self.z1 = 0.0;
        self.z2 = 0.0;
    }

    // ---------------------------------------------------------------------
    // Filter design helpers (RBJ-style)
    // ---------------------------------------------------------------------

    pub fn update_hpf(&mut self, cutoff: f32, q: f32, sr: f32) {
        let w0 = 2.0 * PI * cutoff / sr;
        let alpha = w0.sin() / (2.0 * q.max(1e-6));
        let cw0 = w0.cos();

        let inv_a0 = 1.0 / (1.0 + alpha);

        self.a0 = ((1.0 + cw0) * 0.5) * inv_a0;
        self.a1 = -(1.0 + cw0) * inv_a0;
        self.a2 = ((1.0 + cw0) * 0.5) * inv_a0;
        self.b1 = (-2.0 * cw0) * inv_a0;
        self.b2 = (1.0 - alpha) * inv_a0;
    }

    pub fn update_lpf(&mut self, cutoff: f32, q: f32, sr: f32) {
        let w0 = 2.0 * PI * cutoff / sr;
        let alpha = w0.sin() / (2.0 * q.max(1e-6));
        let cw0 = w0.cos();

        let inv_a0 = 1.0 / (1.0 + alpha);

        self.a0 = ((1.0 - cw0) * 0.5) * inv_a0;
        self.a1 = (1.0 - cw0) * inv_a0;
        self.a2 = ((1.0 - cw0) * 0.5) * inv_a0;
        self.b1 = (-2.0 * cw0) * inv_a0;
        self.b2 = (1.0 - alpha) * inv_a0;
    }

    /// Magnitude of the transfer function at `freq` Hz.
    #[cfg(test)]
    fn magnitude_at(&self, freq: f32, sr: f32) -> f32 {
        let w = 2.0 * PI * freq / sr;
        let (c1, s1) = (w.cos(), -w.sin());
        let (c2, s2) = ((2.0 * w).cos(), -(2.0 * w).sin());

        let num_re = self.a0 + self.a1 * c1 + self.a2 * c2;
        let num_im = self.a1 * s1 + self.a2 * s2;
        let den_re = 1.0 + self.b1 * c1 + self.b2 * c2;
        let den_im = self.b1 * s1 + self.b2 * s2;

        let num = (num_re * num_re + num_im * num_im).sqrt();
        let den = (den_re * den_re + den_im * den_im).sqrt().max(1e-12);
        num / den
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_passthrough() {
        let mut f = Biquad::new();
        for &x in &[0.0, 0.5, -0.25, 1.0] {
            assert!((f.process(x) - x).abs() < 1e-6);
        }
    }

    #[test]
    fn test_lowpass_response() {
        let mut f = Biquad::new();
        f.update_lpf(1000.0, std::f32::consts::FRAC_1_SQRT_2, 48000.0);

        assert!((f.magnitude_at(20.0, 48000.0) - 1.0).abs() < 0.01);
        // Butterworth: -3 dB at cutoff
        assert!((f.magnitude_at(1000.0, 48000.0) - std::f32::consts::FRAC_1_SQRT_2).abs() < 0.02);
        assert!(f.magnitude_at(10000.0, 48000.0) < 0.02);
    }

    #[test]
    fn test_highpass_response() {
        let mut f = Biquad::new();
        f.update_hpf(1000.0, std::f32::consts::FRAC_1_SQRT_2, 48000.0);

        assert!(f.magnitude_at(50.0, 48000.0) < 0.01);
        assert!((f.magnitude_at(15000.0, 48000.0) - 1.0).abs() < 0.02);
    }
}
