use crate::bands::{Band, BandBuffers, SoloMask};
use crate::dsp::biquad::Biquad;

/// Lowest cutoff the splitter accepts.
const MIN_CUTOFF_HZ: f32 = 20.0;
/// Cutoffs are kept below this fraction of the sample rate.
const MAX_CUTOFF_RATIO: f32 = 0.49;

/// Three-way band splitter for one channel.
///
/// Low and high come from a lowpass and a highpass biquad; the mid band is
/// whatever is left: `mid = input - low - high`. The three bands therefore sum
/// back to the input regardless of the filter responses.
pub struct BandSplitter {
    lowpass: Biquad,
    highpass: Biquad,
    sample_rate: f32,
    lowpass_hz: f32,
    highpass_hz: f32,
}

impl BandSplitter {
    /// Butterworth Q.
    pub const Q: f32 = std::f32::consts::FRAC_1_SQRT_2;

    pub fn new(sample_rate: f32, lowpass_hz: f32, highpass_hz: f32) -> Self {
        let mut splitter = Self {
            lowpass: Biquad::new(),
            highpass: Biquad::new(),
            sample_rate,
            lowpass_hz: 0.0,
            highpass_hz: 0.0,
        };
        splitter.set_cutoffs(lowpass_hz, highpass_hz);
        splitter
    }

    fn clamp_cutoff(&self, hz: f32) -> f32 {
        hz.clamp(MIN_CUTOFF_HZ, self.sample_rate * MAX_CUTOFF_RATIO)
    }

    /// Retune the crossover. Coefficients are only recomputed when a cutoff
    /// actually moves.
    pub fn set_cutoffs(&mut self, lowpass_hz: f32, highpass_hz: f32) {
        let lowpass_hz = self.clamp_cutoff(lowpass_hz);
        let highpass_hz = self.clamp_cutoff(highpass_hz);

        if lowpass_hz != self.lowpass_hz {
            self.lowpass.update_lpf(lowpass_hz, Self::Q, self.sample_rate);
            self.lowpass_hz = lowpass_hz;
        }
        if highpass_hz != self.highpass_hz {
            self.highpass.update_hpf(highpass_hz, Self::Q, self.sample_rate);
            self.highpass_hz = highpass_hz;
        }
    }

    pub fn cutoffs(&self) -> (f32, f32) {
        (self.lowpass_hz, self.highpass_hz)
    }

    /// Split `input` into `bands`. The buffers take the input's length,
    /// truncated to their capacity.
    pub fn split(&mut self, input: &[f32], bands: &mut BandBuffers) {
        bands.set_len(input.len());
        let (low, mid, high) = bands.split_mut();
        let n = low.len();

        self.lowpass.process_block(&input[..n], low);
        self.highpass.process_block(&input[..n], high);

        for i in 0..n {
            mid[i] = input[i] - low[i] - high[i];
        }
    }

    pub fn reset(&mut self) {
        self.lowpass.reset();
        self.highpass.reset();
    }
}

/// Write the audible bands back into `output`: the soloed bands, or all of
/// them when nothing is soloed.
pub fn mix_bands(bands: &BandBuffers, solo: SoloMask, output: &mut [f32]) {
    let n = output.len().min(bands.len());
    output[..n].iter_mut().for_each(|s| *s = 0.0);

    for band in Band::ALL {
        if !solo.is_audible(band) {
            continue;
        }
        for (o, &b) in output[..n].iter_mut().zip(bands.get(band)) {
            *o += b;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_signal(len: usize, sr: f32) -> Vec<f32> {
        (0..len)
            .map(|i| {
                let t = i as f32 / sr;
                0.5 * (2.0 * std::f32::consts::PI * 110.0 * t).sin()
                    + 0.3 * (2.0 * std::f32::consts::PI * 1500.0 * t).sin()
                    + 0.2 * (2.0 * std::f32::consts::PI * 9000.0 * t).sin()
            })
            .collect()
    }

    fn assert_reconstructs(lowpass_hz: f32, highpass_hz: f32) {
        let sr = 48000.0;
        let input = test_signal(1024, sr);
        let mut splitter = BandSplitter::new(sr, lowpass_hz, highpass_hz);
        let mut bands = BandBuffers::with_capacity(1024);
        splitter.split(&input, &mut bands);

        for i in 0..input.len() {
            let sum = bands.get(Band::Low)[i] + bands.get(Band::Mid)[i] + bands.get(Band::High)[i];
            assert!((sum - input[i]).abs() < 1e-5, "sample {} differs", i);
        }
    }

    #[test]
    fn test_three_band_reconstruction() {
        assert_reconstructs(300.0, 5000.0);
    }

    #[test]
    fn test_two_band_reconstruction() {
        // Two-band mode runs both filters at the same cutoff
        assert_reconstructs(1000.0, 1000.0);
    }

    #[test]
    fn test_low_band_holds_low_content() {
        let sr = 48000.0;
        let input: Vec<f32> = (0..4096)
            .map(|i| (2.0 * std::f32::consts::PI * 60.0 * i as f32 / sr).sin())
            .collect();
        let mut splitter = BandSplitter::new(sr, 1000.0, 5000.0);
        let mut bands = BandBuffers::with_capacity(4096);
        splitter.split(&input, &mut bands);

        let tail = 2048..4096;
        let low = crate::dsp::utils::frame_rms(&bands.get(Band::Low)[tail.clone()]);
        let high = crate::dsp::utils::frame_rms(&bands.get(Band::High)[tail]);
        assert!(low > 0.6);
        assert!(high < 0.01);
    }

    #[test]
    fn test_cutoffs_are_clamped() {
        let splitter = BandSplitter::new(44100.0, 1.0, 30000.0);
        let (lp, hp) = splitter.cutoffs();
        assert_eq!(lp, MIN_CUTOFF_HZ);
        assert!(hp < 22050.0);
    }

    #[test]
    fn test_mix_without_solo_is_input() {
        let sr = 48000.0;
        let input = test_signal(512, sr);
        let mut splitter = BandSplitter::new(sr, 300.0, 5000.0);
        let mut bands = BandBuffers::with_capacity(512);
        splitter.split(&input, &mut bands);

        let mut out = vec![0.0; 512];
        mix_bands(&bands, SoloMask::default(), &mut out);
        for (o, i) in out.iter().zip(&input) {
            assert!((o - i).abs() < 1e-5);
        }
    }

    #[test]
    fn test_mix_soloed_band_only() {
        let sr = 48000.0;
        let input = test_signal(512, sr);
        let mut splitter = BandSplitter::new(sr, 300.0, 5000.0);
        let mut bands = BandBuffers::with_capacity(512);
        splitter.split(&input, &mut bands);

        let solo = SoloMask {
            high: true,
            ..SoloMask::default()
        };
        let mut out = vec![0.0; 512];
        mix_bands(&bands, solo, &mut out);
        assert_eq!(out.as_slice(), bands.get(Band::High));
    }
}
