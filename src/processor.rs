//! Block processor.
//!
//! Owns everything the audio thread touches per block: the band splitters,
//! the per-channel band buffers and the global analysis. Slots are shared
//! with the background task thread through the [`SlotBank`].

use std::sync::Arc;

use crate::analysis::{
    AlgorithmConfig, AlgorithmFactory, AlgorithmKind, AnalysisError, GlobalAnalysis, MAX_FRAME_SIZE,
};
use crate::bands::{Band, BandBuffers, BandCount, SoloMask};
use crate::dsp::{mix_bands, BandSplitter};
use crate::meters::FeatureMeters;
use crate::mv_log;
use crate::slots::{SlotBank, SlotSelections, SLOTS_PER_BAND};

/// Channels split into bands. Further channels pass through.
pub const MAX_CHANNELS: usize = 2;

/// Per-block snapshot of the host parameters the processor reads.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlockSettings {
    pub band_count: BandCount,
    pub lowpass_hz: f32,
    pub highpass_hz: f32,
    pub solo: SoloMask,
}

impl Default for BlockSettings {
    fn default() -> Self {
        Self {
            band_count: BandCount::One,
            lowpass_hz: 3000.0,
            highpass_hz: 5000.0,
            solo: SoloMask::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NotPrepared,
    BlockTooLarge { len: usize, max: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockOutcome {
    Processed,
    /// Nothing was analysed and the audio passed through untouched.
    Skipped(SkipReason),
}

struct Prepared {
    max_block_size: usize,
    splitters: [BandSplitter; MAX_CHANNELS],
    buffers: [BandBuffers; MAX_CHANNELS],
    analysis: GlobalAnalysis,
}

pub struct AnalysisProcessor {
    slots: Arc<SlotBank>,
    meters: Arc<FeatureMeters>,
    prepared: Option<Prepared>,
}

impl AnalysisProcessor {
    pub fn new(slots: Arc<SlotBank>, meters: Arc<FeatureMeters>) -> Self {
        Self {
            slots,
            meters,
            prepared: None,
        }
    }

    /// Allocate for `sample_rate` and blocks of up to `max_block_size`
    /// samples, capped at [`MAX_FRAME_SIZE`]. Returns the factory the slots
    /// must be rebuilt with.
    pub fn prepare(
        &mut self,
        sample_rate: f32,
        max_block_size: usize,
        settings: &BlockSettings,
    ) -> Result<AlgorithmFactory, AnalysisError> {
        self.prepared = None;
        let max_block_size = max_block_size.min(MAX_FRAME_SIZE);

        let config = AlgorithmConfig::new(sample_rate, max_block_size);
        config.validate()?;

        let (lowpass_hz, highpass_hz) = settings
            .band_count
            .effective_cutoffs(settings.lowpass_hz, settings.highpass_hz);

        self.prepared = Some(Prepared {
            max_block_size,
            splitters: std::array::from_fn(|_| BandSplitter::new(sample_rate, lowpass_hz, highpass_hz)),
            buffers: std::array::from_fn(|_| BandBuffers::with_capacity(max_block_size)),
            analysis: GlobalAnalysis::new(&config)?,
        });
        self.meters.reset();

        log::info!(
            "analysis prepared: {} Hz, max block {}",
            sample_rate,
            max_block_size
        );
        Ok(AlgorithmFactory::new(config))
    }

    pub fn is_prepared(&self) -> bool {
        self.prepared.is_some()
    }

    pub fn max_block_size(&self) -> Option<usize> {
        self.prepared.as_ref().map(|p| p.max_block_size)
    }

    /// Clear filter and analysis state, keeping allocations.
    pub fn reset(&mut self) {
        if let Some(p) = self.prepared.as_mut() {
            p.splitters.iter_mut().for_each(BandSplitter::reset);
            p.buffers.iter_mut().for_each(BandBuffers::clear);
            p.analysis.reset();
        }
        self.meters.reset();
    }

    /// Last split of channel 0.
    pub fn band_buffers(&self) -> Option<&BandBuffers> {
        self.prepared.as_ref().map(|p| &p.buffers[0])
    }

    pub fn process_block(&mut self, channels: &mut [&mut [f32]], settings: &BlockSettings) -> BlockOutcome {
        let Some(p) = self.prepared.as_mut() else {
            self.meters.note_skipped_block();
            return BlockOutcome::Skipped(SkipReason::NotPrepared);
        };

        let len = channels.first().map_or(0, |c| c.len());
        if len > p.max_block_size {
            mv_log!("block of {} exceeds prepared {}, skipped", len, p.max_block_size);
            self.meters.note_skipped_block();
            return BlockOutcome::Skipped(SkipReason::BlockTooLarge {
                len,
                max: p.max_block_size,
            });
        }
        if len == 0 {
            return BlockOutcome::Processed;
        }

        p.analysis.process(&channels[0][..]);
        self.meters
            .store_global(p.analysis.features(), p.analysis.spectrum());

        if !settings.band_count.is_multiband() {
            return BlockOutcome::Processed;
        }

        let (lowpass_hz, highpass_hz) = settings
            .band_count
            .effective_cutoffs(settings.lowpass_hz, settings.highpass_hz);

        for (ch, channel) in channels.iter().take(MAX_CHANNELS).enumerate() {
            p.splitters[ch].set_cutoffs(lowpass_hz, highpass_hz);
            p.splitters[ch].split(channel, &mut p.buffers[ch]);
        }

        self.slots.compute_enabled(settings.band_count, &p.buffers[0]);

        for (ch, channel) in channels.iter_mut().take(MAX_CHANNELS).enumerate() {
            mix_bands(&p.buffers[ch], settings.solo, channel);
        }

        BlockOutcome::Processed
    }
}

/// Remembers the slot choice last dispatched for every slot so that each
/// change produces exactly one selection task.
pub struct SelectionTracker {
    dispatched: SlotSelections,
}

impl Default for SelectionTracker {
    fn default() -> Self {
        Self::new([[AlgorithmKind::None; SLOTS_PER_BAND]; 3])
    }
}

impl SelectionTracker {
    pub fn new(dispatched: SlotSelections) -> Self {
        Self { dispatched }
    }

    /// Record `current` as already applied, e.g. after a full rebuild.
    pub fn sync(&mut self, current: &SlotSelections) {
        self.dispatched = *current;
    }

    /// Call `emit(band, slot_index, kind)` once for every slot whose choice
    /// differs from the last dispatched one. Each change is emitted once; a
    /// selection task the host drops is not re-sent, and the next
    /// `initialize` rebuild restores the slot from its parameter.
    pub fn dispatch_changes(&mut self, current: &SlotSelections, mut emit: impl FnMut(Band, usize, AlgorithmKind)) {
        for band in Band::ALL {
            let b = band.index();
            for i in 0..SLOTS_PER_BAND {
                let kind = current[b][i];
                if kind != self.dispatched[b][i] {
                    emit(band, i, kind);
                    self.dispatched[b][i] = kind;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MapperDevice;
    use std::f32::consts::PI;

    fn setup(max_block: usize) -> (AnalysisProcessor, Arc<SlotBank>, Arc<FeatureMeters>, AlgorithmFactory) {
        let slots = Arc::new(SlotBank::new());
        let meters = Arc::new(FeatureMeters::new());
        let mut processor = AnalysisProcessor::new(Arc::clone(&slots), Arc::clone(&meters));
        let factory = processor
            .prepare(48000.0, max_block, &BlockSettings::default())
            .unwrap();
        (processor, slots, meters, factory)
    }

    fn program(len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| {
                let t = i as f32 / 48000.0;
                0.4 * (2.0 * PI * 100.0 * t).sin()
                    + 0.3 * (2.0 * PI * 2000.0 * t).sin()
                    + 0.2 * (2.0 * PI * 9000.0 * t).sin()
            })
            .collect()
    }

    fn settings(band_count: BandCount) -> BlockSettings {
        BlockSettings {
            band_count,
            lowpass_hz: 400.0,
            highpass_hz: 5000.0,
            solo: SoloMask::default(),
        }
    }

    fn run(processor: &mut AnalysisProcessor, input: &[f32], settings: &BlockSettings) -> (Vec<f32>, Vec<f32>, BlockOutcome) {
        let mut left = input.to_vec();
        let mut right = input.to_vec();
        let outcome = {
            let mut channels: [&mut [f32]; 2] = [&mut left, &mut right];
            processor.process_block(&mut channels, settings)
        };
        (left, right, outcome)
    }

    #[test]
    fn test_multiband_output_reconstructs_input() {
        for band_count in [BandCount::Two, BandCount::Three] {
            let (mut processor, _, _, _) = setup(512);
            let input = program(512);
            let (left, right, outcome) = run(&mut processor, &input, &settings(band_count));

            assert_eq!(outcome, BlockOutcome::Processed);
            for i in 0..input.len() {
                assert!((left[i] - input[i]).abs() < 1e-5);
                assert!((right[i] - input[i]).abs() < 1e-5);
            }
        }
    }

    #[test]
    fn test_oversized_block_is_skipped_untouched() {
        let (mut processor, _, meters, _) = setup(256);
        let input = program(512);
        let mut solo = settings(BandCount::Three);
        solo.solo.low = true;

        let (left, _, outcome) = run(&mut processor, &input, &solo);
        assert_eq!(
            outcome,
            BlockOutcome::Skipped(SkipReason::BlockTooLarge { len: 512, max: 256 })
        );
        assert_eq!(left, input);
        assert_eq!(meters.blocks_skipped(), 1);
        assert_eq!(meters.blocks_analysed(), 0);
    }

    #[test]
    fn test_huge_host_blocks_are_capped() {
        let mut processor = AnalysisProcessor::new(Arc::new(SlotBank::new()), Arc::new(FeatureMeters::new()));
        let factory = processor
            .prepare(48000.0, 4 * MAX_FRAME_SIZE, &BlockSettings::default())
            .unwrap();
        assert_eq!(processor.max_block_size(), Some(MAX_FRAME_SIZE));
        assert_eq!(factory.config().frame_size, MAX_FRAME_SIZE);
    }

    #[test]
    fn test_unprepared_processor_skips() {
        let mut processor = AnalysisProcessor::new(Arc::new(SlotBank::new()), Arc::new(FeatureMeters::new()));
        let input = program(64);
        let (left, _, outcome) = run(&mut processor, &input, &settings(BandCount::Three));
        assert_eq!(outcome, BlockOutcome::Skipped(SkipReason::NotPrepared));
        assert_eq!(left, input);
    }

    #[test]
    fn test_prepare_rejects_bad_sample_rate() {
        let mut processor = AnalysisProcessor::new(Arc::new(SlotBank::new()), Arc::new(FeatureMeters::new()));
        assert!(processor
            .prepare(250_000.0, 512, &BlockSettings::default())
            .is_err());
        assert!(!processor.is_prepared());
    }

    #[test]
    fn test_solo_passes_only_soloed_band() {
        let (mut processor, _, _, _) = setup(512);
        let input = program(512);
        let mut s = settings(BandCount::Three);
        s.solo.high = true;

        let (left, _, _) = run(&mut processor, &input, &s);
        let bands = processor.band_buffers().unwrap();
        assert_eq!(left.as_slice(), bands.get(Band::High));
    }

    #[test]
    fn test_single_band_passes_through_but_analyses() {
        let (mut processor, _, meters, _) = setup(512);
        let input = program(512);
        let (left, _, outcome) = run(&mut processor, &input, &settings(BandCount::One));

        assert_eq!(outcome, BlockOutcome::Processed);
        assert_eq!(left, input);
        assert_eq!(meters.blocks_analysed(), 1);
        assert!(meters.get_loudness() > 0.0);
    }

    #[test]
    fn test_slots_follow_band_layout() {
        let (mut processor, slots, _, factory) = setup(512);
        let mut dev = MapperDevice::new("test").unwrap();
        let mut selections = [[AlgorithmKind::None; SLOTS_PER_BAND]; 3];
        selections[Band::Low.index()][0] = AlgorithmKind::Loudness;
        selections[Band::Mid.index()][0] = AlgorithmKind::Loudness;
        slots.rebuild(factory, &selections, &mut dev);

        let input = program(512);
        run(&mut processor, &input, &settings(BandCount::One));
        assert_eq!(slots.slot(Band::Low, 0).unwrap().output(), 0.0);

        run(&mut processor, &input, &settings(BandCount::Two));
        assert!(slots.slot(Band::Low, 0).unwrap().output() > 0.0);
        assert_eq!(slots.slot(Band::Mid, 0).unwrap().output(), 0.0);

        run(&mut processor, &input, &settings(BandCount::Three));
        assert!(slots.slot(Band::Mid, 0).unwrap().output() > 0.0);
    }

    #[test]
    fn test_selection_tracker_emits_each_change_once() {
        let mut tracker = SelectionTracker::default();
        let mut current = [[AlgorithmKind::None; SLOTS_PER_BAND]; 3];
        current[0][1] = AlgorithmKind::Pitch;

        let mut emitted = Vec::new();
        tracker.dispatch_changes(&current, |band, slot, kind| emitted.push((band, slot, kind)));
        tracker.dispatch_changes(&current, |band, slot, kind| emitted.push((band, slot, kind)));
        assert_eq!(emitted, vec![(Band::Low, 1, AlgorithmKind::Pitch)]);

        current[0][1] = AlgorithmKind::None;
        tracker.dispatch_changes(&current, |band, slot, kind| emitted.push((band, slot, kind)));
        assert_eq!(emitted.last(), Some(&(Band::Low, 1, AlgorithmKind::None)));
        assert_eq!(emitted.len(), 2);
    }

    #[test]
    fn test_selection_tracker_sync_suppresses_dispatch() {
        let mut tracker = SelectionTracker::default();
        let current = [[AlgorithmKind::Loudness; SLOTS_PER_BAND]; 3];
        tracker.sync(&current);

        let mut emitted = 0;
        tracker.dispatch_changes(&current, |_, _, _| emitted += 1);
        assert_eq!(emitted, 0);
    }
}
