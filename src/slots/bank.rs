use std::sync::Mutex;

use crate::analysis::{AlgorithmFactory, AlgorithmKind};
use crate::bands::{Band, BandBuffers, BandCount};
use crate::transport::SignalTransport;

use super::slot::FeatureSlot;
use super::SLOTS_PER_BAND;

/// Slot choices of every band, indexed `[band][slot]`.
pub type SlotSelections = [[AlgorithmKind; SLOTS_PER_BAND]; 3];

/// Fixed, ordered set of feature slots for one band.
pub struct BandSlotGroup {
    band: Band,
    slots: [FeatureSlot; SLOTS_PER_BAND],
}

impl BandSlotGroup {
    pub fn new(band: Band) -> Self {
        Self {
            band,
            slots: std::array::from_fn(|i| FeatureSlot::new(band, i + 1)),
        }
    }

    pub fn band(&self) -> Band {
        self.band
    }

    /// Slot at 0-based `index`.
    pub fn slot(&self, index: usize) -> Option<&FeatureSlot> {
        self.slots.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FeatureSlot> {
        self.slots.iter()
    }

    /// Compute every slot in slot order. Audio thread.
    #[inline]
    pub fn compute(&self, buffers: &BandBuffers) {
        for slot in &self.slots {
            slot.compute(buffers);
        }
    }
}

/// The three band groups plus the factory used to fill them.
///
/// Shared between the audio thread (`compute_enabled`), the background task
/// thread (`select`) and the presenter (`iter`).
pub struct SlotBank {
    groups: [BandSlotGroup; 3],
    factory: Mutex<Option<AlgorithmFactory>>,
}

impl Default for SlotBank {
    fn default() -> Self {
        Self::new()
    }
}

impl SlotBank {
    pub fn new() -> Self {
        Self {
            groups: Band::ALL.map(BandSlotGroup::new),
            factory: Mutex::new(None),
        }
    }

    pub fn group(&self, band: Band) -> &BandSlotGroup {
        &self.groups[band.index()]
    }

    pub fn slot(&self, band: Band, index: usize) -> Option<&FeatureSlot> {
        self.group(band).slot(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FeatureSlot> {
        self.groups.iter().flat_map(BandSlotGroup::iter)
    }

    pub fn factory(&self) -> Option<AlgorithmFactory> {
        *self
            .factory
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Apply one selection change. Before the first `rebuild` there is no
    /// factory: only "-" can be applied and anything else waits for the
    /// rebuild, which reads the current choices anyway.
    pub fn select(
        &self,
        band: Band,
        index: usize,
        kind: AlgorithmKind,
        transport: &mut dyn SignalTransport,
    ) -> bool {
        let Some(slot) = self.slot(band, index) else {
            log::warn!("no slot {} in band {}", index + 1, band);
            return false;
        };
        match self.factory() {
            Some(factory) => slot.select(kind, &factory, transport),
            None if kind.is_none() => {
                let was_active = !slot.kind().is_none();
                slot.clear(transport);
                was_active
            }
            None => {
                log::debug!("{} Slot {}: not prepared, {} deferred", band, index + 1, kind.name());
                false
            }
        }
    }

    /// Tear every slot down and rebuild it from `selections` with a factory
    /// for the new sample rate / frame size.
    pub fn rebuild(
        &self,
        factory: AlgorithmFactory,
        selections: &SlotSelections,
        transport: &mut dyn SignalTransport,
    ) {
        *self
            .factory
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(factory);

        for group in &self.groups {
            for (slot, &kind) in group.iter().zip(selections[group.band().index()].iter()) {
                slot.clear(transport);
                slot.select(kind, &factory, transport);
            }
        }
    }

    /// Compute the slots of every band enabled by `band_count`. Audio thread.
    #[inline]
    pub fn compute_enabled(&self, band_count: BandCount, buffers: &BandBuffers) {
        for group in &self.groups {
            if band_count.is_band_enabled(group.band()) {
                group.compute(buffers);
            }
        }
    }

    /// Register every active slot on a newly built device.
    pub fn reattach(&self, transport: &mut dyn SignalTransport) {
        for slot in self.iter() {
            slot.reattach(transport);
        }
    }

    pub fn teardown(&self, transport: &mut dyn SignalTransport) {
        for slot in self.iter() {
            slot.clear(transport);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::AlgorithmConfig;
    use crate::slots::SlotState;
    use crate::transport::MapperDevice;

    fn factory() -> AlgorithmFactory {
        AlgorithmFactory::new(AlgorithmConfig::new(48000.0, 256))
    }

    fn buffers() -> BandBuffers {
        let mut b = BandBuffers::with_capacity(256);
        b.set_len(256);
        let (low, mid, high) = b.split_mut();
        low.iter_mut().for_each(|s| *s = 0.5);
        mid.iter_mut().for_each(|s| *s = 0.5);
        high.iter_mut().for_each(|s| *s = 0.5);
        b
    }

    fn all_loudness() -> SlotSelections {
        [[AlgorithmKind::Loudness; SLOTS_PER_BAND]; 3]
    }

    #[test]
    fn test_groups_are_fixed_and_ordered() {
        let bank = SlotBank::new();
        for band in Band::ALL {
            let group = bank.group(band);
            assert_eq!(group.band(), band);
            let indices: Vec<usize> = group.iter().map(FeatureSlot::index).collect();
            assert_eq!(indices, vec![1, 2]);
        }
        assert!(bank.slot(Band::Low, SLOTS_PER_BAND).is_none());
        assert_eq!(bank.iter().count(), 3 * SLOTS_PER_BAND);
    }

    #[test]
    fn test_two_band_mode_skips_mid() {
        let bank = SlotBank::new();
        let mut dev = MapperDevice::new("test").unwrap();
        bank.rebuild(factory(), &all_loudness(), &mut dev);

        bank.compute_enabled(BandCount::Two, &buffers());

        assert!(bank.slot(Band::Low, 0).unwrap().output() > 0.0);
        assert!(bank.slot(Band::High, 1).unwrap().output() > 0.0);
        assert!(bank.group(Band::Mid).iter().all(|s| s.output() == 0.0));
    }

    #[test]
    fn test_single_band_computes_nothing() {
        let bank = SlotBank::new();
        let mut dev = MapperDevice::new("test").unwrap();
        bank.rebuild(factory(), &all_loudness(), &mut dev);

        bank.compute_enabled(BandCount::One, &buffers());
        assert!(bank.iter().all(|s| s.output() == 0.0));

        bank.compute_enabled(BandCount::Three, &buffers());
        assert!(bank.iter().all(|s| s.output() > 0.0));
    }

    #[test]
    fn test_three_band_low_slot_sequence() {
        let bank = SlotBank::new();
        let mut dev = MapperDevice::new("test").unwrap();
        bank.rebuild(factory(), &[[AlgorithmKind::None; SLOTS_PER_BAND]; 3], &mut dev);

        bank.select(Band::Low, 0, AlgorithmKind::Loudness, &mut dev);
        bank.select(Band::Low, 0, AlgorithmKind::None, &mut dev);
        bank.select(Band::Low, 0, AlgorithmKind::Loudness, &mut dev);

        let slot = bank.slot(Band::Low, 0).unwrap();
        assert_eq!(slot.state(), SlotState::Active);
        assert_eq!(slot.constructions(), 2);
        assert_eq!(dev.signal_count(), 1);
    }

    #[test]
    fn test_rebuild_replaces_instances() {
        let bank = SlotBank::new();
        let mut dev = MapperDevice::new("test").unwrap();
        bank.rebuild(factory(), &all_loudness(), &mut dev);
        let before = bank.slot(Band::Mid, 1).unwrap().generation().unwrap();

        let bigger = AlgorithmFactory::new(AlgorithmConfig::new(96000.0, 1024));
        bank.rebuild(bigger, &all_loudness(), &mut dev);

        assert_eq!(bank.factory(), Some(bigger));
        assert!(bank.slot(Band::Mid, 1).unwrap().generation().unwrap() > before);
        assert_eq!(dev.signal_count(), 3 * SLOTS_PER_BAND);
    }

    #[test]
    fn test_select_before_prepare_is_deferred() {
        let bank = SlotBank::new();
        let mut dev = MapperDevice::new("test").unwrap();
        assert!(!bank.select(Band::High, 0, AlgorithmKind::Loudness, &mut dev));
        assert_eq!(bank.slot(Band::High, 0).unwrap().state(), SlotState::Idle);
        assert!(!bank.select(Band::High, 5, AlgorithmKind::Loudness, &mut dev));
    }

    #[test]
    fn test_reattach_and_teardown() {
        let bank = SlotBank::new();
        let mut dev = MapperDevice::new("first").unwrap();
        let mut selections = [[AlgorithmKind::None; SLOTS_PER_BAND]; 3];
        selections[0][0] = AlgorithmKind::Loudness;
        selections[2][1] = AlgorithmKind::SpectralCentroid;
        bank.rebuild(factory(), &selections, &mut dev);
        assert_eq!(dev.signal_count(), 2);

        let mut fresh = MapperDevice::new("second").unwrap();
        bank.reattach(&mut fresh);
        assert_eq!(fresh.signal_count(), 2);
        assert!(fresh.find("High Slot 2: Spectral Centroid").is_some());

        bank.teardown(&mut fresh);
        assert_eq!(fresh.signal_count(), 0);
        assert!(bank.iter().all(|s| s.state() == SlotState::Idle));
    }
}
