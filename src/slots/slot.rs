//! Feature Slot
//!
//! One user-selectable feature bound to one band. The audio thread calls
//! [`FeatureSlot::compute`] every block while the background task thread may
//! be swapping the algorithm underneath it.
//!
//! # Protocol
//! - Writers (`select`, `clear`, `reattach`) serialise on a per-slot writer
//!   lock and bracket every teardown/construct with the `is_changing` flag
//! - `compute` loads the flag, then `try_lock`s the binding and loads the flag
//!   again. Any failure skips the frame: the output keeps its last value
//! - Algorithms are constructed and dropped outside the binding lock, so the
//!   audio thread never waits on an allocation
//!
//! # States
//! - **Idle**: no algorithm
//! - **Active**: algorithm bound to the band buffer, computed every block
//! - **Reconfiguring**: `is_changing` is set

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::analysis::{AlgorithmFactory, AlgorithmKind, FeatureAlgorithm};
use crate::bands::{Band, BandBuffers};
use crate::mv_log;
use crate::transport::{SignalId, SignalSpec, SignalTransport, SIGNAL_RATE_HZ};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Idle,
    Active,
    Reconfiguring,
}

/// Sets `is_changing` for its lifetime. Clearing on drop keeps a panicking
/// constructor from leaving the slot stuck in `Reconfiguring`.
pub(crate) struct ReconfigureGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> ReconfigureGuard<'a> {
    pub(crate) fn begin(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self { flag }
    }
}

impl Drop for ReconfigureGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

struct SlotBinding {
    kind: AlgorithmKind,
    input: Band,
    algorithm: Box<dyn FeatureAlgorithm>,
    generation: u64,
}

/// Value handed to the presenter for an active slot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Presentation {
    pub value: f32,
    pub signal: Option<SignalId>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct FeatureSlot {
    band: Band,
    /// 1-based position within the band.
    index: usize,

    is_changing: AtomicBool,
    binding: Mutex<Option<SlotBinding>>,
    kind: AtomicU8,

    output: AtomicU32,
    presented: AtomicU32,

    signal: Mutex<Option<SignalId>>,
    writer: Mutex<()>,
    constructions: AtomicU64,
}

impl FeatureSlot {
    pub fn new(band: Band, index: usize) -> Self {
        Self {
            band,
            index,
            is_changing: AtomicBool::new(false),
            binding: Mutex::new(None),
            kind: AtomicU8::new(AlgorithmKind::None.ordinal()),
            output: AtomicU32::new(0),
            presented: AtomicU32::new(0),
            signal: Mutex::new(None),
            writer: Mutex::new(()),
            constructions: AtomicU64::new(0),
        }
    }

    pub fn band(&self) -> Band {
        self.band
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Currently bound feature, `None` when idle.
    pub fn kind(&self) -> AlgorithmKind {
        AlgorithmKind::from_ordinal(self.kind.load(Ordering::Acquire))
    }

    pub fn state(&self) -> SlotState {
        if self.is_changing.load(Ordering::Acquire) {
            SlotState::Reconfiguring
        } else if self.kind().is_none() {
            SlotState::Idle
        } else {
            SlotState::Active
        }
    }

    /// Latest value latched by the audio thread.
    pub fn output(&self) -> f32 {
        f32::from_bits(self.output.load(Ordering::Relaxed))
    }

    /// Value last handed to the presenter.
    pub fn presented(&self) -> f32 {
        f32::from_bits(self.presented.load(Ordering::Relaxed))
    }

    pub fn signal(&self) -> Option<SignalId> {
        *lock(&self.signal)
    }

    /// Number of algorithm instances built for this slot so far.
    pub fn constructions(&self) -> u64 {
        self.constructions.load(Ordering::Relaxed)
    }

    /// Construction number of the bound instance, if any.
    pub fn generation(&self) -> Option<u64> {
        lock(&self.binding).as_ref().map(|b| b.generation)
    }

    /// Name of the output signal for `kind` in this slot,
    /// e.g. "Low Slot 1: Loudness".
    pub fn signal_name(&self, kind: AlgorithmKind) -> String {
        format!("{} Slot {}: {}", self.band.label(), self.index, kind.name())
    }

    // -------------------------------------------------------------------------
    // Writers
    // -------------------------------------------------------------------------

    /// Bind `kind` to this slot. Re-selecting the bound kind is a no-op.
    ///
    /// Construction errors leave the slot idle; they are logged, never
    /// returned. Returns whether the slot was reconfigured.
    pub fn select(
        &self,
        kind: AlgorithmKind,
        factory: &AlgorithmFactory,
        transport: &mut dyn SignalTransport,
    ) -> bool {
        let _writer = lock(&self.writer);
        if kind == self.kind() {
            return false;
        }

        let _changing = ReconfigureGuard::begin(&self.is_changing);
        self.teardown(transport);

        if kind.is_none() {
            log::debug!("{} Slot {} idle", self.band, self.index);
            return true;
        }

        let algorithm = match factory.create(kind) {
            Ok(Some(algorithm)) => algorithm,
            Ok(None) => return true,
            Err(e) => {
                log::warn!(
                    "{} Slot {}: cannot build {}: {}",
                    self.band,
                    self.index,
                    kind.name(),
                    e
                );
                return true;
            }
        };

        let generation = self.constructions.fetch_add(1, Ordering::Relaxed) + 1;
        *lock(&self.binding) = Some(SlotBinding {
            kind,
            input: self.band,
            algorithm,
            generation,
        });
        self.kind.store(kind.ordinal(), Ordering::Release);
        self.register_signal(kind, transport);

        log::debug!("{} Slot {} -> {}", self.band, self.index, kind.name());
        true
    }

    /// Tear the slot down to `Idle`.
    pub fn clear(&self, transport: &mut dyn SignalTransport) {
        let _writer = lock(&self.writer);
        if self.kind().is_none() {
            return;
        }
        let _changing = ReconfigureGuard::begin(&self.is_changing);
        self.teardown(transport);
    }

    /// Register the active slot's signal on a freshly built device. The old
    /// signal id belonged to the previous device and is dropped.
    pub fn reattach(&self, transport: &mut dyn SignalTransport) {
        let _writer = lock(&self.writer);
        lock(&self.signal).take();
        let kind = self.kind();
        if !kind.is_none() {
            self.register_signal(kind, transport);
        }
    }

    /// Drop the algorithm and the signal. Caller holds the writer lock and the
    /// reconfigure guard.
    fn teardown(&self, transport: &mut dyn SignalTransport) {
        self.kind
            .store(AlgorithmKind::None.ordinal(), Ordering::Release);
        self.output.store(0f32.to_bits(), Ordering::Relaxed);
        self.presented.store(0f32.to_bits(), Ordering::Relaxed);

        let previous = lock(&self.binding).take();
        if let Some(mut binding) = previous {
            binding.algorithm.reset();
            log::trace!(
                "{} Slot {}: released {} #{}",
                self.band,
                self.index,
                binding.kind.name(),
                binding.generation
            );
        }

        if let Some(id) = lock(&self.signal).take() {
            if let Err(e) = transport.remove_signal(id) {
                log::warn!("{} Slot {}: {}", self.band, self.index, e);
            }
        }
    }

    fn register_signal(&self, kind: AlgorithmKind, transport: &mut dyn SignalTransport) {
        let (min, max) = AlgorithmFactory::descriptor(kind).map_or((0.0, 1.0), |d| d.range);
        let spec = SignalSpec::scalar(self.signal_name(kind), min, max).with_rate(SIGNAL_RATE_HZ);
        match transport.add_output_signal(spec) {
            Ok(id) => *lock(&self.signal) = Some(id),
            Err(e) => log::warn!("{} Slot {}: {}", self.band, self.index, e),
        }
    }

    // -------------------------------------------------------------------------
    // Audio thread
    // -------------------------------------------------------------------------

    /// Run the bound algorithm on its band. Never blocks or allocates; a frame
    /// that races a reconfiguration is skipped.
    #[inline]
    pub fn compute(&self, buffers: &BandBuffers) {
        if self.is_changing.load(Ordering::Acquire) {
            return;
        }
        let Ok(mut binding) = self.binding.try_lock() else {
            mv_log!("{} Slot {}: binding busy, frame skipped", self.band, self.index);
            return;
        };
        if self.is_changing.load(Ordering::Acquire) {
            return;
        }
        if let Some(binding) = binding.as_mut() {
            let value = binding.algorithm.compute(buffers.get(binding.input));
            if value.is_finite() {
                self.output.store(value.to_bits(), Ordering::Relaxed);
            }
        }
    }

    // -------------------------------------------------------------------------
    // Presentation
    // -------------------------------------------------------------------------

    /// Copy the latched output to the presented value. `None` unless active.
    pub fn present(&self) -> Option<Presentation> {
        if self.state() != SlotState::Active {
            return None;
        }
        let value = self.output();
        self.presented.store(value.to_bits(), Ordering::Relaxed);
        Some(Presentation {
            value,
            signal: self.signal(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::AlgorithmConfig;
    use crate::transport::MapperDevice;
    use std::sync::Arc;

    fn factory() -> AlgorithmFactory {
        AlgorithmFactory::new(AlgorithmConfig::new(48000.0, 512))
    }

    fn device() -> MapperDevice {
        MapperDevice::new("test").unwrap()
    }

    fn loud_buffers() -> BandBuffers {
        let mut buffers = BandBuffers::with_capacity(512);
        buffers.set_len(512);
        let (low, mid, high) = buffers.split_mut();
        low.iter_mut().for_each(|s| *s = 0.5);
        mid.iter_mut().for_each(|s| *s = 0.25);
        high.iter_mut().for_each(|s| *s = 0.1);
        buffers
    }

    #[test]
    fn test_starts_idle() {
        let slot = FeatureSlot::new(Band::Low, 1);
        assert_eq!(slot.state(), SlotState::Idle);
        assert_eq!(slot.kind(), AlgorithmKind::None);
        assert!(slot.present().is_none());

        // Idle compute leaves the output alone
        slot.compute(&loud_buffers());
        assert_eq!(slot.output(), 0.0);
    }

    #[test]
    fn test_select_binds_and_registers() {
        let slot = FeatureSlot::new(Band::Mid, 2);
        let mut dev = device();

        assert!(slot.select(AlgorithmKind::Loudness, &factory(), &mut dev));
        assert_eq!(slot.state(), SlotState::Active);
        assert_eq!(dev.signal_count(), 1);
        assert_eq!(dev.find("Mid Slot 2: Loudness"), slot.signal());

        slot.compute(&loud_buffers());
        // Bound to the mid buffer: 512 * 0.0625 = 32
        assert!((slot.output() - 32f32.powf(0.67)).abs() < 1e-3);

        let shown = slot.present().unwrap();
        assert_eq!(shown.value, slot.output());
        assert_eq!(slot.presented(), slot.output());
    }

    #[test]
    fn test_reselect_is_idempotent() {
        let slot = FeatureSlot::new(Band::Low, 1);
        let mut dev = device();

        assert!(slot.select(AlgorithmKind::SpectralCentroid, &factory(), &mut dev));
        let generation = slot.generation();
        assert!(!slot.select(AlgorithmKind::SpectralCentroid, &factory(), &mut dev));

        assert_eq!(slot.generation(), generation);
        assert_eq!(slot.constructions(), 1);
        assert_eq!(dev.signal_count(), 1);

        // Idle re-selection of "-" is also a no-op
        let idle = FeatureSlot::new(Band::High, 1);
        assert!(!idle.select(AlgorithmKind::None, &factory(), &mut dev));
    }

    #[test]
    fn test_none_returns_to_idle_and_clears_signal() {
        let slot = FeatureSlot::new(Band::High, 1);
        let mut dev = device();
        slot.select(AlgorithmKind::Onset, &factory(), &mut dev);
        assert_eq!(dev.signal_count(), 1);

        assert!(slot.select(AlgorithmKind::None, &factory(), &mut dev));
        assert_eq!(slot.state(), SlotState::Idle);
        assert!(slot.signal().is_none());
        assert!(slot.generation().is_none());
        assert_eq!(dev.signal_count(), 0);
        assert_eq!(slot.output(), 0.0);
    }

    #[test]
    fn test_loudness_none_loudness_ends_with_fresh_instance() {
        let slot = FeatureSlot::new(Band::Low, 1);
        let mut dev = device();

        slot.select(AlgorithmKind::Loudness, &factory(), &mut dev);
        let first = slot.generation().unwrap();
        slot.select(AlgorithmKind::None, &factory(), &mut dev);
        slot.select(AlgorithmKind::Loudness, &factory(), &mut dev);

        assert_eq!(slot.state(), SlotState::Active);
        assert_eq!(slot.kind(), AlgorithmKind::Loudness);
        assert!(slot.generation().unwrap() > first);
        assert_eq!(dev.signal_count(), 1);
        assert_eq!(
            dev.signal_names().collect::<Vec<_>>(),
            vec!["Low Slot 1: Loudness"]
        );
    }

    #[test]
    fn test_switching_kind_replaces_signal() {
        let slot = FeatureSlot::new(Band::Low, 2);
        let mut dev = device();
        slot.select(AlgorithmKind::Loudness, &factory(), &mut dev);
        slot.select(AlgorithmKind::Dissonance, &factory(), &mut dev);

        assert_eq!(dev.signal_count(), 1);
        assert!(dev.find("Low Slot 2: Dissonance").is_some());
        assert!(dev.find("Low Slot 2: Loudness").is_none());
        assert_eq!(slot.constructions(), 2);
    }

    #[test]
    fn test_construction_failure_falls_back_to_idle() {
        let slot = FeatureSlot::new(Band::Low, 1);
        let mut dev = device();
        let tiny = AlgorithmFactory::new(AlgorithmConfig::new(48000.0, 16));

        slot.select(AlgorithmKind::Loudness, &factory(), &mut dev);
        assert!(slot.select(AlgorithmKind::Pitch, &tiny, &mut dev));

        assert_eq!(slot.state(), SlotState::Idle);
        assert!(slot.generation().is_none());
        assert_eq!(dev.signal_count(), 0);
        assert!(slot.present().is_none());
    }

    #[test]
    fn test_compute_while_reconfiguring_keeps_output() {
        let slot = FeatureSlot::new(Band::Low, 1);
        let mut dev = device();
        slot.select(AlgorithmKind::Loudness, &factory(), &mut dev);
        slot.compute(&loud_buffers());
        let before = slot.output();

        {
            let _changing = ReconfigureGuard::begin(&slot.is_changing);
            assert_eq!(slot.state(), SlotState::Reconfiguring);

            let mut quiet = BandBuffers::with_capacity(512);
            quiet.set_len(512);
            slot.compute(&quiet);
            assert_eq!(slot.output(), before);
            assert!(slot.present().is_none());
        }

        assert_eq!(slot.state(), SlotState::Active);
    }

    #[test]
    fn test_compute_skips_when_binding_is_held() {
        let slot = FeatureSlot::new(Band::Low, 1);
        let mut dev = device();
        slot.select(AlgorithmKind::Loudness, &factory(), &mut dev);

        let held = slot.binding.lock().unwrap();
        slot.compute(&loud_buffers());
        drop(held);
        assert_eq!(slot.output(), 0.0);
    }

    #[test]
    fn test_guard_clears_flag_on_panic() {
        let flag = AtomicBool::new(false);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _changing = ReconfigureGuard::begin(&flag);
            panic!("constructor failed");
        }));
        assert!(result.is_err());
        assert!(!flag.load(Ordering::SeqCst));
    }

    #[test]
    fn test_reattach_registers_on_new_device() {
        let slot = FeatureSlot::new(Band::High, 2);
        let mut old = device();
        slot.select(AlgorithmKind::Pitch, &factory(), &mut old);

        let mut fresh = MapperDevice::new("renamed").unwrap();
        slot.reattach(&mut fresh);
        assert_eq!(fresh.signal_count(), 1);
        assert_eq!(fresh.find("High Slot 2: Pitch (YIN)"), slot.signal());
    }

    #[test]
    fn test_concurrent_select_and_compute() {
        let slot = Arc::new(FeatureSlot::new(Band::Low, 1));
        let writer = {
            let slot = Arc::clone(&slot);
            std::thread::spawn(move || {
                let factory = factory();
                let mut dev = device();
                for i in 0..200 {
                    let kind = match i % 3 {
                        0 => AlgorithmKind::Loudness,
                        1 => AlgorithmKind::None,
                        _ => AlgorithmKind::SpectralCentroid,
                    };
                    slot.select(kind, &factory, &mut dev);
                }
                slot.select(AlgorithmKind::Loudness, &factory, &mut dev);
                dev.signal_count()
            })
        };

        let buffers = loud_buffers();
        for _ in 0..2000 {
            slot.compute(&buffers);
            assert!(slot.output().is_finite());
        }

        let signals = writer.join().unwrap();
        assert_eq!(signals, 1);
        assert_eq!(slot.state(), SlotState::Active);
        assert_eq!(slot.kind(), AlgorithmKind::Loudness);
    }
}
