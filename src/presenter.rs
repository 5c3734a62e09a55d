//! Presentation loop.
//!
//! A plain thread wakes every [`PRESENT_INTERVAL_MS`], copies the latched slot
//! outputs and global features to the signal device and services it. The
//! audio thread never touches the device.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::analysis::pipeline::SPECTRUM_SIGNAL_SIZE;
use crate::debug;
use crate::meters::{FeatureMeters, NO_PITCH};
use crate::slots::SlotBank;
use crate::transport::{MapperDevice, SignalId, SignalSpec, SignalTransport, TransportError};

pub const PRESENT_INTERVAL_MS: u64 = 30;
/// Free host parameters forwarded as `Automatable_1..N`.
pub const NUM_AUTOMATABLES: usize = 5;

/// Latest automatable parameter values, written by the audio thread.
pub struct Automatables {
    values: [AtomicU32; NUM_AUTOMATABLES],
}

impl Default for Automatables {
    fn default() -> Self {
        Self {
            values: std::array::from_fn(|_| AtomicU32::new(0)),
        }
    }
}

impl Automatables {
    pub fn set(&self, index: usize, value: f32) {
        if let Some(a) = self.values.get(index) {
            a.store(value.to_bits(), Ordering::Relaxed);
        }
    }

    pub fn get(&self, index: usize) -> f32 {
        self.values
            .get(index)
            .map_or(0.0, |a| f32::from_bits(a.load(Ordering::Relaxed)))
    }
}

/// Handles of the always-present signals on one device.
pub struct GlobalSignals {
    spectral_centroid: Option<SignalId>,
    spectrum: Option<SignalId>,
    pitch: Option<SignalId>,
    loudness: Option<SignalId>,
    onset: Option<SignalId>,
    dissonance: Option<SignalId>,
    automatables: [Option<SignalId>; NUM_AUTOMATABLES],
    /// Last published automatable values; NaN forces the first publication.
    published_automatables: [f32; NUM_AUTOMATABLES],
}

fn add_signal(transport: &mut dyn SignalTransport, spec: SignalSpec) -> Option<SignalId> {
    let name = spec.name.clone();
    transport
        .add_output_signal(spec)
        .map_err(|e| log::warn!("cannot add signal '{}': {}", name, e))
        .ok()
}

fn publish(transport: &mut dyn SignalTransport, id: Option<SignalId>, values: &[f32]) -> bool {
    let Some(id) = id else {
        return false;
    };
    match transport.update(id, values) {
        Ok(published) => published,
        Err(e) => {
            log::debug!("signal {}: {}", id, e);
            false
        }
    }
}

impl GlobalSignals {
    pub fn register(transport: &mut dyn SignalTransport) -> Self {
        Self {
            spectral_centroid: add_signal(transport, SignalSpec::scalar("spectralCentroid", 0.0, 22050.0)),
            spectrum: add_signal(
                transport,
                SignalSpec::vector("spectrum", SPECTRUM_SIGNAL_SIZE, 0.0, 1.0),
            ),
            pitch: add_signal(transport, SignalSpec::scalar("pitchYIN", NO_PITCH, 5000.0)),
            loudness: add_signal(transport, SignalSpec::scalar("loudness", 0.0, 1000.0)),
            onset: add_signal(transport, SignalSpec::scalar("onsetDetection", 0.0, 1000.0)),
            dissonance: add_signal(transport, SignalSpec::scalar("dissonance", 0.0, 1.0)),
            automatables: std::array::from_fn(|i| {
                add_signal(transport, SignalSpec::scalar(format!("Automatable_{}", i + 1), 0.0, 1.0))
            }),
            published_automatables: [f32::NAN; NUM_AUTOMATABLES],
        }
    }

    /// Push the latest global features and every changed automatable.
    pub fn publish(&mut self, meters: &FeatureMeters, automatables: &Automatables, transport: &mut dyn SignalTransport) {
        let mut spectrum = [0.0; SPECTRUM_SIGNAL_SIZE];
        meters.spectrum_into(&mut spectrum);

        publish(transport, self.spectral_centroid, &[meters.get_spectral_centroid()]);
        publish(transport, self.spectrum, &spectrum);
        publish(transport, self.pitch, &[meters.get_pitch_display()]);
        publish(transport, self.loudness, &[meters.get_loudness()]);
        publish(transport, self.onset, &[meters.get_onset()]);
        publish(transport, self.dissonance, &[meters.get_dissonance()]);

        for (i, (&id, last)) in self
            .automatables
            .iter()
            .zip(self.published_automatables.iter_mut())
            .enumerate()
        {
            let value = automatables.get(i);
            if value != *last && publish(transport, id, &[value]) {
                *last = value;
            }
        }
    }
}

/// The signal device plus the global signals registered on it.
pub struct SignalHub {
    device: MapperDevice,
    globals: GlobalSignals,
}

impl SignalHub {
    pub fn new(name: &str) -> Result<Self, TransportError> {
        let mut device = MapperDevice::new(name)?;
        let globals = GlobalSignals::register(&mut device);
        Ok(Self { device, globals })
    }

    pub fn device(&self) -> &MapperDevice {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut MapperDevice {
        &mut self.device
    }

    /// Replace the device with a new one called `name` and register the
    /// global and active slot signals on it. The old device is kept if the
    /// new one cannot be built.
    pub fn setup_device(&mut self, name: &str, bank: &SlotBank) -> Result<(), TransportError> {
        let mut device = MapperDevice::new(name)?;
        let globals = GlobalSignals::register(&mut device);
        bank.reattach(&mut device);

        let old = std::mem::replace(&mut self.device, device);
        self.globals = globals;
        log::info!("signal device '{}' replaced by '{}'", old.name(), self.device.name());
        if log::log_enabled!(log::Level::Debug) {
            match self.device.describe() {
                Ok(json) => log::debug!("signal device layout:\n{}", json),
                Err(e) => log::warn!("cannot describe signal device: {}", e),
            }
        }
        Ok(())
    }

    /// One presentation tick. Returns the number of publications.
    pub fn present(&mut self, bank: &SlotBank, meters: &FeatureMeters, automatables: &Automatables) -> usize {
        for slot in bank.iter() {
            if let Some(presentation) = slot.present() {
                publish(&mut self.device, presentation.signal, &[presentation.value]);
            }
        }
        self.globals.publish(meters, automatables, &mut self.device);
        self.device.poll()
    }
}

/// `None` until the plugin is initialised.
pub type SharedHub = Arc<Mutex<Option<SignalHub>>>;

pub fn lock_hub(hub: &Mutex<Option<SignalHub>>) -> MutexGuard<'_, Option<SignalHub>> {
    hub.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Owner of the presentation thread. Stops and joins it on drop.
pub struct Presenter {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Presenter {
    pub fn start(
        hub: SharedHub,
        bank: Arc<SlotBank>,
        meters: Arc<FeatureMeters>,
        automatables: Arc<Automatables>,
    ) -> std::io::Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);

        let handle = std::thread::Builder::new()
            .name("music-vis-presenter".into())
            .spawn(move || {
                log::debug!("presenter started");
                let period = Duration::from_millis(PRESENT_INTERVAL_MS);
                let mut next_tick = Instant::now();
                while flag.load(Ordering::Acquire) {
                    if let Some(hub) = lock_hub(&hub).as_mut() {
                        hub.present(&bank, &meters, &automatables);
                    }
                    debug::forward_to_log();

                    // Fixed cadence; a late tick is not made up for.
                    next_tick += period;
                    let now = Instant::now();
                    match next_tick.checked_duration_since(now) {
                        Some(wait) => std::thread::sleep(wait),
                        None => next_tick = now,
                    }
                }
                log::debug!("presenter stopped");
            })?;

        Ok(Self {
            running,
            handle: Some(handle),
        })
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some() && self.running.load(Ordering::Acquire)
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::warn!("presenter thread panicked");
            }
        }
    }
}

impl Drop for Presenter {
    fn drop(&mut self) {
        self.stop();
    }
}
