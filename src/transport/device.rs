use serde::Serialize;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use super::{SignalId, SignalSpec, SignalTransport, TransportError};

struct OutputSignal {
    spec: SignalSpec,
    interval: Duration,
    value: Vec<f32>,
    last_published: Option<Instant>,
    published: u64,
}

#[derive(Serialize)]
struct SignalDescription<'a> {
    id: SignalId,
    name: &'a str,
    length: usize,
    min: f32,
    max: f32,
    rate_hz: f32,
    value: &'a [f32],
    published: u64,
}

#[derive(Serialize)]
struct DeviceDescription<'a> {
    name: &'a str,
    signals: Vec<SignalDescription<'a>>,
}

/// In-process signal device.
///
/// Keeps the latest value of every output signal and publishes at most about
/// once per signal interval. A device is never repaired in place: on failure or a
/// rename the owner builds a new one and registers its signals again.
pub struct MapperDevice {
    name: String,
    next_id: u32,
    signals: BTreeMap<SignalId, OutputSignal>,
    published_since_poll: usize,
}

/// Fraction of the nominal interval that must pass between publications.
/// The rest absorbs scheduling jitter of a timer running at the signal rate.
const MIN_INTERVAL_FRACTION: f32 = 0.75;

fn min_interval(rate_hz: f32) -> Duration {
    Duration::from_secs_f32(MIN_INTERVAL_FRACTION / rate_hz)
}

fn is_valid_name(name: &str) -> bool {
    !name.trim().is_empty() && !name.contains('/') && !name.chars().any(char::is_control)
}

impl MapperDevice {
    pub fn new(name: &str) -> Result<Self, TransportError> {
        if !is_valid_name(name) {
            return Err(TransportError::InvalidDeviceName(name.to_string()));
        }
        log::info!("signal device '{}' created", name);
        Ok(Self {
            name: name.to_string(),
            next_id: 0,
            signals: BTreeMap::new(),
            published_since_poll: 0,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn find(&self, name: &str) -> Option<SignalId> {
        self.signals
            .iter()
            .find(|(_, s)| s.spec.name == name)
            .map(|(&id, _)| id)
    }

    pub fn signal_names(&self) -> impl Iterator<Item = &str> {
        self.signals.values().map(|s| s.spec.name.as_str())
    }

    pub fn spec(&self, id: SignalId) -> Option<&SignalSpec> {
        self.signals.get(&id).map(|s| &s.spec)
    }

    /// Latest value of a signal, published or not.
    pub fn value(&self, id: SignalId) -> Option<&[f32]> {
        self.signals.get(&id).map(|s| s.value.as_slice())
    }

    pub fn published_count(&self, id: SignalId) -> Option<u64> {
        self.signals.get(&id).map(|s| s.published)
    }

    /// [`SignalTransport::update`] with an explicit clock.
    pub fn update_at(&mut self, id: SignalId, values: &[f32], now: Instant) -> Result<bool, TransportError> {
        let signal = self
            .signals
            .get_mut(&id)
            .ok_or(TransportError::UnknownSignal(id))?;

        if values.len() != signal.spec.length {
            return Err(TransportError::LengthMismatch {
                name: signal.spec.name.clone(),
                expected: signal.spec.length,
                actual: values.len(),
            });
        }

        signal.value.copy_from_slice(values);

        let due = signal
            .last_published
            .map_or(true, |last| now.saturating_duration_since(last) >= signal.interval);
        if due {
            signal.last_published = Some(now);
            signal.published += 1;
            self.published_since_poll += 1;
        }
        Ok(due)
    }

    /// JSON snapshot of the device and its signals.
    pub fn describe(&self) -> serde_json::Result<String> {
        let description = DeviceDescription {
            name: &self.name,
            signals: self
                .signals
                .iter()
                .map(|(&id, s)| SignalDescription {
                    id,
                    name: &s.spec.name,
                    length: s.spec.length,
                    min: s.spec.min,
                    max: s.spec.max,
                    rate_hz: s.spec.rate_hz,
                    value: &s.value,
                    published: s.published,
                })
                .collect(),
        };
        serde_json::to_string_pretty(&description)
    }
}

impl SignalTransport for MapperDevice {
    fn add_output_signal(&mut self, spec: SignalSpec) -> Result<SignalId, TransportError> {
        if !is_valid_name(&spec.name) {
            return Err(TransportError::InvalidSignalName(spec.name));
        }
        if spec.length == 0 || !(spec.rate_hz > 0.0) {
            return Err(TransportError::InvalidSignalShape(spec.name));
        }
        if self.find(&spec.name).is_some() {
            return Err(TransportError::DuplicateSignal(spec.name));
        }

        let id = SignalId(self.next_id);
        self.next_id += 1;

        log::debug!("device '{}': + {} ({})", self.name, spec.name, id);
        self.signals.insert(
            id,
            OutputSignal {
                interval: min_interval(spec.rate_hz),
                value: vec![spec.min.max(0.0).min(spec.max); spec.length],
                spec,
                last_published: None,
                published: 0,
            },
        );
        Ok(id)
    }

    fn remove_signal(&mut self, id: SignalId) -> Result<(), TransportError> {
        let signal = self
            .signals
            .remove(&id)
            .ok_or(TransportError::UnknownSignal(id))?;
        log::debug!("device '{}': - {} ({})", self.name, signal.spec.name, id);
        Ok(())
    }

    fn update(&mut self, id: SignalId, values: &[f32]) -> Result<bool, TransportError> {
        self.update_at(id, values, Instant::now())
    }

    fn poll(&mut self) -> usize {
        std::mem::take(&mut self.published_since_poll)
    }

    fn signal_count(&self) -> usize {
        self.signals.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_bad_names() {
        assert!(MapperDevice::new("").is_err());
        assert!(MapperDevice::new("a/b").is_err());

        let mut device = MapperDevice::new("MusicVis").unwrap();
        assert_eq!(
            device.add_output_signal(SignalSpec::scalar("  ", 0.0, 1.0)),
            Err(TransportError::InvalidSignalName("  ".to_string()))
        );
        assert!(device
            .add_output_signal(SignalSpec::vector("spectrum", 0, 0.0, 1.0))
            .is_err());
    }

    #[test]
    fn test_duplicate_and_unknown_signals() {
        let mut device = MapperDevice::new("MusicVis").unwrap();
        let id = device
            .add_output_signal(SignalSpec::scalar("loudness", 0.0, 100.0))
            .unwrap();
        assert!(matches!(
            device.add_output_signal(SignalSpec::scalar("loudness", 0.0, 100.0)),
            Err(TransportError::DuplicateSignal(_))
        ));

        device.remove_signal(id).unwrap();
        assert_eq!(device.signal_count(), 0);
        assert_eq!(device.remove_signal(id), Err(TransportError::UnknownSignal(id)));
        assert!(device.update(id, &[1.0]).is_err());
    }

    #[test]
    fn test_rate_limiting() {
        let mut device = MapperDevice::new("MusicVis").unwrap();
        let id = device
            .add_output_signal(SignalSpec::scalar("pitchYIN", 0.0, 5000.0).with_rate(30.0))
            .unwrap();

        let t0 = Instant::now();
        assert!(device.update_at(id, &[100.0], t0).unwrap());
        // Within the 33 ms interval: stored, not published
        assert!(!device.update_at(id, &[200.0], t0 + Duration::from_millis(10)).unwrap());
        assert_eq!(device.value(id), Some(&[200.0][..]));
        assert!(device.update_at(id, &[300.0], t0 + Duration::from_millis(40)).unwrap());

        assert_eq!(device.published_count(id), Some(2));
        assert_eq!(device.poll(), 2);
        assert_eq!(device.poll(), 0);
    }

    #[test]
    fn test_jittery_30ms_ticks_publish_every_tick() {
        let mut device = MapperDevice::new("MusicVis").unwrap();
        let id = device
            .add_output_signal(SignalSpec::scalar("loudness", 0.0, 1000.0).with_rate(30.0))
            .unwrap();

        // One second of 30 ms ticks, each woken up to 3 ms late.
        let t0 = Instant::now();
        let ticks = (0..34u64).map(|i| t0 + Duration::from_millis(i * 30 + (i % 4)));
        let published = ticks
            .filter(|&t| device.update_at(id, &[1.0], t).unwrap())
            .count();
        assert_eq!(published, 34);
        assert_eq!(device.published_count(id), Some(34));
    }

    #[test]
    fn test_length_mismatch() {
        let mut device = MapperDevice::new("MusicVis").unwrap();
        let id = device
            .add_output_signal(SignalSpec::vector("spectrum", 128, 0.0, 1.0))
            .unwrap();
        assert!(matches!(
            device.update(id, &[0.0; 12]),
            Err(TransportError::LengthMismatch {
                expected: 128,
                actual: 12,
                ..
            })
        ));
        assert!(device.update(id, &[0.5; 128]).unwrap());
    }

    #[test]
    fn test_describe_lists_signals() {
        let mut device = MapperDevice::new("MusicVis").unwrap();
        device
            .add_output_signal(SignalSpec::scalar("Low Slot 1: Loudness", 0.0, 100.0))
            .unwrap();

        let json: serde_json::Value = serde_json::from_str(&device.describe().unwrap()).unwrap();
        assert_eq!(json["name"], "MusicVis");
        assert_eq!(json["signals"][0]["name"], "Low Slot 1: Loudness");
        assert_eq!(json["signals"][0]["rate_hz"], 30.0);
    }
}
