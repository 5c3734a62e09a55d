//! Signal-routing transport.
//!
//! Features leave the plugin as named output signals on a device. The
//! [`SignalTransport`] trait is all the slots and the presenter know about;
//! [`MapperDevice`] is the in-process implementation.

pub mod device;

pub use device::MapperDevice;

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Default update rate of every output signal.
pub const SIGNAL_RATE_HZ: f32 = 30.0;

/// Handle of a registered signal, unique within one device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SignalId(pub(crate) u32);

impl fmt::Display for SignalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Declaration of an output signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalSpec {
    pub name: String,
    /// Number of values per update; 1 for scalars.
    pub length: usize,
    pub min: f32,
    pub max: f32,
    /// Maximum publication rate.
    pub rate_hz: f32,
}

impl SignalSpec {
    pub fn scalar(name: impl Into<String>, min: f32, max: f32) -> Self {
        Self::vector(name, 1, min, max)
    }

    pub fn vector(name: impl Into<String>, length: usize, min: f32, max: f32) -> Self {
        Self {
            name: name.into(),
            length,
            min,
            max,
            rate_hz: SIGNAL_RATE_HZ,
        }
    }

    pub fn with_rate(mut self, rate_hz: f32) -> Self {
        self.rate_hz = rate_hz;
        self
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TransportError {
    #[error("invalid device name {0:?}")]
    InvalidDeviceName(String),

    #[error("invalid signal name {0:?}")]
    InvalidSignalName(String),

    #[error("signal {0:?} is already registered")]
    DuplicateSignal(String),

    #[error("signal {0:?} needs a positive length and rate")]
    InvalidSignalShape(String),

    #[error("unknown signal {0}")]
    UnknownSignal(SignalId),

    #[error("signal {name:?} expects {expected} values, got {actual}")]
    LengthMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },
}

/// Device that exports named numeric signals.
pub trait SignalTransport: Send {
    fn add_output_signal(&mut self, spec: SignalSpec) -> Result<SignalId, TransportError>;

    fn remove_signal(&mut self, id: SignalId) -> Result<(), TransportError>;

    /// Set the signal's value. Returns whether the value was published now or
    /// held back by the signal's rate limit.
    fn update(&mut self, id: SignalId, values: &[f32]) -> Result<bool, TransportError>;

    /// Service the device. Returns the number of publications since the
    /// previous poll.
    fn poll(&mut self) -> usize;

    fn signal_count(&self) -> usize;
}
