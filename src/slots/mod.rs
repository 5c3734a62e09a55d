//! Per-band feature slots.

pub mod bank;
pub mod slot;

pub use bank::{BandSlotGroup, SlotBank, SlotSelections};
pub use slot::{FeatureSlot, Presentation, SlotState};

/// Feature slots available in every band.
pub const SLOTS_PER_BAND: usize = 2;
