//! Editor data model.
//!
//! Readouts are copied out of the shared meters by a timer and pushed into the
//! model as an event, so labels can bind to them with plain lenses.

use crate::meters::{FeatureMeters, NO_PITCH};
use crate::slots::{SlotBank, SLOTS_PER_BAND};
use crate::{MusicVisParams, MusicVisPlugin, MusicVisTask};
use nih_plug::prelude::AsyncExecutor;
use nih_plug_vizia::vizia::prelude::*;
use std::sync::Arc;

#[derive(Debug, Clone, Default, PartialEq, Data)]
pub struct Readouts {
    pub spectral_centroid: f32,
    pub pitch: f32,
    pub loudness: f32,
    pub onset: f32,
    pub dissonance: f32,
    pub momentary_lufs: f32,
    pub chord: String,
    /// Presented slot values, band-major.
    pub slots: Vec<f32>,
}

impl Readouts {
    pub fn capture(meters: &FeatureMeters, bank: &SlotBank) -> Self {
        Self {
            spectral_centroid: meters.get_spectral_centroid(),
            pitch: meters.get_pitch_display(),
            loudness: meters.get_loudness(),
            onset: meters.get_onset(),
            dissonance: meters.get_dissonance(),
            momentary_lufs: meters.get_momentary_lufs(),
            chord: meters
                .get_strongest_chord()
                .map_or_else(|| "-".to_string(), |c| c.name().to_string()),
            slots: bank.iter().map(|s| s.presented()).collect(),
        }
    }

    pub fn slot(&self, band_index: usize, slot_index: usize) -> f32 {
        self.slots
            .get(band_index * SLOTS_PER_BAND + slot_index)
            .copied()
            .unwrap_or(0.0)
    }

    pub fn pitch_label(&self) -> String {
        if self.pitch == NO_PITCH {
            "-".to_string()
        } else {
            format!("{:.1} Hz", self.pitch)
        }
    }
}

#[derive(Lens)]
pub struct MusicVisData {
    pub params: Arc<MusicVisParams>,
    pub readouts: Readouts,
    pub device_name: String,
    pub executor: AsyncExecutor<MusicVisPlugin>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReadoutEvent {
    Update(Readouts),
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    Rename(String),
}

impl Model for MusicVisData {
    fn event(&mut self, cx: &mut EventContext, event: &mut Event) {
        event.map(|readout_event, _| match readout_event {
            ReadoutEvent::Update(readouts) => {
                if *readouts != self.readouts {
                    self.readouts = readouts.clone();
                }
                cx.needs_redraw();
            }
        });

        event.map(|device_event, _| match device_event {
            DeviceEvent::Rename(name) => {
                let name = name.trim().to_string();
                if !name.is_empty() && name != self.device_name {
                    self.device_name = name.clone();
                    self.executor
                        .execute_background(MusicVisTask::SetupDevice(name));
                }
            }
        });
    }
}
