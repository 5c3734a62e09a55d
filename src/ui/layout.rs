//! Layout builders for the editor
//!
//! - Header with the plugin title and the signal device name
//! - Band section: band count, crossover cutoffs, solos and the slot selectors
//! - Global section: feature readouts, spectrum and chroma
//! - Automatables

use crate::analysis::AlgorithmKind;
use crate::bands::{Band, BandCount};
use crate::meters::FeatureMeters;
use crate::presenter::{NUM_AUTOMATABLES, PRESENT_INTERVAL_MS};
use crate::slots::{SlotBank, SLOTS_PER_BAND};
use crate::ui::components::{create_enum_dropdown, create_readout, create_slider, create_toggle};
use crate::ui::meters::{ChromaView, SpectrumView};
use crate::ui::state::{DeviceEvent, MusicVisData, ReadoutEvent, Readouts};
use crate::{MusicVisParams, MusicVisPlugin};
use nih_plug::prelude::{AsyncExecutor, EnumParam, FloatParam, GuiContext};
use nih_plug_vizia::vizia::prelude::*;
use std::sync::Arc;
use std::time::Duration;

type SlotParamFn = for<'p> fn(&'p Arc<MusicVisParams>) -> &'p EnumParam<AlgorithmKind>;
type AutoParamFn = for<'p> fn(&'p Arc<MusicVisParams>) -> &'p FloatParam;

const SLOT_PARAMS: [[SlotParamFn; SLOTS_PER_BAND]; 3] = [
    [|p| &p.low_slot_1, |p| &p.low_slot_2],
    [|p| &p.mid_slot_1, |p| &p.mid_slot_2],
    [|p| &p.high_slot_1, |p| &p.high_slot_2],
];

const AUTO_PARAMS: [AutoParamFn; NUM_AUTOMATABLES] = [
    |p| &p.auto_1,
    |p| &p.auto_2,
    |p| &p.auto_3,
    |p| &p.auto_4,
    |p| &p.auto_5,
];

const SLOT_LABELS: [&str; SLOTS_PER_BAND] = ["SLOT 1", "SLOT 2"];
const AUTO_LABELS: [&str; NUM_AUTOMATABLES] = ["AUTO 1", "AUTO 2", "AUTO 3", "AUTO 4", "AUTO 5"];

const STYLE: &str = r#"
    .app-root {
        background-color: #0f172a;
        color: #e2e8f0;
        child-space: 12px;
        row-between: 10px;
    }

    .header {
        height: 48px;
        col-between: 12px;
        child-top: 1s;
        child-bottom: 1s;
    }

    .header-title {
        font-size: 20px;
        font-weight: bold;
        color: #ffffff;
    }

    .section {
        background-color: #1e293b;
        border: 1px solid #334155;
        border-radius: 6px;
        child-space: 8px;
        row-between: 6px;
        height: auto;
    }

    .section-title {
        font-size: 11px;
        color: #94a3b8;
    }

    .band-column {
        row-between: 6px;
        height: auto;
    }

    .band-title {
        font-size: 13px;
        font-weight: bold;
    }

    .slider-row, .dropdown-row, .readout-row {
        height: 24px;
        col-between: 8px;
        child-top: 1s;
        child-bottom: 1s;
    }

    .slider-label, .dropdown-label, .readout-label {
        width: 90px;
        font-size: 11px;
        color: #94a3b8;
    }

    .readout-value {
        font-size: 12px;
        color: #f8fafc;
    }

    .dropdown-box {
        width: 1s;
    }

    .dropdown-option {
        height: 22px;
        child-left: 6px;
    }

    .dropdown-option:hover {
        background-color: #1d4ed8;
    }

    .solo-button {
        width: 60px;
    }

    spectrum-view {
        height: 140px;
    }

    chroma-view {
        height: 18px;
    }

    .fill-width {
        width: 1s;
    }
"#;

pub fn build_header<'a>(cx: &'a mut Context) -> Handle<'a, HStack> {
    HStack::new(cx, |cx| {
        Label::new(cx, "MUSIC VIS BACKEND").class("header-title");
        Element::new(cx).class("fill-width");
        Label::new(cx, "DEVICE").class("section-title");
        Textbox::new(cx, MusicVisData::device_name)
            .on_submit(|cx, text, _| cx.emit(DeviceEvent::Rename(text)))
            .width(Pixels(200.0));
    })
    .class("header")
}

fn build_band_column(cx: &mut Context, band: Band, params: Arc<MusicVisParams>, gui: Arc<dyn GuiContext>) {
    VStack::new(cx, move |cx| {
        HStack::new(cx, move |cx| {
            Label::new(cx, band.label()).class("band-title");
            Element::new(cx).class("fill-width");
            create_toggle(cx, move |p| p.solo(band));
        })
        .height(Pixels(26.0));

        for (i, map) in SLOT_PARAMS[band.index()].iter().copied().enumerate() {
            create_enum_dropdown(cx, SLOT_LABELS[i], params.clone(), gui.clone(), map);
            create_readout(
                cx,
                "",
                MusicVisData::readouts.map(move |r: &Readouts| format!("{:.3}", r.slot(band.index(), i))),
            );
        }
    })
    .class("band-column")
    .class("fill-width")
    // Bands without computed slots are dimmed.
    .disabled(
        MusicVisData::params.map(move |p| !p.number_of_bands.value().is_band_enabled(band)),
    );
}

pub fn build_bands<'a>(
    cx: &'a mut Context,
    params: Arc<MusicVisParams>,
    gui: Arc<dyn GuiContext>,
) -> Handle<'a, VStack> {
    VStack::new(cx, move |cx| {
        Label::new(cx, "BANDS").class("section-title");

        HStack::new(cx, |cx| {
            let p = params.clone();
            let g = gui.clone();
            VStack::new(cx, move |cx| {
                create_enum_dropdown::<BandCount>(cx, "BANDS", p.clone(), g.clone(), |p| &p.number_of_bands);
                create_slider(cx, "LOWPASS", |p| &p.lowpass_cutoff);
                create_slider(cx, "HIGHPASS", |p| &p.highpass_cutoff);
            })
            .class("fill-width")
            .height(Auto);
        })
        .height(Auto);

        HStack::new(cx, move |cx| {
            for band in Band::ALL {
                build_band_column(cx, band, params.clone(), gui.clone());
            }
        })
        .col_between(Pixels(12.0))
        .height(Auto);
    })
    .class("section")
}

pub fn build_globals<'a>(cx: &'a mut Context, meters: Arc<FeatureMeters>) -> Handle<'a, VStack> {
    VStack::new(cx, move |cx| {
        Label::new(cx, "GLOBAL").class("section-title");

        HStack::new(cx, move |cx| {
            VStack::new(cx, |cx| {
                create_readout(
                    cx,
                    "CENTROID",
                    MusicVisData::readouts.map(|r: &Readouts| format!("{:.0} Hz", r.spectral_centroid)),
                );
                create_readout(cx, "PITCH", MusicVisData::readouts.map(|r: &Readouts| r.pitch_label()));
                create_readout(
                    cx,
                    "LOUDNESS",
                    MusicVisData::readouts.map(|r: &Readouts| format!("{:.2}", r.loudness)),
                );
                create_readout(
                    cx,
                    "LUFS (M)",
                    MusicVisData::readouts.map(|r: &Readouts| format!("{:.1}", r.momentary_lufs)),
                );
                create_readout(
                    cx,
                    "ONSET",
                    MusicVisData::readouts.map(|r: &Readouts| format!("{:.2}", r.onset)),
                );
                create_readout(
                    cx,
                    "DISSONANCE",
                    MusicVisData::readouts.map(|r: &Readouts| format!("{:.3}", r.dissonance)),
                );
                create_readout(cx, "CHORD", MusicVisData::readouts.map(|r: &Readouts| r.chord.clone()));
            })
            .width(Pixels(220.0))
            .height(Auto);

            VStack::new(cx, move |cx| {
                SpectrumView::new(cx, meters.clone()).class("fill-width");
                ChromaView::new(cx, meters.clone()).class("fill-width");
            })
            .class("fill-width")
            .row_between(Pixels(6.0))
            .height(Auto);
        })
        .col_between(Pixels(12.0))
        .height(Auto);
    })
    .class("section")
}

pub fn build_automatables<'a>(cx: &'a mut Context) -> Handle<'a, VStack> {
    VStack::new(cx, |cx| {
        Label::new(cx, "AUTOMATABLES").class("section-title");
        for (label, map) in AUTO_LABELS.iter().zip(AUTO_PARAMS.iter().copied()) {
            create_slider(cx, *label, map);
        }
    })
    .class("section")
}

// ============================================================================
// MAIN UI ENTRY POINT
// ============================================================================

pub fn build_ui(
    cx: &mut Context,
    params: Arc<MusicVisParams>,
    meters: Arc<FeatureMeters>,
    bank: Arc<SlotBank>,
    executor: AsyncExecutor<MusicVisPlugin>,
    gui_context: Arc<dyn GuiContext>,
) {
    if let Err(e) = cx.add_stylesheet(STYLE) {
        log::warn!("stylesheet rejected: {:?}", e);
    }

    MusicVisData {
        params: params.clone(),
        readouts: Readouts::capture(&meters, &bank),
        device_name: params.device_name(),
        executor,
    }
    .build(cx);

    let timer_meters = meters.clone();
    let timer = cx.add_timer(Duration::from_millis(PRESENT_INTERVAL_MS), None, move |cx, action| {
        if let TimerAction::Tick(_) = action {
            cx.emit(ReadoutEvent::Update(Readouts::capture(&timer_meters, &bank)));
        }
    });
    cx.start_timer(timer);

    VStack::new(cx, move |cx| {
        build_header(cx);
        build_bands(cx, params.clone(), gui_context.clone());
        build_globals(cx, meters.clone());
        build_automatables(cx);
    })
    .class("app-root");
}
