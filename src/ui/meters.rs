//! Custom Vizia views drawn straight from the shared feature meters.

use crate::analysis::pipeline::SPECTRUM_SIGNAL_SIZE;
use crate::analysis::tonal::HPCP_SIZE;
use crate::dsp::utils::lin_to_db;
use crate::meters::FeatureMeters;
use nih_plug_vizia::vizia::prelude::*;
use nih_plug_vizia::vizia::vg;
use std::sync::Arc;

const SPECTRUM_FLOOR_DB: f32 = -80.0;

fn draw_frame(canvas: &mut Canvas, b: BoundingBox) {
    let mut bg = vg::Path::new();
    bg.rect(b.x, b.y, b.w, b.h);
    canvas.fill_path(&bg, &vg::Paint::color(vg::Color::rgb(15, 23, 42)));
    canvas.stroke_path(
        &bg,
        &vg::Paint::color(vg::Color::rgb(51, 65, 85)).with_line_width(1.0),
    );
}

// ============================================================================
// SPECTRUM
// ============================================================================

pub struct SpectrumView {
    meters: Arc<FeatureMeters>,
}

impl SpectrumView {
    pub fn new(cx: &mut Context, meters: Arc<FeatureMeters>) -> Handle<'_, Self> {
        Self { meters }.build(cx, |_| {})
    }
}

impl View for SpectrumView {
    fn element(&self) -> Option<&'static str> {
        Some("spectrum-view")
    }

    fn draw(&self, cx: &mut DrawContext, canvas: &mut Canvas) {
        let b = cx.bounds();
        draw_frame(canvas, b);

        let mut bins = [0.0; SPECTRUM_SIGNAL_SIZE];
        self.meters.spectrum_into(&mut bins);

        let bar_w = b.w / SPECTRUM_SIGNAL_SIZE as f32;
        let mut bars = vg::Path::new();
        for (i, &mag) in bins.iter().enumerate() {
            let norm = ((lin_to_db(mag) - SPECTRUM_FLOOR_DB) / -SPECTRUM_FLOOR_DB).clamp(0.0, 1.0);
            if norm <= 0.0 {
                continue;
            }
            let h = b.h * norm;
            bars.rect(b.x + i as f32 * bar_w, b.y + b.h - h, (bar_w - 1.0).max(1.0), h);
        }

        let paint = vg::Paint::linear_gradient(
            b.x,
            b.y + b.h,
            b.x,
            b.y,
            vg::Color::rgb(34, 197, 94),
            vg::Color::rgb(59, 130, 246),
        );
        canvas.fill_path(&bars, &paint);
    }
}

// ============================================================================
// CHROMA (HPCP)
// ============================================================================

pub struct ChromaView {
    meters: Arc<FeatureMeters>,
}

impl ChromaView {
    pub fn new(cx: &mut Context, meters: Arc<FeatureMeters>) -> Handle<'_, Self> {
        Self { meters }.build(cx, |_| {})
    }
}

impl View for ChromaView {
    fn element(&self) -> Option<&'static str> {
        Some("chroma-view")
    }

    fn draw(&self, cx: &mut DrawContext, canvas: &mut Canvas) {
        let b = cx.bounds();
        draw_frame(canvas, b);

        let hpcp = self.meters.snapshot().hpcp;
        let cell_w = b.w / HPCP_SIZE as f32;
        for (i, &v) in hpcp.iter().enumerate() {
            let level = (v.clamp(0.0, 1.0) * 255.0) as u8;
            let mut cell = vg::Path::new();
            cell.rect(b.x + i as f32 * cell_w + 1.0, b.y + 1.0, cell_w - 2.0, b.h - 2.0);
            canvas.fill_path(
                &cell,
                &vg::Paint::color(vg::Color::rgba(250, 204, 21, level)),
            );
        }
    }
}
