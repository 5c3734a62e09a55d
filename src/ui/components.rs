//! Reusable UI component builders
//!
//! Thin wrappers around nih_plug's param widgets so every control in the
//! editor shares the same layout and CSS classes.

use crate::ui::state::MusicVisData;
use crate::MusicVisParams;
use nih_plug::params::Param;
use nih_plug::prelude::{BoolParam, Enum, EnumParam, GuiContext, ParamSetter};
use nih_plug_vizia::vizia::prelude::*;
use nih_plug_vizia::widgets::param_base::ParamWidgetBase;
use nih_plug_vizia::widgets::*;
use std::sync::Arc;

// SLIDER HELPERS
pub fn create_slider<'a, P>(
    cx: &'a mut Context,
    label: &'static str,
    map: impl Fn(&Arc<MusicVisParams>) -> &P + Copy + 'static,
) -> Handle<'a, HStack>
where
    P: Param + 'static,
{
    HStack::new(cx, move |cx| {
        Label::new(cx, label).class("slider-label").text_wrap(false);
        ParamSlider::new(cx, MusicVisData::params, map).class("fill-width");
    })
    .class("slider-row")
}

pub fn create_toggle<'a>(
    cx: &'a mut Context,
    map: impl Fn(&Arc<MusicVisParams>) -> &BoolParam + Copy + 'static,
) -> Handle<'a, ParamButton> {
    ParamButton::new(cx, MusicVisData::params, map).class("solo-button")
}

// DROPDOWN HELPERS
/// Dropdown listing every variant of an enum parameter.
pub fn create_enum_dropdown<'a, T>(
    cx: &'a mut Context,
    label: &'static str,
    params: Arc<MusicVisParams>,
    gui: Arc<dyn GuiContext>,
    map: impl Fn(&Arc<MusicVisParams>) -> &EnumParam<T> + Copy + 'static,
) -> Handle<'a, HStack>
where
    T: Enum + PartialEq + 'static,
{
    HStack::new(cx, move |cx| {
        Label::new(cx, label).class("dropdown-label");

        let lens = ParamWidgetBase::make_lens(MusicVisData::params, map, |p: &EnumParam<T>| {
            p.normalized_value_to_string(p.unmodulated_normalized_value(), true)
        });

        Dropdown::new(
            cx,
            move |cx| Label::new(cx, lens).class("dropdown-selected"),
            move |cx| {
                let params_list = params.clone();
                let gui_list = gui.clone();

                VStack::new(cx, move |cx| {
                    for (index, name) in T::variants().iter().enumerate() {
                        let params_item = params_list.clone();
                        let gui_item = gui_list.clone();

                        Label::new(cx, *name)
                            .class("dropdown-option")
                            .on_press(move |cx| {
                                let param = map(&params_item);
                                let setter = ParamSetter::new(gui_item.as_ref());
                                setter.begin_set_parameter(param);
                                setter.set_parameter(param, T::from_index(index));
                                setter.end_set_parameter(param);
                                cx.emit(PopupEvent::Close);
                            });
                    }
                })
                .class("dropdown-options");
            },
        )
        .class("dropdown-box");
    })
    .class("dropdown-row")
}

// READOUT HELPERS
pub fn create_readout<'a, L>(cx: &'a mut Context, label: &'static str, value: L) -> Handle<'a, HStack>
where
    L: Lens<Target = String>,
{
    HStack::new(cx, move |cx| {
        Label::new(cx, label).class("readout-label");
        Label::new(cx, value).class("readout-value");
    })
    .class("readout-row")
}
