pub mod analysis;
pub mod bands;
mod debug;
pub mod dsp;
pub mod meters;
pub mod presenter;
pub mod processor;
pub mod slots;
pub mod transport;
mod ui;

use crate::analysis::AlgorithmKind;
use crate::bands::{Band, BandCount, SoloMask};
use crate::meters::FeatureMeters;
use crate::presenter::{lock_hub, Automatables, Presenter, SharedHub, SignalHub, NUM_AUTOMATABLES};
use crate::processor::{AnalysisProcessor, BlockSettings, SelectionTracker};
use crate::slots::{SlotBank, SlotSelections, SLOTS_PER_BAND};
use anyhow::Context as _;
use assert_no_alloc::permit_alloc;
use nih_plug::prelude::*;
use nih_plug_vizia::{create_vizia_editor, ViziaState, ViziaTheming};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use ui::build_ui;

pub const DEFAULT_DEVICE_NAME: &str = "music-vis-backend";

// -----------------------------------------------------------------------------
// PARAMETERS
// -----------------------------------------------------------------------------
#[derive(Params)]
pub struct MusicVisParams {
    #[id = "numberOfBands"]
    pub number_of_bands: EnumParam<BandCount>,

    #[id = "lowpassCutoff"]
    pub lowpass_cutoff: FloatParam,

    #[id = "highpassCutoff"]
    pub highpass_cutoff: FloatParam,

    #[id = "lowSolo"]
    pub low_solo: BoolParam,

    #[id = "midSolo"]
    pub mid_solo: BoolParam,

    #[id = "highSolo"]
    pub high_solo: BoolParam,

    // -------------------------------------------------------------------------
    // FEATURE SLOTS
    // -------------------------------------------------------------------------
    #[id = "lowSlot1"]
    pub low_slot_1: EnumParam<AlgorithmKind>,

    #[id = "lowSlot2"]
    pub low_slot_2: EnumParam<AlgorithmKind>,

    #[id = "midSlot1"]
    pub mid_slot_1: EnumParam<AlgorithmKind>,

    #[id = "midSlot2"]
    pub mid_slot_2: EnumParam<AlgorithmKind>,

    #[id = "highSlot1"]
    pub high_slot_1: EnumParam<AlgorithmKind>,

    #[id = "highSlot2"]
    pub high_slot_2: EnumParam<AlgorithmKind>,

    // -------------------------------------------------------------------------
    // AUTOMATABLES
    // -------------------------------------------------------------------------
    #[id = "auto1"]
    pub auto_1: FloatParam,

    #[id = "auto2"]
    pub auto_2: FloatParam,

    #[id = "auto3"]
    pub auto_3: FloatParam,

    #[id = "auto4"]
    pub auto_4: FloatParam,

    #[id = "auto5"]
    pub auto_5: FloatParam,

    /// Name of the signal device, restored with the session.
    #[persist = "device_name"]
    pub device_name: Arc<RwLock<String>>,
}

fn cutoff_param(name: &str, default: f32) -> FloatParam {
    FloatParam::new(
        name,
        default,
        FloatRange::Skewed {
            min: 20.0,
            max: 20000.0,
            factor: FloatRange::skew_factor(-2.0),
        },
    )
    .with_value_to_string(formatters::v2s_f32_hz_then_khz(0))
    .with_string_to_value(formatters::s2v_f32_hz_then_khz())
}

fn slot_param(band: Band, index: usize, default: AlgorithmKind) -> EnumParam<AlgorithmKind> {
    EnumParam::new(format!("{} Band Slot {} Algorithm", band.label(), index), default)
}

fn automatable_param(index: usize) -> FloatParam {
    FloatParam::new(
        format!("Automatable {}", index),
        0.0,
        FloatRange::Linear { min: 0.0, max: 1.0 },
    )
    .with_value_to_string(formatters::v2s_f32_rounded(2))
}

impl Default for MusicVisParams {
    fn default() -> Self {
        Self::with_selections(&[[AlgorithmKind::None; SLOTS_PER_BAND]; 3])
    }
}

impl MusicVisParams {
    /// Default parameters with the slot selectors starting at `selections`.
    pub fn with_selections(selections: &SlotSelections) -> Self {
        let [low, mid, high] = *selections;
        Self {
            number_of_bands: EnumParam::new("Number of Bands", BandCount::One),
            lowpass_cutoff: cutoff_param("Lowpass Filter Cutoff", 3000.0),
            highpass_cutoff: cutoff_param("Highpass Filter Cutoff", 5000.0),

            low_solo: BoolParam::new("Low Band Solo", false),
            mid_solo: BoolParam::new("Mid Band Solo", false),
            high_solo: BoolParam::new("High Band Solo", false),

            low_slot_1: slot_param(Band::Low, 1, low[0]),
            low_slot_2: slot_param(Band::Low, 2, low[1]),
            mid_slot_1: slot_param(Band::Mid, 1, mid[0]),
            mid_slot_2: slot_param(Band::Mid, 2, mid[1]),
            high_slot_1: slot_param(Band::High, 1, high[0]),
            high_slot_2: slot_param(Band::High, 2, high[1]),

            auto_1: automatable_param(1),
            auto_2: automatable_param(2),
            auto_3: automatable_param(3),
            auto_4: automatable_param(4),
            auto_5: automatable_param(5),

            device_name: Arc::new(RwLock::new(DEFAULT_DEVICE_NAME.to_string())),
        }
    }

    /// Selector of slot `index` (0-based) in `band`.
    pub fn slot(&self, band: Band, index: usize) -> Option<&EnumParam<AlgorithmKind>> {
        match (band, index) {
            (Band::Low, 0) => Some(&self.low_slot_1),
            (Band::Low, 1) => Some(&self.low_slot_2),
            (Band::Mid, 0) => Some(&self.mid_slot_1),
            (Band::Mid, 1) => Some(&self.mid_slot_2),
            (Band::High, 0) => Some(&self.high_slot_1),
            (Band::High, 1) => Some(&self.high_slot_2),
            _ => None,
        }
    }

    pub fn solo(&self, band: Band) -> &BoolParam {
        match band {
            Band::Low => &self.low_solo,
            Band::Mid => &self.mid_solo,
            Band::High => &self.high_solo,
        }
    }

    pub fn automatable(&self, index: usize) -> Option<&FloatParam> {
        [&self.auto_1, &self.auto_2, &self.auto_3, &self.auto_4, &self.auto_5]
            .get(index)
            .copied()
    }

    pub fn selections(&self) -> SlotSelections {
        let mut selections = [[AlgorithmKind::None; SLOTS_PER_BAND]; 3];
        for band in Band::ALL {
            for (i, kind) in selections[band.index()].iter_mut().enumerate() {
                if let Some(param) = self.slot(band, i) {
                    *kind = param.value();
                }
            }
        }
        selections
    }

    pub fn block_settings(&self) -> BlockSettings {
        BlockSettings {
            band_count: self.number_of_bands.value(),
            lowpass_hz: self.lowpass_cutoff.value(),
            highpass_hz: self.highpass_cutoff.value(),
            solo: SoloMask {
                low: self.low_solo.value(),
                mid: self.mid_solo.value(),
                high: self.high_solo.value(),
            },
        }
    }

    pub fn device_name(&self) -> String {
        self.device_name
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_device_name(&self, name: &str) {
        *self
            .device_name
            .write()
            .unwrap_or_else(PoisonError::into_inner) = name.to_string();
    }
}

// -----------------------------------------------------------------------------
// BACKGROUND TASKS
// -----------------------------------------------------------------------------
#[derive(Debug, Clone, PartialEq)]
pub enum MusicVisTask {
    /// Rebind one slot to its parameter's current value. `slot` is 0-based.
    Select { band: Band, slot: usize },
    /// Replace the signal device with a new one of this name.
    SetupDevice(String),
}

/// Everything a background task may touch.
#[derive(Clone)]
struct TaskRunner {
    params: Arc<MusicVisParams>,
    bank: Arc<SlotBank>,
    hub: SharedHub,
}

impl TaskRunner {
    fn run(&self, task: MusicVisTask) {
        let mut hub = lock_hub(&self.hub);
        match task {
            MusicVisTask::Select { band, slot } => {
                // The queued change may be older than the last rebuild.
                let Some(kind) = self.params.slot(band, slot).map(|p| p.value()) else {
                    log::warn!("no slot {} in band {}", slot + 1, band);
                    return;
                };
                match hub.as_mut() {
                    Some(hub) => {
                        self.bank.select(band, slot, kind, hub.device_mut());
                    }
                    None => log::debug!("{} Slot {}: no device yet, {} deferred", band, slot + 1, kind.name()),
                }
            }
            MusicVisTask::SetupDevice(name) => {
                let result = match hub.as_mut() {
                    Some(hub) => hub.setup_device(&name, &self.bank),
                    None => Ok(()),
                };
                match result {
                    Ok(()) => self.params.set_device_name(&name),
                    Err(e) => log::warn!("cannot set up device '{}': {}", name, e),
                }
            }
        }
    }
}

// -----------------------------------------------------------------------------
// PLUGIN STRUCT
// -----------------------------------------------------------------------------
pub struct MusicVisPlugin {
    params: Arc<MusicVisParams>,
    editor_state: Arc<ViziaState>,

    processor: AnalysisProcessor,
    tracker: SelectionTracker,

    bank: Arc<SlotBank>,
    meters: Arc<FeatureMeters>,
    automatables: Arc<Automatables>,
    hub: SharedHub,
    presenter: Option<Presenter>,
}

impl Default for MusicVisPlugin {
    fn default() -> Self {
        let bank = Arc::new(SlotBank::new());
        let meters = Arc::new(FeatureMeters::new());
        Self {
            params: Arc::new(MusicVisParams::default()),
            editor_state: ViziaState::new(|| (860, 760)),
            processor: AnalysisProcessor::new(bank.clone(), meters.clone()),
            tracker: SelectionTracker::default(),
            bank,
            meters,
            automatables: Arc::new(Automatables::default()),
            hub: Arc::new(Mutex::new(None)),
            presenter: None,
        }
    }
}

impl Plugin for MusicVisPlugin {
    const NAME: &'static str = "Music Vis Backend";
    const VENDOR: &'static str = "Max Graf";
    const URL: &'static str = "";
    const EMAIL: &'static str = "";
    const VERSION: &'static str = env!("CARGO_PKG_VERSION");

    const AUDIO_IO_LAYOUTS: &'static [AudioIOLayout] = &[AudioIOLayout {
        main_input_channels: NonZeroU32::new(2),
        main_output_channels: NonZeroU32::new(2),
        ..AudioIOLayout::const_default()
    }];

    const MIDI_INPUT: MidiConfig = MidiConfig::None;
    const SAMPLE_ACCURATE_AUTOMATION: bool = false;

    type SysExMessage = ();
    type BackgroundTask = MusicVisTask;

    fn params(&self) -> Arc<dyn Params> {
        self.params.clone()
    }

    fn initialize(
        &mut self,
        _audio_io_layout: &AudioIOLayout,
        buffer_config: &BufferConfig,
        _context: &mut impl InitContext<Self>,
    ) -> bool {
        #[cfg(feature = "debug")]
        crate::debug::ring::init();

        std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            match permit_alloc(|| self.initialize_internal(buffer_config)) {
                Ok(()) => true,
                Err(e) => {
                    log::error!("initialisation failed: {:#}", e);
                    false
                }
            }
        }))
        .unwrap_or(false)
    }

    fn editor(&mut self, async_executor: AsyncExecutor<Self>) -> Option<Box<dyn Editor>> {
        let params = self.params.clone();
        let meters = self.meters.clone();
        let bank = self.bank.clone();
        create_vizia_editor(
            self.editor_state.clone(),
            ViziaTheming::default(),
            move |cx, gui_context| {
                build_ui(
                    cx,
                    params.clone(),
                    meters.clone(),
                    bank.clone(),
                    async_executor.clone(),
                    gui_context,
                );
            },
        )
    }

    fn task_executor(&mut self) -> TaskExecutor<Self> {
        let runner = TaskRunner {
            params: self.params.clone(),
            bank: self.bank.clone(),
            hub: self.hub.clone(),
        };
        Box::new(move |task| {
            std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| runner.run(task)))
                .unwrap_or(());
        })
    }

    fn process(
        &mut self,
        buffer: &mut Buffer,
        _aux: &mut AuxiliaryBuffers,
        context: &mut impl ProcessContext<Self>,
    ) -> ProcessStatus {
        std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            self.process_internal(buffer, context)
        }))
        .unwrap_or(ProcessStatus::Normal)
    }

    fn reset(&mut self) {
        std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            self.processor.reset();
        }))
        .unwrap_or(());
    }

    fn deactivate(&mut self) {
        self.stop_presenter();
    }
}

impl MusicVisPlugin {
    fn initialize_internal(&mut self, buffer_config: &BufferConfig) -> anyhow::Result<()> {
        self.stop_presenter();

        let factory = self
            .processor
            .prepare(
                buffer_config.sample_rate,
                buffer_config.max_buffer_size as usize,
                &self.params.block_settings(),
            )
            .context("preparing analysis")?;

        {
            let mut hub = lock_hub(&self.hub);
            let name = self.params.device_name();
            match hub.as_mut() {
                Some(hub) if hub.device().name() == name => {}
                Some(hub) => hub
                    .setup_device(&name, &self.bank)
                    .with_context(|| format!("setting up device '{}'", name))?,
                None => *hub = Some(open_hub(&name)?),
            }

            let selections = self.params.selections();
            if let Some(hub) = hub.as_mut() {
                self.bank.rebuild(factory, &selections, hub.device_mut());
            }
            self.tracker.sync(&selections);
        }

        let presenter = Presenter::start(
            self.hub.clone(),
            self.bank.clone(),
            self.meters.clone(),
            self.automatables.clone(),
        )
        .context("starting presenter")?;
        self.presenter = Some(presenter);

        Ok(())
    }

    fn stop_presenter(&mut self) {
        if let Some(mut presenter) = self.presenter.take() {
            presenter.stop();
        }
    }

    fn process_internal(
        &mut self,
        buffer: &mut Buffer,
        context: &mut impl ProcessContext<Self>,
    ) -> ProcessStatus {
        let selections = self.params.selections();
        self.tracker.dispatch_changes(&selections, |band, slot, _| {
            context.execute_background(MusicVisTask::Select { band, slot });
        });

        for i in 0..NUM_AUTOMATABLES {
            if let Some(param) = self.params.automatable(i) {
                self.automatables.set(i, param.value());
            }
        }

        let settings = self.params.block_settings();
        self.processor.process_block(buffer.as_slice(), &settings);

        ProcessStatus::Normal
    }
}

/// Open `name`, falling back to the default device name if it is invalid.
fn open_hub(name: &str) -> anyhow::Result<SignalHub> {
    match SignalHub::new(name) {
        Ok(hub) => Ok(hub),
        Err(e) if name != DEFAULT_DEVICE_NAME => {
            log::warn!("{}, using '{}'", e, DEFAULT_DEVICE_NAME);
            SignalHub::new(DEFAULT_DEVICE_NAME).context("opening default device")
        }
        Err(e) => Err(e).context("opening device"),
    }
}

impl Drop for MusicVisPlugin {
    fn drop(&mut self) {
        self.stop_presenter();
    }
}

impl ClapPlugin for MusicVisPlugin {
    const CLAP_ID: &'static str = "com.maxgraf.music-vis-backend";
    const CLAP_DESCRIPTION: Option<&'static str> = Some("Multiband audio feature extraction");
    const CLAP_MANUAL_URL: Option<&'static str> = None;
    const CLAP_SUPPORT_URL: Option<&'static str> = None;
    const CLAP_FEATURES: &'static [ClapFeature] = &[
        ClapFeature::AudioEffect,
        ClapFeature::Analyzer,
        ClapFeature::Stereo,
    ];
}

impl Vst3Plugin for MusicVisPlugin {
    const VST3_CLASS_ID: [u8; 16] = *b"MusicVisBackend1";
    const VST3_SUBCATEGORIES: &'static [Vst3SubCategory] = &[
        Vst3SubCategory::Fx,
        Vst3SubCategory::Analyzer,
    ];
}

nih_export_clap!(MusicVisPlugin);
nih_export_vst3!(MusicVisPlugin);
