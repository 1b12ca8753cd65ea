// SPDX-License-Identifier: GPL-3.0-only

//! Simulated device backend
//!
//! A [`MockBackend`] answers control calls from a [`MockDevice`] profile:
//! a serde structure describing the capability descriptor, inputs,
//! outputs, standards, timings, formats, cropping and tuners. Profiles can
//! be built in code (see the preset constructors) or loaded from JSON.
//!
//! Behaviour follows what a driver does rather than any particular
//! driver's quirks:
//! - request kinds for features the profile lacks fail with
//!   [`CallError::Unsupported`] (`ENOTTY`)
//! - enumeration past the last entry fails with `EINVAL`
//! - formats, crop rectangles and frequencies are clamped or snapped to
//!   what the profile can do
//! - stream I/O fails with `ENXIO`
//!
//! State lives behind an `Arc<Mutex<..>>` so a [`MockProbe`] can inspect
//! the call journal and inject failures after the backend has been moved
//! into a registry.

use super::DeviceBackend;
use crate::codec::*;
use crate::constants::*;
use crate::errors::{CallError, CallResult, ConfigError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

// ===== Profile =====

/// Frame sizes a mock format advertises
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MockFrameSizes {
    /// Frame-size enumeration is not implemented
    #[default]
    Unsupported,
    Discrete(Vec<FrameSize>),
    Stepwise(StepwiseSize),
}

/// Frame intervals a mock format advertises (same for every size)
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MockFrameIntervals {
    #[default]
    Unsupported,
    Discrete(Vec<Fraction>),
    Stepwise {
        min: Fraction,
        max: Fraction,
        step: Fraction,
    },
}

/// One pixel format of a mock device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MockFormat {
    pub direction: BufferDirection,
    pub pixelformat: FourCc,
    pub description: FixedName<32>,
    #[serde(default)]
    pub flags: u32,
    #[serde(default)]
    pub sizes: MockFrameSizes,
    #[serde(default)]
    pub intervals: MockFrameIntervals,
}

impl MockFormat {
    fn default_size(&self) -> FrameSize {
        match &self.sizes {
            MockFrameSizes::Discrete(sizes) => {
                sizes.first().copied().unwrap_or(FrameSize::new(640, 480))
            }
            MockFrameSizes::Stepwise(range) => range.snap(1920, 1080),
            MockFrameSizes::Unsupported => FrameSize::new(640, 480),
        }
    }

    fn nearest_size(&self, width: u32, height: u32) -> FrameSize {
        match &self.sizes {
            MockFrameSizes::Discrete(sizes) => sizes
                .iter()
                .min_by_key(|s| s.width.abs_diff(width) as u64 + s.height.abs_diff(height) as u64)
                .copied()
                .unwrap_or(FrameSize::new(width, height)),
            MockFrameSizes::Stepwise(range) => range.snap(width, height),
            MockFrameSizes::Unsupported => FrameSize::new(width.max(1), height.max(1)),
        }
    }

    fn has_size(&self, width: u32, height: u32) -> bool {
        match &self.sizes {
            MockFrameSizes::Discrete(sizes) => sizes.contains(&FrameSize::new(width, height)),
            MockFrameSizes::Stepwise(range) => range.snap(width, height) == FrameSize::new(width, height),
            MockFrameSizes::Unsupported => true,
        }
    }

    fn default_interval(&self) -> Option<Fraction> {
        match &self.intervals {
            MockFrameIntervals::Discrete(list) => list.first().copied(),
            MockFrameIntervals::Stepwise { min, .. } => Some(*min),
            MockFrameIntervals::Unsupported => None,
        }
    }

    /// Closest legal interval to `wanted`, compared by value
    fn nearest_interval(&self, wanted: Fraction) -> Option<Fraction> {
        let value = wanted.as_f64();
        match &self.intervals {
            MockFrameIntervals::Discrete(list) => list
                .iter()
                .copied()
                .min_by(|a, b| (a.as_f64() - value).abs().total_cmp(&(b.as_f64() - value).abs())),
            MockFrameIntervals::Stepwise { min, max, .. } => {
                if value < min.as_f64() {
                    Some(*min)
                } else if value > max.as_f64() {
                    Some(*max)
                } else {
                    Some(wanted)
                }
            }
            MockFrameIntervals::Unsupported => None,
        }
    }
}

/// Cropping capability of a mock device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MockCrop {
    pub bounds: Rect,
    pub defrect: Rect,
    pub pixelaspect: Fraction,
}

/// Description of a simulated device
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MockDevice {
    pub capability: Capability,
    pub inputs: Vec<InputDescriptor>,
    pub outputs: Vec<OutputDescriptor>,
    /// Every standard the device knows; enumeration filters by the
    /// current input's (or output's) standards mask
    pub standards: Vec<StandardDescriptor>,
    pub dv_timings: Vec<DvTimings>,
    pub formats: Vec<MockFormat>,
    /// Field orders the device accepts; the first is the default
    pub fields: Vec<Field>,
    pub crop: Option<MockCrop>,
    /// Compose selection supported
    pub compose: bool,
    pub tuners: Vec<Tuner>,
    pub modulators: Vec<Modulator>,
    pub initial_standard: u64,
    pub initial_timings: Option<DvTimings>,
    /// Initial tuner/modulator frequency, clamped into range
    pub initial_frequency: u32,
    /// What QUERYSTD reports
    pub detected_standard: u64,
    /// What QUERY_DV_TIMINGS reports; `None` means no signal
    pub detected_timings: Option<DvTimings>,
}

impl MockDevice {
    /// Parse a profile from JSON
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a profile from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    fn formats_for(&self, direction: BufferDirection) -> Vec<&MockFormat> {
        self.formats
            .iter()
            .filter(|f| f.direction == direction)
            .collect()
    }

    fn find_format(&self, pixelformat: FourCc) -> Option<&MockFormat> {
        self.formats.iter().find(|f| f.pixelformat == pixelformat)
    }

    fn default_field(&self) -> Field {
        self.fields.first().copied().unwrap_or(Field::None)
    }

    /// Adjust a requested format the way a driver would
    fn adjust_format(&self, direction: BufferDirection, wanted: &Format) -> Option<Format> {
        let candidates = self.formats_for(direction);
        let chosen = candidates
            .iter()
            .find(|f| f.pixelformat == wanted.pixelformat)
            .or_else(|| candidates.first())?;
        let size = chosen.nearest_size(wanted.width, wanted.height);
        let field = if wanted.field != Field::Any && self.fields.contains(&wanted.field) {
            wanted.field
        } else {
            self.default_field()
        };
        let bytes_per_line = size.width * 2;
        Some(Format {
            buf_type: wanted.buf_type,
            width: size.width,
            height: size.height,
            pixelformat: chosen.pixelformat,
            field,
            bytes_per_line,
            size_image: bytes_per_line * size.height,
        })
    }
}

// ===== Presets =====

fn name<const N: usize>(text: &str) -> FixedName<N> {
    FixedName::truncated(text)
}

fn capability(driver: &str, card: &str, capabilities: u32, device_caps: u32) -> Capability {
    Capability {
        driver: name(driver),
        card: name(card),
        bus_info: name("PCI:0000:05:06.0"),
        version: 0x0006_0800,
        capabilities,
        device_caps,
    }
}

fn standard(id: u64, label: &str, frame_period: Fraction, frame_lines: u32) -> StandardDescriptor {
    StandardDescriptor {
        index: 0,
        id,
        name: name(label),
        frame_period,
        frame_lines,
    }
}

fn analog_standards() -> Vec<StandardDescriptor> {
    let ntsc_period = Fraction::new(1001, 30000);
    let pal_period = Fraction::new(1, 25);
    vec![
        standard(V4L2_STD_NTSC, "NTSC", ntsc_period, 525),
        standard(V4L2_STD_NTSC_443, "NTSC-443", ntsc_period, 525),
        standard(V4L2_STD_PAL_BG, "PAL-BG", pal_period, 625),
        standard(V4L2_STD_PAL_I, "PAL-I", pal_period, 625),
        standard(V4L2_STD_SECAM, "SECAM", pal_period, 625),
    ]
}

fn cea_timings(width: u32, height: u32, pixelclock: u64, h: [u32; 3], v: [u32; 3]) -> DvTimings {
    DvTimings {
        width,
        height,
        pixelclock,
        hfrontporch: h[0],
        hsync: h[1],
        hbackporch: h[2],
        vfrontporch: v[0],
        vsync: v[1],
        vbackporch: v[2],
        ..Default::default()
    }
}

/// CEA-861 1280x720p60
pub fn timings_720p60() -> DvTimings {
    cea_timings(1280, 720, 74_250_000, [110, 40, 220], [5, 5, 20])
}

/// CEA-861 1920x1080p60
pub fn timings_1080p60() -> DvTimings {
    cea_timings(1920, 1080, 148_500_000, [88, 44, 148], [4, 5, 36])
}

/// CEA-861 1920x1080p30
pub fn timings_1080p30() -> DvTimings {
    cea_timings(1920, 1080, 74_250_000, [88, 44, 148], [4, 5, 36])
}

fn sd_sizes() -> Vec<FrameSize> {
    vec![
        FrameSize::new(720, 480),
        FrameSize::new(720, 576),
        FrameSize::new(640, 480),
        FrameSize::new(352, 240),
    ]
}

impl MockDevice {
    /// Capabilities only; everything else unsupported
    pub fn bare() -> Self {
        Self {
            capability: capability(
                "Mock Driver",
                "Mock Card",
                V4L2_CAP_VIDEO_CAPTURE | V4L2_CAP_READWRITE,
                0,
            ),
            ..Default::default()
        }
    }

    /// Analog TV capture card: tuner, composite and S-Video inputs,
    /// NTSC/PAL/SECAM, discrete sizes, cropping and compose
    pub fn analog_capture() -> Self {
        let std_input = V4L2_IN_CAP_STD;
        let intervals = MockFrameIntervals::Discrete(vec![
            Fraction::new(1001, 30000),
            Fraction::new(1, 25),
        ]);
        Self {
            capability: capability(
                "mock-analog",
                "Mock Analog TV",
                V4L2_CAP_VIDEO_CAPTURE
                    | V4L2_CAP_TUNER
                    | V4L2_CAP_AUDIO
                    | V4L2_CAP_READWRITE
                    | V4L2_CAP_STREAMING,
                0,
            ),
            inputs: vec![
                InputDescriptor {
                    index: 0,
                    name: name("Television"),
                    input_type: V4L2_INPUT_TYPE_TUNER,
                    tuner: 0,
                    std: V4L2_STD_NTSC | V4L2_STD_PAL_BG | V4L2_STD_PAL_I,
                    capabilities: std_input,
                    ..Default::default()
                },
                InputDescriptor {
                    index: 1,
                    name: name("Composite"),
                    input_type: V4L2_INPUT_TYPE_CAMERA,
                    std: V4L2_STD_NTSC
                        | V4L2_STD_NTSC_443
                        | V4L2_STD_PAL_BG
                        | V4L2_STD_PAL_I
                        | V4L2_STD_SECAM,
                    capabilities: std_input,
                    ..Default::default()
                },
                InputDescriptor {
                    index: 2,
                    name: name("S-Video"),
                    input_type: V4L2_INPUT_TYPE_CAMERA,
                    std: V4L2_STD_NTSC,
                    capabilities: std_input,
                    ..Default::default()
                },
            ],
            standards: analog_standards(),
            formats: vec![
                MockFormat {
                    direction: BufferDirection::Capture,
                    pixelformat: FourCc::new(b"YUYV"),
                    description: name("YUYV 4:2:2"),
                    flags: 0,
                    sizes: MockFrameSizes::Discrete(sd_sizes()),
                    intervals: intervals.clone(),
                },
                MockFormat {
                    direction: BufferDirection::Capture,
                    pixelformat: FourCc::new(b"RGB3"),
                    description: name("RGB3 (Emulated)"),
                    flags: V4L2_FMT_FLAG_EMULATED,
                    sizes: MockFrameSizes::Discrete(sd_sizes()),
                    intervals,
                },
            ],
            fields: vec![
                Field::Interlaced,
                Field::Top,
                Field::Bottom,
                Field::Alternate,
                Field::SeqTb,
            ],
            crop: Some(MockCrop {
                bounds: Rect::new(0, 0, 720, 480),
                defrect: Rect::new(0, 0, 720, 480),
                pixelaspect: Fraction::new(11, 10),
            }),
            compose: true,
            tuners: vec![Tuner {
                index: 0,
                name: name("Analog TV Tuner"),
                tuner_type: V4L2_TUNER_ANALOG_TV,
                capability: V4L2_TUNER_CAP_NORM
                    | V4L2_TUNER_CAP_STEREO
                    | V4L2_TUNER_CAP_LANG1
                    | V4L2_TUNER_CAP_LANG2,
                // 44 MHz .. 958 MHz in 62.5 kHz units
                rangelow: 44 * 16,
                rangehigh: 958 * 16,
                rxsubchans: V4L2_TUNER_SUB_MONO | V4L2_TUNER_SUB_STEREO,
                audmode: V4L2_TUNER_MODE_STEREO,
                signal: 0xffff,
                afc: 0,
            }],
            initial_standard: V4L2_STD_NTSC,
            initial_frequency: 884,
            detected_standard: V4L2_STD_PAL_B,
            ..Default::default()
        }
    }

    /// HDMI receiver: DV timings, stepwise sizes, no cropping
    pub fn hdmi_receiver() -> Self {
        Self {
            capability: capability(
                "mock-hdmi",
                "Mock HDMI Receiver",
                V4L2_CAP_VIDEO_CAPTURE | V4L2_CAP_STREAMING | V4L2_CAP_DEVICE_CAPS,
                V4L2_CAP_VIDEO_CAPTURE | V4L2_CAP_STREAMING,
            ),
            inputs: vec![InputDescriptor {
                index: 0,
                name: name("HDMI"),
                input_type: V4L2_INPUT_TYPE_CAMERA,
                capabilities: V4L2_IN_CAP_DV_TIMINGS,
                ..Default::default()
            }],
            dv_timings: vec![timings_720p60(), timings_1080p60(), timings_1080p30()],
            formats: vec![
                MockFormat {
                    direction: BufferDirection::Capture,
                    pixelformat: FourCc::new(b"RGB3"),
                    description: name("24-bit RGB 8-8-8"),
                    flags: 0,
                    sizes: MockFrameSizes::Stepwise(StepwiseSize {
                        min_width: 640,
                        max_width: 3840,
                        step_width: 16,
                        min_height: 480,
                        max_height: 2160,
                        step_height: 8,
                    }),
                    intervals: MockFrameIntervals::Stepwise {
                        min: Fraction::new(1, 60),
                        max: Fraction::new(1, 1),
                        step: Fraction::new(1, 60),
                    },
                },
                MockFormat {
                    direction: BufferDirection::Capture,
                    pixelformat: FourCc::new(b"NV12"),
                    description: name("Y/UV 4:2:0"),
                    flags: 0,
                    sizes: MockFrameSizes::Unsupported,
                    intervals: MockFrameIntervals::Unsupported,
                },
            ],
            fields: vec![Field::None],
            initial_timings: Some(timings_1080p60()),
            detected_timings: Some(timings_720p60()),
            ..Default::default()
        }
    }

    /// FM radio receiver with RDS
    pub fn radio() -> Self {
        let node = V4L2_CAP_TUNER | V4L2_CAP_RADIO | V4L2_CAP_RDS_CAPTURE | V4L2_CAP_READWRITE;
        Self {
            capability: capability("mock-radio", "Mock FM Radio", node | V4L2_CAP_DEVICE_CAPS, node),
            tuners: vec![Tuner {
                index: 0,
                name: name("FM"),
                tuner_type: V4L2_TUNER_RADIO,
                capability: V4L2_TUNER_CAP_LOW | V4L2_TUNER_CAP_STEREO | V4L2_TUNER_CAP_RDS,
                // 87.5 MHz .. 108 MHz in 62.5 Hz units
                rangelow: 1_400_000,
                rangehigh: 1_728_000,
                rxsubchans: V4L2_TUNER_SUB_STEREO | V4L2_TUNER_SUB_RDS,
                audmode: V4L2_TUNER_MODE_STEREO,
                signal: 45875,
                afc: -1,
            }],
            initial_frequency: 1_600_000,
            ..Default::default()
        }
    }

    /// Raw and sliced VBI capture on a composite input
    pub fn vbi() -> Self {
        let node = V4L2_CAP_VBI_CAPTURE | V4L2_CAP_SLICED_VBI_CAPTURE | V4L2_CAP_READWRITE;
        Self {
            capability: capability("mock-vbi", "Mock VBI Capture", node | V4L2_CAP_DEVICE_CAPS, node),
            inputs: vec![InputDescriptor {
                index: 0,
                name: name("Composite"),
                input_type: V4L2_INPUT_TYPE_CAMERA,
                std: V4L2_STD_NTSC | V4L2_STD_PAL_BG,
                capabilities: V4L2_IN_CAP_STD,
                ..Default::default()
            }],
            standards: analog_standards(),
            initial_standard: V4L2_STD_NTSC,
            detected_standard: V4L2_STD_NTSC_M,
            ..Default::default()
        }
    }

    /// Video output with a TV modulator and an HDMI output
    pub fn video_output() -> Self {
        let node = V4L2_CAP_VIDEO_OUTPUT | V4L2_CAP_MODULATOR | V4L2_CAP_STREAMING;
        Self {
            capability: capability(
                "mock-output",
                "Mock Video Output",
                node | V4L2_CAP_DEVICE_CAPS,
                node,
            ),
            outputs: vec![
                OutputDescriptor {
                    index: 0,
                    name: name("Modulator"),
                    output_type: V4L2_OUTPUT_TYPE_MODULATOR,
                    modulator: 0,
                    std: V4L2_STD_NTSC | V4L2_STD_PAL_BG,
                    capabilities: V4L2_OUT_CAP_STD,
                    ..Default::default()
                },
                OutputDescriptor {
                    index: 1,
                    name: name("HDMI Out"),
                    output_type: V4L2_OUTPUT_TYPE_ANALOG,
                    capabilities: V4L2_OUT_CAP_DV_TIMINGS,
                    ..Default::default()
                },
            ],
            standards: analog_standards(),
            dv_timings: vec![timings_720p60(), timings_1080p60()],
            formats: vec![MockFormat {
                direction: BufferDirection::Output,
                pixelformat: FourCc::new(b"YUYV"),
                description: name("YUYV 4:2:2"),
                flags: 0,
                sizes: MockFrameSizes::Discrete(vec![
                    FrameSize::new(720, 576),
                    FrameSize::new(720, 480),
                ]),
                intervals: MockFrameIntervals::Discrete(vec![
                    Fraction::new(1, 25),
                    Fraction::new(1001, 30000),
                ]),
            }],
            fields: vec![Field::Interlaced, Field::None],
            modulators: vec![Modulator {
                index: 0,
                name: name("TV Modulator"),
                capability: V4L2_TUNER_CAP_STEREO | V4L2_TUNER_CAP_RDS,
                rangelow: 44 * 16,
                rangehigh: 958 * 16,
                txsubchans: V4L2_TUNER_SUB_MONO,
                modulator_type: V4L2_TUNER_ANALOG_TV,
            }],
            initial_standard: V4L2_STD_PAL_BG,
            initial_timings: Some(timings_720p60()),
            initial_frequency: 8_000,
            ..Default::default()
        }
    }
}

// ===== Runtime state =====

struct MockState {
    input: u32,
    output: u32,
    standard: u64,
    timings: Option<DvTimings>,
    formats: HashMap<BufferDirection, Format>,
    interval: Option<Fraction>,
    crop: Rect,
    compose: Rect,
    frequencies: HashMap<u32, u32>,
    tuners: Vec<Tuner>,
    modulators: Vec<Modulator>,
    subscriptions: Vec<EventSubscription>,
    detected_standard: u64,
    detected_timings: Option<DvTimings>,
    calls: Vec<ControlCall>,
    commits: Vec<ControlCall>,
    failures: HashMap<RequestKind, i32>,
}

impl MockState {
    fn initial(profile: &MockDevice) -> Self {
        let mut formats = HashMap::new();
        let mut interval = None;
        for direction in [BufferDirection::Capture, BufferDirection::Output] {
            let Some(first) = profile.formats_for(direction).first().copied() else {
                continue;
            };
            let size = match (direction, profile.initial_timings) {
                (BufferDirection::Capture, Some(t)) => FrameSize::new(t.width, t.height),
                _ => first.default_size(),
            };
            let wanted = Format {
                buf_type: BufType::video(direction, false),
                width: size.width,
                height: size.height,
                pixelformat: first.pixelformat,
                field: profile.default_field(),
                bytes_per_line: 0,
                size_image: 0,
            };
            if let Some(format) = profile.adjust_format(direction, &wanted) {
                formats.insert(direction, format);
            }
            if interval.is_none() {
                interval = first.default_interval();
            }
        }

        let active = formats
            .get(&BufferDirection::Capture)
            .or_else(|| formats.get(&BufferDirection::Output));
        let compose = active
            .map(|f| Rect::new(0, 0, f.width, f.height))
            .unwrap_or_default();

        let mut frequencies = HashMap::new();
        for t in &profile.tuners {
            frequencies.insert(
                t.index,
                profile.initial_frequency.clamp(t.rangelow, t.rangehigh.max(t.rangelow)),
            );
        }
        if profile.tuners.is_empty() {
            for m in &profile.modulators {
                frequencies.insert(
                    m.index,
                    profile.initial_frequency.clamp(m.rangelow, m.rangehigh.max(m.rangelow)),
                );
            }
        }

        Self {
            input: 0,
            output: 0,
            standard: profile.initial_standard,
            timings: profile
                .initial_timings
                .or_else(|| profile.dv_timings.first().copied()),
            formats,
            interval,
            crop: profile.crop.map(|c| c.defrect).unwrap_or_default(),
            compose,
            frequencies,
            tuners: profile.tuners.clone(),
            modulators: profile.modulators.clone(),
            subscriptions: Vec::new(),
            detected_standard: profile.detected_standard,
            detected_timings: profile.detected_timings,
            calls: Vec::new(),
            commits: Vec::new(),
            failures: HashMap::new(),
        }
    }
}

/// Inspection and fault-injection handle for a [`MockBackend`]
#[derive(Clone)]
pub struct MockProbe {
    state: Arc<Mutex<MockState>>,
}

impl MockProbe {
    /// Every call received, in order
    pub fn calls(&self) -> Vec<ControlCall> {
        self.state.lock().calls.clone()
    }

    /// Commits the mock accepted, in order
    pub fn commits(&self) -> Vec<ControlCall> {
        self.state.lock().commits.clone()
    }

    /// Number of calls received of one kind
    pub fn count(&self, kind: RequestKind) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|c| c.kind() == kind)
            .count()
    }

    pub fn clear_log(&self) {
        let mut state = self.state.lock();
        state.calls.clear();
        state.commits.clear();
    }

    /// Make every call of `kind` fail with `errno`
    pub fn fail(&self, kind: RequestKind, errno: i32) {
        self.state.lock().failures.insert(kind, errno);
    }

    pub fn clear_failures(&self) {
        self.state.lock().failures.clear();
    }

    /// Change what QUERYSTD reports
    pub fn set_detected_standard(&self, id: u64) {
        self.state.lock().detected_standard = id;
    }

    /// Change what QUERY_DV_TIMINGS reports
    pub fn set_detected_timings(&self, timings: Option<DvTimings>) {
        self.state.lock().detected_timings = timings;
    }

    pub fn current_format(&self, direction: BufferDirection) -> Option<Format> {
        self.state.lock().formats.get(&direction).copied()
    }

    pub fn current_standard(&self) -> u64 {
        self.state.lock().standard
    }

    pub fn current_input(&self) -> u32 {
        self.state.lock().input
    }

    pub fn subscriptions(&self) -> Vec<EventSubscription> {
        self.state.lock().subscriptions.clone()
    }
}

// ===== Backend =====

/// Simulated device backend
pub struct MockBackend {
    name: String,
    profile: MockDevice,
    state: Arc<Mutex<MockState>>,
}

impl MockBackend {
    pub fn new(profile: MockDevice) -> Self {
        let name = format!("mock:{}", profile.capability.driver);
        let state = MockState::initial(&profile);
        debug!(backend = %name, "Created mock device");
        Self {
            name,
            profile,
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub fn bare() -> Self {
        Self::new(MockDevice::bare())
    }

    pub fn analog_capture() -> Self {
        Self::new(MockDevice::analog_capture())
    }

    pub fn hdmi_receiver() -> Self {
        Self::new(MockDevice::hdmi_receiver())
    }

    pub fn radio() -> Self {
        Self::new(MockDevice::radio())
    }

    pub fn vbi() -> Self {
        Self::new(MockDevice::vbi())
    }

    pub fn video_output() -> Self {
        Self::new(MockDevice::video_output())
    }

    pub fn profile(&self) -> &MockDevice {
        &self.profile
    }

    /// Handle that stays valid after the backend is registered
    pub fn probe(&self) -> MockProbe {
        MockProbe {
            state: Arc::clone(&self.state),
        }
    }

    fn std_mask(&self, state: &MockState) -> u64 {
        if let Some(input) = self.profile.inputs.get(state.input as usize) {
            input.std
        } else if let Some(output) = self.profile.outputs.get(state.output as usize) {
            output.std
        } else {
            u64::MAX
        }
    }

    fn standards_for(&self, state: &MockState) -> Vec<StandardDescriptor> {
        let mask = self.std_mask(state);
        self.profile
            .standards
            .iter()
            .filter(|s| s.id & mask != 0)
            .cloned()
            .enumerate()
            .map(|(i, mut s)| {
                s.index = i as u32;
                s
            })
            .collect()
    }

    fn active_format(&self, state: &MockState) -> Option<Format> {
        state
            .formats
            .get(&BufferDirection::Capture)
            .or_else(|| state.formats.get(&BufferDirection::Output))
            .copied()
    }

    fn compose_bounds(&self, state: &MockState) -> Rect {
        self.active_format(state)
            .map(|f| Rect::new(0, 0, f.width, f.height))
            .unwrap_or_default()
    }

    /// Pick the format list for a buffer type, or explain why there is none
    fn check_buf_type(&self, kind: RequestKind, buf_type: BufType) -> CallResult<BufferDirection> {
        if self.profile.formats.is_empty() {
            return Err(CallError::Unsupported(kind));
        }
        if matches!(buf_type, BufType::VbiCapture | BufType::SlicedVbiCapture) {
            return Err(einval(kind));
        }
        let direction = buf_type.direction();
        if self.profile.formats_for(direction).is_empty() {
            return Err(einval(kind));
        }
        Ok(direction)
    }

    fn store_format(&self, state: &mut MockState, direction: BufferDirection, format: Format) {
        state.formats.insert(direction, format);
        state.compose = Rect::new(0, 0, format.width, format.height);
        if let Some(mock) = self.profile.find_format(format.pixelformat) {
            let keep = state
                .interval
                .is_some_and(|i| mock.nearest_interval(i) == Some(i));
            if !keep {
                state.interval = mock.default_interval();
            }
        }
    }

    fn tuner_frequency_range(&self, state: &MockState, index: u32) -> Option<(u32, u32, u32)> {
        if !state.tuners.is_empty() {
            return state
                .tuners
                .get(index as usize)
                .map(|t| (t.tuner_type, t.rangelow, t.rangehigh));
        }
        state
            .modulators
            .get(index as usize)
            .map(|m| (m.modulator_type, m.rangelow, m.rangehigh))
    }

    fn answer(&self, state: &mut MockState, call: &ControlCall) -> CallResult<Reply> {
        let kind = call.kind();
        let profile = &self.profile;
        match call {
            ControlCall::QueryCapability => Ok(Reply::Capability(profile.capability.clone())),

            // ----- formats -----
            ControlCall::EnumFormat { buf_type, index } => {
                let direction = self.check_buf_type(kind, *buf_type)?;
                let list = profile.formats_for(direction);
                let mock = list.get(*index as usize).ok_or(einval(kind))?;
                Ok(Reply::FormatDesc(FormatDescriptor {
                    index: *index,
                    buf_type: *buf_type,
                    flags: mock.flags,
                    description: mock.description,
                    pixelformat: mock.pixelformat,
                }))
            }
            ControlCall::GetFormat { buf_type } => {
                let direction = self.check_buf_type(kind, *buf_type)?;
                let mut format = *state.formats.get(&direction).ok_or(einval(kind))?;
                format.buf_type = *buf_type;
                Ok(Reply::Format(format))
            }
            ControlCall::TryFormat(wanted) | ControlCall::SetFormat(wanted) => {
                let direction = self.check_buf_type(kind, wanted.buf_type)?;
                let format = profile
                    .adjust_format(direction, wanted)
                    .ok_or(einval(kind))?;
                if kind == RequestKind::SetFormat {
                    self.store_format(state, direction, format);
                }
                Ok(Reply::Format(format))
            }
            ControlCall::EnumFrameSizes { pixelformat, index } => {
                let mock = profile.find_format(*pixelformat).ok_or(einval(kind))?;
                let size = match &mock.sizes {
                    MockFrameSizes::Unsupported => return Err(CallError::Unsupported(kind)),
                    MockFrameSizes::Discrete(sizes) => {
                        let s = sizes.get(*index as usize).ok_or(einval(kind))?;
                        FrameSizeKind::Discrete {
                            width: s.width,
                            height: s.height,
                        }
                    }
                    MockFrameSizes::Stepwise(range) if *index == 0 => FrameSizeKind::Stepwise(*range),
                    MockFrameSizes::Stepwise(_) => return Err(einval(kind)),
                };
                Ok(Reply::FrameSize(FrameSizeEntry {
                    index: *index,
                    pixelformat: *pixelformat,
                    kind: size,
                }))
            }
            ControlCall::EnumFrameIntervals {
                pixelformat,
                width,
                height,
                index,
            } => {
                let mock = profile.find_format(*pixelformat).ok_or(einval(kind))?;
                if !mock.has_size(*width, *height) {
                    return Err(einval(kind));
                }
                let interval = match &mock.intervals {
                    MockFrameIntervals::Unsupported => return Err(CallError::Unsupported(kind)),
                    MockFrameIntervals::Discrete(list) => {
                        FrameIntervalKind::Discrete(*list.get(*index as usize).ok_or(einval(kind))?)
                    }
                    MockFrameIntervals::Stepwise { min, max, step } if *index == 0 => {
                        FrameIntervalKind::Stepwise {
                            min: *min,
                            max: *max,
                            step: *step,
                        }
                    }
                    MockFrameIntervals::Stepwise { .. } => return Err(einval(kind)),
                };
                Ok(Reply::FrameInterval(FrameIntervalEntry {
                    index: *index,
                    pixelformat: *pixelformat,
                    width: *width,
                    height: *height,
                    kind: interval,
                }))
            }
            ControlCall::GetParm { .. } => state
                .interval
                .map(Reply::Interval)
                .ok_or(CallError::Unsupported(kind)),
            ControlCall::SetParm { time_per_frame, .. } => {
                let current = self.active_format(state).ok_or(CallError::Unsupported(kind))?;
                let mock = profile
                    .find_format(current.pixelformat)
                    .ok_or(CallError::Unsupported(kind))?;
                let applied = mock
                    .nearest_interval(*time_per_frame)
                    .ok_or(CallError::Unsupported(kind))?;
                state.interval = Some(applied);
                Ok(Reply::Interval(applied))
            }

            // ----- inputs / outputs -----
            ControlCall::EnumInput { index } => {
                require(!profile.inputs.is_empty(), kind)?;
                let mut input = profile
                    .inputs
                    .get(*index as usize)
                    .cloned()
                    .ok_or(einval(kind))?;
                input.index = *index;
                Ok(Reply::Input(input))
            }
            ControlCall::GetInput => {
                require(!profile.inputs.is_empty(), kind)?;
                Ok(Reply::Index(state.input))
            }
            ControlCall::SetInput(index) => {
                require(!profile.inputs.is_empty(), kind)?;
                let input = profile.inputs.get(*index as usize).ok_or(einval(kind))?;
                state.input = *index;
                if state.standard & input.std == 0 {
                    state.standard = profile
                        .standards
                        .iter()
                        .find(|s| s.id & input.std != 0)
                        .map(|s| s.id)
                        .unwrap_or(V4L2_STD_UNKNOWN);
                }
                Ok(Reply::Done)
            }
            ControlCall::EnumOutput { index } => {
                require(!profile.outputs.is_empty(), kind)?;
                let mut output = profile
                    .outputs
                    .get(*index as usize)
                    .cloned()
                    .ok_or(einval(kind))?;
                output.index = *index;
                Ok(Reply::Output(output))
            }
            ControlCall::GetOutput => {
                require(!profile.outputs.is_empty(), kind)?;
                Ok(Reply::Index(state.output))
            }
            ControlCall::SetOutput(index) => {
                require(!profile.outputs.is_empty(), kind)?;
                if *index as usize >= profile.outputs.len() {
                    return Err(einval(kind));
                }
                state.output = *index;
                Ok(Reply::Done)
            }

            // ----- standards -----
            ControlCall::EnumStandard { index } => {
                require(!profile.standards.is_empty(), kind)?;
                self.standards_for(state)
                    .into_iter()
                    .nth(*index as usize)
                    .map(Reply::Standard)
                    .ok_or(einval(kind))
            }
            ControlCall::GetStandard => {
                require(!profile.standards.is_empty(), kind)?;
                Ok(Reply::StandardId(state.standard))
            }
            ControlCall::SetStandard(id) => {
                require(!profile.standards.is_empty(), kind)?;
                let accepted = self.standards_for(state).iter().any(|s| s.id & id != 0);
                if !accepted {
                    return Err(einval(kind));
                }
                state.standard = *id;
                Ok(Reply::Done)
            }
            ControlCall::QueryStandard => {
                require(!profile.standards.is_empty(), kind)?;
                Ok(Reply::StandardId(state.detected_standard))
            }

            // ----- DV timings -----
            ControlCall::EnumDvTimings { index } => {
                require(!profile.dv_timings.is_empty(), kind)?;
                let timings = profile.dv_timings.get(*index as usize).ok_or(einval(kind))?;
                Ok(Reply::TimingsDesc(TimingsDescriptor {
                    index: *index,
                    timings: *timings,
                }))
            }
            ControlCall::GetDvTimings => {
                require(!profile.dv_timings.is_empty(), kind)?;
                state
                    .timings
                    .map(Reply::DvTimings)
                    .ok_or(device_error(kind, libc::ENODATA))
            }
            ControlCall::SetDvTimings(timings) => {
                require(!profile.dv_timings.is_empty(), kind)?;
                if !profile.dv_timings.contains(timings) {
                    return Err(einval(kind));
                }
                state.timings = Some(*timings);
                // The capture format follows the active timings
                if let Some(current) = state.formats.get(&BufferDirection::Capture).copied() {
                    let wanted = Format {
                        width: timings.width,
                        height: timings.height,
                        ..current
                    };
                    if let Some(format) = profile.adjust_format(BufferDirection::Capture, &wanted) {
                        self.store_format(state, BufferDirection::Capture, format);
                    }
                }
                Ok(Reply::Done)
            }
            ControlCall::QueryDvTimings => {
                require(!profile.dv_timings.is_empty(), kind)?;
                state
                    .detected_timings
                    .map(Reply::DvTimings)
                    .ok_or(device_error(kind, libc::ENOLINK))
            }

            // ----- cropping and selection -----
            ControlCall::CropCap { buf_type } => {
                let crop = profile.crop.ok_or(CallError::Unsupported(kind))?;
                Ok(Reply::CropCap(CropCapability {
                    buf_type: *buf_type,
                    bounds: crop.bounds,
                    defrect: crop.defrect,
                    pixelaspect: crop.pixelaspect,
                }))
            }
            ControlCall::GetCrop { .. } => {
                require(profile.crop.is_some(), kind)?;
                Ok(Reply::Rect(state.crop))
            }
            ControlCall::SetCrop { rect, .. } => {
                let crop = profile.crop.ok_or(CallError::Unsupported(kind))?;
                state.crop = clamp_rect(*rect, crop.bounds);
                Ok(Reply::Done)
            }
            ControlCall::GetSelection { target, .. } => {
                let rect = match (target, profile.crop) {
                    (SelectionTarget::Crop, Some(_)) => state.crop,
                    (SelectionTarget::CropDefault, Some(c)) => c.defrect,
                    (SelectionTarget::CropBounds, Some(c)) => c.bounds,
                    (SelectionTarget::Compose, _) if profile.compose => state.compose,
                    (SelectionTarget::ComposeDefault | SelectionTarget::ComposeBounds, _)
                        if profile.compose =>
                    {
                        self.compose_bounds(state)
                    }
                    _ => return Err(CallError::Unsupported(kind)),
                };
                Ok(Reply::Rect(rect))
            }
            ControlCall::SetSelection { target, rect, .. } => match (target, profile.crop) {
                (SelectionTarget::Crop, Some(c)) => {
                    state.crop = clamp_rect(*rect, c.bounds);
                    Ok(Reply::Rect(state.crop))
                }
                (SelectionTarget::Compose, _) if profile.compose => {
                    state.compose = clamp_rect(*rect, self.compose_bounds(state));
                    Ok(Reply::Rect(state.compose))
                }
                (SelectionTarget::Crop, None) | (SelectionTarget::Compose, _) => {
                    Err(CallError::Unsupported(kind))
                }
                _ => Err(einval(kind)),
            },

            // ----- tuners, modulators, frequency -----
            ControlCall::GetTuner { index } => {
                require(!state.tuners.is_empty(), kind)?;
                state
                    .tuners
                    .get(*index as usize)
                    .cloned()
                    .map(Reply::Tuner)
                    .ok_or(einval(kind))
            }
            ControlCall::SetTuner(wanted) => {
                require(!state.tuners.is_empty(), kind)?;
                if wanted.audmode > V4L2_TUNER_MODE_LANG1_LANG2 {
                    return Err(einval(kind));
                }
                let tuner = state
                    .tuners
                    .get_mut(wanted.index as usize)
                    .ok_or(einval(kind))?;
                tuner.audmode = wanted.audmode;
                Ok(Reply::Done)
            }
            ControlCall::GetModulator { index } => {
                require(!state.modulators.is_empty(), kind)?;
                state
                    .modulators
                    .get(*index as usize)
                    .cloned()
                    .map(Reply::Modulator)
                    .ok_or(einval(kind))
            }
            ControlCall::SetModulator(wanted) => {
                require(!state.modulators.is_empty(), kind)?;
                let modulator = state
                    .modulators
                    .get_mut(wanted.index as usize)
                    .ok_or(einval(kind))?;
                modulator.txsubchans = wanted.txsubchans;
                Ok(Reply::Done)
            }
            ControlCall::GetFrequency { tuner } => {
                require(!state.tuners.is_empty() || !state.modulators.is_empty(), kind)?;
                let (tuner_type, low, _) = self
                    .tuner_frequency_range(state, *tuner)
                    .ok_or(einval(kind))?;
                let frequency = state.frequencies.get(tuner).copied().unwrap_or(low);
                Ok(Reply::Frequency(Frequency {
                    tuner: *tuner,
                    tuner_type,
                    frequency,
                }))
            }
            ControlCall::SetFrequency(wanted) => {
                require(!state.tuners.is_empty() || !state.modulators.is_empty(), kind)?;
                let (_, low, high) = self
                    .tuner_frequency_range(state, wanted.tuner)
                    .ok_or(einval(kind))?;
                let frequency = wanted.frequency.clamp(low, high.max(low));
                state.frequencies.insert(wanted.tuner, frequency);
                Ok(Reply::Done)
            }

            // ----- events -----
            ControlCall::SubscribeEvent(sub) => {
                require(!profile.inputs.is_empty(), kind)?;
                if sub.event_type != V4L2_EVENT_SOURCE_CHANGE {
                    return Err(einval(kind));
                }
                state.subscriptions.push(*sub);
                Ok(Reply::Done)
            }
        }
    }
}

impl DeviceBackend for MockBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn control_call(&mut self, call: &ControlCall) -> CallResult<Reply> {
        let mut state = self.state.lock();
        state.calls.push(call.clone());

        let kind = call.kind();
        if let Some(&code) = state.failures.get(&kind) {
            warn!(backend = %self.name, request = %kind, code, "Injected failure");
            return Err(device_error(kind, code));
        }

        let result = self.answer(&mut state, call);
        if result.is_ok() && kind.is_commit() {
            state.commits.push(call.clone());
        }
        result
    }

    fn read_stream(&mut self, _buf: &mut [u8]) -> CallResult<usize> {
        Err(CallError::Stream(libc::ENXIO))
    }

    fn write_stream(&mut self, _buf: &[u8]) -> CallResult<usize> {
        Err(CallError::Stream(libc::ENXIO))
    }
}

fn device_error(kind: RequestKind, code: i32) -> CallError {
    CallError::Device { kind, code }
}

fn einval(kind: RequestKind) -> CallError {
    device_error(kind, libc::EINVAL)
}

fn require(present: bool, kind: RequestKind) -> CallResult<()> {
    if present {
        Ok(())
    } else {
        Err(CallError::Unsupported(kind))
    }
}

/// Shrink `rect` to fit `bounds`, then move it inside
fn clamp_rect(rect: Rect, bounds: Rect) -> Rect {
    let width = rect.width.clamp(1, bounds.width.max(1));
    let height = rect.height.clamp(1, bounds.height.max(1));
    let max_left = bounds.left + (bounds.width - width.min(bounds.width)) as i32;
    let max_top = bounds.top + (bounds.height - height.min(bounds.height)) as i32;
    Rect {
        left: rect.left.clamp(bounds.left, max_left),
        top: rect.top.clamp(bounds.top, max_top),
        width,
        height,
    }
}
