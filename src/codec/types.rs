// SPDX-License-Identifier: GPL-3.0-only

//! Request and reply record shapes
//!
//! Each record corresponds to one of the V4L2 ioctl structures, reduced to
//! the fields negotiation reads. Masks stay raw integers; see
//! [`super::flags`] for typed views.

use super::fixed::FixedName;
use super::flags::{DeviceCapabilities, InputCapabilities, TunerCapabilities};
use crate::constants::*;
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// ===== Pixel format codes =====

/// Four-character pixel format code (`v4l2_fourcc`)
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FourCc(pub [u8; 4]);

impl FourCc {
    pub const fn new(code: &[u8; 4]) -> Self {
        Self(*code)
    }

    /// Decode the little-endian packed form used on the wire
    pub const fn from_u32(value: u32) -> Self {
        Self(value.to_le_bytes())
    }

    pub const fn to_u32(self) -> u32 {
        u32::from_le_bytes(self.0)
    }
}

impl fmt::Display for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &b in &self.0 {
            let c = if b.is_ascii_graphic() || b == b' ' {
                b as char
            } else {
                '.'
            };
            write!(f, "{}", c)?;
        }
        Ok(())
    }
}

impl fmt::Debug for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FourCc({})", self)
    }
}

/// FourCC text was empty or longer than four bytes
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid FourCC code {0:?}")]
pub struct FourCcParseError(pub String);

impl FromStr for FourCc {
    type Err = FourCcParseError;

    /// Codes shorter than four characters are space padded (`"Y16"` → `"Y16 "`)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = s.as_bytes();
        if bytes.is_empty() || bytes.len() > 4 {
            return Err(FourCcParseError(s.to_string()));
        }
        let mut code = [b' '; 4];
        code[..bytes.len()].copy_from_slice(bytes);
        Ok(Self(code))
    }
}

impl Serialize for FourCc {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for FourCc {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(de::Error::custom)
    }
}

// ===== Basic values =====

/// Rational number (`v4l2_fract`); frame intervals are seconds per frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Fraction {
    pub numerator: u32,
    pub denominator: u32,
}

impl Fraction {
    pub const fn new(numerator: u32, denominator: u32) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    pub fn as_f64(self) -> f64 {
        if self.denominator == 0 {
            return 0.0;
        }
        self.numerator as f64 / self.denominator as f64
    }

    /// Interpret as a frame interval and return frames per second
    pub fn fps(self) -> f64 {
        if self.numerator == 0 {
            return 0.0;
        }
        self.denominator as f64 / self.numerator as f64
    }
}

impl fmt::Display for Fraction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

/// Rectangle used by crop and selection calls (`v4l2_rect`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub const fn new(left: i32, top: i32, width: u32, height: u32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x{}@({},{})",
            self.width, self.height, self.left, self.top
        )
    }
}

// ===== Buffer direction and type =====

/// Stream direction; capture and output enumerations never mix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BufferDirection {
    Capture,
    Output,
}

impl fmt::Display for BufferDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BufferDirection::Capture => write!(f, "capture"),
            BufferDirection::Output => write!(f, "output"),
        }
    }
}

/// Buffer type a call applies to (`enum v4l2_buf_type`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BufType {
    VideoCapture,
    VideoOutput,
    VbiCapture,
    SlicedVbiCapture,
    VideoCaptureMplane,
    VideoOutputMplane,
}

impl BufType {
    /// Video buffer type for a direction, multi-planar when `planar`
    pub fn video(direction: BufferDirection, planar: bool) -> Self {
        match (direction, planar) {
            (BufferDirection::Capture, false) => BufType::VideoCapture,
            (BufferDirection::Capture, true) => BufType::VideoCaptureMplane,
            (BufferDirection::Output, false) => BufType::VideoOutput,
            (BufferDirection::Output, true) => BufType::VideoOutputMplane,
        }
    }

    pub fn raw(self) -> u32 {
        match self {
            BufType::VideoCapture => V4L2_BUF_TYPE_VIDEO_CAPTURE,
            BufType::VideoOutput => V4L2_BUF_TYPE_VIDEO_OUTPUT,
            BufType::VbiCapture => V4L2_BUF_TYPE_VBI_CAPTURE,
            BufType::SlicedVbiCapture => V4L2_BUF_TYPE_SLICED_VBI_CAPTURE,
            BufType::VideoCaptureMplane => V4L2_BUF_TYPE_VIDEO_CAPTURE_MPLANE,
            BufType::VideoOutputMplane => V4L2_BUF_TYPE_VIDEO_OUTPUT_MPLANE,
        }
    }

    pub fn direction(self) -> BufferDirection {
        match self {
            BufType::VideoOutput | BufType::VideoOutputMplane => BufferDirection::Output,
            _ => BufferDirection::Capture,
        }
    }
}

// ===== Capability =====

/// Result of the capability query (`v4l2_capability`)
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Capability {
    pub driver: FixedName<16>,
    pub card: FixedName<32>,
    pub bus_info: FixedName<32>,
    pub version: u32,
    pub capabilities: u32,
    #[serde(default)]
    pub device_caps: u32,
}

impl Capability {
    /// Whole-device capability mask
    pub fn caps(&self) -> DeviceCapabilities {
        DeviceCapabilities::from_bits_retain(self.capabilities)
    }

    /// The `device_caps` field is only meaningful when this is set
    pub fn device_caps_valid(&self) -> bool {
        self.caps().contains(DeviceCapabilities::DEVICE_CAPS)
    }

    /// Capabilities of this particular node: `device_caps` when valid,
    /// otherwise the whole-device mask
    pub fn node_caps(&self) -> DeviceCapabilities {
        if self.device_caps_valid() {
            DeviceCapabilities::from_bits_retain(self.device_caps)
        } else {
            self.caps()
        }
    }
}

// ===== Inputs / outputs =====

/// Video input (`v4l2_input`)
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct InputDescriptor {
    pub index: u32,
    pub name: FixedName<32>,
    pub input_type: u32,
    #[serde(default)]
    pub audioset: u32,
    #[serde(default)]
    pub tuner: u32,
    #[serde(default)]
    pub std: u64,
    #[serde(default)]
    pub status: u32,
    #[serde(default)]
    pub capabilities: u32,
}

impl InputDescriptor {
    pub fn caps(&self) -> InputCapabilities {
        InputCapabilities::from_bits_retain(self.capabilities)
    }

    pub fn is_tuner(&self) -> bool {
        self.input_type == V4L2_INPUT_TYPE_TUNER
    }
}

/// Video output (`v4l2_output`)
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OutputDescriptor {
    pub index: u32,
    pub name: FixedName<32>,
    pub output_type: u32,
    #[serde(default)]
    pub audioset: u32,
    #[serde(default)]
    pub modulator: u32,
    #[serde(default)]
    pub std: u64,
    #[serde(default)]
    pub capabilities: u32,
}

impl OutputDescriptor {
    pub fn supports_standards(&self) -> bool {
        self.capabilities & V4L2_OUT_CAP_STD != 0
    }

    pub fn supports_timings(&self) -> bool {
        self.capabilities & V4L2_OUT_CAP_DV_TIMINGS != 0
    }

    pub fn is_modulator(&self) -> bool {
        self.output_type == V4L2_OUTPUT_TYPE_MODULATOR
    }
}

// ===== Standards and DV timings =====

/// Analog TV standard (`v4l2_standard`)
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StandardDescriptor {
    pub index: u32,
    /// Standard id; may carry several bits for a family
    pub id: u64,
    pub name: FixedName<24>,
    pub frame_period: Fraction,
    pub frame_lines: u32,
}

/// BT.656/1120 digital video timings (`v4l2_bt_timings`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DvTimings {
    pub width: u32,
    pub height: u32,
    pub interlaced: bool,
    pub polarities: u32,
    /// Pixel clock in Hz
    pub pixelclock: u64,
    pub hfrontporch: u32,
    pub hsync: u32,
    pub hbackporch: u32,
    pub vfrontporch: u32,
    pub vsync: u32,
    pub vbackporch: u32,
    pub il_vfrontporch: u32,
    pub il_vsync: u32,
    pub il_vbackporch: u32,
}

impl DvTimings {
    pub fn total_width(&self) -> u64 {
        self.width as u64 + self.hfrontporch as u64 + self.hsync as u64 + self.hbackporch as u64
    }

    pub fn total_height(&self) -> u64 {
        self.height as u64
            + self.vfrontporch as u64
            + self.vsync as u64
            + self.vbackporch as u64
            + self.il_vfrontporch as u64
            + self.il_vsync as u64
            + self.il_vbackporch as u64
    }

    /// Frames (or fields, when interlaced) per second derived from totals
    pub fn frame_rate(&self) -> f64 {
        let tot_w = self.total_width() as f64;
        let mut tot_h = self.total_height() as f64;
        if self.interlaced {
            tot_h /= 2.0;
        }
        if tot_w == 0.0 || tot_h == 0.0 {
            return 0.0;
        }
        self.pixelclock as f64 / (tot_w * tot_h)
    }

    /// Human-readable label, e.g. `1920x1080p60.00`
    pub fn label(&self) -> String {
        format!(
            "{}x{}{}{:.2}",
            self.width,
            self.height,
            if self.interlaced { 'i' } else { 'p' },
            self.frame_rate()
        )
    }
}

/// Entry of the DV timings enumeration (`v4l2_enum_dv_timings`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TimingsDescriptor {
    pub index: u32,
    pub timings: DvTimings,
}

// ===== Formats =====

/// Entry of the pixel format enumeration (`v4l2_fmtdesc`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatDescriptor {
    pub index: u32,
    pub buf_type: BufType,
    pub flags: u32,
    pub description: FixedName<32>,
    pub pixelformat: FourCc,
}

impl FormatDescriptor {
    pub fn is_compressed(&self) -> bool {
        self.flags & V4L2_FMT_FLAG_COMPRESSED != 0
    }

    /// Produced by software conversion rather than the hardware
    pub fn is_emulated(&self) -> bool {
        self.flags & V4L2_FMT_FLAG_EMULATED != 0
    }
}

/// Field order of a frame (`enum v4l2_field`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    #[default]
    Any,
    None,
    Top,
    Bottom,
    Interlaced,
    SeqTb,
    SeqBt,
    Alternate,
    InterlacedTb,
    InterlacedBt,
}

impl Field {
    /// Every concrete field order, in probing order
    pub const CONCRETE: [Field; 9] = [
        Field::None,
        Field::Top,
        Field::Bottom,
        Field::Interlaced,
        Field::SeqTb,
        Field::SeqBt,
        Field::Alternate,
        Field::InterlacedTb,
        Field::InterlacedBt,
    ];

    pub fn raw(self) -> u32 {
        match self {
            Field::Any => 0,
            Field::None => 1,
            Field::Top => 2,
            Field::Bottom => 3,
            Field::Interlaced => 4,
            Field::SeqTb => 5,
            Field::SeqBt => 6,
            Field::Alternate => 7,
            Field::InterlacedTb => 8,
            Field::InterlacedBt => 9,
        }
    }

    /// Each buffer carries a single field, so it has half the frame's lines
    pub fn is_single_field(self) -> bool {
        matches!(self, Field::Top | Field::Bottom | Field::Alternate)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Field::Any => "Any",
            Field::None => "None",
            Field::Top => "Top",
            Field::Bottom => "Bottom",
            Field::Interlaced => "Interlaced",
            Field::SeqTb => "Sequential Top-Bottom",
            Field::SeqBt => "Sequential Bottom-Top",
            Field::Alternate => "Alternating",
            Field::InterlacedTb => "Interlaced Top-Bottom",
            Field::InterlacedBt => "Interlaced Bottom-Top",
        };
        f.write_str(name)
    }
}

/// Current or requested image format (`v4l2_format` pix / pix_mp)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Format {
    pub buf_type: BufType,
    pub width: u32,
    pub height: u32,
    pub pixelformat: FourCc,
    #[serde(default)]
    pub field: Field,
    #[serde(default)]
    pub bytes_per_line: u32,
    #[serde(default)]
    pub size_image: u32,
}

// ===== Frame sizes and intervals =====

/// Width and height pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl fmt::Display for FrameSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Clamp `value` to `[min, max]` and round to the nearest `min + k*step`
///
/// Ties round up; a result past `max` steps back down.
pub fn snap_to_step(value: u32, min: u32, max: u32, step: u32) -> u32 {
    if max <= min {
        return min;
    }
    let step = step.max(1) as u64;
    let (min, max) = (min as u64, max as u64);
    let offset = (value as u64).clamp(min, max) - min;
    let mut snapped = min + (offset + step / 2) / step * step;
    if snapped > max {
        snapped -= step;
    }
    snapped as u32
}

/// Continuous or stepwise frame-size range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StepwiseSize {
    pub min_width: u32,
    pub max_width: u32,
    pub step_width: u32,
    pub min_height: u32,
    pub max_height: u32,
    pub step_height: u32,
}

impl StepwiseSize {
    /// Nearest size inside the range
    pub fn snap(&self, width: u32, height: u32) -> FrameSize {
        FrameSize {
            width: snap_to_step(width, self.min_width, self.max_width, self.step_width),
            height: snap_to_step(height, self.min_height, self.max_height, self.step_height),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameSizeKind {
    Discrete { width: u32, height: u32 },
    Stepwise(StepwiseSize),
    Continuous(StepwiseSize),
}

/// Entry of the frame-size enumeration (`v4l2_frmsizeenum`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameSizeEntry {
    pub index: u32,
    pub pixelformat: FourCc,
    pub kind: FrameSizeKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameIntervalKind {
    Discrete(Fraction),
    Stepwise {
        min: Fraction,
        max: Fraction,
        step: Fraction,
    },
    Continuous {
        min: Fraction,
        max: Fraction,
    },
}

/// Entry of the frame-interval enumeration (`v4l2_frmivalenum`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameIntervalEntry {
    pub index: u32,
    pub pixelformat: FourCc,
    pub width: u32,
    pub height: u32,
    pub kind: FrameIntervalKind,
}

// ===== Cropping and selection =====

/// Cropping limits (`v4l2_cropcap`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropCapability {
    pub buf_type: BufType,
    pub bounds: Rect,
    pub defrect: Rect,
    pub pixelaspect: Fraction,
}

/// Selection target (`V4L2_SEL_TGT_*`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionTarget {
    Crop,
    CropDefault,
    CropBounds,
    Compose,
    ComposeDefault,
    ComposeBounds,
}

impl SelectionTarget {
    pub fn raw(self) -> u32 {
        match self {
            SelectionTarget::Crop => V4L2_SEL_TGT_CROP,
            SelectionTarget::CropDefault => V4L2_SEL_TGT_CROP_DEFAULT,
            SelectionTarget::CropBounds => V4L2_SEL_TGT_CROP_BOUNDS,
            SelectionTarget::Compose => V4L2_SEL_TGT_COMPOSE,
            SelectionTarget::ComposeDefault => V4L2_SEL_TGT_COMPOSE_DEFAULT,
            SelectionTarget::ComposeBounds => V4L2_SEL_TGT_COMPOSE_BOUNDS,
        }
    }
}

// ===== Tuners and modulators =====

/// Tuner state (`v4l2_tuner`)
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Tuner {
    pub index: u32,
    pub name: FixedName<32>,
    pub tuner_type: u32,
    pub capability: u32,
    pub rangelow: u32,
    pub rangehigh: u32,
    #[serde(default)]
    pub rxsubchans: u32,
    #[serde(default)]
    pub audmode: u32,
    /// Signal strength, 0..=65535
    #[serde(default)]
    pub signal: i32,
    /// Automatic frequency control: negative too low, positive too high
    #[serde(default)]
    pub afc: i32,
}

impl Tuner {
    pub fn caps(&self) -> TunerCapabilities {
        TunerCapabilities::from_bits_retain(self.capability)
    }
}

/// Modulator state (`v4l2_modulator`)
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Modulator {
    pub index: u32,
    pub name: FixedName<32>,
    pub capability: u32,
    pub rangelow: u32,
    pub rangehigh: u32,
    #[serde(default)]
    pub txsubchans: u32,
    #[serde(default)]
    pub modulator_type: u32,
}

impl Modulator {
    pub fn caps(&self) -> TunerCapabilities {
        TunerCapabilities::from_bits_retain(self.capability)
    }
}

/// Tuned frequency (`v4l2_frequency`), in tuner units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Frequency {
    pub tuner: u32,
    pub tuner_type: u32,
    pub frequency: u32,
}

// ===== Events =====

/// Event subscription request (`v4l2_event_subscription`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventSubscription {
    pub event_type: u32,
    pub id: u32,
    pub flags: u32,
}

impl EventSubscription {
    /// Source-change notifications for one input
    pub fn source_change(input: u32) -> Self {
        Self {
            event_type: V4L2_EVENT_SOURCE_CHANGE,
            id: input,
            flags: 0,
        }
    }
}

/// A delivered source-change event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceChangeEvent {
    /// Input the change refers to
    pub input: u32,
    pub changes: u32,
}
