// SPDX-License-Identifier: GPL-3.0-only

//! Control-call vocabulary
//!
//! A control call is a request kind plus a typed argument ([`ControlCall`]);
//! a backend answers with a tagged [`Reply`]. Each [`RequestKind`] maps to
//! the platform ioctl number it stands for, so raw numbers coming from an
//! interception layer can be decoded with [`RequestKind::from_ioctl`].
//!
//! An unknown ioctl number ([`CallError::UnknownRequest`]) is a different
//! outcome from a known request that a backend does not implement
//! ([`CallError::Unsupported`]).

pub mod fixed;
pub mod flags;
pub mod types;

pub use fixed::{FixedName, NameTooLong};
pub use flags::{DeviceCapabilities, InputCapabilities, TunerCapabilities};
pub use types::*;

use crate::errors::{CallError, CallResult};
use serde::Serialize;
use std::fmt;

// ===== Request kinds =====

macro_rules! request_kinds {
    ($($variant:ident => $name:literal, $code:literal;)*) => {
        /// Every request the control-call vocabulary knows
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
        pub enum RequestKind {
            $($variant,)*
        }

        impl RequestKind {
            /// All request kinds in ioctl-number order
            pub const ALL: &'static [RequestKind] = &[$(RequestKind::$variant,)*];

            /// Platform ioctl number (`VIDIOC_*`)
            pub const fn ioctl_code(self) -> u64 {
                match self {
                    $(RequestKind::$variant => $code,)*
                }
            }

            /// Decode a raw ioctl number
            pub fn from_ioctl(code: u64) -> CallResult<Self> {
                match code {
                    $($code => Ok(RequestKind::$variant),)*
                    other => Err(CallError::UnknownRequest(other)),
                }
            }

            /// `VIDIOC_*` name
            pub const fn name(self) -> &'static str {
                match self {
                    $(RequestKind::$variant => $name,)*
                }
            }
        }
    };
}

request_kinds! {
    QueryCapability => "VIDIOC_QUERYCAP", 0x8068_5600;
    EnumFormat => "VIDIOC_ENUM_FMT", 0xc040_5602;
    GetFormat => "VIDIOC_G_FMT", 0xc0d0_5604;
    SetFormat => "VIDIOC_S_FMT", 0xc0d0_5605;
    GetParm => "VIDIOC_G_PARM", 0xc0cc_5615;
    SetParm => "VIDIOC_S_PARM", 0xc0cc_5616;
    GetStandard => "VIDIOC_G_STD", 0x8008_5617;
    SetStandard => "VIDIOC_S_STD", 0x4008_5618;
    EnumStandard => "VIDIOC_ENUMSTD", 0xc048_5619;
    EnumInput => "VIDIOC_ENUMINPUT", 0xc050_561a;
    GetTuner => "VIDIOC_G_TUNER", 0xc054_561d;
    SetTuner => "VIDIOC_S_TUNER", 0x4054_561e;
    GetInput => "VIDIOC_G_INPUT", 0x8004_5626;
    SetInput => "VIDIOC_S_INPUT", 0xc004_5627;
    GetOutput => "VIDIOC_G_OUTPUT", 0x8004_562e;
    SetOutput => "VIDIOC_S_OUTPUT", 0xc004_562f;
    EnumOutput => "VIDIOC_ENUMOUTPUT", 0xc048_5630;
    GetModulator => "VIDIOC_G_MODULATOR", 0xc044_5636;
    SetModulator => "VIDIOC_S_MODULATOR", 0x4044_5637;
    GetFrequency => "VIDIOC_G_FREQUENCY", 0xc02c_5638;
    SetFrequency => "VIDIOC_S_FREQUENCY", 0x402c_5639;
    CropCap => "VIDIOC_CROPCAP", 0xc02c_563a;
    GetCrop => "VIDIOC_G_CROP", 0xc014_563b;
    SetCrop => "VIDIOC_S_CROP", 0x4014_563c;
    QueryStandard => "VIDIOC_QUERYSTD", 0x8008_563f;
    TryFormat => "VIDIOC_TRY_FMT", 0xc0d0_5640;
    EnumFrameSizes => "VIDIOC_ENUM_FRAMESIZES", 0xc02c_564a;
    EnumFrameIntervals => "VIDIOC_ENUM_FRAMEINTERVALS", 0xc034_564b;
    SetDvTimings => "VIDIOC_S_DV_TIMINGS", 0xc084_5657;
    GetDvTimings => "VIDIOC_G_DV_TIMINGS", 0xc084_5658;
    SubscribeEvent => "VIDIOC_SUBSCRIBE_EVENT", 0x4020_565a;
    GetSelection => "VIDIOC_G_SELECTION", 0xc040_565e;
    SetSelection => "VIDIOC_S_SELECTION", 0xc040_565f;
    EnumDvTimings => "VIDIOC_ENUM_DV_TIMINGS", 0xc094_5662;
    QueryDvTimings => "VIDIOC_QUERY_DV_TIMINGS", 0x8084_5663;
}

impl RequestKind {
    /// Requests that change device state
    pub fn is_commit(self) -> bool {
        matches!(
            self,
            RequestKind::SetFormat
                | RequestKind::SetParm
                | RequestKind::SetStandard
                | RequestKind::SetTuner
                | RequestKind::SetInput
                | RequestKind::SetOutput
                | RequestKind::SetModulator
                | RequestKind::SetFrequency
                | RequestKind::SetCrop
                | RequestKind::SetDvTimings
                | RequestKind::SetSelection
        )
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ===== Requests =====

/// A request kind together with its typed argument
#[derive(Debug, Clone, PartialEq)]
pub enum ControlCall {
    QueryCapability,
    EnumFormat {
        buf_type: BufType,
        index: u32,
    },
    EnumInput {
        index: u32,
    },
    EnumOutput {
        index: u32,
    },
    EnumStandard {
        index: u32,
    },
    EnumDvTimings {
        index: u32,
    },
    EnumFrameSizes {
        pixelformat: FourCc,
        index: u32,
    },
    EnumFrameIntervals {
        pixelformat: FourCc,
        width: u32,
        height: u32,
        index: u32,
    },
    GetFormat {
        buf_type: BufType,
    },
    SetFormat(Format),
    TryFormat(Format),
    GetStandard,
    SetStandard(u64),
    QueryStandard,
    GetDvTimings,
    SetDvTimings(DvTimings),
    QueryDvTimings,
    GetInput,
    SetInput(u32),
    GetOutput,
    SetOutput(u32),
    CropCap {
        buf_type: BufType,
    },
    GetCrop {
        buf_type: BufType,
    },
    SetCrop {
        buf_type: BufType,
        rect: Rect,
    },
    GetSelection {
        buf_type: BufType,
        target: SelectionTarget,
    },
    SetSelection {
        buf_type: BufType,
        target: SelectionTarget,
        rect: Rect,
    },
    GetFrequency {
        tuner: u32,
    },
    SetFrequency(Frequency),
    GetTuner {
        index: u32,
    },
    SetTuner(Tuner),
    GetModulator {
        index: u32,
    },
    SetModulator(Modulator),
    GetParm {
        buf_type: BufType,
    },
    SetParm {
        buf_type: BufType,
        time_per_frame: Fraction,
    },
    SubscribeEvent(EventSubscription),
}

impl ControlCall {
    pub fn kind(&self) -> RequestKind {
        match self {
            ControlCall::QueryCapability => RequestKind::QueryCapability,
            ControlCall::EnumFormat { .. } => RequestKind::EnumFormat,
            ControlCall::EnumInput { .. } => RequestKind::EnumInput,
            ControlCall::EnumOutput { .. } => RequestKind::EnumOutput,
            ControlCall::EnumStandard { .. } => RequestKind::EnumStandard,
            ControlCall::EnumDvTimings { .. } => RequestKind::EnumDvTimings,
            ControlCall::EnumFrameSizes { .. } => RequestKind::EnumFrameSizes,
            ControlCall::EnumFrameIntervals { .. } => RequestKind::EnumFrameIntervals,
            ControlCall::GetFormat { .. } => RequestKind::GetFormat,
            ControlCall::SetFormat(_) => RequestKind::SetFormat,
            ControlCall::TryFormat(_) => RequestKind::TryFormat,
            ControlCall::GetStandard => RequestKind::GetStandard,
            ControlCall::SetStandard(_) => RequestKind::SetStandard,
            ControlCall::QueryStandard => RequestKind::QueryStandard,
            ControlCall::GetDvTimings => RequestKind::GetDvTimings,
            ControlCall::SetDvTimings(_) => RequestKind::SetDvTimings,
            ControlCall::QueryDvTimings => RequestKind::QueryDvTimings,
            ControlCall::GetInput => RequestKind::GetInput,
            ControlCall::SetInput(_) => RequestKind::SetInput,
            ControlCall::GetOutput => RequestKind::GetOutput,
            ControlCall::SetOutput(_) => RequestKind::SetOutput,
            ControlCall::CropCap { .. } => RequestKind::CropCap,
            ControlCall::GetCrop { .. } => RequestKind::GetCrop,
            ControlCall::SetCrop { .. } => RequestKind::SetCrop,
            ControlCall::GetSelection { .. } => RequestKind::GetSelection,
            ControlCall::SetSelection { .. } => RequestKind::SetSelection,
            ControlCall::GetFrequency { .. } => RequestKind::GetFrequency,
            ControlCall::SetFrequency(_) => RequestKind::SetFrequency,
            ControlCall::GetTuner { .. } => RequestKind::GetTuner,
            ControlCall::SetTuner(_) => RequestKind::SetTuner,
            ControlCall::GetModulator { .. } => RequestKind::GetModulator,
            ControlCall::SetModulator(_) => RequestKind::SetModulator,
            ControlCall::GetParm { .. } => RequestKind::GetParm,
            ControlCall::SetParm { .. } => RequestKind::SetParm,
            ControlCall::SubscribeEvent(_) => RequestKind::SubscribeEvent,
        }
    }

    /// Enumeration requests carry a caller-chosen index
    pub fn with_index(&self, index: u32) -> Option<ControlCall> {
        let mut call = self.clone();
        match &mut call {
            ControlCall::EnumFormat { index: i, .. }
            | ControlCall::EnumInput { index: i }
            | ControlCall::EnumOutput { index: i }
            | ControlCall::EnumStandard { index: i }
            | ControlCall::EnumDvTimings { index: i }
            | ControlCall::EnumFrameSizes { index: i, .. }
            | ControlCall::EnumFrameIntervals { index: i, .. } => *i = index,
            _ => return None,
        }
        Some(call)
    }
}

// ===== Replies =====

/// Decoded answer to a control call
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Commit accepted, nothing to return
    Done,
    Capability(Capability),
    FormatDesc(FormatDescriptor),
    Input(InputDescriptor),
    Output(OutputDescriptor),
    Standard(StandardDescriptor),
    StandardId(u64),
    DvTimings(DvTimings),
    TimingsDesc(TimingsDescriptor),
    FrameSize(FrameSizeEntry),
    FrameInterval(FrameIntervalEntry),
    Format(Format),
    /// Current input or output index
    Index(u32),
    CropCap(CropCapability),
    /// Crop or selection rectangle
    Rect(Rect),
    Frequency(Frequency),
    Tuner(Tuner),
    Modulator(Modulator),
    /// Current time per frame
    Interval(Fraction),
}

/// Typed extraction of a [`Reply`]
pub trait FromReply: Sized {
    /// `None` when the reply has another shape
    fn from_reply(reply: Reply) -> Option<Self>;
}

macro_rules! impl_from_reply {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl FromReply for $ty {
                fn from_reply(reply: Reply) -> Option<Self> {
                    match reply {
                        Reply::$variant(value) => Some(value),
                        _ => None,
                    }
                }
            }
        )*
    };
}

impl_from_reply! {
    Capability => Capability,
    FormatDescriptor => FormatDesc,
    InputDescriptor => Input,
    OutputDescriptor => Output,
    StandardDescriptor => Standard,
    u64 => StandardId,
    DvTimings => DvTimings,
    TimingsDescriptor => TimingsDesc,
    FrameSizeEntry => FrameSize,
    FrameIntervalEntry => FrameInterval,
    Format => Format,
    u32 => Index,
    CropCapability => CropCap,
    Rect => Rect,
    Frequency => Frequency,
    Tuner => Tuner,
    Modulator => Modulator,
    Fraction => Interval,
}

impl FromReply for () {
    fn from_reply(reply: Reply) -> Option<Self> {
        match reply {
            Reply::Done => Some(()),
            _ => None,
        }
    }
}

impl Reply {
    /// Extract a typed value; a mismatch is [`CallError::MalformedReply`]
    pub fn into_typed<T: FromReply>(self, kind: RequestKind) -> CallResult<T> {
        T::from_reply(self).ok_or(CallError::MalformedReply(kind))
    }
}
