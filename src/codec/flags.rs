// SPDX-License-Identifier: GPL-3.0-only

//! Typed views over the raw capability masks carried in descriptors
//!
//! Descriptors keep the masks as plain integers exactly as the device
//! returned them; these flag types are for interpreting them.

use crate::constants::*;
use bitflags::bitflags;

bitflags! {
    /// Device capability mask (`capabilities` / `device_caps`)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct DeviceCapabilities: u32 {
        const VIDEO_CAPTURE = V4L2_CAP_VIDEO_CAPTURE;
        const VIDEO_OUTPUT = V4L2_CAP_VIDEO_OUTPUT;
        const VIDEO_OVERLAY = V4L2_CAP_VIDEO_OVERLAY;
        const VBI_CAPTURE = V4L2_CAP_VBI_CAPTURE;
        const VBI_OUTPUT = V4L2_CAP_VBI_OUTPUT;
        const SLICED_VBI_CAPTURE = V4L2_CAP_SLICED_VBI_CAPTURE;
        const SLICED_VBI_OUTPUT = V4L2_CAP_SLICED_VBI_OUTPUT;
        const RDS_CAPTURE = V4L2_CAP_RDS_CAPTURE;
        const VIDEO_CAPTURE_MPLANE = V4L2_CAP_VIDEO_CAPTURE_MPLANE;
        const VIDEO_OUTPUT_MPLANE = V4L2_CAP_VIDEO_OUTPUT_MPLANE;
        const TUNER = V4L2_CAP_TUNER;
        const AUDIO = V4L2_CAP_AUDIO;
        const RADIO = V4L2_CAP_RADIO;
        const MODULATOR = V4L2_CAP_MODULATOR;
        const SDR_CAPTURE = V4L2_CAP_SDR_CAPTURE;
        const READWRITE = V4L2_CAP_READWRITE;
        const STREAMING = V4L2_CAP_STREAMING;
        const DEVICE_CAPS = V4L2_CAP_DEVICE_CAPS;

        // Bits we don't name are still kept
        const _ = !0;
    }
}

impl DeviceCapabilities {
    /// Any VBI flavour (raw or sliced capture)
    pub fn is_vbi(self) -> bool {
        self.intersects(Self::VBI_CAPTURE | Self::SLICED_VBI_CAPTURE)
    }

    /// Any video output, single or multi-planar
    pub fn is_output(self) -> bool {
        self.intersects(Self::VIDEO_OUTPUT | Self::VIDEO_OUTPUT_MPLANE)
    }

    /// Multi-planar capture or output
    pub fn is_planar(self) -> bool {
        self.intersects(Self::VIDEO_CAPTURE_MPLANE | Self::VIDEO_OUTPUT_MPLANE)
    }
}

bitflags! {
    /// Tuner and modulator capability mask
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TunerCapabilities: u32 {
        const LOW = V4L2_TUNER_CAP_LOW;
        const NORM = V4L2_TUNER_CAP_NORM;
        const STEREO = V4L2_TUNER_CAP_STEREO;
        const LANG2 = V4L2_TUNER_CAP_LANG2;
        const LANG1 = V4L2_TUNER_CAP_LANG1;
        const RDS = V4L2_TUNER_CAP_RDS;
        const HZ_1 = V4L2_TUNER_CAP_1HZ;

        const _ = !0;
    }
}

impl TunerCapabilities {
    /// Fine-grained frequency units, which only radio tuners use
    pub fn is_radio_range(self) -> bool {
        self.intersects(Self::LOW | Self::HZ_1)
    }
}

bitflags! {
    /// Input capability mask (`v4l2_input.capabilities`)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct InputCapabilities: u32 {
        const DV_TIMINGS = V4L2_IN_CAP_DV_TIMINGS;
        const STD = V4L2_IN_CAP_STD;
        const NATIVE_SIZE = V4L2_IN_CAP_NATIVE_SIZE;

        const _ = !0;
    }
}
