// SPDX-License-Identifier: GPL-3.0-only

//! V4L2 numeric constants used by the control-call vocabulary
//!
//! Values mirror `linux/videodev2.h`. Only the subset the negotiation engine
//! and the mock device need is carried here.

// ===== Device capability bits (v4l2_capability.capabilities) =====

pub const V4L2_CAP_VIDEO_CAPTURE: u32 = 0x0000_0001;
pub const V4L2_CAP_VIDEO_OUTPUT: u32 = 0x0000_0002;
pub const V4L2_CAP_VIDEO_OVERLAY: u32 = 0x0000_0004;
pub const V4L2_CAP_VBI_CAPTURE: u32 = 0x0000_0010;
pub const V4L2_CAP_VBI_OUTPUT: u32 = 0x0000_0020;
pub const V4L2_CAP_SLICED_VBI_CAPTURE: u32 = 0x0000_0040;
pub const V4L2_CAP_SLICED_VBI_OUTPUT: u32 = 0x0000_0080;
pub const V4L2_CAP_RDS_CAPTURE: u32 = 0x0000_0100;
pub const V4L2_CAP_VIDEO_CAPTURE_MPLANE: u32 = 0x0000_1000;
pub const V4L2_CAP_VIDEO_OUTPUT_MPLANE: u32 = 0x0000_2000;
pub const V4L2_CAP_TUNER: u32 = 0x0001_0000;
pub const V4L2_CAP_AUDIO: u32 = 0x0002_0000;
pub const V4L2_CAP_RADIO: u32 = 0x0004_0000;
pub const V4L2_CAP_MODULATOR: u32 = 0x0008_0000;
pub const V4L2_CAP_SDR_CAPTURE: u32 = 0x0010_0000;
pub const V4L2_CAP_READWRITE: u32 = 0x0100_0000;
pub const V4L2_CAP_STREAMING: u32 = 0x0400_0000;
/// `device_caps` field of the capability descriptor is valid
pub const V4L2_CAP_DEVICE_CAPS: u32 = 0x8000_0000;

// ===== Tuner / modulator capability bits =====

/// Frequencies are in units of 62.5 Hz instead of 62.5 kHz
pub const V4L2_TUNER_CAP_LOW: u32 = 0x0001;
pub const V4L2_TUNER_CAP_NORM: u32 = 0x0002;
pub const V4L2_TUNER_CAP_STEREO: u32 = 0x0010;
pub const V4L2_TUNER_CAP_LANG2: u32 = 0x0020;
pub const V4L2_TUNER_CAP_LANG1: u32 = 0x0040;
pub const V4L2_TUNER_CAP_RDS: u32 = 0x0080;
/// Frequencies are in units of 1 Hz
pub const V4L2_TUNER_CAP_1HZ: u32 = 0x1000;

// ===== Tuner received / transmitted sub-channels =====

pub const V4L2_TUNER_SUB_MONO: u32 = 0x0001;
pub const V4L2_TUNER_SUB_STEREO: u32 = 0x0002;
pub const V4L2_TUNER_SUB_LANG2: u32 = 0x0004;
pub const V4L2_TUNER_SUB_LANG1: u32 = 0x0008;
pub const V4L2_TUNER_SUB_RDS: u32 = 0x0010;

// ===== Tuner audio modes =====

pub const V4L2_TUNER_MODE_MONO: u32 = 0x0000;
pub const V4L2_TUNER_MODE_STEREO: u32 = 0x0001;
pub const V4L2_TUNER_MODE_LANG2: u32 = 0x0002;
pub const V4L2_TUNER_MODE_LANG1: u32 = 0x0003;
pub const V4L2_TUNER_MODE_LANG1_LANG2: u32 = 0x0004;

// ===== Tuner types =====

pub const V4L2_TUNER_RADIO: u32 = 1;
pub const V4L2_TUNER_ANALOG_TV: u32 = 2;
pub const V4L2_TUNER_RF: u32 = 6;

// ===== Input / output types and capabilities =====

pub const V4L2_INPUT_TYPE_TUNER: u32 = 1;
pub const V4L2_INPUT_TYPE_CAMERA: u32 = 2;
pub const V4L2_OUTPUT_TYPE_MODULATOR: u32 = 1;
pub const V4L2_OUTPUT_TYPE_ANALOG: u32 = 2;

pub const V4L2_IN_CAP_DV_TIMINGS: u32 = 0x0002;
pub const V4L2_IN_CAP_STD: u32 = 0x0004;
pub const V4L2_IN_CAP_NATIVE_SIZE: u32 = 0x0008;
pub const V4L2_OUT_CAP_DV_TIMINGS: u32 = 0x0002;
pub const V4L2_OUT_CAP_STD: u32 = 0x0004;

// ===== Format descriptor flags =====

pub const V4L2_FMT_FLAG_COMPRESSED: u32 = 0x0001;
/// Format is synthesized by the conversion library, not produced by hardware
pub const V4L2_FMT_FLAG_EMULATED: u32 = 0x0002;

// ===== Buffer types =====

pub const V4L2_BUF_TYPE_VIDEO_CAPTURE: u32 = 1;
pub const V4L2_BUF_TYPE_VIDEO_OUTPUT: u32 = 2;
pub const V4L2_BUF_TYPE_VBI_CAPTURE: u32 = 4;
pub const V4L2_BUF_TYPE_SLICED_VBI_CAPTURE: u32 = 6;
pub const V4L2_BUF_TYPE_VIDEO_CAPTURE_MPLANE: u32 = 9;
pub const V4L2_BUF_TYPE_VIDEO_OUTPUT_MPLANE: u32 = 10;

// ===== Frame size / interval enumeration types =====

pub const V4L2_FRMSIZE_TYPE_DISCRETE: u32 = 1;
pub const V4L2_FRMSIZE_TYPE_CONTINUOUS: u32 = 2;
pub const V4L2_FRMSIZE_TYPE_STEPWISE: u32 = 3;

// ===== Selection targets =====

pub const V4L2_SEL_TGT_CROP: u32 = 0x0000;
pub const V4L2_SEL_TGT_CROP_DEFAULT: u32 = 0x0001;
pub const V4L2_SEL_TGT_CROP_BOUNDS: u32 = 0x0002;
pub const V4L2_SEL_TGT_COMPOSE: u32 = 0x0100;
pub const V4L2_SEL_TGT_COMPOSE_DEFAULT: u32 = 0x0101;
pub const V4L2_SEL_TGT_COMPOSE_BOUNDS: u32 = 0x0102;

// ===== Events =====

pub const V4L2_EVENT_SOURCE_CHANGE: u32 = 5;
pub const V4L2_EVENT_SRC_CH_RESOLUTION: u32 = 0x0001;

// ===== Analog TV standards =====

pub const V4L2_STD_UNKNOWN: u64 = 0;

pub const V4L2_STD_PAL_B: u64 = 0x0000_0001;
pub const V4L2_STD_PAL_B1: u64 = 0x0000_0002;
pub const V4L2_STD_PAL_G: u64 = 0x0000_0004;
pub const V4L2_STD_PAL_H: u64 = 0x0000_0008;
pub const V4L2_STD_PAL_I: u64 = 0x0000_0010;
pub const V4L2_STD_PAL_D: u64 = 0x0000_0020;
pub const V4L2_STD_PAL_D1: u64 = 0x0000_0040;
pub const V4L2_STD_PAL_K: u64 = 0x0000_0080;
pub const V4L2_STD_PAL_M: u64 = 0x0000_0100;
pub const V4L2_STD_PAL_N: u64 = 0x0000_0200;
pub const V4L2_STD_PAL_NC: u64 = 0x0000_0400;
pub const V4L2_STD_PAL_60: u64 = 0x0000_0800;
pub const V4L2_STD_NTSC_M: u64 = 0x0000_1000;
pub const V4L2_STD_NTSC_M_JP: u64 = 0x0000_2000;
pub const V4L2_STD_NTSC_443: u64 = 0x0000_4000;
pub const V4L2_STD_NTSC_M_KR: u64 = 0x0000_8000;
pub const V4L2_STD_SECAM_B: u64 = 0x0001_0000;
pub const V4L2_STD_SECAM_D: u64 = 0x0002_0000;
pub const V4L2_STD_SECAM_G: u64 = 0x0004_0000;
pub const V4L2_STD_SECAM_H: u64 = 0x0008_0000;
pub const V4L2_STD_SECAM_K: u64 = 0x0010_0000;
pub const V4L2_STD_SECAM_K1: u64 = 0x0020_0000;
pub const V4L2_STD_SECAM_L: u64 = 0x0040_0000;
pub const V4L2_STD_SECAM_LC: u64 = 0x0080_0000;

pub const V4L2_STD_NTSC: u64 = V4L2_STD_NTSC_M | V4L2_STD_NTSC_M_JP | V4L2_STD_NTSC_M_KR;
pub const V4L2_STD_PAL_BG: u64 = V4L2_STD_PAL_B | V4L2_STD_PAL_B1 | V4L2_STD_PAL_G;
pub const V4L2_STD_PAL_DK: u64 = V4L2_STD_PAL_D | V4L2_STD_PAL_D1 | V4L2_STD_PAL_K;
pub const V4L2_STD_PAL: u64 = V4L2_STD_PAL_BG | V4L2_STD_PAL_DK | V4L2_STD_PAL_H | V4L2_STD_PAL_I;
pub const V4L2_STD_SECAM: u64 = V4L2_STD_SECAM_B
    | V4L2_STD_SECAM_D
    | V4L2_STD_SECAM_G
    | V4L2_STD_SECAM_H
    | V4L2_STD_SECAM_K
    | V4L2_STD_SECAM_K1
    | V4L2_STD_SECAM_L
    | V4L2_STD_SECAM_LC;
pub const V4L2_STD_525_60: u64 =
    V4L2_STD_PAL_M | V4L2_STD_PAL_60 | V4L2_STD_NTSC | V4L2_STD_NTSC_443;
pub const V4L2_STD_625_50: u64 = V4L2_STD_PAL | V4L2_STD_PAL_N | V4L2_STD_PAL_NC | V4L2_STD_SECAM;

// ===== Negotiation defaults =====

/// Smallest crop/compose extent offered to callers
pub const MIN_SELECTION_EXTENT: u32 = 8;

/// Upper bound on entries read from any single enumeration
pub const MAX_ENUMERATION_ENTRIES: u32 = 256;

/// Signal strength scale: the tuner reports 0..=65535
pub const TUNER_SIGNAL_PER_PERCENT: f64 = 655.35;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_groups() {
        assert_eq!(V4L2_STD_NTSC, 0x0000_b000);
        assert_eq!(V4L2_STD_PAL, 0x0000_00ff);
        assert_eq!(V4L2_STD_SECAM, 0x00ff_0000);
        // 525/60 and 625/50 line systems never overlap
        assert_eq!(V4L2_STD_525_60 & V4L2_STD_625_50, 0);
    }

    #[test]
    fn test_capability_bits_are_distinct() {
        let bits = [
            V4L2_CAP_VIDEO_CAPTURE,
            V4L2_CAP_VIDEO_OUTPUT,
            V4L2_CAP_VBI_CAPTURE,
            V4L2_CAP_SLICED_VBI_CAPTURE,
            V4L2_CAP_VIDEO_CAPTURE_MPLANE,
            V4L2_CAP_VIDEO_OUTPUT_MPLANE,
            V4L2_CAP_TUNER,
            V4L2_CAP_SDR_CAPTURE,
            V4L2_CAP_READWRITE,
            V4L2_CAP_STREAMING,
            V4L2_CAP_DEVICE_CAPS,
        ];
        let combined = bits.iter().fold(0u32, |acc, b| {
            assert_eq!(acc & b, 0);
            acc | b
        });
        assert_eq!(combined.count_ones() as usize, bits.len());
    }
}
