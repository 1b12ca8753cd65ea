// SPDX-License-Identifier: GPL-3.0-only

//! Tuner and modulator views
//!
//! Frequencies travel in device units: 62.5 kHz, 62.5 Hz (`LOW`) or 1 Hz
//! (`1HZ`). Dividing by the scale factor gives MHz, kHz or Hz.

use crate::codec::{Modulator, Tuner, TunerCapabilities};
use crate::constants::*;
use serde::Serialize;
use std::fmt;
use std::ops::RangeInclusive;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FrequencyUnit {
    Hz,
    KHz,
    MHz,
}

impl fmt::Display for FrequencyUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrequencyUnit::Hz => write!(f, "Hz"),
            FrequencyUnit::KHz => write!(f, "kHz"),
            FrequencyUnit::MHz => write!(f, "MHz"),
        }
    }
}

/// Conversion between device units and display units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FrequencyScale {
    pub factor: u32,
    pub unit: FrequencyUnit,
}

impl FrequencyScale {
    pub fn for_caps(caps: TunerCapabilities) -> Self {
        let factor = if caps.contains(TunerCapabilities::HZ_1) {
            1
        } else {
            16
        };
        let unit = if caps.contains(TunerCapabilities::LOW) {
            FrequencyUnit::KHz
        } else if caps.contains(TunerCapabilities::HZ_1) {
            FrequencyUnit::Hz
        } else {
            FrequencyUnit::MHz
        };
        Self { factor, unit }
    }

    pub fn to_units(self, raw: u32) -> f64 {
        raw as f64 / self.factor as f64
    }

    /// Nearest device value for a frequency in display units
    pub fn to_raw(self, value: f64) -> Option<u32> {
        let raw = (value * self.factor as f64).round();
        if !raw.is_finite() || raw < 0.0 || raw > u32::MAX as f64 {
            return None;
        }
        Some(raw as u32)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum AudioMode {
    Mono,
    Stereo,
    Lang1,
    Lang2,
    Lang1Lang2,
}

impl AudioMode {
    pub fn raw(self) -> u32 {
        match self {
            AudioMode::Mono => V4L2_TUNER_MODE_MONO,
            AudioMode::Stereo => V4L2_TUNER_MODE_STEREO,
            AudioMode::Lang1 => V4L2_TUNER_MODE_LANG1,
            AudioMode::Lang2 => V4L2_TUNER_MODE_LANG2,
            AudioMode::Lang1Lang2 => V4L2_TUNER_MODE_LANG1_LANG2,
        }
    }

    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            V4L2_TUNER_MODE_MONO => Some(AudioMode::Mono),
            V4L2_TUNER_MODE_STEREO => Some(AudioMode::Stereo),
            V4L2_TUNER_MODE_LANG1 => Some(AudioMode::Lang1),
            V4L2_TUNER_MODE_LANG2 => Some(AudioMode::Lang2),
            V4L2_TUNER_MODE_LANG1_LANG2 => Some(AudioMode::Lang1Lang2),
            _ => None,
        }
    }
}

impl fmt::Display for AudioMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AudioMode::Mono => "Mono",
            AudioMode::Stereo => "Stereo",
            AudioMode::Lang1 => "Language 1",
            AudioMode::Lang2 => "Language 2",
            AudioMode::Lang1Lang2 => "Language 1+2",
        };
        f.write_str(name)
    }
}

/// Audio modes a tuner offers; mono is always available
pub fn audio_modes_for(caps: TunerCapabilities) -> Vec<AudioMode> {
    let mut modes = vec![AudioMode::Mono];
    if caps.contains(TunerCapabilities::STEREO) {
        modes.push(AudioMode::Stereo);
    }
    if caps.contains(TunerCapabilities::LANG1) {
        modes.push(AudioMode::Lang1);
    }
    if caps.contains(TunerCapabilities::LANG2) {
        modes.push(AudioMode::Lang2);
    }
    if caps.contains(TunerCapabilities::LANG1 | TunerCapabilities::LANG2) {
        modes.push(AudioMode::Lang1Lang2);
    }
    modes
}

/// Received sub-channel names, space separated
pub fn describe_subchannels(subchans: u32) -> String {
    const NAMES: [(u32, &str); 5] = [
        (V4L2_TUNER_SUB_MONO, "Mono"),
        (V4L2_TUNER_SUB_STEREO, "Stereo"),
        (V4L2_TUNER_SUB_LANG1, "Lang1"),
        (V4L2_TUNER_SUB_LANG2, "Lang2"),
        (V4L2_TUNER_SUB_RDS, "RDS"),
    ];
    NAMES
        .iter()
        .filter(|(bit, _)| subchans & bit != 0)
        .map(|(_, name)| *name)
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AfcDirection {
    Centered,
    TooLow,
    TooHigh,
}

/// Reception report from a fresh tuner query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TunerStatus {
    pub subchannels: String,
    /// Signal strength rounded to whole percent
    pub signal_percent: u32,
    pub afc: AfcDirection,
}

impl TunerStatus {
    pub fn from_tuner(tuner: &Tuner) -> Self {
        let percent = (tuner.signal as f64 / TUNER_SIGNAL_PER_PERCENT + 0.5).max(0.0);
        // AFC is only meaningful with a signal
        let afc = if tuner.signal == 0 || tuner.afc == 0 {
            AfcDirection::Centered
        } else if tuner.afc < 0 {
            AfcDirection::TooLow
        } else {
            AfcDirection::TooHigh
        };
        Self {
            subchannels: describe_subchannels(tuner.rxsubchans),
            signal_percent: percent as u32,
            afc,
        }
    }
}

impl fmt::Display for TunerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.subchannels.is_empty() {
            write!(f, "{} ", self.subchannels)?;
        }
        write!(f, "({}%", self.signal_percent)?;
        match self.afc {
            AfcDirection::Centered => {}
            AfcDirection::TooLow => write!(f, " too low")?,
            AfcDirection::TooHigh => write!(f, " too high")?,
        }
        write!(f, ")")
    }
}

/// Tuner as seen by negotiation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TunerModel {
    pub tuner: Tuner,
    /// Last read frequency in device units
    pub frequency: Option<u32>,
    pub scale: FrequencyScale,
    pub audio_modes: Vec<AudioMode>,
}

impl TunerModel {
    pub fn new(tuner: Tuner, frequency: Option<u32>) -> Self {
        let caps = tuner.caps();
        Self {
            scale: FrequencyScale::for_caps(caps),
            audio_modes: audio_modes_for(caps),
            tuner,
            frequency,
        }
    }

    /// Legal frequencies in device units
    pub fn range(&self) -> RangeInclusive<u32> {
        self.tuner.rangelow..=self.tuner.rangehigh
    }

    /// Current frequency in display units
    pub fn frequency_units(&self) -> Option<f64> {
        self.frequency.map(|f| self.scale.to_units(f))
    }

    pub fn audio_mode(&self) -> Option<AudioMode> {
        AudioMode::from_raw(self.tuner.audmode)
    }

    pub fn status(&self) -> TunerStatus {
        TunerStatus::from_tuner(&self.tuner)
    }
}

/// Modulator as seen by negotiation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModulatorModel {
    pub modulator: Modulator,
    pub frequency: Option<u32>,
    pub scale: FrequencyScale,
}

impl ModulatorModel {
    pub fn new(modulator: Modulator, frequency: Option<u32>) -> Self {
        Self {
            scale: FrequencyScale::for_caps(modulator.caps()),
            modulator,
            frequency,
        }
    }

    pub fn range(&self) -> RangeInclusive<u32> {
        self.modulator.rangelow..=self.modulator.rangehigh
    }

    pub fn supports_stereo(&self) -> bool {
        self.modulator.caps().contains(TunerCapabilities::STEREO)
    }

    pub fn supports_rds(&self) -> bool {
        self.modulator.caps().contains(TunerCapabilities::RDS)
    }

    /// Transmitting stereo
    pub fn stereo(&self) -> bool {
        self.modulator.txsubchans & V4L2_TUNER_SUB_STEREO != 0
    }

    /// Transmitting RDS
    pub fn rds(&self) -> bool {
        self.modulator.txsubchans & V4L2_TUNER_SUB_RDS != 0
    }
}
