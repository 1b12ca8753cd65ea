// SPDX-License-Identifier: GPL-3.0-only

//! Capability model: the derived, currently applicable configuration space

use super::frames::{FrameIntervalDomain, FrameSizeDomain};
use super::selection::{SelectionKind, SelectionModel};
use super::tuner::{ModulatorModel, TunerModel};
use crate::codec::{
    BufferDirection, Capability, CropCapability, DeviceCapabilities, DvTimings, Field, Format,
    FormatDescriptor, Fraction, InputCapabilities, InputDescriptor, Modulator, OutputDescriptor,
    StandardDescriptor, TimingsDescriptor, Tuner,
};
use serde::Serialize;

/// What kind of device this node is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Topology {
    pub is_radio: bool,
    pub is_sdr: bool,
    pub is_vbi: bool,
    pub is_output: bool,
    pub is_planar: bool,
    pub can_capture: bool,
    pub has_tuner: bool,
    pub has_rf_tuner: bool,
    pub has_modulator: bool,
}

impl Topology {
    /// Classify from the node capabilities and the first tuner/modulator
    ///
    /// A tuner or modulator whose frequencies are in radio units makes the
    /// whole device a radio, as does SDR capture.
    pub fn classify(
        cap: &Capability,
        tuner: Option<&Tuner>,
        rf_tuner: Option<&Tuner>,
        modulator: Option<&Modulator>,
    ) -> Self {
        let node = cap.node_caps();
        let is_sdr = node.contains(DeviceCapabilities::SDR_CAPTURE);
        let radio_tuner = tuner.is_some_and(|t| t.caps().is_radio_range());
        let radio_modulator = modulator.is_some_and(|m| m.caps().is_radio_range());
        Self {
            is_radio: radio_tuner || radio_modulator || is_sdr,
            is_sdr,
            is_vbi: node.is_vbi(),
            is_output: node.is_output(),
            is_planar: cap.caps().is_planar(),
            can_capture: node
                .intersects(DeviceCapabilities::VIDEO_CAPTURE | DeviceCapabilities::VIDEO_CAPTURE_MPLANE),
            has_tuner: tuner.is_some(),
            has_rf_tuner: rf_tuner.is_some(),
            has_modulator: modulator.is_some(),
        }
    }

    pub fn supports_direction(&self, direction: BufferDirection) -> bool {
        match direction {
            BufferDirection::Capture => self.can_capture,
            BufferDirection::Output => self.is_output,
        }
    }

    /// Radio devices have no image formats, cropping or compose
    pub fn supports_image_formats(&self) -> bool {
        !self.is_radio
    }

    /// Neither radio nor VBI negotiates frame sizes
    pub fn supports_frame_sizes(&self) -> bool {
        !self.is_radio && !self.is_vbi
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CaptureMethod {
    Read,
    Streaming,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum VbiMethod {
    Raw,
    Sliced,
}

pub fn capture_methods(caps: DeviceCapabilities) -> Vec<CaptureMethod> {
    let mut methods = Vec::new();
    if caps.contains(DeviceCapabilities::READWRITE) {
        methods.push(CaptureMethod::Read);
    }
    if caps.contains(DeviceCapabilities::STREAMING) {
        methods.push(CaptureMethod::Streaming);
    }
    methods
}

pub fn vbi_methods(caps: DeviceCapabilities) -> Vec<VbiMethod> {
    let mut methods = Vec::new();
    if caps.contains(DeviceCapabilities::VBI_CAPTURE) {
        methods.push(VbiMethod::Raw);
    }
    if caps.contains(DeviceCapabilities::SLICED_VBI_CAPTURE) {
        methods.push(VbiMethod::Sliced);
    }
    methods
}

/// Read-mostly projection of the device state
///
/// Every field is rebuilt from fresh queries whenever the active input,
/// output, standard, timings or format changes. Fields that could not be
/// queried stay empty.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CapabilityModel {
    pub capability: Capability,
    pub topology: Topology,
    pub capture_methods: Vec<CaptureMethod>,
    pub vbi_methods: Vec<VbiMethod>,

    pub inputs: Vec<InputDescriptor>,
    pub current_input: Option<u32>,
    pub outputs: Vec<OutputDescriptor>,
    pub current_output: Option<u32>,

    pub standards: Vec<StandardDescriptor>,
    /// Raw id from get-standard
    pub current_standard: Option<u64>,
    /// Enumerated standard the current id resolves to
    pub active_standard: Option<StandardDescriptor>,
    pub timings: Vec<TimingsDescriptor>,
    pub current_timings: Option<DvTimings>,
    pub active_timings: Option<TimingsDescriptor>,

    pub tuner: Option<TunerModel>,
    pub rf_tuner: Option<TunerModel>,
    pub modulator: Option<ModulatorModel>,

    pub format_direction: Option<BufferDirection>,
    pub formats: Vec<FormatDescriptor>,
    pub current_format: Option<Format>,
    pub frame_sizes: FrameSizeDomain,
    pub frame_intervals: FrameIntervalDomain,
    pub current_interval: Option<Fraction>,
    pub fields: Vec<Field>,

    pub crop_cap: Option<CropCapability>,
    pub crop: Option<SelectionModel>,
    pub compose: Option<SelectionModel>,
}

impl CapabilityModel {
    pub fn active_input(&self) -> Option<&InputDescriptor> {
        let index = self.current_input?;
        self.inputs.iter().find(|i| i.index == index)
    }

    pub fn active_output(&self) -> Option<&OutputDescriptor> {
        let index = self.current_output?;
        self.outputs.iter().find(|o| o.index == index)
    }

    /// The active input, or for an output device the active output, takes
    /// analog standards
    pub fn needs_standards(&self) -> bool {
        if self.topology.is_output {
            if let Some(output) = self.active_output() {
                return output.supports_standards();
            }
        } else if let Some(input) = self.active_input() {
            return input.caps().contains(InputCapabilities::STD);
        }
        false
    }

    pub fn needs_timings(&self) -> bool {
        if self.topology.is_output {
            if let Some(output) = self.active_output() {
                return output.supports_timings();
            }
        } else if let Some(input) = self.active_input() {
            return input.caps().contains(InputCapabilities::DV_TIMINGS);
        }
        false
    }

    /// Standards the active input or output accepts; zero when unrestricted
    pub fn std_mask(&self) -> u64 {
        if self.topology.is_output {
            self.active_output().map(|o| o.std).unwrap_or(0)
        } else {
            self.active_input().map(|i| i.std).unwrap_or(0)
        }
    }

    pub fn current_format_descriptor(&self) -> Option<&FormatDescriptor> {
        let format = self.current_format?;
        self.formats
            .iter()
            .find(|d| d.pixelformat == format.pixelformat)
    }

    pub fn selection(&self, kind: SelectionKind) -> Option<&SelectionModel> {
        match kind {
            SelectionKind::Crop => self.crop.as_ref(),
            SelectionKind::Compose => self.compose.as_ref(),
        }
    }

    /// Drop everything that depends on a negotiated format
    pub(super) fn clear_format(&mut self) {
        self.formats.clear();
        self.current_format = None;
        self.frame_sizes = FrameSizeDomain::Unavailable;
        self.frame_intervals = FrameIntervalDomain::Unavailable;
        self.current_interval = None;
        self.fields.clear();
        self.crop_cap = None;
        self.crop = None;
        self.compose = None;
    }
}
