// SPDX-License-Identifier: GPL-3.0-only

//! Capability negotiation engine
//!
//! A [`Negotiator`] drives one open device through
//! `Uninitialized -> Probed -> Negotiating -> Ready` and keeps a
//! [`CapabilityModel`] of what can currently be configured.
//!
//! Two rules govern every operation:
//! - query failures narrow the model (the feature is shown as absent)
//! - commit failures are reported as [`NegotiationError::RejectedByDevice`]
//!   and the model is re-derived from fresh queries
//!
//! Caller values are checked against the model before anything is sent;
//! an out-of-range value never reaches the device.

pub mod aspect;
pub mod frames;
pub mod model;
pub mod selection;
pub mod standards;
pub mod tuner;

pub use aspect::{PixelAspect, PixelAspectHint, pixel_aspect};
pub use frames::{FrameIntervalDomain, FrameSizeDomain};
pub use model::{CapabilityModel, CaptureMethod, Topology, VbiMethod};
pub use selection::{SelectionKind, SelectionModel};
pub use standards::{match_standard, match_timings};
pub use tuner::{AudioMode, FrequencyScale, FrequencyUnit, TunerStatus};

use crate::backends::{BackendRegistry, DeviceHandle, DeviceSession};
use crate::codec::{
    BufType, BufferDirection, Capability, ControlCall, DvTimings, EventSubscription, Field,
    Format, FormatDescriptor, FourCc, Fraction, FrameIntervalEntry, FrameSize, FrameSizeEntry,
    FromReply, Frequency, InputDescriptor, Modulator, OutputDescriptor, Rect, Reply,
    SelectionTarget, SourceChangeEvent, StandardDescriptor, TimingsDescriptor, Tuner,
};
use crate::config::NegotiationConfig;
use crate::constants::{
    V4L2_STD_UNKNOWN, V4L2_TUNER_SUB_MONO, V4L2_TUNER_SUB_RDS, V4L2_TUNER_SUB_STEREO,
};
use crate::errors::{NegotiationError, NegotiationResult};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};
use model::{capture_methods, vbi_methods};
use tuner::{ModulatorModel, TunerModel};

/// Lifecycle of a [`Negotiator`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EngineState {
    Uninitialized,
    Probed,
    Negotiating,
    Ready,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineState::Uninitialized => write!(f, "uninitialized"),
            EngineState::Probed => write!(f, "probed"),
            EngineState::Negotiating => write!(f, "negotiating"),
            EngineState::Ready => write!(f, "ready"),
        }
    }
}

/// Candidate for [`Negotiator::set_standard_or_timing`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoTiming {
    /// Analog standard id, possibly several bits
    Standard(u64),
    DvTimings(DvTimings),
}

/// Outcome of a pixel format change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatChoice {
    pub format: Format,
    /// Produced by software conversion rather than the hardware
    pub emulated: bool,
}

/// Negotiation engine for one open device
pub struct Negotiator {
    session: DeviceSession,
    config: NegotiationConfig,
    state: EngineState,
    model: CapabilityModel,
    subscribed: bool,
}

impl Negotiator {
    pub fn new(session: DeviceSession, config: NegotiationConfig) -> Self {
        Self {
            session,
            config,
            state: EngineState::Uninitialized,
            model: CapabilityModel::default(),
            subscribed: false,
        }
    }

    /// Open `handle` through the registry
    pub fn open(
        registry: Arc<BackendRegistry>,
        handle: DeviceHandle,
        config: NegotiationConfig,
    ) -> NegotiationResult<Self> {
        let session =
            DeviceSession::open(registry, handle).ok_or(NegotiationError::NotFound(handle))?;
        Ok(Self::new(session, config))
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn model(&self) -> &CapabilityModel {
        &self.model
    }

    pub fn config(&self) -> &NegotiationConfig {
        &self.config
    }

    pub fn session(&self) -> &DeviceSession {
        &self.session
    }

    // ===== Lifecycle =====

    /// Query capabilities once; a failure leaves the device unusable
    pub fn probe(&mut self) -> NegotiationResult<&Capability> {
        if self.state != EngineState::Uninitialized {
            return Err(NegotiationError::WrongState {
                expected: "uninitialized",
                actual: self.state,
            });
        }
        let capability: Capability = self
            .session
            .request(&ControlCall::QueryCapability)
            .map_err(NegotiationError::ProbeFailed)?;
        info!(
            handle = self.session.handle(),
            driver = %capability.driver,
            card = %capability.card,
            bus = %capability.bus_info,
            capabilities = capability.capabilities,
            "Probed device"
        );
        self.model.capability = capability;
        self.state = EngineState::Probed;
        Ok(&self.model.capability)
    }

    /// Discover inputs, outputs, tuners and modulators and classify the
    /// device. Re-entrant: from `Ready` the format state is refreshed too.
    pub fn derive_topology(&mut self) -> NegotiationResult<&Topology> {
        if self.state == EngineState::Uninitialized {
            return Err(NegotiationError::WrongState {
                expected: "probed",
                actual: self.state,
            });
        }
        self.load_topology();
        if self.state == EngineState::Ready {
            self.refresh_format()?;
        } else {
            self.state = EngineState::Negotiating;
        }
        Ok(&self.model.topology)
    }

    /// Enumerate formats for one direction and make the engine `Ready`
    pub fn negotiate_format(
        &mut self,
        direction: BufferDirection,
    ) -> NegotiationResult<&[FormatDescriptor]> {
        self.expect_topology()?;
        let topology = self.model.topology;
        if !topology.supports_image_formats() {
            return Err(NegotiationError::Unsupported(
                "image formats on a radio device".to_string(),
            ));
        }
        if !topology.supports_direction(direction) {
            return Err(NegotiationError::Unsupported(format!("{} formats", direction)));
        }
        let previous = self.model.format_direction.replace(direction);
        if let Err(e) = self.refresh_format() {
            self.model.format_direction = previous;
            return Err(e);
        }
        self.state = EngineState::Ready;
        info!(
            %direction,
            formats = self.model.formats.len(),
            "Negotiated formats"
        );
        Ok(&self.model.formats)
    }

    // ===== Standards and timings =====

    /// Switch to an enumerated standard or timings entry
    ///
    /// The candidate is resolved against a fresh enumeration: exact match
    /// first, then the first intersecting standard the active input or
    /// output allows. No match is an invalid transition and nothing is sent.
    pub fn set_standard_or_timing(&mut self, candidate: VideoTiming) -> NegotiationResult<()> {
        self.expect_topology()?;
        match candidate {
            VideoTiming::Standard(id) => {
                if !self.model.needs_standards() {
                    return Err(NegotiationError::Unsupported(
                        "analog standards on the current input".to_string(),
                    ));
                }
                let standards: Vec<StandardDescriptor> =
                    self.enumerate_all(ControlCall::EnumStandard { index: 0 });
                let matched = match_standard(&standards, id, self.model.std_mask()).cloned();
                self.model.standards = standards;
                let Some(matched) = matched else {
                    return Err(NegotiationError::InvalidTransition(format!(
                        "standard {:#x} is not offered by the current input",
                        id
                    )));
                };
                debug!(requested = id, name = %matched.name, "Matched standard");
                self.commit(ControlCall::SetStandard(matched.id))?;
            }
            VideoTiming::DvTimings(wanted) => {
                if !self.model.needs_timings() {
                    return Err(NegotiationError::Unsupported(
                        "DV timings on the current input".to_string(),
                    ));
                }
                let timings: Vec<TimingsDescriptor> =
                    self.enumerate_all(ControlCall::EnumDvTimings { index: 0 });
                let matched = match_timings(&timings, &wanted).copied();
                self.model.timings = timings;
                let Some(matched) = matched else {
                    return Err(NegotiationError::InvalidTransition(format!(
                        "timings {} are not offered by the current input",
                        wanted.label()
                    )));
                };
                self.commit(ControlCall::SetDvTimings(matched.timings))?;
            }
        }
        self.rederive();
        Ok(())
    }

    /// Ask the device what standard it detects and switch to it
    ///
    /// Returns the now active standard id, or `None` when nothing usable
    /// was detected.
    pub fn query_standard(&mut self) -> NegotiationResult<Option<u64>> {
        self.expect_topology()?;
        if !self.model.needs_standards() {
            return Err(NegotiationError::Unsupported(
                "analog standards on the current input".to_string(),
            ));
        }
        let detected: u64 = match self.session.request(&ControlCall::QueryStandard) {
            Ok(id) => id,
            Err(e) => {
                debug!(error = %e, "Standard detection unavailable");
                return Ok(None);
            }
        };
        if detected == V4L2_STD_UNKNOWN {
            debug!("No standard detected");
            return Ok(None);
        }
        self.set_standard_or_timing(VideoTiming::Standard(detected))?;
        Ok(self.model.current_standard)
    }

    /// Ask the device what timings it detects and switch to them
    pub fn query_timings(&mut self) -> NegotiationResult<Option<DvTimings>> {
        self.expect_topology()?;
        if !self.model.needs_timings() {
            return Err(NegotiationError::Unsupported(
                "DV timings on the current input".to_string(),
            ));
        }
        let detected: DvTimings = match self.session.request(&ControlCall::QueryDvTimings) {
            Ok(t) => t,
            Err(e) => {
                debug!(error = %e, "Timings detection unavailable");
                return Ok(None);
            }
        };
        self.set_standard_or_timing(VideoTiming::DvTimings(detected))?;
        Ok(self.model.current_timings)
    }

    // ===== Format =====

    /// Set the frame size
    ///
    /// Discrete domains take only enumerated sizes; stepwise domains clamp
    /// and round. Intervals are re-enumerated for the new size.
    pub fn set_frame_geometry(&mut self, width: u32, height: u32) -> NegotiationResult<FrameSize> {
        self.expect_ready()?;
        if !self.model.topology.supports_frame_sizes() {
            return Err(NegotiationError::Unsupported(
                "frame sizes on this device".to_string(),
            ));
        }
        let current = self.current_format()?;
        let size = self
            .model
            .frame_sizes
            .resolve(width, height)
            .map_err(NegotiationError::OutOfDomain)?;
        self.commit(ControlCall::SetFormat(Format {
            width: size.width,
            height: size.height,
            ..current
        }))?;
        self.refresh_format()?;
        let applied = self
            .model
            .current_format
            .map(|f| FrameSize::new(f.width, f.height))
            .unwrap_or(size);
        info!(requested = %FrameSize::new(width, height), %applied, "Frame size set");
        Ok(applied)
    }

    /// Switch to an enumerated pixel format, trying it first
    pub fn set_pixel_format(
        &mut self,
        direction: BufferDirection,
        pixelformat: FourCc,
    ) -> NegotiationResult<FormatChoice> {
        self.expect_ready()?;
        if self.model.format_direction != Some(direction) {
            self.negotiate_format(direction)?;
        }
        let Some(descriptor) = self
            .model
            .formats
            .iter()
            .find(|d| d.pixelformat == pixelformat)
            .cloned()
        else {
            return Err(NegotiationError::OutOfDomain(format!(
                "{} is not an enumerated {} format",
                pixelformat, direction
            )));
        };
        let current = self.current_format()?;
        let tried: Format = self.session.request(&ControlCall::TryFormat(Format {
            pixelformat,
            ..current
        }))?;
        self.commit(ControlCall::SetFormat(tried))?;
        self.refresh_format()?;

        let format = self.current_format()?;
        if descriptor.is_emulated() {
            info!(format = %pixelformat, "Selected format is emulated");
        }
        Ok(FormatChoice {
            format,
            emulated: descriptor.is_emulated(),
        })
    }

    /// Set one of the field orders the device echoed back when probed
    pub fn set_field(&mut self, field: Field) -> NegotiationResult<()> {
        self.expect_ready()?;
        if !self.model.fields.contains(&field) {
            return Err(NegotiationError::OutOfDomain(format!(
                "field order {} is not supported",
                field
            )));
        }
        let current = self.current_format()?;
        self.commit(ControlCall::SetFormat(Format { field, ..current }))?;
        self.refresh_format()
    }

    /// Set the time per frame
    pub fn set_frame_interval(&mut self, interval: Fraction) -> NegotiationResult<Fraction> {
        self.expect_ready()?;
        if !self.model.frame_intervals.contains(interval) {
            return Err(NegotiationError::OutOfDomain(format!(
                "frame interval {} is not supported",
                interval
            )));
        }
        let buf_type = self.buf_type()?;
        let reply = self.commit(ControlCall::SetParm {
            buf_type,
            time_per_frame: interval,
        })?;
        let applied = match reply {
            Reply::Interval(applied) => applied,
            _ => self
                .optional(&ControlCall::GetParm { buf_type })
                .unwrap_or(interval),
        };
        self.model.current_interval = Some(applied);
        debug!(%applied, fps = applied.fps(), "Frame interval set");
        Ok(applied)
    }

    /// Pixel aspect ratio of the current format
    pub fn compute_pixel_aspect_ratio(&self, hint: PixelAspectHint) -> PixelAspect {
        let Some(format) = self.model.current_format else {
            return PixelAspect::SQUARE;
        };
        let standard = if self.model.needs_standards() {
            self.model.current_standard
        } else {
            None
        };
        pixel_aspect(
            hint,
            self.model.crop_cap.as_ref(),
            standard,
            format.field,
            FrameSize::new(format.width, format.height),
        )
    }

    // ===== Crop and compose =====

    /// Resize, then move, a crop or compose rectangle
    ///
    /// The extent is committed first and read back; the offsets are then
    /// clamped to the range that extent leaves. Returns `None` when the
    /// device has no such selection.
    pub fn update_selection(
        &mut self,
        kind: SelectionKind,
        width: u32,
        height: u32,
        left: i32,
        top: i32,
    ) -> NegotiationResult<Option<Rect>> {
        self.expect_ready()?;
        let Some(selection) = self.model.selection(kind).copied() else {
            debug!(%kind, "Selection not supported, ignoring update");
            return Ok(None);
        };
        let resized = selection
            .with_extent(width, height)
            .map_err(NegotiationError::OutOfDomain)?;
        self.commit_selection(kind, resized)?;
        let resized = self.read_selection(kind).unwrap_or(resized);

        let moved = SelectionModel {
            rect: resized,
            ..selection
        }
        .with_offsets(left, top);
        if moved != resized {
            self.commit_selection(kind, moved)?;
        }
        let applied = self.read_selection(kind).unwrap_or(moved);
        self.store_selection(kind, applied);
        debug!(%kind, rect = %applied, "Selection updated");
        Ok(Some(applied))
    }

    fn commit_selection(&mut self, kind: SelectionKind, rect: Rect) -> NegotiationResult<Reply> {
        let buf_type = self.buf_type()?;
        let call = match kind {
            SelectionKind::Crop => ControlCall::SetCrop { buf_type, rect },
            SelectionKind::Compose => ControlCall::SetSelection {
                buf_type,
                target: SelectionTarget::Compose,
                rect,
            },
        };
        self.commit(call)
    }

    fn read_selection(&self, kind: SelectionKind) -> Option<Rect> {
        let buf_type = self.buf_type().ok()?;
        let call = match kind {
            SelectionKind::Crop => ControlCall::GetCrop { buf_type },
            SelectionKind::Compose => ControlCall::GetSelection {
                buf_type,
                target: SelectionTarget::Compose,
            },
        };
        self.optional(&call)
    }

    fn store_selection(&mut self, kind: SelectionKind, rect: Rect) {
        let slot = match kind {
            SelectionKind::Crop => &mut self.model.crop,
            SelectionKind::Compose => &mut self.model.compose,
        };
        if let Some(selection) = slot {
            selection.rect = rect;
        }
    }

    // ===== Inputs and outputs =====

    pub fn set_input(&mut self, index: u32) -> NegotiationResult<()> {
        self.expect_topology()?;
        if !self.model.inputs.iter().any(|i| i.index == index) {
            return Err(NegotiationError::OutOfDomain(format!(
                "input {} is not enumerated",
                index
            )));
        }
        self.commit(ControlCall::SetInput(index))?;
        self.rederive();
        info!(input = index, "Switched input");
        Ok(())
    }

    pub fn set_output(&mut self, index: u32) -> NegotiationResult<()> {
        self.expect_topology()?;
        if !self.model.outputs.iter().any(|o| o.index == index) {
            return Err(NegotiationError::OutOfDomain(format!(
                "output {} is not enumerated",
                index
            )));
        }
        self.commit(ControlCall::SetOutput(index))?;
        self.rederive();
        info!(output = index, "Switched output");
        Ok(())
    }

    // ===== Tuner and modulator =====

    /// Tune the main tuner, or the modulator on output devices
    ///
    /// `value` is in display units (MHz, kHz or Hz depending on the tuner).
    /// Returns the tuned frequency in device units.
    pub fn set_frequency(&mut self, value: f64) -> NegotiationResult<u32> {
        self.expect_topology()?;
        let (index, tuner_type, scale, range) = if let Some(t) = &self.model.tuner {
            (t.tuner.index, t.tuner.tuner_type, t.scale, t.range())
        } else if let Some(m) = &self.model.modulator {
            (
                m.modulator.index,
                m.modulator.modulator_type,
                m.scale,
                m.range(),
            )
        } else {
            return Err(NegotiationError::Unsupported(
                "no tuner or modulator".to_string(),
            ));
        };
        let raw = scale
            .to_raw(value)
            .filter(|raw| range.contains(raw))
            .ok_or_else(|| {
                NegotiationError::OutOfDomain(format!(
                    "{} {} outside {:.2}..={:.2}",
                    value,
                    scale.unit,
                    scale.to_units(*range.start()),
                    scale.to_units(*range.end())
                ))
            })?;
        self.commit(ControlCall::SetFrequency(Frequency {
            tuner: index,
            tuner_type,
            frequency: raw,
        }))?;
        let tuned = self
            .optional::<Frequency>(&ControlCall::GetFrequency { tuner: index })
            .map(|f| f.frequency)
            .unwrap_or(raw);
        if let Some(t) = self.model.tuner.as_mut() {
            t.frequency = Some(tuned);
        } else if let Some(m) = self.model.modulator.as_mut() {
            m.frequency = Some(tuned);
        }
        info!(frequency = scale.to_units(tuned), unit = %scale.unit, "Tuned");
        Ok(tuned)
    }

    pub fn set_audio_mode(&mut self, mode: AudioMode) -> NegotiationResult<()> {
        self.expect_topology()?;
        let Some(model) = &self.model.tuner else {
            return Err(NegotiationError::Unsupported("no tuner".to_string()));
        };
        if !model.audio_modes.contains(&mode) {
            return Err(NegotiationError::OutOfDomain(format!(
                "audio mode {} is not supported by the tuner",
                mode
            )));
        }
        let index = model.tuner.index;
        let mut tuner: Tuner = self.session.request(&ControlCall::GetTuner { index })?;
        tuner.audmode = mode.raw();
        self.commit(ControlCall::SetTuner(tuner))?;
        self.reload_tuner(index);
        Ok(())
    }

    /// Fresh reception report: sub-channels, signal strength, AFC
    pub fn tuner_status(&mut self) -> NegotiationResult<TunerStatus> {
        self.expect_topology()?;
        let Some(model) = &self.model.tuner else {
            return Err(NegotiationError::Unsupported("no tuner".to_string()));
        };
        let index = model.tuner.index;
        let tuner: Tuner = self.session.request(&ControlCall::GetTuner { index })?;
        let status = TunerStatus::from_tuner(&tuner);
        if let Some(model) = self.model.tuner.as_mut() {
            model.tuner = tuner;
        }
        Ok(status)
    }

    pub fn set_modulator_stereo(&mut self, stereo: bool) -> NegotiationResult<()> {
        self.update_modulator(|m| m.supports_stereo(), "stereo", |subchans| {
            let cleared = subchans & !(V4L2_TUNER_SUB_MONO | V4L2_TUNER_SUB_STEREO);
            cleared
                | if stereo {
                    V4L2_TUNER_SUB_STEREO
                } else {
                    V4L2_TUNER_SUB_MONO
                }
        })
    }

    pub fn set_modulator_rds(&mut self, rds: bool) -> NegotiationResult<()> {
        self.update_modulator(|m| m.supports_rds(), "RDS", |subchans| {
            let cleared = subchans & !V4L2_TUNER_SUB_RDS;
            if rds { cleared | V4L2_TUNER_SUB_RDS } else { cleared }
        })
    }

    fn update_modulator(
        &mut self,
        supported: impl Fn(&ModulatorModel) -> bool,
        feature: &str,
        txsubchans: impl Fn(u32) -> u32,
    ) -> NegotiationResult<()> {
        self.expect_topology()?;
        let Some(model) = &self.model.modulator else {
            return Err(NegotiationError::Unsupported("no modulator".to_string()));
        };
        if !supported(model) {
            return Err(NegotiationError::Unsupported(format!(
                "modulator {}",
                feature
            )));
        }
        let index = model.modulator.index;
        let mut modulator: Modulator = self.session.request(&ControlCall::GetModulator { index })?;
        modulator.txsubchans = txsubchans(modulator.txsubchans);
        self.commit(ControlCall::SetModulator(modulator))?;
        let fresh = self.optional::<Modulator>(&ControlCall::GetModulator { index });
        if let (Some(fresh), Some(model)) = (fresh, self.model.modulator.as_mut()) {
            model.modulator = fresh;
        }
        Ok(())
    }

    fn reload_tuner(&mut self, index: u32) {
        let fresh = self.optional::<Tuner>(&ControlCall::GetTuner { index });
        if let (Some(fresh), Some(model)) = (fresh, self.model.tuner.as_mut()) {
            model.tuner = fresh;
        }
    }

    // ===== Events =====

    /// React to a source-change event
    ///
    /// Only events for the active input count: topology is re-derived and
    /// the standard or timings re-detected. Returns whether the event was
    /// acted on.
    pub fn handle_source_change(&mut self, event: SourceChangeEvent) -> NegotiationResult<bool> {
        self.expect_topology()?;
        if self.model.current_input != Some(event.input) {
            debug!(
                input = event.input,
                current = ?self.model.current_input,
                "Ignoring source change for inactive input"
            );
            return Ok(false);
        }
        info!(input = event.input, changes = event.changes, "Source changed");
        self.derive_topology()?;
        if self.model.needs_timings() {
            self.query_timings()?;
        } else if self.model.needs_standards() {
            self.query_standard()?;
        }
        Ok(true)
    }

    // ===== Internals =====

    fn expect_topology(&self) -> NegotiationResult<()> {
        match self.state {
            EngineState::Negotiating | EngineState::Ready => Ok(()),
            actual => Err(NegotiationError::WrongState {
                expected: "negotiating or ready",
                actual,
            }),
        }
    }

    fn expect_ready(&self) -> NegotiationResult<()> {
        match self.state {
            EngineState::Ready => Ok(()),
            actual => Err(NegotiationError::WrongState {
                expected: "ready",
                actual,
            }),
        }
    }

    fn buf_type(&self) -> NegotiationResult<BufType> {
        let direction = self
            .model
            .format_direction
            .ok_or_else(|| NegotiationError::Unsupported("no negotiated direction".to_string()))?;
        Ok(BufType::video(direction, self.model.topology.is_planar))
    }

    fn current_format(&self) -> NegotiationResult<Format> {
        self.model
            .current_format
            .ok_or_else(|| NegotiationError::Unsupported("no current format".to_string()))
    }

    /// Query that narrows the model on failure
    fn optional<T: FromReply>(&self, call: &ControlCall) -> Option<T> {
        match self.session.request(call) {
            Ok(value) => Some(value),
            Err(e) => {
                debug!(request = %call.kind(), error = %e, "Query failed, feature narrowed");
                None
            }
        }
    }

    fn enumerate_all<T: FromReply>(&self, template: ControlCall) -> Vec<T> {
        self.session
            .enumerate(template, self.config.max_enumeration_entries)
            .collect()
    }

    /// Send a state change; a refusal re-derives the model
    fn commit(&mut self, call: ControlCall) -> NegotiationResult<Reply> {
        let kind = call.kind();
        match self.session.call(&call) {
            Ok(reply) => {
                debug!(request = %kind, "Commit accepted");
                Ok(reply)
            }
            Err(e) => {
                warn!(request = %kind, error = %e, "Commit rejected, re-deriving model");
                self.rederive();
                Err(NegotiationError::from_commit(e))
            }
        }
    }

    fn rederive(&mut self) {
        self.load_topology();
        if self.state != EngineState::Ready {
            return;
        }
        if let Err(e) = self.refresh_format() {
            warn!(error = %e, "Format refresh failed after re-derive");
        }
    }

    fn load_topology(&mut self) {
        let tuner = self.optional::<Tuner>(&ControlCall::GetTuner { index: 0 });
        let rf_tuner = self.optional::<Tuner>(&ControlCall::GetTuner { index: 1 });
        let modulator = self.optional::<Modulator>(&ControlCall::GetModulator { index: 0 });
        let topology = Topology::classify(
            &self.model.capability,
            tuner.as_ref(),
            rf_tuner.as_ref(),
            modulator.as_ref(),
        );
        let node = self.model.capability.node_caps();

        let inputs: Vec<InputDescriptor> = self.enumerate_all(ControlCall::EnumInput { index: 0 });
        let current_input = if inputs.is_empty() {
            None
        } else {
            self.optional::<u32>(&ControlCall::GetInput)
        };
        let outputs: Vec<OutputDescriptor> = if topology.is_radio {
            Vec::new()
        } else {
            self.enumerate_all(ControlCall::EnumOutput { index: 0 })
        };
        let current_output = if outputs.is_empty() {
            None
        } else {
            self.optional::<u32>(&ControlCall::GetOutput)
        };

        self.model.topology = topology;
        self.model.capture_methods = capture_methods(node);
        self.model.vbi_methods = if topology.is_vbi {
            vbi_methods(node)
        } else {
            Vec::new()
        };
        self.model.inputs = inputs;
        self.model.current_input = current_input;
        self.model.outputs = outputs;
        self.model.current_output = current_output;

        self.load_standards();
        self.load_timings();
        self.load_tuners(tuner, rf_tuner, modulator);
        self.subscribe_source_changes();

        if !topology.supports_image_formats() {
            self.model.format_direction = None;
            self.model.clear_format();
        }

        info!(
            radio = topology.is_radio,
            sdr = topology.is_sdr,
            vbi = topology.is_vbi,
            output = topology.is_output,
            planar = topology.is_planar,
            inputs = self.model.inputs.len(),
            outputs = self.model.outputs.len(),
            standards = self.model.standards.len(),
            timings = self.model.timings.len(),
            "Derived topology"
        );
    }

    fn load_standards(&mut self) {
        if !self.model.needs_standards() {
            self.model.standards.clear();
            self.model.current_standard = None;
            self.model.active_standard = None;
            return;
        }
        let standards: Vec<StandardDescriptor> =
            self.enumerate_all(ControlCall::EnumStandard { index: 0 });
        let current = self.optional::<u64>(&ControlCall::GetStandard);
        let active = current
            .and_then(|id| match_standard(&standards, id, self.model.std_mask()))
            .cloned();
        if current.is_some() && active.is_none() {
            debug!("Current standard does not resolve to an enumerated standard");
        }
        self.model.standards = standards;
        self.model.current_standard = current;
        self.model.active_standard = active;
    }

    fn load_timings(&mut self) {
        if !self.model.needs_timings() {
            self.model.timings.clear();
            self.model.current_timings = None;
            self.model.active_timings = None;
            return;
        }
        let timings: Vec<TimingsDescriptor> =
            self.enumerate_all(ControlCall::EnumDvTimings { index: 0 });
        let current = self.optional::<DvTimings>(&ControlCall::GetDvTimings);
        let active = current.and_then(|t| match_timings(&timings, &t)).copied();
        self.model.timings = timings;
        self.model.current_timings = current;
        self.model.active_timings = active;
    }

    fn load_tuners(
        &mut self,
        tuner: Option<Tuner>,
        rf_tuner: Option<Tuner>,
        modulator: Option<Modulator>,
    ) {
        self.model.tuner = tuner.map(|t| {
            let frequency = self.frequency(t.index);
            TunerModel::new(t, frequency)
        });
        self.model.rf_tuner = rf_tuner.map(|t| {
            let frequency = self.frequency(t.index);
            TunerModel::new(t, frequency)
        });
        self.model.modulator = modulator.map(|m| {
            let frequency = self.frequency(m.index);
            ModulatorModel::new(m, frequency)
        });
    }

    fn frequency(&self, tuner: u32) -> Option<u32> {
        self.optional::<Frequency>(&ControlCall::GetFrequency { tuner })
            .map(|f| f.frequency)
    }

    fn subscribe_source_changes(&mut self) {
        if self.subscribed || !self.config.subscribe_source_change {
            return;
        }
        self.subscribed = true;
        for input in &self.model.inputs {
            let call = ControlCall::SubscribeEvent(EventSubscription::source_change(input.index));
            if let Err(e) = self.session.call(&call) {
                debug!(input = input.index, error = %e, "Source-change subscription failed");
            }
        }
    }

    /// Re-read everything that depends on the negotiated format
    fn refresh_format(&mut self) -> NegotiationResult<()> {
        let Some(direction) = self.model.format_direction else {
            return Ok(());
        };
        let topology = self.model.topology;
        let buf_type = BufType::video(direction, topology.is_planar);

        let formats: Vec<FormatDescriptor> =
            self.enumerate_all(ControlCall::EnumFormat { buf_type, index: 0 });
        let current = self.optional::<Format>(&ControlCall::GetFormat { buf_type });
        self.model.clear_format();
        if formats.is_empty() && current.is_none() {
            return Err(NegotiationError::Unsupported(format!("{} formats", direction)));
        }
        self.model.formats = formats;
        self.model.current_format = current;
        let Some(current) = current else {
            return Ok(());
        };

        if topology.supports_frame_sizes() {
            let sizes: Vec<FrameSizeEntry> = self.enumerate_all(ControlCall::EnumFrameSizes {
                pixelformat: current.pixelformat,
                index: 0,
            });
            if sizes.is_empty() {
                debug!(format = %current.pixelformat, "No frame sizes enumerated, using fallback range");
            }
            self.model.frame_sizes =
                FrameSizeDomain::from_entries(&sizes, self.config.fallback_frame_sizes);
        }

        let intervals: Vec<FrameIntervalEntry> =
            self.enumerate_all(ControlCall::EnumFrameIntervals {
                pixelformat: current.pixelformat,
                width: current.width,
                height: current.height,
                index: 0,
            });
        self.model.frame_intervals = FrameIntervalDomain::from_entries(&intervals);
        self.model.current_interval = self.optional(&ControlCall::GetParm { buf_type });

        // A field order is legal when the device echoes it back unchanged
        self.model.fields = Field::CONCRETE
            .iter()
            .copied()
            .filter(|&field| {
                self.optional::<Format>(&ControlCall::TryFormat(Format { field, ..current }))
                    .is_some_and(|echo| echo.field == field)
            })
            .collect();

        self.load_selections(buf_type, current);
        Ok(())
    }

    fn load_selections(&mut self, buf_type: BufType, current: Format) {
        let min_extent = self.config.min_selection_extent;
        let crop_cap = self.optional(&ControlCall::CropCap { buf_type });
        self.model.crop_cap = crop_cap;
        self.model.crop = crop_cap.and_then(|cap| {
            let rect = self.optional::<Rect>(&ControlCall::GetCrop { buf_type })?;
            Some(SelectionModel::new(
                SelectionKind::Crop,
                cap.bounds,
                rect,
                min_extent,
            ))
        });

        self.model.compose = self
            .optional::<Rect>(&ControlCall::GetSelection {
                buf_type,
                target: SelectionTarget::Compose,
            })
            .map(|rect| {
                let bounds = self
                    .optional::<Rect>(&ControlCall::GetSelection {
                        buf_type,
                        target: SelectionTarget::ComposeBounds,
                    })
                    .unwrap_or(Rect::new(0, 0, current.width, current.height));
                SelectionModel::new(SelectionKind::Compose, bounds, rect, min_extent)
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{MockBackend, MockProbe};
    use crate::codec::RequestKind;
    use crate::constants::*;
    use crate::errors::ErrorKind;

    fn ready(mock: MockBackend, direction: BufferDirection) -> (Negotiator, MockProbe) {
        let probe = mock.probe();
        let registry = Arc::new(BackendRegistry::new());
        registry.register(3, mock);
        let mut engine = Negotiator::open(registry, 3, NegotiationConfig::default()).unwrap();
        engine.probe().unwrap();
        engine.derive_topology().unwrap();
        engine.negotiate_format(direction).unwrap();
        (engine, probe)
    }

    #[test]
    fn test_state_machine_order() {
        let registry = Arc::new(BackendRegistry::new());
        registry.register(1, MockBackend::analog_capture());
        let mut engine = Negotiator::open(registry, 1, NegotiationConfig::default()).unwrap();
        assert_eq!(engine.state(), EngineState::Uninitialized);

        let err = engine.derive_topology().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::WrongState);

        engine.probe().unwrap();
        assert_eq!(engine.state(), EngineState::Probed);
        assert_eq!(engine.probe().unwrap_err().kind(), ErrorKind::WrongState);

        engine.derive_topology().unwrap();
        assert_eq!(engine.state(), EngineState::Negotiating);
        engine.negotiate_format(BufferDirection::Capture).unwrap();
        assert_eq!(engine.state(), EngineState::Ready);

        // Re-entrant
        engine.derive_topology().unwrap();
        assert_eq!(engine.state(), EngineState::Ready);
    }

    #[test]
    fn test_probe_failure_is_fatal() {
        let mock = MockBackend::bare();
        mock.probe().fail(RequestKind::QueryCapability, libc::EIO);
        let registry = Arc::new(BackendRegistry::new());
        registry.register(1, mock);
        let mut engine = Negotiator::open(registry, 1, NegotiationConfig::default()).unwrap();
        assert_eq!(engine.probe().unwrap_err().kind(), ErrorKind::ProbeFailed);
        assert_eq!(engine.state(), EngineState::Uninitialized);
    }

    #[test]
    fn test_analog_model() {
        let (engine, probe) = ready(MockBackend::analog_capture(), BufferDirection::Capture);
        let model = engine.model();
        assert!(!model.topology.is_radio);
        assert_eq!(model.inputs.len(), 3);
        assert_eq!(model.current_input, Some(0));
        assert!(model.needs_standards());
        // Television input only allows NTSC, PAL-BG and PAL-I
        assert_eq!(model.standards.len(), 3);
        assert_eq!(model.active_standard.as_ref().unwrap().name, "NTSC");
        assert!(model.frame_sizes.is_discrete());
        assert_eq!(
            model.fields,
            vec![
                Field::Top,
                Field::Bottom,
                Field::Interlaced,
                Field::SeqTb,
                Field::Alternate
            ]
        );
        assert!(model.crop.is_some());
        assert!(model.compose.is_some());
        assert_eq!(
            model.capture_methods,
            vec![CaptureMethod::Read, CaptureMethod::Streaming]
        );
        assert_eq!(probe.subscriptions().len(), 3);
        // Discovery alone never commits
        assert!(probe.commits().is_empty());
    }

    #[test]
    fn test_emulated_format_is_selectable() {
        let (mut engine, _) = ready(MockBackend::analog_capture(), BufferDirection::Capture);
        let choice = engine
            .set_pixel_format(BufferDirection::Capture, FourCc::new(b"RGB3"))
            .unwrap();
        assert!(choice.emulated);
        assert_eq!(choice.format.pixelformat, FourCc::new(b"RGB3"));

        let err = engine
            .set_pixel_format(BufferDirection::Capture, FourCc::new(b"MJPG"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OutOfDomain);
    }

    #[test]
    fn test_field_and_interval() {
        let (mut engine, probe) = ready(MockBackend::analog_capture(), BufferDirection::Capture);
        engine.set_field(Field::Top).unwrap();
        assert_eq!(
            probe.current_format(BufferDirection::Capture).unwrap().field,
            Field::Top
        );
        assert_eq!(
            engine.set_field(Field::SeqBt).unwrap_err().kind(),
            ErrorKind::OutOfDomain
        );

        assert_eq!(
            engine.set_frame_interval(Fraction::new(1, 25)).unwrap(),
            Fraction::new(1, 25)
        );
        assert_eq!(
            engine
                .set_frame_interval(Fraction::new(1, 60))
                .unwrap_err()
                .kind(),
            ErrorKind::OutOfDomain
        );
    }

    #[test]
    fn test_rejected_commit_rederives() {
        let (mut engine, probe) = ready(MockBackend::analog_capture(), BufferDirection::Capture);
        probe.fail(RequestKind::SetFormat, libc::EBUSY);
        let err = engine.set_frame_geometry(640, 480).unwrap_err();
        assert_eq!(
            err,
            NegotiationError::RejectedByDevice {
                kind: RequestKind::SetFormat,
                code: libc::EBUSY
            }
        );
        let format = engine.model().current_format.unwrap();
        assert_eq!((format.width, format.height), (720, 480));
        assert_eq!(engine.state(), EngineState::Ready);
    }

    #[test]
    fn test_hdmi_timings_and_stepwise_sizes() {
        let (mut engine, probe) = ready(MockBackend::hdmi_receiver(), BufferDirection::Capture);
        assert!(engine.model().needs_timings());
        assert_eq!(engine.model().timings.len(), 3);
        assert_eq!(
            engine.model().active_timings.unwrap().timings.label(),
            "1920x1080p60.00"
        );

        let detected = engine.query_timings().unwrap().unwrap();
        assert_eq!(detected.label(), "1280x720p60.00");
        assert_eq!(
            probe.current_format(BufferDirection::Capture).unwrap().width,
            1280
        );

        let size = engine.set_frame_geometry(1000, 1000).unwrap();
        assert_eq!(size, FrameSize::new(1008, 1000));
        assert!(engine.model().crop.is_none());
        assert_eq!(engine.model().fields, vec![Field::None]);
    }

    #[test]
    fn test_frame_size_fallback() {
        let (mut engine, _) = ready(MockBackend::hdmi_receiver(), BufferDirection::Capture);
        engine
            .set_pixel_format(BufferDirection::Capture, FourCc::new(b"NV12"))
            .unwrap();
        assert_eq!(
            engine.model().frame_sizes,
            FrameSizeDomain::Stepwise(NegotiationConfig::default().fallback_frame_sizes)
        );
    }

    #[test]
    fn test_radio_suppresses_formats() {
        let registry = Arc::new(BackendRegistry::new());
        registry.register(1, MockBackend::radio());
        let mut engine = Negotiator::open(registry, 1, NegotiationConfig::default()).unwrap();
        engine.probe().unwrap();
        engine.derive_topology().unwrap();
        assert!(engine.model().topology.is_radio);
        assert_eq!(
            engine
                .negotiate_format(BufferDirection::Capture)
                .unwrap_err()
                .kind(),
            ErrorKind::Unsupported
        );

        let tuner = engine.model().tuner.as_ref().unwrap();
        assert_eq!(tuner.scale.unit, FrequencyUnit::KHz);
        assert_eq!(tuner.frequency_units(), Some(100_000.0));

        assert_eq!(engine.set_frequency(98_500.0).unwrap(), 1_576_000);
        assert_eq!(
            engine.set_frequency(120_000.0).unwrap_err().kind(),
            ErrorKind::OutOfDomain
        );
        assert_eq!(
            engine.tuner_status().unwrap().to_string(),
            "Stereo RDS (70% too low)"
        );
    }

    #[test]
    fn test_audio_mode() {
        let (mut engine, probe) = ready(MockBackend::analog_capture(), BufferDirection::Capture);
        engine.set_audio_mode(AudioMode::Lang1Lang2).unwrap();
        assert_eq!(
            engine.model().tuner.as_ref().unwrap().audio_mode(),
            Some(AudioMode::Lang1Lang2)
        );
        assert_eq!(probe.count(RequestKind::SetTuner), 1);
    }

    #[test]
    fn test_modulator_toggles() {
        let (mut engine, probe) = ready(MockBackend::video_output(), BufferDirection::Output);
        engine.set_modulator_stereo(true).unwrap();
        engine.set_modulator_rds(true).unwrap();
        let modulator = engine.model().modulator.as_ref().unwrap();
        assert!(modulator.stereo() && modulator.rds());
        assert_eq!(
            modulator.modulator.txsubchans & V4L2_TUNER_SUB_MONO,
            0
        );
        assert_eq!(probe.count(RequestKind::SetModulator), 2);
    }

    #[test]
    fn test_source_change_for_other_input_is_ignored() {
        let (mut engine, probe) = ready(MockBackend::analog_capture(), BufferDirection::Capture);
        probe.clear_log();
        let acted = engine
            .handle_source_change(SourceChangeEvent {
                input: 2,
                changes: V4L2_EVENT_SRC_CH_RESOLUTION,
            })
            .unwrap();
        assert!(!acted);
        assert!(probe.calls().is_empty());
    }
}
