// SPDX-License-Identifier: GPL-3.0-only

//! Capture Control - device control-call routing and capability negotiation
//!
//! This library sits beneath a capture front end. It routes typed V4L2
//! style control calls to pluggable device backends and derives, from the
//! answers, which standards, timings, formats, frame sizes, intervals and
//! selections can currently be configured.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`codec`]: Request kinds, argument and reply records
//! - [`backends`]: Backend trait, registry, mock device and logging decorator
//! - [`negotiation`]: Capability model and the negotiation engine
//! - [`config`]: Engine settings
//! - [`errors`]: Routing and negotiation error types
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use capture_control::backends::{BackendRegistry, LoggingBackend, MockBackend};
//! use capture_control::codec::BufferDirection;
//! use capture_control::{NegotiationConfig, Negotiator};
//!
//! let registry = Arc::new(BackendRegistry::new());
//! registry.register(42, LoggingBackend::new("v4l2", MockBackend::analog_capture()));
//!
//! let mut engine = Negotiator::open(registry, 42, NegotiationConfig::default()).unwrap();
//! engine.probe().unwrap();
//! engine.derive_topology().unwrap();
//! engine.negotiate_format(BufferDirection::Capture).unwrap();
//! assert!(engine.model().frame_sizes.is_discrete());
//! ```

pub mod backends;
pub mod codec;
pub mod config;
pub mod constants;
pub mod errors;
pub mod negotiation;

// Re-export commonly used types
pub use backends::{BackendRegistry, DeviceBackend, DeviceHandle};
pub use codec::{ControlCall, Reply, RequestKind};
pub use config::NegotiationConfig;
pub use errors::{CallError, ErrorKind, NegotiationError};
pub use negotiation::{CapabilityModel, EngineState, Negotiator};
