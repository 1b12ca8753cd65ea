// SPDX-License-Identifier: MPL-2.0

//! Backend abstraction layer for device control calls
//!
//! A backend answers control calls for one device handle. The registry
//! routes calls by handle without interpreting them, so the caller never
//! learns which backend is active.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │            Negotiation Engine                │
//! └────────────────────┬────────────────────────┘
//!                      │  DeviceSession
//! ┌────────────────────┴────────────────────────┐
//! │             BackendRegistry                  │
//! │   handle ─► Arc<Mutex<Box<dyn Backend>>>     │
//! └────────────────────┬────────────────────────┘
//!                      │
//! ┌────────────────────┴────────────────────────┐
//! │  LoggingBackend ─► LoggingBackend ─► Mock    │
//! │        (decorators)          (or hardware)   │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`registry`]: Handle to backend map and dispatch surface
//! - [`mock`]: Simulated device driven by a serde profile
//! - [`logging`]: Tracing decorator
//! - [`session`]: Typed calls and lazy enumerations over one handle

pub mod logging;
pub mod mock;
pub mod registry;
pub mod session;

pub use logging::LoggingBackend;
pub use mock::{MockBackend, MockDevice, MockProbe};
pub use registry::{BackendRegistry, DeviceContext};
pub use session::{DeviceSession, Enumeration};

use crate::codec::{ControlCall, Reply};
use crate::errors::{CallError, CallResult};

/// Opaque device handle (a file descriptor on the platform side)
pub type DeviceHandle = i32;

/// Device backend trait
///
/// All request kinds go through [`DeviceBackend::control_call`]; the
/// argument enum carries the kind. Decorators implement the same trait and
/// forward to an inner backend.
pub trait DeviceBackend: Send {
    /// Short identifier for logs
    fn name(&self) -> &str;

    /// Answer one control call
    ///
    /// Backends return [`CallError::Unsupported`] for request kinds they
    /// do not implement and [`CallError::Device`] for hardware failures.
    fn control_call(&mut self, call: &ControlCall) -> CallResult<Reply>;

    /// Read raw stream data into `buf`, returning the byte count
    fn read_stream(&mut self, _buf: &mut [u8]) -> CallResult<usize> {
        Err(CallError::StreamUnsupported)
    }

    /// Write raw stream data from `buf`, returning the byte count
    fn write_stream(&mut self, _buf: &[u8]) -> CallResult<usize> {
        Err(CallError::StreamUnsupported)
    }
}

impl<B: DeviceBackend + ?Sized> DeviceBackend for Box<B> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn control_call(&mut self, call: &ControlCall) -> CallResult<Reply> {
        (**self).control_call(call)
    }

    fn read_stream(&mut self, buf: &mut [u8]) -> CallResult<usize> {
        (**self).read_stream(buf)
    }

    fn write_stream(&mut self, buf: &[u8]) -> CallResult<usize> {
        (**self).write_stream(buf)
    }
}
