// SPDX-License-Identifier: GPL-3.0-only

//! Error types for control-call routing and capability negotiation
//!
//! Two layers:
//! - [`CallError`]: what a single control call through the registry can
//!   produce (routing failures, missing capabilities, device errno).
//! - [`NegotiationError`]: what a negotiation operation reports to its
//!   caller, using the query/commit distinction the engine applies.

use crate::backends::DeviceHandle;
use crate::codec::RequestKind;
use crate::negotiation::EngineState;
use thiserror::Error;

/// Result type alias for control calls
pub type CallResult<T> = Result<T, CallError>;

/// Result type alias for negotiation operations
pub type NegotiationResult<T> = Result<T, NegotiationError>;

/// Outcome of a failed control call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CallError {
    /// No backend registered for the handle
    #[error("No backend registered for device handle {0}")]
    NotFound(DeviceHandle),

    /// Request kind is valid but this backend does not implement it
    #[error("{0} is not implemented by this backend")]
    Unsupported(RequestKind),

    /// Raw request code outside the control-call vocabulary
    #[error("Unknown control-call request code {0:#010x}")]
    UnknownRequest(u64),

    /// Hardware-reported failure carrying the platform error code
    #[error("Device failed {kind} (errno {code})")]
    Device { kind: RequestKind, code: i32 },

    /// Backend answered with a reply shape that does not fit the request
    #[error("Backend answered {0} with an unexpected reply")]
    MalformedReply(RequestKind),

    /// Raw request code and typed argument disagree
    #[error("Argument does not belong to {0}")]
    ArgumentMismatch(RequestKind),

    /// Backend does not implement stream I/O
    #[error("Stream I/O is not implemented by this backend")]
    StreamUnsupported,

    /// Stream read/write failed with the platform error code
    #[error("Stream I/O failed (errno {0})")]
    Stream(i32),
}

impl CallError {
    /// Platform errno equivalent for this outcome, if it has one
    pub fn errno(&self) -> Option<i32> {
        match self {
            CallError::NotFound(_) => Some(libc::ENODEV),
            CallError::Unsupported(_) | CallError::StreamUnsupported => Some(libc::ENOTTY),
            CallError::UnknownRequest(_) | CallError::ArgumentMismatch(_) => Some(libc::EINVAL),
            CallError::Device { code, .. } | CallError::Stream(code) => Some(*code),
            CallError::MalformedReply(_) => None,
        }
    }

    /// True when the failure means "capability absent" rather than a fault
    pub fn is_unsupported(&self) -> bool {
        matches!(
            self,
            CallError::Unsupported(_) | CallError::StreamUnsupported
        )
    }
}

/// Fieldless view of [`NegotiationError`] for callers that branch on taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    Unsupported,
    DeviceError,
    RejectedByDevice,
    OutOfDomain,
    InvalidTransition,
    ProbeFailed,
    WrongState,
    MalformedReply,
    UnknownRequest,
}

/// Errors reported by the capability negotiation engine
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NegotiationError {
    /// Device handle is not registered
    #[error("No backend registered for device handle {0}")]
    NotFound(DeviceHandle),

    /// Capability absent in backend or hardware
    #[error("Not supported: {0}")]
    Unsupported(String),

    /// Hardware failure outside a commit
    #[error("Device error during {kind} (errno {code})")]
    DeviceError { kind: RequestKind, code: i32 },

    /// A commit (set) was refused by the device; the model was re-derived
    #[error("Device rejected {kind} (errno {code})")]
    RejectedByDevice { kind: RequestKind, code: i32 },

    /// Caller value outside the enumerated or legal range; nothing was sent
    #[error("Value out of domain: {0}")]
    OutOfDomain(String),

    /// Requested change is not reachable from the current topology
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    /// The one-time capability query failed; the device is unusable
    #[error("Capability probe failed: {0}")]
    ProbeFailed(CallError),

    /// Operation issued in a state that does not allow it
    #[error("Operation requires {expected} state, engine is {actual}")]
    WrongState {
        expected: &'static str,
        actual: EngineState,
    },

    /// Backend replied with the wrong record shape
    #[error("Backend answered {0} with an unexpected reply")]
    MalformedReply(RequestKind),

    /// Raw request code outside the control-call vocabulary
    #[error("Unknown request code {0:#010x}")]
    UnknownRequest(u64),
}

impl NegotiationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            NegotiationError::NotFound(_) => ErrorKind::NotFound,
            NegotiationError::Unsupported(_) => ErrorKind::Unsupported,
            NegotiationError::DeviceError { .. } => ErrorKind::DeviceError,
            NegotiationError::RejectedByDevice { .. } => ErrorKind::RejectedByDevice,
            NegotiationError::OutOfDomain(_) => ErrorKind::OutOfDomain,
            NegotiationError::InvalidTransition(_) => ErrorKind::InvalidTransition,
            NegotiationError::ProbeFailed(_) => ErrorKind::ProbeFailed,
            NegotiationError::WrongState { .. } => ErrorKind::WrongState,
            NegotiationError::MalformedReply(_) => ErrorKind::MalformedReply,
            NegotiationError::UnknownRequest(_) => ErrorKind::UnknownRequest,
        }
    }

    /// Map a failed commit: device failures become [`NegotiationError::RejectedByDevice`]
    pub fn from_commit(err: CallError) -> Self {
        match err {
            CallError::Device { kind, code } => NegotiationError::RejectedByDevice { kind, code },
            other => other.into(),
        }
    }
}

impl From<CallError> for NegotiationError {
    fn from(err: CallError) -> Self {
        match err {
            CallError::NotFound(handle) => NegotiationError::NotFound(handle),
            CallError::Unsupported(kind) => NegotiationError::Unsupported(kind.to_string()),
            CallError::UnknownRequest(code) => NegotiationError::UnknownRequest(code),
            CallError::Device { kind, code } => NegotiationError::DeviceError { kind, code },
            CallError::MalformedReply(kind) | CallError::ArgumentMismatch(kind) => {
                NegotiationError::MalformedReply(kind)
            }
            CallError::StreamUnsupported => NegotiationError::Unsupported("stream I/O".to_string()),
            CallError::Stream(code) => {
                NegotiationError::Unsupported(format!("stream I/O (errno {})", code))
            }
        }
    }
}

/// Configuration loading errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
}
