// SPDX-License-Identifier: GPL-3.0-only

//! Backend registry
//!
//! The registry provides:
//! - Handle to backend routing with constant-time lookup
//! - The init/close/control-call/read/write surface an interception layer
//!   calls into
//! - Thread-safe access: dispatches to different handles run in parallel,
//!   calls to the same handle are serialized

use super::{DeviceBackend, DeviceHandle};
use crate::codec::{ControlCall, Reply, RequestKind};
use crate::errors::{CallError, CallResult};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Backend slot shared between the map and in-flight calls
pub type SharedBackend = Arc<Mutex<Box<dyn DeviceBackend>>>;

/// Per-open context handed out by [`BackendRegistry::init`]
#[derive(Debug, PartialEq, Eq)]
pub struct DeviceContext {
    handle: DeviceHandle,
    backend: String,
}

impl DeviceContext {
    pub fn handle(&self) -> DeviceHandle {
        self.handle
    }

    /// Name of the backend that was registered at init time
    pub fn backend_name(&self) -> &str {
        &self.backend
    }
}

/// Handle to backend map
///
/// An explicit value rather than process-wide state: whoever owns device
/// sessions constructs it and tears it down with them.
#[derive(Default)]
pub struct BackendRegistry {
    devices: RwLock<HashMap<DeviceHandle, SharedBackend>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a backend for `handle`, returning the one it replaces
    pub fn register<B>(&self, handle: DeviceHandle, backend: B) -> Option<SharedBackend>
    where
        B: DeviceBackend + 'static,
    {
        info!(handle, backend = backend.name(), "Registering device backend");
        let boxed: Box<dyn DeviceBackend> = Box::new(backend);
        self.devices
            .write()
            .insert(handle, Arc::new(Mutex::new(boxed)))
    }

    /// Remove the backend for `handle`
    ///
    /// Waits for in-flight dispatches to finish. Returns false when nothing
    /// was registered.
    pub fn unregister(&self, handle: DeviceHandle) -> bool {
        let removed = self.devices.write().remove(&handle).is_some();
        if removed {
            info!(handle, "Unregistered device backend");
        }
        removed
    }

    pub fn contains(&self, handle: DeviceHandle) -> bool {
        self.devices.read().contains_key(&handle)
    }

    pub fn len(&self) -> usize {
        self.devices.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.read().is_empty()
    }

    /// Route one control call to the backend registered for `handle`
    pub fn dispatch(&self, handle: DeviceHandle, call: &ControlCall) -> CallResult<Reply> {
        self.with_backend(handle, |backend| backend.control_call(call))
    }

    /// Open a context for `handle`
    ///
    /// `None` means no backend is registered and the caller should fall
    /// through to the real platform device.
    pub fn init(&self, handle: DeviceHandle) -> Option<DeviceContext> {
        let devices = self.devices.read();
        let backend = devices.get(&handle)?;
        let name = backend.lock().name().to_string();
        debug!(handle, backend = %name, "Opened device context");
        Some(DeviceContext {
            handle,
            backend: name,
        })
    }

    /// Release a context; the backend stays registered
    pub fn close(&self, context: &DeviceContext) {
        debug!(handle = context.handle, "Closed device context");
    }

    /// Control call through an open context
    pub fn control_call(
        &self,
        context: &DeviceContext,
        handle: DeviceHandle,
        call: &ControlCall,
    ) -> CallResult<Reply> {
        Self::check_context(context, handle)?;
        self.dispatch(handle, call)
    }

    /// Control call identified by a raw ioctl number
    ///
    /// The number must decode to a known request kind and agree with the
    /// typed argument.
    pub fn ioctl(
        &self,
        context: &DeviceContext,
        handle: DeviceHandle,
        request: u64,
        call: &ControlCall,
    ) -> CallResult<Reply> {
        let kind = RequestKind::from_ioctl(request)?;
        if kind != call.kind() {
            return Err(CallError::ArgumentMismatch(kind));
        }
        self.control_call(context, handle, call)
    }

    pub fn read_stream(
        &self,
        context: &DeviceContext,
        handle: DeviceHandle,
        buf: &mut [u8],
    ) -> CallResult<usize> {
        Self::check_context(context, handle)?;
        self.with_backend(handle, |backend| backend.read_stream(buf))
    }

    pub fn write_stream(
        &self,
        context: &DeviceContext,
        handle: DeviceHandle,
        buf: &[u8],
    ) -> CallResult<usize> {
        Self::check_context(context, handle)?;
        self.with_backend(handle, |backend| backend.write_stream(buf))
    }

    fn check_context(context: &DeviceContext, handle: DeviceHandle) -> CallResult<()> {
        if context.handle == handle {
            Ok(())
        } else {
            Err(CallError::NotFound(handle))
        }
    }

    // The read lock is held for the whole call so unregister cannot race it
    fn with_backend<T>(
        &self,
        handle: DeviceHandle,
        f: impl FnOnce(&mut dyn DeviceBackend) -> CallResult<T>,
    ) -> CallResult<T> {
        let devices = self.devices.read();
        let slot = devices.get(&handle).ok_or(CallError::NotFound(handle))?;
        let mut backend = slot.lock();
        f(&mut **backend)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::MockBackend;

    struct Fixed(&'static str);

    impl DeviceBackend for Fixed {
        fn name(&self) -> &str {
            self.0
        }

        fn control_call(&mut self, call: &ControlCall) -> CallResult<Reply> {
            match call {
                ControlCall::GetInput => Ok(Reply::Index(self.0.len() as u32)),
                other => Err(CallError::Unsupported(other.kind())),
            }
        }
    }

    #[test]
    fn test_dispatch_unknown_handle() {
        let registry = BackendRegistry::new();
        assert_eq!(
            registry.dispatch(7, &ControlCall::QueryCapability),
            Err(CallError::NotFound(7))
        );
        assert!(registry.init(7).is_none());
    }

    #[test]
    fn test_register_replaces() {
        let registry = BackendRegistry::new();
        assert!(registry.register(1, Fixed("a")).is_none());
        assert!(registry.register(1, Fixed("bbb")).is_some());
        assert_eq!(registry.len(), 1);
        assert_eq!(
            registry.dispatch(1, &ControlCall::GetInput),
            Ok(Reply::Index(3))
        );
    }

    #[test]
    fn test_context_handle_must_match() {
        let registry = BackendRegistry::new();
        registry.register(1, Fixed("a"));
        registry.register(2, Fixed("b"));
        let ctx = registry.init(1).unwrap();
        assert_eq!(ctx.backend_name(), "a");
        assert_eq!(
            registry.control_call(&ctx, 2, &ControlCall::GetInput),
            Err(CallError::NotFound(2))
        );
    }

    #[test]
    fn test_ioctl_decodes_request_codes() {
        let registry = BackendRegistry::new();
        registry.register(3, MockBackend::bare());
        let ctx = registry.init(3).unwrap();

        let code = RequestKind::QueryCapability.ioctl_code();
        assert!(matches!(
            registry.ioctl(&ctx, 3, code, &ControlCall::QueryCapability),
            Ok(Reply::Capability(_))
        ));
        assert_eq!(
            registry.ioctl(&ctx, 3, 0x1234, &ControlCall::QueryCapability),
            Err(CallError::UnknownRequest(0x1234))
        );
        assert_eq!(
            registry.ioctl(&ctx, 3, code, &ControlCall::GetInput),
            Err(CallError::ArgumentMismatch(RequestKind::QueryCapability))
        );
    }

    #[test]
    fn test_stream_defaults_unsupported() {
        let registry = BackendRegistry::new();
        registry.register(1, Fixed("a"));
        let ctx = registry.init(1).unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(
            registry.read_stream(&ctx, 1, &mut buf),
            Err(CallError::StreamUnsupported)
        );
        assert_eq!(
            registry.write_stream(&ctx, 1, &buf),
            Err(CallError::StreamUnsupported)
        );
    }
}
