// SPDX-License-Identifier: GPL-3.0-only

//! Typed access to one open device
//!
//! [`DeviceSession`] pairs a registry with the context returned by
//! `init`, and turns replies into typed values. Enumerations are exposed
//! as [`Enumeration`], a lazy iterator that issues one indexed call per
//! item, stops at the first failure or after a fixed entry count, and can
//! be restarted from index zero.

use super::{BackendRegistry, DeviceContext, DeviceHandle};
use crate::codec::{ControlCall, FromReply, Reply};
use crate::errors::{CallError, CallResult};
use std::marker::PhantomData;
use std::sync::Arc;

/// Open device: registry plus the context from `init`
pub struct DeviceSession {
    registry: Arc<BackendRegistry>,
    context: DeviceContext,
}

impl DeviceSession {
    /// `None` when no backend is registered for `handle`
    pub fn open(registry: Arc<BackendRegistry>, handle: DeviceHandle) -> Option<Self> {
        let context = registry.init(handle)?;
        Some(Self { registry, context })
    }

    pub fn handle(&self) -> DeviceHandle {
        self.context.handle()
    }

    pub fn backend_name(&self) -> &str {
        self.context.backend_name()
    }

    pub fn call(&self, call: &ControlCall) -> CallResult<Reply> {
        self.registry
            .control_call(&self.context, self.context.handle(), call)
    }

    /// Issue `call` and extract the expected reply type
    pub fn request<T: FromReply>(&self, call: &ControlCall) -> CallResult<T> {
        let kind = call.kind();
        self.call(call)?.into_typed(kind)
    }

    /// Lazily enumerate with `template`, whose index is replaced per item
    pub fn enumerate<T: FromReply>(&self, template: ControlCall, limit: u32) -> Enumeration<'_, T> {
        Enumeration {
            session: self,
            template,
            limit,
            next: 0,
            stop: None,
            _item: PhantomData,
        }
    }
}

impl Drop for DeviceSession {
    fn drop(&mut self) {
        self.registry.close(&self.context);
    }
}

/// Why an enumeration ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnumerationEnd {
    /// The device reported an error for the next index
    Failed(CallError),
    /// The entry limit was reached
    Limit,
}

/// Restartable, bounded enumeration over one request kind
pub struct Enumeration<'a, T> {
    session: &'a DeviceSession,
    template: ControlCall,
    limit: u32,
    next: u32,
    stop: Option<EnumerationEnd>,
    _item: PhantomData<fn() -> T>,
}

impl<T: FromReply> Enumeration<'_, T> {
    /// Start again from index zero
    pub fn restart(&mut self) {
        self.next = 0;
        self.stop = None;
    }

    /// Why iteration stopped, once it has
    pub fn end(&self) -> Option<&EnumerationEnd> {
        self.stop.as_ref()
    }

    /// True when the very first call failed because the backend lacks the
    /// request kind
    pub fn is_unsupported(&self) -> bool {
        self.next == 0
            && matches!(&self.stop, Some(EnumerationEnd::Failed(e)) if e.is_unsupported())
    }
}

impl<T: FromReply> Iterator for Enumeration<'_, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        if self.stop.is_some() {
            return None;
        }
        if self.next >= self.limit {
            self.stop = Some(EnumerationEnd::Limit);
            return None;
        }
        let kind = self.template.kind();
        let result = match self.template.with_index(self.next) {
            Some(call) => self.session.request::<T>(&call),
            None => Err(CallError::ArgumentMismatch(kind)),
        };
        match result {
            Ok(item) => {
                self.next += 1;
                Some(item)
            }
            Err(e) => {
                self.stop = Some(EnumerationEnd::Failed(e));
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::MockBackend;
    use crate::codec::{InputDescriptor, StandardDescriptor};

    fn session(mock: MockBackend) -> DeviceSession {
        let registry = Arc::new(BackendRegistry::new());
        registry.register(5, mock);
        DeviceSession::open(registry, 5).unwrap()
    }

    #[test]
    fn test_enumeration_stops_at_first_failure_and_restarts() {
        let session = session(MockBackend::analog_capture());
        let mut inputs = session.enumerate::<InputDescriptor>(ControlCall::EnumInput { index: 0 }, 64);

        let names: Vec<String> = inputs.by_ref().map(|i| i.name.to_string()).collect();
        assert_eq!(names, vec!["Television", "Composite", "S-Video"]);
        assert!(matches!(
            inputs.end(),
            Some(EnumerationEnd::Failed(CallError::Device { code, .. })) if *code == libc::EINVAL
        ));
        assert!(inputs.next().is_none());

        inputs.restart();
        assert_eq!(inputs.count(), 3);
    }

    #[test]
    fn test_enumeration_is_bounded() {
        let session = session(MockBackend::analog_capture());
        let mut standards =
            session.enumerate::<StandardDescriptor>(ControlCall::EnumStandard { index: 0 }, 2);
        assert_eq!(standards.by_ref().count(), 2);
        assert_eq!(standards.end(), Some(&EnumerationEnd::Limit));
    }

    #[test]
    fn test_unsupported_enumeration() {
        let session = session(MockBackend::bare());
        let mut inputs = session.enumerate::<InputDescriptor>(ControlCall::EnumInput { index: 0 }, 64);
        assert!(inputs.next().is_none());
        assert!(inputs.is_unsupported());
    }

    #[test]
    fn test_non_enumeration_template() {
        let session = session(MockBackend::bare());
        let mut it = session.enumerate::<u32>(ControlCall::GetInput, 4);
        assert!(it.next().is_none());
        assert!(matches!(
            it.end(),
            Some(EnumerationEnd::Failed(CallError::ArgumentMismatch(_)))
        ));
    }
}
