// SPDX-License-Identifier: GPL-3.0-only

//! Tracing decorator for device backends
//!
//! Emits a `debug!` line before and after every call and hands back the
//! inner backend's result untouched. Decorators stack: a chain of them in
//! front of one backend answers exactly like that backend.

use super::DeviceBackend;
use crate::codec::{ControlCall, Reply};
use crate::errors::CallResult;
use tracing::debug;

/// Backend wrapper that traces every call
pub struct LoggingBackend<B> {
    label: String,
    inner: B,
}

impl<B: DeviceBackend> LoggingBackend<B> {
    pub fn new(label: impl Into<String>, inner: B) -> Self {
        Self {
            label: label.into(),
            inner,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn inner(&self) -> &B {
        &self.inner
    }

    pub fn into_inner(self) -> B {
        self.inner
    }
}

impl<B: DeviceBackend> DeviceBackend for LoggingBackend<B> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn control_call(&mut self, call: &ControlCall) -> CallResult<Reply> {
        let kind = call.kind();
        let code = format!("{:#010x}", kind.ioctl_code());
        debug!(label = %self.label, request = %kind, code = %code, "before control call");

        let result = self.inner.control_call(call);

        match &result {
            Ok(_) => debug!(label = %self.label, request = %kind, "after control call: ok"),
            Err(e) => {
                debug!(label = %self.label, request = %kind, error = %e, "after control call: failed")
            }
        }
        result
    }

    fn read_stream(&mut self, buf: &mut [u8]) -> CallResult<usize> {
        debug!(label = %self.label, len = buf.len(), "before read");
        let result = self.inner.read_stream(buf);
        debug!(label = %self.label, result = ?result, "after read");
        result
    }

    fn write_stream(&mut self, buf: &[u8]) -> CallResult<usize> {
        debug!(label = %self.label, len = buf.len(), "before write");
        let result = self.inner.write_stream(buf);
        debug!(label = %self.label, result = ?result, "after write");
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::MockBackend;
    use crate::codec::BufType;

    #[test]
    fn test_stacked_decorators_are_transparent() {
        let calls = [
            ControlCall::QueryCapability,
            ControlCall::EnumInput { index: 0 },
            ControlCall::EnumInput { index: 99 },
            ControlCall::GetFormat {
                buf_type: BufType::VideoCapture,
            },
            ControlCall::GetTuner { index: 0 },
            ControlCall::QueryDvTimings,
        ];

        let mut plain = MockBackend::analog_capture();
        let mut wrapped = LoggingBackend::new(
            "outer",
            LoggingBackend::new("inner", MockBackend::analog_capture()),
        );

        for call in &calls {
            assert_eq!(wrapped.control_call(call), plain.control_call(call));
        }

        let mut buf = [0u8; 16];
        assert_eq!(wrapped.read_stream(&mut buf), plain.read_stream(&mut buf));
        assert_eq!(wrapped.write_stream(&buf), plain.write_stream(&buf));
        assert_eq!(wrapped.name(), plain.name());
    }
}
