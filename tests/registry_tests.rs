// SPDX-License-Identifier: MPL-2.0

//! Integration tests for control-call routing

use capture_control::backends::{BackendRegistry, LoggingBackend, MockBackend};
use capture_control::codec::{BufType, Capability};
use capture_control::constants::{V4L2_CAP_READWRITE, V4L2_CAP_VIDEO_CAPTURE};
use capture_control::{CallError, ControlCall, NegotiationConfig, Reply, RequestKind};
use std::io;
use std::sync::{Arc, Mutex};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::MakeWriter;

/// Log sink shared between the subscriber and the test
#[derive(Clone, Default)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for SharedBuf {
    type Writer = SharedBuf;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

fn capability(registry: &BackendRegistry, handle: i32) -> Capability {
    match registry.dispatch(handle, &ControlCall::QueryCapability) {
        Ok(Reply::Capability(cap)) => cap,
        other => panic!("unexpected reply: {:?}", other),
    }
}

#[test]
fn test_calls_route_by_handle() {
    let registry = BackendRegistry::new();
    registry.register(3, MockBackend::analog_capture());
    registry.register(4, MockBackend::hdmi_receiver());

    assert_eq!(capability(&registry, 3).driver, "mock-analog");
    assert_eq!(capability(&registry, 4).driver, "mock-hdmi");
    assert_eq!(
        registry.dispatch(5, &ControlCall::QueryCapability),
        Err(CallError::NotFound(5))
    );
}

#[test]
fn test_reregister_replaces_backend() {
    let registry = BackendRegistry::new();
    assert!(registry.register(7, MockBackend::bare()).is_none());
    assert!(registry.register(7, MockBackend::radio()).is_some());
    assert_eq!(registry.len(), 1);
    assert_eq!(capability(&registry, 7).driver, "mock-radio");
}

#[test]
fn test_unknown_vs_unsupported() {
    let registry = BackendRegistry::new();
    registry.register(1, MockBackend::bare());
    let context = registry.init(1).unwrap();

    let err = registry
        .ioctl(&context, 1, 0xdead_beef, &ControlCall::QueryCapability)
        .unwrap_err();
    assert_eq!(err, CallError::UnknownRequest(0xdead_beef));

    let err = registry
        .control_call(&context, 1, &ControlCall::GetTuner { index: 0 })
        .unwrap_err();
    assert_eq!(err, CallError::Unsupported(RequestKind::GetTuner));
}

#[test]
fn test_decorator_chain_is_transparent() {
    let registry = BackendRegistry::new();
    registry.register(1, MockBackend::analog_capture());
    registry.register(
        2,
        LoggingBackend::new(
            "outer",
            LoggingBackend::new("inner", MockBackend::analog_capture()),
        ),
    );

    let calls = [
        ControlCall::QueryCapability,
        ControlCall::EnumInput { index: 1 },
        ControlCall::EnumInput { index: 9 },
        ControlCall::GetStandard,
        ControlCall::GetFormat {
            buf_type: BufType::VideoCapture,
        },
        ControlCall::QueryDvTimings,
    ];
    for call in &calls {
        assert_eq!(registry.dispatch(1, call), registry.dispatch(2, call));
    }
}

#[test]
fn test_decorator_traces_calls() {
    let buf = SharedBuf::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(buf.clone())
        .with_ansi(false)
        .without_time()
        .with_env_filter(EnvFilter::new("capture_control=debug"))
        .finish();

    let config = NegotiationConfig {
        trace_label: "trace-test".to_string(),
        ..Default::default()
    };
    tracing::subscriber::with_default(subscriber, || {
        let registry = BackendRegistry::new();
        registry.register(9, config.traced(MockBackend::bare()));
        registry.dispatch(9, &ControlCall::QueryCapability).unwrap();
        registry
            .dispatch(9, &ControlCall::GetTuner { index: 0 })
            .unwrap_err();
    });

    let log = buf.contents();
    assert!(log.contains("before control call"), "{}", log);
    assert!(log.contains("after control call: ok"), "{}", log);
    assert!(log.contains("after control call: failed"), "{}", log);
    assert!(log.contains("trace-test"), "{}", log);
    assert!(log.contains("VIDIOC_QUERYCAP"), "{}", log);
}

#[test]
fn test_lifecycle_end_to_end() {
    let registry = BackendRegistry::new();
    registry.register(42, MockBackend::bare());

    let context = registry.init(42).unwrap();
    let reply = registry
        .ioctl(
            &context,
            42,
            RequestKind::QueryCapability.ioctl_code(),
            &ControlCall::QueryCapability,
        )
        .unwrap();
    let Reply::Capability(cap) = reply else {
        panic!("unexpected reply: {:?}", reply);
    };
    assert_eq!(cap.driver, "Mock Driver");
    assert_eq!(cap.card, "Mock Card");
    assert_eq!(cap.bus_info, "PCI:0000:05:06.0");
    assert_eq!(cap.capabilities, V4L2_CAP_VIDEO_CAPTURE | V4L2_CAP_READWRITE);

    // A raw number must agree with the typed argument
    let err = registry
        .ioctl(
            &context,
            42,
            RequestKind::GetInput.ioctl_code(),
            &ControlCall::QueryCapability,
        )
        .unwrap_err();
    assert_eq!(err, CallError::ArgumentMismatch(RequestKind::GetInput));

    registry.close(&context);
    assert!(registry.dispatch(42, &ControlCall::QueryCapability).is_ok());

    assert!(registry.unregister(42));
    assert_eq!(
        registry.dispatch(42, &ControlCall::QueryCapability),
        Err(CallError::NotFound(42))
    );
    assert!(registry.init(42).is_none());
    assert!(!registry.unregister(42));
}

#[test]
fn test_concurrent_dispatch() {
    let registry = Arc::new(BackendRegistry::new());
    registry.register(1, MockBackend::analog_capture());
    registry.register(2, MockBackend::hdmi_receiver());

    let workers: Vec<_> = (0..4)
        .map(|i| {
            let registry = Arc::clone(&registry);
            std::thread::spawn(move || {
                let handle = 1 + (i % 2);
                let expected = if handle == 1 { "mock-analog" } else { "mock-hdmi" };
                for _ in 0..50 {
                    assert_eq!(capability(&registry, handle).driver, expected);
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }
    assert_eq!(registry.len(), 2);
}
