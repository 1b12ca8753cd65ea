// SPDX-License-Identifier: MPL-2.0

//! Integration tests for capability negotiation against the mock presets

use capture_control::backends::{BackendRegistry, MockBackend, MockProbe};
use capture_control::codec::{
    BufType, BufferDirection, DvTimings, FrameSize, Rect, SourceChangeEvent,
};
use capture_control::constants::*;
use capture_control::negotiation::{PixelAspect, PixelAspectHint, SelectionKind, VideoTiming};
use capture_control::{
    ControlCall, EngineState, ErrorKind, NegotiationConfig, Negotiator, Reply,
};
use std::sync::Arc;

struct Fixture {
    registry: Arc<BackendRegistry>,
    engine: Negotiator,
    probe: MockProbe,
}

const HANDLE: i32 = 11;

fn negotiated(mock: MockBackend) -> Fixture {
    let probe = mock.probe();
    let registry = Arc::new(BackendRegistry::new());
    registry.register(HANDLE, mock);
    let mut engine =
        Negotiator::open(Arc::clone(&registry), HANDLE, NegotiationConfig::default()).unwrap();
    engine.probe().unwrap();
    engine.derive_topology().unwrap();
    engine.negotiate_format(BufferDirection::Capture).unwrap();
    assert_eq!(engine.state(), EngineState::Ready);
    Fixture {
        registry,
        engine,
        probe,
    }
}

#[test]
fn test_open_unknown_handle() {
    let registry = Arc::new(BackendRegistry::new());
    let err = Negotiator::open(registry, 99, NegotiationConfig::default())
        .err()
        .unwrap();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn test_discrete_geometry_round_trip() {
    let Fixture {
        registry,
        mut engine,
        probe,
    } = negotiated(MockBackend::analog_capture());

    let applied = engine.set_frame_geometry(640, 480).unwrap();
    assert_eq!(applied, FrameSize::new(640, 480));

    let reply = registry
        .dispatch(
            HANDLE,
            &ControlCall::GetFormat {
                buf_type: BufType::VideoCapture,
            },
        )
        .unwrap();
    let Reply::Format(format) = reply else {
        panic!("unexpected reply: {:?}", reply);
    };
    assert_eq!((format.width, format.height), (640, 480));

    // Not an enumerated size: nothing is sent and the model stays put
    let commits = probe.commits().len();
    let err = engine.set_frame_geometry(800, 600).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::OutOfDomain);
    assert_eq!(probe.commits().len(), commits);
    let current = engine.model().current_format.unwrap();
    assert_eq!((current.width, current.height), (640, 480));
}

#[test]
fn test_pixel_aspect_from_crop_capability() {
    let Fixture { engine, .. } = negotiated(MockBackend::analog_capture());
    assert_eq!(
        engine.compute_pixel_aspect_ratio(PixelAspectHint::DeviceDefault),
        PixelAspect { x: 10, y: 11 }
    );
    assert_eq!(
        engine.compute_pixel_aspect_ratio(PixelAspectHint::Square),
        PixelAspect::SQUARE
    );
}

#[test]
fn test_crop_offsets_follow_extent() {
    let Fixture {
        mut engine, probe, ..
    } = negotiated(MockBackend::analog_capture());

    let crop = engine.model().crop.unwrap();
    assert_eq!(crop.bounds, Rect::new(0, 0, 720, 480));
    assert_eq!(crop.left_range(), 0..=0);

    let applied = engine
        .update_selection(SelectionKind::Crop, 640, 480, 200, 0)
        .unwrap()
        .unwrap();
    assert_eq!(applied, Rect::new(80, 0, 640, 480));
    assert_eq!(engine.model().crop.unwrap().left_range(), 0..=80);
    assert_eq!(probe.count(capture_control::RequestKind::SetCrop), 2);

    let err = engine
        .update_selection(SelectionKind::Crop, 721, 480, 0, 0)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::OutOfDomain);
}

#[test]
fn test_compose_resize_then_move() {
    let Fixture {
        mut engine, probe, ..
    } = negotiated(MockBackend::analog_capture());

    // Bounds come from the compose-bounds target, the full 720x480 buffer
    let compose = engine.model().compose.unwrap();
    assert_eq!(compose.bounds, Rect::new(0, 0, 720, 480));
    assert_eq!(compose.rect, Rect::new(0, 0, 720, 480));
    assert_eq!(compose.left_range(), 0..=0);

    let applied = engine
        .update_selection(SelectionKind::Compose, 640, 360, 500, 100)
        .unwrap()
        .unwrap();
    assert_eq!(applied, Rect::new(80, 100, 640, 360));

    let commits: Vec<Rect> = probe
        .commits()
        .into_iter()
        .filter_map(|call| match call {
            ControlCall::SetSelection { rect, .. } => Some(rect),
            _ => None,
        })
        .collect();
    assert_eq!(
        commits,
        vec![Rect::new(0, 0, 640, 360), Rect::new(80, 100, 640, 360)]
    );

    let compose = engine.model().compose.unwrap();
    assert_eq!(compose.rect, applied);
    assert_eq!(compose.left_range(), 0..=80);
    assert_eq!(compose.top_range(), 0..=120);

    let reply = engine
        .session()
        .call(&ControlCall::GetSelection {
            buf_type: BufType::VideoCapture,
            target: capture_control::codec::SelectionTarget::Compose,
        })
        .unwrap();
    assert_eq!(reply, Reply::Rect(applied));
}

#[test]
fn test_compose_without_support_is_ignored() {
    let Fixture { mut engine, .. } = negotiated(MockBackend::hdmi_receiver());
    assert_eq!(
        engine
            .update_selection(SelectionKind::Compose, 640, 480, 0, 0)
            .unwrap(),
        None
    );
}

#[test]
fn test_standard_exact_and_intersecting() {
    let Fixture {
        mut engine, probe, ..
    } = negotiated(MockBackend::analog_capture());

    engine
        .set_standard_or_timing(VideoTiming::Standard(V4L2_STD_PAL_I))
        .unwrap();
    assert_eq!(probe.current_standard(), V4L2_STD_PAL_I);
    assert_eq!(engine.model().active_standard.as_ref().unwrap().name, "PAL-I");

    // PAL-B alone is not enumerated; it resolves to PAL-BG
    let detected = engine.query_standard().unwrap();
    assert_eq!(detected, Some(V4L2_STD_PAL_BG));
    assert_eq!(probe.current_standard(), V4L2_STD_PAL_BG);
    assert_eq!(engine.model().active_standard.as_ref().unwrap().name, "PAL-BG");
}

#[test]
fn test_standard_outside_input_mask_is_invalid() {
    let Fixture {
        mut engine, probe, ..
    } = negotiated(MockBackend::analog_capture());

    let err = engine
        .set_standard_or_timing(VideoTiming::Standard(V4L2_STD_SECAM))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidTransition);
    assert!(probe.commits().is_empty());
    assert_eq!(probe.current_standard(), V4L2_STD_NTSC);
}

#[test]
fn test_undetected_standard_is_none() {
    let Fixture {
        mut engine, probe, ..
    } = negotiated(MockBackend::analog_capture());
    probe.set_detected_standard(V4L2_STD_UNKNOWN);
    assert_eq!(engine.query_standard().unwrap(), None);
    assert!(probe.commits().is_empty());
}

#[test]
fn test_timings_not_offered_are_invalid() {
    let Fixture {
        mut engine, probe, ..
    } = negotiated(MockBackend::hdmi_receiver());

    let vga = DvTimings {
        width: 640,
        height: 480,
        pixelclock: 25_175_000,
        ..Default::default()
    };
    let err = engine
        .set_standard_or_timing(VideoTiming::DvTimings(vga))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidTransition);

    probe.set_detected_timings(None);
    assert_eq!(engine.query_timings().unwrap(), None);
    assert!(probe.commits().is_empty());
}

#[test]
fn test_input_switch() {
    let Fixture {
        mut engine, probe, ..
    } = negotiated(MockBackend::analog_capture());

    let err = engine.set_input(7).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::OutOfDomain);
    assert!(probe.commits().is_empty());

    engine.set_input(1).unwrap();
    assert_eq!(probe.current_input(), 1);
    assert_eq!(engine.model().current_input, Some(1));
    // Composite accepts every standard the device knows
    assert_eq!(engine.model().standards.len(), 5);
    assert_eq!(engine.state(), EngineState::Ready);
}

#[test]
fn test_source_change_on_active_input() {
    let Fixture {
        mut engine, probe, ..
    } = negotiated(MockBackend::analog_capture());

    let acted = engine
        .handle_source_change(SourceChangeEvent {
            input: 0,
            changes: V4L2_EVENT_SRC_CH_RESOLUTION,
        })
        .unwrap();
    assert!(acted);
    assert_eq!(probe.current_standard(), V4L2_STD_PAL_BG);
    assert_eq!(engine.state(), EngineState::Ready);
}

#[test]
fn test_vbi_has_methods_but_no_frame_sizes() {
    let registry = Arc::new(BackendRegistry::new());
    registry.register(HANDLE, MockBackend::vbi());
    let mut engine = Negotiator::open(registry, HANDLE, NegotiationConfig::default()).unwrap();
    engine.probe().unwrap();
    let topology = *engine.derive_topology().unwrap();
    assert!(topology.is_vbi);
    assert!(!topology.supports_frame_sizes());
    assert_eq!(engine.model().vbi_methods.len(), 2);
    assert!(engine.model().needs_standards());
}

#[test]
fn test_output_device_switches_to_timings() {
    let probe;
    let mut engine = {
        let mock = MockBackend::video_output();
        probe = mock.probe();
        let registry = Arc::new(BackendRegistry::new());
        registry.register(HANDLE, mock);
        Negotiator::open(registry, HANDLE, NegotiationConfig::default()).unwrap()
    };
    engine.probe().unwrap();
    engine.derive_topology().unwrap();
    engine.negotiate_format(BufferDirection::Output).unwrap();
    assert!(engine.model().topology.is_output);
    assert!(engine.model().needs_standards());
    assert!(engine.model().modulator.is_some());

    engine.set_output(1).unwrap();
    assert!(engine.model().needs_timings());
    assert!(!engine.model().needs_standards());
    assert_eq!(engine.model().timings.len(), 2);
    assert_eq!(probe.count(capture_control::RequestKind::SetOutput), 1);
}
