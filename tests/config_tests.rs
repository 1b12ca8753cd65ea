// SPDX-License-Identifier: MPL-2.0

//! Tests for loading engine settings and mock device profiles

use capture_control::backends::{BackendRegistry, MockBackend, MockDevice};
use capture_control::errors::ConfigError;
use capture_control::{NegotiationConfig, Negotiator};
use std::io::Write;
use std::sync::Arc;
use tempfile::NamedTempFile;

fn temp_json(text: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(text.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn test_config_default_values() {
    let config = NegotiationConfig::default();
    assert_eq!(config.min_selection_extent, 8);
    assert_eq!(config.max_enumeration_entries, 256);
    assert_eq!(config.trace_label, "v4l2");
    assert!(config.subscribe_source_change);
}

#[test]
fn test_config_load_from_file() {
    let file = temp_json(
        r#"{
            "max_enumeration_entries": 4,
            "subscribe_source_change": false,
            "trace_label": "bench"
        }"#,
    );
    let config = NegotiationConfig::load(file.path()).unwrap();
    assert_eq!(config.max_enumeration_entries, 4);
    assert!(!config.subscribe_source_change);
    assert_eq!(config.trace_label, "bench");
    assert_eq!(
        config.fallback_frame_sizes,
        NegotiationConfig::default().fallback_frame_sizes
    );
}

#[test]
fn test_config_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let err = NegotiationConfig::load(dir.path().join("absent.json")).unwrap_err();
    assert!(matches!(err, ConfigError::Io(_)));
}

#[test]
fn test_config_disables_subscriptions() {
    let mock = MockBackend::analog_capture();
    let probe = mock.probe();
    let registry = Arc::new(BackendRegistry::new());
    registry.register(1, mock);

    let config = NegotiationConfig {
        subscribe_source_change: false,
        ..Default::default()
    };
    let mut engine = Negotiator::open(registry, 1, config).unwrap();
    engine.probe().unwrap();
    engine.derive_topology().unwrap();
    assert!(probe.subscriptions().is_empty());
}

#[test]
fn test_mock_profile_from_file() {
    let json = serde_json::to_string_pretty(&MockDevice::analog_capture()).unwrap();
    let file = temp_json(&json);
    let profile = MockDevice::load(file.path()).unwrap();
    assert_eq!(profile, MockDevice::analog_capture());
}

#[test]
fn test_minimal_mock_profile_probes() {
    let file = temp_json(
        r#"{
            "capability": {
                "driver": "json-cam",
                "card": "JSON Camera",
                "bus_info": "usb-0000:00:14.0-1",
                "version": 1,
                "capabilities": 1
            }
        }"#,
    );
    let profile = MockDevice::load(file.path()).unwrap();
    let registry = Arc::new(BackendRegistry::new());
    registry.register(5, MockBackend::new(profile));

    let mut engine = Negotiator::open(registry, 5, NegotiationConfig::default()).unwrap();
    let capability = engine.probe().unwrap();
    assert_eq!(capability.driver, "json-cam");
    assert_eq!(capability.card, "JSON Camera");

    // No inputs, standards or formats: everything narrows to empty
    engine.derive_topology().unwrap();
    let model = engine.model();
    assert!(model.inputs.is_empty());
    assert!(model.standards.is_empty());
    assert!(model.tuner.is_none());
}

#[test]
fn test_malformed_profile() {
    let file = temp_json(r#"{"capability": {"driver": 5}}"#);
    assert!(matches!(
        MockDevice::load(file.path()),
        Err(ConfigError::Parse(_))
    ));
}
