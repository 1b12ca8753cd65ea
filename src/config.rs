// SPDX-License-Identifier: GPL-3.0-only

use crate::backends::{DeviceBackend, LoggingBackend};
use crate::codec::StepwiseSize;
use crate::constants::{MAX_ENUMERATION_ENTRIES, MIN_SELECTION_EXTENT};
use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Negotiation engine settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NegotiationConfig {
    /// Frame-size range assumed when the device cannot enumerate sizes
    pub fallback_frame_sizes: StepwiseSize,
    /// Smallest crop/compose width and height offered
    pub min_selection_extent: u32,
    /// Upper bound on entries read from any enumeration
    pub max_enumeration_entries: u32,
    /// Subscribe to source-change events for every input
    pub subscribe_source_change: bool,
    /// Label attached to logging decorator trace lines
    pub trace_label: String,
}

impl Default for NegotiationConfig {
    fn default() -> Self {
        Self {
            fallback_frame_sizes: StepwiseSize {
                min_width: 8,
                max_width: 4096,
                step_width: 1,
                min_height: 8,
                max_height: 2160,
                step_height: 1,
            },
            min_selection_extent: MIN_SELECTION_EXTENT,
            max_enumeration_entries: MAX_ENUMERATION_ENTRIES,
            subscribe_source_change: true,
            trace_label: "v4l2".to_string(),
        }
    }
}

impl NegotiationConfig {
    /// Parse from JSON; missing fields keep their defaults
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_json_str(&text)?;
        debug!(path = %path.display(), "Loaded negotiation config");
        Ok(config)
    }

    /// Wrap `backend` in a logging decorator carrying [`Self::trace_label`]
    pub fn traced<B: DeviceBackend>(&self, backend: B) -> LoggingBackend<B> {
        LoggingBackend::new(self.trace_label.clone(), backend)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = NegotiationConfig::from_json_str(r#"{"min_selection_extent": 16}"#).unwrap();
        assert_eq!(config.min_selection_extent, 16);
        assert_eq!(config.max_enumeration_entries, MAX_ENUMERATION_ENTRIES);
        assert_eq!(config.fallback_frame_sizes.max_width, 4096);
        assert!(config.subscribe_source_change);
    }

    #[test]
    fn test_traced_uses_label() {
        let config = NegotiationConfig {
            trace_label: "tv0".to_string(),
            ..Default::default()
        };
        let backend = config.traced(crate::backends::MockBackend::bare());
        assert_eq!(backend.label(), "tv0");
    }

    #[test]
    fn test_bad_json_is_parse_error() {
        let err = NegotiationConfig::from_json_str("{not json").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
