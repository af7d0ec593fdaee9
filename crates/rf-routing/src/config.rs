//! Route graph configuration

use rf_core::{BufferSize, RfError, RfResult, SampleRate};
use serde::{Deserialize, Serialize};

/// Default bound on latency passes before giving up on convergence
pub const DEFAULT_LATENCY_PASS_LIMIT: usize = 5;

/// Configuration for a [`RouteGraph`](crate::RouteGraph)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Soloing a route un-solos every other route
    pub exclusive_solo: bool,

    /// A self-soloed route ignores its own mute
    pub solo_mute_override: bool,

    /// Maximum full latency passes per direction
    pub latency_pass_limit: usize,

    /// Engine sample rate (for millisecond reporting)
    pub sample_rate: SampleRate,

    /// Engine block size
    pub buffer_size: BufferSize,

    /// Bounded event queue length (None = unbounded)
    pub event_capacity: Option<usize>,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            exclusive_solo: false,
            solo_mute_override: false,
            latency_pass_limit: DEFAULT_LATENCY_PASS_LIMIT,
            sample_rate: SampleRate::default(),
            buffer_size: BufferSize::default(),
            event_capacity: None,
        }
    }
}

impl RoutingConfig {
    /// Live-mixing preset: exclusive solo, soloed routes punch through mute
    pub fn live() -> Self {
        Self {
            exclusive_solo: true,
            solo_mute_override: true,
            ..Default::default()
        }
    }

    /// Builder: enable/disable exclusive solo
    pub fn with_exclusive_solo(mut self, on: bool) -> Self {
        self.exclusive_solo = on;
        self
    }

    /// Builder: enable/disable solo-overrides-mute
    pub fn with_solo_mute_override(mut self, on: bool) -> Self {
        self.solo_mute_override = on;
        self
    }

    /// Builder: set latency pass bound
    pub fn with_latency_pass_limit(mut self, passes: usize) -> Self {
        self.latency_pass_limit = passes;
        self
    }

    /// Builder: set sample rate
    pub fn with_sample_rate(mut self, rate: SampleRate) -> Self {
        self.sample_rate = rate;
        self
    }

    /// Builder: set block size
    pub fn with_buffer_size(mut self, size: BufferSize) -> Self {
        self.buffer_size = size;
        self
    }

    /// Builder: bound the event queue
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = Some(capacity);
        self
    }

    /// Parse from JSON, missing fields take defaults
    pub fn from_json(json: &str) -> RfResult<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| RfError::Serialization(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> RfResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| RfError::Serialization(e.to_string()))
    }

    pub fn validate(&self) -> RfResult<()> {
        if self.latency_pass_limit == 0 {
            return Err(RfError::InvalidParam(
                "latency_pass_limit must be at least 1".into(),
            ));
        }
        if self.event_capacity == Some(0) {
            return Err(RfError::InvalidParam(
                "event_capacity must be non-zero when set".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RoutingConfig::default();
        assert!(!config.exclusive_solo);
        assert_eq!(config.latency_pass_limit, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_live_preset() {
        let config = RoutingConfig::live();
        assert!(config.exclusive_solo);
        assert!(config.solo_mute_override);
    }

    #[test]
    fn test_from_json_partial() {
        let config = RoutingConfig::from_json(r#"{ "exclusive_solo": true }"#).unwrap();
        assert!(config.exclusive_solo);
        assert_eq!(config.latency_pass_limit, DEFAULT_LATENCY_PASS_LIMIT);
    }

    #[test]
    fn test_invalid_pass_limit_rejected() {
        let err = RoutingConfig::from_json(r#"{ "latency_pass_limit": 0 }"#);
        assert!(matches!(err, Err(RfError::InvalidParam(_))));
        assert!(RoutingConfig::default().with_latency_pass_limit(0).validate().is_err());
    }

    #[test]
    fn test_json_roundtrip_preserves_values() {
        let config = RoutingConfig::default()
            .with_exclusive_solo(true)
            .with_buffer_size(BufferSize::Samples64)
            .with_event_capacity(32);
        let json = config.to_json().unwrap();
        assert_eq!(RoutingConfig::from_json(&json).unwrap(), config);
    }
}
