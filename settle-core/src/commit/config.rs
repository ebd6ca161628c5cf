//! Debounce configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};

/// How long the watched value must stay unchanged before it is committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebounceConfig {
    pub delay_ms: u64,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self { delay_ms: 1000 }
    }
}

impl DebounceConfig {
    pub fn new(delay_ms: u64) -> Self {
        Self { delay_ms }
    }

    /// Parse and validate a configuration. Missing fields take defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// A zero delay would commit on every write.
    pub fn validate(&self) -> Result<()> {
        if self.delay_ms == 0 {
            return Err(BridgeError::Config("delay_ms must be positive".into()));
        }
        Ok(())
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_one_second() {
        let config = DebounceConfig::default();
        assert_eq!(config.delay(), Duration::from_secs(1));
        assert_eq!(DebounceConfig::from_json("{}").unwrap(), config);
    }

    #[test]
    fn parses_delay() {
        let config = DebounceConfig::from_json(r#"{"delay_ms": 250}"#).unwrap();
        assert_eq!(config.delay(), Duration::from_millis(250));
    }

    #[test]
    fn rejects_zero_delay() {
        assert!(matches!(
            DebounceConfig::from_json(r#"{"delay_ms": 0}"#),
            Err(BridgeError::Config(_))
        ));
        assert!(DebounceConfig::new(0).validate().is_err());
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(matches!(
            DebounceConfig::from_json(r#"{"delay_ms": "soon"}"#),
            Err(BridgeError::Config(_))
        ));
    }
}
