//! Model configuration - id generation and cascade limits
//!
//! Every [`Model`](crate::Model) owns one `ModelConfig`. There is no
//! process-wide state: two models can use different id prefixes and
//! resolution limits side by side.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Configuration for a [`Model`](crate::Model)
///
/// # Example
///
/// ```
/// use ripple_core::ModelConfig;
///
/// let mut config = ModelConfig::default();
/// assert_eq!(config.new_id_prefix(), "c");
/// assert_eq!(config.max_resolution_passes(), 100);
///
/// config.set_new_id_prefix("tmp").unwrap();
/// assert!(config.is_new_id("+tmp3"));
/// assert!(config.set_new_id_prefix("").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Prefix of client-generated ids, without the leading `+`
    new_id_prefix: String,
    /// Maximum number of change generations resolved when a root scope exits
    ///
    /// This is an approximate safety bound for runaway cascades, not a
    /// precise cycle count: each generation may run many rules.
    max_resolution_passes: usize,
}

impl ModelConfig {
    /// Default prefix of client-generated ids
    pub const DEFAULT_NEW_ID_PREFIX: &'static str = "c";

    /// Default resolution ceiling
    pub const DEFAULT_MAX_RESOLUTION_PASSES: usize = 100;

    /// Create the default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate a configuration from RON
    ///
    /// Missing fields fall back to their defaults.
    ///
    /// ```
    /// use ripple_core::ModelConfig;
    ///
    /// let config = ModelConfig::from_ron("(max_resolution_passes: 8)").unwrap();
    /// assert_eq!(config.max_resolution_passes(), 8);
    /// assert_eq!(config.new_id_prefix(), "c");
    /// ```
    pub fn from_ron(content: &str) -> Result<Self> {
        let config: Self =
            ron::from_str(content).map_err(|e| Error::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Builder-style variant of [`set_max_resolution_passes`](Self::set_max_resolution_passes)
    pub fn with_max_resolution_passes(mut self, passes: usize) -> Result<Self> {
        self.set_max_resolution_passes(passes)?;
        Ok(self)
    }

    /// Get the prefix of client-generated ids (without the leading `+`)
    pub fn new_id_prefix(&self) -> &str {
        &self.new_id_prefix
    }

    /// Set the prefix of client-generated ids
    ///
    /// Fails with [`Error::InvalidConfig`] for an empty prefix.
    pub fn set_new_id_prefix(&mut self, prefix: impl Into<String>) -> Result<()> {
        let prefix = prefix.into();
        if prefix.is_empty() {
            return Err(Error::InvalidConfig(
                "new id prefix cannot be an empty string".to_string(),
            ));
        }
        self.new_id_prefix = prefix;
        Ok(())
    }

    /// Get the resolution ceiling
    pub fn max_resolution_passes(&self) -> usize {
        self.max_resolution_passes
    }

    /// Set the resolution ceiling (must be at least 1)
    pub fn set_max_resolution_passes(&mut self, passes: usize) -> Result<()> {
        if passes == 0 {
            return Err(Error::InvalidConfig(
                "max resolution passes must be at least 1".to_string(),
            ));
        }
        self.max_resolution_passes = passes;
        Ok(())
    }

    /// Check whether an id was generated on the client with this prefix
    pub fn is_new_id(&self, id: &str) -> bool {
        id.strip_prefix('+')
            .is_some_and(|rest| rest.starts_with(self.new_id_prefix.as_str()))
    }

    /// Counter value encoded in a client-generated id, if it has one
    pub(crate) fn parse_new_id(&self, id: &str) -> Option<u64> {
        id.strip_prefix('+')?
            .strip_prefix(self.new_id_prefix.as_str())?
            .parse()
            .ok()
    }

    /// Format a client-generated id from a counter value
    pub(crate) fn format_new_id(&self, counter: u64) -> String {
        format!("+{}{}", self.new_id_prefix, counter)
    }

    /// Check every field, as done after deserialization
    pub fn validate(&self) -> Result<()> {
        if self.new_id_prefix.is_empty() {
            return Err(Error::InvalidConfig(
                "new id prefix cannot be an empty string".to_string(),
            ));
        }
        if self.max_resolution_passes == 0 {
            return Err(Error::InvalidConfig(
                "max resolution passes must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            new_id_prefix: Self::DEFAULT_NEW_ID_PREFIX.to_string(),
            max_resolution_passes: Self::DEFAULT_MAX_RESOLUTION_PASSES,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ModelConfig::default();
        assert_eq!(config.new_id_prefix(), "c");
        assert_eq!(config.max_resolution_passes(), 100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_format_new_id() {
        let config = ModelConfig::default();
        assert_eq!(config.format_new_id(0), "+c0");
        assert!(config.is_new_id("+c0"));
        assert!(!config.is_new_id("c0"));
        assert!(!config.is_new_id("+x0"));
        assert_eq!(config.parse_new_id("+c12"), Some(12));
        assert_eq!(config.parse_new_id("+cx"), None);
        assert_eq!(config.parse_new_id("c12"), None);
    }

    #[test]
    fn test_empty_prefix_rejected() {
        let mut config = ModelConfig::default();
        let err = config.set_new_id_prefix("").unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
        assert_eq!(config.new_id_prefix(), "c", "prefix must be unchanged");
    }

    #[test]
    fn test_zero_passes_rejected() {
        assert!(ModelConfig::default().with_max_resolution_passes(0).is_err());
        assert!(ModelConfig::from_ron("(max_resolution_passes: 0)").is_err());
    }

    #[test]
    fn test_ron_round_trip() {
        let mut config = ModelConfig::default();
        config.set_new_id_prefix("local").unwrap();
        config.set_max_resolution_passes(12).unwrap();

        let serialized = ron::to_string(&config).expect("serialize");
        let parsed = ModelConfig::from_ron(&serialized).expect("parse");
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_ron_rejects_empty_prefix() {
        let err = ModelConfig::from_ron("(new_id_prefix: \"\")").unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }
}
