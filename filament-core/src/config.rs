//! Engine Configuration
//!
//! All knobs have defaults, so an empty JSON object is a valid configuration.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Delimiters that mark interpolation markup inside attribute values and text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Delimiters {
    pub open: String,
    pub close: String,
}

impl Default for Delimiters {
    fn default() -> Self {
        Self {
            open: "{{".to_string(),
            close: "}}".to_string(),
        }
    }
}

/// Engine-wide configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Interpolation delimiters.
    pub interpolation: Delimiters,

    /// Attribute that declares the control hosted by an element, overriding
    /// tag-name registration.
    pub control_attribute: String,

    /// Attribute that selects a child context relative to the declaring scope.
    pub context_attribute: String,

    /// Attribute that redirects a control's context to a named observable
    /// resource somewhere in the ancestor chain.
    pub context_source_attribute: String,

    /// Key under which every context owner stores its context.
    pub context_key: String,

    /// Strip accessors from the observed graph when an owner is disposed.
    pub reset_on_dispose: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            interpolation: Delimiters::default(),
            control_attribute: "control".to_string(),
            context_attribute: "context".to_string(),
            context_source_attribute: "context-source".to_string(),
            context_key: "context".to_string(),
            reset_on_dispose: true,
        }
    }
}

impl Config {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.interpolation.open.is_empty() || self.interpolation.close.is_empty() {
            return Err(ConfigError::EmptyDelimiter);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_json_yields_defaults() {
        let config = Config::from_json("{}").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.interpolation.open, "{{");
        assert!(config.reset_on_dispose);
    }

    #[test]
    fn partial_override() {
        let config =
            Config::from_json(r#"{"interpolation": {"open": "[["}, "context_key": "data"}"#)
                .unwrap();
        assert_eq!(config.interpolation.open, "[[");
        assert_eq!(config.interpolation.close, "}}");
        assert_eq!(config.context_key, "data");
    }

    #[test]
    fn empty_delimiter_is_rejected() {
        let err = Config::from_json(r#"{"interpolation": {"close": ""}}"#).unwrap_err();
        assert!(matches!(err, ConfigError::EmptyDelimiter));
    }
}
