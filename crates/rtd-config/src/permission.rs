//! Parsing for the static privileged-caller config document (spec §6:
//! "control permission required" for `set_post_task_power_state`,
//! "privileged" for `add_serverless_remote_task_client` /
//! `remove_serverless_remote_task_client`):
//!
//! ```yaml
//! callers:
//!   - com.example.fleetmanager
//! ```
//!
//! Unlike the serverless config document, a parse failure here is fatal to
//! load (it is simpler and has no "disabled for the session" fallback
//! semantics to preserve) — the caller decides how to degrade.

use serde::Deserialize;

use crate::error::{ConfigError, ConfigResult};

#[derive(Debug, Deserialize)]
struct RawDocument {
    #[serde(default)]
    callers: Vec<String>,
}

/// The validated set of `UidName`s granted the control/privileged
/// permission.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrivilegedConfig {
    /// Every declared privileged caller, in document order.
    pub callers: Vec<String>,
}

impl PrivilegedConfig {
    /// Parse a privileged-caller config document from its YAML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::YamlParseError`] if the document is malformed.
    pub fn parse_yaml(source: &str) -> ConfigResult<Self> {
        let raw: RawDocument = serde_yaml::from_str(source).map_err(|e| ConfigError::YamlParseError {
            path: "<privileged callers config>".to_owned(),
            source: e,
        })?;
        Ok(Self { callers: raw.callers })
    }

    /// An empty document: no caller holds the privileged permission.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_document() {
        let config = PrivilegedConfig::parse_yaml("callers:\n  - com.example.a\n  - com.example.b\n").unwrap();
        assert_eq!(config.callers, vec!["com.example.a", "com.example.b"]);
    }

    #[test]
    fn missing_callers_key_is_an_empty_list() {
        let config = PrivilegedConfig::parse_yaml("{}\n").unwrap();
        assert!(config.callers.is_empty());
    }

    #[test]
    fn malformed_document_is_an_error() {
        assert!(PrivilegedConfig::parse_yaml("not: [valid").is_err());
    }
}
