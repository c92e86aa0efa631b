//! Parsing for the static serverless-client config document (spec §6):
//!
//! ```yaml
//! map:
//!   - package: com.example.app
//!     client_id: cid-opaque-string
//! ```
//!
//! Both fields are required; duplicate `package` or `client_id` values are a
//! fatal parse error (spec §4.3) — the caller (`rtd-registry::serverless`) is
//! expected to treat a parse failure as "serverless behavior disabled for
//! this session", not abort startup.

use serde::Deserialize;

use crate::error::{ConfigError, ConfigResult};

/// One `package -> client_id` mapping from the serverless config document.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ServerlessEntry {
    /// The installed package name this entry grants serverless access to.
    pub package: String,
    /// The client id the package is identified by (never persisted, spec §3).
    pub client_id: String,
}

#[derive(Debug, Deserialize)]
struct RawDocument {
    map: Vec<ServerlessEntry>,
}

/// The validated, duplicate-free serverless config document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerlessConfig {
    /// Every declared package/client_id pair, in document order.
    pub entries: Vec<ServerlessEntry>,
}

impl ServerlessConfig {
    /// Parse and validate a serverless config document from its YAML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::YamlParseError`] if the document is malformed,
    /// or [`ConfigError::DuplicatePackage`] / [`ConfigError::DuplicateClientId`]
    /// if an entry repeats a package name or client id already seen.
    pub fn parse_yaml(source: &str) -> ConfigResult<Self> {
        let raw: RawDocument = serde_yaml::from_str(source).map_err(|e| ConfigError::YamlParseError {
            path: "<serverless config>".to_owned(),
            source: e,
        })?;

        let mut seen_packages = std::collections::HashSet::new();
        let mut seen_client_ids = std::collections::HashSet::new();
        for entry in &raw.map {
            if !seen_packages.insert(entry.package.clone()) {
                return Err(ConfigError::DuplicatePackage(entry.package.clone()));
            }
            if !seen_client_ids.insert(entry.client_id.clone()) {
                return Err(ConfigError::DuplicateClientId(entry.client_id.clone()));
            }
        }

        Ok(Self { entries: raw.map })
    }
}
