//! Tunables table (spec §6): timing and retry constants for the dispatcher,
//! supervisor, and power coordinator.
//!
//! Loaded from an embedded TOML default, overridable by a user-supplied TOML
//! file and then by `RTD_*` environment variables — the same
//! defaults-then-overlay shape as `astrid-config::loader::load`, simplified
//! to a single optional file layer since this crate has no system/user/
//! workspace split to manage.

use std::path::Path;

use tracing::{debug, info, warn};

use crate::error::{ConfigError, ConfigResult};

/// Embedded default tunables, compiled into the binary.
const DEFAULTS_TOML: &str = include_str!("defaults.toml");

/// Timing and retry tunables (spec §6).
#[derive(Debug, Clone, Copy, serde::Deserialize, serde::Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Tunables {
    /// Floor 30 000: minimum system uptime budget per wake window.
    pub allowed_system_uptime_ms: u64,
    /// Time a pending task may sit in the queue before it silently expires.
    pub max_task_pending_ms: u64,
    /// Time a newly-discovered client has to complete registration.
    pub allowed_time_for_client_init_ms: u64,
    /// Grace period after the last active task before a supervisor unbinds.
    pub task_unbind_delay_ms: u64,
    /// Margin before budget expiry at which shutdown warnings are sent.
    pub shutdown_warning_margin_ms: u64,
    /// Maximum retry attempts for `notify_ap_state_change`.
    pub notify_ap_state_max_retry: u32,
    /// Sleep between `notify_ap_state_change` retry attempts.
    pub notify_ap_state_retry_sleep_ms: u64,
    /// Base delay before the post-boot package search runs (plus jitter).
    pub package_search_delay_ms: u64,
}

impl Default for Tunables {
    fn default() -> Self {
        toml::from_str(DEFAULTS_TOML).expect("embedded defaults.toml is well-formed")
    }
}

impl Tunables {
    /// Load tunables: embedded defaults, overlaid by `override_path` (if
    /// given and present), overlaid by `RTD_*` environment variables,
    /// finally validated.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the override file is malformed or the
    /// resulting tunables fail validation (e.g. uptime below the 30s floor).
    pub fn load(override_path: Option<&Path>) -> ConfigResult<Self> {
        let mut value: toml::Value =
            toml::from_str(DEFAULTS_TOML).map_err(|e| ConfigError::TomlParseError {
                path: "<embedded defaults>".to_owned(),
                source: e,
            })?;

        if let Some(path) = override_path {
            match std::fs::read_to_string(path) {
                Ok(content) => {
                    let overlay: toml::Value =
                        toml::from_str(&content).map_err(|e| ConfigError::TomlParseError {
                            path: path.display().to_string(),
                            source: e,
                        })?;
                    merge_table(&mut value, overlay);
                    info!(path = %path.display(), "loaded tunables override");
                },
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    debug!(path = %path.display(), "tunables override not found, using defaults");
                },
                Err(e) => {
                    return Err(ConfigError::ReadError {
                        path: path.display().to_string(),
                        source: e,
                    });
                },
            }
        }

        apply_env_overrides(&mut value);

        let tunables: Self = value.try_into().map_err(|e: toml::de::Error| {
            ConfigError::TomlParseError {
                path: "<merged tunables>".to_owned(),
                source: e,
            }
        })?;

        tunables.validate()?;
        Ok(tunables)
    }

    /// Enforce the invariants spec §6/§8 call out explicitly: the uptime
    /// budget may never be configured below its 30 000 ms floor.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] if `allowed_system_uptime_ms`
    /// is below the floor.
    pub fn validate(&self) -> ConfigResult<()> {
        const UPTIME_FLOOR_MS: u64 = 30_000;
        if self.allowed_system_uptime_ms < UPTIME_FLOOR_MS {
            return Err(ConfigError::ValidationError {
                field: "allowed_system_uptime_ms".to_owned(),
                message: format!(
                    "{} ms is below the {UPTIME_FLOOR_MS} ms floor",
                    self.allowed_system_uptime_ms
                ),
            });
        }
        Ok(())
    }
}

/// Overlay every key of `overlay` onto `base`, replacing scalar leaves.
fn merge_table(base: &mut toml::Value, overlay: toml::Value) {
    if let (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) = (base, overlay) {
        for (key, value) in overlay_table {
            base_table.insert(key, value);
        }
    }
}

/// Apply `RTD_<FIELD_NAME_UPPERCASE>` environment variable overrides, e.g.
/// `RTD_MAX_TASK_PENDING_MS=90000`.
fn apply_env_overrides(value: &mut toml::Value) {
    let Some(table) = value.as_table_mut() else {
        return;
    };
    let keys: Vec<String> = table.keys().cloned().collect();
    for key in keys {
        let env_name = format!("RTD_{}", key.to_uppercase());
        let Ok(raw) = std::env::var(&env_name) else {
            continue;
        };
        let parsed: toml::Value = match table.get(&key) {
            Some(toml::Value::Integer(_)) => match raw.parse::<i64>() {
                Ok(n) => toml::Value::Integer(n),
                Err(_) => {
                    warn!(var = %env_name, value = %raw, "ignoring non-integer tunable override");
                    continue;
                },
            },
            _ => toml::Value::String(raw),
        };
        debug!(var = %env_name, "applied environment tunable override");
        table.insert(key, parsed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_values() {
        let t = Tunables::default();
        assert_eq!(t.allowed_system_uptime_ms, 30_000);
        assert_eq!(t.max_task_pending_ms, 60_000);
        assert_eq!(t.allowed_time_for_client_init_ms, 30_000);
        assert_eq!(t.task_unbind_delay_ms, 1_000);
        assert_eq!(t.shutdown_warning_margin_ms, 5_000);
        assert_eq!(t.notify_ap_state_max_retry, 10);
        assert_eq!(t.notify_ap_state_retry_sleep_ms, 100);
        assert_eq!(t.package_search_delay_ms, 1_000);
    }

    #[test]
    fn load_without_override_returns_defaults() {
        let t = Tunables::load(None).unwrap();
        assert_eq!(t, Tunables::default());
    }

    #[test]
    fn load_rejects_uptime_below_floor() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tunables.toml");
        std::fs::write(&path, "allowed_system_uptime_ms = 1000\n").unwrap();

        let err = Tunables::load(Some(&path)).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError { .. }));
    }

    #[test]
    fn override_file_replaces_single_field() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tunables.toml");
        std::fs::write(&path, "max_task_pending_ms = 90000\n").unwrap();

        let t = Tunables::load(Some(&path)).unwrap();
        assert_eq!(t.max_task_pending_ms, 90_000);
        assert_eq!(t.task_unbind_delay_ms, 1_000);
    }

    #[test]
    fn missing_override_file_falls_back_to_defaults() {
        let t = Tunables::load(Some(Path::new("/nonexistent/tunables.toml"))).unwrap();
        assert_eq!(t, Tunables::default());
    }
}
