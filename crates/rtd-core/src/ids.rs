//! Opaque identifiers: `UidName`, `ClientId`, `TaskId`.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use rand::Rng;
use rand::distributions::Alphanumeric;
use serde::{Deserialize, Serialize};

/// The OS-assigned stable principal of a calling package.
///
/// Identity is keyed internally by `UidName`; the `UidName -> ClientId` map
/// is bijective (spec §3 invariant 3).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UidName(String);

impl UidName {
    /// Wrap a raw principal string.
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Borrow the underlying string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UidName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for UidName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// An opaque client identity, short enough to pass over the client RPC
/// surface verbatim.
///
/// Regular clients get one generated on first registration (prefix +
/// monotonic counter + random suffix, spec §3); serverless clients get one
/// assigned by the static config and never persist it (spec §3, §4.3).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClientId(String);

/// Process-lifetime monotonic counter backing [`ClientId::generate`].
static CLIENT_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Length of the random alphanumeric suffix appended to generated client ids.
const RANDOM_SUFFIX_LEN: usize = 12;

impl ClientId {
    /// Wrap an existing client id string (e.g. one read from the serverless
    /// config, or restored from the identity store).
    #[must_use]
    pub fn from_existing(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Generate a new client id for a regular (non-serverless) client.
    ///
    /// Format: `{prefix}-{counter}-{12 random alphanumeric chars}`. The
    /// counter is process-lifetime monotonic; uniqueness across restarts
    /// relies on the random suffix, not the counter.
    #[must_use]
    pub fn generate(prefix: &str) -> Self {
        let counter = CLIENT_ID_COUNTER.fetch_add(1, Ordering::Relaxed);
        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(RANDOM_SUFFIX_LEN)
            .map(char::from)
            .collect();
        Self(format!("{prefix}-{counter}-{suffix}"))
    }

    /// Borrow the underlying string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ClientId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// An opaque task identifier, unique for the lifetime of the task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(String);

impl TaskId {
    /// Generate a new, unique task id.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Wrap an existing task id string (used in tests and when replaying a
    /// HAL-provided id).
    #[must_use]
    pub fn from_existing(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Borrow the underlying string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
