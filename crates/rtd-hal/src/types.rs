//! Wire types exchanged with the HAL (spec §4.2, §4.9).

use rtd_core::ClientId;
use serde::{Deserialize, Serialize};

/// The kind of scheduled task a serverless client may request (spec §4.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskType {
    /// An opaque client-defined task.
    Custom,
    /// A request to enter Garage Mode at the scheduled time.
    EnterGarageMode,
}

impl TaskType {
    /// Map an HAL-reported task type string to a known [`TaskType`],
    /// defaulting unknown values to `Custom` with a warning (spec §4.9:
    /// "`list_scheduled` maps unknown HAL task types to CUSTOM with a
    /// warning").
    #[must_use]
    pub fn from_hal_str(raw: &str) -> Self {
        match raw {
            "ENTER_GARAGE_MODE" => Self::EnterGarageMode,
            "CUSTOM" => Self::Custom,
            other => {
                tracing::warn!(task_type = %other, "unknown HAL task type, mapping to CUSTOM");
                Self::Custom
            },
        }
    }
}

/// A single scheduled-task entry, forwarded to or read back from the HAL
/// (spec §4.9 `schedule`/`list_scheduled`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleInfo {
    /// The serverless client this schedule entry belongs to.
    pub client_id: ClientId,
    /// Caller-chosen identifier for this schedule entry.
    pub schedule_id: String,
    /// Number of times this schedule should fire (0 == unbounded/periodic only).
    pub count: i64,
    /// Epoch seconds of the first (or only) firing.
    pub start_time_epoch_s: i64,
    /// Repeat interval in seconds; 0 means non-repeating.
    pub periodic_s: i64,
    /// The HAL task type to invoke.
    pub task_type: TaskType,
}
