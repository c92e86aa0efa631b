//! The HAL wrapper (C2, spec §4.2): the single abstraction boundary between
//! this crate and the real wakeup/remote-access hardware, which is an
//! external collaborator out of scope for this implementation (spec §1).

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

mod error;
mod hal;
mod types;

/// In-memory test doubles for [`HalWrapper`].
pub mod testing;

pub use error::{HalError, HalResult};
pub use hal::{HalWrapper, RemoteTaskHandler};
pub use types::{ScheduleInfo, TaskType};
