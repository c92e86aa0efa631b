//! Remote Task Dispatch Core - foundation types and traits.
//!
//! This crate provides the identifiers, task record, error kinds, and retry
//! primitive shared by every component of the dispatch core: the persistent
//! identity store, the HAL wrapper, the client registry, the pending task
//! queue, the client service supervisors, and the power/lifecycle
//! coordinator.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod error;
pub mod ids;
pub mod retry;
pub mod task;

pub use error::{CoreError, CoreResult};
pub use ids::{ClientId, TaskId, UidName};
pub use retry::{RetryOutcome, retry};
pub use task::{Task, TaskState};
