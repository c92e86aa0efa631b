//! The pending task queue (C5) and client service supervisor (C6).

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

mod binder;
mod error;
mod package;
mod queue;
mod supervisor;

/// In-memory test doubles for [`binder::ServiceBinder`] and
/// [`package::PackageManager`].
pub mod testing;

pub use binder::ServiceBinder;
pub use error::{SupervisorError, SupervisorResult};
pub use package::{PackageManager, PackageRemovalHandler};
pub use queue::PendingTaskQueue;
pub use supervisor::{BindState, ConnectionSnapshot, Supervisor};
