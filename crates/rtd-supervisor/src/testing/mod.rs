//! In-memory test doubles for the supervisor's collaborators.

mod mock;

pub use mock::{MockPackageManager, MockServiceBinder};
