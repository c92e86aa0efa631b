//! Configuration: the timing/retry [`Tunables`] table and the
//! [`ServerlessConfig`] document (spec §6).
//!
//! This crate owns parsing and validation only; turning a `ServerlessConfig`
//! into a live lookup structure is `rtd-registry::serverless`'s job.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

mod error;
mod permission;
mod serverless;
mod tunables;

pub use error::{ConfigError, ConfigResult};
pub use permission::PrivilegedConfig;
pub use serverless::{ServerlessConfig, ServerlessEntry};
pub use tunables::Tunables;
