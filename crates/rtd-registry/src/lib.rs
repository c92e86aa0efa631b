//! The serverless registry (C3) and client registry (C4).

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

mod client;
mod error;
mod permission;
mod serverless;

pub use client::{ClientCallback, ClientRegistry, ClientSnapshot, RegistrationInfo};
pub use error::{RegistryError, RegistryResult};
pub use permission::{load_or_disable as load_permissions_or_disable, PermissionChecker, PermissionRegistry};
pub use serverless::{load_or_disable, ServerlessRegistry};
