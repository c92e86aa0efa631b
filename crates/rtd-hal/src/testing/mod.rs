//! Test doubles for [`crate::HalWrapper`].

mod mock;

pub use mock::MockHal;
