//! Internal broadcast event bus carrying [`DispatchEvent`]s, used for
//! observability and test assertions rather than for delivering client
//! callbacks (which go through a client's stored callback handle directly).

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

mod bus;
mod event;

pub use bus::{EventBus, EventReceiver};
pub use event::DispatchEvent;
