//! Event-driven bidirectional byte relay and vsock endpoint lifetime holder
//! used to bridge container stdio between host and guest.

mod error;
mod relay;
mod vsock;

pub use error::{Error, Result};
pub use relay::Relay;
pub use vsock::VsockTransport;
