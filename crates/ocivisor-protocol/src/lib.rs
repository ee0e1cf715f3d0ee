//! Wire types and framing for the host↔guest control channel.

mod envelope;
mod error;
mod messages;
pub mod ports;

pub use envelope::{read_envelope, write_envelope, MAX_ENVELOPE_BYTES};
pub use error::{DecodeError, Result};
pub use messages::{AgentRequest, AgentResponse, PROTOCOL_VERSION};
