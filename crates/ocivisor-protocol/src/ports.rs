//! Well-known vsock ports for the host-guest control channel.

/// The guest agent's control connection: `RunContainer`, `Ping`, `Shutdown`.
pub const AGENT_CONTROL: u32 = 6000;

/// Base port for a per-container stdio relay connection. The actual port
/// used for a given container is `AGENT_STDIO_BASE + slot`, where `slot` is
/// assigned by the host when it issues `RunContainer`.
pub const AGENT_STDIO_BASE: u32 = 6100;
