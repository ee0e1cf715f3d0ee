//! `AgentRequest`/`AgentResponse`: the messages exchanged over the
//! length-prefixed envelope on the agent control connection.

use ocivisor_oci::RuntimeSpec;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const PROTOCOL_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AgentRequest {
    /// Liveness check; answered with `AgentResponse::Pong`.
    Ping,

    /// Extract any pending layers under `rootfs`, perform the mount
    /// sequence for every entry in `spec.mounts`, pivot into `rootfs`, apply
    /// capabilities, and execute the contained process. Stdio is bridged
    /// separately over a vsock connection on `AGENT_STDIO_BASE + stdio_slot`.
    RunContainer {
        spec: RuntimeSpec,
        rootfs: PathBuf,
        /// TAR layer archives to extract under `rootfs` (lowest first) before
        /// the mount sequence runs.
        #[serde(default)]
        layers: Vec<PathBuf>,
        stdio_slot: u32,
    },

    /// Ask the agent to terminate after acknowledging.
    Shutdown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AgentResponse {
    Pong {
        version: u32,
    },

    /// Accepted; the container is running. The final exit status arrives
    /// later as `Exited` once the contained process terminates.
    Accepted,

    Exited {
        code: i32,
    },

    Ok {
        #[serde(skip_serializing_if = "Option::is_none")]
        data: Option<serde_json::Value>,
    },

    Error {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_container_request_round_trips_through_json() {
        let spec = RuntimeSpec::new(vec!["/bin/sh".to_string()], vec![], "/", false);
        let req = AgentRequest::RunContainer {
            spec,
            rootfs: PathBuf::from("/var/lib/ocivisor/rootfs/1"),
            layers: vec![PathBuf::from("/var/lib/ocivisor/layers/a.tar")],
            stdio_slot: 0,
        };
        let json = serde_json::to_string(&req).unwrap();
        let back: AgentRequest = serde_json::from_str(&json).unwrap();
        match back {
            AgentRequest::RunContainer { stdio_slot, .. } => assert_eq!(stdio_slot, 0),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn error_response_omits_absent_code_field() {
        let resp = AgentResponse::Error {
            message: "boom".to_string(),
            code: None,
        };
        let json = serde_json::to_string(&resp).unwrap();
        assert!(!json.contains("code"));
    }
}
