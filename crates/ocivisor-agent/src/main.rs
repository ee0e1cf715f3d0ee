//! ocivisor-agent: the in-guest container init.
//!
//! Binds the control vsock listener, accepts length-prefixed
//! `AgentRequest` envelopes, and dispatches each `RunContainer` request by
//! extracting its layers, running the mount sequence, pivoting into the
//! rootfs, applying capabilities, and `execve`-ing the contained process
//! with stdio relayed over a second, per-container vsock connection.

mod container;
mod error;
mod paths;
mod pty;
mod vsock;

use error::Result;
use ocivisor_oci::RuntimeSpec;
use ocivisor_protocol::{ports, read_envelope, write_envelope, AgentRequest, AgentResponse, PROTOCOL_VERSION};
use ocivisor_relay::Relay;
use std::path::PathBuf;
use tracing::{error, info, warn};
use vsock::{VsockListener, VsockStream};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("ocivisor_agent=debug".parse().unwrap()),
        )
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "starting ocivisor-agent");

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("failed to start tokio runtime: {e}");
            std::process::exit(1);
        }
    };
    let handle = runtime.handle().clone();

    if let Err(e) = serve(handle) {
        error!(error = %e, "agent exited with error");
        std::process::exit(1);
    }
}

/// Accept control connections, one detached OS thread per connection.
fn serve(handle: tokio::runtime::Handle) -> Result<()> {
    let listener = VsockListener::bind(ports::AGENT_CONTROL)?;
    info!(port = ports::AGENT_CONTROL, "agent control listener bound");

    loop {
        let stream = listener.accept()?;
        let handle = handle.clone();
        std::thread::spawn(move || {
            if let Err(e) = handle_connection(stream, &handle) {
                warn!(error = %e, "control connection ended with error");
            }
        });
    }
}

fn handle_connection(mut stream: VsockStream, handle: &tokio::runtime::Handle) -> Result<()> {
    loop {
        let request: Option<AgentRequest> = read_envelope(&mut stream)?;
        let request = match request {
            Some(request) => request,
            None => return Ok(()),
        };

        match request {
            AgentRequest::Ping => {
                write_envelope(&mut stream, &AgentResponse::Pong { version: PROTOCOL_VERSION })?;
            }
            AgentRequest::Shutdown => {
                write_envelope(&mut stream, &AgentResponse::Accepted)?;
                info!("shutdown requested");
                std::process::exit(0);
            }
            AgentRequest::RunContainer { spec, rootfs, layers, stdio_slot } => {
                if let Err(e) = run_container(&mut stream, handle, &spec, &rootfs, &layers, stdio_slot) {
                    warn!(error = %e, "container launch failed");
                    let _ = write_envelope(
                        &mut stream,
                        &AgentResponse::Error { message: e.to_string(), code: None },
                    );
                }
            }
        }
    }
}

/// Launch the container, bridge its stdio to the per-slot vsock
/// connection, and report the exit code once the process terminates.
fn run_container(
    stream: &mut VsockStream,
    handle: &tokio::runtime::Handle,
    spec: &RuntimeSpec,
    rootfs: &PathBuf,
    layers: &[PathBuf],
    stdio_slot: u32,
) -> Result<()> {
    write_envelope(stream, &AgentResponse::Accepted)?;

    let launched = container::launch(spec, rootfs, layers)?;
    let mut child = launched.child;

    let stdio_port = ports::AGENT_STDIO_BASE + stdio_slot;
    let stdio_listener = VsockListener::bind(stdio_port)?;
    info!(port = stdio_port, "stdio listener bound, awaiting relay peer");
    let stdio_stream = stdio_listener.accept()?;

    let io_fd = launched.io_fd;
    let relay = handle.block_on(async move { Relay::new(io_fd, stdio_stream.into_owned_fd()) })?;

    let status = child.wait()?;
    handle.block_on(relay.wait_completion())?;

    let code = status.code().unwrap_or(-1);
    record_exit(rootfs, code)?;
    write_envelope(stream, &AgentResponse::Exited { code })?;
    Ok(())
}

fn record_exit(rootfs: &std::path::Path, code: i32) -> Result<()> {
    let container_id = rootfs
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "unknown".to_string());
    std::fs::create_dir_all(paths::CONTAINERS_EXIT_DIR)?;
    std::fs::write(paths::container_exit_path(&container_id), code.to_string())?;
    Ok(())
}
