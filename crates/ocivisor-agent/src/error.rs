//! Error taxonomy for the guest container init.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Tar(#[from] ocivisor_tar::Error),

    #[error(transparent)]
    Rootfs(#[from] ocivisor_rootfs::Error),

    #[error(transparent)]
    Relay(#[from] ocivisor_relay::Error),

    #[error(transparent)]
    Protocol(#[from] ocivisor_protocol::DecodeError),

    #[error("container spec carries no process to execute")]
    NoProcess,

    #[error("pivot_root failed: {0}")]
    PivotRoot(std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
