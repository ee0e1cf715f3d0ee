//! Error taxonomy for the relay and vsock transport.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("relay I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("wait_completion() called twice")]
    DoubleWait,
}

pub type Result<T> = std::result::Result<T, Error>;
