//! Error taxonomy for the TAR/PAX codec.

use thiserror::Error;

/// Errors produced by [`crate::reader::TarReader`] and [`crate::writer::TarWriter`].
#[derive(Debug, Error)]
pub enum Error {
    #[error("unexpected end of archive")]
    UnexpectedEndOfArchive,

    #[error("invalid header: {0}")]
    InvalidHeader(String),

    #[error("invalid PAX record: {0}")]
    InvalidPax(String),

    #[error("PAX extended header too large: {0} bytes")]
    PaxTooLarge(u64),

    #[error("path too long for ustar/PAX representation: {0:?}")]
    PathTooLong(String),

    #[error("header serialization failed: {0}")]
    HeaderSerializationFailed(String),

    #[error("entry size mismatch: expected {expected}, wrote {actual}")]
    SizeMismatch { expected: u64, actual: u64 },

    #[error("operation invalid in current writer/reader state: {0}")]
    InvalidState(&'static str),

    #[error("write of zero bytes (destination closed?)")]
    WriteZeroBytes,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Rootfs(#[from] ocivisor_rootfs::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
