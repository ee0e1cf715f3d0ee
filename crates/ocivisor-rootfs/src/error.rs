//! Error taxonomy for secure path resolution, mounting and capabilities.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("path resolves outside the root: {0:?}")]
    InvalidRelativePath(String),

    #[error("missing intermediate directory in {0:?} and make_intermediates is false")]
    MissingIntermediate(String),

    #[error("refused to operate on {0:?}")]
    RefusedName(String),

    #[error("mount option data exceeds one page ({len} bytes)")]
    MountDataTooLarge { len: usize },

    #[error("kernel operation {op} failed: errno {errno}")]
    Kernel { op: &'static str, errno: i32 },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn kernel(op: &'static str, errno: i32) -> Self {
        Error::Kernel { op, errno }
    }
}
