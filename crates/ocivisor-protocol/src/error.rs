//! Error taxonomy for decoding the length-prefixed wire envelope.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("declared envelope length {len} exceeds the {max}-byte cap")]
    TooLarge { len: usize, max: usize },

    #[error("envelope I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed JSON payload: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, DecodeError>;
