//! Error taxonomy for the OCI data model and registry client.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("registry request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("registry returned unexpected status {status} for {url}")]
    UnexpectedStatus { status: u16, url: String },

    #[error("failed to decode registry response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid image reference: {0}")]
    InvalidReference(String),
}

pub type Result<T> = std::result::Result<T, Error>;
