//! Errors surfaced by the host config, the container registry store, and
//! the process utilities they sit on top of.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("failed to load config: {0}")]
    ConfigLoad(String),

    #[error("failed to save config: {0}")]
    ConfigSave(String),

    #[error("failed to load container registry: {0}")]
    RegistryLoad(String),

    #[error("failed to save container registry: {0}")]
    RegistrySave(String),

    #[error("{0}")]
    ProcessTimeout(String),
}

impl Error {
    /// Build a [`Error::ProcessTimeout`] from a formatted message.
    pub fn process_timeout(msg: impl Into<String>) -> Self {
        Error::ProcessTimeout(msg.into())
    }
}
