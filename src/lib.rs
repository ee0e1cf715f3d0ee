//! ocivisor: host-side container registry store, host configuration, and
//! process utilities backing the thin `ocivisor` CLI.

pub mod config;
pub mod error;
pub mod process;
pub mod registry;

pub use error::{Error, Result};

/// Crate version, reported in logs and `--version`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
