//! Secure path resolution, mount sequencing and Linux capabilities for the
//! in-guest container init.

pub mod capabilities;
mod error;
pub mod mount;
pub mod path_secure;

pub use error::{Error, Result};
