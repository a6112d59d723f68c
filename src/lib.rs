//! clamd-filter - filtering proxy for the clamd protocol
//!
//! This library provides a TCP proxy that sits between clamd clients and a
//! backend clamd daemon. Only an allow-list of commands reaches the backend;
//! everything else is answered with a rejection. INSTREAM uploads are relayed
//! chunk by chunk without inspection.

pub mod cli;
pub mod config;
pub mod error;
pub mod filter;
pub mod logging;
pub mod pool;
pub mod protocol;
pub mod relay;

pub use error::{Error, Result};

/// Package version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Package name
pub const NAME: &str = env!("CARGO_PKG_NAME");
