//! Exit code definitions for clamd-filter
//!
//! Provides standardized exit codes for different error conditions.

use crate::error::Error;

/// Exit codes for the application
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitCode {
    /// Successful execution
    Success = 0,
    /// General/unspecified error
    GeneralError = 1,
    /// Configuration error (invalid config, missing required settings)
    ConfigError = 2,
    /// Socket error (cannot bind the listen address)
    SocketError = 3,
    /// Backend error (cannot reach the backend daemon)
    BackendError = 4,
}

impl ExitCode {
    /// Pick the exit code for a top-level error
    pub fn from_error(err: &anyhow::Error) -> Self {
        match err.downcast_ref::<Error>() {
            Some(e) => Self::from(e),
            None => ExitCode::GeneralError,
        }
    }
}

impl From<&Error> for ExitCode {
    fn from(err: &Error) -> Self {
        match err {
            Error::Config(_) | Error::TomlParse { .. } => ExitCode::ConfigError,
            Error::Socket(_) => ExitCode::SocketError,
            Error::BackendNotAvailable(_) | Error::BackendTimeout(_) => ExitCode::BackendError,
            _ => ExitCode::GeneralError,
        }
    }
}

impl From<ExitCode> for u8 {
    fn from(code: ExitCode) -> Self {
        code as u8
    }
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> Self {
        std::process::ExitCode::from(code as u8)
    }
}
