//! Connection error classification
//!
//! Used to pick a log level when a relay direction ends. The result never
//! changes what the relay does next.

use crate::error::Error;
use std::io::{self, ErrorKind};

/// What an error says about the connection it came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// The peer went away or the socket was torn down
    Closed,
    /// The connection may still be usable (timeouts)
    Open,
    /// Anything we cannot attribute to the connection
    Other,
}

/// Classify an I/O error
pub fn classify_io_error(err: &io::Error) -> ConnectionStatus {
    if matches!(err.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) {
        return ConnectionStatus::Open;
    }

    // Errors raised by the OS on a socket operation
    if err.raw_os_error().is_some() {
        return ConnectionStatus::Closed;
    }

    match err.kind() {
        ErrorKind::UnexpectedEof
        | ErrorKind::BrokenPipe
        | ErrorKind::ConnectionReset
        | ErrorKind::ConnectionAborted
        | ErrorKind::NotConnected => ConnectionStatus::Closed,
        _ => ConnectionStatus::Other,
    }
}

/// Classify a crate error
pub fn classify(err: &Error) -> ConnectionStatus {
    match err {
        Error::Eof | Error::IncompleteCommand { .. } => ConnectionStatus::Closed,
        Error::BackendTimeout(_) => ConnectionStatus::Open,
        _ => err
            .io_source()
            .map_or(ConnectionStatus::Other, classify_io_error),
    }
}

/// Check whether an error means the connection was closed
pub fn is_connection_closed(err: Option<&Error>) -> bool {
    err.is_some_and(|e| classify(e) == ConnectionStatus::Closed)
}
