//! clamd wire protocol
//!
//! clamd accepts commands terminated by a single NUL byte (`z` prefixed
//! variant) or a single newline (`n` prefixed or bare variant). The INSTREAM
//! command is followed by a stream of length-prefixed chunks, ended by a
//! zero-length chunk.
//!
//! See clamd(8) for the full command set.

pub mod chunk;
pub mod command;

pub use chunk::{StreamStats, relay_chunks};
pub use command::read_command;

use bytes::Bytes;
use std::borrow::Cow;

/// NUL command terminator
pub const NULL_DELIMITER: u8 = 0x00;

/// Newline command terminator
pub const NEWLINE_DELIMITER: u8 = b'\n';

/// Response sent to the client for every command outside the allow-list
pub const REJECTION_RESPONSE: &[u8] = b"ERROR: Command not allowed\n";

/// Byte that terminated a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delimiter {
    /// `\0`
    Null,
    /// `\n`
    Newline,
}

impl Delimiter {
    /// Map a byte to a delimiter, if it is one
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            NULL_DELIMITER => Some(Delimiter::Null),
            NEWLINE_DELIMITER => Some(Delimiter::Newline),
            _ => None,
        }
    }

    /// The wire byte of this delimiter
    pub fn as_byte(self) -> u8 {
        match self {
            Delimiter::Null => NULL_DELIMITER,
            Delimiter::Newline => NEWLINE_DELIMITER,
        }
    }
}

/// A single client command as read from the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Raw command bytes, without the delimiter
    pub name: Bytes,
    /// Delimiter that terminated the command
    pub delimiter: Delimiter,
}

impl Command {
    pub fn new(name: impl Into<Bytes>, delimiter: Delimiter) -> Self {
        Self {
            name: name.into(),
            delimiter,
        }
    }

    /// Command name as text, for classification and logging
    ///
    /// Invalid UTF-8 is replaced, so such names never match the allow-list.
    pub fn name_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.name)
    }

    /// Re-serialize the command exactly as it arrived
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.name.len() + 1);
        buf.extend_from_slice(&self.name);
        buf.push(self.delimiter.as_byte());
        buf
    }
}
