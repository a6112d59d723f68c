//! Allow-list evaluation for clamd commands

use std::collections::HashSet;

/// Commands forwarded by default, without protocol variant prefix
pub const DEFAULT_ALLOWED_COMMANDS: &[&str] = &["PING", "VERSION", "VERSIONCOMMANDS", "INSTREAM"];

/// Immutable set of bare command names permitted to reach the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowList {
    commands: HashSet<String>,
}

impl AllowList {
    /// Create an allow-list from bare command names
    pub fn new<I, S>(commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            commands: commands.into_iter().map(Into::into).collect(),
        }
    }

    /// Check whether a command line may be forwarded
    ///
    /// Only the first whitespace-separated token is evaluated, after removing
    /// a single `z` or `n` variant prefix. Arguments never change the
    /// decision, and an empty command is never allowed.
    pub fn is_command_allowed(&self, command: &str) -> bool {
        let Some(token) = command.split_whitespace().next() else {
            return false;
        };
        self.commands.contains(strip_variant_prefix(token))
    }

    /// Number of allowed commands
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Allowed command names, sorted for display
    pub fn commands(&self) -> Vec<&str> {
        let mut commands: Vec<&str> = self.commands.iter().map(String::as_str).collect();
        commands.sort_unstable();
        commands
    }
}

impl Default for AllowList {
    fn default() -> Self {
        Self::new(DEFAULT_ALLOWED_COMMANDS.iter().copied())
    }
}

/// Remove one leading `z` (NUL-terminated) or `n` (newline-terminated) variant prefix
pub fn strip_variant_prefix(token: &str) -> &str {
    token
        .strip_prefix('z')
        .or_else(|| token.strip_prefix('n'))
        .unwrap_or(token)
}

/// Check whether a command starts an INSTREAM chunk stream
///
/// Only the prefixed spellings are recognized. A bare `INSTREAM` is
/// allowed but forwarded as a plain command.
pub fn is_instream_command(command: &str) -> bool {
    matches!(command, "zINSTREAM" | "nINSTREAM")
}
