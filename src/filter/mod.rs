//! Command filtering
//!
//! Decides which clamd commands may reach the backend. Only liveness,
//! version and INSTREAM scanning commands are forwarded; administrative
//! commands (RELOAD, SHUTDOWN), filesystem scans (SCAN, CONTSCAN,
//! MULTISCAN, ALLMATCHSCAN) and STATS are rejected.

mod allow_list;

pub use allow_list::{
    AllowList, DEFAULT_ALLOWED_COMMANDS, is_instream_command, strip_variant_prefix,
};
