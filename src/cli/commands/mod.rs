//! Command implementations for clamd-filter CLI

pub mod completion;
pub mod config;
pub mod run;
pub mod version;
