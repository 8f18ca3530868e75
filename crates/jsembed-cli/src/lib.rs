//! Library half of the `jsembed` command-line tool
//!
//! The binary only parses arguments and installs logging. Commands live
//! here so integration tests can drive them without spawning a process.

pub mod commands;
pub mod output;
