//! velomix CLI library.
//!
//! Logging setup, terminal styling, and output formatting shared by the
//! `velomix` binary's subcommands.

pub mod logging;
pub mod output;
pub mod terminal;
