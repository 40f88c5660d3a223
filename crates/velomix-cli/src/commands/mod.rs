// Module exports for CLI subcommands.
//
// main.rs parses arguments and dispatches to these handlers.

pub mod generate;
pub mod import;
pub mod maintenance;
