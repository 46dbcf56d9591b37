//! Command-line interface.

mod commands;
mod output;
mod parser;

pub use commands::execute;
pub use output::{OutputFormat, format_error};
pub use parser::{Cli, Commands, SessionCommands};
