//! # Help Command
//!
//! Handles the `.help` command.
//! Displays the operator command reference.

pub fn handle_help() -> String {
    crate::strings::help::MAIN.to_string()
}
