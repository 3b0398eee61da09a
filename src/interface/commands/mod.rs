//! # Command Handlers
//!
//! Contains specific handler functions for each operator command (e.g., .unblock, .broadcast, .status).
//! These handlers are invoked by the Router and return the answer to post back.

pub mod broadcast;
pub mod conversation;
pub mod help;
pub mod status;
