//! # Interface Layer
//!
//! Operator-facing command handlers. Invoked by the application router.

pub mod commands;
