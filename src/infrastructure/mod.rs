//! # Infrastructure Layer
//!
//! Handles interactions with external systems and services.
//! Implements the traits defined in the Domain layer (e.g., Transport, Responder, StateStore).

pub mod content;
pub mod llm;
pub mod matrix;
pub mod operator;
pub mod store;
