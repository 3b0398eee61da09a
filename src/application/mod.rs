//! # Application Layer
//!
//! Contains the core orchestration logic of the bot: connection supervision,
//! inbound aggregation, handoff gating, repetition throttling, delivery retries
//! and broadcast scheduling.

pub mod aggregator;
pub mod broadcast;
pub mod handle;
pub mod handoff;
pub mod orchestrator;
pub mod pipeline;
pub mod retry;
pub mod router;
pub mod state;
pub mod supervisor;
pub mod throttle;
pub mod timer;

#[cfg(test)]
pub mod testing;
