//! # Handoff State Machine
//!
//! Per-peer mode deciding whether a turn reaches automated processing.
//!
//! `AiActive` is the initial mode. The return-to-assistant phrase is checked first,
//! in any mode. A request for a human (or the operator acting in the room) moves
//! any mode to `HumanActive`, which lapses lazily after a period without inbound
//! messages. Opt-out phrases and repetition escalation move `AiActive` to `Blocked`.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use regex::Regex;

use crate::domain::config::PhrasesConfig;
use crate::domain::types::{BlockReason, ConversationMode, ConversationState};

/// A set of phrases matched against a whole message, ignoring case,
/// surrounding whitespace and trailing punctuation.
#[derive(Debug, Clone)]
pub struct PhraseSet {
    pattern: Option<Regex>,
}

impl PhraseSet {
    pub fn new(phrases: &[String]) -> Result<Self> {
        let alternatives: Vec<String> = phrases
            .iter()
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .map(|p| {
                p.split_whitespace()
                    .map(regex::escape)
                    .collect::<Vec<_>>()
                    .join(r"\s+")
            })
            .collect();
        if alternatives.is_empty() {
            return Ok(Self { pattern: None });
        }
        let source = format!(r"(?i)^\s*(?:{})\s*[.!?]*\s*$", alternatives.join("|"));
        let pattern = Regex::new(&source).with_context(|| format!("Invalid phrase set: {source}"))?;
        Ok(Self {
            pattern: Some(pattern),
        })
    }

    pub fn matches(&self, text: &str) -> bool {
        self.pattern.as_ref().is_some_and(|p| p.is_match(text))
    }
}

#[derive(Debug, Clone)]
pub struct HandoffPhrases {
    pub opt_out: PhraseSet,
    pub request_human: PhraseSet,
    pub return_to_assistant: PhraseSet,
}

impl HandoffPhrases {
    pub fn from_config(config: &PhrasesConfig) -> Result<Self> {
        Ok(Self {
            opt_out: PhraseSet::new(&config.opt_out)?,
            request_human: PhraseSet::new(&config.request_human)?,
            return_to_assistant: PhraseSet::new(&config.return_to_assistant)?,
        })
    }
}

/// Why a turn was intentionally not answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Silence {
    HumanActive,
    Blocked,
    Suppressed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandoffOutcome {
    /// Mode is `AiActive` and no phrase matched; the turn goes on to the throttle.
    Continue,
    /// Return-to-assistant phrase.
    ResumedAssistant,
    /// Request-human phrase.
    EnteredHuman,
    /// Opt-out phrase.
    OptedOut,
    Silenced(Silence),
}

#[derive(Debug, Clone)]
pub struct HandoffMachine {
    phrases: HandoffPhrases,
    human_idle: chrono::Duration,
}

impl HandoffMachine {
    pub fn new(phrases: HandoffPhrases, human_idle: chrono::Duration) -> Self {
        Self { phrases, human_idle }
    }

    /// Applies one inbound turn to the peer's mode.
    pub fn evaluate(&self, state: &mut ConversationState, text: &str, now: DateTime<Utc>) -> HandoffOutcome {
        self.expire(state, now);
        state.last_message_at = Some(now);

        if self.phrases.return_to_assistant.matches(text) {
            self.resume(state, now);
            return HandoffOutcome::ResumedAssistant;
        }
        if self.phrases.request_human.matches(text) {
            self.enter_human(state, now);
            return HandoffOutcome::EnteredHuman;
        }

        match state.mode {
            ConversationMode::HumanActive => return HandoffOutcome::Silenced(Silence::HumanActive),
            ConversationMode::Blocked => {
                let silence = match state.block_reason {
                    Some(BlockReason::Repetition) => Silence::Suppressed,
                    _ => Silence::Blocked,
                };
                return HandoffOutcome::Silenced(silence);
            }
            ConversationMode::AiActive => {}
        }

        if self.phrases.opt_out.matches(text) {
            self.block(state, BlockReason::OptOut, now);
            return HandoffOutcome::OptedOut;
        }
        HandoffOutcome::Continue
    }

    /// Lazy transitions, evaluated on the next inbound event only.
    pub fn expire(&self, state: &mut ConversationState, now: DateTime<Utc>) {
        match (state.mode, state.block_reason) {
            (ConversationMode::HumanActive, _) => {
                let reference = state.last_message_at.max(state.mode_since);
                if reference.is_some_and(|at| now - at >= self.human_idle) {
                    tracing::info!("Human handoff for {} lapsed after inactivity", state.peer);
                    self.resume(state, now);
                }
            }
            (ConversationMode::Blocked, Some(BlockReason::Repetition)) => {
                if !state.repetition.is_suppressed(now) {
                    tracing::info!("Repetition suppression for {} expired", state.peer);
                    self.resume(state, now);
                }
            }
            _ => {}
        }
    }

    pub fn resume(&self, state: &mut ConversationState, now: DateTime<Utc>) {
        state.mode = ConversationMode::AiActive;
        state.block_reason = None;
        state.repetition.clear();
        state.mode_since = Some(now);
    }

    pub fn enter_human(&self, state: &mut ConversationState, now: DateTime<Utc>) {
        state.mode = ConversationMode::HumanActive;
        state.block_reason = None;
        state.mode_since = Some(now);
    }

    pub fn block(&self, state: &mut ConversationState, reason: BlockReason, now: DateTime<Utc>) {
        state.mode = ConversationMode::Blocked;
        state.block_reason = Some(reason);
        state.mode_since = Some(now);
    }
}
