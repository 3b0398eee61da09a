//! # Repetition Throttle
//!
//! Detects a peer sending the same text over and over. Texts are compared after
//! normalization; the `limit`-th identical turn in a row escalates exactly once
//! and starts a suppression window during which further input is dropped.

use chrono::{DateTime, Utc};

use crate::domain::config::ConversationConfig;
use crate::domain::types::RepetitionCounter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleVerdict {
    Allow,
    /// Threshold reached on this turn: send the single notice and suppress.
    Escalate,
    /// Suppression window still open.
    Drop,
}

/// Trimmed and lowercased.
pub fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

#[derive(Debug, Clone, Copy)]
pub struct RepetitionThrottle {
    limit: u32,
    window: chrono::Duration,
}

impl RepetitionThrottle {
    pub fn new(limit: u32, window: chrono::Duration) -> Self {
        Self {
            limit: limit.max(1),
            window,
        }
    }

    pub fn from_config(config: &ConversationConfig) -> Self {
        Self::new(config.repetition_limit, config.suppression())
    }

    pub fn observe(&self, counter: &mut RepetitionCounter, text: &str, now: DateTime<Utc>) -> ThrottleVerdict {
        if counter.is_suppressed(now) {
            return ThrottleVerdict::Drop;
        }

        let normalized = normalize(text);
        if counter.last_normalized.as_deref() == Some(normalized.as_str()) {
            counter.count += 1;
        } else {
            counter.last_normalized = Some(normalized);
            counter.count = 1;
            counter.suppressed_until = None;
        }

        if counter.count >= self.limit {
            counter.suppressed_until = Some(now + self.window);
            return ThrottleVerdict::Escalate;
        }
        ThrottleVerdict::Allow
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn throttle() -> RepetitionThrottle {
        RepetitionThrottle::new(3, Duration::minutes(30))
    }

    #[test]
    fn normalization_ignores_case_and_padding() {
        assert_eq!(normalize("  Hello There \n"), "hello there");
    }

    #[test]
    fn third_identical_turn_escalates_once_then_drops() {
        let throttle = throttle();
        let mut counter = RepetitionCounter::default();
        let verdicts: Vec<_> = ["price?", "Price?", " price? ", "price?"]
            .iter()
            .enumerate()
            .map(|(i, text)| throttle.observe(&mut counter, text, t0() + Duration::seconds(i as i64)))
            .collect();

        assert_eq!(
            verdicts,
            vec![
                ThrottleVerdict::Allow,
                ThrottleVerdict::Allow,
                ThrottleVerdict::Escalate,
                ThrottleVerdict::Drop
            ]
        );
        assert_eq!(counter.suppressed_until, Some(t0() + Duration::seconds(2) + Duration::minutes(30)));
    }

    #[test]
    fn different_text_resets_the_run() {
        let throttle = throttle();
        let mut counter = RepetitionCounter::default();
        throttle.observe(&mut counter, "a", t0());
        throttle.observe(&mut counter, "a", t0());
        assert_eq!(throttle.observe(&mut counter, "b", t0()), ThrottleVerdict::Allow);
        assert_eq!(counter.count, 1);
        assert_eq!(throttle.observe(&mut counter, "b", t0()), ThrottleVerdict::Allow);
    }

    #[test]
    fn suppression_drops_even_different_text() {
        let throttle = throttle();
        let mut counter = RepetitionCounter::default();
        for _ in 0..3 {
            throttle.observe(&mut counter, "a", t0());
        }
        assert_eq!(throttle.observe(&mut counter, "something else", t0() + Duration::minutes(29)), ThrottleVerdict::Drop);
        assert_eq!(counter.count, 3);
    }

    #[test]
    fn clearing_the_counter_lifts_suppression() {
        let throttle = throttle();
        let mut counter = RepetitionCounter::default();
        for _ in 0..3 {
            throttle.observe(&mut counter, "a", t0());
        }
        counter.clear();
        assert_eq!(throttle.observe(&mut counter, "a", t0()), ThrottleVerdict::Allow);
    }
}
