//! Tunables of a single interview session.
//!
//! Every field has a default, so a partial JSON/TOML document (or none at all)
//! yields a working configuration.

use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct InterviewConfig {
    pub max_questions: u32,
    pub max_coding_questions: u32,
    pub max_closing_questions: u32,
    /// Rephrase budget per question; elaboration prompts get one less.
    pub max_repeats: u32,
    /// How many times a duplicate question is regenerated before it is used anyway.
    pub max_regenerations: u32,
    pub history_prune_threshold: usize,
    pub history_keep: usize,
    pub listen_timeout_secs: u64,
    pub phrase_limit_secs: u64,
    pub listen_attempts: u32,
    pub hint_idle_secs: u64,
    pub challenge_time_limit_secs: u64,
    pub warning_limit: u32,
    pub tone_warning_limit: u32,
    pub attention_poll_ms: u64,
    pub focus_poll_ms: u64,
    pub focus_arm_delay_ms: u64,
    pub attention_confirmations: u32,
    pub focus_confirmations: u32,
    pub retrieval_k: usize,
    pub pause_base_ms: u64,
    pub pause_per_word_ms: u64,
}

impl Default for InterviewConfig {
    fn default() -> Self {
        Self {
            max_questions: 6,
            max_coding_questions: 2,
            max_closing_questions: 3,
            max_repeats: 2,
            max_regenerations: 3,
            history_prune_threshold: 15,
            history_keep: 8,
            listen_timeout_secs: 15,
            phrase_limit_secs: 60,
            listen_attempts: 3,
            hint_idle_secs: 120,
            challenge_time_limit_secs: 15 * 60,
            warning_limit: 3,
            tone_warning_limit: 2,
            attention_poll_ms: 500,
            focus_poll_ms: 3_000,
            focus_arm_delay_ms: 3_000,
            attention_confirmations: 1,
            focus_confirmations: 2,
            retrieval_k: 3,
            pause_base_ms: 600,
            pause_per_word_ms: 150,
        }
    }
}

impl InterviewConfig {
    pub fn listen_timeout(&self) -> Duration {
        Duration::from_secs(self.listen_timeout_secs)
    }

    pub fn phrase_limit(&self) -> Duration {
        Duration::from_secs(self.phrase_limit_secs)
    }

    pub fn hint_idle(&self) -> Duration {
        Duration::from_secs(self.hint_idle_secs)
    }

    pub fn challenge_time_limit(&self) -> Duration {
        Duration::from_secs(self.challenge_time_limit_secs)
    }

    pub fn attention_poll(&self) -> Duration {
        Duration::from_millis(self.attention_poll_ms)
    }

    pub fn focus_poll(&self) -> Duration {
        Duration::from_millis(self.focus_poll_ms)
    }

    pub fn focus_arm_delay(&self) -> Duration {
        Duration::from_millis(self.focus_arm_delay_ms)
    }

    /// Pause after speaking `message`, proportional to its length.
    pub fn pause_after(&self, message: &str) -> Duration {
        let words = crate::types::word_count(message) as u64;
        Duration::from_millis(self.pause_base_ms + self.pause_per_word_ms * words)
    }
}
