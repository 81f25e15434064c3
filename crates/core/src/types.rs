use serde::{Deserialize, Serialize};
use std::fmt;

/// Who produced an entry of the conversation history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => f.write_str("user"),
            Role::Assistant => f.write_str("assistant"),
        }
    }
}

/// One entry of the conversation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Interview phases, in the order the session engine walks them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Introduction,
    BackgroundProbe,
    QaLoop,
    CodingLoop,
    ClosingQa,
    Teardown,
}

/// Synthetic history entries standing in for an unusable candidate response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placeholder {
    RepeatLimit,
    UnableToAnswer,
    UnclearAfterAttempts,
    NonProfessionalTone,
    Unclear,
    MicrophoneIssue,
    NoUsableSpeech,
}

impl Placeholder {
    pub fn as_str(&self) -> &'static str {
        match self {
            Placeholder::RepeatLimit => "[Requested repeat too many times]",
            Placeholder::UnableToAnswer => "[Unable to answer after multiple attempts]",
            Placeholder::UnclearAfterAttempts => "[Unclear response after multiple attempts]",
            Placeholder::NonProfessionalTone => "[Response had non-professional tone]",
            Placeholder::Unclear => "[Unclear response]",
            Placeholder::MicrophoneIssue => "[Microphone issue]",
            Placeholder::NoUsableSpeech => "[Response unclear after multiple attempts]",
        }
    }
}

impl fmt::Display for Placeholder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whitespace-separated word count, the unit every answer-length rule uses.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}
