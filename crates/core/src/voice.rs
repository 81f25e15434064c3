//! The interviewer's mouth and ears.
//!
//! Every spoken line goes through one async lock, so the session task and the
//! integrity handler can never talk over each other.

use crate::capabilities::{Heard, Listener, Speaker, SpeechError};
use crate::config::InterviewConfig;
use crate::types::{Placeholder, word_count};
use rand::seq::SliceRandom;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

const FILLER_PHRASES: &[&str] = &[
    "I see...",
    "Interesting...",
    "That makes sense...",
    "Go on...",
    "Yes, I understand...",
    "Right...",
    "Okay...",
    "Hmm...",
    "Got it...",
    "Please continue...",
];

/// Utterances longer than this get an active-listening filler.
const FILLER_MIN_WORDS: usize = 5;

pub const NOTHING_HEARD: &str = "I didn't hear anything. Please speak when you're ready.";
pub const NOT_UNDERSTOOD: &str = "I couldn't quite catch that. Could you please repeat?";
pub const RECOGNITION_TROUBLE: &str = "There was a technical issue. Please try speaking again.";
pub const MICROPHONE_TROUBLE: &str =
    "I'm having trouble accessing the microphone. Please check your microphone settings.";
pub const MOVING_ON: &str = "Let's continue with the next part of our interview.";

/// What the candidate said, or the placeholder recorded instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Utterance {
    Text(String),
    Placeholder(Placeholder),
}

pub struct Voice {
    speaker: Arc<dyn Speaker>,
    listener: Arc<dyn Listener>,
    speaking: Mutex<()>,
    listen_timeout: Duration,
    phrase_limit: Duration,
    attempts: u32,
    config: InterviewConfig,
}

impl Voice {
    pub fn new(
        speaker: Arc<dyn Speaker>,
        listener: Arc<dyn Listener>,
        config: &InterviewConfig,
    ) -> Self {
        Self {
            speaker,
            listener,
            speaking: Mutex::new(()),
            listen_timeout: config.listen_timeout(),
            phrase_limit: config.phrase_limit(),
            attempts: config.listen_attempts.max(1),
            config: config.clone(),
        }
    }

    /// Speaks `text`, waiting for any other utterance to finish first.
    /// Playback failures are logged and swallowed.
    pub async fn say(&self, text: &str) {
        let _turn = self.speaking.lock().await;
        tracing::info!("Interviewer: {}", text);
        if let Err(e) = self.speaker.speak(text).await {
            tracing::warn!(error = ?e, "Text-to-speech failed");
        }
    }

    /// Speaks `text`, then gives the candidate a moment proportional to its
    /// length before anything else happens.
    pub async fn prompt(&self, text: &str) {
        self.say(text).await;
        tokio::time::sleep(self.config.pause_after(text)).await;
    }

    /// Listens for one candidate utterance, retrying transient failures.
    pub async fn hear(&self) -> Utterance {
        for attempt in 1..=self.attempts {
            let more_attempts = attempt < self.attempts;
            match self.listener.listen(self.listen_timeout, self.phrase_limit).await {
                Ok(Heard::Speech(text)) => {
                    let text = text.trim().to_string();
                    if text.is_empty() {
                        return Utterance::Placeholder(Placeholder::Unclear);
                    }
                    tracing::info!("Candidate: {}", text);
                    if word_count(&text) > FILLER_MIN_WORDS {
                        self.say(random_filler()).await;
                    }
                    return Utterance::Text(text);
                }
                Ok(Heard::TimedOut) => {
                    tracing::debug!(attempt, "No speech before timeout");
                    if more_attempts {
                        self.prompt(NOTHING_HEARD).await;
                    }
                }
                Ok(Heard::Unrecognized) => {
                    tracing::debug!(attempt, "Speech not recognised");
                    if more_attempts {
                        self.prompt(NOT_UNDERSTOOD).await;
                    }
                }
                Err(SpeechError::Request(reason)) => {
                    tracing::warn!(attempt, %reason, "Speech recognition request failed");
                    if more_attempts {
                        self.prompt(RECOGNITION_TROUBLE).await;
                    }
                }
                Err(SpeechError::Microphone(reason)) => {
                    tracing::error!(%reason, "Microphone unavailable");
                    self.say(MICROPHONE_TROUBLE).await;
                    return Utterance::Placeholder(Placeholder::MicrophoneIssue);
                }
            }
        }
        self.say(MOVING_ON).await;
        Utterance::Placeholder(Placeholder::NoUsableSpeech)
    }

    /// A single quiet listening attempt, for phases where silence is normal
    /// (the candidate thinking through a problem). Failures read as silence.
    pub async fn listen_once(&self) -> Option<String> {
        match self.listener.listen(self.listen_timeout, self.phrase_limit).await {
            Ok(Heard::Speech(text)) if !text.trim().is_empty() => {
                tracing::info!("Candidate: {}", text.trim());
                Some(text.trim().to_string())
            }
            Ok(_) => None,
            Err(e) => {
                tracing::debug!(error = %e, "Listening failed");
                None
            }
        }
    }
}

fn random_filler() -> &'static str {
    FILLER_PHRASES
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or("I see...")
}
