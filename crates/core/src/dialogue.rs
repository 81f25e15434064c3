//! One question, one usable answer.
//!
//! The controller asks, listens and decides between accepting the answer,
//! rephrasing, asking for elaboration, or giving up. Unless the session ends
//! mid-turn, exactly one user entry (answer or placeholder) is appended to the
//! history.

use crate::config::InterviewConfig;
use crate::generator::{TextGenerator, try_generate};
use crate::prompts;
use crate::session_state::SharedSession;
use crate::tone::{Tone, detect_tone, tone_response};
use crate::types::{Placeholder, Turn, word_count};
use crate::voice::{Utterance, Voice};

pub const ELABORATE_PROMPT: &str = "Could you please elaborate on that?";

const REPEAT_PHRASES: &[&str] = &[
    "repeat",
    "say again",
    "pardon",
    "once more",
    "come again",
    "didn't catch",
    "hear that",
];

/// Answers this short are treated as no answer at all.
const TOO_SHORT_WORDS: usize = 3;
/// Answers longer than this are accepted.
const ACCEPT_ABOVE_WORDS: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnswerOutcome {
    Answered(String),
    /// The candidate could not answer; an explanation was given instead.
    GaveUpAfterRetries,
    Placeholder(Placeholder),
    /// The session ended before the candidate answered. Nothing is recorded.
    Interrupted,
}

impl AnswerOutcome {
    /// The text recorded in the history for this outcome, if any.
    pub fn history_text(&self) -> Option<&str> {
        match self {
            AnswerOutcome::Answered(text) => Some(text),
            AnswerOutcome::GaveUpAfterRetries => Some(Placeholder::UnableToAnswer.as_str()),
            AnswerOutcome::Placeholder(p) => Some(p.as_str()),
            AnswerOutcome::Interrupted => None,
        }
    }
}

pub fn is_repeat_request(text: &str) -> bool {
    let lower = text.to_lowercase();
    REPEAT_PHRASES.iter().any(|phrase| lower.contains(phrase))
}

/// Hears one utterance and screens its tone. A non-professional answer is
/// answered with a redirection and comes back as a placeholder.
pub async fn hear_screened(
    voice: &Voice,
    session: &SharedSession,
    config: &InterviewConfig,
) -> Utterance {
    let utterance = voice.hear().await;
    if let Utterance::Text(text) = &utterance {
        if !screen_tone(voice, session, config, text).await {
            return Utterance::Placeholder(Placeholder::NonProfessionalTone);
        }
    }
    utterance
}

/// Returns whether `text` is professional. Anything else bumps the tone
/// counter and is answered with a redirection.
pub async fn screen_tone(
    voice: &Voice,
    session: &SharedSession,
    config: &InterviewConfig,
    text: &str,
) -> bool {
    let tone = detect_tone(text);
    if tone == Tone::Professional {
        return true;
    }

    let warnings = {
        let mut session = session.lock().await;
        session.counters.tone_warnings += 1;
        session.counters.tone_warnings
    };
    tracing::info!(?tone, warnings, "Non-professional tone detected");
    if let Some(reply) = tone_response(tone, warnings, config.tone_warning_limit) {
        voice.prompt(reply).await;
    }
    false
}

pub struct TurnController<'a> {
    voice: &'a Voice,
    generator: &'a dyn TextGenerator,
    session: &'a SharedSession,
    config: &'a InterviewConfig,
}

impl<'a> TurnController<'a> {
    pub fn new(
        voice: &'a Voice,
        generator: &'a dyn TextGenerator,
        session: &'a SharedSession,
        config: &'a InterviewConfig,
    ) -> Self {
        Self {
            voice,
            generator,
            session,
            config,
        }
    }

    /// Asks `question` and keeps the exchange going until it settles.
    pub async fn ask_and_collect(&self, question: &str) -> AnswerOutcome {
        self.session.lock().await.append_turn(Turn::assistant(question));
        self.voice.prompt(question).await;

        let outcome = self.collect(question).await;
        if let Some(text) = outcome.history_text() {
            self.session.lock().await.append_turn(Turn::user(text));
        }
        outcome
    }

    async fn collect(&self, question: &str) -> AnswerOutcome {
        let max_repeats = self.config.max_repeats;
        let max_elaborations = max_repeats.saturating_sub(1);
        let mut rephrases = 0;
        let mut elaborations = 0;
        let mut current = question.to_string();

        loop {
            if !self.session.is_active() {
                tracing::debug!("Session ended while waiting for an answer");
                return AnswerOutcome::Interrupted;
            }

            let answer = match hear_screened(self.voice, self.session, self.config).await {
                Utterance::Text(text) => Some(text),
                Utterance::Placeholder(Placeholder::Unclear) => None,
                Utterance::Placeholder(p) => return AnswerOutcome::Placeholder(p),
            };

            match answer {
                Some(text) if is_repeat_request(&text) => {
                    if rephrases >= max_repeats {
                        return AnswerOutcome::Placeholder(Placeholder::RepeatLimit);
                    }
                    rephrases += 1;
                    current = self.rephrase(&current).await;
                    self.session.lock().await.last_question = Some(current.clone());
                    self.voice
                        .prompt(&format!("Let me rephrase that: {current}"))
                        .await;
                }
                Some(text) if word_count(&text) > ACCEPT_ABOVE_WORDS => {
                    return AnswerOutcome::Answered(text);
                }
                Some(text) if word_count(&text) > TOO_SHORT_WORDS => {
                    if elaborations >= max_elaborations {
                        return AnswerOutcome::Placeholder(Placeholder::UnclearAfterAttempts);
                    }
                    elaborations += 1;
                    self.voice.prompt(ELABORATE_PROMPT).await;
                }
                _ => {
                    if elaborations >= max_elaborations {
                        self.explain(&current).await;
                        return AnswerOutcome::GaveUpAfterRetries;
                    }
                    elaborations += 1;
                    self.voice.prompt(ELABORATE_PROMPT).await;
                }
            }
        }
    }

    async fn rephrase(&self, question: &str) -> String {
        try_generate(self.generator, &prompts::rephrase(question))
            .await
            .unwrap_or_else(|| question.to_string())
    }

    async fn explain(&self, question: &str) {
        if let Some(explanation) =
            try_generate(self.generator, &prompts::explanation(question)).await
        {
            self.voice
                .prompt(&format!("Let me help with that. {explanation}"))
                .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::MockTextGenerator;
    use crate::session_state::InterviewSession;
    use crate::tone::PROFESSIONAL_TONE_REMINDER;
    use crate::voice::testing::*;
    use std::sync::Arc;

    struct Harness {
        voice: Voice,
        speaker: Arc<RecordingSpeaker>,
        listener: Arc<ScriptedListener>,
        session: SharedSession,
        config: InterviewConfig,
    }

    impl Harness {
        fn new(listener: ScriptedListener) -> Self {
            let config = quick_config();
            let speaker = Arc::new(RecordingSpeaker::default());
            let listener = Arc::new(listener);
            let voice = Voice::new(speaker.clone(), listener.clone(), &config);
            let session = SharedSession::new(InterviewSession::new(
                config.history_prune_threshold,
                config.history_keep,
            ));
            Self {
                voice,
                speaker,
                listener,
                session,
                config,
            }
        }

        async fn ask(&self, generator: &dyn TextGenerator, question: &str) -> AnswerOutcome {
            TurnController::new(&self.voice, generator, &self.session, &self.config)
                .ask_and_collect(question)
                .await
        }

        async fn last_user_entry(&self) -> String {
            let session = self.session.lock().await;
            session.history().last().unwrap().content.clone()
        }
    }

    fn rephrasing_generator() -> MockTextGenerator {
        let mut generator = MockTextGenerator::new();
        generator
            .expect_generate_text()
            .returning(|_| Ok("In other words, what is ownership?".to_string()));
        generator
    }

    #[test]
    fn repeat_requests_are_recognised() {
        assert!(is_repeat_request("Sorry, could you REPEAT that?"));
        assert!(is_repeat_request("I didn't catch the last part"));
        assert!(!is_repeat_request("I would use a hash map here"));
    }

    #[tokio::test]
    async fn short_then_repeat_then_answer_asks_at_most_three_times() {
        let harness = Harness::new(ScriptedListener::new(&[
            "no idea",
            "could you say again",
            "ownership means each value has exactly one owner",
        ]));

        let outcome = harness.ask(&rephrasing_generator(), "What is ownership?").await;

        assert_eq!(
            outcome,
            AnswerOutcome::Answered("ownership means each value has exactly one owner".into())
        );
        assert_eq!(harness.listener.calls(), 3);
        let asks = harness.speaker.count_containing("What is ownership?")
            + harness.speaker.count_containing(ELABORATE_PROMPT);
        assert!(asks <= 3);
        assert_eq!(harness.speaker.count_containing("Let me rephrase that:"), 1);
        assert_eq!(
            harness.session.lock().await.last_question.as_deref(),
            Some("In other words, what is ownership?")
        );
    }

    #[tokio::test]
    async fn repeated_short_answers_end_with_an_explanation() {
        let harness = Harness::new(ScriptedListener::new(&["um", "not sure"]));
        let mut generator = MockTextGenerator::new();
        generator
            .expect_generate_text()
            .times(1)
            .returning(|_| Ok("A trait is a shared interface.".to_string()));

        let outcome = harness.ask(&generator, "What is a trait?").await;

        assert_eq!(outcome, AnswerOutcome::GaveUpAfterRetries);
        assert_eq!(harness.speaker.count_containing(ELABORATE_PROMPT), 1);
        assert_eq!(harness.speaker.count_containing("Let me help with that."), 1);
        assert_eq!(
            harness.last_user_entry().await,
            "[Unable to answer after multiple attempts]"
        );
    }

    #[tokio::test]
    async fn too_many_repeat_requests_hit_the_limit() {
        let harness = Harness::new(ScriptedListener::new(&["repeat", "pardon", "once more"]));

        let outcome = harness.ask(&rephrasing_generator(), "What is ownership?").await;

        assert_eq!(outcome, AnswerOutcome::Placeholder(Placeholder::RepeatLimit));
        assert_eq!(harness.speaker.count_containing("Let me rephrase that:"), 2);
        assert_eq!(
            harness.last_user_entry().await,
            "[Requested repeat too many times]"
        );
    }

    #[tokio::test]
    async fn four_word_answers_are_unclear() {
        let harness = Harness::new(ScriptedListener::new(&[
            "I think it depends",
            "it really just depends",
        ]));
        let generator = MockTextGenerator::new();

        let outcome = harness.ask(&generator, "How do you scale a database?").await;

        assert_eq!(
            outcome,
            AnswerOutcome::Placeholder(Placeholder::UnclearAfterAttempts)
        );
    }

    #[tokio::test]
    async fn rude_answers_short_circuit_and_escalate() {
        let harness = Harness::new(ScriptedListener::new(&[
            "that's stupid",
            "who cares about this nonsense",
        ]));
        let generator = MockTextGenerator::new();

        let first = harness.ask(&generator, "Question one?").await;
        let second = harness.ask(&generator, "Question two?").await;

        for outcome in [first, second] {
            assert_eq!(
                outcome,
                AnswerOutcome::Placeholder(Placeholder::NonProfessionalTone)
            );
        }
        assert_eq!(harness.session.lock().await.counters.tone_warnings, 2);
        assert_eq!(harness.speaker.count_containing(PROFESSIONAL_TONE_REMINDER), 1);
        assert!(harness.session.is_active());
    }

    #[tokio::test]
    async fn ending_the_session_mid_turn_records_no_answer() {
        let harness = Harness::new(ScriptedListener::new(&["um"]));
        let mut generator = MockTextGenerator::new();
        generator.expect_generate_text().never();
        harness.session.deactivate();

        let outcome = harness.ask(&generator, "What is a lifetime?").await;

        assert_eq!(outcome, AnswerOutcome::Interrupted);
        assert_eq!(harness.listener.calls(), 0);
        let session = harness.session.lock().await;
        assert_eq!(session.history(), &[Turn::assistant("What is a lifetime?")]);
    }

    #[tokio::test]
    async fn history_records_question_then_answer() {
        let harness = Harness::new(ScriptedListener::new(&[
            "I mostly write async services in Rust",
        ]));
        let generator = MockTextGenerator::new();

        harness.ask(&generator, "What do you work on?").await;

        let session = harness.session.lock().await;
        let history = session.history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0], Turn::assistant("What do you work on?"));
        assert_eq!(history[1], Turn::user("I mostly write async services in Rust"));
    }
}
