//! Coding challenges: problem selection, the idle-hint watch and the
//! approach follow-up.

use crate::config::InterviewConfig;
use crate::dialogue::{TurnController, screen_tone};
use crate::generator::{TextGenerator, try_generate};
use crate::prompts;
use crate::session_state::SharedSession;
use crate::types::{Turn, word_count};
use crate::voice::Voice;
use tokio::time::Instant;

const TWO_SUM: &str = "Problem: Find the two numbers in a list that add up to a target sum.

Example Input: numbers = [2, 7, 11, 15], target = 9
Example Output: [0, 1] (indices of numbers 2 and 7)

Constraints: Each input has exactly one solution, and you may not use the same element twice.";

const REVERSE_WORDS: &str = "Problem: Write a function to reverse words in a sentence while keeping the word order.

Example Input: \"Hello World Python\"
Example Output: \"olleH dlroW nohtyP\"

Constraints: Preserve spaces between words, handle empty strings gracefully.";

pub const CHALLENGE_INTRO: &str = "I've prepared a coding challenge for you. Here's the problem:";
pub const APPROACH_PROMPT: &str = "Please describe your approach to solving this problem.";
pub const HINT_OFFER: &str = "Would you like a small hint to help you get started?";
pub const KEEP_GOING: &str = "Take your time, and describe your approach when you're ready.";
pub const TIME_UP: &str = "We're out of time for this one. Let's move on.";

/// Approaches need more words than this to count.
const APPROACH_MIN_WORDS: usize = 4;

pub fn language_for(domain: &str) -> &'static str {
    match domain {
        "python" => "Python",
        "java" => "Java",
        "cpp" => "C++",
        "frontend" => "JavaScript",
        "backend" => "Python or your preferred language",
        "AI" | "data science" | "machine learning" => "Python",
        _ => "Python",
    }
}

pub fn fallback_problem(domain: &str) -> &'static str {
    match domain {
        "python" => TWO_SUM,
        _ => REVERSE_WORDS,
    }
}

pub async fn generate_problem(generator: &dyn TextGenerator, domain: &str) -> String {
    let prompt = prompts::coding_problem(domain, language_for(domain));
    match try_generate(generator, &prompt).await {
        Some(problem) => problem,
        None => {
            tracing::warn!(domain, "Using a fallback coding problem");
            fallback_problem(domain).to_string()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeEnd {
    /// The candidate described an approach and answered the follow-up.
    Discussed,
    TimedOut,
    /// The session stopped while the challenge was running.
    Interrupted,
}

pub struct CodingChallenge<'a> {
    voice: &'a Voice,
    generator: &'a dyn TextGenerator,
    session: &'a SharedSession,
    config: &'a InterviewConfig,
}

impl<'a> CodingChallenge<'a> {
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

    /// Presents `problem` and waits for an approach.
    ///
    /// Silence accumulates idle time; after `hint_idle` one hint is offered.
    /// The challenge gives up after `challenge_time_limit`.
    pub async fn run(&self, problem: &str) -> ChallengeEnd {
        self.voice.say(CHALLENGE_INTRO).await;
        self.voice.say(problem).await;
        self.voice.prompt(APPROACH_PROMPT).await;
        self.session
            .lock()
            .await
            .append_turn(Turn::assistant(problem));

        let started = Instant::now();
        let mut last_activity = started;
        let mut hint_offered = false;

        loop {
            if !self.session.is_active() {
                return ChallengeEnd::Interrupted;
            }
            if started.elapsed() >= self.config.challenge_time_limit() {
                self.voice.prompt(TIME_UP).await;
                return ChallengeEnd::TimedOut;
            }
            if !hint_offered && last_activity.elapsed() >= self.config.hint_idle() {
                hint_offered = true;
                self.offer_hint(problem).await;
                last_activity = Instant::now();
                continue;
            }

            let Some(text) = self.voice.listen_once().await else {
                continue;
            };
            last_activity = Instant::now();
            if !screen_tone(self.voice, self.session, self.config, &text).await {
                continue;
            }
            if word_count(&text) > APPROACH_MIN_WORDS {
                self.session.lock().await.append_turn(Turn::user(&text));
                self.follow_up(problem, &text).await;
                return ChallengeEnd::Discussed;
            }
            self.voice.prompt(KEEP_GOING).await;
        }
    }

    async fn offer_hint(&self, problem: &str) {
        self.voice.prompt(HINT_OFFER).await;
        let accepted = match self.voice.listen_once().await {
            Some(reply) => {
                screen_tone(self.voice, self.session, self.config, &reply).await
                    && reply.to_lowercase().contains("yes")
            }
            None => false,
        };
        if !accepted {
            return;
        }
        if let Some(hint) = try_generate(self.generator, &prompts::hint(problem)).await {
            self.voice.prompt(&hint).await;
        }
    }

    async fn follow_up(&self, problem: &str, approach: &str) {
        let Some(question) =
            try_generate(self.generator, &prompts::approach_followup(problem, approach)).await
        else {
            return;
        };
        TurnController::new(self.voice, self.generator, self.session, self.config)
            .ask_and_collect(&question)
            .await;
    }
}
