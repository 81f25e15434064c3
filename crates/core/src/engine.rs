//! The interview state machine.
//!
//! A [`SessionEngine`] walks one interview through its phases while the
//! integrity monitor runs beside it. Deactivating the session (integrity
//! limit, registry shutdown) cancels the phase task at its next await point
//! and jumps straight to teardown.

use crate::coding::{self, ChallengeEnd, CodingChallenge};
use crate::config::InterviewConfig;
use crate::dialogue::{TurnController, hear_screened};
use crate::domain::DomainTable;
use crate::generator::try_generate;
use crate::integrity::{IntegrityMonitor, Sensors};
use crate::prompts;
use crate::rag::RagFacade;
use crate::session_state::{InterviewSession, SharedSession};
use crate::types::{Phase, Turn, word_count};
use crate::voice::{Utterance, Voice};
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use std::sync::Arc;

pub const GREETING: &str =
    "Hello! I am Gyani. Welcome to your interview session today. I'm excited to chat with you!";
pub const DAY_QUESTION: &str = "Before we begin, how has your day been so far?";
const DAY_ACK: &str =
    "That's great to hear! I appreciate you taking the time for this session.";
pub const INTRO_QUESTION: &str =
    "Now, could you please tell me your name and a bit about yourself?";
const TECH_BACKGROUND: &str = "Nice to meet you! Now, I'd love to hear about your technical background and the technologies you enjoy working with.";
const PRO_BACKGROUND: &str = "Nice to meet you! Could you tell me about your professional experience and the domains you've worked in?";
const TECH_QA_INTRO: &str =
    "Let's start with some technical questions to understand your experience better.";
const PRO_QA_INTRO: &str = "Let's discuss your professional experience in more detail.";
const CODING_INTRO: &str = "Great discussion! Now I'd like to give you a couple of coding challenges to see your problem-solving skills in action.";
const TECH_CLOSING: &[&str] = &[
    "That was excellent! You've shown great technical knowledge and problem-solving skills.",
    "Before we conclude, I'd like to offer you a chance to ask any technical questions you might have.",
    "This could be about the coding problems we discussed, the technical concepts we covered, best practices in the field, or anything else technical.",
];
const PRO_CLOSING: &[&str] = &[
    "That was excellent! You've shown great professional knowledge and problem-solving skills.",
    "Before we conclude, I'd like to offer you a chance to ask any questions you might have about the role or industry.",
    "This could be about the professional scenarios we discussed, the domain concepts we covered, industry best practices, or anything else.",
];
const ASK_PROMPT: &str = "What would you like to ask?";
const ANSWER_CHECK: &str =
    "Does that answer your question, or would you like me to elaborate?";
const OTHER_QUESTIONS: &str = "Do you have any other questions?";
pub const FAREWELL: &str = "Thank you so much for your time today. It was a pleasure talking with you, and I wish you the best of luck!";
pub const TECHNICAL_ISSUE: &str =
    "We've encountered a technical issue, but thank you for your participation today!";

/// Candidate questions in the closing phase need more words than this.
const CLOSING_QUESTION_MIN_WORDS: usize = 3;
const DEFAULT_CODING_DOMAIN: &str = "python";

/// Runs once an interview has finished, with its final history.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait PostSessionHook: Send + Sync {
    async fn after_session(&self, history: &[Turn]);
}

struct Interview {
    config: InterviewConfig,
    voice: Arc<Voice>,
    rag: RagFacade,
    domains: Arc<DomainTable>,
    session: SharedSession,
}

pub struct SessionEngine {
    interview: Arc<Interview>,
    sensors: Sensors,
    hook: Option<Arc<dyn PostSessionHook>>,
}

impl SessionEngine {
    pub fn new(
        config: InterviewConfig,
        voice: Arc<Voice>,
        rag: RagFacade,
        domains: Arc<DomainTable>,
    ) -> Self {
        let session = SharedSession::new(InterviewSession::new(
            config.history_prune_threshold,
            config.history_keep,
        ));
        Self {
            interview: Arc::new(Interview {
                config,
                voice,
                rag,
                domains,
                session,
            }),
            sensors: Sensors::default(),
            hook: None,
        }
    }

    pub fn with_sensors(mut self, sensors: Sensors) -> Self {
        self.sensors = sensors;
        self
    }

    pub fn with_post_session_hook(mut self, hook: Arc<dyn PostSessionHook>) -> Self {
        self.hook = Some(hook);
        self
    }

    pub fn session(&self) -> SharedSession {
        self.interview.session.clone()
    }

    /// Runs the whole interview and returns the final session state.
    pub async fn run(self) -> InterviewSession {
        let SessionEngine {
            interview,
            sensors,
            hook,
        } = self;
        let session = interview.session.clone();
        tracing::info!("Interview session starting");

        let monitor = IntegrityMonitor::spawn(
            session.clone(),
            interview.voice.clone(),
            &interview.config,
            sensors,
        );
        let mut phases = tokio::spawn({
            let interview = interview.clone();
            async move { interview.run_phases().await }
        });

        let cancelled = tokio::select! {
            joined = &mut phases => {
                if let Err(e) = joined {
                    tracing::error!(error = %e, "Interview task failed");
                    if session.is_active() {
                        interview.voice.say(TECHNICAL_ISSUE).await;
                    }
                }
                false
            }
            _ = session.cancelled() => true,
        };
        if cancelled {
            tracing::info!("Interview deactivated, unwinding");
            phases.abort();
            let _ = phases.await;
        }

        session.lock().await.advance(Phase::Teardown);
        session.deactivate();
        monitor.stop().await;

        let finished = session.snapshot().await;
        if let Some(hook) = hook {
            hook.after_session(finished.history()).await;
        }
        tracing::info!(
            questions = finished.counters.questions_asked,
            coding = finished.counters.coding_questions_asked,
            warnings = finished.counters.cheating_warnings,
            "Interview session finished"
        );
        finished
    }
}

impl Interview {
    async fn run_phases(&self) {
        self.introduction().await;
        if self.session.is_active() {
            self.background_probe().await;
        }
        if self.session.is_active() {
            self.qa_loop().await;
        }
        if self.session.is_active() {
            self.coding_loop().await;
        }
        if self.session.is_active() {
            self.closing_qa().await;
        }
    }

    async fn advance(&self, phase: Phase) {
        self.session.lock().await.advance(phase);
    }

    /// Hears one free-form utterance and records it (or its placeholder).
    async fn hear_and_record(&self) -> Option<String> {
        let utterance = hear_screened(&self.voice, &self.session, &self.config).await;
        let (recorded, text) = match utterance {
            Utterance::Text(text) => (text.clone(), Some(text)),
            Utterance::Placeholder(p) => (p.to_string(), None),
        };
        self.session.lock().await.append_turn(Turn::user(recorded));
        text
    }

    async fn ask_free_form(&self, question: &str) -> Option<String> {
        self.session
            .lock()
            .await
            .append_turn(Turn::assistant(question));
        self.voice.prompt(question).await;
        self.hear_and_record().await
    }

    async fn classify(&self, text: &str) {
        let found = self
            .domains
            .classify(text)
            .map(|d| (d.name().to_string(), d.is_technical()));
        let mut session = self.session.lock().await;
        session.set_domain(found.as_ref().map(|(name, tech)| (name.as_str(), *tech)));
        tracing::info!(
            domain = ?session.domain,
            technical = session.is_technical,
            "Domain classification"
        );
    }

    async fn introduction(&self) {
        self.advance(Phase::Introduction).await;
        self.voice.say(GREETING).await;
        if self.ask_free_form(DAY_QUESTION).await.is_some() {
            self.voice.say(DAY_ACK).await;
        }
        if let Some(intro) = self.ask_free_form(INTRO_QUESTION).await {
            self.classify(&intro).await;
        }
    }

    async fn background_probe(&self) {
        self.advance(Phase::BackgroundProbe).await;
        let (domain, technical, context) = {
            let session = self.session.lock().await;
            (
                session.domain.clone(),
                session.is_technical,
                session.recent_transcript(2),
            )
        };

        let tailored = match &domain {
            Some(domain) => {
                let prompt = prompts::background_followup(domain, &context);
                self.rag.try_generate_with_context(&prompt, &context).await
            }
            None => None,
        };
        let question = match tailored {
            Some(q) => format!("Nice to meet you! {q}"),
            None if technical => TECH_BACKGROUND.to_string(),
            None => PRO_BACKGROUND.to_string(),
        };

        if let Some(background) = self.ask_free_form(&question).await {
            self.classify(&background).await;
        }
    }

    async fn qa_loop(&self) {
        self.advance(Phase::QaLoop).await;
        let technical = self.session.lock().await.is_technical;
        self.voice
            .say(if technical { TECH_QA_INTRO } else { PRO_QA_INTRO })
            .await;

        let mut regenerations = 0;
        while self.session.is_active() {
            let (prompt, recent, last_question) = {
                let session = self.session.lock().await;
                if session.counters.questions_asked >= self.config.max_questions {
                    break;
                }
                let recent = session.recent_contents(3);
                let prompt = prompts::interview_question(
                    session.domain.as_deref(),
                    session.is_technical,
                    &recent,
                );
                (prompt, recent, session.last_question.clone())
            };

            let question = self.rag.generate_with_context(&prompt, &recent).await;
            if last_question.as_deref() == Some(question.as_str()) {
                if regenerations < self.config.max_regenerations {
                    regenerations += 1;
                    tracing::debug!(regenerations, "Discarding repeated question");
                    continue;
                }
                tracing::warn!("Generator keeps repeating the last question, asking it anyway");
            }
            regenerations = 0;

            self.session.lock().await.last_question = Some(question.clone());
            let outcome =
                TurnController::new(&self.voice, self.rag.generator(), &self.session, &self.config)
                    .ask_and_collect(&question)
                    .await;
            tracing::debug!(?outcome, "Question settled");
            self.session.lock().await.counters.questions_asked += 1;
        }
    }

    async fn coding_loop(&self) {
        let (technical, domain) = {
            let session = self.session.lock().await;
            (session.is_technical, session.domain.clone())
        };
        if !technical {
            return;
        }
        self.advance(Phase::CodingLoop).await;
        self.voice.prompt(CODING_INTRO).await;
        let domain = domain.as_deref().unwrap_or(DEFAULT_CODING_DOMAIN);

        while self.session.is_active() {
            if self.session.lock().await.counters.coding_questions_asked
                >= self.config.max_coding_questions
            {
                break;
            }
            let problem = coding::generate_problem(self.rag.generator(), domain).await;
            let end =
                CodingChallenge::new(&self.voice, self.rag.generator(), &self.session, &self.config)
                    .run(&problem)
                    .await;
            tracing::info!(?end, "Coding challenge finished");
            if end == ChallengeEnd::Interrupted {
                break;
            }
            self.session.lock().await.counters.coding_questions_asked += 1;
        }
    }

    async fn closing_qa(&self) {
        self.advance(Phase::ClosingQa).await;
        let technical = self.session.lock().await.is_technical;
        for line in if technical { TECH_CLOSING } else { PRO_CLOSING } {
            self.voice.say(line).await;
        }
        self.voice.prompt(ASK_PROMPT).await;

        let mut answered = 0;
        while answered < self.config.max_closing_questions && self.session.is_active() {
            let Some(question) = self.hear_and_record().await else {
                break;
            };
            if word_count(&question) <= CLOSING_QUESTION_MIN_WORDS {
                break;
            }
            answered += 1;
            self.answer_candidate_question(&question, technical).await;
            if answered < self.config.max_closing_questions {
                self.voice.prompt(OTHER_QUESTIONS).await;
            }
        }

        if self.session.is_active() {
            self.voice.say(FAREWELL).await;
        }
    }

    async fn answer_candidate_question(&self, question: &str, technical: bool) {
        let prompt = prompts::closing_answer(question, technical);
        let Some(answer) = self.rag.try_generate_with_context(&prompt, question).await else {
            return;
        };
        self.session
            .lock()
            .await
            .append_turn(Turn::assistant(&answer));
        self.voice.prompt(&answer).await;

        self.voice.prompt(ANSWER_CHECK).await;
        let wants_more = self
            .hear_and_record()
            .await
            .is_some_and(|reply| reply.to_lowercase().contains("elaborate"));
        if !wants_more {
            return;
        }
        let prompt = prompts::elaboration(question, &answer, technical);
        if let Some(elaboration) = try_generate(self.rag.generator(), &prompt).await {
            self.session
                .lock()
                .await
                .append_turn(Turn::assistant(&elaboration));
            self.voice.prompt(&elaboration).await;
        }
    }
}
