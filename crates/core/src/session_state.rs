use crate::types::{Phase, Turn};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard, watch};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Counters {
    pub questions_asked: u32,
    pub coding_questions_asked: u32,
    pub cheating_warnings: u32,
    pub tone_warnings: u32,
}

/// Everything one interview remembers. Dropped when the session ends, so a new
/// session always starts with zeroed counters and an empty history.
#[derive(Debug, Clone)]
pub struct InterviewSession {
    pub phase: Phase,
    pub domain: Option<String>,
    pub is_technical: bool,
    pub counters: Counters,
    /// Last generated interview question, used for duplicate suppression.
    pub last_question: Option<String>,
    history: Vec<Turn>,
    prune_threshold: usize,
    keep: usize,
}

impl InterviewSession {
    pub fn new(prune_threshold: usize, keep: usize) -> Self {
        Self {
            phase: Phase::Introduction,
            domain: None,
            is_technical: false,
            counters: Counters::default(),
            last_question: None,
            history: vec![],
            prune_threshold,
            keep: keep.max(1),
        }
    }

    pub fn history(&self) -> &[Turn] {
        &self.history
    }

    /// Appends a turn. Once the history has grown past the prune threshold it
    /// is first cut down to the most recent `keep` turns.
    pub fn append_turn(&mut self, turn: Turn) {
        if self.history.len() > self.prune_threshold {
            let drop = self.history.len().saturating_sub(self.keep);
            self.history.drain(..drop);
            tracing::debug!(kept = self.history.len(), "Pruned conversation history");
        }
        self.history.push(turn);
    }

    /// The last `n` turns rendered as `role: content` lines for prompts.
    pub fn recent_transcript(&self, n: usize) -> String {
        let start = self.history.len().saturating_sub(n);
        self.history[start..]
            .iter()
            .map(|t| format!("{}: {}", t.role, t.content))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Contents of the last `n` turns joined by spaces.
    pub fn recent_contents(&self, n: usize) -> String {
        let start = self.history.len().saturating_sub(n);
        self.history[start..]
            .iter()
            .map(|t| t.content.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Replaces the current classification. `None` means no domain matched,
    /// which puts the candidate on the non-technical track.
    pub fn set_domain(&mut self, domain: Option<(&str, bool)>) {
        self.domain = domain.map(|(name, _)| name.to_string());
        self.is_technical = domain.is_some_and(|(_, technical)| technical);
    }

    pub fn advance(&mut self, phase: Phase) {
        if phase != self.phase {
            tracing::info!("Interview phase: {:?} -> {:?}", self.phase, phase);
            self.phase = phase;
        }
    }
}

/// Session state shared between the session task and the integrity warden.
///
/// The `active` flag lives in a watch channel rather than inside the lock so
/// that waiting code can be woken the moment it flips.
#[derive(Clone)]
pub struct SharedSession {
    state: Arc<Mutex<InterviewSession>>,
    active: Arc<watch::Sender<bool>>,
}

impl SharedSession {
    pub fn new(session: InterviewSession) -> Self {
        let (active, _) = watch::channel(true);
        Self {
            state: Arc::new(Mutex::new(session)),
            active: Arc::new(active),
        }
    }

    pub async fn lock(&self) -> MutexGuard<'_, InterviewSession> {
        self.state.lock().await
    }

    pub fn is_active(&self) -> bool {
        *self.active.borrow()
    }

    /// Ends the session. Idempotent.
    pub fn deactivate(&self) {
        self.active.send_if_modified(|active| std::mem::replace(active, false));
    }

    /// Resolves once the session is no longer active.
    pub async fn cancelled(&self) {
        let mut rx = self.active.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx.wait_for(|active| !*active).await;
    }

    pub async fn snapshot(&self) -> InterviewSession {
        self.state.lock().await.clone()
    }
}
