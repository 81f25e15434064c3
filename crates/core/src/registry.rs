//! Running interviews, keyed by session id.
//!
//! This is the surface a front end drives: start an interview, query the
//! knowledge-backed assistant, end the interview, and inspect or extend the
//! knowledge base.

use crate::capabilities::{Listener, Speaker};
use crate::config::InterviewConfig;
use crate::domain::DomainTable;
use crate::engine::SessionEngine;
use crate::error::{KnowledgeResult, RegistryError};
use crate::generator::TextGenerator;
use crate::integrity::Sensors;
use crate::knowledge::{KnowledgeEntry, KnowledgeStore};
use crate::rag::{KnowledgeFolding, RagFacade};
use crate::session_state::{InterviewSession, SharedSession};
use crate::types::Phase;
use crate::voice::Voice;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// How long `end_session` waits for the interview task to wind down.
pub const END_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionHandle(Uuid);

impl SessionHandle {
    pub fn id(&self) -> Uuid {
        self.0
    }
}

impl std::fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Builds fresh monitoring devices for each new session.
pub type SensorFactory = Box<dyn Fn() -> Sensors + Send + Sync>;

/// The long-lived collaborators every session is wired to.
pub struct Collaborators {
    pub speaker: Arc<dyn Speaker>,
    pub listener: Arc<dyn Listener>,
    pub generator: Arc<dyn TextGenerator>,
    pub knowledge: Arc<KnowledgeStore>,
    pub domains: Arc<DomainTable>,
    pub sensors: SensorFactory,
}

struct RunningSession {
    session: SharedSession,
    rag: RagFacade,
    task: JoinHandle<InterviewSession>,
}

pub struct SessionRegistry {
    collaborators: Collaborators,
    sessions: Mutex<HashMap<Uuid, RunningSession>>,
}

impl SessionRegistry {
    pub fn new(collaborators: Collaborators) -> Self {
        Self {
            collaborators,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Starts an interview in the background. Only one interview may run at
    /// a time.
    pub async fn start_session(
        &self,
        config: InterviewConfig,
    ) -> Result<SessionHandle, RegistryError> {
        let mut sessions = self.sessions.lock().await;
        reap_finished(&mut sessions);
        if !sessions.is_empty() {
            return Err(RegistryError::AlreadyRunning);
        }

        let c = &self.collaborators;
        let voice = Arc::new(Voice::new(c.speaker.clone(), c.listener.clone(), &config));
        let rag = RagFacade::new(
            c.generator.clone(),
            Some(c.knowledge.clone()),
            config.retrieval_k,
        );
        let engine = SessionEngine::new(config, voice, rag.clone(), c.domains.clone())
            .with_sensors((c.sensors)())
            .with_post_session_hook(Arc::new(KnowledgeFolding::new(c.knowledge.clone())));

        let id = Uuid::new_v4();
        let session = engine.session();
        let task = tokio::spawn(engine.run());
        sessions.insert(id, RunningSession { session, rag, task });
        tracing::info!(session = %id, "Interview session registered");
        Ok(SessionHandle(id))
    }

    /// Answers `text` with knowledge-base context while the session runs.
    pub async fn submit_utterance(
        &self,
        handle: SessionHandle,
        text: &str,
    ) -> Result<String, RegistryError> {
        let rag = {
            let mut sessions = self.sessions.lock().await;
            reap_finished(&mut sessions);
            let running = sessions
                .get(&handle.0)
                .ok_or(RegistryError::UnknownSession(handle.0))?;
            if !running.session.is_active() {
                return Err(RegistryError::SessionEnded(handle.0));
            }
            running.rag.clone()
        };
        Ok(rag.generate_with_context(text, text).await)
    }

    /// Resolves once the session stops being active, whether it finished on
    /// its own or was ended.
    pub async fn wait_until_ended(&self, handle: SessionHandle) -> Result<(), RegistryError> {
        let session = self
            .sessions
            .lock()
            .await
            .get(&handle.0)
            .map(|running| running.session.clone())
            .ok_or(RegistryError::UnknownSession(handle.0))?;
        session.cancelled().await;
        Ok(())
    }

    /// Ends the interview and waits for it to finish tearing down.
    ///
    /// The running phase gets `END_GRACE` to unwind. Once the session has
    /// reached teardown its post-session work (folding the conversation into
    /// the knowledge base) is always waited for, however long it takes.
    /// Returns `None` when the interview task failed or never reached
    /// teardown in time.
    pub async fn end_session(
        &self,
        handle: SessionHandle,
    ) -> Result<Option<InterviewSession>, RegistryError> {
        let RunningSession {
            session, mut task, ..
        } = self
            .sessions
            .lock()
            .await
            .remove(&handle.0)
            .ok_or(RegistryError::UnknownSession(handle.0))?;
        session.deactivate();

        let joined = match tokio::time::timeout(END_GRACE, &mut task).await {
            Ok(joined) => joined,
            Err(_) => {
                if session.lock().await.phase != Phase::Teardown {
                    tracing::warn!(session = %handle, "Interview did not stop within the grace period");
                    return Ok(None);
                }
                tracing::info!(session = %handle, "Waiting for post-session work to finish");
                task.await
            }
        };
        match joined {
            Ok(finished) => Ok(Some(finished)),
            Err(e) => {
                tracing::error!(session = %handle, error = %e, "Interview task failed");
                Ok(None)
            }
        }
    }

    pub async fn active_sessions(&self) -> Vec<SessionHandle> {
        let mut sessions = self.sessions.lock().await;
        reap_finished(&mut sessions);
        sessions.keys().copied().map(SessionHandle).collect()
    }

    pub async fn list_knowledge(&self) -> Vec<KnowledgeEntry> {
        self.collaborators.knowledge.entries().await
    }

    pub async fn add_knowledge(&self, text: &str) -> KnowledgeResult<()> {
        self.collaborators.knowledge.add(text).await
    }
}

fn reap_finished(sessions: &mut HashMap<Uuid, RunningSession>) {
    sessions.retain(|id, running| {
        let done = running.task.is_finished();
        if done {
            tracing::debug!(session = %id, "Reaped finished interview session");
        }
        !done
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::Embedder;
    use crate::embedding::HashingEmbedder;
    use async_trait::async_trait;
    use crate::generator::MockTextGenerator;
    use crate::knowledge::KnowledgePaths;
    use crate::voice::testing::*;

    fn registry(dir: &std::path::Path, generator: MockTextGenerator) -> SessionRegistry {
        registry_with_embedder(dir, generator, Arc::new(HashingEmbedder::new(32)))
    }

    fn registry_with_embedder(
        dir: &std::path::Path,
        generator: MockTextGenerator,
        embedder: Arc<dyn Embedder>,
    ) -> SessionRegistry {
        let knowledge = KnowledgeStore::open(KnowledgePaths::in_dir(dir), embedder).unwrap();
        SessionRegistry::new(Collaborators {
            speaker: Arc::new(RecordingSpeaker::default()),
            listener: Arc::new(ScriptedListener::default()),
            generator: Arc::new(generator),
            knowledge: Arc::new(knowledge),
            domains: Arc::new(DomainTable::builtin()),
            sensors: Box::new(Sensors::default),
        })
    }

    fn echo_generator() -> MockTextGenerator {
        let mut generator = MockTextGenerator::new();
        generator
            .expect_generate_text()
            .returning(|prompt| Ok(format!("echo: {}", prompt.len())));
        generator
    }

    #[tokio::test(start_paused = true)]
    async fn only_one_interview_at_a_time() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(dir.path(), echo_generator());

        let first = registry.start_session(quick_config()).await.unwrap();
        assert!(matches!(
            registry.start_session(quick_config()).await,
            Err(RegistryError::AlreadyRunning)
        ));
        assert_eq!(registry.active_sessions().await, vec![first]);

        let finished = registry.end_session(first).await.unwrap().unwrap();
        assert_eq!(finished.phase, Phase::Teardown);
        assert!(registry.active_sessions().await.is_empty());

        let second = registry.start_session(quick_config()).await.unwrap();
        assert_ne!(first, second);
        registry.end_session(second).await.unwrap();
        assert!(matches!(
            registry.wait_until_ended(second).await,
            Err(RegistryError::UnknownSession(_))
        ));
    }

    /// An embedding backend with network-like latency.
    struct SlowEmbedder(HashingEmbedder);

    #[async_trait]
    impl Embedder for SlowEmbedder {
        fn dimension(&self) -> usize {
            self.0.dimension()
        }

        async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
            tokio::time::sleep(Duration::from_millis(800)).await;
            Ok(self.0.embed_sync(text))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn finished_interview_is_fully_folded_before_end_returns() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry_with_embedder(
            dir.path(),
            echo_generator(),
            Arc::new(SlowEmbedder(HashingEmbedder::new(32))),
        );

        let handle = registry.start_session(quick_config()).await.unwrap();
        registry.wait_until_ended(handle).await.unwrap();
        let finished = registry
            .end_session(handle)
            .await
            .unwrap()
            .expect("teardown completes");

        let turns = finished
            .history()
            .iter()
            .filter(|t| !t.content.trim().is_empty())
            .count();
        // Folding takes longer than the grace period at this latency.
        assert!(turns as u64 * 800 > END_GRACE.as_millis() as u64);
        assert_eq!(registry.list_knowledge().await.len(), turns);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_handles_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(dir.path(), echo_generator());
        let handle = registry.start_session(quick_config()).await.unwrap();
        registry.end_session(handle).await.unwrap();

        assert!(matches!(
            registry.submit_utterance(handle, "hello").await,
            Err(RegistryError::UnknownSession(id)) if id == handle.id()
        ));
        assert!(matches!(
            registry.end_session(handle).await,
            Err(RegistryError::UnknownSession(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn utterances_are_answered_with_context() {
        let dir = tempfile::tempdir().unwrap();
        let mut generator = MockTextGenerator::new();
        generator.expect_generate_text().returning(|prompt| {
            let reply = if prompt.starts_with("What is a lifetime?\n\nAdditional Context:\n") {
                "A lifetime bounds a borrow."
            } else {
                "Tell me more."
            };
            Ok(reply.to_string())
        });
        let registry = registry(dir.path(), generator);
        registry
            .add_knowledge("Lifetimes describe how long references are valid")
            .await
            .unwrap();

        let handle = registry.start_session(quick_config()).await.unwrap();
        let reply = registry
            .submit_utterance(handle, "What is a lifetime?")
            .await
            .unwrap();
        assert_eq!(reply, "A lifetime bounds a borrow.");
        registry.end_session(handle).await.unwrap();
    }

    #[tokio::test]
    async fn knowledge_can_be_listed_and_extended() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(dir.path(), MockTextGenerator::new());
        assert!(registry.list_knowledge().await.is_empty());

        registry.add_knowledge("Borrowing never outlives the owner").await.unwrap();

        let entries = registry.list_knowledge().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].text, "Borrowing never outlives the owner");
        assert_eq!(entries[0].embedding.len(), 32);
    }
}
