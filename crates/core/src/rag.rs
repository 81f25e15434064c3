//! Retrieval-augmented generation.

use crate::engine::PostSessionHook;
use crate::generator::{TextGenerator, generate_or_fallback, try_generate};
use crate::knowledge::KnowledgeStore;
use crate::types::Turn;
use async_trait::async_trait;
use std::sync::Arc;

const CONTEXT_HEADER: &str = "Additional Context:";

/// Wraps a text generator, enriching prompts with snippets retrieved from the
/// knowledge store. Without a store it behaves like the bare generator.
#[derive(Clone)]
pub struct RagFacade {
    generator: Arc<dyn TextGenerator>,
    knowledge: Option<Arc<KnowledgeStore>>,
    top_k: usize,
}

impl RagFacade {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        knowledge: Option<Arc<KnowledgeStore>>,
        top_k: usize,
    ) -> Self {
        Self {
            generator,
            knowledge,
            top_k,
        }
    }

    pub fn generator(&self) -> &dyn TextGenerator {
        self.generator.as_ref()
    }

    pub fn knowledge(&self) -> Option<&Arc<KnowledgeStore>> {
        self.knowledge.as_ref()
    }

    /// `instruction` followed by the retrieved context for `query`.
    pub async fn augment(&self, instruction: &str, query: &str) -> String {
        let snippets = match &self.knowledge {
            Some(store) => store.retrieve(query, self.top_k).await,
            None => return instruction.to_string(),
        };
        format!("{instruction}\n\n{CONTEXT_HEADER}\n{}", snippets.join("\n"))
    }

    /// Never fails: generation errors become a fixed fallback reply.
    pub async fn generate_with_context(&self, instruction: &str, query: &str) -> String {
        let prompt = self.augment(instruction, query).await;
        generate_or_fallback(self.generator.as_ref(), &prompt).await
    }

    /// Like [`generate_with_context`](Self::generate_with_context) but reports
    /// failure as `None`, for callers with their own fallback.
    pub async fn try_generate_with_context(&self, instruction: &str, query: &str) -> Option<String> {
        let prompt = self.augment(instruction, query).await;
        try_generate(self.generator.as_ref(), &prompt).await
    }
}

/// Folds every history entry of a finished interview back into the
/// knowledge store.
pub struct KnowledgeFolding {
    store: Arc<KnowledgeStore>,
}

impl KnowledgeFolding {
    pub fn new(store: Arc<KnowledgeStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl PostSessionHook for KnowledgeFolding {
    async fn after_session(&self, history: &[Turn]) {
        let mut added = 0;
        for turn in history.iter().filter(|t| !t.content.trim().is_empty()) {
            match self.store.add(&turn.content).await {
                Ok(()) => added += 1,
                Err(e) => {
                    tracing::warn!(error = %e, "Could not fold interview turn into knowledge base");
                }
            }
        }
        tracing::info!(added, "Knowledge base updated from interview history");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashingEmbedder;
    use crate::generator::{FALLBACK_REPLY, MockTextGenerator};
    use crate::knowledge::KnowledgePaths;

    fn store(dir: &std::path::Path) -> Arc<KnowledgeStore> {
        Arc::new(
            KnowledgeStore::open(
                KnowledgePaths::in_dir(dir),
                Arc::new(HashingEmbedder::new(64)),
            )
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn empty_store_still_gets_a_context_header() {
        let dir = tempfile::tempdir().unwrap();
        let mut generator = MockTextGenerator::new();
        generator
            .expect_generate_text()
            .withf(|prompt| prompt == "Ask a question\n\nAdditional Context:\n")
            .times(1)
            .returning(|_| Ok("What is a monad?".to_string()));
        let rag = RagFacade::new(Arc::new(generator), Some(store(dir.path())), 3);

        assert_eq!(
            rag.generate_with_context("Ask a question", "anything").await,
            "What is a monad?"
        );
    }

    #[tokio::test]
    async fn retrieved_snippets_are_appended_one_per_line() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        store.add("tokio runs async tasks").await.unwrap();
        store.add("serde derives serializers").await.unwrap();
        let rag = RagFacade::new(Arc::new(MockTextGenerator::new()), Some(store), 3);

        let prompt = rag.augment("Instruction", "tokio runs async tasks").await;

        let (head, context) = prompt.split_once("\n\nAdditional Context:\n").unwrap();
        assert_eq!(head, "Instruction");
        let lines: Vec<_> = context.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "tokio runs async tasks");
    }

    #[tokio::test]
    async fn generation_failure_falls_back() {
        let mut generator = MockTextGenerator::new();
        generator
            .expect_generate_text()
            .returning(|_| Err(anyhow::anyhow!("timeout")));
        let rag = RagFacade::new(Arc::new(generator), None, 3);

        assert_eq!(rag.generate_with_context("q", "q").await, FALLBACK_REPLY);
        assert!(rag.try_generate_with_context("q", "q").await.is_none());
    }

    #[tokio::test]
    async fn folding_adds_every_non_empty_turn() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let hook = KnowledgeFolding::new(store.clone());

        hook.after_session(&[
            Turn::assistant("Tell me about yourself"),
            Turn::user("I build compilers"),
            Turn::user("  "),
        ])
        .await;

        assert_eq!(store.counts().await, (2, 2));
        assert_eq!(
            store.retrieve("I build compilers", 1).await,
            vec!["I build compilers"]
        );
    }
}
