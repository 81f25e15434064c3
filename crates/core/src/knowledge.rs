//! Append-only knowledge base with a vector index kept in lockstep.
//!
//! Entries live in a JSON array of `{text, embedding}` records; the index in
//! a separate binary file. Entry `i` always corresponds to index row `i`.

use crate::capabilities::Embedder;
use crate::error::{KnowledgeError, KnowledgeResult};
use crate::persist::{write_atomic, write_atomic_blocking};
use crate::vector_index::FlatL2Index;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    pub text: String,
    pub embedding: Vec<f32>,
}

#[derive(Debug, Clone)]
pub struct KnowledgePaths {
    pub knowledge_base: PathBuf,
    pub vector_index: PathBuf,
}

impl KnowledgePaths {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            knowledge_base: dir.join("knowledge_base.json"),
            vector_index: dir.join("vector_index.idx"),
        }
    }
}

/// What `open` found on disk and had to repair.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub entries_on_disk: usize,
    pub vectors_on_disk: usize,
    /// Set when entry and vector counts disagreed and both were cut back.
    pub truncated_to: Option<usize>,
    /// Set when the index file was missing and rebuilt from stored embeddings.
    pub rebuilt_index: bool,
}

impl LoadReport {
    pub fn recovered(&self) -> bool {
        self.truncated_to.is_some() || self.rebuilt_index
    }
}

struct Inner {
    entries: Vec<KnowledgeEntry>,
    index: FlatL2Index,
}

pub struct KnowledgeStore {
    embedder: Arc<dyn Embedder>,
    paths: KnowledgePaths,
    report: LoadReport,
    // Held across persistence, so an add is fully on disk before the next starts.
    inner: Mutex<Inner>,
}

impl KnowledgeStore {
    /// Loads persisted state, or starts empty when nothing is on disk.
    ///
    /// An index whose dimension differs from the embedder's is a fatal
    /// configuration error. Mismatched entry/vector counts are repaired by
    /// truncating both to the common prefix.
    pub fn open(paths: KnowledgePaths, embedder: Arc<dyn Embedder>) -> KnowledgeResult<Self> {
        let dimension = embedder.dimension();
        let mut entries = load_entries(&paths.knowledge_base)?;
        let index_on_disk = paths.vector_index.exists();
        let mut index = if index_on_disk {
            FlatL2Index::load(&paths.vector_index)?
        } else {
            FlatL2Index::new(dimension)
        };

        if index.dimension() != dimension {
            return Err(KnowledgeError::DimensionMismatch {
                expected: dimension,
                found: index.dimension(),
            });
        }
        if let Some(bad) = entries.iter().find(|e| e.embedding.len() != dimension) {
            return Err(KnowledgeError::DimensionMismatch {
                expected: dimension,
                found: bad.embedding.len(),
            });
        }

        let mut report = LoadReport {
            entries_on_disk: entries.len(),
            vectors_on_disk: index.count(),
            ..Default::default()
        };

        if !index_on_disk && !entries.is_empty() {
            tracing::warn!(
                entries = entries.len(),
                path = %paths.vector_index.display(),
                "Vector index missing, rebuilding it from stored embeddings"
            );
            for entry in &entries {
                index.add(&entry.embedding)?;
            }
            report.rebuilt_index = true;
        } else if entries.len() != index.count() {
            let common = entries.len().min(index.count());
            tracing::warn!(
                entries = entries.len(),
                vectors = index.count(),
                keep = common,
                "Knowledge base and vector index are out of step, truncating both to the common prefix"
            );
            entries.truncate(common);
            index.truncate(common);
            report.truncated_to = Some(common);
        }

        if report.recovered() {
            save_entries(&paths.knowledge_base, &entries)?;
            index.save(&paths.vector_index)?;
        }

        tracing::info!(
            entries = entries.len(),
            dimension,
            "Knowledge store ready"
        );

        Ok(Self {
            embedder,
            paths,
            report,
            inner: Mutex::new(Inner { entries, index }),
        })
    }

    pub fn load_report(&self) -> &LoadReport {
        &self.report
    }

    pub fn paths(&self) -> &KnowledgePaths {
        &self.paths
    }

    /// Embeds `text`, appends it and persists both files before returning.
    pub async fn add(&self, text: &str) -> KnowledgeResult<()> {
        let embedding = self
            .embedder
            .embed(text)
            .await
            .map_err(KnowledgeError::Embedding)?;

        let mut inner = self.inner.lock().await;
        inner.index.add(&embedding)?;
        inner.entries.push(KnowledgeEntry {
            text: text.to_string(),
            embedding,
        });

        // Both files are written before the lock is released.
        let persisted: KnowledgeResult<()> = async {
            let json = entries_json(&self.paths.knowledge_base, &inner.entries)?;
            write_atomic(&self.paths.knowledge_base, &json).await?;
            write_atomic(&self.paths.vector_index, &inner.index.to_bytes()).await
        }
        .await;
        if let Err(e) = persisted {
            // Keep memory consistent with what the caller was told.
            let len = inner.entries.len() - 1;
            inner.entries.truncate(len);
            inner.index.truncate(len);
            return Err(e);
        }
        tracing::debug!(entries = inner.entries.len(), "Knowledge entry added");
        Ok(())
    }

    /// Up to `k` stored texts, nearest to `query` first. Never fails: an
    /// empty store or an embedding failure yields an empty list.
    pub async fn retrieve(&self, query: &str, k: usize) -> Vec<String> {
        let embedding = match self.embedder.embed(query).await {
            Ok(embedding) => embedding,
            Err(e) => {
                tracing::warn!(error = ?e, "Query embedding failed, continuing without context");
                return Vec::new();
            }
        };

        let inner = self.inner.lock().await;
        match inner.index.search(&embedding, k) {
            Ok(hits) => hits
                .into_iter()
                .filter_map(|(_, id)| inner.entries.get(id).map(|e| e.text.clone()))
                .collect(),
            Err(e) => {
                tracing::warn!(error = %e, "Vector search failed, continuing without context");
                Vec::new()
            }
        }
    }

    pub async fn entries(&self) -> Vec<KnowledgeEntry> {
        self.inner.lock().await.entries.clone()
    }

    /// `(entries, indexed vectors)`; the two are always equal.
    pub async fn counts(&self) -> (usize, usize) {
        let inner = self.inner.lock().await;
        (inner.entries.len(), inner.index.count())
    }
}

fn load_entries(path: &Path) -> KnowledgeResult<Vec<KnowledgeEntry>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let raw = fs::read_to_string(path).map_err(|source| KnowledgeError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| KnowledgeError::Json {
        path: path.to_path_buf(),
        source,
    })
}

fn entries_json(path: &Path, entries: &[KnowledgeEntry]) -> KnowledgeResult<Vec<u8>> {
    serde_json::to_vec_pretty(entries).map_err(|source| KnowledgeError::Json {
        path: path.to_path_buf(),
        source,
    })
}

fn save_entries(path: &Path, entries: &[KnowledgeEntry]) -> KnowledgeResult<()> {
    write_atomic_blocking(path, &entries_json(path, entries)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::MockEmbedder;
    use crate::embedding::HashingEmbedder;
    use tempfile::tempdir;

    fn store_in(dir: &Path, dimension: usize) -> KnowledgeStore {
        KnowledgeStore::open(
            KnowledgePaths::in_dir(dir),
            Arc::new(HashingEmbedder::new(dimension)),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn empty_store_retrieves_nothing() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path(), 16);
        assert!(store.retrieve("anything", 3).await.is_empty());
        assert_eq!(store.counts().await, (0, 0));
    }

    #[tokio::test]
    async fn added_text_is_retrievable_and_counts_stay_aligned() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path(), 64);
        let texts = [
            "I built a payments service in Go",
            "Kubernetes operators reconcile desired state",
            "React hooks replace class lifecycle methods",
            "Pandas dataframes are column oriented",
        ];
        for (n, text) in texts.iter().enumerate() {
            store.add(text).await.unwrap();
            assert_eq!(store.counts().await, (n + 1, n + 1));
            let hits = store.retrieve(text, 3).await;
            assert_eq!(hits.first().map(String::as_str), Some(*text));
        }
        assert_eq!(store.retrieve("React hooks", 10).await.len(), texts.len());
    }

    #[tokio::test]
    async fn adds_leave_the_runtime_free_for_other_tasks() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path(), 16);
        let ticks = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let ticker = tokio::spawn({
            let ticks = ticks.clone();
            async move {
                loop {
                    ticks.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                    tokio::task::yield_now().await;
                }
            }
        });

        for n in 0..5 {
            store.add(&format!("note number {n}")).await.unwrap();
        }

        // Single-threaded runtime: the ticker only ran if the adds yielded.
        assert!(ticks.load(std::sync::atomic::Ordering::SeqCst) > 0);
        ticker.abort();
        assert_eq!(store.counts().await, (5, 5));
    }

    #[tokio::test]
    async fn reload_preserves_entries() {
        let dir = tempdir().unwrap();
        {
            let store = store_in(dir.path(), 32);
            store.add("first note").await.unwrap();
            store.add("second note").await.unwrap();
        }
        let store = store_in(dir.path(), 32);
        assert_eq!(store.counts().await, (2, 2));
        assert!(!store.load_report().recovered());
        assert_eq!(store.retrieve("second note", 1).await, vec!["second note"]);
    }

    #[tokio::test]
    async fn count_mismatch_is_truncated_to_common_prefix() {
        let dir = tempdir().unwrap();
        let paths = KnowledgePaths::in_dir(dir.path());
        {
            let store = store_in(dir.path(), 8);
            store.add("one").await.unwrap();
            store.add("two").await.unwrap();
        }
        // Simulate a crash after the entry list was written but before the
        // index caught up: the index only knows the first entry.
        let mut index = FlatL2Index::load(&paths.vector_index).unwrap();
        index.truncate(1);
        index.save(&paths.vector_index).unwrap();

        let store = store_in(dir.path(), 8);
        assert_eq!(store.load_report().truncated_to, Some(1));
        assert_eq!(store.counts().await, (1, 1));
        let entries = store.entries().await;
        assert_eq!(entries[0].text, "one");

        // The repair is persisted.
        let again = store_in(dir.path(), 8);
        assert!(!again.load_report().recovered());
        assert_eq!(again.counts().await, (1, 1));
    }

    #[tokio::test]
    async fn missing_index_is_rebuilt_from_embeddings() {
        let dir = tempdir().unwrap();
        let paths = KnowledgePaths::in_dir(dir.path());
        {
            let store = store_in(dir.path(), 8);
            store.add("alpha").await.unwrap();
            store.add("beta").await.unwrap();
        }
        std::fs::remove_file(&paths.vector_index).unwrap();

        let store = store_in(dir.path(), 8);
        assert!(store.load_report().rebuilt_index);
        assert_eq!(store.counts().await, (2, 2));
        assert!(paths.vector_index.exists());
    }

    #[tokio::test]
    async fn dimension_mismatch_is_fatal() {
        let dir = tempdir().unwrap();
        {
            let store = store_in(dir.path(), 8);
            store.add("alpha").await.unwrap();
        }
        let result = KnowledgeStore::open(
            KnowledgePaths::in_dir(dir.path()),
            Arc::new(HashingEmbedder::new(16)),
        );
        assert!(matches!(
            result,
            Err(KnowledgeError::DimensionMismatch {
                expected: 16,
                found: 8
            })
        ));
    }

    #[tokio::test]
    async fn embedding_failure_degrades_retrieval_but_fails_add() {
        let dir = tempdir().unwrap();
        let mut embedder = MockEmbedder::new();
        embedder.expect_dimension().return_const(4usize);
        embedder
            .expect_embed()
            .returning(|_| Err(anyhow::anyhow!("model offline")));
        let store =
            KnowledgeStore::open(KnowledgePaths::in_dir(dir.path()), Arc::new(embedder)).unwrap();

        assert!(store.retrieve("query", 3).await.is_empty());
        assert!(matches!(
            store.add("text").await,
            Err(KnowledgeError::Embedding(_))
        ));
        assert_eq!(store.counts().await, (0, 0));
    }
}
