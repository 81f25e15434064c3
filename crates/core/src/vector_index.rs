//! Exact nearest-neighbour index over fixed-length embeddings.
//!
//! Vectors are identified by insertion position. Search is brute-force
//! squared-L2, which is plenty for a knowledge base of interview transcripts.

use crate::error::{KnowledgeError, KnowledgeResult};
use crate::persist::write_atomic_blocking;
use std::fs;
use std::path::Path;

const MAGIC: &[u8; 4] = b"GYVI";
const FORMAT_VERSION: u32 = 1;
const HEADER_LEN: usize = 4 + 4 + 4 + 8;

#[derive(Debug, Clone, PartialEq)]
pub struct FlatL2Index {
    dimension: usize,
    // Row-major, `count() * dimension` floats.
    vectors: Vec<f32>,
}

impl FlatL2Index {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            vectors: Vec::new(),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn count(&self) -> usize {
        if self.dimension == 0 {
            0
        } else {
            self.vectors.len() / self.dimension
        }
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Appends `vector`; its id is the previous `count()`.
    pub fn add(&mut self, vector: &[f32]) -> KnowledgeResult<usize> {
        self.check_dimension(vector)?;
        let id = self.count();
        self.vectors.extend_from_slice(vector);
        Ok(id)
    }

    /// Up to `k` `(distance, id)` pairs, nearest first. Equal distances are
    /// ordered by id.
    pub fn search(&self, query: &[f32], k: usize) -> KnowledgeResult<Vec<(f32, usize)>> {
        self.check_dimension(query)?;
        if k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }
        let mut hits: Vec<(f32, usize)> = self
            .vectors
            .chunks_exact(self.dimension)
            .enumerate()
            .map(|(id, row)| (squared_l2(row, query), id))
            .collect();
        hits.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        hits.truncate(k);
        Ok(hits)
    }

    /// Drops every vector from position `len` onwards.
    pub fn truncate(&mut self, len: usize) {
        self.vectors.truncate(len * self.dimension);
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.vectors.len() * 4);
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        out.extend_from_slice(&(self.dimension as u32).to_le_bytes());
        out.extend_from_slice(&(self.count() as u64).to_le_bytes());
        for value in &self.vectors {
            out.extend_from_slice(&value.to_le_bytes());
        }
        out
    }

    pub fn from_bytes(bytes: &[u8], path: &Path) -> KnowledgeResult<Self> {
        let corrupt = |reason: String| KnowledgeError::CorruptIndex {
            path: path.to_path_buf(),
            reason,
        };
        if bytes.len() < HEADER_LEN || &bytes[..4] != MAGIC {
            return Err(corrupt("missing index header".to_string()));
        }
        let version = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        if version != FORMAT_VERSION {
            return Err(corrupt(format!("unsupported format version {version}")));
        }
        let dimension = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize;
        let mut count_bytes = [0u8; 8];
        count_bytes.copy_from_slice(&bytes[12..20]);
        let count = u64::from_le_bytes(count_bytes) as usize;

        let body = &bytes[HEADER_LEN..];
        let expected = count
            .checked_mul(dimension)
            .and_then(|n| n.checked_mul(4))
            .ok_or_else(|| corrupt("vector count overflows".to_string()))?;
        if body.len() != expected {
            return Err(corrupt(format!(
                "expected {expected} bytes of vectors, found {}",
                body.len()
            )));
        }
        let vectors = body
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        Ok(Self { dimension, vectors })
    }

    pub fn save(&self, path: &Path) -> KnowledgeResult<()> {
        write_atomic_blocking(path, &self.to_bytes())
    }

    pub fn load(path: &Path) -> KnowledgeResult<Self> {
        let bytes = fs::read(path).map_err(|source| KnowledgeError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_bytes(&bytes, path)
    }

    fn check_dimension(&self, vector: &[f32]) -> KnowledgeResult<()> {
        if vector.len() != self.dimension {
            return Err(KnowledgeError::DimensionMismatch {
                expected: self.dimension,
                found: vector.len(),
            });
        }
        Ok(())
    }
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn search_orders_by_ascending_distance() {
        let mut index = FlatL2Index::new(2);
        index.add(&[0.0, 0.0]).unwrap();
        index.add(&[5.0, 5.0]).unwrap();
        index.add(&[1.0, 0.0]).unwrap();

        let hits = index.search(&[0.9, 0.0], 2).unwrap();
        assert_eq!(hits.iter().map(|h| h.1).collect::<Vec<_>>(), vec![2, 0]);
        assert!(hits[0].0 <= hits[1].0);
    }

    #[test]
    fn k_larger_than_count_returns_everything() {
        let mut index = FlatL2Index::new(1);
        index.add(&[1.0]).unwrap();
        assert_eq!(index.search(&[0.0], 10).unwrap().len(), 1);
        assert!(FlatL2Index::new(1).search(&[0.0], 3).unwrap().is_empty());
    }

    #[test]
    fn rejects_wrong_dimension() {
        let mut index = FlatL2Index::new(3);
        let err = index.add(&[1.0, 2.0]).unwrap_err();
        assert!(matches!(
            err,
            KnowledgeError::DimensionMismatch {
                expected: 3,
                found: 2
            }
        ));
    }

    #[test]
    fn persists_and_reloads() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("index.idx");
        let mut index = FlatL2Index::new(2);
        index.add(&[0.5, -1.5]).unwrap();
        index.add(&[3.0, 4.0]).unwrap();
        index.save(&path).unwrap();

        let loaded = FlatL2Index::load(&path).unwrap();
        assert_eq!(loaded, index);
        assert_eq!(loaded.count(), 2);
    }

    #[test]
    fn truncated_file_is_reported_as_corrupt() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("index.idx");
        let mut index = FlatL2Index::new(2);
        index.add(&[1.0, 2.0]).unwrap();
        let bytes = index.to_bytes();
        std::fs::write(&path, &bytes[..bytes.len() - 2]).unwrap();

        assert!(matches!(
            FlatL2Index::load(&path),
            Err(KnowledgeError::CorruptIndex { .. })
        ));
    }

    #[test]
    fn truncate_keeps_prefix() {
        let mut index = FlatL2Index::new(1);
        for v in 0..5 {
            index.add(&[v as f32]).unwrap();
        }
        index.truncate(2);
        assert_eq!(index.count(), 2);
        assert_eq!(index.search(&[4.0], 1).unwrap()[0].1, 1);
    }
}
