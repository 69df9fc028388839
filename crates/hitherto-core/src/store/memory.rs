//! In-memory [`ChunkStore`] and [`VectorIndex`] for tests and embedding.
//!
//! Chunks live in a `BTreeMap` keyed by [`ChunkId`] behind `std::sync::RwLock`,
//! so iteration order is already the deterministic tie-break order. Vector
//! search is brute-force cosine similarity over the stored vectors.

use std::collections::{BTreeMap, HashSet};
use std::sync::{PoisonError, RwLock};

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::models::{Chunk, ChunkId, ContextFilters};

use super::{rank_hits, CandidateScope, ChunkStore, ScoredChunk, VectorIndex};

struct StoredChunk {
    chunk: Chunk,
    vector: Option<Vec<f32>>,
}

/// In-memory chunk store and vector index.
pub struct InMemoryStore {
    chunks: RwLock<BTreeMap<ChunkId, StoredChunk>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            chunks: RwLock::new(BTreeMap::new()),
        }
    }

    /// Insert or replace a chunk, optionally with its embedding.
    pub fn insert(&self, chunk: Chunk, vector: Option<Vec<f32>>) {
        let mut chunks = self.chunks.write().unwrap_or_else(PoisonError::into_inner);
        chunks.insert(chunk.id.clone(), StoredChunk { chunk, vector });
    }

    fn collect<F>(&self, mut keep: F) -> Result<Vec<Chunk>>
    where
        F: FnMut(&Chunk) -> bool,
    {
        let chunks = self
            .chunks
            .read()
            .map_err(|_| anyhow!("in-memory chunk store lock poisoned"))?;
        Ok(chunks
            .values()
            .filter(|sc| keep(&sc.chunk))
            .map(|sc| sc.chunk.clone())
            .collect())
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChunkStore for InMemoryStore {
    async fn chunks_for_documents(&self, document_ids: &[String]) -> Result<Vec<Chunk>> {
        let wanted: HashSet<&str> = document_ids.iter().map(String::as_str).collect();
        self.collect(|c| wanted.contains(c.id.document_id.as_str()))
    }

    async fn chunks_matching(&self, filters: &ContextFilters) -> Result<Vec<Chunk>> {
        self.collect(|c| filters.matches(c))
    }

    async fn get_chunks(&self, ids: &[ChunkId]) -> Result<Vec<Chunk>> {
        let chunks = self
            .chunks
            .read()
            .map_err(|_| anyhow!("in-memory chunk store lock poisoned"))?;
        Ok(ids
            .iter()
            .filter_map(|id| chunks.get(id).map(|sc| sc.chunk.clone()))
            .collect())
    }
}

#[async_trait]
impl VectorIndex for InMemoryStore {
    async fn search(
        &self,
        query_vec: &[f32],
        scope: &CandidateScope,
        limit: usize,
    ) -> Result<Vec<ScoredChunk>> {
        let chunks = self
            .chunks
            .read()
            .map_err(|_| anyhow!("in-memory chunk store lock poisoned"))?;
        let mut hits: Vec<ScoredChunk> = chunks
            .iter()
            .filter(|(id, _)| scope.allows(id))
            .filter_map(|(id, sc)| {
                sc.vector.as_ref().map(|v| ScoredChunk {
                    id: id.clone(),
                    score: cosine_similarity(query_vec, v),
                })
            })
            .collect();
        rank_hits(&mut hits, limit);
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DateRange;
    use chrono::{NaiveDate, TimeZone, Utc};

    fn chunk(doc: &str, index: i64, category: &str, day: u32) -> Chunk {
        Chunk {
            id: ChunkId::new(doc, index),
            text: format!("{doc} chunk {index}"),
            title: format!("{doc} title"),
            category: Some(category.to_string()),
            received_at: Utc.with_ymd_and_hms(2024, 1, day, 9, 0, 0).unwrap(),
        }
    }

    fn store() -> InMemoryStore {
        let store = InMemoryStore::new();
        store.insert(chunk("D1", 0, "econ", 5), Some(vec![1.0, 0.0]));
        store.insert(chunk("D1", 1, "econ", 5), Some(vec![0.0, 1.0]));
        store.insert(chunk("D2", 0, "tech", 20), Some(vec![1.0, 1.0]));
        store.insert(chunk("D3", 0, "tech", 25), None);
        store
    }

    #[tokio::test]
    async fn test_chunks_for_documents() {
        let store = store();
        let chunks = store
            .chunks_for_documents(&["D1".to_string(), "missing".to_string()])
            .await
            .unwrap();
        let ids: Vec<String> = chunks.iter().map(|c| c.id.to_string()).collect();
        assert_eq!(ids, vec!["D1-0", "D1-1"]);
    }

    #[tokio::test]
    async fn test_chunks_matching_date_window() {
        let store = store();
        let filters = ContextFilters::new(
            ["tech"],
            DateRange::new(None, NaiveDate::from_ymd_opt(2024, 1, 20)),
        );
        let chunks = store.chunks_matching(&filters).await.unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].id, ChunkId::new("D2", 0));
    }

    #[tokio::test]
    async fn test_search_respects_scope_and_skips_unembedded() {
        let store = store();
        let all = store
            .search(&[1.0, 0.0], &CandidateScope::All, 10)
            .await
            .unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].id, ChunkId::new("D1", 0));

        let scope = CandidateScope::Chunks([ChunkId::new("D1", 1)].into_iter().collect());
        let scoped = store.search(&[1.0, 0.0], &scope, 10).await.unwrap();
        assert_eq!(scoped.len(), 1);
        assert_eq!(scoped[0].id, ChunkId::new("D1", 1));
    }
}
