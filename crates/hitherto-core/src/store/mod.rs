//! Collaborator traits for chunk lookup and similarity search.
//!
//! The context assembly pipeline reaches storage only through these two
//! traits, so any backend (SQLite, in-memory, an external vector database)
//! can serve it. Both are read-only from the core's point of view.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use std::collections::BTreeSet;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Chunk, ChunkId, ContextFilters};

/// Which chunks a similarity search may return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CandidateScope {
    /// Any chunk in the index.
    All,
    /// Only the listed chunks.
    Chunks(BTreeSet<ChunkId>),
}

impl CandidateScope {
    pub fn allows(&self, id: &ChunkId) -> bool {
        match self {
            CandidateScope::All => true,
            CandidateScope::Chunks(ids) => ids.contains(id),
        }
    }
}

/// One similarity hit returned by a [`VectorIndex`].
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub id: ChunkId,
    /// Cosine similarity to the query vector.
    pub score: f32,
}

/// Read access to extracted newsletter chunks.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`chunks_for_documents`](ChunkStore::chunks_for_documents) | All chunks of the listed documents |
/// | [`chunks_matching`](ChunkStore::chunks_matching) | All chunks whose document matches the filters |
/// | [`get_chunks`](ChunkStore::get_chunks) | Hydrate chunks by id |
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Chunks belonging to any of `document_ids`. Unknown ids, or documents
    /// with no extracted chunks yet, contribute nothing.
    async fn chunks_for_documents(&self, document_ids: &[String]) -> Result<Vec<Chunk>>;

    /// Chunks whose owning document matches every supplied filter.
    async fn chunks_matching(&self, filters: &ContextFilters) -> Result<Vec<Chunk>>;

    /// Chunks by id. Ids the store does not know are skipped.
    async fn get_chunks(&self, ids: &[ChunkId]) -> Result<Vec<Chunk>>;
}

/// Nearest-neighbour search over chunk embeddings.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Return up to `limit` chunks inside `scope`, most similar first.
    async fn search(
        &self,
        query_vec: &[f32],
        scope: &CandidateScope,
        limit: usize,
    ) -> Result<Vec<ScoredChunk>>;
}

/// Sort hits by score (desc), then chunk id (asc), and keep `limit`.
///
/// Shared by the bundled index implementations so identical inputs always
/// produce identical orderings.
pub fn rank_hits(hits: &mut Vec<ScoredChunk>, limit: usize) {
    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
    hits.truncate(limit);
}
