//! Context assembly: turn a query plus scoping constraints into a bounded,
//! ranked list of chunks for a language-model prompt.
//!
//! The algorithm operates entirely through the [`ChunkStore`],
//! [`VectorIndex`], and [`QueryEmbedder`] traits. The calling application
//! builds a [`ContextRequest`], picks its collaborators, and passes them in
//! as [`Backends`].
//!
//! # Scoping
//!
//! First match wins:
//!
//! 1. **Explicit**: `document_ids` is non-empty. Candidates are the chunks
//!    of those documents only; filters are ignored.
//! 2. **Filtered**: a category or date bound is set. Candidates are the
//!    chunks whose document matches every filter.
//! 3. **Unfiltered**: candidates are the whole store.
//!
//! # Ranking
//!
//! 1. Embed the query once.
//! 2. Ask the index for the top `k` hits inside the candidate scope.
//! 3. Drop hits outside the scope or under `min_score`.
//! 4. Sort by score (desc), then chunk id (asc).
//! 5. Truncate to `k` and attach document metadata.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::embedding::QueryEmbedder;
use crate::error::{ContextError, Upstream};
use crate::models::{Chunk, ChunkId, ContextFilters};
use crate::store::{rank_hits, CandidateScope, ChunkStore, ScoredChunk, VectorIndex};

/// Result bound used when a request does not specify `k`.
pub const DEFAULT_K: usize = 5;
/// Hard upper bound on `k`; larger requests are clamped.
pub const HARD_MAX_K: usize = 20;

/// Retrieval tuning parameters, decoupled from application config.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalParams {
    pub default_k: usize,
    pub max_k: usize,
    /// Hits scoring below this similarity are dropped even when under `k`.
    pub min_score: Option<f32>,
}

impl Default for RetrievalParams {
    fn default() -> Self {
        Self {
            default_k: DEFAULT_K,
            max_k: HARD_MAX_K,
            min_score: None,
        }
    }
}

/// All inputs for a single assembly call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContextRequest {
    pub query: String,
    /// Explicit document selection. Takes priority over `filters`.
    pub document_ids: Vec<String>,
    pub filters: ContextFilters,
    /// Requested result bound; `None` means [`RetrievalParams::default_k`].
    pub k: Option<i64>,
}

impl ContextRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }

    pub fn with_documents<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.document_ids = ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_filters(mut self, filters: ContextFilters) -> Self {
        self.filters = filters;
        self
    }

    pub fn with_k(mut self, k: i64) -> Self {
        self.k = Some(k);
        self
    }
}

/// Which scoping rule produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeMode {
    Explicit,
    Filtered,
    Unfiltered,
}

impl ScopeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScopeMode::Explicit => "explicit",
            ScopeMode::Filtered => "filtered",
            ScopeMode::Unfiltered => "unfiltered",
        }
    }
}

/// Source metadata attached to each returned chunk.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChunkMetadata {
    /// `"<message_id>-<chunk_index>"`.
    pub id: String,
    pub message_id: String,
    pub title: String,
    pub category: Option<String>,
    pub received_at: DateTime<Utc>,
    pub chunk_index: i64,
    pub score: f32,
}

/// One chunk of assembled context.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextChunk {
    pub page_content: String,
    pub metadata: ChunkMetadata,
}

impl ContextChunk {
    fn from_hit(chunk: &Chunk, score: f32) -> Self {
        Self {
            page_content: chunk.text.clone(),
            metadata: ChunkMetadata {
                id: chunk.id.to_string(),
                message_id: chunk.id.document_id.clone(),
                title: chunk.title.clone(),
                category: chunk.category.clone(),
                received_at: chunk.received_at,
                chunk_index: chunk.id.index,
                score,
            },
        }
    }
}

/// Ordered, bounded context for one request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextResult {
    pub mode: ScopeMode,
    pub chunks: Vec<ContextChunk>,
}

impl ContextResult {
    fn empty(mode: ScopeMode) -> Self {
        Self {
            mode,
            chunks: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

/// The collaborators an assembly reads from.
#[derive(Clone, Copy)]
pub struct Backends<'a> {
    pub store: &'a dyn ChunkStore,
    pub index: &'a dyn VectorIndex,
    pub embedder: &'a dyn QueryEmbedder,
}

/// Check the query and resolve the effective result bound.
pub fn effective_k(req: &ContextRequest, params: &RetrievalParams) -> Result<usize, ContextError> {
    if req.query.trim().is_empty() {
        return Err(ContextError::invalid("query must not be empty"));
    }
    let max_k = params.max_k.clamp(1, HARD_MAX_K);
    match req.k {
        None => Ok(params.default_k.clamp(1, max_k)),
        Some(k) if k <= 0 => Err(ContextError::invalid(format!(
            "k must be a positive integer, got {}",
            k
        ))),
        Some(k) => Ok(usize::try_from(k).unwrap_or(usize::MAX).min(max_k)),
    }
}

/// Non-blank, de-duplicated explicit document ids in request order.
fn explicit_ids(ids: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    ids.iter()
        .map(|id| id.trim())
        .filter(|id| !id.is_empty() && seen.insert(*id))
        .map(str::to_string)
        .collect()
}

/// Assemble context for one request.
///
/// This is the function every frontend (CLI, HTTP) delegates to. It never
/// mutates the store or index. An empty candidate set returns an empty
/// result without touching the embedder; collaborator failures surface as
/// [`ContextError::UpstreamUnavailable`].
pub async fn assemble_context(
    backends: Backends<'_>,
    params: &RetrievalParams,
    req: &ContextRequest,
) -> Result<ContextResult, ContextError> {
    let k = effective_k(req, params)?;
    let document_ids = explicit_ids(&req.document_ids);

    let (mode, candidates) = if !document_ids.is_empty() {
        let wanted: HashSet<&str> = document_ids.iter().map(String::as_str).collect();
        let chunks = backends
            .store
            .chunks_for_documents(&document_ids)
            .await
            .map_err(|e| ContextError::upstream(Upstream::Store, e))?;
        let candidates = index_by_id(chunks, |c| wanted.contains(c.id.document_id.as_str()));
        (ScopeMode::Explicit, Some(candidates))
    } else if !req.filters.is_empty() {
        let chunks = backends
            .store
            .chunks_matching(&req.filters)
            .await
            .map_err(|e| ContextError::upstream(Upstream::Store, e))?;
        let candidates = index_by_id(chunks, |c| req.filters.matches(c));
        (ScopeMode::Filtered, Some(candidates))
    } else {
        (ScopeMode::Unfiltered, None)
    };

    if let Some(candidates) = &candidates {
        if candidates.is_empty() {
            tracing::debug!(mode = ?mode, "no candidate chunks; returning empty context");
            return Ok(ContextResult::empty(mode));
        }
    }

    let scope = match &candidates {
        Some(map) => CandidateScope::Chunks(map.keys().cloned().collect()),
        None => CandidateScope::All,
    };

    let query_vec = backends
        .embedder
        .embed(req.query.trim())
        .await
        .map_err(|e| ContextError::upstream(Upstream::Embedder, e))?;

    let hits = backends
        .index
        .search(&query_vec, &scope, k)
        .await
        .map_err(|e| ContextError::upstream(Upstream::Index, e))?;
    let hits = select_hits(hits, &scope, params.min_score, k);

    let chunks = match candidates {
        Some(map) => hydrate(&hits, &map),
        None => {
            let ids: Vec<ChunkId> = hits.iter().map(|h| h.id.clone()).collect();
            let found = backends
                .store
                .get_chunks(&ids)
                .await
                .map_err(|e| ContextError::upstream(Upstream::Store, e))?;
            let by_id: HashMap<ChunkId, Chunk> =
                found.into_iter().map(|c| (c.id.clone(), c)).collect();
            hydrate(&hits, &by_id)
        }
    };

    let scope_size = match &scope {
        CandidateScope::All => None,
        CandidateScope::Chunks(ids) => Some(ids.len()),
    };
    tracing::debug!(
        mode = ?mode,
        k,
        scope_size = ?scope_size,
        returned = chunks.len(),
        "assembled context"
    );

    Ok(ContextResult { mode, chunks })
}

fn index_by_id<F>(chunks: Vec<Chunk>, keep: F) -> BTreeMap<ChunkId, Chunk>
where
    F: Fn(&Chunk) -> bool,
{
    chunks
        .into_iter()
        .filter(|c| keep(c))
        .map(|c| (c.id.clone(), c))
        .collect()
}

/// Apply scope and threshold, rank deterministically, dedupe, and bound.
fn select_hits(
    mut hits: Vec<ScoredChunk>,
    scope: &CandidateScope,
    min_score: Option<f32>,
    k: usize,
) -> Vec<ScoredChunk> {
    hits.retain(|h| {
        !h.score.is_nan() && scope.allows(&h.id) && min_score.map_or(true, |m| h.score >= m)
    });
    rank_hits(&mut hits, usize::MAX);
    let mut seen = HashSet::new();
    hits.retain(|h| seen.insert(h.id.clone()));
    hits.truncate(k);
    hits
}

/// Attach chunk text and metadata to ranked hits. Hits whose chunk is
/// unknown (index ahead of the store) are skipped.
fn hydrate<M>(hits: &[ScoredChunk], chunks: &M) -> Vec<ContextChunk>
where
    M: ChunkLookup,
{
    hits.iter()
        .filter_map(|h| chunks.lookup(&h.id).map(|c| ContextChunk::from_hit(c, h.score)))
        .collect()
}

trait ChunkLookup {
    fn lookup(&self, id: &ChunkId) -> Option<&Chunk>;
}

impl ChunkLookup for BTreeMap<ChunkId, Chunk> {
    fn lookup(&self, id: &ChunkId) -> Option<&Chunk> {
        self.get(id)
    }
}

impl ChunkLookup for HashMap<ChunkId, Chunk> {
    fn lookup(&self, id: &ChunkId) -> Option<&Chunk> {
        self.get(id)
    }
}
