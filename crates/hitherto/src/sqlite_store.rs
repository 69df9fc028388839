//! SQLite-backed [`ChunkStore`] and [`VectorIndex`].
//!
//! Reads the `newsletters`, `chunks`, and `chunk_vectors` tables written by
//! the ingestion pipeline (see [`crate::migrate`]). Nothing here writes.
//! Vector search is a brute-force cosine scan over the stored BLOBs,
//! restricted to the candidate scope before scoring.
//!
//! Date bounds are applied in SQL. Categories are compared in Rust with
//! [`ContextFilters::matches_category`], since SQLite's `lower`/`trim` only
//! handle ASCII.

use std::collections::BTreeSet;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::DateTime;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

use hitherto_core::embedding::{blob_to_vec, cosine_similarity};
use hitherto_core::models::{Chunk, ChunkId, ContextFilters};
use hitherto_core::store::{rank_hits, CandidateScope, ChunkStore, ScoredChunk, VectorIndex};

const CHUNK_SELECT: &str = r#"
    SELECT c.document_id, c.chunk_index, c.text, n.title, n.category, n.received_at
    FROM chunks c
    JOIN newsletters n ON n.message_id = c.document_id
"#;

/// SQLite implementation of the collaborator traits.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn fetch_chunks(&self, mut qb: QueryBuilder<'_, Sqlite>) -> Result<Vec<Chunk>> {
        qb.push(" ORDER BY c.document_id ASC, c.chunk_index ASC");
        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(row_to_chunk).collect()
    }
}

fn row_to_chunk(row: &SqliteRow) -> Result<Chunk> {
    let document_id: String = row.try_get("document_id")?;
    let index: i64 = row.try_get("chunk_index")?;
    let received_at: i64 = row.try_get("received_at")?;
    let received_at = DateTime::from_timestamp(received_at, 0).ok_or_else(|| {
        anyhow!(
            "newsletter {} has out-of-range received_at {}",
            document_id,
            received_at
        )
    })?;
    Ok(Chunk {
        id: ChunkId::new(document_id, index),
        text: row.try_get("text")?,
        title: row.try_get("title")?,
        category: row.try_get("category")?,
        received_at,
    })
}

#[async_trait]
impl ChunkStore for SqliteStore {
    async fn chunks_for_documents(&self, document_ids: &[String]) -> Result<Vec<Chunk>> {
        if document_ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut qb = QueryBuilder::new(CHUNK_SELECT);
        qb.push(" WHERE c.document_id IN (");
        let mut sep = qb.separated(", ");
        for id in document_ids {
            sep.push_bind(id.as_str());
        }
        sep.push_unseparated(")");
        self.fetch_chunks(qb).await
    }

    async fn chunks_matching(&self, filters: &ContextFilters) -> Result<Vec<Chunk>> {
        let mut qb = QueryBuilder::new(CHUNK_SELECT);
        qb.push(" WHERE 1 = 1");
        if !filters.categories().is_empty() {
            qb.push(" AND n.category IS NOT NULL");
        }
        if let Some(lo) = filters.date_range.lower_bound() {
            qb.push(" AND n.received_at >= ").push_bind(lo.timestamp());
        }
        if let Some(hi) = filters.date_range.upper_bound() {
            qb.push(" AND n.received_at < ").push_bind(hi.timestamp());
        }

        let mut chunks = self.fetch_chunks(qb).await?;
        chunks.retain(|c| filters.matches_category(c.category.as_deref()));
        Ok(chunks)
    }

    async fn get_chunks(&self, ids: &[ChunkId]) -> Result<Vec<Chunk>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut qb = QueryBuilder::new(CHUNK_SELECT);
        qb.push(" WHERE ");
        for (i, id) in ids.iter().enumerate() {
            if i > 0 {
                qb.push(" OR ");
            }
            qb.push("(c.document_id = ")
                .push_bind(id.document_id.as_str())
                .push(" AND c.chunk_index = ")
                .push_bind(id.index)
                .push(")");
        }
        self.fetch_chunks(qb).await
    }
}

#[async_trait]
impl VectorIndex for SqliteStore {
    async fn search(
        &self,
        query_vec: &[f32],
        scope: &CandidateScope,
        limit: usize,
    ) -> Result<Vec<ScoredChunk>> {
        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT document_id, chunk_index, embedding FROM chunk_vectors");
        if let CandidateScope::Chunks(ids) = scope {
            if ids.is_empty() {
                return Ok(Vec::new());
            }
            let documents: BTreeSet<&str> = ids.iter().map(|id| id.document_id.as_str()).collect();
            qb.push(" WHERE document_id IN (");
            let mut sep = qb.separated(", ");
            for document_id in documents {
                sep.push_bind(document_id);
            }
            sep.push_unseparated(")");
        }
        let rows = qb.build().fetch_all(&self.pool).await?;

        let mut hits = Vec::new();
        for row in &rows {
            let id = ChunkId::new(
                row.try_get::<String, _>("document_id")?,
                row.try_get::<i64, _>("chunk_index")?,
            );
            if !scope.allows(&id) {
                continue;
            }
            let blob: Vec<u8> = row.try_get("embedding")?;
            hits.push(ScoredChunk {
                score: cosine_similarity(query_vec, &blob_to_vec(&blob)),
                id,
            });
        }

        rank_hits(&mut hits, limit);
        Ok(hits)
    }
}
