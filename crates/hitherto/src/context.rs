//! Context service wiring and the `hitherto context` command.
//!
//! [`ContextService`] owns the collaborators (SQLite store and index plus
//! the configured embedder) and delegates every assembly to
//! [`hitherto_core::context::assemble_context`]. Both the CLI and the HTTP
//! server go through it.

use anyhow::{bail, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use hitherto_core::context::{
    assemble_context, Backends, ContextRequest, ContextResult, RetrievalParams,
};
use hitherto_core::embedding::QueryEmbedder;
use hitherto_core::error::ContextError;
use hitherto_core::models::{parse_filter_date, ContextFilters, DateRange};
use hitherto_core::store::{ChunkStore, VectorIndex};

use crate::config::Config;
use crate::db;
use crate::embedding::create_embedder;
use crate::sqlite_store::SqliteStore;

/// Shared, cheaply clonable handle to the retrieval collaborators.
#[derive(Clone)]
pub struct ContextService {
    store: Arc<dyn ChunkStore>,
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn QueryEmbedder>,
    params: RetrievalParams,
}

impl ContextService {
    pub fn new(
        store: Arc<dyn ChunkStore>,
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn QueryEmbedder>,
        params: RetrievalParams,
    ) -> Self {
        Self {
            store,
            index,
            embedder,
            params,
        }
    }

    /// Open the configured database and build the configured embedder.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        let sqlite = Arc::new(SqliteStore::new(pool));
        let embedder = create_embedder(&config.embedding)?;
        tracing::info!(
            db = %config.db.path.display(),
            embedder = embedder.model_name(),
            "context service ready"
        );
        Ok(Self::new(
            sqlite.clone(),
            sqlite,
            embedder,
            config.retrieval.params(),
        ))
    }

    fn backends(&self) -> Backends<'_> {
        Backends {
            store: self.store.as_ref(),
            index: self.index.as_ref(),
            embedder: self.embedder.as_ref(),
        }
    }

    pub async fn assemble(&self, req: &ContextRequest) -> Result<ContextResult, ContextError> {
        assemble_context(self.backends(), &self.params, req).await
    }

    /// Like [`assemble`](Self::assemble), but resolves to
    /// [`ContextError::Cancelled`] as soon as `cancel` fires. The in-progress
    /// embedder or index call is dropped at its current `.await`.
    pub async fn assemble_until_cancelled(
        &self,
        req: &ContextRequest,
        cancel: &CancellationToken,
    ) -> Result<ContextResult, ContextError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ContextError::Cancelled),
            result = self.assemble(req) => result,
        }
    }
}

fn parse_date_arg(flag: &str, value: Option<&str>) -> Result<Option<chrono::NaiveDate>> {
    match value {
        None => Ok(None),
        Some(raw) => match parse_filter_date(raw) {
            Some(date) => Ok(Some(date)),
            None => bail!("{} must be YYYY-MM-DD or RFC 3339, got '{}'", flag, raw),
        },
    }
}

/// CLI arguments for `hitherto context`.
#[derive(Debug, Default)]
pub struct ContextArgs {
    pub query: String,
    pub categories: Vec<String>,
    pub since: Option<String>,
    pub until: Option<String>,
    pub documents: Vec<String>,
    pub k: Option<i64>,
}

impl ContextArgs {
    pub fn to_request(&self) -> Result<ContextRequest> {
        let range = DateRange::new(
            parse_date_arg("--since", self.since.as_deref())?,
            parse_date_arg("--until", self.until.as_deref())?,
        );
        let mut req = ContextRequest::new(self.query.clone())
            .with_documents(self.documents.iter().cloned())
            .with_filters(ContextFilters::new(&self.categories, range));
        req.k = self.k;
        Ok(req)
    }
}

pub async fn run_context(config: &Config, args: &ContextArgs) -> Result<()> {
    let req = args.to_request()?;
    let service = ContextService::from_config(config).await?;
    let result = service.assemble(&req).await?;

    println!("Mode: {}", result.mode.as_str());
    if result.is_empty() {
        println!("No context.");
        return Ok(());
    }

    for (i, chunk) in result.chunks.iter().enumerate() {
        let meta = &chunk.metadata;
        println!("{}. [{:.2}] {} / {}", i + 1, meta.score, meta.id, meta.title);
        println!("    received: {}", meta.received_at.format("%Y-%m-%d"));
        if let Some(category) = &meta.category {
            println!("    category: {}", category);
        }
        println!(
            "    excerpt: \"{}\"",
            chunk.page_content.replace('\n', " ").trim()
        );
        println!();
    }

    Ok(())
}
