//! # hitherto
//!
//! Context retrieval service for the hitherto newsletter research dashboard.
//!
//! Newsletters are ingested and chunked elsewhere; this crate reads the
//! resulting chunks and vectors from SQLite and assembles a bounded, ranked
//! context for the dashboard's language-model calls.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────────┐   ┌───────────┐
//! │  Dashboard  │──▶│  POST /context   │──▶│  SQLite   │
//! │ (selection) │   │ ContextService   │   │ chunks+vec│
//! └─────────────┘   └────────┬─────────┘   └───────────┘
//!                            │
//!                            ▼
//!                   ┌──────────────────┐
//!                   │ Query embedder   │
//!                   │ OpenAI/Ollama/   │
//!                   │ local MiniLM     │
//!                   └──────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema creation |
//! | [`sqlite_store`] | SQLite chunk store and vector index |
//! | [`embedding`] | Query embedder providers |
//! | [`context`] | Context service and `context` command |
//! | [`inflight`] | Per-session request supersession |
//! | [`server`] | HTTP server |

pub mod config;
pub mod context;
pub mod db;
pub mod embedding;
pub mod inflight;
pub mod migrate;
pub mod server;
pub mod sqlite_store;
