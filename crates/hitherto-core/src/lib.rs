//! # hitherto core
//!
//! Context retrieval logic for the hitherto research dashboard: chunk model,
//! scoping filters, collaborator traits, context assembly, and client-side
//! selection state.
//!
//! This crate contains no tokio, sqlx, or network code. Concrete stores and
//! embedders are supplied by the `hitherto` app crate (or by tests) through
//! the traits in [`store`] and [`embedding`].

pub mod context;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod models;
pub mod selection;
pub mod store;
