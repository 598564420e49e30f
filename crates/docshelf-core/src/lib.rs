//! # docshelf core
//!
//! Backend-agnostic logic for docshelf: data models, the parent/child
//! chunker, the embedding and storage traits, the retriever, relevance
//! grading, and the tier-chain abstraction shared by TOC extraction and
//! web-search fallback.
//!
//! This crate contains no tokio, sqlx, or filesystem I/O. Concrete
//! backends (SQLite, HTTP embedding providers, web search) live in the
//! `docshelf` app crate.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`models`] | Documents, parent/child chunks, retrieval results |
//! | [`error`] | Error taxonomy shared by every backend |
//! | [`chunk`] | Two-level boundary-aware chunker |
//! | [`embedding`] | Embedding trait, hash embedder, vector utilities |
//! | [`store`] | `VectorIndex` and `Store` traits, in-memory backend |
//! | [`retrieve`] | Child search, parent collapse, ranking |
//! | [`grade`] | Relevance grading policy |
//! | [`chain`] | Ordered strategy list, first success wins |
//! | [`toc`] | Heading heuristic for tables of contents |
//! | [`path`] | Source path normalisation and content hashing |

pub mod chain;
pub mod chunk;
pub mod embedding;
pub mod error;
pub mod grade;
pub mod models;
pub mod path;
pub mod retrieve;
pub mod store;
pub mod toc;

pub use error::{Error, Result};
