//! # docshelf
//!
//! A local document library with parent/child retrieval and adaptive
//! web-search fallback.
//!
//! Documents are split into coarse *parent* chunks (returned as context) and
//! fine *child* chunks (embedded and searched). A query finds the nearest
//! children, collapses them onto their parents, and ranks the parents. When
//! the best local context grades as insufficient, one web search augments
//! the result.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────────────┐   ┌──────────────┐
//! │  Files   │──▶│ Extract ▸ Chunk ▸ │──▶│    SQLite    │
//! │ md/pdf/… │   │ Embed ▸ TOC       │   │ docs+vectors │
//! └──────────┘   └───────────────────┘   └──────┬───────┘
//!                                               │
//!                    ┌──────────────────────────┤
//!                    ▼                          ▼
//!             ┌─────────────┐           ┌──────────────┐
//!             │  Retriever  │──grade──▶ │ Web fallback │
//!             └─────────────┘           └──────────────┘
//! ```
//!
//! Backend-agnostic logic (models, chunker, retriever, grading, traits)
//! lives in the `docshelf-core` crate; this crate adds persistence, HTTP
//! providers, orchestration, and the CLI.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`logging`] | `tracing` subscriber setup |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite `Store` and `VectorIndex` |
//! | [`http`] | Shared HTTP client and retry policy |
//! | [`embedding`] | OpenAI, Ollama, hash, and disabled providers |
//! | [`llm`] | Chat-completions client |
//! | [`websearch`] | Tavily, Brave, and DuckDuckGo providers |
//! | [`locks`] | Per-key writer locks |
//! | [`extract`] | Text extraction from markdown, text, PDF, DOCX |
//! | [`toc`] | Table-of-contents tiers |
//! | [`library`] | Ingest, delete, name resolution, maintenance |
//! | [`fallback`] | Grading and web augmentation state machine |
//! | [`ingest`], [`search`], [`get`], [`stats`], [`catalog`] | CLI commands |

pub mod catalog;
pub mod config;
pub mod db;
pub mod embedding;
pub mod extract;
pub mod fallback;
pub mod get;
pub mod http;
pub mod ingest;
pub mod library;
pub mod llm;
pub mod locks;
pub mod logging;
pub mod migrate;
pub mod search;
pub mod sqlite_store;
pub mod stats;
pub mod toc;
pub mod websearch;
