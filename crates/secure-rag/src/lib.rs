//! # Secure RAG
//!
//! A retrieval-augmented chat backend. Documents are uploaded, split into
//! chunks, embedded, and indexed in SQLite; chat requests retrieve the most
//! relevant chunks with hybrid (keyword + vector) search and stream a
//! grounded answer from an OpenAI-compatible model server.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌──────────────┐   ┌────────────┐
//! │  Upload    │──▶│ Extract      │──▶│  SQLite    │
//! │ PDF/TXT/MD │   │ Chunk+Embed  │   │ FTS5 + Vec │
//! └────────────┘   └──────────────┘   └─────┬──────┘
//!                                           │ RRF
//!                  ┌──────────────┐   ┌─────▼──────┐
//!   chat request ─▶│ Prompt build │◀──│  Retrieve  │
//!                  └──────┬───────┘   └────────────┘
//!                         ▼
//!                  ┌──────────────┐
//!                  │ LLM (SSE)    │──▶ OpenAI-style chunks
//!                  └──────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | Layered configuration (defaults, TOML, `RAG_*` env) |
//! | [`logging`] | Tracing subscriber setup |
//! | [`error`] | Error taxonomy and client/server classification |
//! | [`extract`] | PDF / text extraction |
//! | [`embedding`] | Local (fastembed) and OpenAI-compatible embedders |
//! | [`db`], [`migrate`] | SQLite connection and schema |
//! | [`sqlite_store`] | SQLite `VectorStore` implementation |
//! | [`index`] | Vector index gateway: insert and hybrid retrieve |
//! | [`ingest`] | Ingestion pipeline |
//! | [`llm`] | Streaming chat completion client |
//! | [`chat`] | Retrieval-augmented chat pipeline |
//! | [`server`] | HTTP API |
//!
//! Runtime-free pieces (models, splitter, fusion, prompt) live in
//! `secure-rag-core`.

pub mod chat;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod index;
pub mod ingest;
pub mod llm;
pub mod logging;
pub mod migrate;
pub mod server;
pub mod sqlite_store;
