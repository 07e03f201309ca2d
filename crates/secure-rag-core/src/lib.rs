//! # Secure RAG Core
//!
//! Runtime-free logic for Secure RAG: data models, sentence-aware chunk
//! splitting, the vector store trait, reciprocal-rank-fusion search, the
//! embedding trait, and prompt assembly.
//!
//! This crate contains no tokio, sqlx, HTTP, or filesystem dependencies.

pub mod chunk;
pub mod embedding;
pub mod models;
pub mod prompt;
pub mod search;
pub mod store;
