//! Per-figure hybrid retrieval engine: document ingestion, dual dense/BM25
//! indexing, and Reciprocal-Rank-Fusion query serving for a historical-figure
//! chat system. The HTTP/SSE surface in `web` is the thinnest possible shell
//! around the library modules below; all retrieval logic is reusable and
//! independently testable without a running server.

pub mod config;
pub mod document;
pub mod embedding;
pub mod error;
pub mod search;
pub mod store;
pub mod text;
pub mod web;
