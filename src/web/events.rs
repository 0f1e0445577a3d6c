//! Server-Sent Events emitted during ingestion (spec §6 "Ingestion API").
//!
//! One broadcast channel is shared across all connected clients; each
//! event carries enough identifying information (`figure_id`, `filename`)
//! that a client watching one figure's upload can filter out events for
//! other figures running concurrently.

use serde::Serialize;

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IngestionEvent {
    FileStart { figure_id: String, filename: String },
    ChunksCount { figure_id: String, filename: String, total_chunks: usize },
    ChunkProgress { figure_id: String, filename: String, chunk_index: usize, total_chunks: usize },
    FileComplete { figure_id: String, filename: String, chunks_added: usize },
    FileError { figure_id: String, filename: String, message: String },
    UploadComplete { figure_id: String, files_processed: usize },
}
