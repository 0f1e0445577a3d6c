//! External embedding backend — an OpenAI-shape `/embeddings` HTTP API
//! (spec §4.C), grounded on `embedding_provider.py`'s `httpx` client: POST
//! `{model, input}`, read back `data` sorted by `index`.
//!
//! [`EmbeddingProvider`] is a synchronous trait (it's called from
//! synchronous ingestion/search code paths, matching the teacher's
//! `encode_document_sync`/`encode_query_sync` split), so each call blocks
//! on a dedicated `reqwest::blocking::Client` rather than requiring an
//! async runtime handle.

use serde::{Deserialize, Serialize};

use super::{l2_normalize, EmbeddingProvider};
use crate::error::{CoreError, CoreResult};

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
    index: usize,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

pub struct ExternalEmbeddingProvider {
    client: reqwest::blocking::Client,
    api_url: String,
    api_key: String,
    model: String,
}

impl ExternalEmbeddingProvider {
    pub fn new(api_url: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::blocking::Client::new(),
            api_url: api_url.into(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    fn encode(&self, text: &str) -> CoreResult<Vec<f32>> {
        let url = format!("{}/embeddings", self.api_url.trim_end_matches('/'));
        let body = EmbeddingRequest { model: &self.model, input: text };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .map_err(|e| CoreError::transport(format!("embedding request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().unwrap_or_default();
            let message = serde_json::from_str::<ErrorEnvelope>(&text)
                .map(|e| e.error.message)
                .unwrap_or(text);
            return Err(CoreError::transport(format!("embedding API returned {status}: {message}")));
        }

        let mut parsed: EmbeddingResponse = response
            .json()
            .map_err(|e| CoreError::transport(format!("failed to parse embedding response: {e}")))?;

        parsed.data.sort_by_key(|d| d.index);
        let mut embedding = parsed
            .data
            .into_iter()
            .next()
            .ok_or_else(|| CoreError::transport("embedding API returned no data"))?
            .embedding;

        l2_normalize(&mut embedding);
        Ok(embedding)
    }
}

impl EmbeddingProvider for ExternalEmbeddingProvider {
    fn encode_document(&self, text: &str) -> CoreResult<Vec<f32>> {
        self.encode(text)
    }

    fn encode_query(&self, text: &str) -> CoreResult<Vec<f32>> {
        self.encode(text)
    }
}
