//! Local embedding backend — a BERT-family encoder run on-box via
//! `candle`, mirroring the teacher's `Embedder` (HF Hub download, WordPiece
//! tokenizer with a vocab.txt fallback, mean pooling, L2 normalize).
//!
//! The teacher's model is Portuguese-specific and symmetric (same encoding
//! for documents and queries). This system's default model
//! (`sentence-transformers/all-MiniLM-L6-v2`, spec §4.C) is also symmetric,
//! but some retrieval-tuned models in this family (e.g. Qwen3-Embedding)
//! expect queries prefixed with `"query: "` to distinguish query-side from
//! document-side encoding — that asymmetry is applied here based on the
//! model name rather than assumed universal.

use anyhow::{Context, Result};
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert;
use hf_hub::api::sync::Api;
use tokenizers::Tokenizer;

use super::{l2_normalize, EmbeddingProvider};
use crate::error::{CoreError, CoreResult};

/// Models in this family expect an instruction prefix on the query side
/// only (spec §4.C, grounded on `embedding_provider.py`'s Qwen handling).
fn wants_query_prefix(model_id: &str) -> bool {
    model_id.to_lowercase().contains("qwen")
}

pub struct LocalEmbeddingProvider {
    model: bert::BertModel,
    tokenizer: Tokenizer,
    device: Device,
    query_prefix: Option<&'static str>,
}

impl LocalEmbeddingProvider {
    /// Downloads (or loads from cache) `model_id` from the HuggingFace Hub
    /// and builds the tokenizer + weights, following the teacher's
    /// tokenizer.json-then-vocab.txt and safetensors-then-pytorch_model.bin
    /// fallback chain.
    pub fn load(model_id: &str) -> Result<Self> {
        let device = Device::Cpu;
        tracing::info!(model = model_id, "loading local embedding model");

        let api = Api::new().context("failed to create HF Hub API client")?;
        let repo = api.model(model_id.to_string());

        let config_path = repo.get("config.json").context("failed to download config.json")?;

        let tokenizer = match repo.get("tokenizer.json") {
            Ok(path) => Tokenizer::from_file(&path).map_err(|e| anyhow::anyhow!("{e}"))?,
            Err(_) => {
                tracing::info!("tokenizer.json unavailable, building WordPiece from vocab.txt");
                let vocab_path = repo.get("vocab.txt").context("failed to download vocab.txt")?;
                Self::build_wordpiece_tokenizer(
                    vocab_path.to_str().context("invalid vocab.txt path encoding")?,
                )?
            }
        };

        let config_str = std::fs::read_to_string(&config_path)?;
        let config: bert::Config =
            serde_json::from_str(&config_str).context("failed to parse model config")?;

        let vb = match repo.get("model.safetensors") {
            Ok(path) => unsafe {
                VarBuilder::from_mmaped_safetensors(&[path], DType::F32, &device)
                    .context("failed to load safetensors weights")?
            },
            Err(_) => {
                let path = repo
                    .get("pytorch_model.bin")
                    .context("failed to download pytorch_model.bin")?;
                VarBuilder::from_pth(&path, DType::F32, &device)
                    .context("failed to load pytorch weights")?
            }
        };

        let model = bert::BertModel::load(vb, &config).context("failed to build model")?;

        tracing::info!(model = model_id, "local embedding model ready");
        Ok(Self {
            model,
            tokenizer,
            device,
            query_prefix: if wants_query_prefix(model_id) { Some("query: ") } else { None },
        })
    }

    fn build_wordpiece_tokenizer(vocab_path: &str) -> Result<Tokenizer> {
        use tokenizers::models::wordpiece::WordPiece;
        use tokenizers::normalizers::BertNormalizer;
        use tokenizers::pre_tokenizers::bert::BertPreTokenizer;
        use tokenizers::processors::bert::BertProcessing;

        let wordpiece = WordPiece::from_file(vocab_path)
            .unk_token("[UNK]".to_string())
            .build()
            .map_err(|e| anyhow::anyhow!("{e}"))?;

        let mut tokenizer = Tokenizer::new(wordpiece);
        tokenizer.with_normalizer(Some(BertNormalizer::new(true, true, None, true)));
        tokenizer.with_pre_tokenizer(Some(BertPreTokenizer));
        tokenizer.with_post_processor(Some(BertProcessing::new(
            ("[SEP]".to_string(), 102),
            ("[CLS]".to_string(), 101),
        )));
        Ok(tokenizer)
    }

    fn embed_one(&self, text: &str) -> CoreResult<Vec<f32>> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| CoreError::embedding(format!("tokenizer error: {e}")))?;

        let ids = encoding.get_ids();
        let mask_vec: Vec<u32> = encoding.get_attention_mask().to_vec();
        let type_ids_vec = vec![0u32; ids.len()];

        let run = || -> candle_core::Result<Vec<f32>> {
            let input_ids = Tensor::new(ids, &self.device)?.unsqueeze(0)?;
            let token_type_ids = Tensor::new(&type_ids_vec[..], &self.device)?.unsqueeze(0)?;
            let attention_mask = Tensor::new(&mask_vec[..], &self.device)?.unsqueeze(0)?;

            let output = self.model.forward(&input_ids, &token_type_ids, Some(&attention_mask))?;

            let mask_expanded = attention_mask
                .unsqueeze(2)?
                .to_dtype(DType::F32)?
                .broadcast_as(output.shape())?;
            let masked = (output * mask_expanded.clone())?;
            let summed = masked.sum(1)?;
            let mask_sum = mask_expanded.sum(1)?.clamp(1e-9, f64::MAX)?;
            let pooled = (summed / mask_sum)?;

            let norm = pooled.sqr()?.sum(1)?.sqrt()?;
            let normalized = pooled.broadcast_div(&norm.unsqueeze(1)?)?;
            normalized.squeeze(0)?.to_vec1()
        };

        let mut embedding = run().map_err(|e| CoreError::embedding(format!("forward pass failed: {e}")))?;
        l2_normalize(&mut embedding);
        Ok(embedding)
    }
}

impl EmbeddingProvider for LocalEmbeddingProvider {
    fn encode_document(&self, text: &str) -> CoreResult<Vec<f32>> {
        self.embed_one(text)
    }

    fn encode_query(&self, text: &str) -> CoreResult<Vec<f32>> {
        match self.query_prefix {
            Some(prefix) => self.embed_one(&format!("{prefix}{text}")),
            None => self.embed_one(text),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qwen_models_get_query_prefix() {
        assert!(wants_query_prefix("Qwen/Qwen3-Embedding-0.6B"));
        assert!(!wants_query_prefix("sentence-transformers/all-MiniLM-L6-v2"));
    }
}
