//! Local BERT-family sentence encoder.
//!
//! Loads a safetensors checkpoint plus tokenizer from a model directory and
//! produces mean-pooled, L2-normalized sentence embeddings, matching the
//! pooling convention of BGE-family retrieval models.

use std::path::Path;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config};
use tokenizers::Tokenizer;
use tracing::{debug, info};

use super::error::EmbeddingError;
use super::utils::load_tokenizer_with_truncation;

const MAX_SEQ_LEN: usize = 512;

/// In-process sentence encoder.
pub struct BertEncoder {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    dimension: usize,
}

impl std::fmt::Debug for BertEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BertEncoder")
            .field("device", &format!("{:?}", self.device))
            .field("dimension", &self.dimension)
            .finish()
    }
}

impl BertEncoder {
    /// Loads the encoder from a model directory containing `config.json`,
    /// `model.safetensors` and `tokenizer.json`.
    pub fn load(model_dir: &Path, device: Device) -> Result<Self, EmbeddingError> {
        if !model_dir.exists() {
            return Err(EmbeddingError::ModelNotFound {
                path: model_dir.to_path_buf(),
            });
        }

        let config_path = model_dir.join("config.json");
        let weights_path = model_dir.join("model.safetensors");

        let config_content = std::fs::read_to_string(&config_path)?;
        let config: Config =
            serde_json::from_str(&config_content).map_err(|e| EmbeddingError::ModelLoadFailed {
                reason: format!("Failed to parse config: {}", e),
            })?;

        let tokenizer = load_tokenizer_with_truncation(model_dir, MAX_SEQ_LEN)?;

        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[weights_path], DType::F32, &device)?
        };
        let model = BertModel::load(vb, &config)?;

        let dimension = config.hidden_size;
        info!(
            model_dir = %model_dir.display(),
            dimension,
            "local embedding model loaded"
        );

        Ok(Self {
            model,
            tokenizer,
            device,
            dimension,
        })
    }

    /// Output embedding dimension (the model's hidden size).
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Encodes one text into a normalized embedding.
    pub fn encode(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let encoding =
            self.tokenizer
                .encode(text, true)
                .map_err(|e| EmbeddingError::TokenizationFailed {
                    reason: e.to_string(),
                })?;

        let token_ids = encoding.get_ids();
        if token_ids.is_empty() {
            return Ok(vec![0.0; self.dimension]);
        }

        debug!(
            text_len = text.len(),
            token_count = token_ids.len(),
            "encoding text"
        );

        let input_ids = Tensor::new(token_ids, &self.device)?.unsqueeze(0)?;
        let token_type_ids = Tensor::new(encoding.get_type_ids(), &self.device)?.unsqueeze(0)?;
        let attention_mask = Tensor::new(encoding.get_attention_mask(), &self.device)?.unsqueeze(0)?;

        // [1, seq_len, hidden] → mean over the sequence axis.
        let hidden = self
            .model
            .forward(&input_ids, &token_type_ids, Some(&attention_mask))?;
        let pooled = hidden.mean(1)?.squeeze(0)?;

        let embedding = pooled.to_vec1::<f32>()?;
        Ok(normalize(embedding))
    }
}

fn normalize(mut embedding: Vec<f32>) -> Vec<f32> {
    let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in &mut embedding {
            *x /= norm;
        }
    }
    embedding
}
