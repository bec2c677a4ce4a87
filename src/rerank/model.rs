//! Cross-encoder model: BERT with a one-logit classification head.
//!
//! Scores a (query, passage) pair jointly. Logits are squashed through a
//! sigmoid so downstream blending always works on `[0, 1]`.

use std::path::Path;

use candle_core::{DType, Device, IndexOp, Tensor};
use candle_nn::{Linear, Module, VarBuilder};
use candle_transformers::models::bert::{BertModel, Config};
use tokenizers::Tokenizer;
use tracing::info;

use crate::embedding::select_device;
use crate::embedding::utils::load_tokenizer_with_truncation;

use super::config::MAX_SEQ_LEN;
use super::error::RerankerError;

struct BertForSequenceClassification {
    bert: BertModel,
    classifier: Linear,
}

impl BertForSequenceClassification {
    fn load(vb: VarBuilder, config: &Config) -> candle_core::Result<Self> {
        let bert = if vb.contains_tensor("bert.embeddings.word_embeddings.weight") {
            BertModel::load(vb.pp("bert"), config)?
        } else if vb.contains_tensor("roberta.embeddings.word_embeddings.weight") {
            BertModel::load(vb.pp("roberta"), config)?
        } else {
            BertModel::load(vb.clone(), config)?
        };

        let classifier = candle_nn::linear(config.hidden_size, 1, vb.pp("classifier"))?;

        Ok(Self { bert, classifier })
    }

    fn forward(
        &self,
        input_ids: &Tensor,
        token_type_ids: &Tensor,
        attention_mask: Option<&Tensor>,
    ) -> candle_core::Result<Tensor> {
        let output = self
            .bert
            .forward(input_ids, token_type_ids, attention_mask)?;
        let cls_token = output.i((.., 0, ..))?;
        self.classifier.forward(&cls_token)
    }
}

/// Loaded cross-encoder checkpoint.
pub struct CrossEncoderModel {
    model: BertForSequenceClassification,
    tokenizer: Tokenizer,
    device: Device,
}

impl std::fmt::Debug for CrossEncoderModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrossEncoderModel")
            .field("device", &format!("{:?}", self.device))
            .finish()
    }
}

impl CrossEncoderModel {
    /// Loads the model from a directory containing `config.json`,
    /// `model.safetensors` and `tokenizer.json`.
    pub fn load(model_dir: &Path) -> Result<Self, RerankerError> {
        if !model_dir.exists() {
            return Err(RerankerError::ModelNotFound {
                path: model_dir.to_path_buf(),
            });
        }

        let device = select_device().map_err(|e| RerankerError::ModelLoadFailed {
            reason: e.to_string(),
        })?;

        let config_path = model_dir.join("config.json");
        let weights_path = model_dir.join("model.safetensors");

        let config_content = std::fs::read_to_string(&config_path)?;
        let config: Config =
            serde_json::from_str(&config_content).map_err(|e| RerankerError::ModelLoadFailed {
                reason: format!("Failed to parse config: {}", e),
            })?;

        let tokenizer = load_tokenizer_with_truncation(model_dir, MAX_SEQ_LEN)?;

        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[weights_path], DType::F32, &device)?
        };
        let model = BertForSequenceClassification::load(vb, &config)?;

        info!(model_dir = %model_dir.display(), "cross-encoder model loaded");

        Ok(Self {
            model,
            tokenizer,
            device,
        })
    }

    /// Scores one (query, passage) pair into `[0, 1]`.
    pub fn score(&self, query: &str, passage: &str) -> Result<f32, RerankerError> {
        let tokens = self.tokenizer.encode((query, passage), true).map_err(|e| {
            RerankerError::TokenizationFailed {
                reason: e.to_string(),
            }
        })?;

        let input_ids = Tensor::new(tokens.get_ids(), &self.device)?.unsqueeze(0)?;
        let token_type_ids = Tensor::new(tokens.get_type_ids(), &self.device)?.unsqueeze(0)?;
        let attention_mask = Tensor::new(tokens.get_attention_mask(), &self.device)?.unsqueeze(0)?;

        let logits = self
            .model
            .forward(&input_ids, &token_type_ids, Some(&attention_mask))?;
        let logit = logits.i((0, 0))?.to_scalar::<f32>()?;

        Ok(sigmoid(logit))
    }
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}
