//! Tokenizer loading helpers shared by the local embedder and the
//! cross-encoder.

use std::io;
use std::path::Path;

use tokenizers::{Tokenizer, TruncationParams};

/// Loads `tokenizer.json` from a model directory, with truncation pinned
/// to `max_len` so fixed-context BERT-family models never see oversized
/// inputs.
pub fn load_tokenizer_with_truncation(model_dir: &Path, max_len: usize) -> io::Result<Tokenizer> {
    let tokenizer_path = if model_dir.is_dir() {
        model_dir.join("tokenizer.json")
    } else {
        // Allow pointing directly at a tokenizer.json file.
        model_dir.to_path_buf()
    };

    let mut tokenizer = Tokenizer::from_file(&tokenizer_path).map_err(io::Error::other)?;

    tokenizer
        .with_truncation(Some(TruncationParams {
            max_length: max_len,
            ..Default::default()
        }))
        .map_err(|e| io::Error::other(format!("failed to configure truncation: {e}")))?;

    Ok(tokenizer)
}
