//! Prompt-context packing and source preparation.
//!
//! Ranked candidates are greedily packed into a single context string
//! bounded by a character budget (`max_tokens × 4`). When the next
//! candidate would overflow the budget, a sentence-boundary prefix is
//! packed instead — but only for the first two candidates, so the top
//! results are never silently dropped — and packing stops.

use tracing::{debug, instrument};

use crate::constants::{CHARS_PER_TOKEN, DEFAULT_CONTEXT_TOKENS, SOURCE_PREVIEW_CHARS};
use crate::model::{RetrievalCandidate, SourceView};

/// Bounded-budget context builder.
#[derive(Debug, Clone)]
pub struct ContextBuilder {
    max_tokens: usize,
}

impl Default for ContextBuilder {
    fn default() -> Self {
        Self {
            max_tokens: DEFAULT_CONTEXT_TOKENS,
        }
    }
}

impl ContextBuilder {
    /// Creates a builder with a token budget.
    pub fn new(max_tokens: usize) -> Self {
        Self { max_tokens }
    }

    /// The character budget implied by the token budget.
    pub fn max_chars(&self) -> usize {
        self.max_tokens * CHARS_PER_TOKEN
    }

    /// Packs ranked candidates into one prompt context.
    #[instrument(skip(self, results), fields(results = results.len()))]
    pub fn build_context(&self, results: &[RetrievalCandidate]) -> String {
        if results.is_empty() {
            return String::new();
        }

        let max_chars = self.max_chars();
        let mut parts: Vec<String> = Vec::new();
        let mut current_length = 0usize;

        for (i, result) in results.iter().enumerate() {
            let metadata_str = format_metadata(result);
            let entry_text = format!(
                "Document {} (score: {:.2}):\n{}\n{}\n\n",
                i + 1,
                result.relevance_score,
                metadata_str,
                result.text
            );

            if current_length + entry_text.len() > max_chars {
                // The first two candidates are packed at least partially,
                // cut at sentence boundaries.
                if i < 2 {
                    let remaining = max_chars
                        .saturating_sub(current_length)
                        .saturating_sub(metadata_str.len())
                        .saturating_sub(50);

                    let passage = sentence_prefix(&result.text, remaining);
                    if !passage.is_empty() {
                        parts.push(format!(
                            "Document {} (score: {:.2}):\n{}\n{}\n\n",
                            i + 1,
                            result.relevance_score,
                            metadata_str,
                            passage
                        ));
                        current_length += metadata_str.len() + passage.len() + 50;
                    }
                }
                break;
            }

            current_length += entry_text.len();
            parts.push(entry_text);
        }

        let context = parts.concat();
        debug!(chars = context.len(), "context built");
        context
    }

    /// Projects candidates into the source views returned with an answer.
    pub fn prepare_sources(&self, results: &[RetrievalCandidate]) -> Vec<SourceView> {
        results
            .iter()
            .map(|result| SourceView {
                document_id: result.document_id.clone(),
                metadata: result.metadata.clone(),
                relevance_score: result.relevance_score,
                preview: preview_of(&result.text),
            })
            .collect()
    }
}

fn format_metadata(result: &RetrievalCandidate) -> String {
    let mut metadata_str = String::new();

    if let Some(title) = result.metadata.get("title").and_then(|v| v.as_str()) {
        metadata_str.push_str(&format!("Titre: {title}\n"));
    }

    if let Some(document_type) = result.metadata.get("document_type").and_then(|v| v.as_str()) {
        metadata_str.push_str(&format!("Type: {document_type}"));

        if let Some(partie) = result.metadata.get("partie").and_then(|v| v.as_i64()) {
            metadata_str.push_str(&format!(", Partie: {partie}"));
        }
        if let Some(chapitre) = result.metadata.get("chapitre").and_then(|v| v.as_i64()) {
            metadata_str.push_str(&format!(", Chapitre: {chapitre}"));
        }
        metadata_str.push('\n');
    }

    metadata_str
}

fn sentence_prefix(text: &str, budget: usize) -> String {
    let mut passage = String::new();

    for sentence in text.split('.') {
        if passage.len() + sentence.len() >= budget {
            break;
        }
        passage.push_str(sentence);
        passage.push_str(". ");
    }

    passage.trim_end().to_string()
}

fn preview_of(text: &str) -> String {
    let mut chars = text.chars();
    let preview: String = chars.by_ref().take(SOURCE_PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{preview}...")
    } else {
        preview
    }
}
