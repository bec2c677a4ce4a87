//! BM25-Okapi scoring.
//!
//! Classic term-frequency / inverse-document-frequency scoring with the
//! usual Okapi parameters (`k1 = 1.5`, `b = 0.75`). IDF uses the
//! Lucene-style `ln(1 + (N - df + 0.5) / (df + 0.5))` form, which keeps
//! every term contribution non-negative.

use std::collections::HashMap;

pub const K1: f32 = 1.5;
pub const B: f32 = 0.75;

/// Lower-cases and splits text on every non-alphanumeric boundary.
///
/// Query and document tokenization MUST stay identical; both go through
/// this function.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}

/// Immutable BM25 index over a tokenized document batch.
#[derive(Debug)]
pub struct Bm25Index {
    doc_count: usize,
    avg_doc_len: f32,
    doc_lens: Vec<u32>,
    // term → [(doc index, term frequency)]
    postings: HashMap<String, Vec<(u32, u32)>>,
}

impl Bm25Index {
    /// Builds the index from per-document token lists.
    pub fn build(documents: &[Vec<String>]) -> Self {
        let doc_count = documents.len();
        let mut doc_lens = Vec::with_capacity(doc_count);
        let mut postings: HashMap<String, Vec<(u32, u32)>> = HashMap::new();

        for (doc_idx, tokens) in documents.iter().enumerate() {
            doc_lens.push(tokens.len() as u32);

            let mut frequencies: HashMap<&str, u32> = HashMap::new();
            for token in tokens {
                *frequencies.entry(token.as_str()).or_insert(0) += 1;
            }

            for (term, tf) in frequencies {
                postings
                    .entry(term.to_string())
                    .or_default()
                    .push((doc_idx as u32, tf));
            }
        }

        let total_len: u64 = doc_lens.iter().map(|&l| l as u64).sum();
        let avg_doc_len = if doc_count == 0 {
            0.0
        } else {
            total_len as f32 / doc_count as f32
        };

        Self {
            doc_count,
            avg_doc_len,
            doc_lens,
            postings,
        }
    }

    /// Number of indexed documents.
    pub fn len(&self) -> usize {
        self.doc_count
    }

    /// Returns `true` if no documents are indexed.
    pub fn is_empty(&self) -> bool {
        self.doc_count == 0
    }

    fn idf(&self, document_frequency: usize) -> f32 {
        let n = self.doc_count as f32;
        let df = document_frequency as f32;
        (1.0 + (n - df + 0.5) / (df + 0.5)).ln()
    }

    /// Computes BM25 scores for every document against the query tokens.
    pub fn scores(&self, query_tokens: &[String]) -> Vec<f32> {
        let mut scores = vec![0.0_f32; self.doc_count];
        if self.doc_count == 0 || self.avg_doc_len == 0.0 {
            return scores;
        }

        for term in query_tokens {
            let Some(posting) = self.postings.get(term) else {
                continue;
            };

            let idf = self.idf(posting.len());
            for &(doc_idx, tf) in posting {
                let tf = tf as f32;
                let doc_len = self.doc_lens[doc_idx as usize] as f32;
                let norm = K1 * (1.0 - B + B * doc_len / self.avg_doc_len);
                scores[doc_idx as usize] += idf * tf * (K1 + 1.0) / (tf + norm);
            }
        }

        scores
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus() -> Vec<Vec<String>> {
        [
            "l'amortissement des immobilisations corporelles",
            "le bilan présente l'actif et le passif",
            "les stocks sont évalués au coût d'acquisition",
            "amortissement linéaire et amortissement dégressif des immobilisations",
        ]
        .iter()
        .map(|text| tokenize(text))
        .collect()
    }

    #[test]
    fn test_tokenize_lowercases_and_splits_punctuation() {
        assert_eq!(
            tokenize("L'Article 25, alinéa 2 !"),
            vec!["l", "article", "25", "alinéa", "2"]
        );
    }

    #[test]
    fn test_tokenize_empty() {
        assert!(tokenize("  ... !! ").is_empty());
    }

    #[test]
    fn test_matching_docs_score_positive() {
        let index = Bm25Index::build(&corpus());
        let scores = index.scores(&tokenize("amortissement des immobilisations"));

        assert!(scores[0] > 0.0);
        assert!(scores[3] > 0.0);
        assert_eq!(scores[1], 0.0);
    }

    #[test]
    fn test_term_repetition_ranks_higher() {
        let index = Bm25Index::build(&corpus());
        let scores = index.scores(&tokenize("amortissement"));

        // Document 3 mentions the term twice in a comparable length.
        assert!(scores[3] > scores[0]);
    }

    #[test]
    fn test_no_overlap_scores_zero() {
        let index = Bm25Index::build(&corpus());
        let scores = index.scores(&tokenize("trésorerie"));
        assert!(scores.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_idf_non_negative() {
        let index = Bm25Index::build(&corpus());
        // A term present in every document still gets a non-negative idf.
        for df in 1..=index.len() {
            assert!(index.idf(df) >= 0.0);
        }
    }

    #[test]
    fn test_empty_index() {
        let index = Bm25Index::build(&[]);
        assert!(index.is_empty());
        assert!(index.scores(&tokenize("question")).is_empty());
    }
}
