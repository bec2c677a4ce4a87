//! Optional LLM-based query reformulation.
//!
//! Most queries do not benefit from rewriting and a model call costs
//! hundreds of milliseconds, so a guard predicate filters them: only long
//! queries with no exact reference, no high-signal domain term, no direct
//! question form and no domain marker are rewritten. Any error returns the
//! original query unchanged.

use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, info, instrument, warn};

use crate::llm::{ChatRequest, LlmProvider};

static REFERENCE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(compte|article|section|chapitre|partie)\s+\d+").expect("static pattern compiles")
});

static DIRECT_QUESTION_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"^(quel|quelle|quels|quelles)\s+(est|sont)",
        r"^comment\s+(enregistrer|comptabiliser|faire)",
        r"^où\s+(enregistrer|comptabiliser|trouver)",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("static pattern compiles"))
    .collect()
});

const DOMAIN_TERMS: &[&str] = &[
    "syscohada",
    "ohada",
    "bilan",
    "actif",
    "passif",
    "amortissement",
    "provision",
    "charge",
    "produit",
    "immobilisation",
    "stock",
    "trésorerie",
    "créance",
    "dette",
    "capital",
    "résultat",
];

/// Returns `true` when rewriting is expected to improve retrieval.
pub fn should_reformulate(query: &str) -> bool {
    let words: Vec<&str> = query.split_whitespace().collect();
    let query_lower = query.to_lowercase();

    if words.len() <= 10 {
        debug!(words = words.len(), "short query, no reformulation");
        return false;
    }

    if REFERENCE_PATTERN.is_match(&query_lower) {
        debug!("exact reference present, no reformulation");
        return false;
    }

    if DOMAIN_TERMS.iter().any(|term| query_lower.contains(term)) {
        debug!("domain term present, no reformulation");
        return false;
    }

    for pattern in DIRECT_QUESTION_PATTERNS.iter() {
        if pattern.is_match(&query_lower) {
            debug!("direct question form, no reformulation");
            return false;
        }
    }

    if query_lower.contains("ohada") && words.len() >= 5 {
        debug!("query already optimized, no reformulation");
        return false;
    }

    true
}

/// Guarded LLM query rewriter.
pub struct QueryReformulator {
    llm: std::sync::Arc<LlmProvider>,
}

impl QueryReformulator {
    pub fn new(llm: std::sync::Arc<LlmProvider>) -> Self {
        Self { llm }
    }

    /// Rewrites the query into a concise, keyword-dense form when the
    /// guard allows it; returns the input otherwise and on any error.
    #[instrument(skip(self, query), fields(query_len = query.len()))]
    pub async fn reformulate(&self, query: &str) -> String {
        if !should_reformulate(query) {
            return query.to_string();
        }

        info!("reformulating complex query");
        let user = format!(
            "Vous êtes un assistant spécialisé dans la recherche d'informations sur le plan \
             comptable OHADA. Votre tâche est de reformuler la question suivante pour maximiser \
             les chances de trouver des informations pertinentes dans une base de données. \
             Ajoutez des mots-clés pertinents, mais gardez la requête concise.\n\n\
             Question originale: {query}\n\n\
             Reformulation optimisée:"
        );

        let request = ChatRequest::new(
            "Reformulez la question pour optimiser la recherche dans le plan comptable OHADA.",
            user,
            100,
            0.3,
        );

        match self.llm.try_complete(&request).await {
            Ok(reformulated) => {
                let reformulated = reformulated.trim();
                if reformulated.is_empty() {
                    query.to_string()
                } else {
                    info!(reformulated, "query reformulated");
                    reformulated.to_string()
                }
            }
            Err(e) => {
                warn!(error = %e, "reformulation failed, keeping original query");
                query.to_string()
            }
        }
    }
}

impl std::fmt::Debug for QueryReformulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryReformulator").finish()
    }
}
