//! Two-phase intent classification.
//!
//! Phase 1 is a set of regex heuristics: obviously technical queries
//! (numbered references, accounting vocabulary) and obvious
//! greetings/farewells are classified without any model call, which covers
//! the large majority of traffic. Phase 2 asks the LLM for a structured
//! JSON classification; any parse failure defaults to `technical` so the
//! knowledge base is never bypassed by accident.
//!
//! For non-technical intents the classifier can synthesize a direct reply
//! shaped by the configured assistant persona; the pipeline uses that reply
//! verbatim and skips retrieval.

use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

use crate::config::AssistantPersonality;
use crate::llm::{ChatRequest, LlmProvider};

/// Recognized query intents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Greeting,
    Identity,
    Smalltalk,
    Technical,
}

impl Intent {
    /// Wire name of the intent.
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Greeting => "greeting",
            Intent::Identity => "identity",
            Intent::Smalltalk => "smalltalk",
            Intent::Technical => "technical",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value {
            "greeting" => Some(Intent::Greeting),
            "identity" => Some(Intent::Identity),
            "smalltalk" => Some(Intent::Smalltalk),
            "technical" => Some(Intent::Technical),
            _ => None,
        }
    }
}

/// How a classification was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionMethod {
    FastHeuristics,
    Llm,
    LlmFallback,
}

/// Classification result.
#[derive(Debug, Clone)]
pub struct IntentAnalysis {
    pub intent: Intent,
    pub confidence: f32,
    pub subcategory: Option<String>,
    pub needs_knowledge_base: bool,
    pub explanation: Option<String>,
    pub method: DetectionMethod,
}

impl IntentAnalysis {
    fn technical_fallback() -> Self {
        Self {
            intent: Intent::Technical,
            confidence: 0.0,
            subcategory: None,
            needs_knowledge_base: true,
            explanation: None,
            method: DetectionMethod::LlmFallback,
        }
    }
}

static TECHNICAL_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"\bcompte\s+\d+",
        r"\barticle\s+\d+",
        r"\bsection\s+\d+",
        r"\bchapitre\s+\d+",
        r"\bpartie\s+\d+",
        r"\bcomptabilis(er|ation)",
        r"\bsyscohada\b",
        r"\bohada\b",
        r"\bplan\s+comptable",
        r"\bquel(le)?\s+(est|sont)\s+(le|les)\s+compte",
        r"\bcomment\s+(enregistrer|comptabiliser)",
        r"\b(bilan|actif|passif|amortissement)",
        r"\b(débit|crédit|journal|écriture)",
        r"\b(immobilisation|stock|trésorerie)",
        r"\bnorme\s+(comptable|ohada)",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("static pattern compiles"))
    .collect()
});

static GREETING_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(bonjour|salut|hello|hi|hey|bonsoir)\s*[!.?]?\s*$")
        .expect("static pattern compiles")
});

static FAREWELL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(merci|thanks|au\s+revoir|bye)\s*[!.?]?\s*$")
        .expect("static pattern compiles")
});

static HAS_DIGIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d").expect("static pattern compiles"));

/// Phase-1 heuristic classification. Returns `None` when inconclusive.
pub fn classify_fast(query: &str) -> Option<IntentAnalysis> {
    let query_lower = query.to_lowercase();

    for pattern in TECHNICAL_PATTERNS.iter() {
        if pattern.is_match(&query_lower) {
            debug!(pattern = pattern.as_str(), "technical query detected by fast path");
            return Some(IntentAnalysis {
                intent: Intent::Technical,
                confidence: 0.95,
                subcategory: None,
                needs_knowledge_base: true,
                explanation: Some("Requête technique détectée par analyse de motifs".to_string()),
                method: DetectionMethod::FastHeuristics,
            });
        }
    }

    if GREETING_PATTERN.is_match(&query_lower) {
        debug!("greeting detected by fast path");
        return Some(IntentAnalysis {
            intent: Intent::Greeting,
            confidence: 0.9,
            subcategory: None,
            needs_knowledge_base: false,
            explanation: None,
            method: DetectionMethod::FastHeuristics,
        });
    }

    if FAREWELL_PATTERN.is_match(&query_lower) {
        debug!("farewell/smalltalk detected by fast path");
        return Some(IntentAnalysis {
            intent: Intent::Smalltalk,
            confidence: 0.9,
            subcategory: Some("au_revoir".to_string()),
            needs_knowledge_base: false,
            explanation: None,
            method: DetectionMethod::FastHeuristics,
        });
    }

    // Very short queries without any number are almost never technical.
    let word_count = query_lower.split_whitespace().count();
    if word_count < 3 && !HAS_DIGIT.is_match(&query_lower) {
        debug!(word_count, "short non-technical query detected by fast path");
        return Some(IntentAnalysis {
            intent: Intent::Smalltalk,
            confidence: 0.6,
            subcategory: None,
            needs_knowledge_base: false,
            explanation: None,
            method: DetectionMethod::FastHeuristics,
        });
    }

    None
}

#[derive(Debug, Deserialize)]
struct IntentPayload {
    intent: Option<String>,
    #[serde(default)]
    confidence: f32,
    subcategory: Option<String>,
    needs_knowledge_base: Option<bool>,
    explanation: Option<String>,
}

const CLASSIFY_SYSTEM_PROMPT: &str = "\
Tu es un assistant spécialisé dans l'analyse d'intention des questions utilisateur.

Ta tâche est de classifier les questions en différentes catégories :
- \"greeting\": Salutations comme \"bonjour\", \"salut\", etc.
- \"identity\": Questions sur l'identité ou les capacités de l'assistant.
- \"smalltalk\": Conversations générales comme remerciements, questions de courtoisie, au revoir.
- \"technical\": Questions techniques qui nécessitent des connaissances spécifiques.

Si c'est du \"smalltalk\", précise la sous-catégorie (\"merci\", \"comment_ca_va\", \"au_revoir\", etc.)

Réponds uniquement avec un objet JSON au format suivant:
{
    \"intent\": \"greeting|identity|smalltalk|technical\",
    \"confidence\": 0.XX,
    \"subcategory\": \"string\",
    \"explanation\": \"string\",
    \"needs_knowledge_base\": true|false
}";

/// Two-phase intent classifier with persona-shaped direct replies.
pub struct IntentClassifier {
    llm: std::sync::Arc<LlmProvider>,
    persona: AssistantPersonality,
}

impl IntentClassifier {
    pub fn new(llm: std::sync::Arc<LlmProvider>, persona: AssistantPersonality) -> Self {
        Self { llm, persona }
    }

    /// Classifies a query, never failing: heuristics first, LLM second,
    /// `technical` on any LLM or parse error.
    #[instrument(skip(self, query), fields(query_len = query.len()))]
    pub async fn classify(&self, query: &str) -> IntentAnalysis {
        if let Some(analysis) = classify_fast(query) {
            info!(intent = analysis.intent.as_str(), "intent resolved by fast path");
            return analysis;
        }

        info!("fast path inconclusive, classifying with LLM");
        let request = ChatRequest::new(
            CLASSIFY_SYSTEM_PROMPT,
            format!("Question utilisateur: \"{query}\""),
            300,
            0.1,
        );

        let response = match self.llm.try_complete(&request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "intent classification call failed, defaulting to technical");
                return IntentAnalysis::technical_fallback();
            }
        };

        parse_classification(&response).unwrap_or_else(|| {
            warn!("intent classification response unparseable, defaulting to technical");
            IntentAnalysis::technical_fallback()
        })
    }

    /// Synthesizes a persona-shaped direct reply for non-technical
    /// intents. Returns `None` when retrieval is needed or generation
    /// fails, letting the pipeline continue normally.
    #[instrument(skip(self, analysis, query))]
    pub async fn direct_reply(&self, analysis: &IntentAnalysis, query: &str) -> Option<String> {
        if analysis.needs_knowledge_base || analysis.intent == Intent::Technical {
            return None;
        }

        let system = format!(
            "Tu es {}, un assistant spécialisé en {} dans la {}.\n\n\
             Tu dois répondre de manière naturelle à l'utilisateur en fonction de l'intention de sa question.\n\n\
             Points importants sur ton identité:\n\
             - Tu es spécialiste des normes comptables OHADA et SYSCOHADA\n\
             - Tu connais parfaitement le plan comptable OHADA\n\
             - Tu es conçu pour aider avec des questions de comptabilité dans la zone OHADA\n\
             - Tu peux expliquer les procédures comptables, les normes, et comment appliquer le plan comptable\n\n\
             Réponds de façon concise, professionnelle mais chaleureuse.",
            self.persona.name, self.persona.expertise, self.persona.region
        );

        let user = match analysis.intent {
            Intent::Greeting => format!(
                "L'utilisateur te dit: \"{query}\". Réponds avec une salutation professionnelle \
                 qui mentionne ton rôle d'expert OHADA et propose ton aide."
            ),
            Intent::Identity => format!(
                "L'utilisateur te demande qui tu es ou ce que tu peux faire: \"{query}\". \
                 Présente-toi en détaillant tes capacités en tant qu'expert comptable OHADA."
            ),
            Intent::Smalltalk => {
                let subcategory = analysis.subcategory.as_deref().unwrap_or("");
                format!(
                    "L'utilisateur fait du smalltalk, catégorie '{subcategory}': \"{query}\". \
                     Réponds de façon appropriée tout en rappelant subtilement ton domaine d'expertise OHADA."
                )
            }
            Intent::Technical => return None,
        };

        let request = ChatRequest::new(system, user, 600, 0.7);
        match self.llm.try_complete(&request).await {
            Ok(reply) => Some(reply),
            Err(e) => {
                warn!(error = %e, "direct reply generation failed");
                None
            }
        }
    }
}

impl std::fmt::Debug for IntentClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntentClassifier")
            .field("persona", &self.persona.name)
            .finish()
    }
}

fn parse_classification(response: &str) -> Option<IntentAnalysis> {
    // The model may wrap the JSON object in prose; isolate the outermost
    // braces before parsing.
    let start = response.find('{')?;
    let end = response.rfind('}')?;
    if end < start {
        return None;
    }

    let payload: IntentPayload = serde_json::from_str(&response[start..=end]).ok()?;
    let intent = Intent::parse(payload.intent.as_deref()?)?;

    Some(IntentAnalysis {
        intent,
        confidence: payload.confidence,
        subcategory: payload.subcategory,
        needs_knowledge_base: payload
            .needs_knowledge_base
            .unwrap_or(intent == Intent::Technical),
        explanation: payload.explanation,
        method: DetectionMethod::Llm,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockChatBackend;
    use std::sync::Arc;

    fn classifier(backend: Arc<MockChatBackend>) -> IntentClassifier {
        IntentClassifier::new(
            Arc::new(LlmProvider::new(vec![
                backend as Arc<dyn crate::llm::ChatBackend>,
            ])),
            AssistantPersonality::default(),
        )
    }

    #[test]
    fn test_fast_path_exact_reference_is_technical() {
        let analysis =
            classify_fast("Que dit l'article 25 de l'Acte Uniforme?").expect("fast path");
        assert_eq!(analysis.intent, Intent::Technical);
        assert!((analysis.confidence - 0.95).abs() < f32::EPSILON);
        assert!(analysis.needs_knowledge_base);
        assert_eq!(analysis.method, DetectionMethod::FastHeuristics);
    }

    #[test]
    fn test_fast_path_accounting_vocabulary_is_technical() {
        for query in [
            "comment comptabiliser une subvention reçue en cours d'exercice",
            "le traitement du bilan d'ouverture",
            "compte 401 fournisseurs",
        ] {
            let analysis = classify_fast(query).expect("fast path");
            assert_eq!(analysis.intent, Intent::Technical, "query: {query}");
        }
    }

    #[test]
    fn test_fast_path_greeting() {
        let analysis = classify_fast("Bonjour").expect("fast path");
        assert_eq!(analysis.intent, Intent::Greeting);
        assert!(!analysis.needs_knowledge_base);
    }

    #[test]
    fn test_fast_path_farewell_is_smalltalk() {
        let analysis = classify_fast("merci !").expect("fast path");
        assert_eq!(analysis.intent, Intent::Smalltalk);
        assert!(!analysis.needs_knowledge_base);
    }

    #[test]
    fn test_fast_path_short_query_without_digits() {
        let analysis = classify_fast("quoi donc").expect("fast path");
        assert_eq!(analysis.intent, Intent::Smalltalk);
    }

    #[test]
    fn test_fast_path_inconclusive_for_ambiguous_query() {
        assert!(classify_fast("pouvez-vous m'aider avec ma société ?").is_none());
    }

    #[tokio::test]
    async fn test_fast_path_skips_llm() {
        let backend = Arc::new(MockChatBackend::new("llm", "{}"));
        let classifier = classifier(backend.clone());

        let analysis = classifier.classify("Bonjour").await;
        assert_eq!(analysis.intent, Intent::Greeting);
        assert_eq!(backend.complete_call_count(), 0);
    }

    #[tokio::test]
    async fn test_llm_classification_parsed() {
        let backend = Arc::new(MockChatBackend::new(
            "llm",
            r#"Voici la classification: {"intent": "identity", "confidence": 0.85,
               "needs_knowledge_base": false, "explanation": "question sur l'assistant"}"#,
        ));
        let classifier = classifier(backend.clone());

        let analysis = classifier.classify("pouvez-vous m'aider avec ma société ?").await;
        assert_eq!(analysis.intent, Intent::Identity);
        assert!((analysis.confidence - 0.85).abs() < f32::EPSILON);
        assert!(!analysis.needs_knowledge_base);
        assert_eq!(backend.complete_call_count(), 1);
    }

    #[tokio::test]
    async fn test_unparseable_llm_response_defaults_to_technical() {
        let backend = Arc::new(MockChatBackend::new("llm", "je ne sais pas"));
        let classifier = classifier(backend);

        let analysis = classifier.classify("pouvez-vous m'aider avec ma société ?").await;
        assert_eq!(analysis.intent, Intent::Technical);
        assert!(analysis.needs_knowledge_base);
        assert_eq!(analysis.method, DetectionMethod::LlmFallback);
    }

    #[tokio::test]
    async fn test_llm_failure_defaults_to_technical() {
        let backend = Arc::new(MockChatBackend::failing("llm"));
        let classifier = classifier(backend);

        let analysis = classifier.classify("pouvez-vous m'aider avec ma société ?").await;
        assert_eq!(analysis.intent, Intent::Technical);
        assert!(analysis.needs_knowledge_base);
    }

    #[tokio::test]
    async fn test_direct_reply_for_greeting() {
        let backend = Arc::new(MockChatBackend::new(
            "llm",
            "Bonjour ! Je suis votre Expert OHADA.",
        ));
        let classifier = classifier(backend);

        let analysis = classify_fast("Bonjour").expect("fast path");
        let reply = classifier.direct_reply(&analysis, "Bonjour").await;
        assert_eq!(reply.as_deref(), Some("Bonjour ! Je suis votre Expert OHADA."));
    }

    #[tokio::test]
    async fn test_no_direct_reply_for_technical() {
        let backend = Arc::new(MockChatBackend::new("llm", "réponse"));
        let classifier = classifier(backend.clone());

        let analysis = classify_fast("article 25").expect("fast path");
        assert!(classifier.direct_reply(&analysis, "article 25").await.is_none());
        assert_eq!(backend.complete_call_count(), 0);
    }

    #[tokio::test]
    async fn test_direct_reply_failure_returns_none() {
        let backend = Arc::new(MockChatBackend::failing("llm"));
        let classifier = classifier(backend);

        let analysis = classify_fast("Bonjour").expect("fast path");
        assert!(classifier.direct_reply(&analysis, "Bonjour").await.is_none());
    }
}
