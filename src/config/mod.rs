//! Environment-backed configuration.
//!
//! Defaults carry a complete provider table (OpenAI-compatible endpoints in
//! priority order, assistant persona, boost rules); `OHADEX_*` environment
//! variables override endpoints, paths and capacities. The `test` and
//! `production` environments select different embedding defaults: the test
//! environment prefers the local embedder (1024 dimensions), production the
//! remote API (1536 dimensions).

pub mod error;


pub use error::ConfigError;

use std::collections::HashMap;
use std::env;
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::constants;

/// Deployment environment, selecting provider and dimension defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Test,
    Production,
}

impl Environment {
    fn parse(value: &str) -> Result<Self, ConfigError> {
        match value {
            "test" => Ok(Environment::Test),
            "production" => Ok(Environment::Production),
            other => Err(ConfigError::UnknownEnvironment {
                value: other.to_string(),
            }),
        }
    }
}

/// Model identifiers exposed by one provider.
#[derive(Debug, Clone, Default)]
pub struct ModelSet {
    pub default: Option<String>,
    pub response: Option<String>,
    pub embedding: Option<String>,
}

impl ModelSet {
    /// The model used for chat completions.
    pub fn response_model(&self) -> Option<&str> {
        self.response.as_deref().or(self.default.as_deref())
    }

    /// The model used for embeddings.
    pub fn embedding_model(&self) -> Option<&str> {
        self.embedding.as_deref().or(self.default.as_deref())
    }
}

/// Default generation parameters for one provider.
#[derive(Debug, Clone)]
pub struct ProviderParameters {
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
    pub dimensions: Option<usize>,
}

impl Default for ProviderParameters {
    fn default() -> Self {
        Self {
            temperature: 0.3,
            top_p: 0.9,
            max_tokens: 1000,
            dimensions: None,
        }
    }
}

/// One entry in the provider table.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Name of the environment variable holding the API secret.
    pub api_key_env: Option<String>,
    /// Optional endpoint override for OpenAI-compatible APIs.
    pub base_url: Option<String>,
    /// Runs in-process instead of over HTTP.
    pub local: bool,
    pub models: ModelSet,
    pub parameters: ProviderParameters,
}

/// Ordered provider selection for chat and embedding calls.
#[derive(Debug, Clone)]
pub struct ProvidersConfig {
    pub priority: Vec<String>,
    pub embedding_priority: Vec<String>,
    pub table: HashMap<String, ProviderConfig>,
}

impl ProvidersConfig {
    /// Returns the configuration block for a provider name.
    pub fn get(&self, name: &str) -> Option<&ProviderConfig> {
        self.table.get(name)
    }
}

/// Cache tier configuration.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Shared-cache endpoint; `None` disables that tier.
    pub redis_url: Option<String>,
    /// Disk-cache directory; `None` disables that tier.
    pub embedding_cache_dir: Option<PathBuf>,
    pub embedding_ttl: Duration,
    pub answer_ttl: Duration,
    pub embedding_capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            embedding_cache_dir: Some(PathBuf::from("./data/embedding_cache")),
            embedding_ttl: constants::DEFAULT_EMBEDDING_TTL,
            answer_ttl: constants::DEFAULT_ANSWER_TTL,
            embedding_capacity: constants::DEFAULT_EMBEDDING_CACHE_CAPACITY,
        }
    }
}

/// A domain-specific score boost: when the query contains one of the
/// keywords, candidates of the given document type have their combined
/// score multiplied.
#[derive(Debug, Clone)]
pub struct BoostRule {
    pub keywords: Vec<String>,
    pub document_type: String,
    pub multiplier: f32,
}

/// Retrieval tuning.
#[derive(Debug, Clone)]
pub struct RetrieverConfig {
    pub default_corpus: String,
    pub boost_rules: Vec<BoostRule>,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            default_corpus: constants::DEFAULT_CORPUS.to_string(),
            boost_rules: vec![
                BoostRule {
                    keywords: vec!["traité".to_string()],
                    document_type: "presentation_ohada".to_string(),
                    multiplier: 1.5,
                },
                BoostRule {
                    keywords: vec![
                        "compte".to_string(),
                        "comptable".to_string(),
                        "bilan".to_string(),
                        "syscohada".to_string(),
                        "journal".to_string(),
                    ],
                    document_type: "chapitre".to_string(),
                    multiplier: 1.2,
                },
            ],
        }
    }
}

/// Persona shaping direct (non-retrieval) replies.
#[derive(Debug, Clone)]
pub struct AssistantPersonality {
    pub name: String,
    pub expertise: String,
    pub region: String,
    pub language: String,
    pub tone: String,
}

impl Default for AssistantPersonality {
    fn default() -> Self {
        Self {
            name: "Expert OHADA".to_string(),
            expertise: "comptabilité et normes SYSCOHADA".to_string(),
            region: "zone OHADA (Afrique)".to_string(),
            language: "fr".to_string(),
            tone: "professionnel".to_string(),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub environment: Environment,

    pub port: u16,

    pub bind_addr: IpAddr,

    pub qdrant_url: String,

    pub database_url: Option<String>,

    pub bm25_cache_dir: PathBuf,

    pub local_model_path: Option<PathBuf>,

    pub reranker_path: Option<PathBuf>,

    pub providers: ProvidersConfig,

    pub cache: CacheConfig,

    pub retriever: RetrieverConfig,

    pub personality: AssistantPersonality,

    pub deadline: Duration,
}

pub const DEFAULT_QDRANT_URL: &str = "http://localhost:6334";

impl Default for Config {
    fn default() -> Self {
        Self::for_environment(Environment::Test)
    }
}

impl Config {
    const ENV_ENVIRONMENT: &'static str = "OHADEX_ENV";
    const ENV_PORT: &'static str = "OHADEX_PORT";
    const ENV_BIND_ADDR: &'static str = "OHADEX_BIND_ADDR";
    const ENV_QDRANT_URL: &'static str = "OHADEX_QDRANT_URL";
    const ENV_REDIS_URL: &'static str = "OHADEX_REDIS_URL";
    const ENV_DATABASE_URL: &'static str = "OHADEX_DATABASE_URL";
    const ENV_BM25_CACHE_DIR: &'static str = "OHADEX_BM25_CACHE_DIR";
    const ENV_EMBEDDING_CACHE_DIR: &'static str = "OHADEX_EMBEDDING_CACHE_DIR";
    const ENV_LOCAL_MODEL_PATH: &'static str = "OHADEX_LOCAL_MODEL_PATH";
    const ENV_RERANKER_PATH: &'static str = "OHADEX_RERANKER_PATH";
    const ENV_EMBEDDING_CAPACITY: &'static str = "OHADEX_EMBEDDING_CACHE_CAPACITY";
    const ENV_DEADLINE_SECS: &'static str = "OHADEX_DEADLINE_SECS";

    /// Builds the default configuration for an environment.
    pub fn for_environment(environment: Environment) -> Self {
        Self {
            environment,
            port: 8080,
            bind_addr: IpAddr::V4(std::net::Ipv4Addr::new(127, 0, 0, 1)),
            qdrant_url: DEFAULT_QDRANT_URL.to_string(),
            database_url: None,
            bm25_cache_dir: PathBuf::from("./data/bm25_cache"),
            local_model_path: None,
            reranker_path: None,
            providers: default_providers(environment),
            cache: CacheConfig::default(),
            retriever: RetrieverConfig::default(),
            personality: AssistantPersonality::default(),
            deadline: constants::DEFAULT_DEADLINE,
        }
    }

    /// Loads configuration from the environment, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let environment = match env::var(Self::ENV_ENVIRONMENT) {
            Ok(value) => Environment::parse(&value)?,
            Err(_) => Environment::Test,
        };

        let mut config = Self::for_environment(environment);

        config.port = Self::parse_port_from_env(config.port)?;
        config.bind_addr = Self::parse_bind_addr_from_env(config.bind_addr)?;
        config.qdrant_url = Self::parse_string_from_env(Self::ENV_QDRANT_URL, config.qdrant_url);
        config.database_url = Self::parse_optional_string_from_env(Self::ENV_DATABASE_URL);
        config.bm25_cache_dir =
            Self::parse_path_from_env(Self::ENV_BM25_CACHE_DIR, config.bm25_cache_dir);
        config.local_model_path = Self::parse_optional_path_from_env(Self::ENV_LOCAL_MODEL_PATH);
        config.reranker_path = Self::parse_optional_path_from_env(Self::ENV_RERANKER_PATH);

        config.cache.redis_url = Self::parse_optional_string_from_env(Self::ENV_REDIS_URL);
        if let Some(dir) = Self::parse_optional_path_from_env(Self::ENV_EMBEDDING_CACHE_DIR) {
            config.cache.embedding_cache_dir = Some(dir);
        }
        config.cache.embedding_capacity = Self::parse_usize_from_env(
            Self::ENV_EMBEDDING_CAPACITY,
            config.cache.embedding_capacity,
        );

        if let Some(secs) = env::var(Self::ENV_DEADLINE_SECS)
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
        {
            config.deadline = Duration::from_secs(secs);
        }

        Ok(config)
    }

    /// Validates paths and provider priority lists.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bm25_cache_dir.exists() && !self.bm25_cache_dir.is_dir() {
            return Err(ConfigError::NotADirectory {
                path: self.bm25_cache_dir.clone(),
            });
        }

        if let Some(ref path) = self.local_model_path
            && !path.exists()
        {
            return Err(ConfigError::PathNotFound { path: path.clone() });
        }

        if let Some(ref path) = self.reranker_path
            && !path.exists()
        {
            return Err(ConfigError::PathNotFound { path: path.clone() });
        }

        for name in self
            .providers
            .priority
            .iter()
            .chain(self.providers.embedding_priority.iter())
        {
            if !self.providers.table.contains_key(name) {
                return Err(ConfigError::UnknownProvider {
                    provider: name.clone(),
                });
            }
        }

        Ok(())
    }

    /// The socket address the server binds to.
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }

    /// The embedding dimension implied by the embedding priority list.
    pub fn embedding_dimension(&self) -> usize {
        self.providers
            .embedding_priority
            .iter()
            .filter_map(|name| self.providers.get(name))
            .filter_map(|p| p.parameters.dimensions)
            .next()
            .unwrap_or(constants::DEFAULT_EMBEDDING_DIM)
    }

    fn parse_port_from_env(default: u16) -> Result<u16, ConfigError> {
        match env::var(Self::ENV_PORT) {
            Ok(value) => {
                let port: u16 = value.parse().map_err(|e| ConfigError::PortParseError {
                    value: value.clone(),
                    source: e,
                })?;

                if port == 0 {
                    return Err(ConfigError::InvalidPort { value });
                }

                Ok(port)
            }
            Err(_) => Ok(default),
        }
    }

    fn parse_bind_addr_from_env(default: IpAddr) -> Result<IpAddr, ConfigError> {
        match env::var(Self::ENV_BIND_ADDR) {
            Ok(value) => value
                .parse()
                .map_err(|e| ConfigError::InvalidBindAddr { value, source: e }),
            Err(_) => Ok(default),
        }
    }

    fn parse_path_from_env(var_name: &str, default: PathBuf) -> PathBuf {
        env::var(var_name).map(PathBuf::from).unwrap_or(default)
    }

    fn parse_optional_path_from_env(var_name: &str) -> Option<PathBuf> {
        Self::parse_optional_string_from_env(var_name).map(PathBuf::from)
    }

    fn parse_optional_string_from_env(var_name: &str) -> Option<String> {
        env::var(var_name)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parse_string_from_env(var_name: &str, default: String) -> String {
        env::var(var_name).unwrap_or(default)
    }

    fn parse_usize_from_env(var_name: &str, default: usize) -> usize {
        env::var(var_name)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }
}

fn default_providers(environment: Environment) -> ProvidersConfig {
    let mut table = HashMap::new();

    table.insert(
        "openai".to_string(),
        ProviderConfig {
            api_key_env: Some("OPENAI_API_KEY".to_string()),
            base_url: None,
            local: false,
            models: ModelSet {
                default: Some("gpt-4o-mini".to_string()),
                response: Some("gpt-4o-mini".to_string()),
                embedding: Some("text-embedding-3-small".to_string()),
            },
            parameters: ProviderParameters {
                temperature: 0.3,
                top_p: 0.9,
                max_tokens: 1000,
                dimensions: Some(constants::DEFAULT_EMBEDDING_DIM),
            },
        },
    );

    table.insert(
        "deepseek".to_string(),
        ProviderConfig {
            api_key_env: Some("DEEPSEEK_API_KEY".to_string()),
            base_url: Some("https://api.deepseek.com/v1".to_string()),
            local: false,
            models: ModelSet {
                default: Some("deepseek-chat".to_string()),
                response: Some("deepseek-chat".to_string()),
                embedding: None,
            },
            parameters: ProviderParameters {
                temperature: 0.3,
                top_p: 0.9,
                max_tokens: 1500,
                dimensions: None,
            },
        },
    );

    table.insert(
        "local_embedding".to_string(),
        ProviderConfig {
            api_key_env: None,
            base_url: None,
            local: true,
            models: ModelSet {
                default: None,
                response: None,
                embedding: Some("bge-m3".to_string()),
            },
            parameters: ProviderParameters {
                dimensions: Some(constants::LOCAL_EMBEDDING_DIM),
                ..Default::default()
            },
        },
    );

    let embedding_priority = match environment {
        Environment::Test => vec!["local_embedding".to_string(), "openai".to_string()],
        Environment::Production => vec!["openai".to_string()],
    };

    ProvidersConfig {
        priority: vec!["openai".to_string(), "deepseek".to_string()],
        embedding_priority,
        table,
    }
}
