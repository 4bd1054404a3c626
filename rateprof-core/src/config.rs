use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct RagConfig {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub vector_index: VectorIndexConfig,
    #[serde(default)]
    pub completion: CompletionConfig,
    #[serde(default)]
    pub retry: RetryConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServiceConfig {
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub url: String,
    /// JSON field of the response body holding the vector.
    pub response_field: String,
    pub dimensions: Option<usize>,
    pub api_key: Option<String>,
    pub timeout_seconds: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8000/embeddings/".to_string(),
            response_field: "embeddings".to_string(),
            dimensions: None,
            api_key: None,
            timeout_seconds: 30,
        }
    }
}

impl EmbeddingConfig {
    /// The embedding service is usually a local sidecar, so a key is optional.
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var("EMBEDDING_API_KEY").ok())
            .filter(|k| !k.is_empty())
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct VectorIndexConfig {
    pub index: String,
    pub namespace: String,
    /// Data-plane host. When unset it is looked up from `controller_url`.
    pub host: Option<String>,
    pub controller_url: String,
    pub api_key: Option<String>,
    pub timeout_seconds: u64,
}

impl Default for VectorIndexConfig {
    fn default() -> Self {
        Self {
            index: "rag2".to_string(),
            namespace: "ns1".to_string(),
            host: None,
            controller_url: "https://api.pinecone.io".to_string(),
            api_key: None,
            timeout_seconds: 30,
        }
    }
}

impl VectorIndexConfig {
    pub fn resolved_api_key(&self) -> String {
        self.api_key
            .clone()
            .or_else(|| std::env::var("PINECONE_API_KEY").ok())
            .unwrap_or_default()
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CompletionConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub system_prompt: Option<String>,
    pub connect_timeout_seconds: u64,
    /// Budget for the upstream to start answering (status line + headers).
    pub response_timeout_seconds: u64,
    /// Longest allowed silence between two reads of the event stream.
    pub idle_timeout_seconds: u64,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key: None,
            system_prompt: None,
            connect_timeout_seconds: 10,
            response_timeout_seconds: 60,
            idle_timeout_seconds: 60,
        }
    }
}

impl CompletionConfig {
    pub fn resolved_api_key(&self) -> String {
        self.api_key
            .clone()
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .unwrap_or_default()
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt; 0 means a single attempt.
    pub max_retries: usize,
    pub retry_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            retry_delay_ms: 200,
            max_delay_ms: 5_000,
        }
    }
}

impl RagConfig {
    /// Load `path` (optional, any format `config` understands) and layer
    /// `RATEPROF__SECTION__KEY` environment variables on top.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(Environment::with_prefix("RATEPROF").separator("__"))
            .build()?;
        s.try_deserialize()
    }
}
