//! Typed configuration tree.
//!
//! Every section has serde defaults, so an empty `config.yml` yields a
//! runnable service: DuckDuckGo search, a local Ollama for both the answer
//! model and embeddings, and reranking by embedding similarity.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::errors::ApiError;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub search: SearchSettings,
    pub scraper: ScraperSettings,
    pub chunking: ChunkingSettings,
    pub llm: LlmSettings,
    pub embedding: EmbeddingSettings,
    pub reranker: RerankerSettings,
    pub auth: AuthSettings,
}

impl Settings {
    pub fn from_value(value: &Value) -> Result<Self, ApiError> {
        serde_json::from_value(value.clone())
            .map_err(|e| ApiError::BadRequest(format!("Invalid configuration: {}", e)))
    }

    /// Number of candidates pulled from the index before reranking.
    pub fn retrieval_limit(&self) -> usize {
        self.search.results_limit * 2
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub cors_allowed_origins: Vec<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            cors_allowed_origins: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    /// `duckduckgo`, `google`, `brave` or `bing`.
    pub provider: String,
    /// Web results requested per query.
    pub max_results: usize,
    /// Final context size the retriever over-fetches for (x2).
    pub results_limit: usize,
    pub timeout_secs: u64,
    pub google_api_key: String,
    pub google_engine_id: String,
    pub brave_api_key: String,
    pub bing_api_key: String,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            provider: "duckduckgo".to_string(),
            max_results: 10,
            results_limit: 20,
            timeout_secs: 15,
            google_api_key: String::new(),
            google_engine_id: String::new(),
            brave_api_key: String::new(),
            bing_api_key: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScraperSettings {
    pub timeout_secs: u64,
    pub user_agent: String,
    pub max_chars: usize,
    /// Pages fetched at once. 1 fetches one URL at a time.
    pub concurrency: usize,
}

impl Default for ScraperSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36".to_string(),
            max_chars: 100_000,
            concurrency: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingSettings {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkingSettings {
    fn default() -> Self {
        Self {
            chunk_size: 800,
            chunk_overlap: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    /// `ollama`, `openai` (any OpenAI-compatible server) or `gemini`.
    pub provider: String,
    pub base_url: String,
    pub model: String,
    pub api_key: String,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    pub timeout_secs: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            base_url: "http://localhost:11434".to_string(),
            model: "llama3".to_string(),
            api_key: String::new(),
            temperature: None,
            max_tokens: None,
            timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    /// `ollama` or `openai`.
    pub provider: String,
    pub base_url: String,
    pub model: String,
    pub api_key: String,
    pub timeout_secs: u64,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            base_url: "http://localhost:11434".to_string(),
            model: "all-minilm".to_string(),
            api_key: String::new(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RerankerSettings {
    pub enabled: bool,
    /// `embedding` (cosine over the embedder) or `cross_encoder` (HTTP `/rerank`).
    pub provider: String,
    pub base_url: String,
    pub model: String,
    pub top_k: usize,
    pub timeout_secs: u64,
}

impl Default for RerankerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            provider: "embedding".to_string(),
            base_url: "http://localhost:8080".to_string(),
            model: "cross-encoder/ms-marco-MiniLM-L-6-v2".to_string(),
            top_k: 5,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    pub enabled: bool,
    /// HS256 signing key. Empty means a random key per process.
    pub secret_key: String,
    pub access_token_expire_minutes: i64,
    pub login_attempts_per_minute: u32,
    pub admin_email: String,
    pub admin_password: String,
    pub admin_username: String,
    pub admin_full_name: String,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            secret_key: String::new(),
            access_token_expire_minutes: 1440,
            login_attempts_per_minute: 10,
            admin_email: "admin@financerag.com".to_string(),
            admin_password: "Admin@123".to_string(),
            admin_username: "admin".to_string(),
            admin_full_name: "System Administrator".to_string(),
        }
    }
}
