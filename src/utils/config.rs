//! Environment-driven configuration.
//!
//! All provider credentials and tuning knobs are collected once at startup
//! into an immutable [`CoreConfig`] that is passed to constructors. Missing
//! credentials for the selected vendor fail fast with a configuration error
//! rather than surfacing on the first request.

use serde::Deserialize;
use std::env;

use crate::types::{AppError, Result};

/// Credentials and endpoint for the selected chat/embedding vendor.
///
/// Azure OpenAI takes precedence when both endpoint and key are present,
/// otherwise plain OpenAI is used.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "vendor", rename_all = "lowercase")]
pub enum VendorConfig {
    /// OpenAI API (or an API-compatible endpoint).
    OpenAi {
        /// API key.
        api_key: String,
        /// Base URL, e.g. `https://api.openai.com/v1`.
        api_base: String,
        /// Chat model name.
        chat_model: String,
    },
    /// Azure OpenAI deployments.
    Azure {
        /// Resource endpoint, e.g. `https://myresource.openai.azure.com`.
        endpoint: String,
        /// API key.
        api_key: String,
        /// API version query parameter.
        api_version: String,
        /// Chat deployment name.
        chat_deployment: String,
        /// Embedding deployment name.
        embedding_deployment: String,
    },
}

impl VendorConfig {
    /// Human-readable vendor name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::OpenAi { .. } => "openai",
            Self::Azure { .. } => "azure",
        }
    }
}

/// Embedding model settings.
#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingConfig {
    /// Embedding model name (OpenAI) or informational label (Azure).
    pub model: String,
    /// Expected vector dimensionality.
    pub dimensions: usize,
    /// Maximum accepted input length in characters.
    pub max_input_chars: usize,
    /// Number of texts per embeddings API call.
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "text-embedding-3-small".to_string(),
            dimensions: 1536,
            max_input_chars: 24_000,
            batch_size: 100,
        }
    }
}

/// Chunking window settings, in words.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ChunkingConfig {
    /// Words per chunk window.
    pub chunk_size: usize,
    /// Words shared with the previous window.
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 220,
            chunk_overlap: 40,
        }
    }
}

impl ChunkingConfig {
    /// Reject windows the chunker cannot advance through.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(AppError::Configuration("chunk_size must be > 0".into()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(AppError::Configuration(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

/// Retrieval engine tuning.
///
/// The fallback and floor values are deliberately configuration, not
/// algorithmic constants; no specific number carries meaning beyond what
/// is configured here.
#[derive(Debug, Clone, Deserialize)]
pub struct RetrievalConfig {
    /// Default number of sources returned.
    pub top_k: usize,
    /// Minimum similarity score for a kNN hit to count.
    pub score_floor: f32,
    /// Whether to degrade to lexical search when embedding or kNN fails.
    pub text_fallback: bool,
    /// Over-fetch multiplier applied before per-record deduplication.
    pub dedup_overfetch: usize,
    /// Maximum excerpt length, in characters, for displayed sources.
    pub excerpt_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 3,
            score_floor: 0.0,
            text_fallback: true,
            dedup_overfetch: 3,
            excerpt_chars: 200,
        }
    }
}

/// Chat generation parameters.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct GenerationConfig {
    /// Maximum tokens per completion.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_tokens: 1000,
            temperature: 0.1,
        }
    }
}

/// Ingestion pipeline tuning.
#[derive(Debug, Clone, Deserialize)]
pub struct IngestConfig {
    /// Records per embed-and-upsert batch.
    pub batch_size: usize,
    /// Embedding batches processed concurrently.
    pub max_concurrent_batches: usize,
    /// Ids sampled by the post-ingestion verify step.
    pub verify_sample: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            batch_size: 500,
            max_concurrent_batches: 4,
            verify_sample: 5,
        }
    }
}

/// Root configuration for the MedQuery core.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Selected chat/embedding vendor.
    pub vendor: VendorConfig,
    /// Embedding model settings.
    pub embedding: EmbeddingConfig,
    /// Chunking window settings.
    pub chunking: ChunkingConfig,
    /// Retrieval engine tuning.
    pub retrieval: RetrievalConfig,
    /// Chat generation parameters.
    pub generation: GenerationConfig,
    /// Ingestion pipeline tuning.
    pub ingest: IngestConfig,
}

impl CoreConfig {
    /// Load configuration from environment variables (and `.env` if present).
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Configuration`] when no vendor credentials are
    /// available or a numeric variable fails to parse.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let vendor = Self::vendor_from_env()?;

        let config = Self {
            vendor,
            embedding: EmbeddingConfig {
                model: env_or("EMBEDDING_MODEL", "text-embedding-3-small"),
                dimensions: env_parse("EMBEDDING_DIMENSIONS", 1536)?,
                max_input_chars: env_parse("EMBEDDING_MAX_INPUT_CHARS", 24_000)?,
                batch_size: env_parse("EMBEDDING_BATCH_SIZE", 100)?,
            },
            chunking: ChunkingConfig {
                chunk_size: env_parse("CHUNK_SIZE", 220)?,
                chunk_overlap: env_parse("CHUNK_OVERLAP", 40)?,
            },
            retrieval: RetrievalConfig {
                top_k: env_parse("RAG_TOP_K", 3)?,
                score_floor: env_parse("RAG_SCORE_FLOOR", 0.0)?,
                text_fallback: env_parse("RAG_TEXT_FALLBACK", true)?,
                dedup_overfetch: env_parse("RAG_DEDUP_OVERFETCH", 3)?,
                excerpt_chars: env_parse("RAG_EXCERPT_CHARS", 200)?,
            },
            generation: GenerationConfig {
                max_tokens: env_parse("MAX_TOKENS", 1000)?,
                temperature: env_parse("TEMPERATURE", 0.1)?,
            },
            ingest: IngestConfig {
                batch_size: env_parse("INGEST_BATCH_SIZE", 500)?,
                max_concurrent_batches: env_parse("INGEST_CONCURRENCY", 4)?,
                verify_sample: env_parse("INGEST_VERIFY_SAMPLE", 5)?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Build a config around an explicit vendor, with default tuning.
    /// Useful for tests and embedded setups.
    pub fn with_vendor(vendor: VendorConfig) -> Self {
        Self {
            vendor,
            embedding: EmbeddingConfig::default(),
            chunking: ChunkingConfig::default(),
            retrieval: RetrievalConfig::default(),
            generation: GenerationConfig::default(),
            ingest: IngestConfig::default(),
        }
    }

    /// Validate cross-field invariants. Called by [`from_env`](Self::from_env).
    pub fn validate(&self) -> Result<()> {
        self.chunking.validate()?;
        if self.embedding.dimensions == 0 {
            return Err(AppError::Configuration(
                "EMBEDDING_DIMENSIONS must be > 0".into(),
            ));
        }
        if self.retrieval.dedup_overfetch == 0 {
            return Err(AppError::Configuration(
                "RAG_DEDUP_OVERFETCH must be > 0".into(),
            ));
        }
        match &self.vendor {
            VendorConfig::OpenAi { api_key, .. } if api_key.is_empty() => Err(
                AppError::Configuration("OPENAI_API_KEY must not be empty".into()),
            ),
            VendorConfig::Azure {
                endpoint, api_key, ..
            } if endpoint.is_empty() || api_key.is_empty() => Err(AppError::Configuration(
                "Azure OpenAI endpoint and key must not be empty".into(),
            )),
            _ => Ok(()),
        }
    }

    fn vendor_from_env() -> Result<VendorConfig> {
        let azure_endpoint = env::var("AZURE_OPENAI_ENDPOINT").ok();
        let azure_key = env::var("AZURE_OPENAI_API_KEY").ok();

        if let (Some(endpoint), Some(api_key)) = (azure_endpoint, azure_key) {
            return Ok(VendorConfig::Azure {
                endpoint,
                api_key,
                api_version: env_or("AZURE_OPENAI_API_VERSION", "2024-06-01"),
                chat_deployment: env_or("AZURE_OPENAI_DEPLOYMENT_NAME", "gpt-4"),
                embedding_deployment: env_or(
                    "AZURE_OPENAI_EMBEDDING_DEPLOYMENT",
                    "text-embedding-3-small",
                ),
            });
        }

        match env::var("OPENAI_API_KEY") {
            Ok(api_key) => Ok(VendorConfig::OpenAi {
                api_key,
                api_base: env_or("OPENAI_API_BASE", "https://api.openai.com/v1"),
                chat_model: env_or("OPENAI_CHAT_MODEL", "gpt-4"),
            }),
            Err(_) => Err(AppError::Configuration(
                "no provider credentials: set OPENAI_API_KEY or \
                 AZURE_OPENAI_ENDPOINT + AZURE_OPENAI_API_KEY"
                    .into(),
            )),
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw.parse().map_err(|e| {
            AppError::Configuration(format!("failed to parse {} = '{}': {}", key, raw, e))
        }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn openai_vendor() -> VendorConfig {
        VendorConfig::OpenAi {
            api_key: "sk-test".into(),
            api_base: "https://api.openai.com/v1".into(),
            chat_model: "gpt-4".into(),
        }
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = CoreConfig::with_vendor(openai_vendor());
        assert!(config.validate().is_ok());
        assert_eq!(config.chunking.chunk_size, 220);
        assert_eq!(config.chunking.chunk_overlap, 40);
        assert_eq!(config.retrieval.top_k, 3);
        assert_eq!(config.embedding.dimensions, 1536);
    }

    #[test]
    fn test_overlap_must_be_smaller_than_window() {
        let mut config = CoreConfig::with_vendor(openai_vendor());
        config.chunking.chunk_overlap = 220;
        assert!(matches!(
            config.validate(),
            Err(AppError::Configuration(_))
        ));
    }

    #[test]
    fn test_empty_api_key_rejected() {
        let config = CoreConfig::with_vendor(VendorConfig::OpenAi {
            api_key: String::new(),
            api_base: "https://api.openai.com/v1".into(),
            chat_model: "gpt-4".into(),
        });
        assert!(matches!(
            config.validate(),
            Err(AppError::Configuration(_))
        ));
    }

    #[test]
    fn test_vendor_name() {
        assert_eq!(openai_vendor().name(), "openai");
    }
}
