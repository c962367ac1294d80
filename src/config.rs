//! TOML configuration.
//!
//! Every section and field has a default, so an empty file (or no file at
//! all) yields a runnable configuration. See `config/study.example.toml`.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub transcript: TranscriptConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Parent of every per-user workspace.
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,
    /// Directory holding one `{key}.json` file per cache entry.
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
            cache_dir: default_cache_dir(),
        }
    }
}

fn default_base_dir() -> PathBuf {
    PathBuf::from("./user_data")
}
fn default_cache_dir() -> PathBuf {
    PathBuf::from("./cache")
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
        }
    }
}

fn default_ttl_secs() -> u64 {
    3600
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Maximum chunk length in characters.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Characters shared between consecutive chunks.
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    2000
}
fn default_chunk_overlap() -> usize {
    100
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_generation_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
    /// Upper bound accepted for `num_questions` on quiz requests.
    #[serde(default = "default_max_questions")]
    pub max_questions: usize,
    #[serde(default = "default_max_questions_per_batch")]
    pub max_questions_per_batch: usize,
    #[serde(default = "default_num_questions")]
    pub default_num_questions: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            batch_size: default_generation_batch_size(),
            similarity_threshold: default_similarity_threshold(),
            max_questions: default_max_questions(),
            max_questions_per_batch: default_max_questions_per_batch(),
            default_num_questions: default_num_questions(),
        }
    }
}

fn default_generation_batch_size() -> usize {
    7
}
fn default_similarity_threshold() -> f64 {
    0.85
}
fn default_max_questions() -> usize {
    50
}
fn default_max_questions_per_batch() -> usize {
    5
}
fn default_num_questions() -> usize {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    /// `gemini`, `openai`, or `disabled`.
    #[serde(default = "default_llm_provider")]
    pub provider: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    /// Base URL override. Defaults depend on the provider.
    #[serde(default)]
    pub url: Option<String>,
    /// Environment variable holding the API key.
    #[serde(default = "default_llm_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            model: default_llm_model(),
            url: None,
            api_key_env: default_llm_api_key_env(),
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

fn default_llm_provider() -> String {
    "gemini".to_string()
}
fn default_llm_model() -> String {
    "gemini-2.0-flash-lite".to_string()
}
fn default_llm_api_key_env() -> String {
    "GOOGLE_API_KEY".to_string()
}
fn default_llm_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL for the `ollama` provider.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_embedding_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_embedding_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_embedding_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_embedding_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_embedding_provider() -> String {
    "disabled".to_string()
}
fn default_embedding_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_embedding_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct TranscriptConfig {
    #[serde(default = "default_transcript_timeout_secs")]
    pub timeout_secs: u64,
    /// Preferred caption language; falls back to the first track.
    #[serde(default = "default_transcript_language")]
    pub language: String,
}

impl Default for TranscriptConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_transcript_timeout_secs(),
            language: default_transcript_language(),
        }
    }
}

fn default_transcript_timeout_secs() -> u64 {
    30
}
fn default_transcript_language() -> String {
    "en".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:5000".to_string()
}
fn default_max_upload_bytes() -> usize {
    16 * 1024 * 1024
}

/// Load and validate the configuration at `path`.
///
/// A missing file is not an error: the defaults are used instead, matching
/// a fresh checkout where nothing has been configured yet.
pub fn load_config(path: &Path) -> Result<Config> {
    let config: Config = if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content).with_context(|| "Failed to parse config file")?
    } else {
        Config::default()
    };

    validate(&config)?;
    Ok(config)
}

/// Reject configurations the pipeline cannot run with.
pub fn validate(config: &Config) -> Result<()> {
    // Validate chunking
    if config.chunking.chunk_size == 0 {
        anyhow::bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.chunk_overlap >= config.chunking.chunk_size {
        anyhow::bail!("chunking.chunk_overlap must be smaller than chunking.chunk_size");
    }

    // Validate generation
    if config.generation.batch_size == 0 {
        anyhow::bail!("generation.batch_size must be > 0");
    }
    if !(0.0..=1.0).contains(&config.generation.similarity_threshold) {
        anyhow::bail!("generation.similarity_threshold must be in [0.0, 1.0]");
    }
    if config.generation.max_questions == 0 || config.generation.max_questions_per_batch == 0 {
        anyhow::bail!("generation.max_questions and max_questions_per_batch must be > 0");
    }

    match config.llm.provider.as_str() {
        "gemini" | "openai" | "disabled" => {}
        other => anyhow::bail!(
            "Unknown llm provider: '{}'. Must be gemini, openai, or disabled.",
            other
        ),
    }

    // Validate embedding
    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, or ollama.",
            other
        ),
    }
    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    Ok(())
}
