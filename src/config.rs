//! TOML configuration.
//!
//! Every section carries serde defaults, so an empty file is a valid
//! configuration: a `hash` embedder, the threshold grader, and DuckDuckGo
//! as the only fallback provider. [`load_config`] parses and validates.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use docshelf_core::chunk::{ChunkParams, DEFAULT_CHILD_CHARS, DEFAULT_PARENT_CHARS};
use docshelf_core::embedding::DEFAULT_HASH_DIMS;
use docshelf_core::grade::DEFAULT_MIN_SCORE;
use docshelf_core::retrieve::DEFAULT_OVERFETCH;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub fallback: FallbackConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub toc: TocConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./data/docshelf.sqlite")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_parent_chars")]
    pub parent_chars: usize,
    #[serde(default = "default_child_chars")]
    pub child_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            parent_chars: DEFAULT_PARENT_CHARS,
            child_chars: DEFAULT_CHILD_CHARS,
        }
    }
}

impl ChunkingConfig {
    pub fn params(&self) -> ChunkParams {
        ChunkParams {
            parent_chars: self.parent_chars,
            child_chars: self.child_chars,
        }
    }
}

fn default_parent_chars() -> usize {
    DEFAULT_PARENT_CHARS
}
fn default_child_chars() -> usize {
    DEFAULT_CHILD_CHARS
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_overfetch")]
    pub overfetch: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            overfetch: DEFAULT_OVERFETCH,
        }
    }
}

fn default_top_k() -> usize {
    5
}
fn default_overfetch() -> usize {
    DEFAULT_OVERFETCH
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Ollama base URL.
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            url: None,
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }

    pub fn is_remote(&self) -> bool {
        matches!(self.provider.as_str(), "openai" | "ollama")
    }

    /// Vector dimensionality, falling back to the hash default.
    pub fn effective_dims(&self) -> usize {
        self.dims.unwrap_or(DEFAULT_HASH_DIMS)
    }
}

fn default_embedding_provider() -> String {
    "hash".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct FallbackConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// `threshold` or `llm`.
    #[serde(default = "default_grader")]
    pub grader: String,
    #[serde(default = "default_min_score")]
    pub min_score: f64,
    /// Web search providers, tried in order.
    #[serde(default = "default_search_providers")]
    pub providers: Vec<String>,
    #[serde(default = "default_max_results")]
    pub max_results: u32,
    #[serde(default = "default_fallback_timeout")]
    pub timeout_secs: u64,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            grader: default_grader(),
            min_score: DEFAULT_MIN_SCORE,
            providers: default_search_providers(),
            max_results: default_max_results(),
            timeout_secs: default_fallback_timeout(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_grader() -> String {
    "threshold".to_string()
}
fn default_min_score() -> f64 {
    DEFAULT_MIN_SCORE
}
fn default_search_providers() -> Vec<String> {
    vec!["duckduckgo".to_string()]
}
fn default_max_results() -> u32 {
    3
}
fn default_fallback_timeout() -> u64 {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    /// `disabled` or `openai` (any OpenAI-compatible chat endpoint).
    #[serde(default = "default_llm_provider")]
    pub provider: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_llm_url")]
    pub url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_llm_retries")]
    pub max_retries: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            model: default_llm_model(),
            url: default_llm_url(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_llm_retries(),
        }
    }
}

impl LlmConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_llm_provider() -> String {
    "disabled".to_string()
}
fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_llm_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_llm_retries() -> u32 {
    3
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct TocConfig {
    /// Enable the model-based tier (requires `[llm]`).
    #[serde(default)]
    pub model_tier: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
        }
    }
}

fn default_include_globs() -> Vec<String> {
    ["**/*.md", "**/*.txt", "**/*.pdf", "**/*.docx"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Parse and validate configuration text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    // Validate chunking
    let chunking = &config.chunking;
    if chunking.parent_chars == 0 || chunking.child_chars == 0 {
        bail!("chunking.parent_chars and chunking.child_chars must be > 0");
    }
    if chunking.child_chars > chunking.parent_chars {
        bail!(
            "chunking.child_chars ({}) must not exceed chunking.parent_chars ({})",
            chunking.child_chars,
            chunking.parent_chars
        );
    }

    // Validate retrieval
    if config.retrieval.top_k < 1 {
        bail!("retrieval.top_k must be >= 1");
    }
    if config.retrieval.overfetch < 1 {
        bail!("retrieval.overfetch must be >= 1");
    }

    // Validate embedding
    let embedding = &config.embedding;
    match embedding.provider.as_str() {
        "disabled" | "hash" | "openai" | "ollama" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled, hash, openai, or ollama.",
            other
        ),
    }
    if embedding.is_remote() {
        if embedding.dims.is_none() || embedding.dims == Some(0) {
            bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                embedding.provider
            );
        }
        if embedding.model.is_none() {
            bail!(
                "embedding.model must be specified when provider is '{}'",
                embedding.provider
            );
        }
    }
    if embedding.dims == Some(0) {
        bail!("embedding.dims must be > 0");
    }
    if embedding.batch_size == 0 {
        bail!("embedding.batch_size must be > 0");
    }

    // Validate fallback
    let fallback = &config.fallback;
    if !fallback.min_score.is_finite() {
        bail!("fallback.min_score must be a finite number");
    }
    match fallback.grader.as_str() {
        "threshold" => {}
        "llm" => {
            if !config.llm.is_enabled() {
                bail!("fallback.grader = \"llm\" requires an [llm] provider");
            }
        }
        other => bail!(
            "Unknown fallback grader: '{}'. Must be threshold or llm.",
            other
        ),
    }
    for provider in &fallback.providers {
        match provider.as_str() {
            "tavily" | "brave" | "duckduckgo" => {}
            other => bail!(
                "Unknown search provider: '{}'. Supported: tavily, brave, duckduckgo",
                other
            ),
        }
    }
    if fallback.timeout_secs == 0 {
        bail!("fallback.timeout_secs must be > 0");
    }

    // Validate llm
    match config.llm.provider.as_str() {
        "disabled" | "openai" => {}
        other => bail!("Unknown llm provider: '{}'. Must be disabled or openai.", other),
    }
    if config.toc.model_tier && !config.llm.is_enabled() {
        bail!("toc.model_tier requires an [llm] provider");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let cfg = parse_config("").unwrap();
        assert_eq!(cfg.chunking.parent_chars, 2000);
        assert_eq!(cfg.chunking.child_chars, 400);
        assert_eq!(cfg.retrieval.overfetch, 3);
        assert_eq!(cfg.embedding.provider, "hash");
        assert_eq!(cfg.embedding.effective_dims(), 256);
        assert!(cfg.fallback.enabled);
        assert_eq!(cfg.fallback.providers, vec!["duckduckgo"]);
        assert_eq!(cfg.db.path, PathBuf::from("./data/docshelf.sqlite"));
    }

    #[test]
    fn test_child_larger_than_parent_rejected() {
        let err = parse_config("[chunking]\nparent_chars = 100\nchild_chars = 200\n").unwrap_err();
        assert!(err.to_string().contains("child_chars"));
    }

    #[test]
    fn test_remote_embedding_requires_model_and_dims() {
        assert!(parse_config("[embedding]\nprovider = \"openai\"\n").is_err());
        assert!(parse_config(
            "[embedding]\nprovider = \"openai\"\nmodel = \"text-embedding-3-small\"\ndims = 1536\n"
        )
        .is_ok());
    }

    #[test]
    fn test_unknown_names_rejected() {
        assert!(parse_config("[embedding]\nprovider = \"magic\"\n").is_err());
        assert!(parse_config("[fallback]\nproviders = [\"bing\"]\n").is_err());
        assert!(parse_config("[fallback]\ngrader = \"vibes\"\n").is_err());
    }

    #[test]
    fn test_llm_grader_requires_llm() {
        assert!(parse_config("[fallback]\ngrader = \"llm\"\n").is_err());
        assert!(parse_config("[fallback]\ngrader = \"llm\"\n[llm]\nprovider = \"openai\"\n").is_ok());
    }

    #[test]
    fn test_zero_top_k_rejected() {
        assert!(parse_config("[retrieval]\ntop_k = 0\n").is_err());
    }
}
