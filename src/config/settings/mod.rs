
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

use crate::embeddings::chunking::ChunkingConfig;
use crate::generation::template_placeholders;
use crate::relevance::AnswerPolicy;
use crate::vector_store::{DistanceMetric, RECORD_METADATA_KEYS};

pub const CONFIG_FILE_NAME: &str = "config.toml";
const APP_DIR_NAME: &str = "news-rag";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub vector_store: VectorStoreConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub relevance: RelevanceConfig,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    #[default]
    Ollama,
    OpenAi,
    /// Offline bag-of-words encoder, no service required
    Hashing,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingProvider,
    pub base_url: String,
    pub model: String,
    pub dimension: u32,
    pub batch_size: u32,
    pub max_input_chars: usize,
    pub timeout_secs: u64,
    pub retry_attempts: u32,
    pub api_key_env: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::Ollama,
            base_url: "http://localhost:11434".to_string(),
            model: "all-minilm:latest".to_string(),
            dimension: 384,
            batch_size: 16,
            max_input_chars: 8192,
            timeout_secs: 30,
            retry_attempts: 3,
            api_key_env: "OPENAI_API_KEY".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VectorStoreBackend {
    Memory,
    #[default]
    LanceDb,
    Pinecone,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VectorStoreConfig {
    pub backend: VectorStoreBackend,
    pub index_name: String,
    pub metric: DistanceMetric,
    /// Directory of the local LanceDB database; defaults to `<config dir>/vectors`
    pub path: Option<PathBuf>,
    pub pinecone: PineconeConfig,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            backend: VectorStoreBackend::LanceDb,
            index_name: "news-articles-index".to_string(),
            metric: DistanceMetric::Cosine,
            path: None,
            pinecone: PineconeConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PineconeConfig {
    pub control_plane_url: String,
    pub cloud: String,
    pub region: String,
    pub namespace: String,
    pub api_key_env: String,
    pub timeout_secs: u64,
    pub retry_attempts: u32,
    pub upsert_batch_size: usize,
    pub ready_timeout_secs: u64,
}

impl Default for PineconeConfig {
    fn default() -> Self {
        Self {
            control_plane_url: "https://api.pinecone.io".to_string(),
            cloud: "aws".to_string(),
            region: "us-east-1".to_string(),
            namespace: String::new(),
            api_key_env: "PINECONE_API_KEY".to_string(),
            timeout_secs: 30,
            retry_attempts: 3,
            upsert_batch_size: 100,
            ready_timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { top_k: 3 }
    }
}

pub const DEFAULT_PROMPT_TEMPLATE: &str = "Here is a summary of the most relevant information:\n\n{context}\n\nQuestion: {query}\nAnswer:";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GenerationConfig {
    pub base_url: String,
    pub model: String,
    pub api_key_env: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    pub prompt_template: String,
    pub context_line_template: String,
    pub context_separator: String,
    /// Refuse to call the model when retrieval found nothing
    pub require_context: bool,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            temperature: 0.7,
            max_tokens: 150,
            timeout_secs: 60,
            prompt_template: DEFAULT_PROMPT_TEMPLATE.to_string(),
            context_line_template: "{headline}: {url}".to_string(),
            context_separator: "\n\n".to_string(),
            require_context: false,
        }
    }
}

pub const DEFAULT_RELEVANCE_CRITERIA: &str =
    "the Olympics ('Olympia') or the US presidential election ('US Wahlkampf')";
pub const DEFAULT_RELEVANCE_SYSTEM_PROMPT: &str =
    "You are an assistant that identifies relevant articles.";
pub const DEFAULT_RELEVANCE_INSTRUCTION: &str = "Is the following article related to {criteria}? Please respond with 'Yes' or 'No'.\n\nArticle: {article}";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RelevanceConfig {
    pub base_url: String,
    pub model: String,
    pub api_key_env: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    pub criteria: String,
    pub system_prompt: String,
    pub instruction_template: String,
    pub policy: AnswerPolicy,
}

impl Default for RelevanceConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            temperature: 0.0,
            max_tokens: 10,
            timeout_secs: 60,
            criteria: DEFAULT_RELEVANCE_CRITERIA.to_string(),
            system_prompt: DEFAULT_RELEVANCE_SYSTEM_PROMPT.to_string(),
            instruction_template: DEFAULT_RELEVANCE_INSTRUCTION.to_string(),
            policy: AnswerPolicy::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found or could not be created")]
    DirectoryError,
    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),
    #[error("Invalid batch size: {0} (must be between 1 and 1000)")]
    InvalidBatchSize(u32),
    #[error("Invalid model name: {0:?} (cannot be empty)")]
    InvalidModel(String),
    #[error("Invalid embedding dimension: {0} (must be between 8 and 8192)")]
    InvalidEmbeddingDimension(u32),
    #[error("Invalid maximum input length: {0} (must be greater than 0)")]
    InvalidMaxInputChars(usize),
    #[error("Invalid timeout: {0}s (must be between 1 and 600 seconds)")]
    InvalidTimeout(u64),
    #[error("Invalid retry attempts: {0} (must be between 1 and 10)")]
    InvalidRetryAttempts(u32),
    #[error("Invalid index name: {0:?} (lowercase letters, digits and '-' only, at most 45 characters)")]
    InvalidIndexName(String),
    #[error("Invalid serverless location: cloud {0:?}, region {1:?}")]
    InvalidServerlessSpec(String, String),
    #[error("Invalid upsert batch size: {0} (must be between 1 and 1000)")]
    InvalidUpsertBatchSize(usize),
    #[error("Invalid chunk size: {0} (must be greater than 0)")]
    InvalidChunkSize(usize),
    #[error("Chunk overlap ({overlap}) must be smaller than chunk size ({size})")]
    OverlapTooLarge { overlap: usize, size: usize },
    #[error("Invalid separator list: at least one separator is required")]
    EmptySeparators,
    #[error("Invalid top_k: {0} (must be between 1 and 100)")]
    InvalidTopK(usize),
    #[error("Invalid temperature: {0} (must be between 0.0 and 2.0)")]
    InvalidTemperature(f32),
    #[error("Invalid max tokens: {0} (must be between 1 and 16384)")]
    InvalidMaxTokens(u32),
    #[error("Template {name} is missing the {placeholder} placeholder")]
    MissingPlaceholder {
        name: &'static str,
        placeholder: &'static str,
    },
    #[error("context_line_template must use at least one of the record fields: {}", RECORD_METADATA_KEYS.join(", "))]
    EmptyContextLine,
    #[error("Unknown placeholder {{{0}}} in context_line_template (record fields: {keys})", keys = RECORD_METADATA_KEYS.join(", "))]
    UnknownPlaceholder(String),
    #[error("Missing credential: environment variable {0} is not set")]
    MissingCredential(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Config {
    #[inline]
    pub fn load<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_path = config_dir.as_ref().join(CONFIG_FILE_NAME);

        if !config_path.exists() {
            return Ok(Self {
                base_dir: config_dir.as_ref().to_path_buf(),
                ..Self::default()
            });
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;
        config.base_dir = config_dir.as_ref().to_path_buf();

        config
            .validate()
            .with_context(|| "Configuration validation failed")?;

        Ok(config)
    }

    #[inline]
    pub fn save(&self) -> Result<()> {
        self.validate()
            .context("Configuration validation failed before saving")?;

        let config_dir = self.get_base_dir();

        fs::create_dir_all(config_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        let config_path = self.config_file_path();
        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    /// Default configuration directory, `$XDG_CONFIG_HOME/news-rag` on Linux
    #[inline]
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|dir| dir.join(APP_DIR_NAME))
            .ok_or(ConfigError::DirectoryError)
    }

    /// Get the base directory for the application
    #[inline]
    pub fn get_base_dir(&self) -> &Path {
        &self.base_dir
    }

    #[inline]
    pub fn config_file_path(&self) -> PathBuf {
        self.get_base_dir().join(CONFIG_FILE_NAME)
    }

    /// Get the path for the local vector database directory
    #[inline]
    pub fn vector_database_path(&self) -> PathBuf {
        self.vector_store
            .path
            .clone()
            .unwrap_or_else(|| self.get_base_dir().join("vectors"))
    }

    /// Applies `PINECONE_CLOUD` and `PINECONE_REGION` overrides from the given lookup.
    #[inline]
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(cloud) = lookup("PINECONE_CLOUD").filter(|v| !v.trim().is_empty()) {
            self.vector_store.pinecone.cloud = cloud;
        }
        if let Some(region) = lookup("PINECONE_REGION").filter(|v| !v.trim().is_empty()) {
            self.vector_store.pinecone.region = region;
        }
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.embedding.validate()?;
        self.vector_store.validate()?;
        self.chunking.validate()?;
        self.retrieval.validate()?;
        self.generation.validate()?;
        self.relevance.validate()?;
        Ok(())
    }
}

fn validate_url(url: &str) -> Result<Url, ConfigError> {
    let parsed = Url::parse(url).map_err(|_| ConfigError::InvalidUrl(url.to_string()))?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(url.to_string()));
    }
    Ok(parsed)
}

fn validate_model(model: &str) -> Result<(), ConfigError> {
    if model.trim().is_empty() {
        return Err(ConfigError::InvalidModel(model.to_string()));
    }
    Ok(())
}

fn validate_timeout(secs: u64) -> Result<(), ConfigError> {
    if !(1..=600).contains(&secs) {
        return Err(ConfigError::InvalidTimeout(secs));
    }
    Ok(())
}

fn validate_sampling(temperature: f32, max_tokens: u32) -> Result<(), ConfigError> {
    if !(0.0..=2.0).contains(&temperature) {
        return Err(ConfigError::InvalidTemperature(temperature));
    }
    if !(1..=16384).contains(&max_tokens) {
        return Err(ConfigError::InvalidMaxTokens(max_tokens));
    }
    Ok(())
}

fn require_placeholder(
    template: &str,
    name: &'static str,
    placeholder: &'static str,
) -> Result<(), ConfigError> {
    if !template.contains(placeholder) {
        return Err(ConfigError::MissingPlaceholder { name, placeholder });
    }
    Ok(())
}

/// Context lines are rendered from record metadata, so every placeholder must name a stored field
fn validate_context_line(template: &str) -> Result<(), ConfigError> {
    let placeholders = template_placeholders(template);
    if placeholders.is_empty() {
        return Err(ConfigError::EmptyContextLine);
    }
    if let Some(unknown) = placeholders
        .into_iter()
        .find(|name| !RECORD_METADATA_KEYS.contains(name))
    {
        return Err(ConfigError::UnknownPlaceholder(unknown.to_string()));
    }
    Ok(())
}

impl EmbeddingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.provider != EmbeddingProvider::Hashing {
            validate_url(&self.base_url)?;
        }
        validate_model(&self.model)?;

        if self.batch_size == 0 || self.batch_size > 1000 {
            return Err(ConfigError::InvalidBatchSize(self.batch_size));
        }

        if !(8..=8192).contains(&self.dimension) {
            return Err(ConfigError::InvalidEmbeddingDimension(self.dimension));
        }

        if self.max_input_chars == 0 {
            return Err(ConfigError::InvalidMaxInputChars(self.max_input_chars));
        }

        validate_timeout(self.timeout_secs)?;

        if !(1..=10).contains(&self.retry_attempts) {
            return Err(ConfigError::InvalidRetryAttempts(self.retry_attempts));
        }

        Ok(())
    }

    pub fn base_url(&self) -> Result<Url, ConfigError> {
        validate_url(&self.base_url)
    }

    pub fn set_base_url(&mut self, base_url: String) -> Result<(), ConfigError> {
        validate_url(&base_url)?;
        self.base_url = base_url;
        Ok(())
    }

    pub fn set_model(&mut self, model: String) -> Result<(), ConfigError> {
        validate_model(&model)?;
        self.model = model;
        Ok(())
    }

    pub fn set_batch_size(&mut self, batch_size: u32) -> Result<(), ConfigError> {
        if batch_size == 0 || batch_size > 1000 {
            return Err(ConfigError::InvalidBatchSize(batch_size));
        }
        self.batch_size = batch_size;
        Ok(())
    }

    pub fn set_dimension(&mut self, dimension: u32) -> Result<(), ConfigError> {
        if !(8..=8192).contains(&dimension) {
            return Err(ConfigError::InvalidEmbeddingDimension(dimension));
        }
        self.dimension = dimension;
        Ok(())
    }
}

impl VectorStoreConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_index_name(&self.index_name)?;
        if self.backend == VectorStoreBackend::Pinecone {
            self.pinecone.validate()?;
        }
        Ok(())
    }

    pub fn set_index_name(&mut self, index_name: String) -> Result<(), ConfigError> {
        validate_index_name(&index_name)?;
        self.index_name = index_name;
        Ok(())
    }
}

pub fn validate_index_name(name: &str) -> Result<(), ConfigError> {
    let valid = !name.is_empty()
        && name.len() <= 45
        && !name.starts_with('-')
        && !name.ends_with('-')
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    if valid {
        Ok(())
    } else {
        Err(ConfigError::InvalidIndexName(name.to_string()))
    }
}

impl PineconeConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_url(&self.control_plane_url)?;

        if self.cloud.trim().is_empty() || self.region.trim().is_empty() {
            return Err(ConfigError::InvalidServerlessSpec(
                self.cloud.clone(),
                self.region.clone(),
            ));
        }

        validate_timeout(self.timeout_secs)?;
        validate_timeout(self.ready_timeout_secs)?;

        if !(1..=10).contains(&self.retry_attempts) {
            return Err(ConfigError::InvalidRetryAttempts(self.retry_attempts));
        }

        if !(1..=1000).contains(&self.upsert_batch_size) {
            return Err(ConfigError::InvalidUpsertBatchSize(self.upsert_batch_size));
        }

        Ok(())
    }
}

impl RetrievalConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=100).contains(&self.top_k) {
            return Err(ConfigError::InvalidTopK(self.top_k));
        }
        Ok(())
    }

    pub fn set_top_k(&mut self, top_k: usize) -> Result<(), ConfigError> {
        if !(1..=100).contains(&top_k) {
            return Err(ConfigError::InvalidTopK(top_k));
        }
        self.top_k = top_k;
        Ok(())
    }
}

impl GenerationConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_url(&self.base_url)?;
        validate_model(&self.model)?;
        validate_sampling(self.temperature, self.max_tokens)?;
        validate_timeout(self.timeout_secs)?;
        require_placeholder(&self.prompt_template, "prompt_template", "{context}")?;
        require_placeholder(&self.prompt_template, "prompt_template", "{query}")?;
        validate_context_line(&self.context_line_template)?;
        Ok(())
    }

    pub fn set_model(&mut self, model: String) -> Result<(), ConfigError> {
        validate_model(&model)?;
        self.model = model;
        Ok(())
    }

    pub fn set_max_tokens(&mut self, max_tokens: u32) -> Result<(), ConfigError> {
        validate_sampling(self.temperature, max_tokens)?;
        self.max_tokens = max_tokens;
        Ok(())
    }
}

impl RelevanceConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_url(&self.base_url)?;
        validate_model(&self.model)?;
        validate_sampling(self.temperature, self.max_tokens)?;
        validate_timeout(self.timeout_secs)?;
        require_placeholder(
            &self.instruction_template,
            "instruction_template",
            "{article}",
        )?;
        Ok(())
    }
}

/// A pipeline stage whose backend may need a credential at start-up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Embedding,
    VectorStore,
    Generation,
    Relevance,
}

/// API keys resolved from the environment once, before any work starts
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    keys: BTreeMap<String, String>,
}

impl Credentials {
    /// Resolves every credential the given stages need, failing on the first missing one.
    #[inline]
    pub fn resolve<F>(config: &Config, stages: &[Stage], lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut keys = BTreeMap::new();

        for stage in stages {
            let Some(var) = required_key(config, *stage) else {
                continue;
            };
            if keys.contains_key(var) {
                continue;
            }
            let value = lookup(var)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| ConfigError::MissingCredential(var.to_string()))?;
            keys.insert(var.to_string(), value);
        }

        Ok(Self { keys })
    }

    #[inline]
    pub fn from_env(config: &Config, stages: &[Stage]) -> Result<Self, ConfigError> {
        Self::resolve(config, stages, |var| std::env::var(var).ok())
    }

    #[inline]
    pub fn get(&self, var: &str) -> Option<&str> {
        self.keys.get(var).map(String::as_str)
    }

    #[inline]
    pub fn require(&self, var: &str) -> Result<&str, ConfigError> {
        self.get(var)
            .ok_or_else(|| ConfigError::MissingCredential(var.to_string()))
    }
}

fn required_key(config: &Config, stage: Stage) -> Option<&str> {
    let var = match stage {
        Stage::Embedding if config.embedding.provider == EmbeddingProvider::OpenAi => {
            config.embedding.api_key_env.as_str()
        }
        Stage::VectorStore if config.vector_store.backend == VectorStoreBackend::Pinecone => {
            config.vector_store.pinecone.api_key_env.as_str()
        }
        Stage::Generation => config.generation.api_key_env.as_str(),
        Stage::Relevance => config.relevance.api_key_env.as_str(),
        _ => return None,
    };
    // An empty variable name marks an endpoint that takes no key, e.g. a local server
    (!var.trim().is_empty()).then_some(var)
}
