pub mod interactive;
pub mod settings;


pub use interactive::{run_interactive_config, show_config};
pub use settings::{
    Config, ConfigError, Credentials, DEFAULT_PROMPT_TEMPLATE, DEFAULT_RELEVANCE_CRITERIA,
    EmbeddingConfig, EmbeddingProvider, GenerationConfig, PineconeConfig, RelevanceConfig,
    RetrievalConfig, Stage, VectorStoreBackend, VectorStoreConfig,
};

/// Resolve the configuration directory, preferring an explicit override
#[inline]
pub fn resolve_config_dir(
    override_dir: Option<&std::path::Path>,
) -> Result<std::path::PathBuf, ConfigError> {
    override_dir.map_or_else(Config::config_dir, |dir| Ok(dir.to_path_buf()))
}
