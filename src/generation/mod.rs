pub mod openai;


use std::sync::{Arc, LazyLock};
use std::time::Duration;

use fancy_regex::{Captures, Regex};
use itertools::Itertools;
use tracing::{debug, info};

pub use openai::OpenAiChatClient;

use crate::config::{Credentials, GenerationConfig};
use crate::retrieval::RetrievalResult;
use crate::vector_store::ScoredRecord;
use crate::{RagError, Result};

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid regex"));

/// A single prompt sent to a text generation backend
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system: Option<String>,
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Produces text for a prompt
pub trait TextGenerator: Send + Sync {
    fn model(&self) -> &str;

    fn complete(&self, request: &CompletionRequest) -> Result<String>;
}

/// Fills `{name}` placeholders in one pass; unknown names become empty.
#[inline]
pub fn render_template<F>(template: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    PLACEHOLDER
        .replace_all(template, |caps: &Captures<'_>| {
            caps.get(1)
                .and_then(|name| lookup(name.as_str()))
                .unwrap_or_default()
        })
        .into_owned()
}

/// Names of the `{name}` placeholders in `template`, in order of appearance
#[inline]
pub fn template_placeholders(template: &str) -> Vec<&str> {
    PLACEHOLDER
        .captures_iter(template)
        .filter_map(|caps| caps.ok()?.get(1).map(|name| name.as_str()))
        .collect()
}

/// Builds the chat client described by the generation settings
#[inline]
pub fn create_generator(
    config: &GenerationConfig,
    credentials: &Credentials,
) -> Result<Arc<dyn TextGenerator>> {
    let client = OpenAiChatClient::new(
        &config.base_url,
        &config.model,
        credentials.get(&config.api_key_env),
        Duration::from_secs(config.timeout_secs),
    )?;
    Ok(Arc::new(client))
}

/// Turns retrieved records and a question into an answer
pub struct ResponseGenerator {
    generator: Arc<dyn TextGenerator>,
    config: GenerationConfig,
}

impl ResponseGenerator {
    #[inline]
    pub fn new(generator: Arc<dyn TextGenerator>, config: GenerationConfig) -> Self {
        Self { generator, config }
    }

    /// One line per match in ranked order, rendered from the record metadata.
    #[inline]
    pub fn build_context(&self, matches: &[ScoredRecord]) -> String {
        matches
            .iter()
            .map(|m| {
                render_template(&self.config.context_line_template, |key| {
                    m.record.metadata.get(key).map(ToString::to_string)
                })
            })
            .join(&self.config.context_separator)
    }

    #[inline]
    pub fn build_prompt(&self, query: &str, context: &str) -> String {
        render_template(&self.config.prompt_template, |key| match key {
            "query" => Some(query.to_string()),
            "context" => Some(context.to_string()),
            _ => None,
        })
    }

    #[inline]
    pub fn generate(&self, query: &str, retrieval: &RetrievalResult) -> Result<String> {
        if retrieval.is_empty() && self.config.require_context {
            return Err(RagError::Generation(
                "No relevant context was retrieved for the question".to_string(),
            ));
        }

        let context = self.build_context(&retrieval.matches);
        let request = CompletionRequest {
            system: None,
            prompt: self.build_prompt(query, &context),
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        };

        debug!(
            "Generating answer with {} from {} context records",
            self.generator.model(),
            retrieval.len()
        );
        let answer = self.generator.complete(&request)?;

        let answer = answer.trim();
        if answer.is_empty() {
            return Err(RagError::Generation(format!(
                "{} returned an empty response",
                self.generator.model()
            )));
        }

        info!("Generated answer of {} characters", answer.chars().count());
        Ok(answer.to_string())
    }
}
