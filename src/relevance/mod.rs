#[cfg(test)]
mod tests;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::Result;
use crate::articles::Article;
use crate::config::{Credentials, RelevanceConfig};
use crate::generation::{CompletionRequest, OpenAiChatClient, TextGenerator, render_template};

const AFFIRMATIVE: [&str; 4] = ["yes", "ja", "y", "true"];

/// How a classification reply is turned into a verdict
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnswerPolicy {
    /// The first word decides; anything unrecognised counts as "no"
    #[default]
    Leading,
    /// Relevant whenever "yes" appears anywhere in the reply. Lossy: "No, not yes" passes.
    Contains,
}

impl AnswerPolicy {
    #[inline]
    pub fn is_relevant(self, reply: &str) -> bool {
        let reply = reply.to_lowercase();
        match self {
            Self::Leading => reply
                .split_whitespace()
                .next()
                .map(|word| word.trim_matches(|c: char| !c.is_alphanumeric()))
                .is_some_and(|word| AFFIRMATIVE.contains(&word)),
            Self::Contains => reply.contains("yes"),
        }
    }
}

impl fmt::Display for AnswerPolicy {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Leading => f.write_str("leading"),
            Self::Contains => f.write_str("contains"),
        }
    }
}

/// Classifies articles as relevant to a topic with one LLM call each
pub struct RelevanceFilter {
    generator: Arc<dyn TextGenerator>,
    config: RelevanceConfig,
}

impl RelevanceFilter {
    #[inline]
    pub fn new(generator: Arc<dyn TextGenerator>, config: RelevanceConfig) -> Self {
        Self { generator, config }
    }

    /// Builds a filter backed by the configured chat endpoint
    #[inline]
    pub fn from_config(config: &RelevanceConfig, credentials: &Credentials) -> Result<Self> {
        let client = OpenAiChatClient::new(
            &config.base_url,
            &config.model,
            credentials.get(&config.api_key_env),
            std::time::Duration::from_secs(config.timeout_secs),
        )?;
        Ok(Self::new(Arc::new(client), config.clone()))
    }

    #[inline]
    pub fn criteria(&self) -> &str {
        &self.config.criteria
    }

    fn request_for(&self, article: &Article, criteria: &str) -> CompletionRequest {
        let prompt = render_template(&self.config.instruction_template, |key| match key {
            "criteria" => Some(criteria.to_string()),
            "article" => Some(article.content.clone()),
            "headline" => Some(article.headline.clone()),
            _ => None,
        });

        CompletionRequest {
            system: Some(self.config.system_prompt.clone()),
            prompt,
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        }
    }

    #[inline]
    pub fn classify(&self, article: &Article, criteria: &str) -> Result<bool> {
        let reply = self.generator.complete(&self.request_for(article, criteria))?;
        let relevant = self.config.policy.is_relevant(&reply);
        debug!(
            "Article {} classified as {} (reply {:?})",
            article.id,
            if relevant { "relevant" } else { "not relevant" },
            reply.trim()
        );
        Ok(relevant)
    }

    /// Classifies every article, stopping at the first backend error.
    #[inline]
    pub fn annotate(&self, articles: &[Article], criteria: &str) -> Result<Vec<(Article, bool)>> {
        let mut annotated = Vec::with_capacity(articles.len());
        for article in articles {
            let relevant = self.classify(article, criteria)?;
            annotated.push((article.clone(), relevant));
        }

        let relevant = annotated.iter().filter(|(_, r)| *r).count();
        info!(
            "{} of {} articles are relevant ({} policy)",
            relevant,
            annotated.len(),
            self.config.policy
        );
        Ok(annotated)
    }

    /// Keeps the relevant articles in their original order.
    #[inline]
    pub fn filter(&self, articles: &[Article], criteria: &str) -> Result<Vec<Article>> {
        Ok(self
            .annotate(articles, criteria)?
            .into_iter()
            .filter_map(|(article, relevant)| relevant.then_some(article))
            .collect())
    }
}
