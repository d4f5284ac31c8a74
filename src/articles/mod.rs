
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{RagError, Result};

/// A news article as loaded from the corpus CSV
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    pub id: String,
    pub headline: String,
    pub content: String,
    pub url: String,
    pub publication_date: Option<String>,
    pub section: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ArticleRow {
    #[serde(default)]
    id: Option<String>,
    headline: String,
    content: String,
    url: String,
    #[serde(default)]
    publication_date: Option<String>,
    #[serde(default)]
    section: Option<String>,
}

const OUTPUT_HEADER: [&str; 7] = [
    "id",
    "headline",
    "content",
    "url",
    "publication_date",
    "section",
    "relevant",
];

#[derive(Debug, Serialize)]
struct OutputRow<'a> {
    id: &'a str,
    headline: &'a str,
    content: &'a str,
    url: &'a str,
    publication_date: Option<&'a str>,
    section: Option<&'a str>,
    relevant: bool,
}

/// Loads articles from a CSV file with a header row.
///
/// `headline`, `content` and `url` are required; `id`, `publication_date` and
/// `section` are optional, and any other column is ignored. Rows without an
/// `id` are identified by their zero-based row index.
#[inline]
pub fn load_articles(path: &Path) -> Result<Vec<Article>> {
    if !path.is_file() {
        return Err(RagError::InputNotFound(path.to_path_buf()));
    }

    let mut reader = csv::Reader::from_path(path)?;
    let mut articles = Vec::new();

    for (index, row) in reader.deserialize::<ArticleRow>().enumerate() {
        let row = row?;
        let id = row
            .id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| index.to_string());
        articles.push(Article {
            id,
            headline: row.headline,
            content: row.content,
            url: row.url,
            publication_date: row.publication_date,
            section: row.section,
        });
    }

    info!("Loaded {} articles from {}", articles.len(), path.display());
    Ok(articles)
}

/// Writes the relevant articles of a classified corpus, adding a `relevant` column.
#[inline]
pub fn write_relevant_articles(path: &Path, annotated: &[(Article, bool)]) -> Result<usize> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let mut writer = csv::Writer::from_path(path)?;
    let mut written = 0;

    for (article, _) in annotated.iter().filter(|(_, relevant)| *relevant) {
        writer.serialize(OutputRow {
            id: &article.id,
            headline: &article.headline,
            content: &article.content,
            url: &article.url,
            publication_date: article.publication_date.as_deref(),
            section: article.section.as_deref(),
            relevant: true,
        })?;
        written += 1;
    }

    if written == 0 {
        writer.write_record(OUTPUT_HEADER)?;
    }

    writer.flush()?;
    debug!("Wrote {} relevant articles to {}", written, path.display());
    Ok(written)
}
