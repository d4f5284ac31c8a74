use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use news_rag::commands::{
    ChunkOptions, ask, build_index, filter_articles, load_config, search, show_chunks,
};
use news_rag::config::{resolve_config_dir, run_interactive_config, show_config};
use news_rag::embeddings::ChunkingMode;

#[derive(Parser)]
#[command(name = "news-rag")]
#[command(about = "Retrieval-augmented question answering over news articles")]
#[command(version)]
struct Cli {
    /// Directory holding config.toml and the local vector database
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure models, vector store and prompts
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Keep only the articles an LLM judges relevant to the criteria
    Filter {
        /// CSV file with the articles to classify
        #[arg(long)]
        input: PathBuf,
        /// Where to write the relevant articles
        #[arg(long)]
        output: PathBuf,
        /// Override the configured relevance criteria
        #[arg(long)]
        criteria: Option<String>,
    },
    /// Show how one article would be chunked
    Chunk {
        /// CSV file with the articles
        #[arg(long)]
        input: PathBuf,
        /// Zero-based row of the article to chunk
        #[arg(long, default_value_t = 0)]
        row: usize,
        /// Chunking mode: recursive, fixed or token
        #[arg(long)]
        mode: Option<ChunkingMode>,
        /// Chunk size in characters, or tokens in token mode
        #[arg(long)]
        size: Option<usize>,
        /// Overlap between consecutive chunks
        #[arg(long)]
        overlap: Option<usize>,
    },
    /// Chunk, embed and store articles in the vector index
    Index {
        /// CSV file with the articles to index
        #[arg(long)]
        input: PathBuf,
    },
    /// Find the chunks closest to a query
    Search {
        query: String,
        /// Number of chunks to return
        #[arg(long)]
        top_k: Option<usize>,
    },
    /// Answer a question from the indexed articles
    Ask {
        query: String,
        /// Number of chunks to use as context
        #[arg(long)]
        top_k: Option<usize>,
    },
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config_dir = resolve_config_dir(cli.config_dir.as_deref())?;

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config(&config_dir)?;
            } else {
                run_interactive_config(&config_dir)?;
            }
        }
        Commands::Filter {
            input,
            output,
            criteria,
        } => {
            let config = load_config(&config_dir)?;
            filter_articles(&config, &input, &output, criteria.as_deref()).await?;
        }
        Commands::Chunk {
            input,
            row,
            mode,
            size,
            overlap,
        } => {
            let config = load_config(&config_dir)?;
            let options = ChunkOptions {
                row,
                mode,
                size,
                overlap,
            };
            show_chunks(&config, &input, &options)?;
        }
        Commands::Index { input } => {
            let config = load_config(&config_dir)?;
            build_index(&config, &input).await?;
        }
        Commands::Search { query, top_k } => {
            let config = load_config(&config_dir)?;
            search(&config, &query, top_k).await?;
        }
        Commands::Ask { query, top_k } => {
            let config = load_config(&config_dir)?;
            ask(&config, &query, top_k).await?;
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn index_command_with_input() {
        let cli = Cli::try_parse_from(["news-rag", "index", "--input", "articles.csv"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Index { input } = parsed.command {
                assert_eq!(input, PathBuf::from("articles.csv"));
            }
        }
    }

    #[test]
    fn ask_command_with_top_k() {
        let cli = Cli::try_parse_from(["news-rag", "ask", "who won gold?", "--top-k", "5"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Ask { query, top_k } = parsed.command {
                assert_eq!(query, "who won gold?");
                assert_eq!(top_k, Some(5));
            }
        }
    }

    #[test]
    fn chunk_command_parses_mode() {
        let cli = Cli::try_parse_from([
            "news-rag", "chunk", "--input", "a.csv", "--row", "2", "--mode", "fixed", "--size",
            "200",
        ]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Chunk {
                row,
                mode,
                size,
                overlap,
                ..
            } = parsed.command
            {
                assert_eq!(row, 2);
                assert_eq!(mode, Some(ChunkingMode::Fixed));
                assert_eq!(size, Some(200));
                assert_eq!(overlap, None);
            }
        }
    }

    #[test]
    fn chunk_command_rejects_unknown_mode() {
        let cli = Cli::try_parse_from(["news-rag", "chunk", "--input", "a.csv", "--mode", "semantic"]);
        assert!(cli.is_err());
    }

    #[test]
    fn global_config_dir() {
        let cli = Cli::try_parse_from(["news-rag", "search", "budget", "--config-dir", "/tmp/rag"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            assert_eq!(parsed.config_dir, Some(PathBuf::from("/tmp/rag")));
        }
    }

    #[test]
    fn filter_requires_output() {
        let cli = Cli::try_parse_from(["news-rag", "filter", "--input", "a.csv"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
        }
    }

    #[test]
    fn config_show_flag() {
        let cli = Cli::try_parse_from(["news-rag", "config", "--show"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Config { show } = parsed.command {
                assert!(show);
            }
        }
    }

    #[test]
    fn invalid_command() {
        let cli = Cli::try_parse_from(["news-rag", "serve"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::InvalidSubcommand);
        }
    }

    #[test]
    fn help_message() {
        let cli = Cli::try_parse_from(["news-rag", "--help"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::DisplayHelp);
        }
    }
}
