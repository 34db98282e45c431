//! # KB Helpdesk CLI (`kbh`)
//!
//! The `kbh` binary crawls pages into a local knowledge base, searches it,
//! answers questions grounded in it, and serves the same operations over
//! HTTP for the chat UI.
//!
//! ## Usage
//!
//! ```bash
//! kbh --config ./config/kbh.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `kbh crawl <url>` | Fetch a page and store its text |
//! | `kbh list` | List knowledge-base entries, newest first |
//! | `kbh show <id>` | Print one entry |
//! | `kbh delete <id>` | Remove one entry |
//! | `kbh search "<query>"` | Ranked knowledge search |
//! | `kbh ask "<question>"` | Answer a question from the knowledge base |
//! | `kbh models` | List models offered by the Ollama server |
//! | `kbh serve` | Start the HTTP API |
//! | `kbh completions <shell>` | Print shell completions |
//!
//! ## Examples
//!
//! ```bash
//! kbh crawl https://intranet.example.com/it/password-policy
//! kbh search "password reset"
//! kbh ask "How often must I change my password?" --stream
//! kbh serve
//! ```

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

use kb_helpdesk::{ask, config, crawl, kb, llm, logging, search, server};
use kb_helpdesk_core::backend::ChatBackend;

/// KB Helpdesk: answers staff questions from a crawled knowledge base
/// through a local language model.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/kbh.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "kbh",
    about = "KB Helpdesk: retrieval-grounded helpdesk answers from a crawled knowledge base",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/kbh.toml")]
    config: PathBuf,

    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch a URL and store its title and text.
    ///
    /// Re-crawling a URL replaces the stored entry. A failed fetch stores a
    /// placeholder entry unless `crawl.placeholder_on_error` is off.
    Crawl {
        /// Absolute http(s) URL.
        url: String,
    },

    /// List knowledge-base entries, newest first.
    List,

    /// Print one entry with its full body.
    Show {
        /// Entry id as printed by `kbh list`.
        id: String,
    },

    /// Remove one entry.
    Delete {
        /// Entry id as printed by `kbh list`.
        id: String,
    },

    /// Search the knowledge base.
    Search {
        /// The search query string.
        query: String,

        /// Maximum number of results to return.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Answer a question from the knowledge base.
    Ask {
        /// The question.
        message: String,

        /// Print the answer as it is generated.
        #[arg(long)]
        stream: bool,

        /// Print retrieval diagnostics to stderr.
        #[arg(long)]
        debug: bool,
    },

    /// List the models offered by the configured Ollama server.
    Models,

    /// Start the HTTP API on `[server].bind`.
    Serve,

    /// Print shell completions to stdout.
    Completions {
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    if let Commands::Completions { shell } = &cli.command {
        clap_complete::generate(*shell, &mut Cli::command(), "kbh", &mut std::io::stdout());
        return Ok(());
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Crawl { url } => {
            crawl::run_crawl(&cfg, &url).await?;
        }
        Commands::List => {
            kb::run_list(&cfg).await?;
        }
        Commands::Show { id } => {
            kb::run_show(&cfg, &id).await?;
        }
        Commands::Delete { id } => {
            kb::run_delete(&cfg, &id).await?;
        }
        Commands::Search { query, limit } => {
            search::run_search(&cfg, &query, limit).await?;
        }
        Commands::Ask {
            message,
            stream,
            debug,
        } => {
            ask::run_ask(&cfg, &message, stream, debug).await?;
        }
        Commands::Models => {
            run_models(&cfg).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Completions { .. } => {}
    }

    Ok(())
}

async fn run_models(cfg: &config::Config) -> anyhow::Result<()> {
    let backend = llm::OllamaBackend::new(&cfg.llm)?;
    match backend.list_models().await {
        Ok(models) => {
            for model in models {
                let marker = if model == cfg.llm.model { " (default)" } else { "" };
                println!("{}{}", model, marker);
            }
        }
        Err(e) => {
            eprintln!("Failed to fetch models: {}", e);
            println!("Fallback models:");
            for model in llm::FALLBACK_MODELS {
                println!("  {}", model);
            }
        }
    }
    Ok(())
}
