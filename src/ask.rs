//! `kbh ask`: answer one question from the command line.
//!
//! Without `--stream` the orchestrator is called once and the whole answer
//! is printed. With `--stream` content envelopes are written to stdout as
//! they arrive and the final references are printed after `done`.

use anyhow::Result;
use futures::StreamExt;
use std::io::Write;
use std::sync::Arc;

use kb_helpdesk_core::chat::{ChatRequest, Envelope, Orchestrator};
use kb_helpdesk_core::models::{AnswerSource, Reference};

use crate::config::Config;
use crate::fs_store::FileStore;
use crate::llm::OllamaBackend;

/// Orchestrator over the configured file store and Ollama backend.
pub fn build_orchestrator(config: &Config) -> Result<Orchestrator> {
    let store = Arc::new(FileStore::new(&config.store.dir));
    let backend = Arc::new(OllamaBackend::new(&config.llm)?);
    Ok(Orchestrator::new(store, backend, config.engine_settings()))
}

pub async fn run_ask(config: &Config, message: &str, stream: bool, show_debug: bool) -> Result<()> {
    let orchestrator = build_orchestrator(config)?;
    let request = ChatRequest::new(message);

    if !stream {
        let response = orchestrator.answer(&request).await;
        println!("{}", response.response);
        print_references(response.source, &response.references);
        if show_debug {
            eprintln!("{}", serde_json::to_string_pretty(&response.debug)?);
        }
        return Ok(());
    }

    let mut envelopes = orchestrator.answer_stream(request);
    let mut last_source = AnswerSource::KnowledgeBase;
    let mut last_references: Vec<Reference> = Vec::new();
    let mut stdout = std::io::stdout();

    while let Some(envelope) = envelopes.next().await {
        match envelope {
            Envelope::Metadata {
                source,
                references,
                debug,
            } => {
                last_source = source;
                last_references = references;
                if show_debug {
                    eprintln!("{}", serde_json::to_string(&debug)?);
                }
            }
            Envelope::Content { content } => {
                write!(stdout, "{}", content)?;
                stdout.flush()?;
            }
            Envelope::Done => {
                writeln!(stdout)?;
                break;
            }
        }
    }

    print_references(last_source, &last_references);
    Ok(())
}

fn print_references(source: AnswerSource, references: &[Reference]) {
    if source != AnswerSource::KnowledgeBase || references.is_empty() {
        return;
    }
    println!();
    println!("References:");
    for r in references {
        println!("  - {} ({})", r.title, r.url);
    }
}
