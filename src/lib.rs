//! # KB Helpdesk
//!
//! A retrieval-grounded helpdesk assistant. Pages are crawled into a local
//! knowledge base; questions are answered by a local language model that is
//! only allowed to use the retrieved excerpts, and answers cite the pages
//! they actually drew on.
//!
//! The retrieval and answering pipeline lives in `kb-helpdesk-core`; this
//! crate adds the file-backed store, the crawler, the Ollama backend, the
//! CLI, and the HTTP API.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────┐   ┌──────────┐   ┌────────────┐
//! │  Crawl  │──▶│ Extract  │──▶│ File store │
//! └─────────┘   └──────────┘   └─────┬──────┘
//!                                    │
//!                   ┌────────────────┤
//!                   ▼                ▼
//!             ┌──────────┐    ┌─────────────┐    ┌────────┐
//!             │  Search  │    │ Orchestrator│───▶│ Ollama │
//!             └──────────┘    └──────┬──────┘    └────────┘
//!                                    │
//!                      ┌─────────────┤
//!                      ▼             ▼
//!                 ┌─────────┐   ┌──────────┐
//!                 │   CLI   │   │   HTTP   │
//!                 │  (kbh)  │   │  (axum)  │
//!                 └─────────┘   └──────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`logging`] | `tracing` subscriber setup |
//! | [`extract`] | Title and text extraction from fetched pages |
//! | [`fs_store`] | One-JSON-file-per-page knowledge store |
//! | [`crawl`] | Page fetching |
//! | [`kb`] | Listing, showing, deleting entries |
//! | [`search`] | Knowledge search command |
//! | [`llm`] | Ollama chat backend |
//! | [`ask`] | Answering from the command line |
//! | [`server`] | HTTP API |

pub mod ask;
pub mod config;
pub mod crawl;
pub mod extract;
pub mod fs_store;
pub mod kb;
pub mod llm;
pub mod logging;
pub mod search;
pub mod server;
