//! # KB Helpdesk Core
//!
//! Retrieval and attribution engine for the knowledge-base helpdesk:
//! term extraction, document scoring, knowledge search, the relevance gate,
//! prompt assembly, reference filtering and the generation orchestrator.
//!
//! This crate does no filesystem or network I/O of its own. Documents come
//! through the [`store::Store`] trait and text generation through the
//! [`backend::ChatBackend`] trait; the application crate supplies both.

pub mod backend;
pub mod canned;
pub mod chat;
pub mod gate;
pub mod models;
pub mod prompt;
pub mod references;
pub mod score;
pub mod search;
pub mod store;
pub mod terms;
pub mod text;
