//! # supportflow-rs
//!
//! Intent-routed customer support agent core.
//!
//! Each conversational turn is classified as `knowledge`, `action` or
//! `conversation` and handled by exactly one specialist:
//!
//! - **Knowledge** turns run hybrid retrieval (dense embeddings and BM25,
//!   fused with reciprocal rank fusion) and a grounded answer.
//! - **Action** turns select a support tool, validate its arguments and
//!   execute it under a deadline.
//! - **Conversation** turns get a plain reply informed by recent history.
//!
//! A bounded state machine drives the turn and a finalizer always produces
//! a non-empty [`core::AgentResult`].
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use supportflow_rs::agent::{AgentConfig, Orchestrator, create_provider, support_registry};
//! use supportflow_rs::core::ConversationTurn;
//! use supportflow_rs::embedding::HashEmbedder;
//! use supportflow_rs::search::{HybridRetriever, KnowledgeBase, SearchConfig};
//!
//! # async fn run() -> supportflow_rs::Result<()> {
//! let config = AgentConfig::from_env()?;
//! let embedder = Arc::new(HashEmbedder::default());
//! let corpus = KnowledgeBase::sample(embedder.as_ref()).await?;
//! let retriever = HybridRetriever::new(embedder, corpus, SearchConfig::new());
//! let orchestrator = Orchestrator::new(
//!     create_provider(&config)?,
//!     &config,
//!     retriever,
//!     Arc::new(support_registry()?),
//! );
//!
//! let result = orchestrator
//!     .process(ConversationTurn::new("conv-1", "What is your return policy?"))
//!     .await?;
//! assert!(!result.answer.is_empty());
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod cli;
pub mod core;
pub mod embedding;
pub mod error;
pub mod search;

pub use crate::core::{AgentResult, AgentType, ConversationTurn, HistoryMessage, Intent, RouteDecision};
pub use crate::error::{AgentError, Error, Result, RetrievalError, ToolError};
