//! CLI command implementations.
//!
//! Contains the business logic for each CLI command.

// Allow certain patterns that improve readability in CLI output formatting
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::format_push_string)]

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::agent::{AgentConfig, Orchestrator, PromptSet, create_provider, support_registry};
use crate::cli::output::{OutputFormat, format_agent_result, format_retrieval, format_tools};
use crate::cli::parser::{Cli, Commands, RetrievalArgs};
use crate::core::{ConversationTurn, HistoryMessage};
use crate::embedding::{EmbedderKind, create_embedder};
use crate::error::{CommandError, Result};
use crate::search::{
    HybridRetriever, KnowledgeBase, SearchConfig, SearchMode, load_corpus_file, sample_corpus,
};

// ==================== Parameter Structs ====================

/// Parameters for the ask command.
#[derive(Debug, Clone)]
pub struct AskParams<'a> {
    /// The user's message.
    pub query: &'a str,
    /// Conversation identifier, generated when `None`.
    pub conversation_id: Option<&'a str>,
    /// Prior-messages file.
    pub history: Option<&'a Path>,
    /// Knowledge-base and retrieval options.
    pub retrieval: &'a RetrievalArgs,
    /// Prompt override directory.
    pub prompt_dir: Option<&'a Path>,
}

/// Parameters for the search command.
#[derive(Debug, Clone)]
pub struct SearchParams<'a> {
    /// Search query text.
    pub query: &'a str,
    /// Retrieval paths to run.
    pub mode: SearchMode,
    /// Knowledge-base and retrieval options.
    pub retrieval: &'a RetrievalArgs,
}

/// Executes the CLI command.
///
/// # Arguments
///
/// * `cli` - Parsed CLI arguments.
///
/// # Returns
///
/// Result with output string on success.
///
/// # Errors
///
/// Returns an error if configuration is invalid, an input file cannot be
/// loaded, the knowledge base cannot be built, or the turn is cancelled.
pub fn execute(cli: &Cli) -> Result<String> {
    let format = OutputFormat::parse(&cli.format);

    match &cli.command {
        Commands::Ask {
            query,
            conversation_id,
            history,
            retrieval,
            prompt_dir,
        } => {
            let params = AskParams {
                query,
                conversation_id: conversation_id.as_deref(),
                history: history.as_deref(),
                retrieval,
                prompt_dir: prompt_dir.as_deref(),
            };
            cmd_ask(&params, format)
        }
        Commands::Search {
            query,
            mode,
            retrieval,
        } => {
            let params = SearchParams {
                query,
                mode: *mode,
                retrieval,
            };
            cmd_search(&params, format)
        }
        Commands::Tools => cmd_tools(format),
        Commands::InitPrompts { dir } => cmd_init_prompts(dir.as_deref(), format),
    }
}

/// Creates the runtime that bridges the synchronous CLI to async agents.
fn runtime() -> Result<Runtime> {
    Ok(tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?)
}

/// Builds the knowledge base and retriever for `ask` and `search`.
async fn build_retriever(
    args: &RetrievalArgs,
    mode: SearchMode,
    config: Option<&AgentConfig>,
) -> Result<HybridRetriever> {
    if args.top_k == 0 {
        return Err(CommandError::InvalidArgument("--top-k must be at least 1".to_string()).into());
    }

    let documents = match &args.corpus {
        Some(path) => load_corpus_file(path)?,
        None => sample_corpus(),
    };
    let embedder = create_embedder(args.embedder, config)?;
    let corpus = KnowledgeBase::build(documents, embedder.as_ref()).await?;

    let mut search = SearchConfig::new()
        .with_top_k(args.top_k)
        .with_k_rrf(args.rrf_k)
        .with_mode(mode);
    if let Some(config) = config {
        search = search.with_path_timeout(config.retrieval_timeout);
    }
    debug!(documents = corpus.len(), ?search, "Retriever ready");

    Ok(HybridRetriever::new(embedder, corpus, search))
}

/// Reads a history file: a JSON array of `{"role", "content"}` objects.
fn load_history(path: &Path) -> Result<Vec<HistoryMessage>> {
    let load_error = |message: String| CommandError::Load {
        path: path.display().to_string(),
        message,
    };
    let raw = std::fs::read_to_string(path).map_err(|e| load_error(e.to_string()))?;
    let history = serde_json::from_str(&raw).map_err(|e| load_error(e.to_string()))?;
    Ok(history)
}

// ==================== Command Implementations ====================

fn cmd_ask(params: &AskParams<'_>, format: OutputFormat) -> Result<String> {
    if params.query.trim().is_empty() {
        return Err(CommandError::InvalidArgument("query must not be empty".to_string()).into());
    }

    let mut builder = AgentConfig::builder().from_env();
    if let Some(dir) = params.prompt_dir {
        builder = builder.prompt_dir(dir);
    }
    let config = builder.build()?;

    let history = match params.history {
        Some(path) => load_history(path)?,
        None => Vec::new(),
    };
    let conversation_id = params.conversation_id.map_or_else(
        || format!("cli-{}", Utc::now().timestamp_millis()),
        ToString::to_string,
    );
    let turn = ConversationTurn::new(conversation_id, params.query).with_history(history);

    let rt = runtime()?;
    let result = rt.block_on(async {
        let retriever = build_retriever(params.retrieval, SearchMode::Hybrid, Some(&config)).await?;
        let provider = create_provider(&config)?;
        let registry = Arc::new(support_registry()?);
        let orchestrator = Orchestrator::new(provider, &config, retriever, registry);

        let cancel = CancellationToken::new();
        let interrupt = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupted, cancelling turn");
                    cancel.cancel();
                }
            })
        };
        let outcome = orchestrator.process_turn(turn, &cancel).await;
        interrupt.abort();
        Ok::<_, crate::error::Error>(outcome?)
    })?;

    Ok(format_agent_result(&result, format))
}

fn cmd_search(params: &SearchParams<'_>, format: OutputFormat) -> Result<String> {
    // Only the provider-backed embedder needs credentials.
    let config = match params.retrieval.embedder {
        EmbedderKind::Hash => None,
        EmbedderKind::OpenAi => Some(AgentConfig::from_env()?),
    };

    let rt = runtime()?;
    let outcome = rt.block_on(async {
        let retriever = build_retriever(params.retrieval, params.mode, config.as_ref()).await?;
        Ok::<_, crate::error::Error>(retriever.retrieve(params.query).await)
    })?;

    Ok(format_retrieval(&outcome, params.query, params.mode, format))
}

fn cmd_tools(format: OutputFormat) -> Result<String> {
    let registry = support_registry()?;
    Ok(format_tools(&registry.definitions(), format))
}

fn cmd_init_prompts(dir: Option<&Path>, format: OutputFormat) -> Result<String> {
    let target_dir = dir
        .map(Path::to_path_buf)
        .or_else(PromptSet::default_dir)
        .ok_or_else(|| {
            CommandError::InvalidArgument(
                "Could not determine home directory for default prompt path".to_string(),
            )
        })?;

    let written = PromptSet::write_defaults(&target_dir)?;

    match format {
        OutputFormat::Text => {
            if written.is_empty() {
                return Ok(format!(
                    "All prompt templates already exist in: {}\n",
                    target_dir.display()
                ));
            }
            let mut output = format!(
                "Wrote {} prompt template(s) to: {}\n",
                written.len(),
                target_dir.display()
            );
            for path in &written {
                output.push_str(&format!(
                    "  {}\n",
                    path.file_name()
                        .and_then(|n| n.to_str())
                        .unwrap_or("unknown")
                ));
            }
            output.push_str("\nEdit these files to customize agent system prompts.\n");
            Ok(output)
        }
        OutputFormat::Json => {
            let json = serde_json::json!({
                "directory": target_dir.display().to_string(),
                "written": written
                    .iter()
                    .map(|p| p.display().to_string())
                    .collect::<Vec<_>>(),
            });
            Ok(serde_json::to_string_pretty(&json)? + "\n")
        }
    }
}
