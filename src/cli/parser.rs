//! Command-line argument parsing.
//!
//! Defines the CLI structure using clap derive macros.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::embedding::EmbedderKind;
use crate::search::{DEFAULT_K_RRF, DEFAULT_TOP_K, SearchMode};

/// supportflow-rs: intent-routed customer support agent.
///
/// Classifies each message as knowledge, action or conversation and
/// answers it with hybrid retrieval, a support tool or a plain reply.
#[derive(Parser, Debug)]
#[command(name = "supportflow-rs")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, default_value = "text", global = true)]
    pub format: String,

    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Answer one support message through the full agent workflow.
    ///
    /// Requires `OPENAI_API_KEY` (or `SUPPORTFLOW_API_KEY`).
    #[command(after_help = r#"Examples:
  supportflow-rs ask "What is your return policy?"
  supportflow-rs ask "Where is order 12345?" --conversation-id c-42
  supportflow-rs ask "thanks!" --history history.json
  supportflow-rs ask "How do refunds work?" --corpus kb.json --embedder openai
  supportflow-rs --format json ask "hi" | jq '.metadata.node_executions'
"#)]
    Ask {
        /// The user's message.
        query: String,

        /// Conversation identifier; generated when omitted.
        #[arg(long)]
        conversation_id: Option<String>,

        /// JSON file with prior messages: `[{"role": "user", "content": "..."}]`.
        #[arg(long)]
        history: Option<PathBuf>,

        #[command(flatten)]
        retrieval: RetrievalArgs,

        /// Directory with prompt template overrides.
        #[arg(long, env = "SUPPORTFLOW_PROMPT_DIR")]
        prompt_dir: Option<PathBuf>,
    },

    /// Run hybrid retrieval only and show the fused ranking.
    ///
    /// No language model is called; the hash embedder works offline.
    #[command(after_help = r#"Examples:
  supportflow-rs search "return policy"                 # Hybrid (default)
  supportflow-rs search "refund" -k 3                   # Top 3 contexts
  supportflow-rs search "shipping cost" --mode sparse   # BM25 only
  supportflow-rs search "password" --mode dense         # Embeddings only
  supportflow-rs --format json search "warranty" | jq '.contexts[].doc_id'
"#)]
    Search {
        /// Search query text.
        query: String,

        /// Retrieval paths to run.
        #[arg(long, value_enum, default_value_t = SearchMode::Hybrid)]
        mode: SearchMode,

        #[command(flatten)]
        retrieval: RetrievalArgs,
    },

    /// List the registered support tools and their argument schemas.
    Tools,

    /// Write default prompt templates to a directory for customization.
    ///
    /// Existing files are left untouched.
    #[command(after_help = r#"Examples:
  supportflow-rs init-prompts                    # Write to ~/.config/supportflow-rs/prompts/
  supportflow-rs init-prompts --dir ./prompts    # Write to custom directory
"#)]
    InitPrompts {
        /// Target directory for prompt templates.
        ///
        /// Defaults to `~/.config/supportflow-rs/prompts/`.
        #[arg(long)]
        dir: Option<PathBuf>,
    },
}

/// Knowledge-base and retrieval options shared by `ask` and `search`.
#[derive(clap::Args, Debug, Clone)]
pub struct RetrievalArgs {
    /// JSON corpus file: `[{"id": "...", "text": "...", "source": "..."}]`.
    ///
    /// Defaults to the built-in support knowledge base.
    #[arg(long)]
    pub corpus: Option<PathBuf>,

    /// Embedder for the dense path.
    #[arg(long, value_enum, default_value_t = EmbedderKind::Hash)]
    pub embedder: EmbedderKind,

    /// Number of contexts to keep after fusion.
    #[arg(short = 'k', long, default_value_t = DEFAULT_TOP_K)]
    pub top_k: usize,

    /// RRF smoothing constant.
    #[arg(long, default_value_t = DEFAULT_K_RRF)]
    pub rrf_k: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_search_defaults() {
        let cli = Cli::try_parse_from(["supportflow-rs", "search", "refund"])
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(cli.format, "text");
        match cli.command {
            Commands::Search {
                query,
                mode,
                retrieval,
            } => {
                assert_eq!(query, "refund");
                assert_eq!(mode, SearchMode::Hybrid);
                assert_eq!(retrieval.top_k, DEFAULT_TOP_K);
                assert_eq!(retrieval.rrf_k, DEFAULT_K_RRF);
                assert_eq!(retrieval.embedder, EmbedderKind::Hash);
                assert!(retrieval.corpus.is_none());
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "supportflow-rs",
            "ask",
            "hello",
            "--conversation-id",
            "c-1",
            "--format",
            "json",
            "-v",
        ])
        .unwrap_or_else(|_| unreachable!());
        assert!(cli.verbose);
        assert_eq!(cli.format, "json");
        assert!(matches!(
            cli.command,
            Commands::Ask { conversation_id: Some(ref id), .. } if id == "c-1"
        ));
    }

    #[test]
    fn test_invalid_mode_rejected() {
        let parsed = Cli::try_parse_from(["supportflow-rs", "search", "x", "--mode", "semantic"]);
        assert!(parsed.is_err());
    }
}
