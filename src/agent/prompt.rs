//! System prompts and user-message builders for the support agents.
//!
//! Prompts can be customized by placing markdown files in a prompt
//! directory. Resolution order:
//! 1. Explicit `--prompt-dir` CLI flag
//! 2. `SUPPORTFLOW_PROMPT_DIR` environment variable
//! 3. `~/.config/supportflow-rs/prompts/`
//!
//! Any file not found falls back to the compiled-in default.

use std::fmt::Write;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::search::RetrievedContext;

/// System prompt for the intent router.
pub const ROUTER_SYSTEM_PROMPT: &str = r#"You are an intent classifier for a customer support assistant.

Classify the user's latest message into exactly ONE category:

- knowledge: questions about products, policies, documentation, shipping, returns, accounts or any FAQ-style information
- action: requests to perform a task, such as checking an order, cancelling a subscription, updating an address or looking up a balance
- conversation: greetings, thanks, small talk or anything that needs neither information lookup nor an action

Use the conversation history only to resolve references like "it" or "that order".

Respond with a single JSON object and nothing else:
{"intent": "knowledge" | "action" | "conversation", "confidence": <number between 0 and 1>, "rationale": "<one short sentence>"}"#;

/// System prompt for grounded answer synthesis.
pub const RAG_SYSTEM_PROMPT: &str = r"You are a customer support assistant that answers from a knowledge base.

Rules:
- Answer ONLY from the numbered context passages you are given
- Cite the passages you used by their document id in square brackets, e.g. [kb-shipping]
- If the context does not contain the answer, say so plainly and suggest contacting support
- Never invent policies, prices, dates or order details
- Keep the answer concise and professional";

/// System prompt for tool selection and result phrasing.
pub const TOOL_SYSTEM_PROMPT: &str = r#"You are a customer support assistant that can perform actions with tools.

Select the single tool that fulfils the user's request and call it with arguments taken from the user's message.
Only use argument values the user actually provided; never guess identifiers.

If function calling is unavailable, respond with a JSON object and nothing else:
{"tool": "<tool name>", "arguments": {<argument name>: <value>}}

If no tool applies, respond with:
{"tool": null, "arguments": {}}"#;

/// System prompt for conversational replies.
pub const RESPONDER_SYSTEM_PROMPT: &str = r"You are a friendly and professional customer support assistant.

Respond naturally to the user. Keep replies short and warm.
If the user seems to need information or an action, invite them to ask about orders, subscriptions, shipping, returns or their account.";

/// Instruction appended when phrasing a tool result for the user.
const TOOL_SUMMARY_INSTRUCTION: &str =
    "Generate a natural, helpful response to the user based on these results. Be concise and professional.";

/// Context line used when retrieval produced nothing.
pub const NO_CONTEXT_NOTICE: &str = "No relevant information found in knowledge base.";

/// Default prompt directory relative to the user's home.
const DEFAULT_PROMPT_DIR: &str = ".config/supportflow-rs/prompts";

/// Filename for the router prompt template.
const ROUTER_FILENAME: &str = "router.md";
/// Filename for the RAG prompt template.
const RAG_FILENAME: &str = "rag.md";
/// Filename for the tool prompt template.
const TOOL_FILENAME: &str = "tool.md";
/// Filename for the responder prompt template.
const RESPONDER_FILENAME: &str = "responder.md";

/// A set of system prompts for all agents.
///
/// Loaded from external template files when available, falling back to
/// compiled-in defaults. Use [`PromptSet::load`] to resolve the prompt
/// directory from CLI flags, environment variables, or the default path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptSet {
    /// System prompt for the intent router.
    pub router: String,
    /// System prompt for the RAG agent.
    pub rag: String,
    /// System prompt for the tool agent.
    pub tool: String,
    /// System prompt for the responder agent.
    pub responder: String,
}

impl PromptSet {
    /// Loads prompts from the given directory, falling back to compiled-in defaults.
    ///
    /// Each file is loaded independently; a missing or blank file uses its
    /// default.
    #[must_use]
    pub fn load(prompt_dir: Option<&Path>) -> Self {
        let resolved_dir = prompt_dir
            .map(PathBuf::from)
            .or_else(|| std::env::var("SUPPORTFLOW_PROMPT_DIR").ok().map(PathBuf::from))
            .or_else(Self::default_dir);

        let load_file = |filename: &str, default: &str| -> String {
            resolved_dir
                .as_ref()
                .map(|dir| dir.join(filename))
                .and_then(|path| std::fs::read_to_string(&path).ok())
                .filter(|content| !content.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        Self {
            router: load_file(ROUTER_FILENAME, ROUTER_SYSTEM_PROMPT),
            rag: load_file(RAG_FILENAME, RAG_SYSTEM_PROMPT),
            tool: load_file(TOOL_FILENAME, TOOL_SYSTEM_PROMPT),
            responder: load_file(RESPONDER_FILENAME, RESPONDER_SYSTEM_PROMPT),
        }
    }

    /// Returns compiled-in defaults without checking the filesystem.
    #[must_use]
    pub fn defaults() -> Self {
        Self {
            router: ROUTER_SYSTEM_PROMPT.to_string(),
            rag: RAG_SYSTEM_PROMPT.to_string(),
            tool: TOOL_SYSTEM_PROMPT.to_string(),
            responder: RESPONDER_SYSTEM_PROMPT.to_string(),
        }
    }

    /// Writes the compiled-in default prompts to the given directory.
    ///
    /// Creates the directory if it does not exist. Existing files are
    /// **not** overwritten.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if directory creation or file writing fails.
    pub fn write_defaults(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
        std::fs::create_dir_all(dir)?;

        let templates = [
            (ROUTER_FILENAME, ROUTER_SYSTEM_PROMPT),
            (RAG_FILENAME, RAG_SYSTEM_PROMPT),
            (TOOL_FILENAME, TOOL_SYSTEM_PROMPT),
            (RESPONDER_FILENAME, RESPONDER_SYSTEM_PROMPT),
        ];

        let mut written = Vec::new();
        for (filename, content) in &templates {
            let path = dir.join(filename);
            if !path.exists() {
                std::fs::write(&path, content)?;
                written.push(path);
            }
        }

        Ok(written)
    }

    /// Returns the default prompt directory under the user's home.
    ///
    /// Returns `None` if the home directory cannot be determined.
    #[must_use]
    pub fn default_dir() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(DEFAULT_PROMPT_DIR))
    }
}

impl Default for PromptSet {
    fn default() -> Self {
        Self::defaults()
    }
}

/// Builds the user message for the RAG agent.
///
/// Each context is numbered and tagged with its document id so the model
/// can cite it. An empty slice yields [`NO_CONTEXT_NOTICE`] in place of
/// the passages.
#[must_use]
pub fn build_rag_prompt(query: &str, contexts: &[RetrievedContext]) -> String {
    let mut prompt = String::from("<context>\n");
    if contexts.is_empty() {
        prompt.push_str(NO_CONTEXT_NOTICE);
        prompt.push('\n');
    }
    for ctx in contexts {
        let _ = write!(
            prompt,
            "[{rank}] (doc: {id}) {snippet}\n\n",
            rank = ctx.final_rank,
            id = ctx.doc_id,
            snippet = ctx.snippet.trim(),
        );
    }
    let _ = write!(
        prompt,
        "</context>\n\n<question>{query}</question>\n\n\
         Answer the question using the context above."
    );
    prompt
}

/// Builds the user message asking the tool agent to phrase a result.
#[must_use]
pub fn build_tool_summary_prompt(query: &str, tool: &str, outcome: &Value) -> String {
    let outcome_json = serde_json::to_string_pretty(outcome).unwrap_or_else(|_| "{}".to_string());
    format!(
        "<request>{query}</request>\n\n\
         <tool name=\"{tool}\">\n{outcome_json}\n</tool>\n\n\
         {TOOL_SUMMARY_INSTRUCTION}"
    )
}
