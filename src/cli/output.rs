//! Output formatting for CLI commands.
//!
//! Every command renders either human-readable text or a JSON document.

use std::fmt::Write;

use serde_json::json;

use crate::agent::ToolDefinition;
use crate::core::AgentResult;
use crate::search::{RetrievalOutcome, SearchMode};

/// Output format for command results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable text.
    #[default]
    Text,
    /// Pretty-printed JSON.
    Json,
}

impl OutputFormat {
    /// Parses a format name. Unknown names fall back to text.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Text,
        }
    }
}

fn to_json(value: &serde_json::Value) -> String {
    let mut out = serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string());
    out.push('\n');
    out
}

fn rank_cell(rank: Option<usize>) -> String {
    rank.map_or_else(|| "-".to_string(), |r| r.to_string())
}

/// Formats the result of one support turn.
#[must_use]
pub fn format_agent_result(result: &AgentResult, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => {
            let meta = &result.metadata;
            let mut output = String::new();
            let _ = writeln!(output, "{}\n", result.answer);
            let _ = writeln!(
                output,
                "agent: {}  intent: {}  confidence: {:.2}  status: {}",
                result.agent_type.as_str(),
                result.intent.as_str(),
                meta.route_confidence,
                if result.is_success() { "done" } else { "error" }
            );
            if !result.sources.is_empty() {
                let _ = writeln!(output, "sources: {}", result.sources.join(", "));
            }
            if let Some(tool) = &meta.tool_name {
                let outcome = match meta.tool_success {
                    Some(true) => "ok",
                    Some(false) => "failed",
                    None => "-",
                };
                let _ = writeln!(output, "tool: {tool} ({outcome})");
            }
            if meta.retrieval_degraded {
                let _ = writeln!(output, "retrieval: degraded");
            }
            let _ = writeln!(
                output,
                "nodes: {}  tokens: {}  duration: {}ms",
                meta.node_executions.join(" → "),
                meta.total_tokens,
                meta.duration_ms
            );
            if let Some(error) = &meta.error {
                let _ = writeln!(output, "error: {error}");
            }
            output
        }
        OutputFormat::Json => serde_json::to_string_pretty(result)
            .map(|mut s| {
                s.push('\n');
                s
            })
            .unwrap_or_else(|_| "{}\n".to_string()),
    }
}

/// Formats a retrieval outcome.
#[must_use]
pub fn format_retrieval(
    outcome: &RetrievalOutcome,
    query: &str,
    mode: SearchMode,
    format: OutputFormat,
) -> String {
    let mode_name = match mode {
        SearchMode::Hybrid => "hybrid",
        SearchMode::Dense => "dense",
        SearchMode::Sparse => "sparse",
    };

    match format {
        OutputFormat::Text => {
            let mut output = String::new();
            if outcome.degraded {
                let reason = outcome
                    .dense_error
                    .as_ref()
                    .or(outcome.sparse_error.as_ref())
                    .map_or_else(String::new, |e| format!(": {e}"));
                let _ = writeln!(output, "warning: retrieval degraded{reason}");
            }
            if outcome.contexts.is_empty() {
                let _ = writeln!(output, "No results found for query: \"{query}\"");
                return output;
            }

            let _ = writeln!(
                output,
                "Search results for \"{query}\" ({mode_name} mode, {} results):\n",
                outcome.contexts.len()
            );
            let _ = writeln!(
                output,
                "{:<5} {:<22} {:<10} {:<7} {:<7}",
                "Rank", "Document", "RRF", "Dense", "Sparse"
            );
            output.push_str(&"-".repeat(55));
            output.push('\n');

            for ctx in &outcome.contexts {
                let _ = writeln!(
                    output,
                    "{:<5} {:<22} {:<10.5} {:<7} {:<7}",
                    ctx.final_rank,
                    ctx.doc_id,
                    ctx.fused_score,
                    rank_cell(ctx.dense_rank),
                    rank_cell(ctx.sparse_rank)
                );
                let preview: String = ctx.snippet.chars().take(100).collect();
                let ellipsis = if ctx.snippet.chars().count() > 100 { "..." } else { "" };
                let _ = writeln!(output, "      {}{ellipsis}", preview.replace('\n', " "));
            }
            output
        }
        OutputFormat::Json => to_json(&json!({
            "query": query,
            "mode": mode_name,
            "degraded": outcome.degraded,
            "dense_error": outcome.dense_error.as_ref().map(ToString::to_string),
            "sparse_error": outcome.sparse_error.as_ref().map(ToString::to_string),
            "dense_candidates": outcome.dense_candidates,
            "sparse_candidates": outcome.sparse_candidates,
            "duration_ms": crate::search::duration_ms(outcome.duration),
            "contexts": outcome.contexts,
        })),
    }
}

/// Formats the tool catalog.
#[must_use]
pub fn format_tools(definitions: &[ToolDefinition], format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => {
            let mut output = format!("{} tool(s) registered:\n\n", definitions.len());
            for def in definitions {
                let _ = writeln!(output, "{}", def.name);
                let _ = writeln!(output, "  {}", def.description);
                let required: Vec<&str> = def
                    .parameters
                    .get("required")
                    .and_then(serde_json::Value::as_array)
                    .map(|arr| arr.iter().filter_map(serde_json::Value::as_str).collect())
                    .unwrap_or_default();
                if !required.is_empty() {
                    let _ = writeln!(output, "  required: {}", required.join(", "));
                }
                output.push('\n');
            }
            output
        }
        OutputFormat::Json => to_json(&json!({ "tools": definitions })),
    }
}
