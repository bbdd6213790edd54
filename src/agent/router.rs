//! Intent router.
//!
//! Classifies a turn into `knowledge`, `action` or `conversation` with a
//! single bounded provider call. Every failure (provider error, timeout,
//! unparseable output) fails closed to `conversation` with zero confidence,
//! so the orchestrator always has a branch to take.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};

use super::config::AgentConfig;
use super::message::TokenUsage;
use super::provider::LlmProvider;
use super::traits::{Agent, CallPolicy, strip_code_fence};
use crate::core::{ConversationTurn, Intent, LabelMatch, RouteDecision};
use crate::error::AgentError;

/// Confidence assigned to an exact label with no reported confidence.
const EXACT_LABEL_CONFIDENCE: f32 = 1.0;
/// Confidence assigned to a synonym with no reported confidence.
const SYNONYM_LABEL_CONFIDENCE: f32 = 0.8;
/// Confidence assigned when a label was only found inside free text.
const SCANNED_LABEL_CONFIDENCE: f32 = 0.5;

static LABEL_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)\b(knowledge|action|conversation)\b").ok());

/// Agent that classifies turns by intent.
pub struct IntentRouter {
    model: String,
    max_tokens: u32,
    system_prompt: String,
    history_window: usize,
    policy: CallPolicy,
}

/// What the router produced for one turn.
#[derive(Debug, Clone)]
pub struct RouteOutcome {
    /// The decision. Always valid.
    pub decision: RouteDecision,
    /// Tokens spent on classification.
    pub usage: TokenUsage,
    /// The classification failure, if the router failed closed.
    pub error: Option<AgentError>,
}

impl IntentRouter {
    /// Creates a router with the given configuration and system prompt.
    ///
    /// The router never retries: one attempt bounded by `llm_timeout`.
    #[must_use]
    pub fn new(config: &AgentConfig, system_prompt: String) -> Self {
        Self {
            model: config.router_model.clone(),
            max_tokens: config.router_max_tokens,
            system_prompt,
            history_window: config.history_window,
            policy: CallPolicy::single(config.llm_timeout),
        }
    }

    /// Classifies `turn`. Never fails.
    ///
    /// A blank query short-circuits to the fail-closed decision without
    /// calling the provider.
    pub async fn route(&self, provider: &dyn LlmProvider, turn: &ConversationTurn) -> RouteOutcome {
        let query = turn.query().trim();
        if query.is_empty() {
            return RouteOutcome {
                decision: RouteDecision::fail_closed("empty query"),
                usage: TokenUsage::default(),
                error: None,
            };
        }

        let history = turn.recent_history(self.history_window);
        let response = match self.execute(provider, history, query, self.policy).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Classification failed, routing to conversation");
                return RouteOutcome {
                    decision: RouteDecision::fail_closed(format!("classification failed: {e}")),
                    usage: TokenUsage::default(),
                    error: Some(e),
                };
            }
        };

        match parse_classification(&response.content) {
            Some(decision) => {
                debug!(
                    intent = %decision.intent,
                    confidence = decision.confidence,
                    "Turn classified"
                );
                RouteOutcome {
                    decision,
                    usage: response.usage,
                    error: None,
                }
            }
            None => {
                warn!(content = %response.content, "Unrecognised classification, routing to conversation");
                let error = AgentError::ResponseParse {
                    message: "no intent label in classifier output".to_string(),
                    content: response.content,
                };
                RouteOutcome {
                    decision: RouteDecision::fail_closed(error.to_string()),
                    usage: response.usage,
                    error: Some(error),
                }
            }
        }
    }
}

impl std::fmt::Debug for IntentRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntentRouter")
            .field("model", &self.model)
            .field("history_window", &self.history_window)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Agent for IntentRouter {
    fn name(&self) -> &'static str {
        "router"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    fn json_mode(&self) -> bool {
        true
    }

    fn max_tokens(&self) -> u32 {
        self.max_tokens
    }
}

fn default_confidence(matched: LabelMatch) -> f32 {
    match matched {
        LabelMatch::Exact => EXACT_LABEL_CONFIDENCE,
        LabelMatch::Synonym => SYNONYM_LABEL_CONFIDENCE,
    }
}

#[allow(clippy::cast_possible_truncation)]
fn confidence_value(value: &Value) -> Option<f32> {
    match value {
        Value::Number(n) => n.as_f64().map(|f| f as f32),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn parse_json(content: &str) -> Option<RouteDecision> {
    let value: Value = serde_json::from_str(content).ok()?;
    let obj = value.as_object()?;
    let label = ["intent", "category", "label"]
        .iter()
        .find_map(|k| obj.get(*k).and_then(Value::as_str))?;
    let (intent, matched) = Intent::parse_label(label)?;
    let confidence = obj
        .get("confidence")
        .and_then(confidence_value)
        .unwrap_or_else(|| default_confidence(matched));
    let rationale = ["rationale", "reasoning", "reason"]
        .iter()
        .find_map(|k| obj.get(*k).and_then(Value::as_str))
        .map(str::to_string);
    Some(RouteDecision::new(intent, confidence, rationale))
}

/// `label`, `label|reasoning` or `label|confidence|reasoning`.
fn parse_delimited(content: &str) -> Option<RouteDecision> {
    let line = content.lines().find(|l| !l.trim().is_empty())?;
    let mut parts = line.splitn(3, '|').map(str::trim);
    let (intent, matched) = Intent::parse_label(parts.next()?)?;

    let second = parts.next();
    let third = parts.next();
    let (confidence, rationale) = match (second, third) {
        (Some(c), Some(r)) => match c.parse::<f32>() {
            Ok(c) => (c, Some(r.to_string())),
            Err(_) => (default_confidence(matched), Some(format!("{c}|{r}"))),
        },
        (Some(r), None) => (default_confidence(matched), Some(r.to_string())),
        _ => (default_confidence(matched), None),
    };
    Some(RouteDecision::new(intent, confidence, rationale))
}

/// Finds a single canonical label mentioned anywhere in free text.
fn scan_for_label(content: &str) -> Option<RouteDecision> {
    let re = LABEL_RE.as_ref()?;
    let mut found: Option<Intent> = None;
    for cap in re.find_iter(content) {
        let (intent, _) = Intent::parse_label(cap.as_str())?;
        match found {
            Some(existing) if existing != intent => return None,
            _ => found = Some(intent),
        }
    }
    found.map(|intent| {
        RouteDecision::new(
            intent,
            SCANNED_LABEL_CONFIDENCE,
            Some(content.trim().to_string()),
        )
    })
}

/// Parses classifier output into a decision.
///
/// Accepts a JSON object (`intent`, `confidence`, `rationale`), the
/// delimited `label|reasoning` form, or free text naming exactly one
/// canonical label. Code fences are ignored. Returns `None` when no form
/// yields a recognised label.
#[must_use]
pub fn parse_classification(content: &str) -> Option<RouteDecision> {
    let body = strip_code_fence(content);
    if body.is_empty() {
        return None;
    }
    parse_json(body)
        .or_else(|| parse_delimited(body))
        .or_else(|| scan_for_label(body))
}
