//! Router tier 2 — the planner.
//!
//! A larger model produces an ordered `ExecutionPlan`. Model output is
//! normalized through a chain of explicit decoders ordered by
//! specificity: direct object → known envelopes (`plan`,
//! `executionPlan`, `execution_plan`, `data`) → bare step array →
//! quoted-JSON string. Step keys accept the casings models actually
//! emit. The normalized plan is guaranteed non-empty and
//! respond-terminated; any failure degrades to a single respond step.

use std::sync::Arc;

use serde_json::{json, Value};

use trellis_domain::error::Result;
use trellis_domain::message::ChatMessage;
use trellis_domain::plan::{ExecutionPlan, Step, MAX_REPLANS};
use trellis_graph::Node;
use trellis_ports::llm::ChatRequest;

use crate::bundle::TurnCtx;
use crate::state::{TurnDelta, TurnState};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Normalization
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Case-insensitive key lookup.
fn get_ci<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    let map = value.as_object()?;
    map.iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .map(|(_, v)| v)
}

/// First present key from a list of aliases, case-insensitively.
fn get_alias<'a>(value: &'a Value, aliases: &[&str]) -> Option<&'a Value> {
    aliases.iter().find_map(|k| get_ci(value, k))
}

/// Unwrap the envelopes models like to add around the plan document.
fn unwrap_envelope(value: &Value) -> Value {
    // Quoted JSON: a string that itself parses as JSON.
    if let Some(s) = value.as_str() {
        if let Ok(inner) = serde_json::from_str::<Value>(s) {
            return unwrap_envelope(&inner);
        }
    }

    // Known wrapper keys.
    if value.is_object() {
        if let Some(inner) = get_alias(value, &["plan", "executionPlan", "execution_plan", "data"])
        {
            // Only unwrap when the wrapper does not itself look like a plan.
            if get_ci(value, "steps").is_none() {
                return unwrap_envelope(inner);
            }
        }
    }

    // A bare array is a step list.
    if value.is_array() {
        return json!({ "steps": value });
    }

    value.clone()
}

/// Decode one step object, tolerating alternate key casings. Unknown
/// types are dropped (logged by the caller via the count difference).
fn decode_step(value: &Value) -> Option<Step> {
    let step_type = get_alias(value, &["type", "stepType", "step_type"])?
        .as_str()?
        .to_ascii_lowercase();
    let purpose = get_alias(value, &["purpose", "description"])
        .and_then(|p| p.as_str())
        .unwrap_or_default()
        .to_string();

    match step_type.as_str() {
        "search" | "research" => {
            let search_query = get_alias(value, &["searchQuery", "search_query", "query"])
                .and_then(|q| q.as_str())
                .unwrap_or_default()
                .to_string();
            if search_query.is_empty() {
                return None;
            }
            Some(Step::Search {
                purpose,
                search_query,
            })
        }
        "command" => Some(Step::Command {
            purpose,
            domain: get_alias(value, &["domain"])
                .and_then(|d| d.as_str())
                .unwrap_or("system")
                .to_string(),
            details: get_alias(value, &["commandDetails", "command_details", "details", "command"])
                .and_then(|d| d.as_str())
                .unwrap_or_default()
                .to_string(),
        }),
        "respond" | "response" | "answer" => Some(Step::respond(if purpose.is_empty() {
            "Provide final answer".to_string()
        } else {
            purpose
        })),
        _ => None,
    }
}

/// Full normalization: envelope unwrapping, step decoding, and the
/// non-empty / respond-terminated guarantees.
pub(crate) fn normalize_plan(value: &Value) -> ExecutionPlan {
    let doc = unwrap_envelope(value);

    let reasoning = get_alias(&doc, &["reasoning", "rationale"])
        .and_then(|r| r.as_str())
        .unwrap_or_default()
        .to_string();

    let raw_steps = get_ci(&doc, "steps")
        .and_then(|s| s.as_array())
        .cloned()
        .unwrap_or_default();

    let steps: Vec<Step> = raw_steps.iter().filter_map(decode_step).collect();
    if steps.len() < raw_steps.len() {
        tracing::warn!(
            dropped = raw_steps.len() - steps.len(),
            "planner emitted undecodable steps"
        );
    }

    let mut plan = ExecutionPlan {
        reasoning,
        steps,
        replanned_count: 0,
    };
    plan.normalize();
    plan
}

fn plan_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "reasoning": { "type": "string" },
            "steps": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "type": { "type": "string", "enum": ["search", "command", "respond"] },
                        "purpose": { "type": "string" },
                        "searchQuery": { "type": "string" },
                        "domain": { "type": "string" },
                        "commandDetails": { "type": "string" }
                    },
                    "required": ["type", "purpose"]
                }
            }
        },
        "required": ["steps"]
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Node
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct PlannerNode {
    ctx: Arc<TurnCtx>,
}

impl PlannerNode {
    pub fn new(ctx: Arc<TurnCtx>) -> Self {
        Self { ctx }
    }
}

#[async_trait::async_trait]
impl Node<TurnState> for PlannerNode {
    async fn run(&self, state: &TurnState) -> Result<TurnDelta> {
        let replanning = state.request_replan && state.replanned_count < MAX_REPLANS;

        let today = chrono::Utc::now().format("%Y-%m-%d");
        let mut system = format!(
            "You are a planner for an assistant with tools. Today's date is {today}. \
             Produce a JSON plan: {{\"reasoning\": string, \"steps\": [...]}}. Each step is \
             {{\"type\": \"search\"|\"command\"|\"respond\", \"purpose\": string}} plus \
             \"searchQuery\" for search steps, or \"domain\" and \"commandDetails\" for \
             command steps (domain \"web\" fetches a URL, \"system\" runs a shell command). \
             Include the date in time-sensitive search queries. The final step must be \
             \"respond\"."
        );
        if replanning {
            system.push_str(&format!(
                "\n\nThe previous answer was inadequate: {}. Produce a better plan that \
                 gathers what was missing.",
                state.replan_reason
            ));
        }

        let mut messages = vec![ChatMessage::system(system)];
        messages.extend(state.context_messages.iter().cloned());
        messages.push(ChatMessage::user(format!("Plan for: {}", state.query)));

        let req = ChatRequest {
            messages,
            temperature: Some(0.1),
            max_tokens: Some(800),
            json_mode: true,
            model: None,
        };

        let mut plan = match self
            .ctx
            .caps
            .roles
            .planner
            .invoke_structured(req, &plan_schema())
            .await
        {
            Ok(value) => normalize_plan(&value),
            Err(e) => {
                tracing::warn!(error = %e, "planner failed, falling back to direct answer");
                ExecutionPlan::respond_only("Provide direct answer")
            }
        };

        let replanned_count = if replanning {
            state.replanned_count + 1
        } else {
            state.replanned_count
        };
        plan.replanned_count = replanned_count;

        self.ctx
            .publisher
            .status(
                "planning",
                &format!("{} steps", plan.steps.len()),
                Some(plan.reasoning.clone()),
                None,
            )
            .await;

        Ok(TurnDelta {
            execution_plan: Some(plan),
            current_step_index: Some(0),
            request_replan: Some(false),
            replanned_count: Some(replanned_count),
            node_number: Some(state.node_number + 1),
            ..TurnDelta::default()
        })
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_domain::plan::StepKind;

    #[test]
    fn direct_object_decodes() {
        let plan = normalize_plan(&json!({
            "reasoning": "need fresh info",
            "steps": [
                { "type": "search", "purpose": "look up", "searchQuery": "chiefs score 2026-08-01" },
                { "type": "respond", "purpose": "answer" }
            ]
        }));
        assert_eq!(plan.reasoning, "need fresh info");
        assert_eq!(plan.steps.len(), 2);
        assert_eq!(plan.steps[0].kind(), StepKind::Search);
    }

    #[test]
    fn plan_envelope_unwraps() {
        let plan = normalize_plan(&json!({
            "plan": { "steps": [{ "type": "respond", "purpose": "p" }] }
        }));
        assert_eq!(plan.steps.len(), 1);
    }

    #[test]
    fn execution_plan_envelope_unwraps() {
        for key in ["executionPlan", "execution_plan", "data"] {
            let plan = normalize_plan(&json!({
                key: { "steps": [{ "type": "respond", "purpose": "p" }] }
            }));
            assert_eq!(plan.steps.len(), 1, "envelope {key}");
        }
    }

    #[test]
    fn bare_array_is_a_step_list() {
        let plan = normalize_plan(&json!([
            { "type": "search", "purpose": "p", "searchQuery": "q" }
        ]));
        assert_eq!(plan.steps.len(), 2); // respond appended
        assert_eq!(plan.steps[1].kind(), StepKind::Respond);
    }

    #[test]
    fn quoted_json_string_unwraps() {
        let inner = r#"{"steps":[{"type":"respond","purpose":"p"}]}"#;
        let plan = normalize_plan(&Value::String(inner.to_string()));
        assert_eq!(plan.steps.len(), 1);
    }

    #[test]
    fn alternate_key_casings_accepted() {
        let plan = normalize_plan(&json!({
            "Reasoning": "r",
            "Steps": [
                { "Type": "Search", "Purpose": "p", "search_query": "q" },
                { "TYPE": "respond", "purpose": "p" }
            ]
        }));
        assert_eq!(plan.reasoning, "r");
        assert_eq!(plan.steps.len(), 2);
        match &plan.steps[0] {
            Step::Search { search_query, .. } => assert_eq!(search_query, "q"),
            other => panic!("expected search, got {other:?}"),
        }
    }

    #[test]
    fn missing_respond_terminal_is_appended() {
        let plan = normalize_plan(&json!({
            "steps": [{ "type": "search", "purpose": "p", "searchQuery": "q" }]
        }));
        assert_eq!(plan.steps.last().unwrap().kind(), StepKind::Respond);
    }

    #[test]
    fn empty_steps_degrade_to_respond_only() {
        let plan = normalize_plan(&json!({ "steps": [] }));
        assert_eq!(plan.steps.len(), 1);
        assert_eq!(plan.steps[0].kind(), StepKind::Respond);
    }

    #[test]
    fn garbage_degrades_to_respond_only() {
        let plan = normalize_plan(&json!("total nonsense"));
        assert_eq!(plan.steps.len(), 1);
        assert_eq!(plan.steps[0].kind(), StepKind::Respond);
    }

    #[test]
    fn unknown_step_types_are_dropped() {
        let plan = normalize_plan(&json!({
            "steps": [
                { "type": "teleport", "purpose": "p" },
                { "type": "respond", "purpose": "p" }
            ]
        }));
        assert_eq!(plan.steps.len(), 1);
    }

    #[test]
    fn search_without_query_is_dropped() {
        let plan = normalize_plan(&json!({
            "steps": [
                { "type": "search", "purpose": "p" },
                { "type": "respond", "purpose": "p" }
            ]
        }));
        assert_eq!(plan.steps.len(), 1);
        assert_eq!(plan.steps[0].kind(), StepKind::Respond);
    }

    #[test]
    fn command_step_fields_decode() {
        let plan = normalize_plan(&json!({
            "steps": [
                { "type": "command", "purpose": "p", "domain": "web",
                  "commandDetails": "https://example.com" }
            ]
        }));
        match &plan.steps[0] {
            Step::Command { domain, details, .. } => {
                assert_eq!(domain, "web");
                assert_eq!(details, "https://example.com");
            }
            other => panic!("expected command, got {other:?}"),
        }
    }

    #[test]
    fn plan_roundtrips_through_serde() {
        let plan = normalize_plan(&json!({
            "reasoning": "r",
            "steps": [
                { "type": "search", "purpose": "p", "searchQuery": "q" },
                { "type": "command", "purpose": "p", "domain": "system", "commandDetails": "ls" },
                { "type": "respond", "purpose": "p" }
            ]
        }));
        let wire = serde_json::to_string(&plan).unwrap();
        let back: ExecutionPlan = serde_json::from_str(&wire).unwrap();
        assert_eq!(plan, back);
    }
}
