//! Router tier 0 — regex precheck against registry-sourced command
//! patterns.
//!
//! The highest-confidence pattern at or above the configured floor wins
//! and routes the turn down the fastpath; anything else falls through to
//! the classifier.

use std::collections::HashMap;
use std::sync::Arc;

use trellis_domain::error::Result;
use trellis_domain::tool::CommandPattern;
use trellis_graph::Node;

use crate::bundle::TurnCtx;
use crate::state::{FastpathTicket, PrecheckDecision, TurnDelta, TurnState};

pub struct PrecheckNode {
    ctx: Arc<TurnCtx>,
}

impl PrecheckNode {
    pub fn new(ctx: Arc<TurnCtx>) -> Self {
        Self { ctx }
    }
}

/// The winning match: pattern plus extracted parameters.
pub(crate) struct PatternMatch<'a> {
    pub pattern: &'a CommandPattern,
    pub parameters: HashMap<String, String>,
}

/// Match `input` against every pattern; the highest-confidence match at
/// or above `min_confidence` wins.
pub(crate) fn best_match<'a>(
    patterns: &'a [CommandPattern],
    input: &str,
    min_confidence: f64,
) -> Option<PatternMatch<'a>> {
    patterns
        .iter()
        .filter(|p| p.confidence >= min_confidence)
        .filter_map(|p| {
            p.extract(input).map(|parameters| PatternMatch {
                pattern: p,
                parameters,
            })
        })
        .max_by(|a, b| a.pattern.confidence.total_cmp(&b.pattern.confidence))
}

#[async_trait::async_trait]
impl Node<TurnState> for PrecheckNode {
    async fn run(&self, state: &TurnState) -> Result<TurnDelta> {
        let patterns = self.ctx.caps.tools.patterns();
        let min = self.ctx.caps.config.router.precheck_min_confidence;

        match best_match(&patterns, state.query.trim(), min) {
            Some(found) => {
                tracing::debug!(
                    pattern_id = %found.pattern.id,
                    tool = %found.pattern.tool,
                    confidence = found.pattern.confidence,
                    "precheck fastpath hit"
                );
                self.ctx
                    .publisher
                    .status(
                        "routing",
                        &format!("fastpath: {}", found.pattern.tool),
                        Some(found.pattern.description.clone()),
                        Some(found.pattern.confidence),
                    )
                    .await;

                Ok(TurnDelta {
                    precheck_decision: Some(PrecheckDecision::Fastpath),
                    fastpath: Some(FastpathTicket {
                        tool: found.pattern.tool.clone(),
                        server: found.pattern.server.clone(),
                        parameters: found.parameters,
                        ..FastpathTicket::default()
                    }),
                    node_number: Some(state.node_number + 1),
                    ..TurnDelta::default()
                })
            }
            None => Ok(TurnDelta {
                precheck_decision: Some(PrecheckDecision::Classifier),
                node_number: Some(state.node_number + 1),
                ..TurnDelta::default()
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(id: &str, regex: &str, confidence: f64) -> CommandPattern {
        CommandPattern {
            id: id.into(),
            pattern: regex.into(),
            flags: "i".into(),
            tool: format!("{id}_tool"),
            parameter_mapping: HashMap::from([("arg".into(), 1)]),
            description: String::new(),
            examples: vec![],
            confidence,
            server: "test".into(),
        }
    }

    #[test]
    fn highest_confidence_match_wins() {
        let patterns = vec![
            pattern("low", r"^do\s+(.+)$", 0.82),
            pattern("high", r"^do\s+(.+)$", 0.95),
        ];
        let found = best_match(&patterns, "do something", 0.8).unwrap();
        assert_eq!(found.pattern.id, "high");
        assert_eq!(found.parameters["arg"], "something");
    }

    #[test]
    fn below_threshold_falls_through() {
        let patterns = vec![pattern("weak", r"^do\s+(.+)$", 0.79)];
        assert!(best_match(&patterns, "do something", 0.8).is_none());
    }

    #[test]
    fn non_matching_input_falls_through() {
        let patterns = vec![pattern("p", r"^do\s+(.+)$", 0.9)];
        assert!(best_match(&patterns, "what is recursion?", 0.8).is_none());
    }

    #[test]
    fn lights_scenario_extracts_parameters() {
        let lights = CommandPattern {
            id: "lights".into(),
            pattern: r"^turn\s+(on|off)\s+(?:the\s+)?(.+?)\s+lights?$".into(),
            flags: "i".into(),
            tool: "control_light".into(),
            parameter_mapping: HashMap::from([("action".into(), 1), ("location".into(), 2)]),
            description: String::new(),
            examples: vec![],
            confidence: 0.95,
            server: "home".into(),
        };
        let found = best_match(
            std::slice::from_ref(&lights),
            "turn on the kitchen lights",
            0.8,
        )
        .unwrap();
        assert_eq!(found.pattern.tool, "control_light");
        assert_eq!(found.parameters["action"], "on");
        assert_eq!(found.parameters["location"], "kitchen");
    }
}
