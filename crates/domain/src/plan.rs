//! Execution plans — the planner's output and the executor's input.
//!
//! Invariants enforced here rather than assumed:
//! - `steps` is never empty after [`ExecutionPlan::normalize`].
//! - The final step is always `Respond`.
//! - `replanned_count` never exceeds [`MAX_REPLANS`].

use serde::{Deserialize, Serialize};

/// Upper bound on replanning rounds per turn. Requests past this are ignored.
pub const MAX_REPLANS: u8 = 3;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Steps
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One element of an execution plan. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Step {
    Search {
        purpose: String,
        #[serde(rename = "searchQuery")]
        search_query: String,
    },
    Command {
        purpose: String,
        /// Dispatch domain, e.g. `"web"`, `"system"`.
        domain: String,
        #[serde(rename = "commandDetails", default)]
        details: String,
    },
    Respond { purpose: String },
}

impl Step {
    pub fn respond(purpose: impl Into<String>) -> Self {
        Step::Respond {
            purpose: purpose.into(),
        }
    }

    pub fn kind(&self) -> StepKind {
        match self {
            Step::Search { .. } => StepKind::Search,
            Step::Command { .. } => StepKind::Command,
            Step::Respond { .. } => StepKind::Respond,
        }
    }

    pub fn purpose(&self) -> &str {
        match self {
            Step::Search { purpose, .. }
            | Step::Command { purpose, .. }
            | Step::Respond { purpose } => purpose,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
    Search,
    Command,
    Respond,
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepKind::Search => write!(f, "search"),
            StepKind::Command => write!(f, "command"),
            StepKind::Respond => write!(f, "respond"),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Plans
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// An ordered plan of steps, terminated by a `Respond` step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    #[serde(default)]
    pub reasoning: String,
    pub steps: Vec<Step>,
    /// How many times this turn has replanned. Not part of the model wire
    /// format; the planner stamps it from graph state.
    #[serde(default)]
    pub replanned_count: u8,
}

impl ExecutionPlan {
    /// The trivial plan: answer directly.
    pub fn respond_only(purpose: impl Into<String>) -> Self {
        Self {
            reasoning: String::new(),
            steps: vec![Step::respond(purpose)],
            replanned_count: 0,
        }
    }

    /// Enforce the plan invariants: non-empty steps ending in `Respond`.
    /// Model output that violates them is repaired, not rejected.
    pub fn normalize(&mut self) {
        let needs_terminal = match self.steps.last() {
            None => true,
            Some(step) => step.kind() != StepKind::Respond,
        };
        if needs_terminal {
            self.steps.push(Step::respond("Provide final answer"));
        }
    }

    /// Insert a step immediately after `index`, used by the search node to
    /// queue a refined query. No-op past the end.
    pub fn insert_after(&mut self, index: usize, step: Step) {
        let at = (index + 1).min(self.steps.len());
        self.steps.insert(at, step);
    }
}
