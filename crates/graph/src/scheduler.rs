use std::collections::HashMap;
use std::sync::Arc;

use trellis_domain::error::{Error, Result};
use trellis_events::CancelToken;

/// Terminal edge label.
pub const END: &str = "__end__";

/// Upper bound on node transitions per run. Generous relative to any
/// legal path (search loops are capped far below this); hitting it means
/// an edge function is broken.
const MAX_TRANSITIONS: usize = 64;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Traits
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A graph state: a set of typed channels merged through `apply`.
/// Each field's merge rule inside `apply` is that channel's reducer;
/// reducers must be total.
pub trait GraphState: Send {
    type Delta: Send;

    fn apply(&mut self, delta: Self::Delta);
}

/// A node: reads the state, returns a partial update. Nodes must not
/// mutate shared state outside the returned delta.
#[async_trait::async_trait]
pub trait Node<S: GraphState>: Send + Sync {
    async fn run(&self, state: &S) -> Result<S::Delta>;
}

type EdgeFn<S> = Box<dyn Fn(&S) -> String + Send + Sync>;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Graph
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// An executable graph: nodes keyed by label, one conditional edge per
/// node.
pub struct Graph<S: GraphState> {
    nodes: HashMap<String, Arc<dyn Node<S>>>,
    edges: HashMap<String, EdgeFn<S>>,
}

/// Builder for [`Graph`].
pub struct GraphBuilder<S: GraphState> {
    nodes: HashMap<String, Arc<dyn Node<S>>>,
    edges: HashMap<String, EdgeFn<S>>,
}

impl<S: GraphState> Default for GraphBuilder<S> {
    fn default() -> Self {
        Self {
            nodes: HashMap::new(),
            edges: HashMap::new(),
        }
    }
}

impl<S: GraphState> GraphBuilder<S> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(mut self, label: &str, node: Arc<dyn Node<S>>) -> Self {
        self.nodes.insert(label.to_string(), node);
        self
    }

    /// Conditional edge: evaluated on the state after the node ran.
    pub fn edge<F>(mut self, from: &str, condition: F) -> Self
    where
        F: Fn(&S) -> String + Send + Sync + 'static,
    {
        self.edges.insert(from.to_string(), Box::new(condition));
        self
    }

    /// Unconditional edge.
    pub fn fixed_edge(self, from: &str, to: &str) -> Self {
        let to = to.to_string();
        self.edge(from, move |_| to.clone())
    }

    /// Validate that every node has an outgoing edge and every edge
    /// source has a node, then seal the graph.
    pub fn build(self) -> Result<Graph<S>> {
        for label in self.nodes.keys() {
            if !self.edges.contains_key(label) {
                return Err(Error::Config(format!("node '{label}' has no outgoing edge")));
            }
        }
        for label in self.edges.keys() {
            if !self.nodes.contains_key(label) {
                return Err(Error::Config(format!("edge from unknown node '{label}'")));
            }
        }
        Ok(Graph {
            nodes: self.nodes,
            edges: self.edges,
        })
    }
}

impl<S: GraphState> Graph<S> {
    /// Run the graph from `entry` until an edge returns [`END`].
    ///
    /// Nodes run strictly sequentially; the cancel token is checked
    /// before each node. Edge functions returning an unknown label abort
    /// the run.
    pub async fn run(&self, state: &mut S, entry: &str, cancel: &CancelToken) -> Result<()> {
        let mut current = entry.to_string();

        for transition in 0..=MAX_TRANSITIONS {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let node = self
                .nodes
                .get(&current)
                .ok_or_else(|| Error::Config(format!("unknown node label: {current}")))?;

            tracing::debug!(node = %current, transition, "running node");
            let delta = node.run(state).await?;
            state.apply(delta);

            let edge = self
                .edges
                .get(&current)
                .ok_or_else(|| Error::Config(format!("no edge from node: {current}")))?;
            let next = edge(state);

            if next == END {
                return Ok(());
            }
            current = next;
        }

        Err(Error::Other(format!(
            "graph exceeded {MAX_TRANSITIONS} transitions (cycle without exit?)"
        )))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
