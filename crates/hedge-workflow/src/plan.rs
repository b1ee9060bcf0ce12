//! Compiled workflow plans
//!
//! [`build`] turns an analyst selection into an immutable [`WorkflowPlan`]:
//!
//! ```text
//!            ┌─> analyst_1 ─┐
//! start_node ├─> analyst_2 ─┼─> risk_management_agent ─> portfolio_manager
//!            └─> analyst_n ─┘
//! ```
//!
//! Analyst nodes are independent, so the plan stores them sorted by key and
//! two selections with the same keys compile to equal plans.

use crate::registry::CapabilityRegistry;
use hedge_core::{AnalystKey, Error, Result};
use std::collections::BTreeSet;
use std::fmt::Write as _;
use tracing::{debug, warn};

/// Which analysts a run should use
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AnalystSelection {
    /// Every registered analyst
    #[default]
    All,
    /// An explicit list of keys; an empty list is a configuration error
    Keys(Vec<String>),
}

impl AnalystSelection {
    pub fn keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Keys(keys.into_iter().map(Into::into).collect())
    }
}

/// A node of the compiled graph
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Node {
    Start,
    Analyst(AnalystKey),
    RiskManagement,
    PortfolioManagement,
}

impl Node {
    /// Node name as shown in rendered graphs
    pub fn name(&self) -> String {
        match self {
            Self::Start => "start_node".to_string(),
            Self::Analyst(key) => format!("{key}_agent"),
            Self::RiskManagement => "risk_management_agent".to_string(),
            Self::PortfolioManagement => "portfolio_manager".to_string(),
        }
    }
}

/// Directed edge between two nodes, by index into [`WorkflowPlan::nodes`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Edge {
    pub from: usize,
    pub to: usize,
}

/// Immutable evaluation DAG for one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowPlan {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
}

impl WorkflowPlan {
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Analyst keys in node order (sorted)
    pub fn analysts(&self) -> impl Iterator<Item = &AnalystKey> {
        self.nodes.iter().filter_map(|node| match node {
            Node::Analyst(key) => Some(key),
            _ => None,
        })
    }

    pub fn analyst_count(&self) -> usize {
        self.analysts().count()
    }

    /// Whether an edge `from -> to` exists
    pub fn has_edge(&self, from: &Node, to: &Node) -> bool {
        let index = |n: &Node| self.nodes.iter().position(|x| x == n);
        match (index(from), index(to)) {
            (Some(from), Some(to)) => self.edges.contains(&Edge { from, to }),
            _ => false,
        }
    }

    /// Graphviz DOT rendering
    pub fn to_dot(&self) -> String {
        let mut out = String::from("digraph workflow {\n    rankdir=LR;\n");
        for node in &self.nodes {
            let _ = writeln!(out, "    \"{}\";", node.name());
        }
        for edge in &self.edges {
            let _ = writeln!(
                out,
                "    \"{}\" -> \"{}\";",
                self.nodes[edge.from].name(),
                self.nodes[edge.to].name()
            );
        }
        out.push_str("}\n");
        out
    }
}

/// Compile a plan for `selection` against `registry`
///
/// # Errors
///
/// - [`Error::Config`] if the selection resolves to no analysts
/// - [`Error::UnknownCapability`] if a key is malformed or not registered
pub fn build(registry: &CapabilityRegistry, selection: &AnalystSelection) -> Result<WorkflowPlan> {
    let keys: BTreeSet<AnalystKey> = match selection {
        AnalystSelection::All => registry.keys().cloned().collect(),
        AnalystSelection::Keys(raw) => {
            let mut keys = BTreeSet::new();
            for raw_key in raw {
                let key = AnalystKey::new(raw_key.trim())?;
                if !registry.contains(&key) {
                    return Err(Error::UnknownCapability(format!(
                        "analyst '{key}' is not registered"
                    )));
                }
                if !keys.insert(key) {
                    warn!("Analyst '{}' selected more than once", raw_key.trim());
                }
            }
            keys
        }
    };

    if keys.is_empty() {
        return Err(Error::Config("no analysts selected".to_string()));
    }

    let analyst_count = keys.len();
    let risk = analyst_count + 1;
    let portfolio = analyst_count + 2;

    let mut nodes = Vec::with_capacity(analyst_count + 3);
    nodes.push(Node::Start);
    nodes.extend(keys.into_iter().map(Node::Analyst));
    nodes.push(Node::RiskManagement);
    nodes.push(Node::PortfolioManagement);

    let mut edges = Vec::with_capacity(analyst_count * 2 + 1);
    for analyst in 1..=analyst_count {
        edges.push(Edge { from: 0, to: analyst });
    }
    for analyst in 1..=analyst_count {
        edges.push(Edge {
            from: analyst,
            to: risk,
        });
    }
    edges.push(Edge {
        from: risk,
        to: portfolio,
    });

    debug!("Compiled workflow plan with {} analyst(s)", analyst_count);
    Ok(WorkflowPlan { nodes, edges })
}
