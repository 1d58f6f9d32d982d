//! Marshaled instruction graphs.
//!
//! A [`Definition`] is the serialized form of the graph rooted at one
//! [`State`]. Nodes are content-addressed: a node's digest covers its
//! operation and the digests of its inputs but not its description, so
//! identical sub-graphs collapse into one node and compiling the same spec
//! twice yields byte-identical output.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use petgraph::Direction;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::util::hash::{Digest, HashError, Hashable};

use super::{Node, Op, State};

#[derive(Debug, Error)]
pub enum GraphError {
  #[error("failed to encode graph node: {0}")]
  Encode(#[from] HashError),

  #[error("node {node} references unknown input {input}")]
  MissingInput { node: Digest, input: Digest },

  #[error("node {node} has no output {output}")]
  InvalidOutput { node: Digest, output: usize },

  #[error("cycle detected in graph")]
  CycleDetected,

  #[error("diff {node} compares states that share no ancestor")]
  UnrelatedDiff { node: Digest },
}

/// Reference to one output of a marshaled node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InputRef {
  pub digest: Digest,
  pub output: usize,
}

impl Hashable for Op<InputRef> {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefNode {
  pub digest: Digest,
  pub op: Op<InputRef>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Definition {
  /// Nodes in dependency order: every input precedes its consumers.
  pub nodes: Vec<DefNode>,
  pub root: InputRef,
}

impl Definition {
  /// Marshal the graph rooted at `state`.
  pub fn from_state(state: &State) -> Result<Self, GraphError> {
    let mut marshaler = Marshaler::default();
    let digest = marshaler.visit(&state.node)?;
    let def = Self {
      nodes: marshaler.nodes,
      root: InputRef {
        digest,
        output: state.output,
      },
    };
    def.verify()?;
    debug!(nodes = def.nodes.len(), root = %def.root.digest.short(), "marshaled graph");
    Ok(def)
  }

  pub fn node(&self, digest: &Digest) -> Option<&DefNode> {
    self.nodes.iter().find(|n| &n.digest == digest)
  }

  /// Number of nodes per operation kind.
  pub fn op_counts(&self) -> BTreeMap<&'static str, usize> {
    let mut counts = BTreeMap::new();
    for node in &self.nodes {
      *counts.entry(node.op.kind()).or_insert(0) += 1;
    }
    counts
  }

  pub fn to_json(&self) -> Result<Vec<u8>, GraphError> {
    Ok(serde_json::to_vec_pretty(self)?)
  }

  pub fn from_json(bytes: &[u8]) -> Result<Self, GraphError> {
    let def: Self = serde_json::from_slice(bytes)?;
    def.verify()?;
    Ok(def)
  }

  /// Check references, outputs, acyclicity and diff ancestry.
  pub fn verify(&self) -> Result<(), GraphError> {
    let mut graph: DiGraph<Digest, ()> = DiGraph::new();
    let mut indices: HashMap<&Digest, NodeIndex> = HashMap::new();
    for node in &self.nodes {
      indices.insert(&node.digest, graph.add_node(node.digest.clone()));
    }

    let by_digest: HashMap<&Digest, &DefNode> = self.nodes.iter().map(|n| (&n.digest, n)).collect();
    let check = |node: &Digest, input: &InputRef| -> Result<NodeIndex, GraphError> {
      let target = by_digest.get(&input.digest).ok_or_else(|| GraphError::MissingInput {
        node: node.clone(),
        input: input.digest.clone(),
      })?;
      if input.output >= target.op.output_count() {
        return Err(GraphError::InvalidOutput {
          node: input.digest.clone(),
          output: input.output,
        });
      }
      Ok(indices[&input.digest])
    };

    for node in &self.nodes {
      for input in node.op.inputs() {
        let from = check(&node.digest, input)?;
        graph.add_edge(from, indices[&node.digest], ());
      }
    }
    check(&self.root.digest, &self.root)?;

    toposort(&graph, None).map_err(|_| GraphError::CycleDetected)?;

    for node in &self.nodes {
      if let Op::Diff { lower, upper } = &node.op {
        let lower = ancestors(&graph, indices[&lower.digest]);
        let upper = ancestors(&graph, indices[&upper.digest]);
        if lower.is_disjoint(&upper) {
          return Err(GraphError::UnrelatedDiff {
            node: node.digest.clone(),
          });
        }
      }
    }

    Ok(())
  }
}

/// All nodes reachable through inputs from `start`, including itself.
fn ancestors(graph: &DiGraph<Digest, ()>, start: NodeIndex) -> HashSet<NodeIndex> {
  let mut seen = HashSet::from([start]);
  let mut stack = vec![start];
  while let Some(idx) = stack.pop() {
    for parent in graph.neighbors_directed(idx, Direction::Incoming) {
      if seen.insert(parent) {
        stack.push(parent);
      }
    }
  }
  seen
}

#[derive(Default)]
struct Marshaler {
  memo: HashMap<*const Node, Digest>,
  seen: HashSet<Digest>,
  nodes: Vec<DefNode>,
}

impl Marshaler {
  fn visit(&mut self, node: &Arc<Node>) -> Result<Digest, GraphError> {
    let key = Arc::as_ptr(node);
    if let Some(digest) = self.memo.get(&key) {
      return Ok(digest.clone());
    }

    let op = node.op.try_map_inputs(&mut |input: &State| -> Result<InputRef, GraphError> {
      Ok(InputRef {
        digest: self.visit(&input.node)?,
        output: input.output,
      })
    })?;
    let digest = op.compute_digest()?;

    if self.seen.insert(digest.clone()) {
      self.nodes.push(DefNode {
        digest: digest.clone(),
        op,
        description: node.description.clone(),
      });
    }
    self.memo.insert(key, digest.clone());
    Ok(digest)
  }
}
