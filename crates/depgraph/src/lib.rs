// Copyright 2026 flowctl project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

#![deny(
  clippy::all,
  clippy::default_trait_access,
  clippy::expl_impl_clone_on_copy,
  clippy::if_not_else,
  clippy::needless_continue,
  clippy::unseparated_literal_suffix,
  clippy::used_underscore_binding
)]
#![allow(clippy::match_ref_pats)]
#![allow(clippy::len_without_is_empty, clippy::redundant_field_names)]
#![allow(clippy::new_without_default, clippy::new_ret_no_self)]

use std::fmt::Write as _;

use fnv::FnvHashSet;
use indexmap::IndexMap;
use log::debug;

use diagnostics::{Diagnostic, Position};
use registry::{RuntimeHandle, Stability};
use syntax::BlockStatement;

/// The closed set of node variants the graph can hold. Kept as an explicit discriminant rather
/// than a trait object so reload-time diffing (see `Loader::reuse_and_construct`) can
/// pattern-match by kind instead of relying on open virtual dispatch.
#[derive(Clone, Debug)]
pub enum NodeKind {
  Component {
    factory_name: String,
    stability: Stability,
    community: bool,
  },
  Config,
  Declare,
  Service {
    stability: Stability,
  },
  Foreach,
}

impl NodeKind {
  pub fn label(&self) -> &'static str {
    match self {
      NodeKind::Component { .. } => "component",
      NodeKind::Config => "config block",
      NodeKind::Declare => "declare block",
      NodeKind::Service { .. } => "service",
      NodeKind::Foreach => "block",
    }
  }

  /// Stability this node is gated against. `Foreach` is always pinned to `Experimental`
  /// regardless of what (if anything) the registry would say about its template, per the
  /// documented "foreach is always experimental" rule.
  pub fn stability(&self) -> Option<Stability> {
    match self {
      NodeKind::Component { stability, .. } => Some(*stability),
      NodeKind::Service { stability } => Some(*stability),
      NodeKind::Foreach => Some(Stability::Experimental),
      NodeKind::Config | NodeKind::Declare => None,
    }
  }

  pub fn is_community(&self) -> bool {
    matches!(self, NodeKind::Component { community: true, .. })
  }
}

/// A single node in the published graph. `handle` is `None` until the collaborator factory has
/// built one (config/declare nodes never get one); `module_controller` is likewise `None` until
/// the module-controller factory has run, and stays `None` forever for a component that doesn't
/// declare a module; `data_flow_consumers` is rebuilt from scratch on every apply by the
/// dependency analyzer.
#[derive(Clone)]
pub struct Node {
  pub id: String,
  pub kind: NodeKind,
  pub body: BlockStatement,
  pub position: Position,
  pub handle: Option<RuntimeHandle>,
  pub module_controller: Option<RuntimeHandle>,
  pub data_flow_consumers: Vec<String>,
}

impl Node {
  pub fn new(id: impl Into<String>, kind: NodeKind, body: BlockStatement, position: Position) -> Self {
    Node {
      id: id.into(),
      kind,
      body,
      position,
      handle: None,
      module_controller: None,
      data_flow_consumers: Vec::new(),
    }
  }

  /// Ids of nodes that consume this node's outputs via data-flow expressions, in
  /// analyzer-encounter order, including duplicates when an expression references the same
  /// target more than once.
  pub fn data_flow_edges_to(&self) -> &[String] {
    &self.data_flow_consumers
  }
}

/// Directed graph of the published configuration: nodes plus the deduplicated structural edge
/// set discovered by the dependency analyzer. Distinct from each node's `data_flow_consumers`,
/// which intentionally preserves multiplicity.
#[derive(Clone)]
pub struct Graph {
  nodes: IndexMap<String, Node>,
  edges: FnvHashSet<(String, String)>,
}

impl Graph {
  pub fn empty() -> Self {
    Graph {
      nodes: IndexMap::new(),
      edges: FnvHashSet::default(),
    }
  }

  pub fn node_count(&self) -> usize {
    self.nodes.len()
  }

  pub fn edge_count(&self) -> usize {
    self.edges.len()
  }

  pub fn get_by_id(&self, id: &str) -> Option<&Node> {
    self.nodes.get(id)
  }

  pub fn nodes(&self) -> impl Iterator<Item = &Node> {
    self.nodes.values()
  }

  pub fn ids(&self) -> impl Iterator<Item = &str> {
    self.nodes.keys().map(String::as_str)
  }

  pub fn edges(&self) -> impl Iterator<Item = (&str, &str)> {
    self.edges.iter().map(|(a, b)| (a.as_str(), b.as_str()))
  }

  pub fn contains(&self, id: &str) -> bool {
    self.nodes.contains_key(id)
  }

  /// Topologically ordered walk over the graph, for collaborators that need to evaluate nodes
  /// in dependency order. Assumes the graph has already passed `GraphBuilder::check_cycles`.
  pub fn walk(&self) -> Walk<'_> {
    Walk::new(self)
  }

  /// Graphviz `dot` rendering, useful for debugging a published graph by hand.
  pub fn to_dot(&self) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "digraph config {{");
    for id in self.nodes.keys() {
      let _ = writeln!(out, "  \"{id}\";");
    }
    for (from, to) in &self.edges {
      let _ = writeln!(out, "  \"{from}\" -> \"{to}\";");
    }
    out.push('}');
    out
  }
}

/// Topological iterator produced by [`Graph::walk`]. Computed eagerly via Kahn's algorithm at
/// construction time, mirroring the fixed-order `Walk` iterator in pants' `graph` crate.
pub struct Walk<'a> {
  graph: &'a Graph,
  order: std::vec::IntoIter<String>,
}

impl<'a> Walk<'a> {
  fn new(graph: &'a Graph) -> Self {
    let mut in_degree: IndexMap<&str, usize> = graph.nodes.keys().map(|id| (id.as_str(), 0)).collect();
    for (_, to) in &graph.edges {
      if let Some(d) = in_degree.get_mut(to.as_str()) {
        *d += 1;
      }
    }
    let mut ready: Vec<&str> = in_degree
      .iter()
      .filter(|(_, d)| **d == 0)
      .map(|(id, _)| *id)
      .collect();
    ready.sort_unstable();

    let mut order = Vec::with_capacity(graph.nodes.len());
    let mut frontier = ready;
    while let Some(id) = frontier.pop() {
      order.push(id.to_string());
      let mut newly_ready = Vec::new();
      for (from, to) in &graph.edges {
        if from == id {
          if let Some(d) = in_degree.get_mut(to.as_str()) {
            *d -= 1;
            if *d == 0 {
              newly_ready.push(to.as_str());
            }
          }
        }
      }
      newly_ready.sort_unstable();
      frontier.extend(newly_ready);
    }
    Walk {
      graph,
      order: order.into_iter(),
    }
  }
}

impl<'a> Iterator for Walk<'a> {
  type Item = &'a Node;

  fn next(&mut self) -> Option<Self::Item> {
    let id = self.order.next()?;
    self.graph.get_by_id(&id)
  }
}

/// Accumulates nodes and edges for a single apply before the graph is validated and published.
/// Kept separate from `Graph` so a failed apply never mutates the currently published graph.
pub struct GraphBuilder {
  nodes: IndexMap<String, Node>,
  edges: FnvHashSet<(String, String)>,
}

impl GraphBuilder {
  pub fn new() -> Self {
    GraphBuilder {
      nodes: IndexMap::new(),
      edges: FnvHashSet::default(),
    }
  }

  pub fn add_node(&mut self, node: Node) {
    debug!("depgraph: adding node {}", node.id);
    self.nodes.insert(node.id.clone(), node);
  }

  pub fn contains(&self, id: &str) -> bool {
    self.nodes.contains_key(id)
  }

  pub fn get(&self, id: &str) -> Option<&Node> {
    self.nodes.get(id)
  }

  pub fn get_mut(&mut self, id: &str) -> Option<&mut Node> {
    self.nodes.get_mut(id)
  }

  /// Drops a node from this apply's working set, e.g. after a stability-gate rejection or a
  /// factory failure. Any edges already recorded to or from it are left dangling and pruned by
  /// `build`; callers add edges only after all nodes are classified, so this is only ever
  /// called before the link step runs.
  pub fn remove(&mut self, id: &str) -> Option<Node> {
    self.nodes.shift_remove(id)
  }

  pub fn add_edge(&mut self, from: &str, to: &str) {
    self.edges.insert((from.to_string(), to.to_string()));
  }

  pub fn ids(&self) -> impl Iterator<Item = &str> {
    self.nodes.keys().map(String::as_str)
  }

  pub fn node_ids(&self) -> FnvHashSet<String> {
    self.nodes.keys().cloned().collect()
  }

  /// Depth-first cycle check with tri-color marking. On failure, returns a diagnostic that
  /// lists the offending node ids in cycle order.
  pub fn check_cycles(&self, source_name: &str) -> Result<(), Diagnostic> {
    #[derive(Clone, Copy, PartialEq)]
    enum Color {
      White,
      Gray,
      Black,
    }

    let mut color: IndexMap<&str, Color> = self.nodes.keys().map(|id| (id.as_str(), Color::White)).collect();
    let mut adjacency: IndexMap<&str, Vec<&str>> = IndexMap::new();
    for (from, to) in &self.edges {
      adjacency.entry(from.as_str()).or_default().push(to.as_str());
    }

    fn dfs<'a>(
      node: &'a str,
      adjacency: &IndexMap<&'a str, Vec<&'a str>>,
      color: &mut IndexMap<&'a str, Color>,
      stack: &mut Vec<&'a str>,
    ) -> Option<Vec<String>> {
      color.insert(node, Color::Gray);
      stack.push(node);
      if let Some(neighbors) = adjacency.get(node) {
        for &next in neighbors {
          match color.get(next).copied().unwrap_or(Color::White) {
            Color::White => {
              if let Some(cycle) = dfs(next, adjacency, color, stack) {
                return Some(cycle);
              }
            }
            Color::Gray => {
              let start = stack.iter().position(|&n| n == next).unwrap_or(0);
              let mut cycle: Vec<String> = stack[start..].iter().map(|s| (*s).to_string()).collect();
              cycle.push(next.to_string());
              return Some(cycle);
            }
            Color::Black => {}
          }
        }
      }
      stack.pop();
      color.insert(node, Color::Black);
      None
    }

    let mut ids: Vec<&str> = self.nodes.keys().map(String::as_str).collect();
    ids.sort_unstable();
    for id in ids {
      if color.get(id).copied().unwrap_or(Color::White) == Color::White {
        let mut stack = Vec::new();
        if let Some(cycle) = dfs(id, &adjacency, &mut color, &mut stack) {
          let joined = cycle.join(" -> ");
          return Err(Diagnostic::error(
            source_name,
            Position::default(),
            format!("dependency cycle detected: {joined}"),
          ));
        }
      }
    }
    Ok(())
  }

  pub fn build(self) -> Graph {
    Graph {
      nodes: self.nodes,
      edges: self.edges,
    }
  }
}
