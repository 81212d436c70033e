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

use fnv::FnvHashSet;

use depgraph::GraphBuilder;
use diagnostics::{Diagnostic, Diagnostics};
use syntax::{Attribute, BlockStatement, Expr};

/// One dependency edge discovered while walking a node's body, plus whether it arose from an
/// expression that participates in value computation (as opposed to a structural back-pointer,
/// which this analyzer does not currently produce).
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Reference {
  pub source_id: String,
  pub target_id: String,
  pub is_data_flow: bool,
}

/// Walks every node's block body looking for identifier-path expressions that reference
/// another node by id, using longest-prefix matching against the known id set. Returns the
/// full (possibly duplicated) list of references found plus any unresolved-reference
/// diagnostics. Edges are recorded into `builder` for the ones that do resolve; unresolved
/// references do not stop the walk, so every bad reference in the document is surfaced in one
/// pass, matching the parser adapter's "continue best-effort" behavior.
pub fn analyze(builder: &mut GraphBuilder, source_name: &str) -> (Vec<Reference>, Diagnostics) {
  let ids: FnvHashSet<String> = builder.node_ids();
  let mut references = Vec::new();
  let mut diags = Diagnostics::new();

  let node_ids: Vec<String> = builder.ids().map(str::to_string).collect();
  for source_id in &node_ids {
    let body = builder.get(source_id).expect("id just listed").body.clone();
    walk_body(&body, source_id, &ids, source_name, &mut references, &mut diags);
  }

  for reference in &references {
    if ids.contains(&reference.target_id) {
      builder.add_edge(&reference.source_id, &reference.target_id);
    }
  }

  // Reset and repopulate data-flow consumer lists fresh for this apply: the invariant is that
  // `GetDataFlowEdgesTo` results never grow across repeated applies of the same input.
  for id in &node_ids {
    if let Some(node) = builder.get_mut(id) {
      node.data_flow_consumers.clear();
    }
  }
  for reference in &references {
    if reference.is_data_flow && ids.contains(&reference.target_id) {
      if let Some(target) = builder.get_mut(&reference.target_id) {
        target.data_flow_consumers.push(reference.source_id.clone());
      }
    }
  }

  (references, diags)
}

fn walk_body(
  body: &BlockStatement,
  source_id: &str,
  ids: &FnvHashSet<String>,
  source_name: &str,
  references: &mut Vec<Reference>,
  diags: &mut Diagnostics,
) {
  for attribute in &body.attributes {
    walk_attribute(attribute, source_id, ids, source_name, references, diags);
  }
  for nested in &body.blocks {
    walk_body(nested, source_id, ids, source_name, references, diags);
  }
}

fn walk_attribute(
  attribute: &Attribute,
  source_id: &str,
  ids: &FnvHashSet<String>,
  source_name: &str,
  references: &mut Vec<Reference>,
  diags: &mut Diagnostics,
) {
  for path in attribute.value.identifier_paths() {
    match longest_matching_prefix(path, ids) {
      Some(target_id) => {
        references.push(Reference {
          source_id: source_id.to_string(),
          target_id,
          is_data_flow: true,
        });
      }
      None => {
        // Unresolved references are `critical`, not merely `error`: the loader's publish step
        // treats this severity as the signal to replace the published graph with the empty
        // graph rather than simply retaining the previous one.
        diags.push(Diagnostic::critical(
          source_name,
          attribute.span.start,
          format!("\"{}\" does not reference a known node", path.join(".")),
        ));
      }
    }
  }
}

/// Returns the longest dot-joined prefix of `path` that names a known node id, trying
/// decreasing lengths from the full path down to a single segment.
pub fn longest_matching_prefix(path: &[String], ids: &FnvHashSet<String>) -> Option<String> {
  for len in (1..=path.len()).rev() {
    let candidate = path[..len].join(".");
    if ids.contains(&candidate) {
      return Some(candidate);
    }
  }
  None
}
