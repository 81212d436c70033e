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

mod config_defaults;
mod error;

use std::path::PathBuf;
use std::sync::Arc;

use log::{debug, info, warn};
use parking_lot::{Mutex, RwLock};

use depanalysis::analyze;
use depgraph::{Graph, GraphBuilder, Node, NodeKind};
use diagnostics::{Diagnostic, Diagnostics};
use registry::{
  ConfigBlockRegistry, MinimumStability, ModuleControllerFactory, Registerer, Registry, RuntimeHandle, ServiceRegistry,
  Stability, Teardown,
};
use syntax::BlockStatement;

pub use error::LoaderError;

/// Collaborators and static configuration supplied to `Loader::new`. Mirrors the options
/// struct accepted by the orchestrating crate's constructor: a registry, a minimum-stability
/// floor, and the callbacks the loader invokes but never drives itself.
///
/// `trace_provider` and `data_path` are opaque globals the embedding binary threads through to
/// its own collaborators (factories, the registerer, the module-controller factory); the loader
/// holds them only so callers have one options struct to construct, and never inspects or calls
/// into either itself — there is no operation on them for the loader to perform. `logger` is not
/// a field here: this crate emits its own log events through the `log` facade directly rather
/// than through a passed-in handle.
pub struct LoaderOptions {
  pub minimum_stability: MinimumStability,
  pub enable_community_components: bool,
  pub data_path: PathBuf,
  pub trace_provider: Option<RuntimeHandle>,
  pub registry: Arc<dyn Registry>,
  pub service_registry: Arc<dyn ServiceRegistry>,
  pub config_block_registry: Arc<dyn ConfigBlockRegistry>,
  pub teardown: Arc<dyn Teardown>,
  pub module_controller_factory: Arc<dyn ModuleControllerFactory>,
  pub registerer: Arc<dyn Registerer>,
  pub block_update_callback: Option<Arc<dyn Fn(&str, &BlockStatement) + Send + Sync>>,
}

/// The three block lists an `Apply` call classifies. `source_name` is used only to anchor
/// diagnostics.
#[derive(Default)]
pub struct ApplyInput {
  pub component_blocks: Vec<BlockStatement>,
  pub config_blocks: Vec<BlockStatement>,
  pub declare_blocks: Vec<BlockStatement>,
  pub source_name: String,
}

/// Orchestrates a full apply: parse output in, classify into typed nodes, gate by stability,
/// reuse or construct runtime handles, link dependencies, validate, and publish. One `Loader`
/// instance owns exactly one published graph; concurrent callers serialize through
/// `apply_lock` and observe the graph through a read lock, per the single-writer/many-readers
/// concurrency model.
pub struct Loader {
  options: LoaderOptions,
  apply_lock: Mutex<()>,
  published: RwLock<Arc<Graph>>,
}

impl Loader {
  pub fn new(options: LoaderOptions) -> Self {
    Loader {
      options,
      apply_lock: Mutex::new(()),
      published: RwLock::new(Arc::new(Graph::empty())),
    }
  }

  /// Snapshot of the currently published graph. Concurrent readers always observe either the
  /// pre-apply or post-apply graph, never a half-updated one.
  pub fn graph(&self) -> Arc<Graph> {
    self.published.read().clone()
  }

  pub fn apply(&self, input: ApplyInput) -> Diagnostics {
    // One Apply call runs to completion before another may begin; callers that need concurrent
    // applies must serialize externally, but this lock makes that requirement load-bearing
    // rather than advisory.
    let _guard = self.apply_lock.lock();
    info!("loader: starting apply ({} source)", input.source_name);

    let previous = self.graph();
    let mut diags = Diagnostics::new();
    let mut builder = GraphBuilder::new();

    self.classify(&input, &mut builder, &mut diags);
    self.gate(&input.source_name, &mut builder, &mut diags);
    self.reuse_and_construct(&input.source_name, &previous, &mut builder, &mut diags);

    let (_, link_diags) = analyze(&mut builder, &input.source_name);
    diags.extend(link_diags);

    if let Err(cycle_diag) = builder.check_cycles(&input.source_name) {
      diags.push(cycle_diag);
    }

    if diags.has_errors() {
      self.publish_on_failure(&previous, builder, &diags);
    } else {
      let new_graph = Arc::new(builder.build());
      debug!(
        "loader: publishing graph with {} nodes, {} edges",
        new_graph.node_count(),
        new_graph.edge_count()
      );
      *self.published.write() = new_graph;
    }

    self.retire_removed(&previous);

    info!("loader: apply finished with {} diagnostics", diags.len());
    diags
  }

  fn classify(&self, input: &ApplyInput, builder: &mut GraphBuilder, diags: &mut Diagnostics) {
    for block in &input.component_blocks {
      self.classify_component_or_foreach(block, &input.source_name, builder, diags);
    }

    let mut config_blocks = input.config_blocks.clone();
    config_defaults::ensure_default_config_blocks(&mut config_blocks);
    for block in &config_blocks {
      self.classify_config_or_service(block, &input.source_name, builder, diags);
    }

    for block in &input.declare_blocks {
      self.classify_declare(block, &input.source_name, builder, diags);
    }
  }

  fn classify_component_or_foreach(
    &self,
    block: &BlockStatement,
    source_name: &str,
    builder: &mut GraphBuilder,
    diags: &mut Diagnostics,
  ) {
    let name = block.name_joined();

    if name == "foreach" {
      self.classify_foreach(block, source_name, builder, diags);
      return;
    }

    let Some(descriptor) = self.options.registry.resolve_component(&name) else {
      diags.push(Diagnostic::error(
        source_name,
        block.start,
        format!("cannot find the definition of component name \"{name}\""),
      ));
      return;
    };

    let label = match block.label.as_deref() {
      Some(l) if !l.is_empty() => l,
      _ => {
        diags.push(Diagnostic::error(
          source_name,
          block.start,
          format!("component \"{name}\" must have a label"),
        ));
        return;
      }
    };

    let id = format!("{name}.{label}");
    if let Some(existing) = builder.get(&id) {
      diags.push(duplicate_diagnostic(source_name, &id, block.start, existing.position));
      return;
    }

    builder.add_node(Node::new(
      id,
      NodeKind::Component {
        factory_name: name,
        stability: descriptor.stability,
        community: descriptor.community,
      },
      block.clone(),
      block.start,
    ));
  }

  fn classify_foreach(&self, block: &BlockStatement, source_name: &str, builder: &mut GraphBuilder, diags: &mut Diagnostics) {
    let label = match block.label.as_deref() {
      Some(l) if !l.is_empty() => l,
      _ => {
        diags.push(Diagnostic::error(source_name, block.start, "foreach block must have a label"));
        return;
      }
    };

    for required in ["collection", "var"] {
      if block.attribute(required).is_none() {
        diags.push(Diagnostic::error(
          source_name,
          block.start,
          format!("foreach block \"{label}\" is missing required attribute \"{required}\""),
        ));
        return;
      }
    }
    if block.block("template").is_none() {
      diags.push(Diagnostic::error(
        source_name,
        block.start,
        format!("foreach block \"{label}\" is missing required block \"template\""),
      ));
      return;
    }

    let id = format!("foreach.{label}");
    if let Some(existing) = builder.get(&id) {
      diags.push(duplicate_diagnostic(source_name, &id, block.start, existing.position));
      return;
    }
    builder.add_node(Node::new(id, NodeKind::Foreach, block.clone(), block.start));
  }

  fn classify_config_or_service(
    &self,
    block: &BlockStatement,
    source_name: &str,
    builder: &mut GraphBuilder,
    diags: &mut Diagnostics,
  ) {
    let name = block.name_joined();

    if let Some(def) = self.options.config_block_registry.resolve_config_block(&name) {
      if block.label.is_some() && !def.label_allowed {
        diags.push(Diagnostic::error(
          source_name,
          block.start,
          format!("config block \"{name}\" must not have a label"),
        ));
        return;
      }
      if builder.contains(&name) {
        diags.push(duplicate_diagnostic(source_name, &name, block.start, builder.get(&name).unwrap().position));
        return;
      }
      builder.add_node(Node::new(name.clone(), NodeKind::Config, block.clone(), block.start));
      return;
    }

    if let Some(def) = self.options.service_registry.resolve_service(&name) {
      if builder.contains(&name) {
        diags.push(duplicate_diagnostic(source_name, &name, block.start, builder.get(&name).unwrap().position));
        return;
      }
      builder.add_node(Node::new(
        name,
        NodeKind::Service { stability: def.stability },
        block.clone(),
        block.start,
      ));
      return;
    }

    // Neither namespace recognizes this name; components are the common case, so the
    // diagnostic is phrased in those terms.
    diags.push(Diagnostic::error(
      source_name,
      block.start,
      format!("cannot find the definition of component name \"{name}\""),
    ));
  }

  fn classify_declare(&self, block: &BlockStatement, source_name: &str, builder: &mut GraphBuilder, diags: &mut Diagnostics) {
    let label = match block.label.as_deref() {
      Some(l) if !l.is_empty() => l,
      _ => {
        diags.push(Diagnostic::error(source_name, block.start, "declare block must have a label"));
        return;
      }
    };
    let id = format!("declare.{label}");
    if let Some(existing) = builder.get(&id) {
      diags.push(duplicate_diagnostic(source_name, &id, block.start, existing.position));
      return;
    }
    builder.add_node(Node::new(id, NodeKind::Declare, block.clone(), block.start));
  }

  /// Applies stability and community gates. Runs before dependency analysis so gate violations
  /// are reported even when references would otherwise fail to resolve.
  fn gate(&self, source_name: &str, builder: &mut GraphBuilder, diags: &mut Diagnostics) {
    let ids: Vec<String> = builder.ids().map(str::to_string).collect();
    for id in ids {
      let Some(node) = builder.get(&id) else { continue };
      let Some(stability) = node.kind.stability() else { continue };
      let label = node.kind.label();

      if node.kind.is_community() && !self.options.enable_community_components {
        diags.push(Diagnostic::error(
          source_name,
          node.position,
          format!(
            "the component \"{id}\" is a community component. Use the --feature.community-components.enabled command-line flag to enable community components"
          ),
        ));
        builder.remove(&id);
        continue;
      }
      if node.kind.is_community() {
        // Community components bypass the stability gate entirely once enabled, even under an
        // `undefined` minimum stability.
        continue;
      }

      match self.options.minimum_stability {
        MinimumStability::Undefined => {
          diags.push(Diagnostic::error(
            source_name,
            node.position,
            format!(
              "stability levels must be defined: got \"{stability}\" as stability of {label} \"{id}\" and undefined as the minimum stability level"
            ),
          ));
          builder.remove(&id);
        }
        MinimumStability::Defined(minimum) => {
          if stability < minimum {
            let mut message = format!(
              "{label} \"{id}\" is at stability level \"{stability}\", which is below the minimum allowed stability level \"{minimum}\""
            );
            if stability == Stability::Experimental {
              message.push_str(" Use --stability.level command-line flag to enable \"experimental\"");
            }
            diags.push(Diagnostic::error(source_name, node.position, message));
            builder.remove(&id);
          }
        }
      }
    }
  }

  /// For each id that survived gating: if the previous graph has a node with the same id and
  /// an identical raw body, copy its runtime handle and module controller forward; otherwise
  /// construct a fresh one through the collaborator factory (components) or fire the
  /// block-update callback (config blocks whose value changed). A freshly constructed component
  /// also gets one module-controller-factory invocation (tolerating a `None` controller) and one
  /// registerer call.
  fn reuse_and_construct(&self, source_name: &str, previous: &Graph, builder: &mut GraphBuilder, diags: &mut Diagnostics) {
    let ids: Vec<String> = builder.ids().map(str::to_string).collect();
    for id in ids {
      let previous_node = previous.get_by_id(&id);
      let reused = previous_node.is_some_and(|p| p.body == builder.get(&id).unwrap().body);

      let kind_is_component = matches!(builder.get(&id).unwrap().kind, NodeKind::Component { .. });

      if reused {
        if kind_is_component {
          let handle = previous_node.and_then(|p| p.handle.clone());
          let module_controller = previous_node.and_then(|p| p.module_controller.clone());
          if let Some(node) = builder.get_mut(&id) {
            node.handle = handle;
            node.module_controller = module_controller;
          }
        }
        continue;
      }

      if kind_is_component {
        let factory_name = match &builder.get(&id).unwrap().kind {
          NodeKind::Component { factory_name, .. } => factory_name.clone(),
          _ => unreachable!(),
        };
        let Some(descriptor) = self.options.registry.resolve_component(&factory_name) else {
          // Classification already proved this resolves; defensive only.
          continue;
        };
        match descriptor.factory.build(&id) {
          Ok(handle) => {
            let module_controller = self.options.module_controller_factory.controller(&id);
            if let Some(node) = builder.get_mut(&id) {
              node.handle = Some(handle);
              node.module_controller = module_controller;
            }
            self.options.registerer.register(&id);
          }
          Err(reason) => {
            let position = builder.get(&id).map(|node| node.position).unwrap_or_default();
            let err = LoaderError::FactoryFailed { id: id.clone(), reason };
            diags.push(Diagnostic::error(source_name, position, err.to_string()));
            builder.remove(&id);
          }
        }
      } else if matches!(builder.get(&id).unwrap().kind, NodeKind::Config) {
        if let Some(callback) = &self.options.block_update_callback {
          callback(&id, &builder.get(&id).unwrap().body);
        }
      }
    }
  }

  /// Applies the publish-on-failure rules: an ordinary failure leaves the previous graph in
  /// place (after tearing down any handle built fresh during this failed apply), while a
  /// failure that includes an unresolved-reference (`critical`-severity) diagnostic replaces
  /// the published graph with the empty graph.
  fn publish_on_failure(&self, previous: &Graph, builder: GraphBuilder, diags: &Diagnostics) {
    if diags.has_critical() {
      warn!("loader: unresolved reference during apply, publishing empty graph");
      *self.published.write() = Arc::new(Graph::empty());
      return;
    }

    warn!("loader: apply failed, retaining previous graph");
    for id in builder.ids() {
      let Some(node) = builder.get(id) else { continue };
      let was_reused = previous.get_by_id(id).is_some_and(|p| p.body == node.body);
      if was_reused {
        continue;
      }
      if let Some(handle) = &node.handle {
        self.options.teardown.teardown(id, handle);
      }
    }
  }

  fn retire_removed(&self, previous: &Graph) {
    let published_now = self.graph();
    for node in previous.nodes() {
      if !published_now.contains(&node.id) {
        if let Some(handle) = &node.handle {
          debug!("loader: retiring {}", node.id);
          self.options.teardown.teardown(&node.id, handle);
        }
      }
    }
  }
}

fn duplicate_diagnostic(source_name: &str, id: &str, new_position: diagnostics::Position, prior: diagnostics::Position) -> Diagnostic {
  Diagnostic::error(
    source_name,
    new_position,
    format!("block {id} already declared at {source_name}:{}:{}", prior.line, prior.column),
  )
}

#[cfg(test)]
mod tests;
