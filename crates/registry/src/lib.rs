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

use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Declared stability of a registered component, config block, or service. Ordered so gate
/// checks can compare directly against a configured minimum.
#[derive(Clone, Copy, Debug, Eq, PartialEq, PartialOrd, Ord, Hash)]
pub enum Stability {
  Experimental,
  PublicPreview,
  GenerallyAvailable,
}

impl fmt::Display for Stability {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      Stability::Experimental => "experimental",
      Stability::PublicPreview => "public-preview",
      Stability::GenerallyAvailable => "generally-available",
    };
    write!(f, "{s}")
  }
}

/// Operator-supplied lower bound on node stability. `Undefined` is the sentinel meaning "no
/// floor was configured"; any node with a *defined* stability is then rejected outright.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MinimumStability {
  Undefined,
  Defined(Stability),
}

impl fmt::Display for MinimumStability {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      MinimumStability::Undefined => write!(f, "undefined"),
      MinimumStability::Defined(s) => write!(f, "{s}"),
    }
  }
}

/// Opaque, collaborator-owned handle representing the live execution state of a node. The
/// loader holds references to these but is forbidden from inspecting or mutating them.
pub type RuntimeHandle = Arc<dyn Any + Send + Sync>;

/// Constructs the runtime handle for a component node the first time it is created (or
/// recreated after its raw body changes). Mirrors the collaborator factory contract consumed
/// by the loader's apply algorithm.
pub trait ComponentFactory: Send + Sync {
  fn build(&self, id: &str) -> Result<RuntimeHandle, String>;
}

/// Static metadata the registry returns for a resolved component block name.
#[derive(Clone)]
pub struct ComponentDescriptor {
  pub factory: Arc<dyn ComponentFactory>,
  pub stability: Stability,
  pub community: bool,
}

/// The static mapping from block name (`pkg.kind`) to factory and metadata. Read-only after
/// process start.
pub trait Registry: Send + Sync {
  fn resolve_component(&self, name: &str) -> Option<ComponentDescriptor>;
}

/// Metadata for a registered singleton service, decoded from the service block's body by the
/// collaborator that owns `config_type`.
#[derive(Clone)]
pub struct ServiceDefinition {
  pub name: String,
  pub config_type: String,
  pub stability: Stability,
}

/// The static mapping from service block name to its definition.
pub trait ServiceRegistry: Send + Sync {
  fn resolve_service(&self, name: &str) -> Option<ServiceDefinition>;
}

/// Metadata for a registered config block (`logging`, `tracing`, `argument`, ...).
#[derive(Clone)]
pub struct ConfigBlockDefinition {
  pub name: String,
  pub stability: Stability,
  pub label_allowed: bool,
}

/// The static mapping from config-block name to its definition.
pub trait ConfigBlockRegistry: Send + Sync {
  fn resolve_config_block(&self, name: &str) -> Option<ConfigBlockDefinition>;
}

/// Invoked after a runtime handle's owning node is retired so the collaborator can release any
/// resources associated with it. Called after the new graph has been published.
pub trait Teardown: Send + Sync {
  fn teardown(&self, id: &str, handle: &RuntimeHandle);
}

/// Invoked once per freshly-constructed component. A component that does not declare a module
/// returns `None`; the loader tolerates a missing controller silently and does not retry.
pub trait ModuleControllerFactory: Send + Sync {
  fn controller(&self, id: &str) -> Option<RuntimeHandle>;
}

/// Records a freshly-constructed component's id with an external introspection surface
/// (metrics, admin listings, ...). The loader does not interpret what the registerer does with
/// the id.
pub trait Registerer: Send + Sync {
  fn register(&self, id: &str);
}
