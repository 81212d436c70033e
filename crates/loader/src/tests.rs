use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use registry::{
  ComponentDescriptor, ComponentFactory, ConfigBlockDefinition, ConfigBlockRegistry, ModuleControllerFactory, Registerer,
  RuntimeHandle, ServiceDefinition, ServiceRegistry, Stability, Teardown,
};
use syntax::parse;

use super::*;

struct TestFactory;

impl ComponentFactory for TestFactory {
  fn build(&self, id: &str) -> Result<RuntimeHandle, String> {
    Ok(Arc::new(id.to_string()) as RuntimeHandle)
  }
}

struct TestRegistry {
  components: Vec<(&'static str, Stability, bool)>,
}

impl Registry for TestRegistry {
  fn resolve_component(&self, name: &str) -> Option<ComponentDescriptor> {
    self.components.iter().find(|(n, _, _)| *n == name).map(|(_, stability, community)| ComponentDescriptor {
      factory: Arc::new(TestFactory),
      stability: *stability,
      community: *community,
    })
  }
}

struct TestConfigBlocks;

impl ConfigBlockRegistry for TestConfigBlocks {
  fn resolve_config_block(&self, name: &str) -> Option<ConfigBlockDefinition> {
    match name {
      "logging" | "tracing" => Some(ConfigBlockDefinition {
        name: name.to_string(),
        stability: Stability::GenerallyAvailable,
        label_allowed: false,
      }),
      _ => None,
    }
  }
}

struct NoServices;

impl ServiceRegistry for NoServices {
  fn resolve_service(&self, _name: &str) -> Option<ServiceDefinition> {
    None
  }
}

#[derive(Default)]
struct RecordingTeardown {
  torn_down: Mutex<Vec<String>>,
}

impl Teardown for RecordingTeardown {
  fn teardown(&self, id: &str, _handle: &RuntimeHandle) {
    self.torn_down.lock().unwrap().push(id.to_string());
  }
}

struct NoModules;

impl ModuleControllerFactory for NoModules {
  fn controller(&self, _id: &str) -> Option<RuntimeHandle> {
    None
  }
}

#[derive(Default)]
struct RecordingRegisterer {
  registered: Mutex<Vec<String>>,
}

impl Registerer for RecordingRegisterer {
  fn register(&self, id: &str) {
    self.registered.lock().unwrap().push(id.to_string());
  }
}

fn make_loader(
  components: Vec<(&'static str, Stability, bool)>,
  minimum_stability: MinimumStability,
  enable_community_components: bool,
) -> (Loader, Arc<RecordingTeardown>) {
  let teardown = Arc::new(RecordingTeardown::default());
  let options = LoaderOptions {
    minimum_stability,
    enable_community_components,
    data_path: PathBuf::from("/dev/null"),
    trace_provider: None,
    registry: Arc::new(TestRegistry { components }),
    service_registry: Arc::new(NoServices),
    config_block_registry: Arc::new(TestConfigBlocks),
    teardown: teardown.clone(),
    module_controller_factory: Arc::new(NoModules),
    registerer: Arc::new(RecordingRegisterer::default()),
    block_update_callback: None,
  };
  (Loader::new(options), teardown)
}

fn component_blocks(src: &str) -> ApplyInput {
  let (blocks, diags) = parse(src, "test.cfg");
  assert!(diags.is_empty(), "{diags}");
  ApplyInput {
    component_blocks: blocks,
    config_blocks: Vec::new(),
    declare_blocks: Vec::new(),
    source_name: "test.cfg".to_string(),
  }
}

const HAPPY_PATH_SRC: &str = r#"
  tick "ticker" { frequency = "1s" }
  passthrough "static" { input = "hello, world!" }
  passthrough "ticker" { input = tick.ticker.tick_time }
  passthrough "forwarded" { input = passthrough.ticker.output }
"#;

fn happy_path_loader() -> (Loader, Arc<RecordingTeardown>) {
  make_loader(
    vec![
      ("tick", Stability::GenerallyAvailable, false),
      ("passthrough", Stability::GenerallyAvailable, false),
    ],
    MinimumStability::Defined(Stability::Experimental),
    false,
  )
}

#[test]
fn happy_path_four_components_plus_defaults() {
  let _logger = env_logger::try_init();
  let (loader, _teardown) = happy_path_loader();
  let diags = loader.apply(component_blocks(HAPPY_PATH_SRC));
  assert!(!diags.has_errors(), "{diags}");

  let graph = loader.graph();
  assert_eq!(graph.node_count(), 6); // 4 components + logging + tracing
  assert!(graph.contains("tick.ticker"));
  assert!(graph.contains("passthrough.static"));
  assert!(graph.contains("passthrough.ticker"));
  assert!(graph.contains("passthrough.forwarded"));
  assert!(graph.contains("logging"));
  assert!(graph.contains("tracing"));

  let edges: Vec<(&str, &str)> = graph.edges().collect();
  assert!(edges.contains(&("passthrough.ticker", "tick.ticker")));
  assert!(edges.contains(&("passthrough.forwarded", "passthrough.ticker")));
}

#[test]
fn reload_preserves_handle_identity() {
  let _logger = env_logger::try_init();
  let (loader, _teardown) = happy_path_loader();
  loader.apply(component_blocks(HAPPY_PATH_SRC));
  let handle_before = loader.graph().get_by_id("tick.ticker").unwrap().handle.clone().unwrap();

  let diags = loader.apply(component_blocks(HAPPY_PATH_SRC));
  assert!(!diags.has_errors(), "{diags}");
  let handle_after = loader.graph().get_by_id("tick.ticker").unwrap().handle.clone().unwrap();

  assert!(Arc::ptr_eq(&handle_before, &handle_after));
}

#[test]
fn data_flow_edge_multiplicity_is_stable_across_reloads() {
  let _logger = env_logger::try_init();
  let (loader, _teardown) = make_loader(
    vec![("passthrough", Stability::GenerallyAvailable, false)],
    MinimumStability::Defined(Stability::Experimental),
    false,
  );
  let src = r#"
    passthrough "one" { input = "hello" }
    passthrough "pass" {
      input = passthrough.one.output
      lag = passthrough.one.output + "s"
    }
  "#;
  loader.apply(component_blocks(src));
  let graph = loader.graph();
  let one = graph.get_by_id("passthrough.one").unwrap();
  assert_eq!(one.data_flow_edges_to(), ["passthrough.pass".to_string(), "passthrough.pass".to_string()]);

  loader.apply(component_blocks(src));
  let graph = loader.graph();
  let one = graph.get_by_id("passthrough.one").unwrap();
  assert_eq!(one.data_flow_edges_to(), ["passthrough.pass".to_string(), "passthrough.pass".to_string()]);
}

#[test]
fn empty_label_is_rejected() {
  let _logger = env_logger::try_init();
  let (loader, _teardown) = make_loader(
    vec![("tick", Stability::GenerallyAvailable, false)],
    MinimumStability::Defined(Stability::Experimental),
    false,
  );
  let diags = loader.apply(component_blocks(r#"tick "" { frequency = "1s" }"#));
  assert!(diags.iter().any(|d| d.message.contains("component \"tick\" must have a label")));
}

#[test]
fn stability_gate_rejects_components_below_the_floor() {
  let _logger = env_logger::try_init();
  let (loader, _teardown) = make_loader(
    vec![("tick", Stability::PublicPreview, false)],
    MinimumStability::Defined(Stability::GenerallyAvailable),
    false,
  );
  let diags = loader.apply(component_blocks(r#"tick "t" { frequency = "1s" }"#));
  assert!(diags.iter().any(|d| d
    .message
    .contains("is at stability level \"public-preview\", which is below the minimum allowed stability level \"generally-available\"")));
}

#[test]
fn unresolved_reference_empties_the_published_graph() {
  let _logger = env_logger::try_init();
  let (loader, teardown) = make_loader(
    vec![
      ("tick", Stability::GenerallyAvailable, false),
      ("passthrough", Stability::GenerallyAvailable, false),
    ],
    MinimumStability::Defined(Stability::Experimental),
    false,
  );
  loader.apply(component_blocks(HAPPY_PATH_SRC));
  assert!(loader.graph().node_count() > 0);

  let src = r#"
    tick "ticker" { frequency = "1s" }
    passthrough "valid" { input = tick.ticker.tick_time }
    passthrough "invalid" { input = tick.doesnotexist.tick_time }
  "#;
  let diags = loader.apply(component_blocks(src));
  assert!(diags.has_critical());

  let graph = loader.graph();
  assert_eq!(graph.node_count(), 0);
  assert_eq!(graph.edge_count(), 0);
  assert!(!teardown.torn_down.lock().unwrap().is_empty());
}

#[test]
fn cycle_is_rejected_and_previous_graph_is_retained() {
  let _logger = env_logger::try_init();
  let (loader, _teardown) = make_loader(
    vec![("passthrough", Stability::GenerallyAvailable, false)],
    MinimumStability::Defined(Stability::Experimental),
    false,
  );
  loader.apply(component_blocks(
    r#"passthrough "one" { input = "hello" }"#,
  ));
  assert!(loader.graph().contains("passthrough.one"));

  let cyclic_src = r#"
    passthrough "a" { input = passthrough.b.output }
    passthrough "b" { input = passthrough.a.output }
  "#;
  let diags = loader.apply(component_blocks(cyclic_src));
  assert!(diags.has_errors());
  assert!(!diags.has_critical());

  // Previous graph (just `passthrough.one` plus defaults) is retained untouched.
  assert!(loader.graph().contains("passthrough.one"));
  assert!(!loader.graph().contains("passthrough.a"));
}

#[test]
fn community_component_requires_the_feature_flag() {
  let _logger = env_logger::try_init();
  let (loader, _teardown) = make_loader(
    vec![("experimental.widget", Stability::Experimental, true)],
    MinimumStability::Defined(Stability::Experimental),
    false,
  );
  let diags = loader.apply(component_blocks(r#"experimental.widget "w" { }"#));
  assert!(diags
    .iter()
    .any(|d| d.message.contains("is a community component") && d.message.contains("--feature.community-components.enabled")));
}

#[test]
fn empty_input_yields_only_default_config_blocks() {
  let _logger = env_logger::try_init();
  let (loader, _teardown) = make_loader(Vec::new(), MinimumStability::Defined(Stability::Experimental), false);
  let diags = loader.apply(component_blocks(""));
  assert!(!diags.has_errors(), "{diags}");
  let graph = loader.graph();
  assert_eq!(graph.node_count(), 2);
  assert!(graph.contains("logging"));
  assert!(graph.contains("tracing"));
}

#[test]
fn module_controller_and_registerer_run_once_per_fresh_component() {
  let _logger = env_logger::try_init();
  let teardown = Arc::new(RecordingTeardown::default());
  let registerer = Arc::new(RecordingRegisterer::default());
  let options = LoaderOptions {
    minimum_stability: MinimumStability::Defined(Stability::Experimental),
    enable_community_components: false,
    data_path: PathBuf::from("/dev/null"),
    trace_provider: None,
    registry: Arc::new(TestRegistry {
      components: vec![("tick", Stability::GenerallyAvailable, false)],
    }),
    service_registry: Arc::new(NoServices),
    config_block_registry: Arc::new(TestConfigBlocks),
    teardown: teardown.clone(),
    module_controller_factory: Arc::new(NoModules),
    registerer: registerer.clone(),
    block_update_callback: None,
  };
  let loader = Loader::new(options);

  let src = r#"tick "ticker" { frequency = "1s" }"#;
  loader.apply(component_blocks(src));
  loader.apply(component_blocks(src));

  assert_eq!(*registerer.registered.lock().unwrap(), vec!["tick.ticker".to_string()]);
  let node = loader.graph().get_by_id("tick.ticker").unwrap();
  assert!(node.module_controller.is_none());
}
