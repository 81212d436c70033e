use diagnostics::Position;
use syntax::BlockStatement;

/// `logging` and `tracing` are the two singleton config blocks implicitly present. If the
/// caller omits one (either on first load, or because it was removed on a later reload), a
/// default instance is injected so the graph shape for an otherwise-identical component set
/// stays stable across such edits.
pub const DEFAULT_CONFIG_BLOCK_NAMES: [&str; 2] = ["logging", "tracing"];

pub fn ensure_default_config_blocks(config_blocks: &mut Vec<BlockStatement>) {
  for name in DEFAULT_CONFIG_BLOCK_NAMES {
    if !config_blocks.iter().any(|b| b.name_joined() == name) {
      config_blocks.push(default_block(name));
    }
  }
}

fn default_block(name: &str) -> BlockStatement {
  BlockStatement {
    name: vec![name.to_string()],
    label: None,
    attributes: Vec::new(),
    blocks: Vec::new(),
    start: Position::default(),
    end: Position::default(),
  }
}
