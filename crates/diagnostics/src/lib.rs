// Copyright 2026 flowctl project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

// Enable all clippy lints except for many of the pedantic ones. It's a shame this needs to be
// copied and pasted across crates, but there doesn't appear to be a way to include inner
// attributes from a common source.
#![deny(
  clippy::all,
  clippy::default_trait_access,
  clippy::expl_impl_clone_on_copy,
  clippy::if_not_else,
  clippy::needless_continue,
  clippy::unseparated_literal_suffix,
  clippy::used_underscore_binding
)]
// It is often more clear to show that nothing is being moved.
#![allow(clippy::match_ref_pats)]
// Subjective style.
#![allow(clippy::len_without_is_empty, clippy::redundant_field_names)]
// Default isn't as big a deal as people seem to think it is.
#![allow(clippy::new_without_default, clippy::new_ret_no_self)]

use std::fmt;

/// A location within a source document, used to anchor diagnostics at the statement or
/// attribute that produced them.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub struct Position {
  pub line: usize,
  pub column: usize,
  pub offset: usize,
}

impl Position {
  pub fn new(line: usize, column: usize, offset: usize) -> Self {
    Position { line, column, offset }
  }
}

impl fmt::Display for Position {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}", self.line, self.column)
  }
}

/// Severity of a single diagnostic. Ordered so that `max()` over a batch yields the worst
/// outcome: a `Critical` diagnostic means the apply produced an empty graph, an `Error`
/// means the previous graph was retained unchanged, and `Warn` is advisory only.
#[derive(Clone, Copy, Debug, Eq, PartialEq, PartialOrd, Ord, Hash)]
pub enum Severity {
  Warn,
  Error,
  Critical,
}

impl fmt::Display for Severity {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      Severity::Warn => "warning",
      Severity::Error => "error",
      Severity::Critical => "critical",
    };
    write!(f, "{s}")
  }
}

/// A single accumulated diagnostic, carrying enough context to be rendered without access to
/// the original source text.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Diagnostic {
  pub severity: Severity,
  pub message: String,
  pub source_name: String,
  pub position: Position,
}

impl Diagnostic {
  pub fn new(severity: Severity, source_name: impl Into<String>, position: Position, message: impl Into<String>) -> Self {
    Diagnostic {
      severity,
      message: message.into(),
      source_name: source_name.into(),
      position,
    }
  }

  pub fn warn(source_name: impl Into<String>, position: Position, message: impl Into<String>) -> Self {
    Self::new(Severity::Warn, source_name, position, message)
  }

  pub fn error(source_name: impl Into<String>, position: Position, message: impl Into<String>) -> Self {
    Self::new(Severity::Error, source_name, position, message)
  }

  pub fn critical(source_name: impl Into<String>, position: Position, message: impl Into<String>) -> Self {
    Self::new(Severity::Critical, source_name, position, message)
  }
}

impl fmt::Display for Diagnostic {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "{}: {} ({}:{})",
      self.severity, self.message, self.source_name, self.position
    )
  }
}

/// An accumulating, order-preserving batch of diagnostics produced by a single apply. Unlike a
/// boundary error type, this never short-circuits collection: every problem found during a pass
/// is appended so a caller sees the whole picture in one shot.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Diagnostics(Vec<Diagnostic>);

impl Diagnostics {
  pub fn new() -> Self {
    Diagnostics(Vec::new())
  }

  pub fn push(&mut self, diagnostic: Diagnostic) {
    self.0.push(diagnostic);
  }

  pub fn extend(&mut self, other: Diagnostics) {
    self.0.extend(other.0);
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
    self.0.iter()
  }

  pub fn has_errors(&self) -> bool {
    self.0.iter().any(|d| d.severity >= Severity::Error)
  }

  pub fn has_critical(&self) -> bool {
    self.0.iter().any(|d| d.severity == Severity::Critical)
  }

  pub fn into_vec(self) -> Vec<Diagnostic> {
    self.0
  }
}

impl From<Vec<Diagnostic>> for Diagnostics {
  fn from(v: Vec<Diagnostic>) -> Self {
    Diagnostics(v)
  }
}

impl IntoIterator for Diagnostics {
  type Item = Diagnostic;
  type IntoIter = std::vec::IntoIter<Diagnostic>;

  fn into_iter(self) -> Self::IntoIter {
    self.0.into_iter()
  }
}

impl fmt::Display for Diagnostics {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for (idx, d) in self.0.iter().enumerate() {
      if idx > 0 {
        writeln!(f)?;
      }
      write!(f, "{d}")?;
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn severity_ordering_drives_has_errors() {
    let mut diags = Diagnostics::new();
    assert!(!diags.has_errors());
    diags.push(Diagnostic::warn("a.cfg", Position::new(1, 1, 0), "just a warning"));
    assert!(!diags.has_errors());
    diags.push(Diagnostic::error("a.cfg", Position::new(2, 1, 10), "something's wrong"));
    assert!(diags.has_errors());
    assert!(!diags.has_critical());
    diags.push(Diagnostic::critical("a.cfg", Position::new(3, 1, 20), "graph is unusable"));
    assert!(diags.has_critical());
  }

  #[test]
  fn display_renders_source_and_position() {
    let d = Diagnostic::error("pipeline.cfg", Position::new(4, 7, 42), "cannot find the definition of component \"fanout\"");
    assert_eq!(
      d.to_string(),
      "error: cannot find the definition of component \"fanout\" (pipeline.cfg:4:7)"
    );
  }

  #[test]
  fn extend_preserves_order() {
    let mut a = Diagnostics::new();
    a.push(Diagnostic::warn("x", Position::default(), "first"));
    let mut b = Diagnostics::new();
    b.push(Diagnostic::warn("x", Position::default(), "second"));
    a.extend(b);
    let messages: Vec<&str> = a.iter().map(|d| d.message.as_str()).collect();
    assert_eq!(messages, vec!["first", "second"]);
  }
}
