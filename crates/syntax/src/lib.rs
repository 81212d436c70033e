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
#![allow(clippy::match_ref_pats)]
#![allow(clippy::len_without_is_empty, clippy::redundant_field_names)]
#![allow(clippy::new_without_default, clippy::new_ret_no_self)]

use diagnostics::{Diagnostic, Diagnostics, Position};

/// A half-open byte span within a source document, together with the line/column of each end
/// so diagnostics never need to re-scan the source text.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub struct Span {
  pub start: Position,
  pub end: Position,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum BinOp {
  Add,
}

/// An expression appearing on the right-hand side of an attribute. `Span` fields are carried
/// for diagnostics but are deliberately excluded from the hand-written `PartialEq` impl below,
/// so that two parses of textually-identical (but differently-positioned) bodies compare equal.
#[derive(Clone, Debug)]
pub enum Expr {
  Ident(Vec<String>, Span),
  String(String, Span),
  Number(f64, Span),
  Bool(bool, Span),
  Array(Vec<Expr>, Span),
  BinaryOp(Box<Expr>, BinOp, Box<Expr>, Span),
}

impl Expr {
  pub fn span(&self) -> Span {
    match self {
      Expr::Ident(_, s)
      | Expr::String(_, s)
      | Expr::Number(_, s)
      | Expr::Bool(_, s)
      | Expr::Array(_, s)
      | Expr::BinaryOp(_, _, _, s) => *s,
    }
  }

  /// Every identifier path reachable from this expression, including operands of binary
  /// operators and array elements. Used by the dependency analyzer.
  pub fn identifier_paths(&self) -> Vec<&Vec<String>> {
    let mut out = Vec::new();
    self.collect_identifier_paths(&mut out);
    out
  }

  fn collect_identifier_paths<'a>(&'a self, out: &mut Vec<&'a Vec<String>>) {
    match self {
      Expr::Ident(path, _) => out.push(path),
      Expr::BinaryOp(lhs, _, rhs, _) => {
        lhs.collect_identifier_paths(out);
        rhs.collect_identifier_paths(out);
      }
      Expr::Array(items, _) => {
        for item in items {
          item.collect_identifier_paths(out);
        }
      }
      Expr::String(..) | Expr::Number(..) | Expr::Bool(..) => {}
    }
  }
}

impl PartialEq for Expr {
  fn eq(&self, other: &Self) -> bool {
    match (self, other) {
      (Expr::Ident(a, _), Expr::Ident(b, _)) => a == b,
      (Expr::String(a, _), Expr::String(b, _)) => a == b,
      (Expr::Number(a, _), Expr::Number(b, _)) => a == b,
      (Expr::Bool(a, _), Expr::Bool(b, _)) => a == b,
      (Expr::Array(a, _), Expr::Array(b, _)) => a == b,
      (Expr::BinaryOp(al, ao, ar, _), Expr::BinaryOp(bl, bo, br, _)) => ao == bo && al == bl && ar == br,
      _ => false,
    }
  }
}

#[derive(Clone, Debug)]
pub struct Attribute {
  pub name: String,
  pub value: Expr,
  pub span: Span,
}

impl PartialEq for Attribute {
  fn eq(&self, other: &Self) -> bool {
    self.name == other.name && self.value == other.value
  }
}

#[derive(Clone, Debug)]
pub struct BlockStatement {
  pub name: Vec<String>,
  pub label: Option<String>,
  pub attributes: Vec<Attribute>,
  pub blocks: Vec<BlockStatement>,
  pub start: Position,
  pub end: Position,
}

impl BlockStatement {
  pub fn name_joined(&self) -> String {
    self.name.join(".")
  }

  pub fn attribute(&self, name: &str) -> Option<&Attribute> {
    self.attributes.iter().find(|a| a.name == name)
  }

  pub fn block(&self, name: &str) -> Option<&BlockStatement> {
    self.blocks.iter().find(|b| b.name_joined() == name)
  }
}

impl PartialEq for BlockStatement {
  /// Compares raw body only: name, label, attributes and nested blocks, ignoring positions.
  /// This is what the loader's reuse step (see the config-loader apply algorithm) uses to
  /// decide whether an existing node's runtime handle can be carried forward unchanged.
  fn eq(&self, other: &Self) -> bool {
    self.name == other.name
      && self.label == other.label
      && self.attributes == other.attributes
      && self.blocks == other.blocks
  }
}

enum TopLevelItem {
  Block(BlockStatement),
  Garbage(Span),
}

/// Parses a source document into an ordered list of top-level block statements.
///
/// Any non-block top-level statement is recorded as an `unexpected statement` diagnostic and
/// skipped so that the remainder of the document can still be parsed in the same pass. A
/// structural parse failure (unbalanced braces, unterminated string, ...) aborts with a single
/// `error`-severity diagnostic and no blocks.
pub fn parse(source: &str, source_name: &str) -> (Vec<BlockStatement>, Diagnostics) {
  let mut diags = Diagnostics::new();
  let line_index = LineIndex::new(source);
  match grammar::document(source) {
    Ok(items) => {
      let mut blocks = Vec::new();
      for item in items {
        match item {
          TopLevelItem::Block(mut b) => {
            resolve_block(&mut b, &line_index);
            blocks.push(b);
          }
          TopLevelItem::Garbage(span) => {
            diags.push(Diagnostic::error(
              source_name,
              line_index.position(span.start.offset),
              "unexpected statement",
            ));
          }
        }
      }
      (blocks, diags)
    }
    Err(e) => {
      let pos = line_index.position(e.location.offset);
      diags.push(Diagnostic::error(
        source_name,
        pos,
        format!("parse error: expected {}", e.expected),
      ));
      (Vec::new(), diags)
    }
  }
}

/// Precomputed byte offsets of line starts, so converting a raw `position!()` offset into a
/// `Position` (used only when a diagnostic is actually emitted) is a binary search rather than
/// an O(n) rescan of the source text.
struct LineIndex {
  line_starts: Vec<usize>,
}

impl LineIndex {
  fn new(source: &str) -> Self {
    let mut line_starts = vec![0];
    for (idx, ch) in source.char_indices() {
      if ch == '\n' {
        line_starts.push(idx + 1);
      }
    }
    LineIndex { line_starts }
  }

  fn position(&self, offset: usize) -> Position {
    let line = self.line_starts.partition_point(|&start| start <= offset);
    let line_start = self.line_starts[line - 1];
    Position::new(line, offset - line_start + 1, offset)
  }
}

fn resolve_span(span: &mut Span, line_index: &LineIndex) {
  span.start = line_index.position(span.start.offset);
  span.end = line_index.position(span.end.offset);
}

fn resolve_expr(expr: &mut Expr, line_index: &LineIndex) {
  match expr {
    Expr::Ident(_, span) | Expr::String(_, span) | Expr::Number(_, span) | Expr::Bool(_, span) => {
      resolve_span(span, line_index);
    }
    Expr::Array(items, span) => {
      resolve_span(span, line_index);
      for item in items {
        resolve_expr(item, line_index);
      }
    }
    Expr::BinaryOp(lhs, _, rhs, span) => {
      resolve_span(span, line_index);
      resolve_expr(lhs, line_index);
      resolve_expr(rhs, line_index);
    }
  }
}

fn resolve_block(block: &mut BlockStatement, line_index: &LineIndex) {
  block.start = line_index.position(block.start.offset);
  block.end = line_index.position(block.end.offset);
  for attribute in &mut block.attributes {
    resolve_span(&mut attribute.span, line_index);
    resolve_expr(&mut attribute.value, line_index);
  }
  for nested in &mut block.blocks {
    resolve_block(nested, line_index);
  }
}

peg::parser! {
  grammar grammar() for str {
    rule _() = quiet!{([' ' | '\t' | '\r' | '\n' | ';'] / comment())*}

    rule comment() = "//" [^ '\n']*

    rule ident() -> String
      = s:$(['a'..='z' | 'A'..='Z' | '_'] ['a'..='z' | 'A'..='Z' | '0'..='9' | '_']*) { s.to_string() }

    rule dotted_name() -> Vec<String> = n:ident() ++ "."

    rule pos() -> usize = p:position!() { p }

    rule string_lit() -> String
      = "\"" s:string_char()* "\"" { s.into_iter().collect() }

    rule string_char() -> char
      = "\\\"" { '"' }
      / "\\\\" { '\\' }
      / "\\n" { '\n' }
      / "\\t" { '\t' }
      / c:[c if c != '"' && c != '\\'] { c }

    rule number() -> f64
      = s:$("-"? ['0'..='9']+ ("." ['0'..='9']+)?) {? s.parse().map_err(|_| "number") }

    rule boolean() -> bool
      = "true" !ident_cont() { true }
      / "false" !ident_cont() { false }

    rule ident_cont() = ['a'..='z' | 'A'..='Z' | '0'..='9' | '_']

    rule array() -> Vec<Expr>
      = "[" _ items:(expr() ** (_ "," _)) _ ","? _ "]" { items }

    rule ident_expr() -> Expr
      = start:pos() path:dotted_name() end:pos() {
          Expr::Ident(path, Span{start: Position::new(0,0,start), end: Position::new(0,0,end)})
        }

    rule atom() -> Expr
      = start:pos() b:boolean() end:pos() { Expr::Bool(b, Span{start: Position::new(0,0,start), end: Position::new(0,0,end)}) }
      / start:pos() n:number() end:pos() { Expr::Number(n, Span{start: Position::new(0,0,start), end: Position::new(0,0,end)}) }
      / start:pos() s:string_lit() end:pos() { Expr::String(s, Span{start: Position::new(0,0,start), end: Position::new(0,0,end)}) }
      / start:pos() a:array() end:pos() { Expr::Array(a, Span{start: Position::new(0,0,start), end: Position::new(0,0,end)}) }
      / ident_expr()
      / "(" _ e:expr() _ ")" { e }

    pub rule expr() -> Expr = precedence!{
      start:pos() x:(@) _ "+" _ y:(@) end:pos() { Expr::BinaryOp(Box::new(x), BinOp::Add, Box::new(y), Span{start: Position::new(0,0,start), end: Position::new(0,0,end)}) }
      --
      a:atom() { a }
    }

    rule attribute() -> Attribute
      = start:pos() name:ident() _ "=" _ value:expr() end:pos() {
          Attribute{name, value, span: Span{start: Position::new(0,0,start), end: Position::new(0,0,end)}}
        }

    rule label() -> String = string_lit()

    pub rule block() -> BlockStatement
      = start:pos() name:dotted_name() _ label:(l:label() _ {l})? "{" _ body:body_item()* _ "}" end:pos() {
          let mut attributes = Vec::new();
          let mut blocks = Vec::new();
          for item in body {
            match item {
              BodyItem::Attribute(a) => attributes.push(a),
              BodyItem::Block(b) => blocks.push(b),
            }
          }
          BlockStatement{
            name,
            label,
            attributes,
            blocks,
            start: Position::new(0,0,start),
            end: Position::new(0,0,end),
          }
        }

    rule body_item() -> BodyItem
      = _ b:block() _ { BodyItem::Block(b) }
      / _ a:attribute() _ { BodyItem::Attribute(a) }

    rule garbage() -> Span
      = start:pos() $((!['\n'] [_])+) end:pos() {
          Span{start: Position::new(0,0,start), end: Position::new(0,0,end)}
        }

    rule top_item() -> TopLevelItem
      = _ b:block() _ { TopLevelItem::Block(b) }
      / _ g:garbage() _ { TopLevelItem::Garbage(g) }

    pub rule document() -> Vec<TopLevelItem> = items:top_item()* { items }
  }
}

enum BodyItem {
  Attribute(Attribute),
  Block(BlockStatement),
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_simple_block_with_attributes() {
    let _logger = env_logger::try_init();
    let src = r#"
      tick "ticker" {
        frequency = "1s"
      }
    "#;
    let (blocks, diags) = parse(src, "test.cfg");
    assert!(diags.is_empty(), "{diags}");
    assert_eq!(blocks.len(), 1);
    assert_eq!(blocks[0].name, vec!["tick".to_string()]);
    assert_eq!(blocks[0].label.as_deref(), Some("ticker"));
    assert_eq!(blocks[0].attributes[0].name, "frequency");
  }

  #[test]
  fn parses_dotted_identifier_references_and_concatenation() {
    let _logger = env_logger::try_init();
    let src = r#"
      passthrough "pass" {
        input = passthrough.one.output
        lag = passthrough.one.output + "s"
      }
    "#;
    let (blocks, diags) = parse(src, "test.cfg");
    assert!(diags.is_empty(), "{diags}");
    let lag = &blocks[0].attributes[1].value;
    match lag {
      Expr::BinaryOp(lhs, BinOp::Add, rhs, _) => {
        assert!(matches!(**lhs, Expr::Ident(..)));
        assert!(matches!(**rhs, Expr::String(..)));
      }
      other => panic!("unexpected expr: {other:?}"),
    }
  }

  #[test]
  fn reports_unexpected_statement_and_keeps_parsing() {
    let _logger = env_logger::try_init();
    let src = r#"
      stray = 1
      tick "ticker" { frequency = "1s" }
    "#;
    let (blocks, diags) = parse(src, "test.cfg");
    assert_eq!(blocks.len(), 1);
    assert!(diags.iter().any(|d| d.message == "unexpected statement"));
  }

  #[test]
  fn block_equality_ignores_span() {
    let _logger = env_logger::try_init();
    let (a, _) = parse(r#"tick "t" { frequency = "1s" }"#, "a");
    let (b, _) = parse("\n\n  tick \"t\" { frequency = \"1s\" }\n", "b");
    assert_eq!(a[0], b[0]);
  }

  #[test]
  fn empty_label_parses_as_missing() {
    let _logger = env_logger::try_init();
    let (blocks, diags) = parse(r#"tick "" { frequency = "1s" }"#, "test.cfg");
    assert!(diags.is_empty());
    assert_eq!(blocks[0].label.as_deref(), Some(""));
  }
}
