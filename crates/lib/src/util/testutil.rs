//! Shared fixtures for unit tests.

use std::collections::BTreeMap;

use crate::consts::DEFAULT_CONTEXT_NAME;
use crate::graph::{EvalError, SourceOp, SourceProvider, Tree};

/// A spec with one directory source (`a`) and one file source (`b`).
pub const DEMO_SPEC: &str = r#"
name: demo
version: 1.0.0
description: A demo package
license: MIT
sources:
  a:
    context: {}
  b:
    inline:
      file:
        contents: x
"#;

pub const DEMO_MAIN_C: &str = "int main(void) { return 0; }\n";

/// Serves build contexts and images from memory.
#[derive(Debug, Clone, Default)]
pub struct StaticContexts {
  contexts: BTreeMap<String, Tree>,
  images: BTreeMap<String, Tree>,
}

impl StaticContexts {
  /// The default context holding `main.c`.
  pub fn demo() -> Self {
    let mut tree = Tree::new();
    tree
      .mkfile("/main.c", 0o644, DEMO_MAIN_C.as_bytes().to_vec())
      .expect("demo context");
    Self::default().with_context(DEFAULT_CONTEXT_NAME, tree)
  }

  pub fn with_context(mut self, name: &str, tree: Tree) -> Self {
    self.contexts.insert(name.to_string(), tree);
    self
  }

  pub fn with_image(mut self, reference: &str, tree: Tree) -> Self {
    self.images.insert(reference.to_string(), tree);
    self
  }
}

impl SourceProvider for StaticContexts {
  fn provide(&self, source: &SourceOp) -> Result<Tree, EvalError> {
    match source {
      SourceOp::Local { name, .. } => self
        .contexts
        .get(name)
        .cloned()
        .ok_or_else(|| EvalError::Source(format!("no context named {name:?}"))),
      SourceOp::Image { reference } => self
        .images
        .get(reference)
        .cloned()
        .ok_or_else(|| EvalError::Source(format!("no image named {reference:?}"))),
      other => Err(EvalError::Unsupported(format!("{other:?}"))),
    }
  }
}
