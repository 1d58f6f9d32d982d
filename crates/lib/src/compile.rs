//! Compiling a spec into an instruction graph.
//!
//! The compiled graph lays out one artifact per source under `SOURCES/`
//! and the rendered packaging metadata under `SPECS/`. File-shaped sources
//! are copied as they are; directory-shaped sources are first archived to
//! `<key>.tar.gz`.
//!
//! Two strategies produce the same filesystem:
//!
//! - in-place: every source is copied onto the running state in key order,
//!   which makes each copy depend on all previous ones;
//! - merge/diff: every source is copied onto its own empty state, diffed
//!   against the base layout and all diffs are merged at the end, which
//!   keeps the per-source steps independent and individually cacheable.
//!
//! The merge/diff strategy is used only when the engine supports both
//! operations.

use std::sync::Arc;

use tracing::{debug, info};

use crate::consts::{DIR_MODE, SOURCES_DIR, SPEC_FILE_MODE, SPECS_DIR};
use crate::error::FrontendError;
use crate::graph::State;
use crate::materialize::{MaterializeError, Materializer, archive_name};
use crate::source::resolve;
use crate::spec::PackageSpec;
use crate::target::MetadataRenderer;

/// Per-build inputs to compilation that do not come from the spec.
#[derive(Clone, Default)]
pub struct CompileContext {
  /// Whether the engine supports both merge and diff operations.
  pub merge_capable: bool,
  /// Archives directory sources; required when the spec has any.
  pub materializer: Option<Arc<dyn Materializer>>,
}

impl CompileContext {
  pub fn new(merge_capable: bool, materializer: Option<Arc<dyn Materializer>>) -> Self {
    Self {
      merge_capable,
      materializer,
    }
  }
}

impl std::fmt::Debug for CompileContext {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("CompileContext")
      .field("merge_capable", &self.merge_capable)
      .field("materializer", &self.materializer.is_some())
      .finish()
  }
}

pub struct GraphCompiler<'a> {
  renderer: &'a dyn MetadataRenderer,
  context: &'a CompileContext,
}

impl<'a> GraphCompiler<'a> {
  pub fn new(renderer: &'a dyn MetadataRenderer, context: &'a CompileContext) -> Self {
    Self { renderer, context }
  }

  /// Compile `spec` into the graph of the tree handed to the packager.
  ///
  /// `target` names the route whose metadata is rendered.
  pub fn compile(&self, spec: &PackageSpec, target: &str) -> Result<State, FrontendError> {
    let scratch = State::scratch();
    let mut out = scratch.mkdir(SOURCES_DIR, DIR_MODE, false, "Create SOURCES dir");
    let mut diffs = Vec::new();

    for (key, descriptor) in &spec.sources {
      let resolved = resolve(key, descriptor).map_err(|source| FrontendError::Source {
        key: key.clone(),
        source,
      })?;

      let (src, src_path, description) = if resolved.is_dir {
        let archive = self.materialize(key, &resolved.state)?;
        (
          archive,
          format!("/{}", archive_name(key)),
          format!("Copy archive of source {key:?} into {SOURCES_DIR}"),
        )
      } else {
        (
          resolved.state,
          format!("/{key}"),
          format!("Copy source {key:?} into {SOURCES_DIR}"),
        )
      };
      let dest = format!("/{SOURCES_DIR}/");

      if self.context.merge_capable {
        let staged = scratch.copy(&src, src_path, dest, description);
        diffs.push(State::diff(&out, &staged, format!("Isolate source {key:?}")));
      } else {
        out = out.copy(&src, src_path, dest, description);
      }
    }

    if !diffs.is_empty() {
      debug!(layers = diffs.len(), "merging source layers");
      let mut layers = Vec::with_capacity(diffs.len() + 1);
      layers.push(out);
      layers.extend(diffs);
      out = State::merge(layers, format!("Merge sources into {SOURCES_DIR}"));
    }

    let metadata = self
      .renderer
      .render(spec, target)
      .map_err(|source| FrontendError::Render {
        target: target.to_string(),
        source,
      })?;
    let metadata_path = format!("{SPECS_DIR}/{}.{}", spec.name, self.renderer.extension());

    info!(
      name = %spec.name,
      target,
      sources = spec.sources.len(),
      merge = self.context.merge_capable,
      "compiled spec"
    );

    Ok(
      out
        .mkdir(SPECS_DIR, DIR_MODE, false, format!("Create {SPECS_DIR} dir"))
        .mkfile(
          metadata_path.clone(),
          SPEC_FILE_MODE,
          metadata,
          format!("Write {metadata_path}"),
        ),
    )
  }

  fn materialize(&self, key: &str, state: &State) -> Result<State, FrontendError> {
    let materializer = self.context.materializer.as_ref().ok_or_else(|| FrontendError::Materialize {
      key: key.to_string(),
      source: MaterializeError::SelfExecResolution("no materializer is available for directory sources".to_string()),
    })?;
    materializer
      .materialize(key, state)
      .map_err(|source| FrontendError::Materialize {
        key: key.to_string(),
        source,
      })
  }
}
