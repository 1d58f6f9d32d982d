//! Turning directory-shaped sources into a single archive file.
//!
//! Every directory source ends up in `SOURCES/` as `<key>.tar.gz`. The
//! default strategy runs the frontend's own binary inside the build with
//! its `tar` subcommand; the inline strategy archives the content
//! in-process and embeds the result in the graph.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::archive::tar_gz_tree;
use crate::consts::{ARCHIVE_SUFFIX, FILE_MODE, SELF_TAR_SUBCOMMAND};
use crate::graph::{Exec, RejectExec, SourceProvider, State, evaluate};

#[derive(Debug, Error)]
pub enum MaterializeError {
  #[error("could not resolve frontend executable: {0}")]
  SelfExecResolution(String),

  #[error("archive step produced no output mount {0}")]
  MissingOutput(String),

  #[error("could not archive source in-process: {0}")]
  Inline(String),
}

/// File name of the archive a directory source is materialized to.
pub fn archive_name(key: &str) -> String {
  format!("{key}{ARCHIVE_SUFFIX}")
}

/// Produces a state holding `/<key>.tar.gz` with the content of `source`.
pub trait Materializer: Send + Sync {
  fn materialize(&self, key: &str, source: &State) -> Result<State, MaterializeError>;
}

/// Archives sources by running the frontend binary inside the build.
#[derive(Debug, Clone, Default)]
pub struct SelfExecMaterializer {
  frontend: Option<State>,
  executable: Option<PathBuf>,
}

impl SelfExecMaterializer {
  /// `frontend` is the image the current frontend runs from.
  pub fn new(frontend: Option<State>) -> Self {
    Self {
      frontend,
      executable: None,
    }
  }

  /// Use `path` instead of the resolved path of the running executable.
  pub fn with_executable(mut self, path: Option<PathBuf>) -> Self {
    self.executable = path;
    self
  }

  /// Path of the frontend binary as seen inside the frontend image.
  pub fn executable(&self) -> Result<PathBuf, MaterializeError> {
    if let Some(path) = &self.executable {
      return Ok(path.clone());
    }
    let exe = std::env::current_exe()
      .map_err(|e| MaterializeError::SelfExecResolution(format!("error getting executable path: {e}")))?;
    dunce::canonicalize(&exe).map_err(|e| {
      MaterializeError::SelfExecResolution(format!(
        "error resolving symlinks for executable path {}: {e}",
        exe.display()
      ))
    })
  }
}

impl Materializer for SelfExecMaterializer {
  fn materialize(&self, key: &str, source: &State) -> Result<State, MaterializeError> {
    let frontend = self
      .frontend
      .as_ref()
      .ok_or_else(|| MaterializeError::SelfExecResolution("the frontend image is not available".to_string()))?;
    let exe = self.executable()?;

    let work_dir = format!("/tmp/{key}/st");
    let out_dir = format!("/tmp/{key}/stOut");
    let archive = format!("{out_dir}/{}", archive_name(key));

    let exec = frontend.run(
      Exec::new([
        exe.to_string_lossy().to_string(),
        SELF_TAR_SUBCOMMAND.to_string(),
        work_dir.clone(),
        archive,
      ])
      .readonly_mount(work_dir, source.clone())
      .mount(&out_dir, State::scratch())
      .description(format!("Create compressed tar of source {key:?}")),
    );

    debug!(key, exe = %exe.display(), "archiving source with self-exec");
    exec.mount(&out_dir).ok_or(MaterializeError::MissingOutput(out_dir))
  }
}

/// Archives sources in-process and embeds the archive in the graph.
///
/// Only sources the provider can serve locally can be archived this way.
#[derive(Clone)]
pub struct InlineArchiveMaterializer {
  provider: Arc<dyn SourceProvider + Send + Sync>,
}

impl InlineArchiveMaterializer {
  pub fn new(provider: Arc<dyn SourceProvider + Send + Sync>) -> Self {
    Self { provider }
  }
}

impl Materializer for InlineArchiveMaterializer {
  fn materialize(&self, key: &str, source: &State) -> Result<State, MaterializeError> {
    let def = source
      .marshal()
      .map_err(|e| MaterializeError::Inline(e.to_string()))?;
    let tree = evaluate(&def, self.provider.as_ref(), &RejectExec).map_err(|e| MaterializeError::Inline(e.to_string()))?;
    let bytes = tar_gz_tree(&tree).map_err(|e| MaterializeError::Inline(e.to_string()))?;

    debug!(key, entries = tree.len(), bytes = bytes.len(), "archived source inline");
    Ok(State::scratch().mkfile(
      format!("/{}", archive_name(key)),
      FILE_MODE,
      bytes,
      format!("Embed compressed tar of source {key:?}"),
    ))
  }
}
