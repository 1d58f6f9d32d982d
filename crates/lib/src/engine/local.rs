//! An in-process engine for local builds and tests.
//!
//! The local engine evaluates definitions with the reference evaluator
//! against build contexts on disk. It serves local contexts, inline
//! content and the frontend's own `tar` step; anything that needs the
//! network or a container runtime is rejected as unsupported.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, info};

use crate::archive::{tar_gz_tree, tree_from_dir};
use crate::consts::{DEFAULT_CONTEXT_NAME, ENTRYPOINT_CONTEXT_NAME, FILE_MODE, SELF_TAR_SUBCOMMAND};
use crate::graph::{
  Entry, EvalError, ExecContext, ExecHandler, SourceOp, SourceProvider, State, Tree, evaluate, normalize,
};

use super::{BuildOpts, EngineClient, EngineError, ResultRef, SolveRequest};

/// Image reference the local engine treats as the running frontend.
pub const LOCAL_FRONTEND_IMAGE: &str = "pkgraph:local";

pub struct LocalEngine {
  opts: BuildOpts,
  contexts: Arc<BTreeMap<String, PathBuf>>,
  frontend_image: String,
  results: Mutex<BTreeMap<ResultRef, Tree>>,
  solves: AtomicUsize,
}

impl LocalEngine {
  pub fn new(opts: BuildOpts) -> Self {
    Self {
      opts,
      contexts: Arc::new(BTreeMap::new()),
      frontend_image: LOCAL_FRONTEND_IMAGE.to_string(),
      results: Mutex::new(BTreeMap::new()),
      solves: AtomicUsize::new(0),
    }
  }

  /// Make the directory `path` available as the build context `name`.
  pub fn with_context(mut self, name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
    Arc::make_mut(&mut self.contexts).insert(name.into(), path.into());
    self
  }

  /// The state of the image the frontend runs from.
  pub fn frontend_image(&self) -> State {
    State::image(&self.frontend_image)
  }

  /// Source provider backed by this engine's contexts.
  pub fn sources(&self) -> LocalSources {
    LocalSources {
      contexts: self.contexts.clone(),
      frontend_image: self.frontend_image.clone(),
    }
  }

  /// Number of solve requests received so far.
  pub fn solve_count(&self) -> usize {
    self.solves.load(Ordering::SeqCst)
  }

  /// The filesystem of a solved result.
  pub fn result(&self, reference: &ResultRef) -> Option<Tree> {
    self
      .results
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .get(reference)
      .cloned()
  }

  fn entrypoint_dir(&self) -> Option<&Path> {
    self
      .contexts
      .get(ENTRYPOINT_CONTEXT_NAME)
      .or_else(|| self.contexts.get(DEFAULT_CONTEXT_NAME))
      .map(PathBuf::as_path)
  }
}

impl EngineClient for LocalEngine {
  fn build_opts(&self) -> BuildOpts {
    self.opts.clone()
  }

  async fn read_entrypoint(&self, name: &str) -> Result<Vec<u8>, EngineError> {
    let dir = self.entrypoint_dir().ok_or_else(|| EngineError::Entrypoint {
      name: name.to_string(),
      message: "no build context holds the entrypoint".to_string(),
    })?;
    let path = dir.join(name);
    debug!(path = %path.display(), "reading entrypoint");
    tokio::fs::read(&path).await.map_err(|e| EngineError::Entrypoint {
      name: name.to_string(),
      message: e.to_string(),
    })
  }

  async fn solve(&self, request: SolveRequest) -> Result<ResultRef, EngineError> {
    self.solves.fetch_add(1, Ordering::SeqCst);
    let def = match request {
      SolveRequest::Definition(def) => def,
      SolveRequest::Forward(forward) => {
        return Err(EngineError::Unsupported(format!(
          "forwarding to frontend {}",
          forward.frontend.image
        )));
      }
    };

    let reference = ResultRef(match def.root.output {
      0 => def.root.digest.to_string(),
      output => format!("{}#{output}", def.root.digest),
    });
    let sources = self.sources();
    let tree = tokio::task::spawn_blocking(move || evaluate(&def, &sources, &SelfTar))
      .await
      .map_err(|e| EngineError::Solve(format!("solve task failed: {e}")))??;

    info!(result = %reference, entries = tree.len(), "solved");
    self
      .results
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .insert(reference.clone(), tree);
    Ok(reference)
  }
}

/// Serves local build contexts and the frontend image.
#[derive(Debug, Clone)]
pub struct LocalSources {
  contexts: Arc<BTreeMap<String, PathBuf>>,
  frontend_image: String,
}

/// Whether `path` is `pattern` or below it.
fn matches_prefix(path: &str, pattern: &str) -> bool {
  let pattern = normalize(pattern);
  pattern.is_empty() || path == pattern || path.strip_prefix(pattern.as_str()).is_some_and(|r| r.starts_with('/'))
}

impl SourceProvider for LocalSources {
  fn provide(&self, source: &SourceOp) -> Result<Tree, EvalError> {
    match source {
      SourceOp::Local {
        name,
        includes,
        excludes,
      } => {
        let dir = self
          .contexts
          .get(name)
          .ok_or_else(|| EvalError::Source(format!("no build context named {name:?}")))?;
        let tree = tree_from_dir(dir).map_err(|e| EvalError::Source(format!("reading context {name:?}: {e}")))?;

        if includes.is_empty() && excludes.is_empty() {
          return Ok(tree);
        }
        let mut filtered = Tree::new();
        for (path, entry) in tree.entries() {
          let included = includes.is_empty() || includes.iter().any(|p| matches_prefix(path, p));
          let excluded = excludes.iter().any(|p| matches_prefix(path, p));
          if included && !excluded {
            filtered.insert(path, entry.clone());
          }
        }
        Ok(filtered)
      }
      SourceOp::Image { reference } if *reference == self.frontend_image => Ok(Tree::new()),
      other => Err(EvalError::Unsupported(format!("{other:?}"))),
    }
  }
}

/// Runs the frontend's own `tar` subcommand in-process.
#[derive(Debug, Clone, Copy, Default)]
pub struct SelfTar;

impl ExecHandler for SelfTar {
  fn exec(&self, ctx: &mut ExecContext) -> Result<(), EvalError> {
    let [_, command, src, dst] = ctx.args.as_slice() else {
      return Err(EvalError::Unsupported(format!("exec {:?}", ctx.args)));
    };
    if command != SELF_TAR_SUBCOMMAND {
      return Err(EvalError::Unsupported(format!("exec {:?}", ctx.args)));
    }

    let exec_error = |message: String| EvalError::Exec {
      args: ctx.args.clone(),
      message,
    };
    let input = ctx
      .mount(src)
      .ok_or_else(|| exec_error(format!("nothing is mounted at {src}")))?;
    let bytes = tar_gz_tree(&input.tree).map_err(|e| exec_error(e.to_string()))?;

    let dst = dst.clone();
    let args = ctx.args.clone();
    let (mount, rel) = ctx.writable_mount_for(&dst).ok_or_else(|| EvalError::Exec {
      args,
      message: format!("{dst} is not inside a writable mount"),
    })?;
    mount.tree.insert(&rel, Entry::File { mode: FILE_MODE, data: bytes });
    Ok(())
  }
}
