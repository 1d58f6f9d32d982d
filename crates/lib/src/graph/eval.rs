//! Reference evaluation of marshaled graphs.
//!
//! The evaluator computes the filesystem a [`Definition`] describes. Leaf
//! content comes from a [`SourceProvider`]; processes are delegated to an
//! [`ExecHandler`], so callers decide which sources and commands they can
//! actually serve.

use std::collections::{BTreeMap, HashMap};

use thiserror::Error;
use tracing::trace;

use crate::util::hash::Digest;

use super::{Definition, ExecOp, FileAction, InputRef, Op, SourceOp, Tree};

#[derive(Debug, Error)]
pub enum EvalError {
  #[error("path not found: {0}")]
  NotFound(String),

  #[error("not a directory: {0}")]
  NotADirectory(String),

  #[error("path already exists: {0}")]
  AlreadyExists(String),

  #[error("definition has no node {0}")]
  MissingNode(Digest),

  #[error("node {digest} has no output {output}")]
  InvalidOutput { digest: Digest, output: usize },

  #[error("source failed: {0}")]
  Source(String),

  #[error("command {args:?} failed: {message}")]
  Exec { args: Vec<String>, message: String },

  #[error("unsupported operation: {0}")]
  Unsupported(String),
}

/// Provides the content of source operations.
pub trait SourceProvider {
  fn provide(&self, source: &SourceOp) -> Result<Tree, EvalError>;
}

/// Runs exec operations.
pub trait ExecHandler {
  fn exec(&self, ctx: &mut ExecContext) -> Result<(), EvalError>;
}

/// A mount as seen by a running process.
#[derive(Debug, Clone)]
pub struct MountView {
  pub dest: String,
  pub tree: Tree,
  pub readonly: bool,
}

/// The environment of one exec operation.
///
/// Handlers mutate `root` and writable mounts in place; their final content
/// becomes the outputs of the operation.
#[derive(Debug, Clone)]
pub struct ExecContext {
  pub args: Vec<String>,
  pub env: BTreeMap<String, String>,
  pub cwd: String,
  pub root: Tree,
  pub mounts: Vec<MountView>,
}

impl ExecContext {
  pub fn mount(&self, dest: &str) -> Option<&MountView> {
    self.mounts.iter().find(|m| m.dest == dest)
  }

  /// The writable mount whose directory contains `path`, with the path
  /// relative to it.
  pub fn writable_mount_for(&mut self, path: &str) -> Option<(&mut MountView, String)> {
    self
      .mounts
      .iter_mut()
      .filter(|m| !m.readonly)
      .find_map(|m| {
        let rel = path.strip_prefix(m.dest.as_str())?;
        if !rel.is_empty() && !rel.starts_with('/') {
          return None;
        }
        let rel = rel.to_string();
        Some((m, rel))
      })
  }
}

/// An exec handler that refuses every command.
#[derive(Debug, Clone, Copy, Default)]
pub struct RejectExec;

impl ExecHandler for RejectExec {
  fn exec(&self, ctx: &mut ExecContext) -> Result<(), EvalError> {
    Err(EvalError::Unsupported(format!("exec {:?}", ctx.args)))
  }
}

/// Evaluate `def` and return the filesystem of its root output.
pub fn evaluate<P, E>(def: &Definition, provider: &P, exec: &E) -> Result<Tree, EvalError>
where
  P: SourceProvider + ?Sized,
  E: ExecHandler + ?Sized,
{
  let mut evaluator = Evaluator {
    def,
    provider,
    exec,
    cache: HashMap::new(),
  };
  evaluator.output(&def.root)
}

struct Evaluator<'a, P: ?Sized, E: ?Sized> {
  def: &'a Definition,
  provider: &'a P,
  exec: &'a E,
  cache: HashMap<Digest, Vec<Tree>>,
}

impl<P, E> Evaluator<'_, P, E>
where
  P: SourceProvider + ?Sized,
  E: ExecHandler + ?Sized,
{
  fn output(&mut self, input: &InputRef) -> Result<Tree, EvalError> {
    if !self.cache.contains_key(&input.digest) {
      let outputs = self.node(&input.digest)?;
      self.cache.insert(input.digest.clone(), outputs);
    }
    self
      .cache
      .get(&input.digest)
      .and_then(|outputs| outputs.get(input.output))
      .cloned()
      .ok_or_else(|| EvalError::InvalidOutput {
        digest: input.digest.clone(),
        output: input.output,
      })
  }

  fn node(&mut self, digest: &Digest) -> Result<Vec<Tree>, EvalError> {
    let def = self.def;
    let node = def
      .node(digest)
      .ok_or_else(|| EvalError::MissingNode(digest.clone()))?;
    trace!(digest = %digest.short(), op = node.op.kind(), "evaluating node");

    let tree = match &node.op {
      Op::Scratch => Tree::new(),
      Op::Source(source) => self.provider.provide(source)?,
      Op::File { base, action } => {
        let mut tree = self.output(base)?;
        match action {
          FileAction::Mkdir {
            path,
            mode,
            make_parents,
          } => tree.mkdir(path, *mode, *make_parents)?,
          FileAction::Mkfile { path, mode, data } => tree.mkfile(path, *mode, data.clone())?,
          FileAction::Copy {
            src,
            src_path,
            dest_path,
          } => {
            let src = self.output(src)?;
            tree.copy_from(&src, src_path, dest_path)?;
          }
        }
        tree
      }
      Op::Exec(exec) => return self.run(exec),
      Op::Merge { inputs } => {
        let mut tree = Tree::new();
        for input in inputs {
          tree.overlay(&self.output(input)?);
        }
        tree
      }
      Op::Diff { lower, upper } => Tree::diff(&self.output(lower)?, &self.output(upper)?),
    };

    Ok(vec![tree])
  }

  fn run(&mut self, exec: &ExecOp<InputRef>) -> Result<Vec<Tree>, EvalError> {
    let root = self.output(&exec.rootfs)?;
    let mut mounts = Vec::with_capacity(exec.mounts.len());
    for mount in &exec.mounts {
      mounts.push(MountView {
        dest: mount.dest.clone(),
        tree: self.output(&mount.input)?,
        readonly: mount.readonly,
      });
    }

    let mut ctx = ExecContext {
      args: exec.args.clone(),
      env: exec.env.clone(),
      cwd: exec.cwd.clone(),
      root,
      mounts,
    };
    self.exec.exec(&mut ctx)?;

    let mut outputs = vec![ctx.root];
    outputs.extend(ctx.mounts.into_iter().filter(|m| !m.readonly).map(|m| m.tree));
    Ok(outputs)
  }
}
