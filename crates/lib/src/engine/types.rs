use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::archive::ArchiveError;
use crate::graph::{Definition, EvalError};
use crate::platform::Platform;
use crate::spec::FrontendRef;

#[derive(Debug, Error)]
pub enum EngineError {
  #[error("could not read {name}: {message}")]
  Entrypoint { name: String, message: String },

  #[error("solve failed: {0}")]
  Solve(String),

  #[error("not supported by this engine: {0}")]
  Unsupported(String),

  #[error("I/O error: {0}")]
  Io(#[from] std::io::Error),

  #[error(transparent)]
  Eval(#[from] EvalError),

  #[error(transparent)]
  Archive(#[from] ArchiveError),
}

/// Optional engine operations a build may rely on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Capability {
  MergeOp,
  DiffOp,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities(BTreeSet<Capability>);

impl Capabilities {
  pub fn none() -> Self {
    Self::default()
  }

  pub fn all() -> Self {
    Self(BTreeSet::from([Capability::MergeOp, Capability::DiffOp]))
  }

  pub fn with(mut self, capability: Capability) -> Self {
    self.0.insert(capability);
    self
  }

  pub fn contains(&self, capability: Capability) -> bool {
    self.0.contains(&capability)
  }

  /// Whether graphs may use the merge/diff strategy.
  pub fn merge_capable(&self) -> bool {
    self.contains(Capability::MergeOp) && self.contains(Capability::DiffOp)
  }
}

/// Options of the build request the engine handed to the frontend.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildOpts {
  /// Requested target; empty selects the default route.
  pub target: String,
  pub build_args: BTreeMap<String, String>,
  /// Platforms to build for; empty means the host platform.
  pub platforms: Vec<Platform>,
  pub caps: Capabilities,
  /// Identifies subrequests such as listing targets.
  pub request_id: Option<String>,
  /// Name of the entrypoint document, when the caller overrides it.
  pub entrypoint: Option<String>,
}

/// A build another frontend performs on our behalf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardRequest {
  pub frontend: FrontendRef,
  pub target: String,
  pub build_args: BTreeMap<String, String>,
  pub platform: Platform,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SolveRequest {
  Definition(Definition),
  Forward(ForwardRequest),
}

/// Handle to a solved result held by the engine.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResultRef(pub String);

impl std::fmt::Display for ResultRef {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}
