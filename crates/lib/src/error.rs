//! Errors surfaced by the frontend.
//!
//! Component errors are wrapped with the source key, target or platform
//! they concern as they cross into the orchestrator.

use std::fmt;

use thiserror::Error;

use crate::engine::EngineError;
use crate::graph::GraphError;
use crate::materialize::MaterializeError;
use crate::mux::RouteError;
use crate::platform::Platform;
use crate::source::SourceError;
use crate::spec::SpecError;
use crate::target::RenderError;

/// Where an unknown target was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetScope {
  /// No registered route matched the target.
  Router,
  /// A pipeline does not know the sub-target.
  Pipeline,
}

impl fmt::Display for TargetScope {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      TargetScope::Router => write!(f, "router"),
      TargetScope::Pipeline => write!(f, "pipeline"),
    }
  }
}

#[derive(Debug, Error)]
pub enum FrontendError {
  #[error("could not read spec file {name}: {source}")]
  Entrypoint {
    name: String,
    #[source]
    source: EngineError,
  },

  #[error("error loading spec: {0}")]
  Spec(#[from] SpecError),

  #[error("unknown target {target:?} ({scope})")]
  UnknownTarget { target: String, scope: TargetScope },

  #[error("error converting source {key}: {source}")]
  Source {
    key: String,
    #[source]
    source: SourceError,
  },

  #[error("could not materialize source {key}: {source}")]
  Materialize {
    key: String,
    #[source]
    source: MaterializeError,
  },

  #[error("could not render {target} metadata: {source}")]
  Render {
    target: String,
    #[source]
    source: RenderError,
  },

  #[error("error marshalling graph: {0}")]
  Marshal(#[from] GraphError),

  #[error("error submitting build: {0}")]
  Submit(#[source] EngineError),

  #[error(transparent)]
  Route(#[from] RouteError),

  #[error("build for platform {platform} failed: {source}")]
  Platform {
    platform: Platform,
    #[source]
    source: Box<FrontendError>,
  },

  #[error("build task for platform {platform} did not complete")]
  TaskAborted { platform: Platform },

  #[error("no platform requested and the host platform is not supported")]
  UnsupportedHost,
}

impl FrontendError {
  pub fn unknown_target(target: impl Into<String>, scope: TargetScope) -> Self {
    FrontendError::UnknownTarget {
      target: target.into(),
      scope,
    }
  }

  /// The error with any platform wrapper removed.
  pub fn root(&self) -> &FrontendError {
    match self {
      FrontendError::Platform { source, .. } => source.root(),
      other => other,
    }
  }
}
