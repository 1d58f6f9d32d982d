use std::sync::Arc;

use thiserror::Error;

use crate::compile::CompileContext;
use crate::error::FrontendError;
use crate::graph::State;
use crate::spec::PackageSpec;
use crate::target::TargetInfo;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
  #[error("route {0:?} is already registered")]
  Duplicate(String),

  #[error("route {name:?} cannot be the default, {existing:?} already is")]
  DuplicateDefault { name: String, existing: String },

  #[error("invalid route name {0:?}")]
  InvalidName(String),
}

/// What a handler gets to compile one target.
#[derive(Debug, Clone, Copy)]
pub struct HandlerRequest<'a> {
  pub spec: &'a PackageSpec,
  /// The sub-target within the handler; empty selects its default.
  pub target: &'a str,
  pub context: &'a CompileContext,
}

/// Something the router can dispatch a target to.
pub trait Handler: Send + Sync {
  /// The sub-targets this handler offers.
  fn targets(&self) -> Vec<TargetInfo>;

  /// Check a sub-target name before any work is done for it.
  fn validate_target(&self, target: &str) -> Result<(), FrontendError>;

  /// Compile the graph for the request.
  fn compile(&self, request: &HandlerRequest<'_>) -> Result<State, FrontendError>;
}

/// Options of a registered route.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteOptions {
  /// Whether the empty target resolves to this route.
  pub default: bool,
  /// Catalog description for handlers that list no sub-targets.
  pub description: Option<String>,
}

impl RouteOptions {
  pub fn default_route() -> Self {
    Self {
      default: true,
      description: None,
    }
  }

  pub fn with_description(mut self, description: impl Into<String>) -> Self {
    self.description = Some(description.into());
    self
  }
}

pub(crate) struct Registration {
  pub name: String,
  pub handler: Arc<dyn Handler>,
  pub options: RouteOptions,
}

/// The outcome of routing a target name.
pub enum Route<'a> {
  /// A registered handler claimed the target.
  Handler {
    name: &'a str,
    handler: &'a Arc<dyn Handler>,
    /// The handler-local sub-target, empty for the handler's default.
    sub_target: String,
  },
  /// No handler claimed the target; it goes to the forwarding handler.
  Forward { target: String },
}

impl std::fmt::Debug for Route<'_> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Route::Handler { name, sub_target, .. } => f
        .debug_struct("Handler")
        .field("name", name)
        .field("sub_target", sub_target)
        .finish(),
      Route::Forward { target } => f.debug_struct("Forward").field("target", target).finish(),
    }
  }
}
