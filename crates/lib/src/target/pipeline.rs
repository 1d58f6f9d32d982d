use std::sync::Arc;

use tracing::debug;

use crate::compile::GraphCompiler;
use crate::error::{FrontendError, TargetScope};
use crate::graph::State;
use crate::mux::{Handler, HandlerRequest};

use super::{MetadataRenderer, TargetInfo};

/// A distribution pipeline: a renderer plus the sub-targets it offers.
///
/// Every sub-target produces the same graph, rendered for the pipeline's
/// name; sub-target names are only validated locally before compilation.
pub struct TargetPipeline {
  name: String,
  targets: Vec<TargetInfo>,
  renderer: Arc<dyn MetadataRenderer>,
}

impl TargetPipeline {
  pub fn new(name: impl Into<String>, renderer: Arc<dyn MetadataRenderer>) -> Self {
    Self {
      name: name.into(),
      targets: Vec::new(),
      renderer,
    }
  }

  pub fn with_target(mut self, name: impl Into<String>, description: impl Into<String>, default: bool) -> Self {
    self.targets.push(TargetInfo::new(name, description, default));
    self
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  /// Accept the empty target (the default) or a known sub-target.
  pub fn validate_target(&self, target: &str) -> Result<(), FrontendError> {
    if target.is_empty() || self.targets.iter().any(|t| t.name == target) {
      return Ok(());
    }
    Err(FrontendError::unknown_target(target, TargetScope::Pipeline))
  }

  pub fn list_targets(&self) -> &[TargetInfo] {
    &self.targets
  }

  pub fn default_target(&self) -> Option<&TargetInfo> {
    self.targets.iter().find(|t| t.default)
  }
}

impl Handler for TargetPipeline {
  fn targets(&self) -> Vec<TargetInfo> {
    self.targets.clone()
  }

  fn validate_target(&self, target: &str) -> Result<(), FrontendError> {
    TargetPipeline::validate_target(self, target)
  }

  fn compile(&self, request: &HandlerRequest<'_>) -> Result<State, FrontendError> {
    self.validate_target(request.target)?;
    debug!(pipeline = %self.name, target = request.target, "compiling pipeline target");
    GraphCompiler::new(self.renderer.as_ref(), request.context).compile(request.spec, &self.name)
  }
}
