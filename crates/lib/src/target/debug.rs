//! Debug handler: outputs the spec as the frontend understood it.

use crate::consts::FILE_MODE;
use crate::error::{FrontendError, TargetScope};
use crate::graph::State;
use crate::mux::{Handler, HandlerRequest, MuxBuilder, RouteError, RouteOptions};

use super::{RenderError, TargetInfo};

pub const ROUTE: &str = "debug";
pub const RESOLVE_TARGET: &str = "resolve";
pub const RESOLVE_DESCRIPTION: &str = "Outputs the resolved spec file with build args applied";
pub const RESOLVED_SPEC_FILE: &str = "spec.yml";

#[derive(Debug, Clone, Copy, Default)]
pub struct DebugHandler;

impl Handler for DebugHandler {
  fn targets(&self) -> Vec<TargetInfo> {
    vec![TargetInfo::new(RESOLVE_TARGET, RESOLVE_DESCRIPTION, true)]
  }

  fn validate_target(&self, target: &str) -> Result<(), FrontendError> {
    match target {
      "" | RESOLVE_TARGET => Ok(()),
      other => Err(FrontendError::unknown_target(other, TargetScope::Pipeline)),
    }
  }

  fn compile(&self, request: &HandlerRequest<'_>) -> Result<State, FrontendError> {
    self.validate_target(request.target)?;
    let yaml = serde_yaml::to_string(request.spec).map_err(|e| FrontendError::Render {
      target: ROUTE.to_string(),
      source: RenderError::Encode(e.to_string()),
    })?;
    Ok(State::scratch().mkfile(
      format!("/{RESOLVED_SPEC_FILE}"),
      FILE_MODE,
      yaml.into_bytes(),
      "Write resolved spec",
    ))
  }
}

pub fn register(mux: &mut MuxBuilder) -> Result<(), RouteError> {
  mux.add(ROUTE, DebugHandler, RouteOptions::default())?;
  Ok(())
}
