use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::spec::PackageSpec;

#[derive(Debug, Error)]
pub enum RenderError {
  #[error("spec field {field:?} is required to render {format}")]
  MissingField { field: &'static str, format: &'static str },

  #[error("failed to format metadata: {0}")]
  Format(#[from] std::fmt::Error),

  #[error("failed to encode metadata: {0}")]
  Encode(String),
}

/// One entry of a target catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetInfo {
  pub name: String,
  #[serde(default)]
  pub default: bool,
  #[serde(default)]
  pub description: String,
}

impl TargetInfo {
  pub fn new(name: impl Into<String>, description: impl Into<String>, default: bool) -> Self {
    Self {
      name: name.into(),
      default,
      description: description.into(),
    }
  }
}

/// Renders the packaging metadata file of one distribution format.
pub trait MetadataRenderer: Send + Sync {
  /// Extension of the rendered file under `SPECS/` (without the dot).
  fn extension(&self) -> &str;

  /// Render the metadata of `spec` for the route named `target`.
  fn render(&self, spec: &PackageSpec, target: &str) -> Result<Vec<u8>, RenderError>;
}
