use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::source::{SourceDescriptor, SourceError};

use super::args::ArgError;

#[derive(Debug, Error)]
pub enum SpecError {
  #[error("could not parse spec: {0}")]
  Parse(String),

  #[error("spec is missing required field {0:?}")]
  MissingField(&'static str),

  #[error(transparent)]
  Arg(#[from] ArgError),

  #[error("invalid source key {key:?}: {reason}")]
  InvalidSourceKey { key: String, reason: String },

  #[error("invalid source {key}: {reason}")]
  InvalidSource { key: String, reason: String },

  #[error("source {key}: {source}")]
  Source {
    key: String,
    #[source]
    source: SourceError,
  },

  #[error("source {key} refers to the build context holding the spec itself")]
  SelfReferential { key: String },
}

impl SpecError {
  /// Whether the error is a reference to a build arg with no value.
  pub fn is_missing_build_arg(&self) -> bool {
    matches!(self, SpecError::Arg(ArgError::Missing { .. }))
  }
}

/// A package definition after build-arg substitution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PackageSpec {
  pub name: String,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub version: Option<String>,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub revision: Option<String>,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub license: Option<String>,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub website: Option<String>,

  /// Declared build args; `None` marks an arg that must be supplied.
  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub args: BTreeMap<String, Option<String>>,

  /// Sources keyed by the name they take in `SOURCES/`.
  pub sources: BTreeMap<String, SourceDescriptor>,

  #[serde(default, skip_serializing_if = "Dependencies::is_empty")]
  pub dependencies: Dependencies,

  #[serde(default, skip_serializing_if = "BuildSteps::is_empty")]
  pub build: BuildSteps,

  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub targets: BTreeMap<String, TargetConfig>,
}

impl PackageSpec {
  /// Dependencies to render for `target`: the target's own block when it
  /// has one, otherwise the top-level block.
  pub fn dependencies_for(&self, target: &str) -> &Dependencies {
    self
      .targets
      .get(target)
      .and_then(|t| t.dependencies.as_ref())
      .unwrap_or(&self.dependencies)
  }

  /// The forwarding frontend configured for `target`, if any.
  pub fn frontend_for(&self, target: &str) -> Option<&FrontendRef> {
    self.targets.get(target).and_then(|t| t.frontend.as_ref())
  }
}

/// Package dependencies by name, each with a list of version constraints.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Dependencies {
  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub build: BTreeMap<String, Vec<String>>,
  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub runtime: BTreeMap<String, Vec<String>>,
}

impl Dependencies {
  pub fn is_empty(&self) -> bool {
    self.build.is_empty() && self.runtime.is_empty()
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildSteps {
  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub env: BTreeMap<String, String>,
  #[serde(default)]
  pub steps: Vec<BuildStep>,
}

impl BuildSteps {
  pub fn is_empty(&self) -> bool {
    self.env.is_empty() && self.steps.is_empty()
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildStep {
  pub command: String,
  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub env: BTreeMap<String, String>,
}

/// Target-specific configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetConfig {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub dependencies: Option<Dependencies>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub frontend: Option<FrontendRef>,
}

/// Another frontend image that builds a target on our behalf.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FrontendRef {
  pub image: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub cmdline: Option<String>,
}
