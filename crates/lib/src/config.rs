//! Frontend configuration read from the environment.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;

use crate::consts::DEFAULT_ENTRYPOINT;

pub const ENTRYPOINT_VAR: &str = "PKGRAPH_ENTRYPOINT";
pub const SELF_EXE_VAR: &str = "PKGRAPH_SELF_EXE";
pub const MATERIALIZER_VAR: &str = "PKGRAPH_MATERIALIZER";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
  #[error("invalid value {value:?} for {var}")]
  Invalid { var: &'static str, value: String },
}

/// How directory sources are archived.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MaterializerKind {
  /// Run the frontend binary inside the build.
  #[default]
  SelfExec,
  /// Archive in-process and embed the result in the graph.
  Inline,
}

impl MaterializerKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      MaterializerKind::SelfExec => "self-exec",
      MaterializerKind::Inline => "inline",
    }
  }
}

impl fmt::Display for MaterializerKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

impl FromStr for MaterializerKind {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "self-exec" => Ok(MaterializerKind::SelfExec),
      "inline" => Ok(MaterializerKind::Inline),
      other => Err(format!("unknown materializer {other:?}, expected self-exec or inline")),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontendConfig {
  /// Name of the entrypoint document in the build context.
  pub entrypoint: String,
  /// Path of the frontend binary inside its image, when it differs from
  /// the running executable.
  pub self_exe: Option<PathBuf>,
  pub materializer: MaterializerKind,
}

impl Default for FrontendConfig {
  fn default() -> Self {
    Self {
      entrypoint: DEFAULT_ENTRYPOINT.to_string(),
      self_exe: None,
      materializer: MaterializerKind::default(),
    }
  }
}

fn non_empty_var(var: &str) -> Option<String> {
  std::env::var(var).ok().filter(|v| !v.trim().is_empty())
}

impl FrontendConfig {
  /// Read the configuration, falling back to defaults for unset variables.
  pub fn from_env() -> Result<Self, ConfigError> {
    let mut config = Self::default();
    if let Some(entrypoint) = non_empty_var(ENTRYPOINT_VAR) {
      config.entrypoint = entrypoint;
    }
    config.self_exe = non_empty_var(SELF_EXE_VAR).map(PathBuf::from);
    if let Some(value) = non_empty_var(MATERIALIZER_VAR) {
      config.materializer = value.parse().map_err(|_| ConfigError::Invalid {
        var: MATERIALIZER_VAR,
        value,
      })?;
    }
    Ok(config)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serial_test::serial;

  #[test]
  #[serial]
  fn defaults_when_unset() {
    temp_env::with_vars(
      [
        (ENTRYPOINT_VAR, None::<&str>),
        (SELF_EXE_VAR, None::<&str>),
        (MATERIALIZER_VAR, None::<&str>),
      ],
      || {
        assert_eq!(FrontendConfig::from_env().unwrap(), FrontendConfig::default());
      },
    );
  }

  #[test]
  #[serial]
  fn reads_overrides() {
    temp_env::with_vars(
      [
        (ENTRYPOINT_VAR, Some("spec.yml")),
        (SELF_EXE_VAR, Some("/usr/bin/pkgraph")),
        (MATERIALIZER_VAR, Some("inline")),
      ],
      || {
        let config = FrontendConfig::from_env().unwrap();
        assert_eq!(config.entrypoint, "spec.yml");
        assert_eq!(config.self_exe, Some(PathBuf::from("/usr/bin/pkgraph")));
        assert_eq!(config.materializer, MaterializerKind::Inline);
      },
    );
  }

  #[test]
  #[serial]
  fn empty_values_are_ignored() {
    temp_env::with_vars([(ENTRYPOINT_VAR, Some("  ")), (MATERIALIZER_VAR, Some(""))], || {
      let config = FrontendConfig::from_env().unwrap();
      assert_eq!(config.entrypoint, DEFAULT_ENTRYPOINT);
      assert_eq!(config.materializer, MaterializerKind::SelfExec);
    });
  }

  #[test]
  #[serial]
  fn rejects_unknown_materializer() {
    temp_env::with_var(MATERIALIZER_VAR, Some("docker"), || {
      assert_eq!(
        FrontendConfig::from_env().unwrap_err(),
        ConfigError::Invalid {
          var: MATERIALIZER_VAR,
          value: "docker".to_string()
        }
      );
    });
  }
}
