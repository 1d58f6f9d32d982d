pub mod arch;
pub mod os;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use arch::Arch;
use os::Os;

/// Target platform of a build, in OCI form (`linux/arm64`, `linux/arm/v7`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Platform {
  pub os: Os,
  pub arch: Arch,
  pub variant: Option<String>,
}

impl Platform {
  /// Create a new platform without a variant
  pub fn new(os: Os, arch: Arch) -> Self {
    Self { os, arch, variant: None }
  }

  /// Detect the current platform at runtime
  ///
  /// Returns `None` if the OS or architecture is not supported
  pub fn current() -> Option<Self> {
    Some(Self::new(Os::current()?, Arch::current()?))
  }

  /// A form of the platform usable as a single path component (`linux_arm64`).
  pub fn dir_name(&self) -> String {
    self.to_string().replace('/', "_")
  }

  /// The builtin build args describing this platform.
  pub fn build_args(&self) -> BTreeMap<String, String> {
    BTreeMap::from([
      ("TARGETOS".to_string(), self.os.to_string()),
      ("TARGETARCH".to_string(), self.arch.to_string()),
      ("TARGETVARIANT".to_string(), self.variant.clone().unwrap_or_default()),
      ("TARGETPLATFORM".to_string(), self.to_string()),
    ])
  }
}

impl fmt::Display for Platform {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &self.variant {
      Some(variant) => write!(f, "{}/{}/{}", self.os, self.arch, variant),
      None => write!(f, "{}/{}", self.os, self.arch),
    }
  }
}

impl FromStr for Platform {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let mut parts = s.split('/');
    let (Some(os), Some(arch)) = (parts.next(), parts.next()) else {
      return Err(format!("invalid platform {s:?}: expected os/arch[/variant]"));
    };
    let variant = parts.next().filter(|v| !v.is_empty()).map(str::to_string);
    if parts.next().is_some() {
      return Err(format!("invalid platform {s:?}: too many components"));
    }
    Ok(Self {
      os: os.parse()?,
      arch: arch.parse()?,
      variant,
    })
  }
}

impl Serialize for Platform {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&self.to_string())
  }
}

impl<'de> Deserialize<'de> for Platform {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    let s = String::deserialize(deserializer)?;
    s.parse().map_err(serde::de::Error::custom)
  }
}
