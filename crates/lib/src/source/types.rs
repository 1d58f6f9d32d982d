use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::graph::State;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
  #[error("unsupported source kind {kind:?}")]
  UnsupportedKind { kind: String },

  #[error("invalid source: {0}")]
  Invalid(String),

  #[error("invalid source reference: {reason}")]
  Fetch { reason: String },
}

/// A git repository checked out at `commit`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GitSource {
  pub url: String,
  #[serde(default)]
  pub commit: String,
  #[serde(default, rename = "keepGitDir", skip_serializing_if = "std::ops::Not::not")]
  pub keep_git_dir: bool,
}

/// A single file downloaded over HTTP(S).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HttpSource {
  pub url: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub digest: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub permissions: Option<u32>,
}

/// Content written directly in the spec: exactly one of `file` or `dir`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InlineSource {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub file: Option<InlineFile>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub dir: Option<InlineDir>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InlineFile {
  #[serde(default)]
  pub contents: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub permissions: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InlineDir {
  #[serde(default)]
  pub files: BTreeMap<String, InlineFile>,
}

/// The filesystem of a container image, optionally narrowed to `path`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImageSource {
  #[serde(rename = "ref")]
  pub reference: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub path: Option<String>,
}

/// A named build context supplied by the client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContextSource {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub path: Option<String>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub includes: Vec<String>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub excludes: Vec<String>,
}

/// A declared input to a package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawSource", into = "RawSource")]
pub enum SourceDescriptor {
  Git(GitSource),
  Http(HttpSource),
  Inline(InlineSource),
  Image(ImageSource),
  Context(ContextSource),
}

impl SourceDescriptor {
  /// Whether the source yields a directory tree (as opposed to one file).
  ///
  /// Directory sources are archived before they land in `SOURCES/`.
  pub fn is_dir(&self) -> bool {
    match self {
      SourceDescriptor::Git(_) | SourceDescriptor::Image(_) | SourceDescriptor::Context(_) => true,
      SourceDescriptor::Http(_) => false,
      SourceDescriptor::Inline(inline) => inline.dir.is_some(),
    }
  }

  pub fn kind(&self) -> &'static str {
    match self {
      SourceDescriptor::Git(_) => "git",
      SourceDescriptor::Http(_) => "http",
      SourceDescriptor::Inline(_) => "inline",
      SourceDescriptor::Image(_) => "image",
      SourceDescriptor::Context(_) => "context",
    }
  }
}

/// Wire shape of a source: one optional field per kind.
///
/// Keys that name no known kind are collected in `other` so they can be
/// reported as unsupported kinds rather than generic parse errors.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawSource {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub git: Option<GitSource>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub http: Option<HttpSource>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub inline: Option<InlineSource>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub image: Option<ImageSource>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub context: Option<ContextSource>,
  #[serde(flatten)]
  pub other: BTreeMap<String, serde_yaml::Value>,
}

impl TryFrom<RawSource> for SourceDescriptor {
  type Error = SourceError;

  fn try_from(raw: RawSource) -> Result<Self, Self::Error> {
    let mut kinds: Vec<SourceDescriptor> = Vec::new();
    kinds.extend(raw.git.map(SourceDescriptor::Git));
    kinds.extend(raw.http.map(SourceDescriptor::Http));
    kinds.extend(raw.inline.map(SourceDescriptor::Inline));
    kinds.extend(raw.image.map(SourceDescriptor::Image));
    kinds.extend(raw.context.map(SourceDescriptor::Context));

    if kinds.is_empty()
      && let Some(kind) = raw.other.keys().next()
    {
      return Err(SourceError::UnsupportedKind { kind: kind.clone() });
    }
    if let Some(field) = raw.other.keys().next() {
      return Err(SourceError::Invalid(format!("unexpected field {field:?}")));
    }

    match kinds.len() {
      0 => Err(SourceError::Invalid("no source kind set".to_string())),
      1 => {
        let descriptor = kinds.remove(0);
        if let SourceDescriptor::Inline(inline) = &descriptor {
          match (&inline.file, &inline.dir) {
            (Some(_), Some(_)) => {
              return Err(SourceError::Invalid(
                "inline source sets both file and dir".to_string(),
              ));
            }
            (None, None) => {
              return Err(SourceError::Invalid(
                "inline source sets neither file nor dir".to_string(),
              ));
            }
            _ => {}
          }
        }
        Ok(descriptor)
      }
      _ => {
        let names: Vec<&str> = kinds.iter().map(SourceDescriptor::kind).collect();
        Err(SourceError::Invalid(format!(
          "exactly one source kind must be set, found {}",
          names.join(", ")
        )))
      }
    }
  }
}

impl From<SourceDescriptor> for RawSource {
  fn from(descriptor: SourceDescriptor) -> Self {
    let mut raw = RawSource::default();
    match descriptor {
      SourceDescriptor::Git(git) => raw.git = Some(git),
      SourceDescriptor::Http(http) => raw.http = Some(http),
      SourceDescriptor::Inline(inline) => raw.inline = Some(inline),
      SourceDescriptor::Image(image) => raw.image = Some(image),
      SourceDescriptor::Context(context) => raw.context = Some(context),
    }
    raw
  }
}

/// A source lowered to a graph state.
///
/// File-shaped states hold exactly one file named after the source key at
/// their root. Directory-shaped states hold the source tree at their root.
#[derive(Debug, Clone)]
pub struct ResolvedSource {
  pub key: String,
  pub state: State,
  pub is_dir: bool,
}
