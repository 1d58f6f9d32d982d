//! Spec loading and validation.

use std::collections::BTreeMap;

use serde_yaml::{Mapping, Value};
use tracing::debug;

use crate::consts::ENTRYPOINT_CONTEXT_NAME;
use crate::materialize::archive_name;
use crate::platform::Platform;
use crate::source::{RawSource, SourceDescriptor, SourceError, is_file_name};

use super::args::{BuildArgs, substitute};
use super::{PackageSpec, SpecError};

/// Load a spec from the entrypoint document.
///
/// Build args are substituted into every string value outside the `args`
/// block before the document is parsed into a [`PackageSpec`].
pub fn load(entrypoint: &[u8], build_args: &BTreeMap<String, String>) -> Result<PackageSpec, SpecError> {
  load_for_platform(entrypoint, build_args, None)
}

/// Like [`load`], with the builtin args of `platform` available for
/// substitution.
pub fn load_for_platform(
  entrypoint: &[u8],
  build_args: &BTreeMap<String, String>,
  platform: Option<&Platform>,
) -> Result<PackageSpec, SpecError> {
  let text = std::str::from_utf8(entrypoint).map_err(|e| SpecError::Parse(format!("spec is not utf-8: {e}")))?;
  let doc: Value = serde_yaml::from_str(text.trim()).map_err(|e| SpecError::Parse(e.to_string()))?;
  let Value::Mapping(mut doc) = doc else {
    return Err(SpecError::Parse("spec must be a mapping".to_string()));
  };

  let declared = declared_args(&mut doc)?;
  let args = BuildArgs::new(build_args.clone())
    .with_declared(declared)
    .with_builtins(platform.map(Platform::build_args).unwrap_or_default());

  for (key, value) in doc.iter_mut() {
    if key.as_str() != Some("args") {
      substitute_value(value, &args)?;
    }
  }

  if !matches!(doc.get("name"), Some(Value::String(name)) if !name.trim().is_empty()) {
    return Err(SpecError::MissingField("name"));
  }
  validate_sources(&doc)?;

  let spec: PackageSpec = serde_yaml::from_value(Value::Mapping(doc)).map_err(|e| SpecError::Parse(e.to_string()))?;
  debug!(name = %spec.name, sources = spec.sources.len(), "loaded spec");
  Ok(spec)
}

/// Read the `args` block, normalizing scalar defaults to strings in place.
fn declared_args(doc: &mut Mapping) -> Result<BTreeMap<String, Option<String>>, SpecError> {
  let args = match doc.get_mut("args") {
    None | Some(Value::Null) => return Ok(BTreeMap::new()),
    Some(Value::Mapping(args)) => args,
    Some(_) => return Err(SpecError::Parse("args must be a mapping".to_string())),
  };

  let mut declared = BTreeMap::new();
  for (name, value) in args.iter_mut() {
    let name = name
      .as_str()
      .ok_or_else(|| SpecError::Parse("build arg names must be strings".to_string()))?;
    let default = match value {
      Value::Null => None,
      Value::String(s) => Some(s.clone()),
      Value::Bool(b) => Some(b.to_string()),
      Value::Number(n) => Some(n.to_string()),
      _ => {
        return Err(SpecError::Parse(format!("default of build arg {name:?} must be a scalar")));
      }
    };
    if let Some(default) = &default {
      *value = Value::String(default.clone());
    }
    declared.insert(name.to_string(), default);
  }
  Ok(declared)
}

fn substitute_value(value: &mut Value, args: &BuildArgs) -> Result<(), SpecError> {
  match value {
    Value::String(s) => *s = substitute(s, args)?,
    Value::Sequence(items) => {
      for item in items {
        substitute_value(item, args)?;
      }
    }
    Value::Mapping(map) => {
      for (_, item) in map.iter_mut() {
        substitute_value(item, args)?;
      }
    }
    Value::Tagged(tagged) => substitute_value(&mut tagged.value, args)?,
    Value::Null | Value::Bool(_) | Value::Number(_) => {}
  }
  Ok(())
}

/// Check sources one by one so errors carry the offending key.
///
/// Every source lands in `SOURCES/` under its artifact name, so no two keys
/// may share one.
fn validate_sources(doc: &Mapping) -> Result<(), SpecError> {
  let sources = match doc.get("sources") {
    None => return Err(SpecError::MissingField("sources")),
    Some(Value::Null) => return Err(SpecError::Parse("sources must be a mapping".to_string())),
    Some(Value::Mapping(sources)) => sources,
    Some(_) => return Err(SpecError::Parse("sources must be a mapping".to_string())),
  };

  let mut artifacts: BTreeMap<String, String> = BTreeMap::new();
  for (key, value) in sources {
    let key = key
      .as_str()
      .ok_or_else(|| SpecError::Parse("source keys must be strings".to_string()))?;
    if !is_file_name(key) {
      return Err(SpecError::InvalidSourceKey {
        key: key.to_string(),
        reason: "must be usable as a file name".to_string(),
      });
    }

    let raw: RawSource = serde_yaml::from_value(value.clone()).map_err(|e| SpecError::InvalidSource {
      key: key.to_string(),
      reason: e.to_string(),
    })?;
    let descriptor = SourceDescriptor::try_from(raw).map_err(|e| match e {
      SourceError::Invalid(reason) => SpecError::InvalidSource {
        key: key.to_string(),
        reason,
      },
      source => SpecError::Source {
        key: key.to_string(),
        source,
      },
    })?;

    if let SourceDescriptor::Context(context) = &descriptor
      && context.name.as_deref() == Some(ENTRYPOINT_CONTEXT_NAME)
    {
      return Err(SpecError::SelfReferential { key: key.to_string() });
    }

    let artifact = if descriptor.is_dir() { archive_name(key) } else { key.to_string() };
    if let Some(existing) = artifacts.insert(artifact.clone(), key.to_string()) {
      return Err(SpecError::InvalidSourceKey {
        key: key.to_string(),
        reason: format!("{artifact} is already produced by source {existing:?}"),
      });
    }
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::spec::args::ArgError;
  use crate::util::testutil::DEMO_SPEC;

  fn no_args() -> BTreeMap<String, String> {
    BTreeMap::new()
  }

  #[test]
  fn loads_demo_spec() {
    let spec = load(DEMO_SPEC.as_bytes(), &no_args()).unwrap();
    assert_eq!(spec.name, "demo");
    assert_eq!(spec.version.as_deref(), Some("1.0.0"));
    assert_eq!(spec.sources.keys().collect::<Vec<_>>(), vec!["a", "b"]);
    assert!(spec.sources["a"].is_dir());
    assert!(!spec.sources["b"].is_dir());
  }

  #[test]
  fn tolerates_syntax_line_and_whitespace() {
    let doc = format!("\n# syntax=ghcr.io/org/pkgraph:latest\n{DEMO_SPEC}\n\n");
    assert!(load(doc.as_bytes(), &no_args()).is_ok());
  }

  #[test]
  fn substitutes_supplied_args() {
    let doc = r#"
name: demo
args:
  VERSION: 1.0.0
version: "${VERSION}"
sources:
  src:
    git:
      url: https://github.com/org/demo.git
      commit: "v${VERSION}"
"#;
    let args = BTreeMap::from([("VERSION".to_string(), "2.0.0".to_string())]);
    let spec = load(doc.as_bytes(), &args).unwrap();
    assert_eq!(spec.version.as_deref(), Some("2.0.0"));
    match &spec.sources["src"] {
      SourceDescriptor::Git(git) => assert_eq!(git.commit, "v2.0.0"),
      other => panic!("unexpected source {}", other.kind()),
    }
    assert_eq!(spec.args["VERSION"].as_deref(), Some("1.0.0"));
  }

  #[test]
  fn numeric_defaults_become_strings() {
    let doc = "name: demo\nargs:\n  REV: 3\nrevision: \"${REV}\"\nsources: {}\n";
    let spec = load(doc.as_bytes(), &no_args()).unwrap();
    assert_eq!(spec.revision.as_deref(), Some("3"));
    assert_eq!(spec.args["REV"].as_deref(), Some("3"));
  }

  #[test]
  fn platform_builtins_available() {
    let doc = "name: demo-${TARGETARCH}\nsources: {}\n";
    let platform: Platform = "linux/arm64".parse().unwrap();
    let spec = load_for_platform(doc.as_bytes(), &no_args(), Some(&platform)).unwrap();
    assert_eq!(spec.name, "demo-arm64");
  }

  #[test]
  fn missing_build_arg() {
    let doc = "name: demo\nargs:\n  COMMIT:\nsources:\n  src:\n    git: { url: https://x/y.git, commit: \"${COMMIT}\" }\n";
    let err = load(doc.as_bytes(), &no_args()).unwrap_err();
    assert!(err.is_missing_build_arg());
    assert!(matches!(err, SpecError::Arg(ArgError::Missing { ref name }) if name == "COMMIT"));
  }

  #[test]
  fn malformed_yaml_is_parse_error() {
    let err = load(b"name: [unclosed", &no_args()).unwrap_err();
    assert!(matches!(err, SpecError::Parse(_)));
  }

  #[test]
  fn sources_required() {
    let err = load(b"name: demo\n", &no_args()).unwrap_err();
    assert!(matches!(err, SpecError::MissingField("sources")));
  }

  #[test]
  fn name_required() {
    let err = load(b"sources: {}\n", &no_args()).unwrap_err();
    assert!(matches!(err, SpecError::MissingField("name")));
  }

  #[test]
  fn empty_sources_allowed() {
    let spec = load(b"name: demo\nsources: {}\n", &no_args()).unwrap();
    assert!(spec.sources.is_empty());
  }

  #[test]
  fn duplicate_source_keys_rejected() {
    let doc = "name: demo\nsources:\n  a: { inline: { file: { contents: x } } }\n  a: { inline: { file: { contents: y } } }\n";
    let err = load(doc.as_bytes(), &no_args()).unwrap_err();
    assert!(matches!(err, SpecError::Parse(_)));
  }

  #[test]
  fn unknown_source_kind() {
    let doc = "name: demo\nsources:\n  a: { build: { source: x } }\n";
    let err = load(doc.as_bytes(), &no_args()).unwrap_err();
    assert!(matches!(
      err,
      SpecError::Source { ref key, source: SourceError::UnsupportedKind { ref kind } } if key == "a" && kind == "build"
    ));
  }

  #[test]
  fn source_with_two_kinds_rejected() {
    let doc = "name: demo\nsources:\n  a:\n    inline: { file: { contents: x } }\n    context: {}\n";
    let err = load(doc.as_bytes(), &no_args()).unwrap_err();
    assert!(matches!(err, SpecError::InvalidSource { ref key, .. } if key == "a"));
  }

  #[test]
  fn self_referential_context_rejected() {
    let doc = "name: demo\nsources:\n  spec: { context: { name: dockerfile } }\n";
    let err = load(doc.as_bytes(), &no_args()).unwrap_err();
    assert!(matches!(err, SpecError::SelfReferential { ref key } if key == "spec"));
  }

  #[test]
  fn source_keys_must_be_file_names() {
    let doc = "name: demo\nsources:\n  \"a/b\": { context: {} }\n";
    let err = load(doc.as_bytes(), &no_args()).unwrap_err();
    assert!(matches!(err, SpecError::InvalidSourceKey { .. }));
  }

  #[test]
  fn colliding_artifact_names_rejected() {
    let doc = "name: demo\nsources:\n  a: { context: {} }\n  a.tar.gz: { inline: { file: { contents: y } } }\n";
    let err = load(doc.as_bytes(), &no_args()).unwrap_err();
    assert!(matches!(err, SpecError::InvalidSourceKey { ref key, .. } if key == "a.tar.gz"));
    assert!(err.to_string().contains("\"a\""));
  }

  #[test]
  fn file_source_may_use_archive_suffix_alone() {
    let doc = "name: demo\nsources:\n  a.tar.gz: { inline: { file: { contents: y } } }\n  b: { context: {} }\n";
    let spec = load(doc.as_bytes(), &no_args()).unwrap();
    assert_eq!(spec.sources.len(), 2);
  }

  #[test]
  fn unknown_top_level_field_rejected() {
    let err = load(b"name: demo\nsources: {}\nsurces: {}\n", &no_args()).unwrap_err();
    assert!(matches!(err, SpecError::Parse(_)));
  }

  #[test]
  fn per_target_dependencies_override() {
    let doc = r#"
name: demo
sources: {}
dependencies:
  runtime: { openssl: [">= 3.0"] }
targets:
  rpm:
    dependencies:
      runtime: { openssl-libs: [] }
"#;
    let spec = load(doc.as_bytes(), &no_args()).unwrap();
    assert!(spec.dependencies_for("rpm").runtime.contains_key("openssl-libs"));
    assert!(spec.dependencies_for("deb").runtime.contains_key("openssl"));
  }
}
