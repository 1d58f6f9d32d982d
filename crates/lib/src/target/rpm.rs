//! RPM pipeline: lays out an rpmbuild tree.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Arc;

use crate::materialize::archive_name;
use crate::mux::{MuxBuilder, RouteError, RouteOptions};
use crate::spec::PackageSpec;

use super::{MetadataRenderer, RenderError, TargetPipeline};

pub const ROUTE: &str = "rpm";
pub const BUILDROOT_TARGET: &str = "buildroot";
pub const BUILDROOT_DESCRIPTION: &str = "Outputs an rpm buildroot suitable for passing to rpmbuild";

/// Renders `SPECS/<name>.spec`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RpmRenderer;

fn requirements(deps: &BTreeMap<String, Vec<String>>) -> Vec<String> {
  let mut out = Vec::new();
  for (name, constraints) in deps {
    if constraints.is_empty() {
      out.push(name.clone());
    }
    for constraint in constraints {
      out.push(format!("{name} {constraint}"));
    }
  }
  out
}

impl MetadataRenderer for RpmRenderer {
  fn extension(&self) -> &str {
    "spec"
  }

  fn render(&self, spec: &PackageSpec, target: &str) -> Result<Vec<u8>, RenderError> {
    let version = spec.version.as_deref().ok_or(RenderError::MissingField {
      field: "version",
      format: "rpm spec",
    })?;
    let description = spec.description.as_deref().unwrap_or(&spec.name);
    let deps = spec.dependencies_for(target);

    let mut out = String::new();
    writeln!(out, "Name: {}", spec.name)?;
    writeln!(out, "Version: {version}")?;
    writeln!(out, "Release: {}%{{?dist}}", spec.revision.as_deref().unwrap_or("1"))?;
    writeln!(out, "License: {}", spec.license.as_deref().unwrap_or("Unknown"))?;
    writeln!(out, "Summary: {description}")?;
    if let Some(website) = &spec.website {
      writeln!(out, "URL: {website}")?;
    }
    writeln!(out)?;

    for (index, (key, source)) in spec.sources.iter().enumerate() {
      let file = if source.is_dir() { archive_name(key) } else { key.clone() };
      writeln!(out, "Source{index}: {file}")?;
    }
    for req in requirements(&deps.build) {
      writeln!(out, "BuildRequires: {req}")?;
    }
    for req in requirements(&deps.runtime) {
      writeln!(out, "Requires: {req}")?;
    }

    writeln!(out)?;
    writeln!(out, "%description")?;
    writeln!(out, "{description}")?;

    writeln!(out)?;
    writeln!(out, "%prep")?;
    for (key, source) in &spec.sources {
      if source.is_dir() {
        writeln!(out, "mkdir -p %{{_builddir}}/{key}")?;
        writeln!(out, "tar -C %{{_builddir}}/{key} -xzf %{{_sourcedir}}/{}", archive_name(key))?;
      } else {
        writeln!(out, "cp -a %{{_sourcedir}}/{key} %{{_builddir}}/{key}")?;
      }
    }

    writeln!(out)?;
    writeln!(out, "%build")?;
    for (name, value) in &spec.build.env {
      writeln!(out, "export {name}=\"{value}\"")?;
    }
    for step in &spec.build.steps {
      for (name, value) in &step.env {
        writeln!(out, "export {name}=\"{value}\"")?;
      }
      writeln!(out, "{}", step.command)?;
    }

    writeln!(out)?;
    writeln!(out, "%files")?;

    Ok(out.into_bytes())
  }
}

pub fn pipeline() -> TargetPipeline {
  TargetPipeline::new(ROUTE, Arc::new(RpmRenderer)).with_target(BUILDROOT_TARGET, BUILDROOT_DESCRIPTION, true)
}

/// Register the rpm pipeline as the default route.
pub fn register(mux: &mut MuxBuilder) -> Result<(), RouteError> {
  mux.add(ROUTE, pipeline(), RouteOptions::default_route())?;
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::spec::load;
  use crate::util::testutil::DEMO_SPEC;

  fn render(doc: &str, target: &str) -> String {
    let spec = load(doc.as_bytes(), &BTreeMap::new()).unwrap();
    String::from_utf8(RpmRenderer.render(&spec, target).unwrap()).unwrap()
  }

  #[test]
  fn renders_header_and_sources() {
    let text = render(DEMO_SPEC, ROUTE);
    assert!(text.starts_with("Name: demo\nVersion: 1.0.0\n"));
    assert!(text.contains("Source0: a.tar.gz\n"));
    assert!(text.contains("Source1: b\n"));
    assert!(text.contains("tar -C %{_builddir}/a -xzf %{_sourcedir}/a.tar.gz"));
  }

  #[test]
  fn renders_dependencies_for_target() {
    let doc = r#"
name: demo
version: 1.0.0
sources: {}
dependencies:
  build: { gcc: [] }
  runtime: { openssl: [">= 3.0"] }
targets:
  rpm:
    dependencies:
      runtime: { openssl-libs: [] }
"#;
    let rpm = render(doc, ROUTE);
    assert!(rpm.contains("Requires: openssl-libs\n"));
    assert!(!rpm.contains("BuildRequires: gcc"));

    let other = render(doc, "other");
    assert!(other.contains("BuildRequires: gcc\n"));
    assert!(other.contains("Requires: openssl >= 3.0\n"));
  }

  #[test]
  fn version_required() {
    let spec = load(b"name: demo\nsources: {}\n", &BTreeMap::new()).unwrap();
    assert!(matches!(
      RpmRenderer.render(&spec, ROUTE),
      Err(RenderError::MissingField { field: "version", .. })
    ));
  }

  #[test]
  fn pipeline_offers_buildroot_by_default() {
    let pipeline = pipeline();
    let default = pipeline.default_target().unwrap();
    assert_eq!(default.name, BUILDROOT_TARGET);
    assert_eq!(default.description, BUILDROOT_DESCRIPTION);
  }
}
