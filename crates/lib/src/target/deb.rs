//! Debian pipeline: lays out a source tree with a control file.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Arc;

use crate::mux::{MuxBuilder, RouteError, RouteOptions};
use crate::spec::PackageSpec;

use super::{MetadataRenderer, RenderError, TargetPipeline};

pub const ROUTE: &str = "deb";
pub const DEBROOT_TARGET: &str = "debroot";
pub const DEBROOT_DESCRIPTION: &str = "Outputs a debian source tree control file";

/// Renders `SPECS/<name>.control`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DebRenderer;

/// `name (constraint), ...` in debian relationship syntax.
fn relationships(deps: &BTreeMap<String, Vec<String>>) -> String {
  let mut out = Vec::new();
  for (name, constraints) in deps {
    if constraints.is_empty() {
      out.push(name.clone());
    }
    for constraint in constraints {
      out.push(format!("{name} ({constraint})"));
    }
  }
  out.join(", ")
}

impl MetadataRenderer for DebRenderer {
  fn extension(&self) -> &str {
    "control"
  }

  fn render(&self, spec: &PackageSpec, target: &str) -> Result<Vec<u8>, RenderError> {
    let version = spec.version.as_deref().ok_or(RenderError::MissingField {
      field: "version",
      format: "debian control file",
    })?;
    let revision = spec.revision.as_deref().unwrap_or("1");
    let deps = spec.dependencies_for(target);

    let mut out = String::new();
    writeln!(out, "Source: {}", spec.name)?;
    writeln!(out, "Version: {version}-{revision}")?;
    if let Some(website) = &spec.website {
      writeln!(out, "Homepage: {website}")?;
    }
    if !deps.build.is_empty() {
      writeln!(out, "Build-Depends: {}", relationships(&deps.build))?;
    }
    writeln!(out)?;
    writeln!(out, "Package: {}", spec.name)?;
    writeln!(out, "Architecture: any")?;
    if !deps.runtime.is_empty() {
      writeln!(out, "Depends: {}", relationships(&deps.runtime))?;
    }
    writeln!(out, "Description: {}", spec.description.as_deref().unwrap_or(&spec.name))?;

    Ok(out.into_bytes())
  }
}

pub fn pipeline() -> TargetPipeline {
  TargetPipeline::new(ROUTE, Arc::new(DebRenderer)).with_target(DEBROOT_TARGET, DEBROOT_DESCRIPTION, true)
}

pub fn register(mux: &mut MuxBuilder) -> Result<(), RouteError> {
  mux.add(ROUTE, pipeline(), RouteOptions::default())?;
  Ok(())
}
