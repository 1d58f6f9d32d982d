//! Target routing.
//!
//! A [`BuildMux`] maps the requested target name to the handler that builds
//! it. Routes are registered once at startup through a [`MuxBuilder`];
//! after that the router is immutable and can be shared across tasks.
//!
//! Resolution order for a target `t`:
//!
//! 1. the empty target goes to the default route;
//! 2. a route named exactly `t` gets it with an empty sub-target;
//! 3. for `route/sub`, a route named `route` gets sub-target `sub`;
//! 4. a sub-target of the default route is accepted by its bare name;
//! 5. anything else goes to the forwarding handler when one is registered.

mod types;

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

pub use types::*;

use crate::engine::ForwardRequest;
use crate::error::{FrontendError, TargetScope};
use crate::platform::Platform;
use crate::spec::PackageSpec;
use crate::target::{TargetInfo, deb, debug, rpm};

/// Registers one or more routes on a builder.
pub type RegisterFn = fn(&mut MuxBuilder) -> Result<(), RouteError>;

#[derive(Default)]
pub struct MuxBuilder {
  routes: Vec<Registration>,
  forwarding: Option<ForwardingHandler>,
}

impl MuxBuilder {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register `handler` under `name`.
  ///
  /// Names must be unique, non-empty and contain no `/`. At most one route
  /// can be the default.
  pub fn add(
    &mut self,
    name: impl Into<String>,
    handler: impl Handler + 'static,
    options: RouteOptions,
  ) -> Result<&mut Self, RouteError> {
    let name = name.into();
    if name.is_empty() || name.contains('/') {
      return Err(RouteError::InvalidName(name));
    }
    if self.routes.iter().any(|r| r.name == name) {
      return Err(RouteError::Duplicate(name));
    }
    if options.default
      && let Some(existing) = self.routes.iter().find(|r| r.options.default)
    {
      return Err(RouteError::DuplicateDefault {
        name,
        existing: existing.name.clone(),
      });
    }

    debug!(route = %name, default = options.default, "registered route");
    self.routes.push(Registration {
      name,
      handler: Arc::new(handler),
      options,
    });
    Ok(self)
  }

  /// Send targets no route claims to the frontend named in the spec.
  pub fn forwarding(&mut self) -> &mut Self {
    self.forwarding = Some(ForwardingHandler);
    self
  }

  /// Apply `registrations` in order and build the router.
  pub fn handler(mut self, registrations: &[RegisterFn]) -> Result<BuildMux, RouteError> {
    for register in registrations {
      register(&mut self)?;
    }
    Ok(self.build())
  }

  pub fn build(self) -> BuildMux {
    let index = self
      .routes
      .iter()
      .enumerate()
      .map(|(i, r)| (r.name.clone(), i))
      .collect();
    let default = self.routes.iter().position(|r| r.options.default);
    BuildMux {
      routes: self.routes,
      index,
      default,
      forwarding: self.forwarding,
    }
  }
}

/// Registration function for the forwarding handler.
pub fn with_target_forwarding(mux: &mut MuxBuilder) -> Result<(), RouteError> {
  mux.forwarding();
  Ok(())
}

/// The routes this frontend ships with, in registration order.
pub const STANDARD_ROUTES: &[RegisterFn] = &[rpm::register, deb::register, debug::register, with_target_forwarding];

pub struct BuildMux {
  routes: Vec<Registration>,
  index: BTreeMap<String, usize>,
  default: Option<usize>,
  forwarding: Option<ForwardingHandler>,
}

impl BuildMux {
  pub fn builder() -> MuxBuilder {
    MuxBuilder::new()
  }

  /// The router with all standard routes registered.
  pub fn standard() -> Result<Self, RouteError> {
    MuxBuilder::new().handler(STANDARD_ROUTES)
  }

  /// Names of registered routes in registration order.
  pub fn routes(&self) -> Vec<&str> {
    self.routes.iter().map(|r| r.name.as_str()).collect()
  }

  pub fn default_route(&self) -> Option<&str> {
    self.default.map(|i| self.routes[i].name.as_str())
  }

  /// Resolve a target name to the handler that builds it.
  pub fn route(&self, target: &str) -> Result<Route<'_>, FrontendError> {
    let claimed = if target.is_empty() {
      self.default.map(|i| (i, String::new()))
    } else if let Some(&i) = self.index.get(target) {
      Some((i, String::new()))
    } else {
      target
        .split_once('/')
        .and_then(|(head, rest)| self.index.get(head).map(|&i| (i, rest.to_string())))
        .or_else(|| self.default_sub_target(target))
    };

    if let Some((i, sub_target)) = claimed {
      let registration = &self.routes[i];
      debug!(target, route = %registration.name, sub_target = %sub_target, "routed target");
      return Ok(Route::Handler {
        name: &registration.name,
        handler: &registration.handler,
        sub_target,
      });
    }

    if !target.is_empty() && self.forwarding.is_some() {
      debug!(target, "forwarding target");
      return Ok(Route::Forward {
        target: target.to_string(),
      });
    }

    Err(FrontendError::unknown_target(target, TargetScope::Router))
  }

  fn default_sub_target(&self, target: &str) -> Option<(usize, String)> {
    let i = self.default?;
    self.routes[i]
      .handler
      .targets()
      .iter()
      .any(|t| t.name == target)
      .then(|| (i, target.to_string()))
  }

  /// Build the forwarded solve request for a target no route claimed.
  pub fn forward(
    &self,
    spec: &PackageSpec,
    target: &str,
    build_args: &BTreeMap<String, String>,
    platform: &Platform,
  ) -> Result<ForwardRequest, FrontendError> {
    match &self.forwarding {
      Some(forwarding) => forwarding.forward(spec, target, build_args, platform),
      None => Err(FrontendError::unknown_target(target, TargetScope::Router)),
    }
  }

  /// The full target catalog for `spec`.
  ///
  /// The default route's sub-targets come first under their bare names and
  /// carry the default flag. Every handler sub-target is then listed as
  /// `route/sub` in registration order, followed by the spec targets that
  /// forward to another frontend.
  pub fn list_targets(&self, spec: &PackageSpec) -> Vec<TargetInfo> {
    let mut catalog = Vec::new();
    if let Some(i) = self.default {
      catalog.extend(self.routes[i].handler.targets());
    }
    for (i, registration) in self.routes.iter().enumerate() {
      let targets = registration.handler.targets();
      if targets.is_empty() {
        catalog.push(TargetInfo::new(
          registration.name.clone(),
          registration.options.description.clone().unwrap_or_default(),
          self.default == Some(i),
        ));
      }
      for target in targets {
        catalog.push(TargetInfo::new(
          format!("{}/{}", registration.name, target.name),
          target.description,
          false,
        ));
      }
    }

    if self.forwarding.is_some() {
      for (name, config) in &spec.targets {
        if self.index.contains_key(name) {
          continue;
        }
        if let Some(frontend) = &config.frontend {
          catalog.push(TargetInfo::new(
            name.clone(),
            format!("Forwarded to frontend {}", frontend.image),
            false,
          ));
        }
      }
    }

    catalog
  }
}

/// Hands targets to another frontend image configured in the spec.
#[derive(Debug, Clone, Copy, Default)]
pub struct ForwardingHandler;

impl ForwardingHandler {
  /// `name[/rest]` forwards `rest` to the frontend of spec target `name`.
  pub fn forward(
    &self,
    spec: &PackageSpec,
    target: &str,
    build_args: &BTreeMap<String, String>,
    platform: &Platform,
  ) -> Result<ForwardRequest, FrontendError> {
    let (head, rest) = target.split_once('/').unwrap_or((target, ""));
    let frontend = spec
      .frontend_for(head)
      .ok_or_else(|| FrontendError::unknown_target(target, TargetScope::Router))?;

    debug!(target, image = %frontend.image, "forwarding to frontend");
    Ok(ForwardRequest {
      frontend: frontend.clone(),
      target: rest.to_string(),
      build_args: build_args.clone(),
      platform: platform.clone(),
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::compile::CompileContext;
  use crate::graph::State;
  use crate::spec::load;

  struct Fixed(&'static str);

  impl Handler for Fixed {
    fn targets(&self) -> Vec<TargetInfo> {
      vec![TargetInfo::new(self.0, "fixed", true)]
    }

    fn validate_target(&self, _target: &str) -> Result<(), FrontendError> {
      Ok(())
    }

    fn compile(&self, _request: &HandlerRequest<'_>) -> Result<State, FrontendError> {
      Ok(State::scratch())
    }
  }

  fn spec_with_forward() -> PackageSpec {
    let doc = "name: demo\nsources: {}\ntargets:\n  external:\n    frontend: { image: ghcr.io/org/frontend:latest }\n";
    load(doc.as_bytes(), &BTreeMap::new()).unwrap()
  }

  fn routed(mux: &BuildMux, target: &str) -> (String, String) {
    match mux.route(target).unwrap() {
      Route::Handler { name, sub_target, .. } => (name.to_string(), sub_target),
      Route::Forward { target } => ("<forward>".to_string(), target),
    }
  }

  #[test]
  fn standard_routes_in_order() {
    let mux = BuildMux::standard().unwrap();
    assert_eq!(mux.routes(), vec!["rpm", "deb", "debug"]);
    assert_eq!(mux.default_route(), Some("rpm"));
  }

  #[test]
  fn empty_target_goes_to_default() {
    let mux = BuildMux::standard().unwrap();
    assert_eq!(routed(&mux, ""), ("rpm".to_string(), String::new()));
  }

  #[test]
  fn exact_and_prefixed_names() {
    let mux = BuildMux::standard().unwrap();
    assert_eq!(routed(&mux, "deb"), ("deb".to_string(), String::new()));
    assert_eq!(routed(&mux, "rpm/buildroot"), ("rpm".to_string(), "buildroot".to_string()));
    assert_eq!(routed(&mux, "debug/resolve"), ("debug".to_string(), "resolve".to_string()));
  }

  #[test]
  fn bare_default_sub_target_goes_to_default_route() {
    let mux = BuildMux::standard().unwrap();
    assert_eq!(routed(&mux, "buildroot"), ("rpm".to_string(), "buildroot".to_string()));
    // Sub-targets of other routes still need their prefix.
    assert_eq!(routed(&mux, "debroot"), ("<forward>".to_string(), "debroot".to_string()));
  }

  #[test]
  fn routing_is_deterministic() {
    let mux = BuildMux::standard().unwrap();
    for target in ["", "rpm", "deb/debroot", "external", "nope"] {
      let first = routed(&mux, target);
      for _ in 0..10 {
        assert_eq!(routed(&mux, target), first);
      }
    }
  }

  #[test]
  fn unclaimed_names_forward() {
    let mux = BuildMux::standard().unwrap();
    assert_eq!(routed(&mux, "external"), ("<forward>".to_string(), "external".to_string()));
    assert_eq!(routed(&mux, "rpmx"), ("<forward>".to_string(), "rpmx".to_string()));
  }

  #[test]
  fn unknown_without_forwarding() {
    let mut builder = BuildMux::builder();
    builder.add("rpm", Fixed("buildroot"), RouteOptions::default_route()).unwrap();
    let mux = builder.build();

    let err = mux.route("foo").unwrap_err();
    assert!(matches!(
      err,
      FrontendError::UnknownTarget { ref target, scope: TargetScope::Router } if target == "foo"
    ));
  }

  #[test]
  fn no_default_route_rejects_empty_target() {
    let mut builder = BuildMux::builder();
    builder.add("a", Fixed("x"), RouteOptions::default()).unwrap();
    builder.forwarding();
    let mux = builder.build();
    assert!(matches!(mux.route(""), Err(FrontendError::UnknownTarget { .. })));
  }

  #[test]
  fn rejects_duplicate_default() {
    let mut builder = BuildMux::builder();
    builder.add("a", Fixed("x"), RouteOptions::default_route()).unwrap();
    let err = builder.add("b", Fixed("y"), RouteOptions::default_route()).err();
    assert_eq!(
      err,
      Some(RouteError::DuplicateDefault {
        name: "b".to_string(),
        existing: "a".to_string()
      })
    );
  }

  #[test]
  fn rejects_duplicate_and_invalid_names() {
    let mut builder = BuildMux::builder();
    builder.add("a", Fixed("x"), RouteOptions::default()).unwrap();
    assert_eq!(
      builder.add("a", Fixed("x"), RouteOptions::default()).err(),
      Some(RouteError::Duplicate("a".to_string()))
    );
    assert!(matches!(
      builder.add("a/b", Fixed("x"), RouteOptions::default()).err(),
      Some(RouteError::InvalidName(_))
    ));
  }

  #[test]
  fn forward_uses_spec_frontend() {
    let mux = BuildMux::standard().unwrap();
    let spec = spec_with_forward();
    let platform: Platform = "linux/amd64".parse().unwrap();

    let request = mux
      .forward(&spec, "external/image", &BTreeMap::new(), &platform)
      .unwrap();
    assert_eq!(request.frontend.image, "ghcr.io/org/frontend:latest");
    assert_eq!(request.target, "image");

    let err = mux.forward(&spec, "missing", &BTreeMap::new(), &platform).unwrap_err();
    assert!(matches!(err, FrontendError::UnknownTarget { scope: TargetScope::Router, .. }));
  }

  #[test]
  fn catalog_lists_routes_then_forwarded_targets() {
    let mux = BuildMux::standard().unwrap();
    let catalog = mux.list_targets(&spec_with_forward());
    let names: Vec<&str> = catalog.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(
      names,
      vec!["buildroot", "rpm/buildroot", "deb/debroot", "debug/resolve", "external"]
    );

    let defaults: Vec<&str> = catalog.iter().filter(|t| t.default).map(|t| t.name.as_str()).collect();
    assert_eq!(defaults, vec!["buildroot"]);
    assert_eq!(
      catalog[0].description,
      "Outputs an rpm buildroot suitable for passing to rpmbuild"
    );
  }

  #[test]
  fn handlers_compile_through_router() {
    let mux = BuildMux::standard().unwrap();
    let spec = load(b"name: demo\nversion: 1.0.0\nsources: {}\n", &BTreeMap::new()).unwrap();
    let context = CompileContext::default();
    let Route::Handler { handler, sub_target, .. } = mux.route("deb/debroot").unwrap() else {
      panic!("deb should be a registered route");
    };
    let request = HandlerRequest {
      spec: &spec,
      target: &sub_target,
      context: &context,
    };
    assert!(handler.compile(&request).is_ok());
  }
}
