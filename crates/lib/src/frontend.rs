//! The build orchestrator.
//!
//! [`Frontend::handle_build`] drives one build session: it answers the
//! list-targets subrequest directly and otherwise compiles and solves the
//! requested target once per platform. Platforms are built concurrently and
//! independently; a failing platform does not cancel its siblings.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::compile::CompileContext;
use crate::config::FrontendConfig;
use crate::consts::LIST_TARGETS_REQUEST_ID;
use crate::engine::{BuildOpts, EngineClient, ResultRef, SolveRequest};
use crate::error::FrontendError;
use crate::graph::State;
use crate::materialize::{Materializer, SelfExecMaterializer};
use crate::mux::{BuildMux, HandlerRequest, Route};
use crate::platform::Platform;
use crate::spec::{PackageSpec, load_for_platform};
use crate::target::TargetInfo;

/// What the caller of a build session can provide beyond the engine client.
#[derive(Clone, Default)]
pub struct BuildSession {
  /// The image the frontend itself runs from, used to archive directory
  /// sources with the frontend binary.
  pub frontend_image: Option<State>,
  /// Replaces the self-exec materializer.
  pub materializer: Option<Arc<dyn Materializer>>,
}

impl BuildSession {
  pub fn with_frontend_image(mut self, image: State) -> Self {
    self.frontend_image = Some(image);
    self
  }

  pub fn with_materializer(mut self, materializer: Arc<dyn Materializer>) -> Self {
    self.materializer = Some(materializer);
    self
  }
}

/// Result references of a successful build, one per platform.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildResult {
  pub refs: BTreeMap<Platform, ResultRef>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildOutcome {
  /// Answer to the list-targets subrequest.
  Targets(Vec<TargetInfo>),
  Build(BuildResult),
}

/// Collects per-platform outcomes as the build tasks finish.
#[derive(Debug, Default)]
pub struct MultiPlatformResult {
  expected: BTreeSet<Platform>,
  outcomes: BTreeMap<Platform, Result<ResultRef, FrontendError>>,
}

impl MultiPlatformResult {
  pub fn new(platforms: impl IntoIterator<Item = Platform>) -> Self {
    Self {
      expected: platforms.into_iter().collect(),
      outcomes: BTreeMap::new(),
    }
  }

  pub fn record(&mut self, platform: Platform, outcome: Result<ResultRef, FrontendError>) {
    self.outcomes.insert(platform, outcome);
  }

  /// All result references, or the error of the first failed platform in
  /// platform order.
  pub fn finalize(mut self) -> Result<BuildResult, FrontendError> {
    let mut refs = BTreeMap::new();
    for platform in self.expected {
      match self.outcomes.remove(&platform) {
        Some(Ok(reference)) => {
          refs.insert(platform, reference);
        }
        Some(Err(source)) => {
          return Err(FrontendError::Platform {
            platform,
            source: Box::new(source),
          });
        }
        None => return Err(FrontendError::TaskAborted { platform }),
      }
    }
    Ok(BuildResult { refs })
  }
}

pub struct Frontend {
  mux: Arc<BuildMux>,
  config: FrontendConfig,
}

impl Frontend {
  pub fn new(mux: BuildMux, config: FrontendConfig) -> Self {
    Self {
      mux: Arc::new(mux),
      config,
    }
  }

  /// The frontend with the standard routes.
  pub fn standard(config: FrontendConfig) -> Result<Self, FrontendError> {
    Ok(Self::new(BuildMux::standard()?, config))
  }

  pub fn mux(&self) -> &BuildMux {
    &self.mux
  }

  pub fn config(&self) -> &FrontendConfig {
    &self.config
  }

  /// Name of the entrypoint document for a request.
  pub fn entrypoint<'a>(&'a self, opts: &'a BuildOpts) -> &'a str {
    opts.entrypoint.as_deref().unwrap_or(&self.config.entrypoint)
  }

  /// The materializer for directory sources in `session`.
  pub fn materializer(&self, session: &BuildSession) -> Arc<dyn Materializer> {
    match &session.materializer {
      Some(materializer) => materializer.clone(),
      None => Arc::new(
        SelfExecMaterializer::new(session.frontend_image.clone()).with_executable(self.config.self_exe.clone()),
      ),
    }
  }

  /// Handle one build session against `client`.
  pub async fn handle_build<C: EngineClient>(
    &self,
    client: Arc<C>,
    session: BuildSession,
  ) -> Result<BuildOutcome, FrontendError> {
    let opts = client.build_opts();
    let entrypoint = self.entrypoint(&opts).to_string();

    if opts.request_id.as_deref() == Some(LIST_TARGETS_REQUEST_ID) {
      let platform = opts.platforms.first().cloned().or_else(Platform::current);
      let spec = read_spec(client.as_ref(), &entrypoint, &opts.build_args, platform.as_ref()).await?;
      let targets = self.mux.list_targets(&spec);
      info!(name = %spec.name, targets = targets.len(), "listed targets");
      return Ok(BuildOutcome::Targets(targets));
    }

    if let Route::Handler { handler, sub_target, .. } = self.mux.route(&opts.target)? {
      handler.validate_target(&sub_target)?;
    }

    let platforms: BTreeSet<Platform> = if opts.platforms.is_empty() {
      BTreeSet::from([Platform::current().ok_or(FrontendError::UnsupportedHost)?])
    } else {
      opts.platforms.iter().cloned().collect()
    };
    let context = CompileContext::new(opts.caps.merge_capable(), Some(self.materializer(&session)));
    info!(
      target = %opts.target,
      platforms = platforms.len(),
      merge = context.merge_capable,
      "starting build"
    );

    let mut tasks = JoinSet::new();
    for platform in &platforms {
      let platform = platform.clone();
      let client = client.clone();
      let mux = self.mux.clone();
      let context = context.clone();
      let entrypoint = entrypoint.clone();
      let opts = opts.clone();

      tasks.spawn(async move {
        let outcome = build_platform(client.as_ref(), &mux, &context, &entrypoint, &opts, &platform).await;
        (platform, outcome)
      });
    }

    let mut results = MultiPlatformResult::new(platforms);
    while let Some(joined) = tasks.join_next().await {
      match joined {
        Ok((platform, outcome)) => {
          match &outcome {
            Ok(reference) => info!(platform = %platform, result = %reference, "platform build finished"),
            Err(e) => warn!(platform = %platform, error = %e, "platform build failed"),
          }
          results.record(platform, outcome);
        }
        Err(e) => error!(error = %e, "platform build task panicked"),
      }
    }

    results.finalize().map(BuildOutcome::Build)
  }

  /// Compile the solve request for `target` without submitting it.
  pub fn compile(
    &self,
    spec: &PackageSpec,
    target: &str,
    context: &CompileContext,
    build_args: &BTreeMap<String, String>,
    platform: &Platform,
  ) -> Result<SolveRequest, FrontendError> {
    plan(&self.mux, spec, target, context, build_args, platform)
  }
}

async fn read_spec<C: EngineClient>(
  client: &C,
  entrypoint: &str,
  build_args: &BTreeMap<String, String>,
  platform: Option<&Platform>,
) -> Result<PackageSpec, FrontendError> {
  let bytes = client
    .read_entrypoint(entrypoint)
    .await
    .map_err(|source| FrontendError::Entrypoint {
      name: entrypoint.to_string(),
      source,
    })?;
  Ok(load_for_platform(&bytes, build_args, platform)?)
}

fn plan(
  mux: &BuildMux,
  spec: &PackageSpec,
  target: &str,
  context: &CompileContext,
  build_args: &BTreeMap<String, String>,
  platform: &Platform,
) -> Result<SolveRequest, FrontendError> {
  match mux.route(target)? {
    Route::Handler {
      name,
      handler,
      sub_target,
    } => {
      handler.validate_target(&sub_target)?;
      let state = handler.compile(&HandlerRequest {
        spec,
        target: &sub_target,
        context,
      })?;
      let def = state.marshal()?;
      debug!(
        route = name,
        platform = %platform,
        nodes = def.nodes.len(),
        digest = %def.root.digest,
        "marshaled graph"
      );
      Ok(SolveRequest::Definition(def))
    }
    Route::Forward { target } => Ok(SolveRequest::Forward(mux.forward(spec, &target, build_args, platform)?)),
  }
}

async fn build_platform<C: EngineClient>(
  client: &C,
  mux: &BuildMux,
  context: &CompileContext,
  entrypoint: &str,
  opts: &BuildOpts,
  platform: &Platform,
) -> Result<ResultRef, FrontendError> {
  let spec = read_spec(client, entrypoint, &opts.build_args, Some(platform)).await?;
  let request = plan(mux, &spec, &opts.target, context, &opts.build_args, platform)?;
  client.solve(request).await.map_err(FrontendError::Submit)
}
