use std::future::Future;

use super::{BuildOpts, EngineError, ResultRef, SolveRequest};

/// The frontend's view of the build engine.
///
/// Implementations are shared between the per-platform build tasks, so
/// every method takes `&self` and returns a `Send` future.
pub trait EngineClient: Send + Sync + 'static {
  /// Options of the current build request.
  fn build_opts(&self) -> BuildOpts;

  /// Read the entrypoint document from the build context.
  fn read_entrypoint(&self, name: &str) -> impl Future<Output = Result<Vec<u8>, EngineError>> + Send;

  /// Solve a graph or forwarded build and return a handle to its result.
  fn solve(&self, request: SolveRequest) -> impl Future<Output = Result<ResultRef, EngineError>> + Send;
}
