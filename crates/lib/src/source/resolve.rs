use tracing::debug;

use crate::consts::{DEFAULT_CONTEXT_NAME, FILE_MODE};
use crate::graph::{State, normalize};
use crate::util::hash::Digest;

use super::{
  ContextSource, GitSource, HttpSource, ImageSource, InlineSource, ResolvedSource, SourceDescriptor, SourceError,
};

/// Lower a source descriptor to a graph state.
///
/// Resolution is pure: it validates references and builds the graph that
/// fetches the content, but performs no I/O. Distinct keys resolve
/// independently of each other.
pub fn resolve(key: &str, descriptor: &SourceDescriptor) -> Result<ResolvedSource, SourceError> {
  let state = match descriptor {
    SourceDescriptor::Git(git) => resolve_git(git)?,
    SourceDescriptor::Http(http) => resolve_http(key, http)?,
    SourceDescriptor::Inline(inline) => resolve_inline(key, inline)?,
    SourceDescriptor::Image(image) => resolve_image(key, image)?,
    SourceDescriptor::Context(context) => resolve_context(key, context)?,
  };

  debug!(key, kind = descriptor.kind(), is_dir = descriptor.is_dir(), "resolved source");
  Ok(ResolvedSource {
    key: key.to_string(),
    state,
    is_dir: descriptor.is_dir(),
  })
}

fn fetch_error(reason: impl Into<String>) -> SourceError {
  SourceError::Fetch { reason: reason.into() }
}

fn resolve_git(git: &GitSource) -> Result<State, SourceError> {
  if git.url.trim().is_empty() {
    return Err(fetch_error("git source has an empty url"));
  }
  if git.commit.trim().is_empty() {
    return Err(fetch_error(format!("git source {} has no commit", git.url)));
  }
  Ok(State::git(&git.url, &git.commit, git.keep_git_dir))
}

fn resolve_http(key: &str, http: &HttpSource) -> Result<State, SourceError> {
  let scheme = http.url.split_once("://").map(|(scheme, _)| scheme.to_ascii_lowercase());
  match scheme.as_deref() {
    Some("http" | "https") => {}
    Some(other) => {
      return Err(fetch_error(format!("unsupported url scheme {other:?} in {}", http.url)));
    }
    None => return Err(fetch_error(format!("invalid url {:?}", http.url))),
  }
  if let Some(digest) = &http.digest
    && !Digest::is_valid(digest)
  {
    return Err(fetch_error(format!("malformed digest {digest:?}")));
  }
  Ok(State::http(
    &http.url,
    http.digest.clone(),
    key,
    http.permissions.unwrap_or(FILE_MODE),
  ))
}

fn resolve_inline(key: &str, inline: &InlineSource) -> Result<State, SourceError> {
  if let Some(file) = &inline.file {
    return Ok(State::scratch().mkfile(
      format!("/{key}"),
      file.permissions.unwrap_or(FILE_MODE),
      file.contents.clone().into_bytes(),
      format!("Write inline source {key:?}"),
    ));
  }

  let Some(dir) = &inline.dir else {
    return Err(SourceError::Invalid("inline source sets neither file nor dir".to_string()));
  };
  let mut state = State::scratch();
  for (name, file) in &dir.files {
    if !is_file_name(name) {
      return Err(SourceError::Invalid(format!("invalid inline file name {name:?}")));
    }
    state = state.mkfile(
      format!("/{name}"),
      file.permissions.unwrap_or(FILE_MODE),
      file.contents.clone().into_bytes(),
      format!("Write inline file {name:?} of source {key:?}"),
    );
  }
  Ok(state)
}

fn resolve_image(key: &str, image: &ImageSource) -> Result<State, SourceError> {
  if image.reference.trim().is_empty() {
    return Err(fetch_error("image source has an empty ref"));
  }
  let state = State::image(&image.reference);
  match &image.path {
    Some(path) => {
      let path = checked_subpath(path, true)?;
      Ok(State::scratch().copy(&state, path, "/", format!("Extract {path} from image for source {key:?}")))
    }
    None => Ok(state),
  }
}

fn resolve_context(key: &str, context: &ContextSource) -> Result<State, SourceError> {
  let name = context.name.as_deref().unwrap_or(DEFAULT_CONTEXT_NAME);
  if name.trim().is_empty() {
    return Err(fetch_error("context source has an empty name"));
  }
  let state = State::local(name, context.includes.clone(), context.excludes.clone());
  match &context.path {
    Some(path) => {
      let path = checked_subpath(path, false)?;
      Ok(State::scratch().copy(
        &state,
        path,
        "/",
        format!("Extract {path} from context {name} for source {key:?}"),
      ))
    }
    None => Ok(state),
  }
}

/// Validate a subpath of a source.
///
/// Paths may never climb out of the source with `..`. Context paths are
/// relative to the context and must not be absolute.
fn checked_subpath(path: &str, allow_absolute: bool) -> Result<&str, SourceError> {
  if path.starts_with('/') && !allow_absolute {
    return Err(fetch_error(format!("subpath {path:?} must be relative")));
  }
  if path.split('/').any(|part| part == "..") {
    return Err(fetch_error(format!("subpath {path:?} escapes the source")));
  }
  if normalize(path).is_empty() {
    return Err(fetch_error(format!("subpath {path:?} is empty")));
  }
  Ok(path)
}

/// Whether `name` can be used as a single file name.
pub fn is_file_name(name: &str) -> bool {
  !name.is_empty() && name != "." && name != ".." && !name.contains('/') && !name.contains('\0')
}
