//! Implementation of the `pkgraph tar` command.
//!
//! This is the entry point the self-exec materializer runs inside a build:
//! it archives a mounted directory into a deterministic `tar.gz`.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use pkgraph_lib::archive::tar_gz_dir;

use crate::output::format_bytes;

pub fn cmd_tar(src: &Path, dst: &Path) -> Result<()> {
  tar_gz_dir(src, dst).with_context(|| format!("Failed to archive {} to {}", src.display(), dst.display()))?;

  let size = std::fs::metadata(dst).map(|m| m.len()).unwrap_or_default();
  info!(src = %src.display(), dst = %dst.display(), size = %format_bytes(size), "wrote archive");
  Ok(())
}
