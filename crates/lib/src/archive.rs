//! Deterministic `tar.gz` archives.
//!
//! Archives are produced from in-memory [`Tree`]s so that the same content
//! always yields the same bytes: entries are sorted by path, timestamps are
//! zeroed, ownership is `root:root` and modes are normalized.

use std::io::{Read, Write};
use std::path::Path;

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use thiserror::Error;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::graph::{Entry, Tree};

#[derive(Debug, Error)]
pub enum ArchiveError {
  #[error("I/O error: {0}")]
  Io(#[from] std::io::Error),

  #[error("failed to walk {path}: {message}")]
  Walk { path: String, message: String },

  #[error("invalid archive entry {0:?}")]
  InvalidEntry(String),
}

const DETERMINISTIC_MTIME: u64 = 0;

fn normalize_mode(entry: &Entry) -> u32 {
  match entry {
    Entry::Dir { .. } => 0o755,
    Entry::File { mode, .. } if mode & 0o111 != 0 => 0o755,
    Entry::File { .. } => 0o644,
    Entry::Symlink { .. } => 0o777,
  }
}

fn header_for(entry: &Entry) -> Result<tar::Header, ArchiveError> {
  let mut header = tar::Header::new_gnu();
  match entry {
    Entry::Dir { .. } => {
      header.set_entry_type(tar::EntryType::Directory);
      header.set_size(0);
    }
    Entry::File { data, .. } => {
      header.set_entry_type(tar::EntryType::Regular);
      header.set_size(data.len() as u64);
    }
    Entry::Symlink { target } => {
      header.set_entry_type(tar::EntryType::Symlink);
      header.set_size(0);
      header.set_link_name(target)?;
    }
  }
  header.set_mode(normalize_mode(entry));
  header.set_mtime(DETERMINISTIC_MTIME);
  header.set_uid(0);
  header.set_gid(0);
  header.set_username("root")?;
  header.set_groupname("root")?;
  header.set_cksum();
  Ok(header)
}

/// Archive a tree as gzip'd tar bytes.
pub fn tar_gz_tree(tree: &Tree) -> Result<Vec<u8>, ArchiveError> {
  let encoder = GzEncoder::new(Vec::new(), Compression::default());
  let mut builder = tar::Builder::new(encoder);
  builder.mode(tar::HeaderMode::Deterministic);

  for (path, entry) in tree.entries() {
    let mut header = header_for(entry)?;
    match entry {
      Entry::Dir { .. } => builder.append_data(&mut header, format!("{path}/"), std::io::empty())?,
      Entry::File { data, .. } => builder.append_data(&mut header, path, data.as_slice())?,
      Entry::Symlink { .. } => builder.append_data(&mut header, path, std::io::empty())?,
    }
  }

  let encoder = builder.into_inner()?;
  Ok(encoder.finish()?)
}

/// Read a gzip'd tar archive into a tree.
///
/// Entry types other than directories, regular files and symlinks are
/// skipped.
pub fn unpack_tar_gz(bytes: &[u8]) -> Result<Tree, ArchiveError> {
  let mut archive = tar::Archive::new(GzDecoder::new(bytes));
  let mut tree = Tree::new();

  for entry in archive.entries()? {
    let mut entry = entry?;
    let path = entry.path()?.to_string_lossy().trim_end_matches('/').to_string();
    if path.split('/').any(|part| part == "..") {
      return Err(ArchiveError::InvalidEntry(path));
    }
    let mode = entry.header().mode()?;

    match entry.header().entry_type() {
      tar::EntryType::Directory => tree.insert(&path, Entry::Dir { mode }),
      tar::EntryType::Regular => {
        let mut data = Vec::new();
        entry.read_to_end(&mut data)?;
        tree.insert(&path, Entry::File { mode, data });
      }
      tar::EntryType::Symlink => {
        let target = entry
          .link_name()?
          .ok_or_else(|| ArchiveError::InvalidEntry(path.clone()))?
          .to_string_lossy()
          .to_string();
        tree.insert(&path, Entry::Symlink { target });
      }
      other => warn!(path = %path, kind = ?other, "skipping unsupported archive entry"),
    }
  }

  Ok(tree)
}

/// Read a directory on disk into a tree. Symlinks are not followed.
pub fn tree_from_dir(root: &Path) -> Result<Tree, ArchiveError> {
  let mut tree = Tree::new();
  let walker = WalkDir::new(root).min_depth(1).follow_links(false).sort_by_file_name();

  for entry in walker {
    let entry = entry.map_err(|e| ArchiveError::Walk {
      path: root.display().to_string(),
      message: e.to_string(),
    })?;
    let rel = entry
      .path()
      .strip_prefix(root)
      .map_err(|_| ArchiveError::InvalidEntry(entry.path().display().to_string()))?;
    let rel = rel
      .components()
      .map(|c| c.as_os_str().to_string_lossy())
      .collect::<Vec<_>>()
      .join("/");

    let file_type = entry.file_type();
    if file_type.is_dir() {
      tree.insert(&rel, Entry::Dir { mode: 0o755 });
    } else if file_type.is_file() {
      let metadata = entry.metadata().map_err(|e| ArchiveError::Walk {
        path: entry.path().display().to_string(),
        message: e.to_string(),
      })?;
      let data = std::fs::read(entry.path())?;
      tree.insert(
        &rel,
        Entry::File {
          mode: file_mode(&metadata),
          data,
        },
      );
    } else if file_type.is_symlink() {
      let target = std::fs::read_link(entry.path())?;
      tree.insert(
        &rel,
        Entry::Symlink {
          target: target.to_string_lossy().to_string(),
        },
      );
    }
  }

  Ok(tree)
}

#[cfg(unix)]
fn file_mode(metadata: &std::fs::Metadata) -> u32 {
  use std::os::unix::fs::PermissionsExt;
  metadata.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn file_mode(_metadata: &std::fs::Metadata) -> u32 {
  0o644
}

/// Archive the directory `src` into the file `dst`.
pub fn tar_gz_dir(src: &Path, dst: &Path) -> Result<(), ArchiveError> {
  let tree = tree_from_dir(src)?;
  let bytes = tar_gz_tree(&tree)?;
  if let Some(parent) = dst.parent() {
    std::fs::create_dir_all(parent)?;
  }
  let mut file = std::fs::File::create(dst)?;
  file.write_all(&bytes)?;
  debug!(src = %src.display(), dst = %dst.display(), entries = tree.len(), "archived directory");
  Ok(())
}

/// Write a tree to disk under `dst`, creating it if needed.
pub fn write_tree(tree: &Tree, dst: &Path) -> Result<(), ArchiveError> {
  std::fs::create_dir_all(dst)?;
  for (path, entry) in tree.entries() {
    let target = dst.join(path);
    match entry {
      Entry::Dir { .. } => std::fs::create_dir_all(&target)?,
      Entry::File { mode, data } => {
        if let Some(parent) = target.parent() {
          std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&target, data)?;
        set_mode(&target, *mode)?;
      }
      Entry::Symlink { target: link } => write_symlink(link, &target)?,
    }
  }
  Ok(())
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> std::io::Result<()> {
  use std::os::unix::fs::PermissionsExt;
  std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> std::io::Result<()> {
  Ok(())
}

#[cfg(unix)]
fn write_symlink(link: &str, path: &Path) -> std::io::Result<()> {
  std::os::unix::fs::symlink(link, path)
}

#[cfg(not(unix))]
fn write_symlink(link: &str, path: &Path) -> std::io::Result<()> {
  warn!(path = %path.display(), link, "symlinks are not supported on this platform, skipping");
  Ok(())
}
