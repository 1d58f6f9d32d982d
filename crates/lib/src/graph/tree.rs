use std::collections::BTreeMap;

use crate::consts::DIR_MODE;

use super::EvalError;

/// One filesystem entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
  Dir { mode: u32 },
  File { mode: u32, data: Vec<u8> },
  Symlink { target: String },
}

/// An in-memory filesystem keyed by normalized relative path.
///
/// The root directory is implicit. Parents of every entry are present as
/// directories.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tree {
  entries: BTreeMap<String, Entry>,
}

/// Normalize a container path to a relative key (`/a/./b/` -> `a/b`).
///
/// `..` never climbs above the root.
pub fn normalize(path: &str) -> String {
  let mut parts: Vec<&str> = Vec::new();
  for part in path.split('/') {
    match part {
      "" | "." => {}
      ".." => {
        parts.pop();
      }
      other => parts.push(other),
    }
  }
  parts.join("/")
}

fn join(base: &str, rel: &str) -> String {
  match (base.is_empty(), rel.is_empty()) {
    (true, _) => rel.to_string(),
    (_, true) => base.to_string(),
    _ => format!("{base}/{rel}"),
  }
}

fn parent(path: &str) -> Option<&str> {
  path.rsplit_once('/').map(|(parent, _)| parent)
}

fn basename(path: &str) -> &str {
  path.rsplit_once('/').map(|(_, name)| name).unwrap_or(path)
}

fn is_within(path: &str, dir: &str) -> bool {
  dir.is_empty() || path == dir || path.strip_prefix(dir).is_some_and(|rest| rest.starts_with('/'))
}

impl Tree {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn get(&self, path: &str) -> Option<&Entry> {
    self.entries.get(&normalize(path))
  }

  /// Contents of the regular file at `path`.
  pub fn file(&self, path: &str) -> Option<&[u8]> {
    match self.get(path)? {
      Entry::File { data, .. } => Some(data),
      _ => None,
    }
  }

  pub fn is_dir(&self, path: &str) -> bool {
    let key = normalize(path);
    key.is_empty() || matches!(self.entries.get(&key), Some(Entry::Dir { .. }))
  }

  pub fn entries(&self) -> impl Iterator<Item = (&str, &Entry)> {
    self.entries.iter().map(|(k, v)| (k.as_str(), v))
  }

  pub fn paths(&self) -> Vec<&str> {
    self.entries.keys().map(String::as_str).collect()
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  /// Insert an entry, creating missing parents and replacing whatever was
  /// at the path before.
  pub fn insert(&mut self, path: &str, entry: Entry) {
    let key = normalize(path);
    if key.is_empty() {
      return;
    }
    self.ensure_parents(&key);
    if !matches!(entry, Entry::Dir { .. }) {
      self.remove(&key);
    }
    self.entries.insert(key, entry);
  }

  /// Remove an entry and everything below it. Removing the root empties
  /// the tree.
  pub fn remove(&mut self, path: &str) {
    let key = normalize(path);
    self.entries.retain(|k, _| !is_within(k, &key));
  }

  fn ensure_parents(&mut self, key: &str) {
    let mut current = parent(key);
    let mut missing = Vec::new();
    while let Some(dir) = current {
      match self.entries.get(dir) {
        Some(Entry::Dir { .. }) => break,
        Some(_) => {
          self.entries.remove(dir);
          missing.push(dir.to_string());
        }
        None => missing.push(dir.to_string()),
      }
      current = parent(dir);
    }
    for dir in missing {
      self.entries.insert(dir, Entry::Dir { mode: DIR_MODE });
    }
  }

  fn require_parent(&self, key: &str) -> Result<(), EvalError> {
    match parent(key) {
      Some(dir) if !self.is_dir(dir) => Err(EvalError::NotFound(format!("/{dir}"))),
      _ => Ok(()),
    }
  }

  pub fn mkdir(&mut self, path: &str, mode: u32, make_parents: bool) -> Result<(), EvalError> {
    let key = normalize(path);
    if key.is_empty() {
      return Ok(());
    }
    match self.entries.get(&key) {
      Some(Entry::Dir { .. }) if make_parents => return Ok(()),
      Some(Entry::Dir { .. }) => return Err(EvalError::AlreadyExists(format!("/{key}"))),
      Some(_) => return Err(EvalError::NotADirectory(format!("/{key}"))),
      None => {}
    }
    if !make_parents {
      self.require_parent(&key)?;
    }
    self.insert(&key, Entry::Dir { mode });
    Ok(())
  }

  pub fn mkfile(&mut self, path: &str, mode: u32, data: Vec<u8>) -> Result<(), EvalError> {
    let key = normalize(path);
    if key.is_empty() || self.is_dir(&key) {
      return Err(EvalError::NotADirectory(format!("/{key}")));
    }
    self.require_parent(&key)?;
    self.insert(&key, Entry::File { mode, data });
    Ok(())
  }

  /// Copy `src_path` of `src` to `dest_path` in this tree.
  ///
  /// Directories copy their contents into the destination directory. A file
  /// lands at `dest_path`, or under it keeping its base name when the
  /// destination ends in `/` or is an existing directory. Missing parents
  /// of the destination are created.
  pub fn copy_from(&mut self, src: &Tree, src_path: &str, dest_path: &str) -> Result<(), EvalError> {
    let src_key = normalize(src_path);
    let dest_key = normalize(dest_path);

    if src.is_dir(&src_key) {
      if !self.is_dir(&dest_key) {
        self.insert(&dest_key, Entry::Dir { mode: DIR_MODE });
      }
      for (path, entry) in src.entries() {
        if path == src_key || !is_within(path, &src_key) {
          continue;
        }
        let rel = if src_key.is_empty() {
          path
        } else {
          &path[src_key.len() + 1..]
        };
        self.insert(&join(&dest_key, rel), entry.clone());
      }
      return Ok(());
    }

    let entry = src
      .entries
      .get(&src_key)
      .ok_or_else(|| EvalError::NotFound(format!("/{src_key}")))?;
    let target = if dest_path.ends_with('/') || self.is_dir(&dest_key) {
      join(&dest_key, basename(&src_key))
    } else {
      dest_key
    };
    self.insert(&target, entry.clone());
    Ok(())
  }

  /// Overlay `upper` on this tree; entries of `upper` win.
  pub fn overlay(&mut self, upper: &Tree) {
    for (path, entry) in upper.entries() {
      match (self.entries.get(path), entry) {
        (Some(Entry::Dir { .. }), Entry::Dir { mode }) => {
          self.entries.insert(path.to_string(), Entry::Dir { mode: *mode });
        }
        _ => self.insert(path, entry.clone()),
      }
    }
  }

  /// Entries of `upper` that are absent from or different in `lower`.
  pub fn diff(lower: &Tree, upper: &Tree) -> Tree {
    Tree {
      entries: upper
        .entries
        .iter()
        .filter(|(path, entry)| lower.entries.get(*path) != Some(entry))
        .map(|(path, entry)| (path.clone(), entry.clone()))
        .collect(),
    }
  }

  /// The part of this tree under `path`, re-rooted.
  pub fn subtree(&self, path: &str) -> Result<Tree, EvalError> {
    let key = normalize(path);
    if !self.is_dir(&key) {
      return Err(EvalError::NotFound(format!("/{key}")));
    }
    let mut tree = Tree::new();
    tree.copy_from(self, &key, "/")?;
    Ok(tree)
  }
}
