use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One operation of the instruction graph.
///
/// The type parameter is how an operation refers to its inputs: in-memory
/// graphs use [`State`](super::State) handles, marshaled graphs use
/// [`InputRef`](super::InputRef) digests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Op<I> {
  /// The empty filesystem.
  Scratch,
  /// Content fetched or provided by the engine.
  Source(SourceOp),
  /// A filesystem action applied on top of `base`.
  File { base: I, action: FileAction<I> },
  /// A process run on top of `rootfs` with extra mounts.
  Exec(ExecOp<I>),
  /// Overlay of `inputs` in order; later inputs win on conflicting paths.
  Merge { inputs: Vec<I> },
  /// The content of `upper` that is added or changed relative to `lower`.
  Diff { lower: I, upper: I },
}

/// Leaf operations whose content comes from outside the graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceOp {
  Git {
    remote: String,
    reference: String,
    keep_git_dir: bool,
  },
  Http {
    url: String,
    checksum: Option<String>,
    filename: String,
    mode: u32,
  },
  Image {
    reference: String,
  },
  Local {
    name: String,
    includes: Vec<String>,
    excludes: Vec<String>,
  },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileAction<I> {
  Mkdir {
    path: String,
    mode: u32,
    make_parents: bool,
  },
  Mkfile {
    path: String,
    mode: u32,
    #[serde(with = "hex_bytes")]
    data: Vec<u8>,
  },
  /// Copy `src_path` of `src` to `dest_path`.
  ///
  /// A directory copies its contents into the destination. A file copied to
  /// a destination ending in `/` keeps its base name.
  Copy {
    src: I,
    src_path: String,
    dest_path: String,
  },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecOp<I> {
  pub rootfs: I,
  pub args: Vec<String>,
  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub env: BTreeMap<String, String>,
  pub cwd: String,
  pub mounts: Vec<Mount<I>>,
}

impl<I> ExecOp<I> {
  /// Number of outputs: the rootfs plus one per writable mount.
  pub fn output_count(&self) -> usize {
    1 + self.mounts.iter().filter(|m| !m.readonly).count()
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mount<I> {
  pub dest: String,
  pub input: I,
  pub readonly: bool,
}

impl<I> Op<I> {
  /// Short name of the operation kind, used in logs and statistics.
  pub fn kind(&self) -> &'static str {
    match self {
      Op::Scratch => "scratch",
      Op::Source(_) => "source",
      Op::File { action, .. } => match action {
        FileAction::Mkdir { .. } => "mkdir",
        FileAction::Mkfile { .. } => "mkfile",
        FileAction::Copy { .. } => "copy",
      },
      Op::Exec(_) => "exec",
      Op::Merge { .. } => "merge",
      Op::Diff { .. } => "diff",
    }
  }

  /// Number of outputs this operation produces.
  pub fn output_count(&self) -> usize {
    match self {
      Op::Exec(exec) => exec.output_count(),
      _ => 1,
    }
  }

  /// All inputs, in the order they appear in the operation.
  pub fn inputs(&self) -> Vec<&I> {
    match self {
      Op::Scratch | Op::Source(_) => Vec::new(),
      Op::File { base, action } => match action {
        FileAction::Copy { src, .. } => vec![base, src],
        _ => vec![base],
      },
      Op::Exec(exec) => std::iter::once(&exec.rootfs)
        .chain(exec.mounts.iter().map(|m| &m.input))
        .collect(),
      Op::Merge { inputs } => inputs.iter().collect(),
      Op::Diff { lower, upper } => vec![lower, upper],
    }
  }

  /// Rebuild the operation with every input mapped through `f`, in the
  /// same order as [`inputs`](Self::inputs).
  pub fn try_map_inputs<J, E>(&self, f: &mut impl FnMut(&I) -> Result<J, E>) -> Result<Op<J>, E> {
    Ok(match self {
      Op::Scratch => Op::Scratch,
      Op::Source(source) => Op::Source(source.clone()),
      Op::File { base, action } => {
        let base = f(base)?;
        let action = match action {
          FileAction::Mkdir {
            path,
            mode,
            make_parents,
          } => FileAction::Mkdir {
            path: path.clone(),
            mode: *mode,
            make_parents: *make_parents,
          },
          FileAction::Mkfile { path, mode, data } => FileAction::Mkfile {
            path: path.clone(),
            mode: *mode,
            data: data.clone(),
          },
          FileAction::Copy {
            src,
            src_path,
            dest_path,
          } => FileAction::Copy {
            src: f(src)?,
            src_path: src_path.clone(),
            dest_path: dest_path.clone(),
          },
        };
        Op::File { base, action }
      }
      Op::Exec(exec) => {
        let rootfs = f(&exec.rootfs)?;
        let mut mounts = Vec::with_capacity(exec.mounts.len());
        for mount in &exec.mounts {
          mounts.push(Mount {
            dest: mount.dest.clone(),
            input: f(&mount.input)?,
            readonly: mount.readonly,
          });
        }
        Op::Exec(ExecOp {
          rootfs,
          args: exec.args.clone(),
          env: exec.env.clone(),
          cwd: exec.cwd.clone(),
          mounts,
        })
      }
      Op::Merge { inputs } => {
        let mut mapped = Vec::with_capacity(inputs.len());
        for input in inputs {
          mapped.push(f(input)?);
        }
        Op::Merge { inputs: mapped }
      }
      Op::Diff { lower, upper } => Op::Diff {
        lower: f(lower)?,
        upper: f(upper)?,
      },
    })
  }
}

/// Hex encoding for inline file data so definitions stay readable JSON.
mod hex_bytes {
  use serde::{Deserialize, Deserializer, Serializer};

  pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&hex::encode(data))
  }

  pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
    let s = String::deserialize(deserializer)?;
    hex::decode(s).map_err(serde::de::Error::custom)
  }
}
