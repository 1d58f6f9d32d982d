use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use super::{Definition, ExecOp, FileAction, GraphError, Mount, Op, SourceOp};

/// A node of an in-memory graph.
#[derive(Debug)]
pub struct Node {
  pub op: Op<State>,
  pub description: Option<String>,
}

/// An immutable handle to one output of a graph node.
///
/// Every operation returns a new state; existing states are never modified,
/// so a state can be shared freely between graph branches.
#[derive(Clone)]
pub struct State {
  pub(crate) node: Arc<Node>,
  pub(crate) output: usize,
}

impl fmt::Debug for State {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("State")
      .field("op", &self.node.op.kind())
      .field("output", &self.output)
      .field("description", &self.node.description)
      .finish()
  }
}

impl State {
  fn from_op(op: Op<State>, description: Option<String>) -> Self {
    Self {
      node: Arc::new(Node { op, description }),
      output: 0,
    }
  }

  /// The empty filesystem.
  pub fn scratch() -> Self {
    Self::from_op(Op::Scratch, None)
  }

  pub fn git(remote: impl Into<String>, reference: impl Into<String>, keep_git_dir: bool) -> Self {
    Self::from_op(
      Op::Source(SourceOp::Git {
        remote: remote.into(),
        reference: reference.into(),
        keep_git_dir,
      }),
      None,
    )
  }

  /// A single downloaded file named `filename` at the root.
  pub fn http(url: impl Into<String>, checksum: Option<String>, filename: impl Into<String>, mode: u32) -> Self {
    Self::from_op(
      Op::Source(SourceOp::Http {
        url: url.into(),
        checksum,
        filename: filename.into(),
        mode,
      }),
      None,
    )
  }

  pub fn image(reference: impl Into<String>) -> Self {
    Self::from_op(
      Op::Source(SourceOp::Image {
        reference: reference.into(),
      }),
      None,
    )
  }

  /// A named local build context.
  pub fn local(name: impl Into<String>, includes: Vec<String>, excludes: Vec<String>) -> Self {
    Self::from_op(
      Op::Source(SourceOp::Local {
        name: name.into(),
        includes,
        excludes,
      }),
      None,
    )
  }

  /// Apply a file action on top of this state.
  pub fn file(&self, action: FileAction<State>, description: impl Into<String>) -> Self {
    Self::from_op(
      Op::File {
        base: self.clone(),
        action,
      },
      Some(description.into()),
    )
  }

  pub fn mkdir(&self, path: impl Into<String>, mode: u32, make_parents: bool, description: impl Into<String>) -> Self {
    self.file(
      FileAction::Mkdir {
        path: path.into(),
        mode,
        make_parents,
      },
      description,
    )
  }

  pub fn mkfile(&self, path: impl Into<String>, mode: u32, data: Vec<u8>, description: impl Into<String>) -> Self {
    self.file(
      FileAction::Mkfile {
        path: path.into(),
        mode,
        data,
      },
      description,
    )
  }

  /// Copy `src_path` of `src` into this state at `dest_path`.
  pub fn copy(
    &self,
    src: &State,
    src_path: impl Into<String>,
    dest_path: impl Into<String>,
    description: impl Into<String>,
  ) -> Self {
    self.file(
      FileAction::Copy {
        src: src.clone(),
        src_path: src_path.into(),
        dest_path: dest_path.into(),
      },
      description,
    )
  }

  /// Run a process with this state as its root filesystem.
  pub fn run(&self, exec: Exec) -> ExecState {
    let op = Op::Exec(ExecOp {
      rootfs: self.clone(),
      args: exec.args,
      env: exec.env,
      cwd: exec.cwd,
      mounts: exec.mounts,
    });
    ExecState {
      node: Arc::new(Node {
        op,
        description: exec.description,
      }),
    }
  }

  /// Overlay `inputs` in order.
  pub fn merge(inputs: Vec<State>, description: impl Into<String>) -> Self {
    Self::from_op(Op::Merge { inputs }, Some(description.into()))
  }

  /// The changes that turn `lower` into `upper`.
  pub fn diff(lower: &State, upper: &State, description: impl Into<String>) -> Self {
    Self::from_op(
      Op::Diff {
        lower: lower.clone(),
        upper: upper.clone(),
      },
      Some(description.into()),
    )
  }

  pub fn op(&self) -> &Op<State> {
    &self.node.op
  }

  pub fn output(&self) -> usize {
    self.output
  }

  pub fn description(&self) -> Option<&str> {
    self.node.description.as_deref()
  }

  /// Serialize the graph rooted at this state.
  pub fn marshal(&self) -> Result<Definition, GraphError> {
    Definition::from_state(self)
  }
}

/// Builder for an exec operation.
#[derive(Debug, Default)]
pub struct Exec {
  args: Vec<String>,
  env: BTreeMap<String, String>,
  cwd: String,
  mounts: Vec<Mount<State>>,
  description: Option<String>,
}

impl Exec {
  pub fn new<I, S>(args: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    Self {
      args: args.into_iter().map(Into::into).collect(),
      cwd: "/".to_string(),
      ..Default::default()
    }
  }

  pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
    self.env.insert(key.into(), value.into());
    self
  }

  pub fn cwd(mut self, cwd: impl Into<String>) -> Self {
    self.cwd = cwd.into();
    self
  }

  pub fn readonly_mount(mut self, dest: impl Into<String>, input: State) -> Self {
    self.mounts.push(Mount {
      dest: dest.into(),
      input,
      readonly: true,
    });
    self
  }

  /// A writable mount; its final content becomes an output of the exec.
  pub fn mount(mut self, dest: impl Into<String>, input: State) -> Self {
    self.mounts.push(Mount {
      dest: dest.into(),
      input,
      readonly: false,
    });
    self
  }

  pub fn description(mut self, description: impl Into<String>) -> Self {
    self.description = Some(description.into());
    self
  }
}

/// The outputs of an exec operation.
#[derive(Debug, Clone)]
pub struct ExecState {
  node: Arc<Node>,
}

impl ExecState {
  /// The root filesystem after the process ran.
  pub fn root(&self) -> State {
    State {
      node: self.node.clone(),
      output: 0,
    }
  }

  /// The content of the writable mount at `dest` after the process ran.
  pub fn mount(&self, dest: &str) -> Option<State> {
    let Op::Exec(exec) = &self.node.op else {
      return None;
    };
    exec
      .mounts
      .iter()
      .filter(|m| !m.readonly)
      .position(|m| m.dest == dest)
      .map(|index| State {
        node: self.node.clone(),
        output: index + 1,
      })
  }
}
