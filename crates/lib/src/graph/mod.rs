//! Instruction graphs.
//!
//! Graphs are built in memory as immutable [`State`] handles, marshaled to
//! a content-addressed [`Definition`] for submission, and can be evaluated
//! against an in-memory [`Tree`] for local builds and tests.

mod definition;
mod eval;
mod state;
mod tree;
mod types;

pub use definition::*;
pub use eval::*;
pub use state::*;
pub use tree::*;
pub use types::*;
