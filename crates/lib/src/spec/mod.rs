//! Package specs.
//!
//! A spec is the YAML document a build is driven by. It is read from the
//! entrypoint of the build context, has build args substituted into it,
//! and is validated before any graph is compiled from it.

pub mod args;
mod load;
mod types;

pub use load::*;
pub use types::*;
