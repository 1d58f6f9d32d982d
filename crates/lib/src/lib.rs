//! pkgraph-lib: a build-graph compiler frontend for packaging.
//!
//! A package spec (YAML) is compiled into a content-addressed instruction
//! graph that lays out an OS-packager input tree:
//! - `BuildMux`: routes target names to handlers or forwards them to
//!   another frontend
//! - `spec`: loads the spec and substitutes build args
//! - `source`: turns source descriptors into graph states
//! - `compile`: builds the `SOURCES/` + `SPECS/` graph with either the
//!   merge/diff or the in-place strategy
//! - `frontend`: drives a build session across platforms

pub mod archive;
pub mod compile;
pub mod config;
pub mod consts;
pub mod engine;
pub mod error;
pub mod frontend;
pub mod graph;
pub mod materialize;
pub mod mux;
pub mod platform;
pub mod source;
pub mod spec;
pub mod target;
pub mod util;
