//! Target pipelines and metadata renderers.

pub mod deb;
pub mod debug;
mod pipeline;
pub mod rpm;
mod types;

pub use pipeline::*;
pub use types::*;
