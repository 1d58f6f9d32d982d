//! Package sources: where inputs come from and how they become graph
//! states.

mod resolve;
mod types;

pub use resolve::*;
pub use types::*;
