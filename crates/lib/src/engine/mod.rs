//! The build engine as seen from the frontend.
//!
//! The frontend never executes anything itself: it reads its inputs
//! through an [`EngineClient`] and hands compiled graphs back to it.

mod client;
pub mod local;
mod types;

pub use client::*;
pub use local::LocalEngine;
pub use types::*;
