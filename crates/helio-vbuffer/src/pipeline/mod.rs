//! Pipeline management system

mod cache;
mod program;

pub use cache::{ComputeEntry, PipelineCache, PipelineKey, RenderEntry};
pub use program::*;
