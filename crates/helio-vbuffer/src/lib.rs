//! Helio VBuffer - visibility-buffer (deferred material) rendering on wgpu
//!
//! The pipeline rasterizes compacted cluster geometry into a single-channel
//! identifier buffer and resolves materials afterwards:
//!
//! - Visibility prepass writes `(instance, triangle)` ids plus depth
//! - Material depth turns the ids into a depth-encoded material key
//! - Light tile classification reduces light feature flags to 64x64 tiles
//! - Material tile classification reduces ids to per-tile material ranges
//!   and bucket masks through a configurable N-level reduction
//! - VBuffer lighting shades each material with three light variants
//!
//! Passes only produce [`recipe::PassRecipe`]s; the [`graph::RenderGraph`]
//! orders them and the [`executor::WgpuExecutor`] submits them, so a whole
//! frame can be planned and inspected without a GPU.

pub mod classify;
pub mod color_lookup;
pub mod debug;
pub mod executor;
pub mod geometry;
pub mod graph;
pub mod material;
pub mod passes;
pub mod pipeline;
pub mod recipe;
pub mod resources;
pub mod tiles;
pub mod variants;

mod camera;
mod renderer;

pub use camera::Camera;
pub use color_lookup::{ColorLookup, LutDesc, LutDimension};
pub use debug::{DebugDisplaySettings, FullScreenDebugMode};
pub use geometry::{ClusterBatches, ClusterFacing, CompactedGeometry, CompactedVertex, InstanceVData};
pub use material::{MaterialDesc, MaterialHandle, MaterialParams, MaterialRegistry, SurfaceType, Techniques};
pub use renderer::{GpuLight, LightKind, Renderer, RendererConfig, SceneLight};
pub use tiles::{Extent, ReductionConfig, TileGrid};
pub use variants::{LightFeatureFlags, LightVariant};

/// Result type for renderer operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during rendering
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Graph error: {0}")]
    Graph(String),

    #[error("Pipeline error: {0}")]
    Pipeline(String),

    #[error("Resource error: {0}")]
    Resource(String),

    #[error("Material error: {0}")]
    Material(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Shader error: {0}")]
    Shader(String),

    #[error("WGPU error: {0}")]
    Wgpu(String),
}

impl From<wgpu::Error> for Error {
    fn from(err: wgpu::Error) -> Self {
        Error::Wgpu(err.to_string())
    }
}
