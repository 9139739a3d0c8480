//! Built-in render passes

pub mod color_lookup;
pub mod debug_view;
pub mod lighting;
pub mod material_depth;
pub mod material_tile;
pub mod tile_classification;
pub mod visibility;

pub use color_lookup::ColorLookupPass;
pub use debug_view::FullScreenDebugPass;
pub use lighting::LightingPass;
pub use material_depth::MaterialDepthPass;
pub use material_tile::MaterialTilePass;
pub use tile_classification::TileClassificationPass;
pub use visibility::{cluster_draws, ClusterDraw, VisibilityPass};

use crate::graph::RenderGraph;
use crate::tiles::{ReductionConfig, LIGHT_TILE_SIZE, TILE_SIZE};
use crate::Result;

pub const VBUFFER_PREPASS: &str = "VBuffer Prepass";
pub const MATERIAL_DEPTH_PASS: &str = "Create Vis Buffer Material Depth";
pub const TILE_CLASSIFICATION_PASS: &str = "Create VBuffer Tiles";
pub const MATERIAL_TILE_PASS: &str = "Create Material Tile";
pub const LIGHTING_PASS: &str = "VBuffer Lighting";
pub const COLOR_LOOKUP_PASS: &str = "Color Lookup";
pub const FULL_SCREEN_DEBUG_PASS: &str = "Full Screen Debug";

/// Graph handles of the textures exchanged between passes
pub mod handles {
    use crate::graph::ResourceHandle;

    pub const VBUFFER: &str = "VBuffer 0";
    pub const CAMERA_DEPTH: &str = "Camera Depth";
    pub const MATERIAL_DEPTH: &str = "Material Depth";
    pub const TILE_CLASSIFICATION: &str = "Tile classification";
    pub const MATERIAL_TILE: &str = "Material Tile classification";
    pub const BUCKET_ID: &str = "Bucket ID";
    pub const COLOR_BUFFER: &str = "Color buffer";
    pub const MATERIAL_MASK: &str = "Material mask";
    pub const BUCKET_MASK: &str = "Bucket mask";
    pub const OUTPUT: &str = "Final Color";
    pub const USER_LUT: &str = "User LUT";

    pub fn vbuffer() -> ResourceHandle {
        ResourceHandle::named(VBUFFER)
    }

    pub fn camera_depth() -> ResourceHandle {
        ResourceHandle::named(CAMERA_DEPTH)
    }

    pub fn material_depth() -> ResourceHandle {
        ResourceHandle::named(MATERIAL_DEPTH)
    }

    pub fn tile_classification() -> ResourceHandle {
        ResourceHandle::named(TILE_CLASSIFICATION)
    }

    pub fn material_tile() -> ResourceHandle {
        ResourceHandle::named(MATERIAL_TILE)
    }

    pub fn bucket_id() -> ResourceHandle {
        ResourceHandle::named(BUCKET_ID)
    }

    pub fn color_buffer() -> ResourceHandle {
        ResourceHandle::named(COLOR_BUFFER)
    }

    /// Intermediate material mask of reduction level `level`
    pub fn material_mask(level: usize) -> ResourceHandle {
        ResourceHandle::indexed(MATERIAL_MASK, level)
    }

    /// Intermediate bucket mask of reduction level `level`
    pub fn bucket_mask(level: usize) -> ResourceHandle {
        ResourceHandle::indexed(BUCKET_MASK, level)
    }

    /// Final target supplied by the caller each frame
    pub fn output() -> ResourceHandle {
        ResourceHandle::named(OUTPUT)
    }

    pub fn user_lut() -> ResourceHandle {
        ResourceHandle::named(USER_LUT)
    }
}

/// Sizing shared by the tiled passes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassSettings {
    /// Classification and lighting tile size in pixels
    pub tile_size: u32,
    /// Granularity of the light feature flag buffer
    pub light_tile_size: u32,
    pub reduction: ReductionConfig,
}

impl Default for PassSettings {
    fn default() -> Self {
        Self {
            tile_size: TILE_SIZE,
            light_tile_size: LIGHT_TILE_SIZE,
            reduction: ReductionConfig::default(),
        }
    }
}

/// Register every VBuffer pass and build the graph
///
/// The output target and the user LUT are imported; the caller binds them
/// when the frame is executed.
pub fn register_passes(graph: &mut RenderGraph, settings: &PassSettings) -> Result<()> {
    graph.import(handles::output());
    graph.import(handles::user_lut());

    graph.add_pass(VisibilityPass::new());
    graph.add_pass(MaterialDepthPass::new());
    graph.add_pass(TileClassificationPass::new(settings.tile_size, settings.light_tile_size));
    graph.add_pass(MaterialTilePass::new(settings.reduction.clone()));
    graph.add_pass(LightingPass::new(settings.tile_size));
    graph.add_pass(ColorLookupPass::new());
    graph.add_pass(FullScreenDebugPass::new());

    graph.build()
}

