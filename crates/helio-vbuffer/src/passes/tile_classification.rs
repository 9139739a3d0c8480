//! Light tile classification - reduces light feature flags to one texel per tile

use super::{handles, TILE_CLASSIFICATION_PASS};
use crate::debug::{DebugTexture, FullScreenDebugMode};
use crate::graph::{FrameContext, FrameResources, PassResourceBuilder, RenderPass};
use crate::pipeline::{Kernel, CLASSIFICATION_TILE, TILE_CLASSIFICATION_FORMAT};
use crate::recipe::{Binding, BufferSlot, Command, Dispatch, PassConstants, PassRecipe, TextureLifetime, TextureRequest};
use crate::tiles::{TileGrid, CLASSIFICATION_GROUP_SIZE};

/// Creates `Tile classification` (Rg32Uint, `x` = flag union, `y` = variant bits)
pub struct TileClassificationPass {
    tile_size: u32,
    light_tile_size: u32,
}

impl TileClassificationPass {
    pub fn new(tile_size: u32, light_tile_size: u32) -> Self {
        Self { tile_size, light_tile_size }
    }
}

impl RenderPass for TileClassificationPass {
    fn name(&self) -> &str {
        TILE_CLASSIFICATION_PASS
    }

    fn declare_resources(&self, builder: &mut PassResourceBuilder) {
        builder.create(handles::tile_classification());
    }

    fn record(&self, frame: &FrameContext, _resources: &FrameResources) -> Option<PassRecipe> {
        if frame.extent.is_empty() {
            return None;
        }
        let grid = TileGrid::cover(frame.extent, self.tile_size);
        // Without uploaded flags the kernel reads nothing and writes zeros.
        let light_grid = frame.feature_grid.map_or([0, 0], |grid| grid.as_array());
        if frame.feature_grid.is_none() {
            log::trace!("No light tile feature flags, classifying as unlit");
        }

        let mut recipe = PassRecipe::compute();
        recipe
            .create_texture(TextureRequest {
                handle: handles::tile_classification(),
                label: handles::TILE_CLASSIFICATION,
                extent: grid.counts(),
                format: TILE_CLASSIFICATION_FORMAT,
                usage: wgpu::TextureUsages::STORAGE_BINDING | wgpu::TextureUsages::TEXTURE_BINDING,
                lifetime: TextureLifetime::Frame,
            })
            .push(Command::Dispatch(Dispatch {
                kernel: Kernel::LightTileClassification,
                groups: grid.dispatch_groups(CLASSIFICATION_GROUP_SIZE),
                bindings: vec![
                    Binding::buffer(BufferSlot::TileFeatureFlags),
                    Binding::storage(CLASSIFICATION_TILE, handles::tile_classification()),
                ],
                constants: PassConstants {
                    tile_count: grid.counts().as_array(),
                    tile_size: self.tile_size,
                    // Light tiles per classification tile edge
                    fan_in: (self.tile_size / self.light_tile_size.max(1)).max(1),
                    extent: frame.extent.as_array(),
                    params: light_grid,
                    ..Default::default()
                },
            }))
            .export_debug(
                FullScreenDebugMode::VBufferTileClassification,
                DebugTexture {
                    handle: handles::tile_classification(),
                    format: TILE_CLASSIFICATION_FORMAT,
                    scale: self.tile_size,
                },
            );
        Some(recipe)
    }
}
