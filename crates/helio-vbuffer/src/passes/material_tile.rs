//! Material tile classification - N-level reduction of the VBuffer
//!
//! Level 0 scans `fan_in` x `fan_in` pixel blocks of the VBuffer and records
//! the material range and bucket mask of each block. Every later level merges
//! `fan_in` x `fan_in` texels of the previous one. Only the last level's maps
//! outlive the pass; the intermediate levels are transient.

use super::{handles, MATERIAL_TILE_PASS};
use crate::debug::{DebugTexture, FullScreenDebugMode};
use crate::graph::{FrameContext, FrameResources, PassResourceBuilder, RenderPass, ResourceHandle};
use crate::pipeline::{
    Kernel, BUCKET_TILE, BUCKET_TILE_INPUT, CLASSIFICATION_TILE, CLASSIFICATION_TILE_INPUT, TILE_MAP_FORMAT, VBUFFER0,
};
use crate::recipe::{Binding, BufferSlot, Command, Dispatch, PassConstants, PassRecipe, TextureLifetime, TextureRequest};
use crate::tiles::{ReductionConfig, ReductionPlan, ReductionStage};

/// Creates `Material Tile classification` and `Bucket ID`
pub struct MaterialTilePass {
    reduction: ReductionConfig,
}

impl MaterialTilePass {
    pub fn new(reduction: ReductionConfig) -> Self {
        Self { reduction }
    }

    /// Output handles of reduction level `index`
    fn level_outputs(&self, index: usize) -> (ResourceHandle, ResourceHandle) {
        if index + 1 == self.reduction.levels() {
            (handles::material_tile(), handles::bucket_id())
        } else {
            (handles::material_mask(index), handles::bucket_mask(index))
        }
    }
}

impl RenderPass for MaterialTilePass {
    fn name(&self) -> &str {
        MATERIAL_TILE_PASS
    }

    fn declare_resources(&self, builder: &mut PassResourceBuilder) {
        builder
            .read(handles::vbuffer())
            .create(handles::material_tile())
            .create(handles::bucket_id());
        for level in 0..self.reduction.levels().saturating_sub(1) {
            builder
                .create_transient(handles::material_mask(level))
                .create_transient(handles::bucket_mask(level));
        }
    }

    fn record(&self, frame: &FrameContext, _resources: &FrameResources) -> Option<PassRecipe> {
        let plan = ReductionPlan::new(frame.extent, &self.reduction);
        if plan.is_empty() || frame.extent.is_empty() {
            return None;
        }

        let mut recipe = PassRecipe::compute();
        let usage = wgpu::TextureUsages::STORAGE_BINDING | wgpu::TextureUsages::TEXTURE_BINDING;
        let mut tile_size = 1;
        let mut previous: Option<(ResourceHandle, ResourceHandle)> = None;

        for level in plan.levels() {
            tile_size *= level.fan_in;
            let (materials, buckets) = self.level_outputs(level.index);
            let lifetime = if level.index + 1 == plan.len() {
                TextureLifetime::Frame
            } else {
                TextureLifetime::Transient
            };
            let (material_label, bucket_label) = match lifetime {
                TextureLifetime::Frame => (handles::MATERIAL_TILE, handles::BUCKET_ID),
                TextureLifetime::Transient => (handles::MATERIAL_MASK, handles::BUCKET_MASK),
            };
            for (handle, label) in [(materials, material_label), (buckets, bucket_label)] {
                recipe.create_texture(TextureRequest {
                    handle,
                    label,
                    extent: level.output,
                    format: TILE_MAP_FORMAT,
                    usage,
                    lifetime,
                });
            }

            let (kernel, mut bindings) = match (level.stage, previous) {
                (ReductionStage::Tiles, Some((input_materials, input_buckets))) => (
                    Kernel::FinalReduction { fan_in: level.fan_in },
                    vec![
                        Binding::texture(CLASSIFICATION_TILE_INPUT, input_materials),
                        Binding::texture(BUCKET_TILE_INPUT, input_buckets),
                    ],
                ),
                _ => (
                    Kernel::MaterialReduction { fan_in: level.fan_in },
                    vec![
                        Binding::texture(VBUFFER0, handles::vbuffer()),
                        Binding::buffer(BufferSlot::InstanceVData),
                        Binding::buffer(BufferSlot::Materials),
                    ],
                ),
            };
            bindings.push(Binding::storage(CLASSIFICATION_TILE, materials));
            bindings.push(Binding::storage(BUCKET_TILE, buckets));

            log::trace!(
                "Material reduction level {}: {}x{} -> {}x{}",
                level.index,
                level.input.width,
                level.input.height,
                level.output.width,
                level.output.height
            );
            recipe.push(Command::Dispatch(Dispatch {
                kernel,
                groups: level.dispatch_groups(),
                bindings,
                constants: PassConstants {
                    tile_count: level.output.as_array(),
                    tile_size,
                    fan_in: level.fan_in,
                    extent: level.input.as_array(),
                    ..Default::default()
                },
            }));
            previous = Some((materials, buckets));
        }

        recipe
            .export_debug(
                FullScreenDebugMode::VBufferMaterialTile,
                DebugTexture { handle: handles::material_tile(), format: TILE_MAP_FORMAT, scale: tile_size },
            )
            .export_debug(
                FullScreenDebugMode::VBufferBucketId,
                DebugTexture { handle: handles::bucket_id(), format: TILE_MAP_FORMAT, scale: tile_size },
            );
        Some(recipe)
    }
}
