//! VBuffer lighting - per-material, per-variant tiled shading
//!
//! For every material with the VBuffer lighting technique the pass covers
//! the screen with one quad per tile and draws it three times, once per
//! lighting variant. The vertex stage drops tiles whose material range,
//! bucket mask or variant do not match the draw, and the `Equal` test
//! against the material depth keeps only that material's pixels.

use super::{handles, LIGHTING_PASS};
use crate::debug::{DebugTexture, FullScreenDebugMode};
use crate::graph::{FrameContext, FrameResources, PassResourceBuilder, RenderPass};
use crate::material::MaterialDesc;
use crate::pipeline::{
    Program, BUCKET_TILE_INPUT, CLASSIFICATION_TILE_INPUT, HDR_FORMAT, TILE_CLASSIFICATION, VBUFFER0, VBUFFER_DEPTH,
};
use crate::recipe::{
    Binding, BufferSlot, ColorAttachment, Command, DepthAccess, DepthAttachment, DrawCall, PassConstants, PassRecipe,
    TextureLifetime, TextureRequest, Viewport,
};
use crate::tiles::TileGrid;
use crate::variants::{KeywordState, LightVariant};

/// Vertices of one tile quad
pub const TILE_QUAD_VERTICES: u32 = 6;

/// Creates the HDR `Color buffer`
pub struct LightingPass {
    tile_size: u32,
}

impl LightingPass {
    pub fn new(tile_size: u32) -> Self {
        Self { tile_size }
    }

    /// Three variant draws for one material
    fn push_material(
        &self,
        recipe: &mut PassRecipe,
        keywords: &mut KeywordState,
        desc: &MaterialDesc,
        grid: &TileGrid,
        frame: &FrameContext,
    ) {
        for variant in LightVariant::ALL {
            let enabled = keywords.enable_exclusive(variant);
            recipe.push(Command::Draw(DrawCall {
                program: Program::VBufferLighting(variant),
                vertex_count: TILE_QUAD_VERTICES,
                instances: 0..grid.tile_count(),
                keywords: enabled,
                constants: PassConstants {
                    material_id: desc.global_id,
                    bucket_id: desc.bucket_id,
                    variant: variant.index(),
                    tile_count: grid.counts().as_array(),
                    tile_size: self.tile_size,
                    extent: frame.extent.as_array(),
                    params: [frame.light_count, 0],
                    ..Default::default()
                },
            }));
        }
        // Variant keywords must not leak into the next material.
        keywords.clear();
    }
}

impl RenderPass for LightingPass {
    fn name(&self) -> &str {
        LIGHTING_PASS
    }

    fn declare_resources(&self, builder: &mut PassResourceBuilder) {
        builder
            .read(handles::vbuffer())
            .read(handles::camera_depth())
            .read(handles::material_depth())
            .read(handles::tile_classification())
            .read(handles::material_tile())
            .read(handles::bucket_id())
            .create(handles::color_buffer());
    }

    fn record(&self, frame: &FrameContext, _resources: &FrameResources) -> Option<PassRecipe> {
        let grid = TileGrid::cover(frame.extent, self.tile_size);

        let mut recipe = PassRecipe::raster(
            vec![ColorAttachment { handle: handles::color_buffer(), load: wgpu::LoadOp::Clear(frame.clear_color) }],
            Some(DepthAttachment {
                handle: handles::material_depth(),
                load: wgpu::LoadOp::Load,
                access: DepthAccess::Read,
            }),
        );
        recipe
            .create_texture(TextureRequest {
                handle: handles::color_buffer(),
                label: handles::COLOR_BUFFER,
                extent: frame.extent,
                format: HDR_FORMAT,
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
                lifetime: TextureLifetime::Frame,
            })
            .bind(Binding::texture(VBUFFER0, handles::vbuffer()))
            .bind(Binding::texture(VBUFFER_DEPTH, handles::camera_depth()))
            .bind(Binding::buffer(BufferSlot::CompactedVertices))
            .bind(Binding::buffer(BufferSlot::CompactedIndices))
            .bind(Binding::buffer(BufferSlot::InstanceVData))
            .bind(Binding::buffer(BufferSlot::Materials))
            .bind(Binding::buffer(BufferSlot::Lights))
            .bind(Binding::texture(TILE_CLASSIFICATION, handles::tile_classification()))
            .bind(Binding::texture(CLASSIFICATION_TILE_INPUT, handles::material_tile()))
            .bind(Binding::texture(BUCKET_TILE_INPUT, handles::bucket_id()));

        let mut keywords = KeywordState::new();
        let mut lit = 0;
        for (handle, desc) in frame.materials.iter() {
            if !desc.is_vbuffer_lit() {
                log::trace!("Material '{}' ({:?}) has no VBuffer lighting technique", desc.name, handle);
                continue;
            }
            // The covered grid may exceed the screen; the shader discards the overhang.
            recipe.push(Command::SetViewport(Viewport::covering(grid.covered_extent())));
            self.push_material(&mut recipe, &mut keywords, desc, &grid, frame);
            lit += 1;
        }
        log::trace!("VBuffer lighting: {} materials over {} tiles", lit, grid.tile_count());

        recipe.export_debug(
            FullScreenDebugMode::VBufferLightingDebug,
            DebugTexture { handle: handles::color_buffer(), format: HDR_FORMAT, scale: 1 },
        );
        Some(recipe)
    }
}
