//! Material depth - turns VBuffer ids into a depth-encoded material key
//!
//! The lighting pass depth-tests `Equal` against this buffer, so each
//! material's draws only reach pixels of that material.

use super::{handles, MATERIAL_DEPTH_PASS};
use crate::debug::{DebugTexture, FullScreenDebugMode};
use crate::graph::{FrameContext, FrameResources, PassResourceBuilder, RenderPass};
use crate::material::MAX_MATERIALS;
use crate::pipeline::{Program, DEPTH_FORMAT, VBUFFER0};
use crate::recipe::{
    Binding, BufferSlot, Command, DepthAccess, DepthAttachment, DrawCall, PassConstants, PassRecipe, TextureLifetime,
    TextureRequest, Viewport,
};
use crate::variants::VariantKeywords;

/// Depth written for a global material id (must match `material_depth.wgsl`)
///
/// Pixels without geometry keep the clear value `1.0`.
pub fn material_depth(material_id: u32) -> f32 {
    (material_id + 1) as f32 / (MAX_MATERIALS + 1) as f32
}

/// Full-screen pass creating the material depth buffer
pub struct MaterialDepthPass;

impl MaterialDepthPass {
    pub fn new() -> Self {
        Self
    }
}

impl Default for MaterialDepthPass {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderPass for MaterialDepthPass {
    fn name(&self) -> &str {
        MATERIAL_DEPTH_PASS
    }

    fn declare_resources(&self, builder: &mut PassResourceBuilder) {
        builder.read(handles::vbuffer()).create(handles::material_depth());
    }

    fn record(&self, frame: &FrameContext, _resources: &FrameResources) -> Option<PassRecipe> {
        let mut recipe = PassRecipe::raster(
            Vec::new(),
            Some(DepthAttachment {
                handle: handles::material_depth(),
                load: wgpu::LoadOp::Clear(1.0),
                access: DepthAccess::ReadWrite,
            }),
        );
        recipe
            .create_texture(TextureRequest {
                handle: handles::material_depth(),
                label: handles::MATERIAL_DEPTH,
                extent: frame.extent,
                format: DEPTH_FORMAT,
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
                lifetime: TextureLifetime::Frame,
            })
            .bind(Binding::texture(VBUFFER0, handles::vbuffer()))
            .bind(Binding::buffer(BufferSlot::InstanceVData))
            .push(Command::SetViewport(Viewport::covering(frame.extent)))
            .push(Command::Draw(DrawCall {
                program: Program::MaterialDepth,
                vertex_count: 3,
                instances: 0..1,
                keywords: VariantKeywords::empty(),
                constants: PassConstants { extent: frame.extent.as_array(), ..Default::default() },
            }))
            .export_debug(
                FullScreenDebugMode::VBufferMaterialId,
                DebugTexture { handle: handles::material_depth(), format: DEPTH_FORMAT, scale: 1 },
            );
        Some(recipe)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn material_depth_is_strictly_increasing_below_clear() {
        assert!(material_depth(0) > 0.0);
        assert!(material_depth(0) < material_depth(1));
        assert!(material_depth(MAX_MATERIALS - 1) < 1.0);
    }
}
