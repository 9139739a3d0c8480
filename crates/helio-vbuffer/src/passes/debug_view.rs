//! Full-screen debug view of an intermediate VBuffer texture

use super::{handles, FULL_SCREEN_DEBUG_PASS};
use crate::debug::FullScreenDebugMode;
use crate::graph::{FrameContext, FrameResources, PassResourceBuilder, RenderPass};
use crate::pipeline::{Program, DEBUG_SOURCE};
use crate::recipe::{Binding, ColorAttachment, Command, DrawCall, PassConstants, PassRecipe, Viewport};
use crate::variants::VariantKeywords;

/// Overwrites the output with the texture exported for the active debug mode
pub struct FullScreenDebugPass;

impl FullScreenDebugPass {
    pub fn new() -> Self {
        Self
    }
}

impl Default for FullScreenDebugPass {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderPass for FullScreenDebugPass {
    fn name(&self) -> &str {
        FULL_SCREEN_DEBUG_PASS
    }

    fn declare_resources(&self, builder: &mut PassResourceBuilder) {
        // Run after every producer of a debuggable texture.
        builder
            .read_optional(handles::vbuffer())
            .read_optional(handles::material_depth())
            .read_optional(handles::tile_classification())
            .read_optional(handles::material_tile())
            .read_optional(handles::bucket_id())
            .read_optional(handles::color_buffer())
            .write(handles::output());
    }

    fn record(&self, frame: &FrameContext, resources: &FrameResources) -> Option<PassRecipe> {
        let mode = frame.debug.full_screen_debug_mode();
        if mode == FullScreenDebugMode::None {
            return None;
        }
        let Some(texture) = resources.debug_texture(mode) else {
            log::debug!("Debug mode {} has no texture this frame", mode.name());
            return None;
        };

        let mut recipe =
            PassRecipe::raster(vec![ColorAttachment { handle: handles::output(), load: wgpu::LoadOp::Load }], None);
        recipe
            .bind(Binding::texture(DEBUG_SOURCE, texture.handle))
            .push(Command::SetViewport(Viewport::covering(frame.extent)))
            .push(Command::Draw(DrawCall {
                program: Program::DebugView(mode),
                vertex_count: 3,
                instances: 0..1,
                keywords: VariantKeywords::empty(),
                constants: PassConstants {
                    tile_size: texture.scale,
                    extent: frame.extent.as_array(),
                    ..Default::default()
                },
            }));
        Some(recipe)
    }
}
