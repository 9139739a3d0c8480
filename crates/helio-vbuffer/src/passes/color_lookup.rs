//! Composite pass - writes the lit color to the output, optionally graded
//! through a strip LUT

use super::{handles, COLOR_LOOKUP_PASS};
use crate::graph::{FrameContext, FrameResources, PassResourceBuilder, RenderPass};
use crate::pipeline::{CompositeMode, Program, COLOR_BUFFER, USER_LUT};
use crate::recipe::{Binding, ColorAttachment, Command, DrawCall, PassConstants, PassRecipe, Viewport};
use crate::variants::VariantKeywords;

/// Composites `Color buffer` into the imported output target
pub struct ColorLookupPass;

impl ColorLookupPass {
    pub fn new() -> Self {
        Self
    }

    /// Mode for this frame given whether lit color exists
    pub fn mode(frame: &FrameContext, has_color: bool) -> CompositeMode {
        if !has_color {
            CompositeMode::Clear
        } else if frame.color_lookup_active() {
            CompositeMode::ColorLookup
        } else {
            CompositeMode::Passthrough
        }
    }
}

impl Default for ColorLookupPass {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderPass for ColorLookupPass {
    fn name(&self) -> &str {
        COLOR_LOOKUP_PASS
    }

    fn declare_resources(&self, builder: &mut PassResourceBuilder) {
        builder
            .read_optional(handles::color_buffer())
            .read_optional(handles::user_lut())
            .write(handles::output());
    }

    fn record(&self, frame: &FrameContext, resources: &FrameResources) -> Option<PassRecipe> {
        let mode = Self::mode(frame, resources.is_available(handles::color_buffer()));
        let load = match mode {
            CompositeMode::Clear => wgpu::LoadOp::Clear(frame.clear_color),
            CompositeMode::Passthrough | CompositeMode::ColorLookup => wgpu::LoadOp::Load,
        };
        let mut recipe = PassRecipe::raster(vec![ColorAttachment { handle: handles::output(), load }], None);
        if mode == CompositeMode::Clear {
            log::trace!("No lit color this frame, clearing output");
            return Some(recipe);
        }

        recipe.bind(Binding::texture(COLOR_BUFFER, handles::color_buffer()));
        let mut params = [0, 0];
        if mode == CompositeMode::ColorLookup {
            recipe.bind(Binding::texture(USER_LUT, handles::user_lut()));
            params = [frame.lut_size, frame.color_lookup.contribution().to_bits()];
        }
        recipe
            .push(Command::SetViewport(Viewport::covering(frame.extent)))
            .push(Command::Draw(DrawCall {
                program: Program::Composite(mode),
                vertex_count: 3,
                instances: 0..1,
                keywords: VariantKeywords::empty(),
                constants: PassConstants { extent: frame.extent.as_array(), params, ..Default::default() },
            }));
        Some(recipe)
    }
}
