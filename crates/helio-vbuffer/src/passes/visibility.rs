//! Visibility prepass - rasterizes compacted clusters into the VBuffer
//!
//! Each facing category gets one procedural draw of
//! `CLUSTER_SIZE_IN_INDICES` vertices per cluster instance. The instance
//! data shift advances between draws so every draw reads its own contiguous
//! range of the instance metadata buffer.

use super::{handles, VBUFFER_PREPASS};
use crate::debug::{DebugTexture, FullScreenDebugMode};
use crate::geometry::{ClusterBatches, ClusterFacing, CLUSTER_SIZE_IN_INDICES};
use crate::graph::{FrameContext, FrameResources, PassResourceBuilder, RenderPass};
use crate::pipeline::{Program, DEPTH_FORMAT, VBUFFER_FORMAT};
use crate::recipe::{
    Binding, BufferSlot, CameraCaptureFlags, ColorAttachment, Command, DepthAccess, DepthAttachment, DrawCall,
    PassConstants, PassRecipe, TextureLifetime, TextureRequest, Viewport,
};
use crate::variants::VariantKeywords;

/// One draw of the prepass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClusterDraw {
    pub facing: ClusterFacing,
    /// First instance metadata slot read by the draw
    pub instance_shift: u32,
    pub instance_count: u32,
}

/// Draws for this frame's cluster batches, in back, front, double-sided order
///
/// Batches with zero instances get no draw. The shifts of the remaining
/// draws stay contiguous; a batch whose first slot is past `u32::MAX` is
/// dropped along with everything after it.
pub fn cluster_draws(batches: &ClusterBatches) -> Vec<ClusterDraw> {
    let mut next_shift = Some(0u32);
    let mut draws = Vec::with_capacity(ClusterFacing::ALL.len());
    for facing in ClusterFacing::ALL {
        let instance_count = batches.count(facing);
        if instance_count == 0 {
            continue;
        }
        let Some(instance_shift) = next_shift else {
            log::warn!("Cluster batch {} starts past the last instance slot, dropping it", facing.label());
            break;
        };
        draws.push(ClusterDraw { facing, instance_shift, instance_count });
        next_shift = instance_shift.checked_add(instance_count);
    }
    draws
}

/// Writes `VBuffer 0` and the camera depth
pub struct VisibilityPass;

impl VisibilityPass {
    pub fn new() -> Self {
        Self
    }
}

impl Default for VisibilityPass {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderPass for VisibilityPass {
    fn name(&self) -> &str {
        VBUFFER_PREPASS
    }

    fn declare_resources(&self, builder: &mut PassResourceBuilder) {
        builder.create(handles::vbuffer()).create(handles::camera_depth());
    }

    fn record(&self, frame: &FrameContext, _resources: &FrameResources) -> Option<PassRecipe> {
        if !frame.geometry.is_complete() {
            log::debug!("Compacted geometry not built yet, skipping visibility prepass");
            return None;
        }
        if frame.extent.is_empty() {
            return None;
        }
        if frame.geometry.batches.total().is_none() {
            log::warn!("Cluster batch counts {:?} overflow the instance range", frame.geometry.batches);
            return None;
        }

        let usage = wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING;
        let mut recipe = PassRecipe::raster(
            vec![ColorAttachment {
                handle: handles::vbuffer(),
                // Zero is the "no geometry" id
                load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
            }],
            Some(DepthAttachment {
                handle: handles::camera_depth(),
                load: wgpu::LoadOp::Clear(1.0),
                access: DepthAccess::ReadWrite,
            }),
        );
        recipe
            .create_texture(TextureRequest {
                handle: handles::vbuffer(),
                label: handles::VBUFFER,
                extent: frame.extent,
                format: VBUFFER_FORMAT,
                usage,
                lifetime: TextureLifetime::Frame,
            })
            .create_texture(TextureRequest {
                handle: handles::camera_depth(),
                label: handles::CAMERA_DEPTH,
                extent: frame.extent,
                format: DEPTH_FORMAT,
                usage,
                lifetime: TextureLifetime::Frame,
            })
            .bind(Binding::buffer(BufferSlot::CompactedVertices))
            .bind(Binding::buffer(BufferSlot::CompactedIndices))
            .bind(Binding::buffer(BufferSlot::InstanceVData))
            .push(Command::SetViewport(Viewport::covering(frame.extent)));

        for draw in cluster_draws(&frame.geometry.batches) {
            log::trace!(
                "Visibility draw {}: {} clusters from slot {}",
                draw.facing.label(),
                draw.instance_count,
                draw.instance_shift
            );
            recipe.push(Command::Draw(DrawCall {
                program: Program::Visibility(draw.facing),
                vertex_count: CLUSTER_SIZE_IN_INDICES,
                instances: 0..draw.instance_count,
                keywords: VariantKeywords::empty(),
                constants: PassConstants {
                    instance_shift: draw.instance_shift,
                    extent: frame.extent.as_array(),
                    ..Default::default()
                },
            }));
        }

        let vbuffer = DebugTexture { handle: handles::vbuffer(), format: VBUFFER_FORMAT, scale: 1 };
        recipe
            .export_debug(FullScreenDebugMode::VBufferTriangleId, vbuffer)
            .export_debug(FullScreenDebugMode::VBufferGeometryId, vbuffer)
            // Temporal systems downstream need last frame's depth and motion.
            .capture_camera(CameraCaptureFlags::DEPTH | CameraCaptureFlags::MOTION_VECTORS);
        Some(recipe)
    }
}
