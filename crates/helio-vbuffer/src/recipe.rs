//! Pass recipes
//!
//! A recipe is everything a pass needs submitted for one frame, as plain
//! data: the textures it creates, its attachments, the resources it binds by
//! name, and an ordered list of commands with their constants. Passes never
//! touch wgpu objects; the executor turns recipes into GPU work.

use crate::debug::{DebugTexture, FullScreenDebugMode};
use crate::graph::ResourceHandle;
use crate::pipeline::{Kernel, Program};
use crate::tiles::Extent;
use crate::variants::VariantKeywords;
use bitflags::bitflags;
use std::ops::Range;

bitflags! {
    /// Camera textures the host should keep producing for temporal effects
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CameraCaptureFlags: u32 {
        const DEPTH = 1 << 0;
        const MOTION_VECTORS = 1 << 1;
    }
}

/// How long a requested texture lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureLifetime {
    /// Until the end of the frame, readable by later passes
    Frame,
    /// Released as soon as the creating pass ends
    Transient,
}

/// A texture a pass asks the executor to allocate
#[derive(Debug, Clone, PartialEq)]
pub struct TextureRequest {
    pub handle: ResourceHandle,
    pub label: &'static str,
    pub extent: Extent,
    pub format: wgpu::TextureFormat,
    pub usage: wgpu::TextureUsages,
    pub lifetime: TextureLifetime,
}

/// Buffers owned outside the graph and bound by global name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BufferSlot {
    CompactedVertices,
    CompactedIndices,
    InstanceVData,
    Materials,
    Lights,
    TileFeatureFlags,
}

impl BufferSlot {
    pub const ALL: [BufferSlot; 6] = [
        Self::CompactedVertices,
        Self::CompactedIndices,
        Self::InstanceVData,
        Self::Materials,
        Self::Lights,
        Self::TileFeatureFlags,
    ];

    pub const fn binding_name(self) -> &'static str {
        match self {
            Self::CompactedVertices => "_CompactedVertexBuffer",
            Self::CompactedIndices => "_CompactedIndexBuffer",
            Self::InstanceVData => "_InstanceVDataBuffer",
            Self::Materials => "_MaterialTable",
            Self::Lights => "g_vLightListGlobal",
            Self::TileFeatureFlags => "g_TileFeatureFlags",
        }
    }
}

/// What a named binding points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingResource {
    Buffer(BufferSlot),
    Texture(ResourceHandle),
    StorageTexture(ResourceHandle),
}

/// Resource bound under a global binding name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Binding {
    pub name: &'static str,
    pub resource: BindingResource,
}

impl Binding {
    pub fn buffer(slot: BufferSlot) -> Self {
        Self { name: slot.binding_name(), resource: BindingResource::Buffer(slot) }
    }

    pub fn texture(name: &'static str, handle: ResourceHandle) -> Self {
        Self { name, resource: BindingResource::Texture(handle) }
    }

    pub fn storage(name: &'static str, handle: ResourceHandle) -> Self {
        Self { name, resource: BindingResource::StorageTexture(handle) }
    }

    pub fn texture_handle(&self) -> Option<ResourceHandle> {
        match self.resource {
            BindingResource::Texture(handle) | BindingResource::StorageTexture(handle) => Some(handle),
            BindingResource::Buffer(_) => None,
        }
    }
}

/// Per-command values (must match WGSL `PassConstants`)
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct PassConstants {
    /// First instance-metadata slot addressed by a visibility draw
    pub instance_shift: u32,
    pub material_id: u32,
    pub bucket_id: u32,
    /// Lighting variant index
    pub variant: u32,
    pub tile_count: [u32; 2],
    pub tile_size: u32,
    pub fan_in: u32,
    /// Real screen (or level input) extent
    pub extent: [u32; 2],
    /// Pass-specific extras
    pub params: [u32; 2],
}

/// Color target of a raster pass
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorAttachment {
    pub handle: ResourceHandle,
    pub load: wgpu::LoadOp<wgpu::Color>,
}

/// Whether a raster pass may write its depth target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DepthAccess {
    Read,
    ReadWrite,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthAttachment {
    pub handle: ResourceHandle,
    pub load: wgpu::LoadOp<f32>,
    pub access: DepthAccess,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PassKind {
    Raster {
        color: Vec<ColorAttachment>,
        depth: Option<DepthAttachment>,
    },
    Compute,
}

/// Pixel rectangle a raster pass draws into
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Viewport {
    pub fn covering(extent: Extent) -> Self {
        Self { x: 0.0, y: 0.0, width: extent.width as f32, height: extent.height as f32 }
    }

    /// Viewport restricted to an attachment of `extent`
    pub fn clamped_to(&self, extent: Extent) -> Self {
        let x = self.x.clamp(0.0, extent.width as f32);
        let y = self.y.clamp(0.0, extent.height as f32);
        Self {
            x,
            y,
            width: self.width.min(extent.width as f32 - x).max(0.0),
            height: self.height.min(extent.height as f32 - y).max(0.0),
        }
    }
}

/// Procedural (non-indexed, vertex-buffer-less) draw
#[derive(Debug, Clone, PartialEq)]
pub struct DrawCall {
    pub program: Program,
    pub vertex_count: u32,
    pub instances: Range<u32>,
    pub keywords: VariantKeywords,
    pub constants: PassConstants,
}

impl DrawCall {
    pub fn instance_count(&self) -> u32 {
        self.instances.end.saturating_sub(self.instances.start)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Dispatch {
    pub kernel: Kernel,
    pub groups: [u32; 3],
    pub bindings: Vec<Binding>,
    pub constants: PassConstants,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    SetViewport(Viewport),
    Draw(DrawCall),
    Dispatch(Dispatch),
}

/// Everything one pass submits for one frame
#[derive(Debug, Clone, PartialEq)]
pub struct PassRecipe {
    pub kind: PassKind,
    pub textures: Vec<TextureRequest>,
    /// Bindings shared by every draw of a raster pass
    pub bindings: Vec<Binding>,
    pub commands: Vec<Command>,
    pub debug_exports: Vec<(FullScreenDebugMode, DebugTexture)>,
    pub camera_capture: CameraCaptureFlags,
}

impl PassRecipe {
    pub fn raster(color: Vec<ColorAttachment>, depth: Option<DepthAttachment>) -> Self {
        Self::with_kind(PassKind::Raster { color, depth })
    }

    pub fn compute() -> Self {
        Self::with_kind(PassKind::Compute)
    }

    fn with_kind(kind: PassKind) -> Self {
        Self {
            kind,
            textures: Vec::new(),
            bindings: Vec::new(),
            commands: Vec::new(),
            debug_exports: Vec::new(),
            camera_capture: CameraCaptureFlags::empty(),
        }
    }

    pub fn create_texture(&mut self, request: TextureRequest) -> &mut Self {
        self.textures.push(request);
        self
    }

    pub fn bind(&mut self, binding: Binding) -> &mut Self {
        self.bindings.push(binding);
        self
    }

    pub fn push(&mut self, command: Command) -> &mut Self {
        self.commands.push(command);
        self
    }

    pub fn export_debug(&mut self, mode: FullScreenDebugMode, texture: DebugTexture) -> &mut Self {
        self.debug_exports.push((mode, texture));
        self
    }

    pub fn capture_camera(&mut self, flags: CameraCaptureFlags) -> &mut Self {
        self.camera_capture |= flags;
        self
    }

    pub fn draws(&self) -> impl Iterator<Item = &DrawCall> {
        self.commands.iter().filter_map(|command| match command {
            Command::Draw(draw) => Some(draw),
            _ => None,
        })
    }

    pub fn dispatches(&self) -> impl Iterator<Item = &Dispatch> {
        self.commands.iter().filter_map(|command| match command {
            Command::Dispatch(dispatch) => Some(dispatch),
            _ => None,
        })
    }

    pub fn viewports(&self) -> impl Iterator<Item = &Viewport> {
        self.commands.iter().filter_map(|command| match command {
            Command::SetViewport(viewport) => Some(viewport),
            _ => None,
        })
    }

    /// Handles of every texture bound or attached by this recipe
    pub fn referenced_textures(&self) -> Vec<ResourceHandle> {
        let mut handles: Vec<ResourceHandle> = self
            .bindings
            .iter()
            .chain(self.dispatches().flat_map(|dispatch| dispatch.bindings.iter()))
            .filter_map(Binding::texture_handle)
            .collect();
        if let PassKind::Raster { color, depth } = &self.kind {
            handles.extend(color.iter().map(|attachment| attachment.handle));
            handles.extend(depth.iter().map(|attachment| attachment.handle));
        }
        handles
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constants_layout_is_48_bytes() {
        assert_eq!(std::mem::size_of::<PassConstants>(), 48);
    }

    #[test]
    fn viewport_clamps_to_attachment() {
        let viewport = Viewport::covering(Extent::new(128, 128)).clamped_to(Extent::new(65, 65));
        assert_eq!(viewport, Viewport::covering(Extent::new(65, 65)));
    }

    #[test]
    fn buffer_bindings_keep_global_names() {
        assert_eq!(Binding::buffer(BufferSlot::CompactedVertices).name, "_CompactedVertexBuffer");
        assert_eq!(BufferSlot::TileFeatureFlags.binding_name(), "g_TileFeatureFlags");
    }
}
