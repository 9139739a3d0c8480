//! Bind group layouts and builders
//!
//! Every pipeline uses two groups:
//!
//! - Group 0: Global (camera uniform, dynamic-offset pass constants)
//! - Group 1: Pass bindings, built from the program's `BindingDecl` table

use crate::pipeline::{BindingDecl, BindingKind};
use crate::recipe::PassConstants;
use std::sync::Arc;

/// Stride between `PassConstants` records in the dynamic uniform buffer
pub const CONSTANTS_STRIDE: u64 = 256;

/// Bind group layouts shared by every pipeline
#[derive(Clone)]
pub struct BindGroupLayouts {
    pub global: Arc<wgpu::BindGroupLayout>,
}

impl BindGroupLayouts {
    pub fn new(device: &wgpu::Device) -> Self {
        Self { global: Arc::new(Self::create_global_layout(device)) }
    }

    /// Group 0: camera + per-command constants
    fn create_global_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
        let all_stages = wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT | wgpu::ShaderStages::COMPUTE;
        device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Global Bind Group Layout"),
            entries: &[
                // Binding 0: Camera uniform
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: all_stages,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                // Binding 1: PassConstants, one record per command
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: all_stages,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: true,
                        min_binding_size: wgpu::BufferSize::new(std::mem::size_of::<PassConstants>() as u64),
                    },
                    count: None,
                },
            ],
        })
    }

    /// Group 1 layout for a program's binding table
    pub fn pass_layout(
        device: &wgpu::Device,
        label: &str,
        decls: &[BindingDecl],
        visibility: wgpu::ShaderStages,
    ) -> wgpu::BindGroupLayout {
        let entries: Vec<wgpu::BindGroupLayoutEntry> =
            decls.iter().map(|decl| layout_entry(decl, visibility)).collect();
        device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(&format!("{} Pass Layout", label)),
            entries: &entries,
        })
    }
}

fn layout_entry(decl: &BindingDecl, visibility: wgpu::ShaderStages) -> wgpu::BindGroupLayoutEntry {
    let texture = |sample_type| wgpu::BindingType::Texture {
        sample_type,
        view_dimension: wgpu::TextureViewDimension::D2,
        multisampled: false,
    };
    let ty = match decl.kind {
        BindingKind::StorageBuffer => wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only: true },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        BindingKind::TextureUint => texture(wgpu::TextureSampleType::Uint),
        BindingKind::TextureFloat => texture(wgpu::TextureSampleType::Float { filterable: false }),
        BindingKind::TextureDepth => texture(wgpu::TextureSampleType::Depth),
        BindingKind::StorageTexture(format) => wgpu::BindingType::StorageTexture {
            access: wgpu::StorageTextureAccess::WriteOnly,
            format,
            view_dimension: wgpu::TextureViewDimension::D2,
        },
    };
    wgpu::BindGroupLayoutEntry { binding: decl.binding, visibility, ty, count: None }
}

/// Helper for building bind groups
pub struct BindGroupBuilder<'a> {
    label: Option<String>,
    entries: Vec<wgpu::BindGroupEntry<'a>>,
}

impl<'a> BindGroupBuilder<'a> {
    pub fn new(label: impl Into<String>) -> Self {
        Self { label: Some(label.into()), entries: Vec::new() }
    }

    /// Add a whole-buffer binding
    pub fn buffer(mut self, binding: u32, buffer: &'a wgpu::Buffer) -> Self {
        self.entries.push(wgpu::BindGroupEntry { binding, resource: buffer.as_entire_binding() });
        self
    }

    /// Add a buffer binding with offset and size
    pub fn buffer_range(
        mut self,
        binding: u32,
        buffer: &'a wgpu::Buffer,
        offset: wgpu::BufferAddress,
        size: Option<wgpu::BufferSize>,
    ) -> Self {
        self.entries.push(wgpu::BindGroupEntry {
            binding,
            resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding { buffer, offset, size }),
        });
        self
    }

    /// Add a texture view binding
    pub fn texture(mut self, binding: u32, view: &'a wgpu::TextureView) -> Self {
        self.entries.push(wgpu::BindGroupEntry { binding, resource: wgpu::BindingResource::TextureView(view) });
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Build the bind group
    pub fn build(self, device: &wgpu::Device, layout: &wgpu::BindGroupLayout) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: self.label.as_deref(),
            layout,
            entries: &self.entries,
        })
    }
}
