//! Material registry with a typed technique table
//!
//! Each material is registered once with its bucket id, global material id
//! and the set of techniques it supports. Techniques are resolved at
//! registration time (optionally from the material's named sub-passes), so
//! the lighting pass never has to scan pass names per frame.

use crate::{Error, Result};
use bitflags::bitflags;
use std::collections::{BTreeMap, HashMap};

/// Number of light-list buckets (bits of the bucket mask)
pub const MAX_BUCKETS: u32 = 32;

/// Number of global material ids; `0xFFFF` is reserved for empty tiles
pub const MAX_MATERIALS: u32 = 0xFFFF;

/// Sub-pass name marking a material as shadable by the VBuffer lighting pass
pub const VBUFFER_LIGHTING_PASS: &str = "VBufferLighting";

/// Opaque handle assigned by the material-management collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MaterialHandle(pub u32);

/// Surface classification of a material
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SurfaceType {
    #[default]
    Opaque,
    AlphaTested,
    Transparent,
}

bitflags! {
    /// Rendering techniques a material provides
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Techniques: u32 {
        const VBUFFER_LIGHTING = 1 << 0;
        const FORWARD = 1 << 1;
        const DEPTH_ONLY = 1 << 2;
        const MOTION_VECTORS = 1 << 3;
    }
}

impl Techniques {
    /// Resolve techniques from a material's sub-pass names (substring match)
    pub fn from_pass_names<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        const TABLE: [(&str, Techniques); 4] = [
            (VBUFFER_LIGHTING_PASS, Techniques::VBUFFER_LIGHTING),
            ("Forward", Techniques::FORWARD),
            ("DepthOnly", Techniques::DEPTH_ONLY),
            ("MotionVectors", Techniques::MOTION_VECTORS),
        ];

        names.into_iter().fold(Techniques::empty(), |acc, name| {
            TABLE
                .iter()
                .filter(|(marker, _)| name.contains(marker))
                .fold(acc, |acc, (_, technique)| acc | *technique)
        })
    }
}

/// Shading parameters uploaded to the material table
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaterialParams {
    pub base_color: [f32; 4],
    pub metallic: f32,
    pub roughness: f32,
}

impl Default for MaterialParams {
    fn default() -> Self {
        Self {
            base_color: [1.0, 1.0, 1.0, 1.0],
            metallic: 0.0,
            roughness: 0.6,
        }
    }
}

/// Registration data for one material
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialDesc {
    pub name: String,
    pub surface: SurfaceType,
    pub bucket_id: u32,
    pub global_id: u32,
    pub techniques: Techniques,
    pub params: MaterialParams,
}

impl MaterialDesc {
    /// Opaque material lit by the VBuffer lighting pass
    pub fn opaque(name: impl Into<String>, global_id: u32, bucket_id: u32) -> Self {
        Self {
            name: name.into(),
            surface: SurfaceType::Opaque,
            bucket_id,
            global_id,
            techniques: Techniques::VBUFFER_LIGHTING,
            params: MaterialParams::default(),
        }
    }

    pub fn with_surface(mut self, surface: SurfaceType) -> Self {
        self.surface = surface;
        self
    }

    pub fn with_techniques(mut self, techniques: Techniques) -> Self {
        self.techniques = techniques;
        self
    }

    /// Replace the technique set with the one implied by `pass_names`
    pub fn with_pass_names<'a>(mut self, pass_names: impl IntoIterator<Item = &'a str>) -> Self {
        self.techniques = Techniques::from_pass_names(pass_names);
        self
    }

    pub fn with_params(mut self, params: MaterialParams) -> Self {
        self.params = params;
        self
    }

    /// Whether the VBuffer lighting pass shades this material
    pub fn is_vbuffer_lit(&self) -> bool {
        self.surface == SurfaceType::Opaque && self.techniques.contains(Techniques::VBUFFER_LIGHTING)
    }
}

/// GPU-side material entry, indexed by global material id
/// (must match WGSL `GpuMaterial`)
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GpuMaterial {
    pub base_color: [f32; 4],
    pub metallic: f32,
    pub roughness: f32,
    pub bucket_id: u32,
    pub flags: u32,
}

impl GpuMaterial {
    /// Set on entries that correspond to a registered material
    pub const FLAG_REGISTERED: u32 = 1 << 0;
    pub const FLAG_VBUFFER_LIT: u32 = 1 << 1;
}

/// Registry of materials known to the renderer
///
/// Iteration is ordered by handle so frame plans are deterministic.
#[derive(Debug, Default)]
pub struct MaterialRegistry {
    entries: BTreeMap<MaterialHandle, MaterialDesc>,
    by_global_id: HashMap<u32, MaterialHandle>,
}

impl MaterialRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or re-register) a material
    pub fn register(&mut self, handle: MaterialHandle, desc: MaterialDesc) -> Result<()> {
        if desc.bucket_id >= MAX_BUCKETS {
            return Err(Error::Material(format!(
                "Material '{}' uses bucket {} (max {})",
                desc.name,
                desc.bucket_id,
                MAX_BUCKETS - 1
            )));
        }
        if desc.global_id >= MAX_MATERIALS {
            return Err(Error::Material(format!(
                "Material '{}' uses global id {} (max {})",
                desc.name,
                desc.global_id,
                MAX_MATERIALS - 1
            )));
        }
        if let Some(&owner) = self.by_global_id.get(&desc.global_id) {
            if owner != handle {
                return Err(Error::Material(format!(
                    "Global material id {} already bound to {:?}",
                    desc.global_id, owner
                )));
            }
        }

        if let Some(previous) = self.entries.remove(&handle) {
            self.by_global_id.remove(&previous.global_id);
        }

        log::debug!(
            "Registered material '{}' ({:?}): global id {}, bucket {}, techniques {:?}",
            desc.name,
            handle,
            desc.global_id,
            desc.bucket_id,
            desc.techniques
        );
        self.by_global_id.insert(desc.global_id, handle);
        self.entries.insert(handle, desc);
        Ok(())
    }

    pub fn remove(&mut self, handle: MaterialHandle) -> Option<MaterialDesc> {
        let desc = self.entries.remove(&handle)?;
        self.by_global_id.remove(&desc.global_id);
        Some(desc)
    }

    pub fn get(&self, handle: MaterialHandle) -> Option<&MaterialDesc> {
        self.entries.get(&handle)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (MaterialHandle, &MaterialDesc)> {
        self.entries.iter().map(|(&handle, desc)| (handle, desc))
    }

    /// Materials shaded by the VBuffer lighting pass
    ///
    /// Transparent and alpha-tested materials are excluded, as are materials
    /// without the `VBUFFER_LIGHTING` technique.
    pub fn lighting_candidates(&self) -> impl Iterator<Item = (MaterialHandle, &MaterialDesc)> {
        self.iter().filter(|(_, desc)| desc.is_vbuffer_lit())
    }

    /// Material table indexed by global material id
    pub fn gpu_table(&self) -> Vec<GpuMaterial> {
        let len = self
            .entries
            .values()
            .map(|desc| desc.global_id as usize + 1)
            .max()
            .unwrap_or(0);

        let mut table = vec![GpuMaterial::default(); len];
        for desc in self.entries.values() {
            let mut flags = GpuMaterial::FLAG_REGISTERED;
            if desc.is_vbuffer_lit() {
                flags |= GpuMaterial::FLAG_VBUFFER_LIT;
            }
            table[desc.global_id as usize] = GpuMaterial {
                base_color: desc.params.base_color,
                metallic: desc.params.metallic,
                roughness: desc.params.roughness,
                bucket_id: desc.bucket_id,
                flags,
            };
        }
        table
    }
}
