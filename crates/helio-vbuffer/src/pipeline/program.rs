//! Shader programs, compute kernels and their binding declarations

use crate::debug::{DebugSampleKind, FullScreenDebugMode};
use crate::geometry::{ClusterFacing, CLUSTER_SIZE_IN_INDICES, TRIANGLE_ID_BITS};
use crate::material::MAX_MATERIALS;
use crate::recipe::BufferSlot;
use crate::tiles::CLASSIFICATION_GROUP_SIZE;
use crate::variants::LightVariant;

pub const VBUFFER0: &str = "_VBuffer0";
pub const VBUFFER_DEPTH: &str = "_VBufferDepthTexture";
pub const CLASSIFICATION_TILE: &str = "_ClassificationTile";
pub const BUCKET_TILE: &str = "_BucketTile";
pub const CLASSIFICATION_TILE_INPUT: &str = "_ClassificationTileInput";
pub const BUCKET_TILE_INPUT: &str = "_BucketTileInput";
pub const TILE_CLASSIFICATION: &str = "_VBufferTileClassification";
pub const COLOR_BUFFER: &str = "_ColorBuffer";
pub const USER_LUT: &str = "_UserLut";
pub const DEBUG_SOURCE: &str = "_DebugSource";

/// Storage format of the light tile classification map
pub const TILE_CLASSIFICATION_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rg32Uint;
/// Storage format of the material tile and bucket maps
pub const TILE_MAP_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::R32Uint;
pub const VBUFFER_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::R32Uint;
pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
pub const HDR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;

/// Shader define value, emitted as a WGSL module-scope constant
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ShaderDefine {
    Bool(bool),
    U32(u32),
    F32(f32),
}

/// How the composite pass produces the final image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompositeMode {
    /// No lit color this frame, only clear the target
    Clear,
    Passthrough,
    ColorLookup,
}

/// Raster programs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Program {
    Visibility(ClusterFacing),
    MaterialDepth,
    VBufferLighting(LightVariant),
    Composite(CompositeMode),
    DebugView(FullScreenDebugMode),
}

/// Compute kernels, named after their WGSL entry points
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kernel {
    LightTileClassification,
    MaterialReduction { fan_in: u32 },
    FinalReduction { fan_in: u32 },
}

/// Type of a pass-level (group 1) binding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingKind {
    StorageBuffer,
    TextureUint,
    TextureFloat,
    TextureDepth,
    StorageTexture(wgpu::TextureFormat),
}

/// Binding slot a program expects under a global name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindingDecl {
    pub binding: u32,
    pub name: &'static str,
    pub kind: BindingKind,
}

impl BindingDecl {
    pub const fn new(binding: u32, name: &'static str, kind: BindingKind) -> Self {
        Self { binding, name, kind }
    }

    const fn buffer(binding: u32, slot: BufferSlot) -> Self {
        Self::new(binding, slot.binding_name(), BindingKind::StorageBuffer)
    }
}

/// Depth state of a raster program
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthState {
    pub compare: wgpu::CompareFunction,
    pub write: bool,
}

/// Everything needed to build a render pipeline
#[derive(Debug, Clone)]
pub struct ProgramDesc {
    pub label: String,
    pub source: &'static str,
    pub vertex_entry: &'static str,
    pub fragment_entry: &'static str,
    pub defines: Vec<(&'static str, ShaderDefine)>,
    pub bindings: Vec<BindingDecl>,
    pub color_targets: Vec<wgpu::TextureFormat>,
    pub depth: Option<DepthState>,
    pub cull_mode: Option<wgpu::Face>,
}

/// Everything needed to build a compute pipeline
#[derive(Debug, Clone)]
pub struct KernelDesc {
    pub label: String,
    pub source: &'static str,
    pub entry_point: &'static str,
    pub defines: Vec<(&'static str, ShaderDefine)>,
    pub bindings: Vec<BindingDecl>,
}

const VISIBILITY_WGSL: &str = include_str!("../../shaders/passes/visibility.wgsl");
const MATERIAL_DEPTH_WGSL: &str = include_str!("../../shaders/passes/material_depth.wgsl");
const LIGHTING_WGSL: &str = include_str!("../../shaders/passes/vbuffer_lighting.wgsl");
const COLOR_LOOKUP_WGSL: &str = include_str!("../../shaders/passes/color_lookup.wgsl");
const DEBUG_VIEW_WGSL: &str = include_str!("../../shaders/passes/debug_view.wgsl");
const DEBUG_VIEW_FLOAT_WGSL: &str = include_str!("../../shaders/passes/debug_view_float.wgsl");
const TILE_CLASSIFICATION_WGSL: &str = include_str!("../../shaders/passes/tile_classification.wgsl");
const MATERIAL_TILE_WGSL: &str = include_str!("../../shaders/passes/material_tile.wgsl");

const VISIBILITY_BINDINGS: [BindingDecl; 3] = [
    BindingDecl::buffer(0, BufferSlot::CompactedVertices),
    BindingDecl::buffer(1, BufferSlot::CompactedIndices),
    BindingDecl::buffer(2, BufferSlot::InstanceVData),
];

const MATERIAL_DEPTH_BINDINGS: [BindingDecl; 2] = [
    BindingDecl::new(0, VBUFFER0, BindingKind::TextureUint),
    BindingDecl::buffer(1, BufferSlot::InstanceVData),
];

const LIGHTING_BINDINGS: [BindingDecl; 10] = [
    BindingDecl::new(0, VBUFFER0, BindingKind::TextureUint),
    BindingDecl::new(1, VBUFFER_DEPTH, BindingKind::TextureDepth),
    BindingDecl::buffer(2, BufferSlot::CompactedVertices),
    BindingDecl::buffer(3, BufferSlot::CompactedIndices),
    BindingDecl::buffer(4, BufferSlot::InstanceVData),
    BindingDecl::buffer(5, BufferSlot::Materials),
    BindingDecl::buffer(6, BufferSlot::Lights),
    BindingDecl::new(7, TILE_CLASSIFICATION, BindingKind::TextureUint),
    BindingDecl::new(8, CLASSIFICATION_TILE_INPUT, BindingKind::TextureUint),
    BindingDecl::new(9, BUCKET_TILE_INPUT, BindingKind::TextureUint),
];

const LIGHT_TILE_BINDINGS: [BindingDecl; 2] = [
    BindingDecl::buffer(0, BufferSlot::TileFeatureFlags),
    BindingDecl::new(1, CLASSIFICATION_TILE, BindingKind::StorageTexture(TILE_CLASSIFICATION_FORMAT)),
];

const MATERIAL_REDUCTION_BINDINGS: [BindingDecl; 5] = [
    BindingDecl::new(0, VBUFFER0, BindingKind::TextureUint),
    BindingDecl::buffer(1, BufferSlot::InstanceVData),
    BindingDecl::buffer(2, BufferSlot::Materials),
    BindingDecl::new(3, CLASSIFICATION_TILE, BindingKind::StorageTexture(TILE_MAP_FORMAT)),
    BindingDecl::new(4, BUCKET_TILE, BindingKind::StorageTexture(TILE_MAP_FORMAT)),
];

const FINAL_REDUCTION_BINDINGS: [BindingDecl; 4] = [
    BindingDecl::new(5, CLASSIFICATION_TILE_INPUT, BindingKind::TextureUint),
    BindingDecl::new(6, BUCKET_TILE_INPUT, BindingKind::TextureUint),
    BindingDecl::new(7, CLASSIFICATION_TILE, BindingKind::StorageTexture(TILE_MAP_FORMAT)),
    BindingDecl::new(8, BUCKET_TILE, BindingKind::StorageTexture(TILE_MAP_FORMAT)),
];

impl Program {
    /// Stable id used for pipeline labels and cache keys
    pub fn id(&self) -> String {
        match self {
            Self::Visibility(facing) => format!("visibility_{}", facing.label()),
            Self::MaterialDepth => "material_depth".to_string(),
            Self::VBufferLighting(variant) => format!("vbuffer_lighting_{}", variant.keyword_name().to_lowercase()),
            Self::Composite(mode) => format!("composite_{:?}", mode).to_lowercase(),
            Self::DebugView(mode) => format!("debug_view_{}", mode.name()).to_lowercase(),
        }
    }

    /// Pipeline description; `output_format` is the final target's format
    pub fn desc(&self, output_format: wgpu::TextureFormat) -> ProgramDesc {
        let label = self.id();
        match *self {
            Self::Visibility(facing) => ProgramDesc {
                label,
                source: VISIBILITY_WGSL,
                vertex_entry: "vs_main",
                fragment_entry: "fs_main",
                defines: vec![
                    ("CLUSTER_SIZE_IN_INDICES", ShaderDefine::U32(CLUSTER_SIZE_IN_INDICES)),
                    ("TRIANGLE_ID_BITS", ShaderDefine::U32(TRIANGLE_ID_BITS)),
                ],
                bindings: VISIBILITY_BINDINGS.to_vec(),
                color_targets: vec![VBUFFER_FORMAT],
                depth: Some(DepthState { compare: wgpu::CompareFunction::Less, write: true }),
                cull_mode: facing.cull_mode(),
            },
            Self::MaterialDepth => ProgramDesc {
                label,
                source: MATERIAL_DEPTH_WGSL,
                vertex_entry: "vs_fullscreen",
                fragment_entry: "fs_main",
                defines: vec![
                    ("TRIANGLE_ID_BITS", ShaderDefine::U32(TRIANGLE_ID_BITS)),
                    ("MAX_MATERIALS", ShaderDefine::U32(MAX_MATERIALS)),
                ],
                bindings: MATERIAL_DEPTH_BINDINGS.to_vec(),
                color_targets: Vec::new(),
                depth: Some(DepthState { compare: wgpu::CompareFunction::Always, write: true }),
                cull_mode: None,
            },
            Self::VBufferLighting(variant) => ProgramDesc {
                label,
                source: LIGHTING_WGSL,
                vertex_entry: "vs_tile",
                fragment_entry: "fs_main",
                defines: vec![
                    ("CLUSTER_SIZE_IN_INDICES", ShaderDefine::U32(CLUSTER_SIZE_IN_INDICES)),
                    ("TRIANGLE_ID_BITS", ShaderDefine::U32(TRIANGLE_ID_BITS)),
                    ("MAX_MATERIALS", ShaderDefine::U32(MAX_MATERIALS)),
                    ("VARIANT", ShaderDefine::U32(variant.index())),
                ],
                bindings: LIGHTING_BINDINGS.to_vec(),
                color_targets: vec![HDR_FORMAT],
                depth: Some(DepthState { compare: wgpu::CompareFunction::Equal, write: false }),
                cull_mode: None,
            },
            Self::Composite(mode) => ProgramDesc {
                label,
                source: COLOR_LOOKUP_WGSL,
                vertex_entry: "vs_fullscreen",
                fragment_entry: match mode {
                    CompositeMode::ColorLookup => "fs_color_lookup",
                    CompositeMode::Passthrough | CompositeMode::Clear => "fs_passthrough",
                },
                defines: Vec::new(),
                bindings: match mode {
                    CompositeMode::ColorLookup => vec![
                        BindingDecl::new(0, COLOR_BUFFER, BindingKind::TextureFloat),
                        BindingDecl::new(1, USER_LUT, BindingKind::TextureFloat),
                    ],
                    CompositeMode::Passthrough | CompositeMode::Clear => {
                        vec![BindingDecl::new(0, COLOR_BUFFER, BindingKind::TextureFloat)]
                    }
                },
                color_targets: vec![output_format],
                depth: None,
                cull_mode: None,
            },
            Self::DebugView(mode) => {
                let (source, fragment_entry, decl) = match mode.sample_kind() {
                    DebugSampleKind::Uint => (
                        DEBUG_VIEW_WGSL,
                        "fs_main",
                        BindingDecl::new(0, DEBUG_SOURCE, BindingKind::TextureUint),
                    ),
                    DebugSampleKind::Float => (
                        DEBUG_VIEW_FLOAT_WGSL,
                        "fs_color",
                        BindingDecl::new(0, DEBUG_SOURCE, BindingKind::TextureFloat),
                    ),
                    DebugSampleKind::Depth => (
                        DEBUG_VIEW_FLOAT_WGSL,
                        "fs_depth",
                        BindingDecl::new(1, DEBUG_SOURCE, BindingKind::TextureDepth),
                    ),
                };
                ProgramDesc {
                    label,
                    source,
                    vertex_entry: "vs_fullscreen",
                    fragment_entry,
                    defines: vec![
                        ("DEBUG_MODE", ShaderDefine::U32(mode.index())),
                        ("TRIANGLE_ID_BITS", ShaderDefine::U32(TRIANGLE_ID_BITS)),
                        ("MAX_MATERIALS", ShaderDefine::U32(MAX_MATERIALS)),
                    ],
                    bindings: vec![decl],
                    color_targets: vec![output_format],
                    depth: None,
                    cull_mode: None,
                }
            }
        }
    }
}

impl Kernel {
    pub fn entry_point(&self) -> &'static str {
        match self {
            Self::LightTileClassification => "CreateVisibilityBuffClassification",
            Self::MaterialReduction { .. } => "MaterialReduction",
            Self::FinalReduction { .. } => "FinalReduction",
        }
    }

    pub fn id(&self) -> String {
        match self {
            Self::LightTileClassification => self.entry_point().to_string(),
            Self::MaterialReduction { fan_in } | Self::FinalReduction { fan_in } => {
                format!("{}_{}x{}", self.entry_point(), fan_in, fan_in)
            }
        }
    }

    pub fn desc(&self) -> KernelDesc {
        let label = self.id();
        let entry_point = self.entry_point();
        match *self {
            Self::LightTileClassification => KernelDesc {
                label,
                source: TILE_CLASSIFICATION_WGSL,
                entry_point,
                defines: vec![("GROUP_SIZE", ShaderDefine::U32(CLASSIFICATION_GROUP_SIZE))],
                bindings: LIGHT_TILE_BINDINGS.to_vec(),
            },
            Self::MaterialReduction { fan_in } | Self::FinalReduction { fan_in } => KernelDesc {
                label,
                source: MATERIAL_TILE_WGSL,
                entry_point,
                defines: vec![
                    ("FAN_IN", ShaderDefine::U32(fan_in)),
                    ("TRIANGLE_ID_BITS", ShaderDefine::U32(TRIANGLE_ID_BITS)),
                    ("MAX_MATERIALS", ShaderDefine::U32(MAX_MATERIALS)),
                ],
                bindings: if matches!(self, Self::MaterialReduction { .. }) {
                    MATERIAL_REDUCTION_BINDINGS.to_vec()
                } else {
                    FINAL_REDUCTION_BINDINGS.to_vec()
                },
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::cache::apply_defines;
    use naga::valid::{Capabilities, ModuleInfo, ValidationFlags, Validator};

    fn unique_bindings(decls: &[BindingDecl]) -> bool {
        decls.iter().enumerate().all(|(i, a)| {
            decls[i + 1..].iter().all(|b| a.binding != b.binding && a.name != b.name)
        })
    }

    #[test]
    fn kernels_keep_their_entry_point_names() {
        assert_eq!(Kernel::LightTileClassification.entry_point(), "CreateVisibilityBuffClassification");
        assert_eq!(Kernel::MaterialReduction { fan_in: 8 }.entry_point(), "MaterialReduction");
        assert_eq!(Kernel::FinalReduction { fan_in: 8 }.entry_point(), "FinalReduction");
        assert_ne!(Kernel::FinalReduction { fan_in: 8 }.id(), Kernel::FinalReduction { fan_in: 4 }.id());
    }

    #[test]
    fn binding_tables_are_unique() {
        let format = wgpu::TextureFormat::Bgra8UnormSrgb;
        for facing in ClusterFacing::ALL {
            assert!(unique_bindings(&Program::Visibility(facing).desc(format).bindings));
        }
        for variant in LightVariant::ALL {
            assert!(unique_bindings(&Program::VBufferLighting(variant).desc(format).bindings));
        }
        for kernel in [
            Kernel::LightTileClassification,
            Kernel::MaterialReduction { fan_in: 8 },
            Kernel::FinalReduction { fan_in: 8 },
        ] {
            assert!(unique_bindings(&kernel.desc().bindings));
        }
    }

    #[test]
    fn reduction_entry_points_share_a_module_without_clashing() {
        let first = Kernel::MaterialReduction { fan_in: 8 }.desc();
        let second = Kernel::FinalReduction { fan_in: 8 }.desc();
        assert!(first
            .bindings
            .iter()
            .all(|a| second.bindings.iter().all(|b| a.binding != b.binding)));
    }

    #[test]
    fn lighting_variants_bake_their_index() {
        let desc = Program::VBufferLighting(LightVariant::DirPunctualEnv).desc(HDR_FORMAT);
        assert!(desc.defines.contains(&("VARIANT", ShaderDefine::U32(1))));
        assert_eq!(desc.depth.map(|d| d.compare), Some(wgpu::CompareFunction::Equal));
    }

    /// One compiled shader variant with the bindings its pipeline declares
    struct CompiledShader {
        label: String,
        module: naga::Module,
        info: ModuleInfo,
        entry_points: Vec<&'static str>,
        bindings: Vec<BindingDecl>,
    }

    fn compile(
        label: String,
        source: &'static str,
        defines: &[(&'static str, ShaderDefine)],
        entry_points: Vec<&'static str>,
        bindings: Vec<BindingDecl>,
    ) -> CompiledShader {
        let wgsl = apply_defines(source, defines);
        let module = naga::front::wgsl::parse_str(&wgsl)
            .unwrap_or_else(|e| panic!("{} failed to parse:\n{}", label, e.emit_to_string(&wgsl)));
        let info = Validator::new(ValidationFlags::all(), Capabilities::all())
            .validate(&module)
            .unwrap_or_else(|e| panic!("{} failed validation: {:?}", label, e));
        CompiledShader { label, module, info, entry_points, bindings }
    }

    fn every_shader() -> Vec<CompiledShader> {
        let mut programs: Vec<Program> = ClusterFacing::ALL.into_iter().map(Program::Visibility).collect();
        programs.push(Program::MaterialDepth);
        programs.extend(LightVariant::ALL.into_iter().map(Program::VBufferLighting));
        let composites = [CompositeMode::Clear, CompositeMode::Passthrough, CompositeMode::ColorLookup];
        programs.extend(composites.map(Program::Composite));
        programs.extend(FullScreenDebugMode::ALL.into_iter().map(Program::DebugView));

        let mut shaders: Vec<CompiledShader> = programs
            .into_iter()
            .map(|program| {
                let desc = program.desc(wgpu::TextureFormat::Bgra8UnormSrgb);
                let entry_points = vec![desc.vertex_entry, desc.fragment_entry];
                compile(desc.label, desc.source, &desc.defines, entry_points, desc.bindings)
            })
            .collect();

        let mut kernels = vec![Kernel::LightTileClassification];
        for fan_in in [4, 8, 16] {
            kernels.push(Kernel::MaterialReduction { fan_in });
            kernels.push(Kernel::FinalReduction { fan_in });
        }
        shaders.extend(kernels.into_iter().map(|kernel| {
            let desc = kernel.desc();
            compile(desc.label, desc.source, &desc.defines, vec![desc.entry_point], desc.bindings)
        }));
        shaders
    }

    fn naga_storage_format(format: wgpu::TextureFormat) -> Option<naga::StorageFormat> {
        match format {
            wgpu::TextureFormat::R32Uint => Some(naga::StorageFormat::R32Uint),
            wgpu::TextureFormat::Rg32Uint => Some(naga::StorageFormat::Rg32Uint),
            _ => None,
        }
    }

    fn declared_as(module: &naga::Module, global: &naga::GlobalVariable, kind: BindingKind) -> bool {
        use naga::{ImageClass, ImageDimension, ScalarKind, TypeInner};

        let image = match &module.types[global.ty].inner {
            TypeInner::Image { dim: ImageDimension::D2, arrayed: false, class } => Some(*class),
            _ => None,
        };
        match (kind, image) {
            (BindingKind::StorageBuffer, None) => matches!(global.space, naga::AddressSpace::Storage { .. }),
            (BindingKind::TextureUint, Some(ImageClass::Sampled { kind: ScalarKind::Uint, multi: false })) => true,
            (BindingKind::TextureFloat, Some(ImageClass::Sampled { kind: ScalarKind::Float, multi: false })) => true,
            (BindingKind::TextureDepth, Some(ImageClass::Depth { multi: false })) => true,
            (BindingKind::StorageTexture(format), Some(ImageClass::Storage { format: storage, .. })) => {
                naga_storage_format(format) == Some(storage)
            }
            _ => false,
        }
    }

    #[test]
    fn every_shader_variant_parses_and_validates() {
        // Panics inside `compile` name the failing variant.
        assert!(every_shader().len() > 20);
    }

    #[test]
    fn shader_globals_match_the_declared_bindings() {
        for shader in every_shader() {
            let CompiledShader { label, module, info, entry_points, bindings } = &shader;

            let mut used = Vec::new();
            for name in entry_points {
                let index = module
                    .entry_points
                    .iter()
                    .position(|entry| entry.name == *name)
                    .unwrap_or_else(|| panic!("{}: no entry point '{}'", label, name));
                let function = info.get_entry_point(index);
                used.extend(
                    module
                        .global_variables
                        .iter()
                        .filter(|(handle, _)| !function[*handle].is_empty())
                        .map(|(_, global)| global),
                );
            }

            for global in used {
                let Some(binding) = &global.binding else { continue };
                let name = global.name.as_deref().unwrap_or("?");
                match binding.group {
                    // Camera and pass constants
                    0 => {
                        assert!(binding.binding < 2, "{}: '{}' at global binding {}", label, name, binding.binding)
                    }
                    1 => {
                        let decl = bindings.iter().find(|decl| decl.binding == binding.binding).unwrap_or_else(|| {
                            panic!("{}: '{}' at binding {} is not declared", label, name, binding.binding)
                        });
                        assert!(
                            declared_as(module, global, decl.kind),
                            "{}: '{}' is not a {:?}",
                            label,
                            name,
                            decl.kind
                        );
                    }
                    group => panic!("{}: '{}' in unexpected group {}", label, name, group),
                }
            }

            for decl in bindings {
                let global = module
                    .global_variables
                    .iter()
                    .map(|(_, global)| global)
                    .find(|global| global.binding.as_ref().map(|b| (b.group, b.binding)) == Some((1, decl.binding)))
                    .unwrap_or_else(|| {
                        panic!("{}: {} (binding {}) has no shader global", label, decl.name, decl.binding)
                    });
                assert!(declared_as(module, global, decl.kind), "{}: {} is not a {:?}", label, decl.name, decl.kind);
            }
        }
    }

    #[test]
    fn shader_structs_match_their_rust_layouts() {
        use std::mem::size_of;

        let expected = [
            ("Camera", size_of::<crate::camera::Camera>()),
            ("PassConstants", size_of::<crate::recipe::PassConstants>()),
            ("CompactedVertex", size_of::<crate::geometry::CompactedVertex>()),
            ("InstanceVData", size_of::<crate::geometry::InstanceVData>()),
            ("GpuMaterial", size_of::<crate::material::GpuMaterial>()),
            ("GpuLight", size_of::<crate::GpuLight>()),
        ];
        let mut seen = Vec::new();
        for shader in every_shader() {
            for (_, ty) in shader.module.types.iter() {
                let (Some(name), naga::TypeInner::Struct { span, .. }) = (&ty.name, &ty.inner) else { continue };
                let Some(&(_, size)) = expected.iter().find(|(wanted, _)| wanted == name) else { continue };
                assert_eq!(*span as usize, size, "{}: WGSL `{}` is {} bytes", shader.label, name, span);
                seen.push(name.clone());
            }
        }
        for (name, _) in expected {
            assert!(seen.iter().any(|found| found == name), "no shader declares `{}`", name);
        }
        assert_eq!(size_of::<crate::recipe::PassConstants>(), 48);
    }
}
