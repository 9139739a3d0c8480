//! Main renderer implementation

use crate::camera::Camera;
use crate::color_lookup::{ColorLookup, DEFAULT_LUT_SIZE};
use crate::debug::DebugDisplaySettings;
use crate::executor::{ImportedTexture, WgpuExecutor};
use crate::geometry::{BufferInfo, ClusterBatches, CompactedGeometry, CompactedVertex, InstanceVData, MAX_INSTANCE_SLOT};
use crate::graph::{FrameContext, FramePlan, RenderGraph};
use crate::material::MaterialRegistry;
use crate::passes::{handles, register_passes, PassSettings};
use crate::recipe::{BufferSlot, CameraCaptureFlags};
use crate::tiles::{Extent, ReductionConfig, LIGHT_TILE_SIZE, TILE_SIZE};
use crate::{Error, Result};
use glam::Vec3;
use std::collections::HashMap;
use std::sync::Arc;

/// Maximum number of lights uploaded per frame
pub const MAX_LIGHTS: usize = 256;

/// Main renderer configuration
#[derive(Debug, Clone)]
pub struct RendererConfig {
    pub width: u32,
    pub height: u32,
    /// Format of the target passed to [`Renderer::render`]
    pub output_format: wgpu::TextureFormat,
    /// Classification and lighting tile size in pixels
    pub tile_size: u32,
    /// Granularity of the light feature flag buffer
    pub light_tile_size: u32,
    pub reduction: ReductionConfig,
    /// Edge length of the color grading LUT
    pub color_grading_lut_size: u32,
    pub clear_color: wgpu::Color,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            output_format: wgpu::TextureFormat::Bgra8UnormSrgb,
            tile_size: TILE_SIZE,
            light_tile_size: LIGHT_TILE_SIZE,
            reduction: ReductionConfig::default(),
            color_grading_lut_size: DEFAULT_LUT_SIZE,
            clear_color: wgpu::Color::BLACK,
        }
    }
}

impl RendererConfig {
    pub fn validate(&self) -> Result<()> {
        self.reduction.validate()?;
        if self.reduction.tile_size() != self.tile_size {
            return Err(Error::Config(format!(
                "Reduction {:?} produces {}px tiles, expected {}px",
                self.reduction.fan_in,
                self.reduction.tile_size(),
                self.tile_size
            )));
        }
        if self.light_tile_size == 0 || self.tile_size % self.light_tile_size != 0 {
            return Err(Error::Config(format!(
                "Light tile size {} does not divide tile size {}",
                self.light_tile_size, self.tile_size
            )));
        }
        if self.color_grading_lut_size < 2 {
            return Err(Error::Config(format!(
                "Color grading LUT size {} is too small",
                self.color_grading_lut_size
            )));
        }
        Ok(())
    }

    pub fn extent(&self) -> Extent {
        Extent::new(self.width, self.height)
    }

    pub fn pass_settings(&self) -> PassSettings {
        PassSettings {
            tile_size: self.tile_size,
            light_tile_size: self.light_tile_size,
            reduction: self.reduction.clone(),
        }
    }
}

/// Light types understood by the lighting shader
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LightKind {
    Directional,
    Point,
    /// Cone half-angles in radians
    Spot { inner_angle: f32, outer_angle: f32 },
    /// Spherical emitter
    Area { radius: f32 },
}

impl LightKind {
    fn gpu_kind(&self) -> u32 {
        match self {
            Self::Directional => 0,
            Self::Point => 1,
            Self::Spot { .. } => 2,
            Self::Area { .. } => 3,
        }
    }
}

/// A light as supplied by the host scene
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SceneLight {
    pub kind: LightKind,
    pub position: Vec3,
    /// Normalized direction (directional and spot lights)
    pub direction: Vec3,
    pub color: Vec3,
    pub intensity: f32,
    /// Attenuation range (point, spot and area lights)
    pub range: f32,
}

impl Default for SceneLight {
    fn default() -> Self {
        Self {
            kind: LightKind::Directional,
            position: Vec3::new(10.0, 15.0, 10.0),
            direction: Vec3::new(0.408, -0.816, 0.408),
            color: Vec3::ONE,
            intensity: 1.0,
            range: 100.0,
        }
    }
}

/// GPU-side light data (must match WGSL `GpuLight` in vbuffer_lighting.wgsl)
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GpuLight {
    pub position: [f32; 3],
    pub kind: u32,
    pub direction: [f32; 3],
    pub range: f32,
    pub color: [f32; 3],
    pub intensity: f32,
    /// Cosines of the inner and outer spot angles
    pub spot: [f32; 2],
    pub size: f32,
    pub _pad: f32,
}

impl From<&SceneLight> for GpuLight {
    fn from(light: &SceneLight) -> Self {
        let (spot, size) = match light.kind {
            LightKind::Spot { inner_angle, outer_angle } => ([inner_angle.cos(), outer_angle.cos()], 0.0),
            LightKind::Area { radius } => ([0.0, 0.0], radius),
            LightKind::Directional | LightKind::Point => ([0.0, 0.0], 0.0),
        };
        Self {
            position: light.position.to_array(),
            kind: light.kind.gpu_kind(),
            direction: light.direction.normalize_or_zero().to_array(),
            range: light.range,
            color: light.color.to_array(),
            intensity: light.intensity,
            spot,
            size,
            _pad: 0.0,
        }
    }
}

/// Main renderer
pub struct Renderer {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    config: RendererConfig,

    graph: RenderGraph,
    executor: WgpuExecutor,
    materials: MaterialRegistry,
    materials_dirty: bool,

    // Frame inputs
    geometry: CompactedGeometry,
    light_count: u32,
    feature_grid: Option<Extent>,
    color_lookup: ColorLookup,
    lut: Option<(wgpu::Texture, wgpu::TextureView)>,
    debug: DebugDisplaySettings,

    camera_capture: CameraCaptureFlags,
    frame_count: u64,
}

impl Renderer {
    /// Create a new renderer
    pub fn new(device: Arc<wgpu::Device>, queue: Arc<wgpu::Queue>, config: RendererConfig) -> Result<Self> {
        log::info!("Creating Helio VBuffer renderer");
        log::info!("  Output format: {:?}", config.output_format);
        log::info!("  Resolution: {}x{}", config.width, config.height);
        log::info!("  Tiles: {}px, reduction {:?}", config.tile_size, config.reduction.fan_in);

        config.validate()?;

        let mut graph = RenderGraph::new();
        register_passes(&mut graph, &config.pass_settings())?;

        let executor = WgpuExecutor::new(device.clone(), queue.clone(), config.output_format);

        Ok(Self {
            device,
            queue,
            config,
            graph,
            executor,
            materials: MaterialRegistry::new(),
            materials_dirty: true,
            geometry: CompactedGeometry::default(),
            light_count: 0,
            feature_grid: None,
            color_lookup: ColorLookup::default(),
            lut: None,
            debug: DebugDisplaySettings::default(),
            camera_capture: CameraCaptureFlags::empty(),
            frame_count: 0,
        })
    }

    // ── Scene inputs ──────────────────────────────────────────────────────────

    /// Material registry; the GPU table is re-uploaded before the next frame
    pub fn materials_mut(&mut self) -> &mut MaterialRegistry {
        self.materials_dirty = true;
        &mut self.materials
    }

    pub fn materials(&self) -> &MaterialRegistry {
        &self.materials
    }

    /// Upload this frame's compacted geometry
    ///
    /// An empty slice counts as a missing buffer, which skips the visibility
    /// pipeline until all three are present again.
    pub fn set_compacted_geometry(
        &mut self,
        vertices: &[CompactedVertex],
        indices: &[u32],
        instances: &[InstanceVData],
        batches: ClusterBatches,
    ) -> Result<()> {
        check_cluster_batches(&batches, instances.len())?;

        let buffers = self.executor.buffers_mut();
        buffers.upload(BufferSlot::CompactedVertices, bytemuck::cast_slice(vertices));
        buffers.upload(BufferSlot::CompactedIndices, bytemuck::cast_slice(indices));
        buffers.upload(BufferSlot::InstanceVData, bytemuck::cast_slice(instances));

        let info = |len: usize| (len > 0).then_some(BufferInfo { len: len as u32 });
        self.geometry = CompactedGeometry {
            vertices: info(vertices.len()),
            indices: info(indices.len()),
            instances: info(instances.len()),
            batches,
        };
        log::trace!(
            "Compacted geometry: {} vertices, {} indices, {} instances",
            vertices.len(),
            indices.len(),
            instances.len()
        );
        Ok(())
    }

    pub fn clear_compacted_geometry(&mut self) {
        let buffers = self.executor.buffers_mut();
        buffers.clear(BufferSlot::CompactedVertices);
        buffers.clear(BufferSlot::CompactedIndices);
        buffers.clear(BufferSlot::InstanceVData);
        self.geometry = CompactedGeometry::default();
    }

    pub fn set_lights(&mut self, lights: &[SceneLight]) {
        if lights.len() > MAX_LIGHTS {
            log::warn!("{} lights supplied, only the first {} are used", lights.len(), MAX_LIGHTS);
        }
        let gpu_lights: Vec<GpuLight> = lights.iter().take(MAX_LIGHTS).map(GpuLight::from).collect();
        self.executor
            .buffers_mut()
            .upload(BufferSlot::Lights, bytemuck::cast_slice(&gpu_lights));
        self.light_count = gpu_lights.len() as u32;
    }

    /// Upload per-light-tile feature flags laid out row-major over `grid`
    pub fn set_tile_feature_flags(&mut self, flags: &[u32], grid: Extent) -> Result<()> {
        if flags.is_empty() {
            self.executor.buffers_mut().clear(BufferSlot::TileFeatureFlags);
            self.feature_grid = None;
            return Ok(());
        }
        if (flags.len() as u64) < grid.area() {
            return Err(Error::Resource(format!(
                "{} feature flags do not cover a {}x{} light tile grid",
                flags.len(),
                grid.width,
                grid.height
            )));
        }
        self.executor
            .buffers_mut()
            .upload(BufferSlot::TileFeatureFlags, bytemuck::cast_slice(flags));
        self.feature_grid = Some(grid);
        Ok(())
    }

    /// Set the color lookup volume, uploading `lut` (RGBA8, linear) if given
    ///
    /// Without LUT data the previously uploaded texture is dropped and the
    /// composite passes color through.
    pub fn set_color_lookup(&mut self, lookup: ColorLookup, lut: Option<&[u8]>) -> Result<()> {
        let lut_size = self.config.color_grading_lut_size;
        self.color_lookup = lookup;
        let (Some(desc), Some(data)) = (lookup.lut, lut) else {
            self.lut = None;
            return Ok(());
        };
        if !lookup.validate_lut(lut_size) {
            self.lut = None;
            return Err(Error::Config(format!(
                "Color lookup texture {}x{} does not match the {} LUT size",
                desc.width, desc.height, lut_size
            )));
        }
        let expected = desc.width as usize * desc.height as usize * 4;
        if data.len() != expected {
            self.lut = None;
            return Err(Error::Resource(format!(
                "Color lookup data is {} bytes, expected {}",
                data.len(),
                expected
            )));
        }

        let size = wgpu::Extent3d { width: desc.width, height: desc.height, depth_or_array_layers: 1 };
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(handles::USER_LUT),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        self.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            data,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(desc.width * 4),
                rows_per_image: Some(desc.height),
            },
            size,
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        log::debug!("Uploaded {}x{} color lookup texture", desc.width, desc.height);
        self.lut = Some((texture, view));
        Ok(())
    }

    pub fn debug_settings_mut(&mut self) -> &mut DebugDisplaySettings {
        &mut self.debug
    }

    /// Camera textures requested by the last rendered frame
    pub fn camera_capture(&self) -> CameraCaptureFlags {
        self.camera_capture
    }

    // ── Frame rendering ───────────────────────────────────────────────────────

    fn frame_context(&self) -> FrameContext<'_> {
        let mut frame = FrameContext::new(self.config.extent(), &self.materials)
            .with_geometry(self.geometry)
            .with_lights(self.light_count, self.feature_grid)
            .with_color_lookup(self.color_lookup, self.config.color_grading_lut_size, self.lut.is_some())
            .with_debug(self.debug);
        frame.frame = self.frame_count;
        frame.clear_color = self.config.clear_color;
        frame
    }

    /// Plan the next frame without submitting it
    pub fn frame_plan(&self) -> Result<FramePlan> {
        self.graph.plan(&self.frame_context())
    }

    /// Render a frame into `target`
    pub fn render(&mut self, camera: &Camera, target: &wgpu::TextureView) -> Result<()> {
        log::trace!("Rendering frame {}", self.frame_count);

        if self.materials_dirty {
            let table = self.materials.gpu_table();
            self.executor
                .buffers_mut()
                .upload(BufferSlot::Materials, bytemuck::cast_slice(&table));
            self.materials_dirty = false;
        }

        let plan = self.frame_plan()?;
        for (name, reason) in &plan.skipped {
            log::trace!("  Skipped pass '{}': {:?}", name, reason);
        }

        let extent = self.config.extent();
        let mut imports = HashMap::new();
        imports.insert(handles::output(), ImportedTexture { view: target, extent });
        if let Some((texture, view)) = &self.lut {
            let lut_extent = Extent::new(texture.width(), texture.height());
            imports.insert(handles::user_lut(), ImportedTexture { view, extent: lut_extent });
        }

        let camera = camera.with_viewport(extent.width, extent.height);
        self.executor.run(&plan, &camera, &imports)?;

        self.camera_capture = plan.camera_capture;
        self.frame_count += 1;
        Ok(())
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        log::info!("Resizing renderer to {}x{}", width, height);
        self.config.width = width;
        self.config.height = height;
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }
}

/// Batch counts must sum within `u32` and within the uploaded instances,
/// and every instance slot must fit a visibility id
fn check_cluster_batches(batches: &ClusterBatches, instance_count: usize) -> Result<u32> {
    let total = batches
        .total()
        .ok_or_else(|| Error::Resource(format!("Cluster batch counts {:?} overflow u32", batches)))?;
    if total as usize > instance_count {
        return Err(Error::Resource(format!(
            "Cluster batches draw {} instances but only {} were uploaded",
            total, instance_count
        )));
    }
    if instance_count as u64 > MAX_INSTANCE_SLOT as u64 + 1 {
        return Err(Error::Resource(format!(
            "{} cluster instances exceed the visibility id range",
            instance_count
        )));
    }
    Ok(total)
}
