//! Render pass trait and per-frame planning context

use super::{PassResourceBuilder, ResourceHandle};
use crate::color_lookup::{ColorLookup, DEFAULT_LUT_SIZE};
use crate::debug::{DebugDisplaySettings, DebugTexture, FullScreenDebugMode};
use crate::geometry::CompactedGeometry;
use crate::material::MaterialRegistry;
use crate::recipe::PassRecipe;
use crate::tiles::Extent;
use std::collections::{HashMap, HashSet};

/// Render pass trait - implemented by all rendering passes
pub trait RenderPass: Send + Sync {
    /// Unique name for this pass
    fn name(&self) -> &str;

    /// Declare resource dependencies
    ///
    /// Called once during graph building to determine pass ordering.
    /// Passes should declare which resources they read, write, or create.
    fn declare_resources(&self, _builder: &mut PassResourceBuilder) {
        // Default: no resource dependencies
    }

    /// Record this frame's work
    ///
    /// Called every frame for passes whose required inputs exist. Returning
    /// `None` skips the pass and leaves its outputs unavailable.
    fn record(&self, frame: &FrameContext, resources: &FrameResources) -> Option<PassRecipe>;
}

/// Per-frame inputs shared by every pass
#[derive(Debug, Clone)]
pub struct FrameContext<'a> {
    pub frame: u64,
    /// Screen extent in pixels
    pub extent: Extent,
    pub geometry: CompactedGeometry,
    pub materials: &'a MaterialRegistry,
    pub light_count: u32,
    /// Light-tile grid of the feature flag buffer, `None` when not uploaded
    pub feature_grid: Option<Extent>,
    pub color_lookup: ColorLookup,
    /// Whether a LUT texture is bound for `color_lookup`
    pub lut_uploaded: bool,
    pub lut_size: u32,
    pub debug: DebugDisplaySettings,
    pub clear_color: wgpu::Color,
}

impl<'a> FrameContext<'a> {
    pub fn new(extent: Extent, materials: &'a MaterialRegistry) -> Self {
        Self {
            frame: 0,
            extent,
            geometry: CompactedGeometry::default(),
            materials,
            light_count: 0,
            feature_grid: None,
            color_lookup: ColorLookup::default(),
            lut_uploaded: false,
            lut_size: DEFAULT_LUT_SIZE,
            debug: DebugDisplaySettings::default(),
            clear_color: wgpu::Color::BLACK,
        }
    }

    pub fn with_geometry(mut self, geometry: CompactedGeometry) -> Self {
        self.geometry = geometry;
        self
    }

    pub fn with_lights(mut self, light_count: u32, feature_grid: Option<Extent>) -> Self {
        self.light_count = light_count;
        self.feature_grid = feature_grid;
        self
    }

    pub fn with_color_lookup(mut self, lookup: ColorLookup, lut_size: u32, uploaded: bool) -> Self {
        self.color_lookup = lookup;
        self.lut_size = lut_size;
        self.lut_uploaded = uploaded;
        self
    }

    pub fn with_debug(mut self, debug: DebugDisplaySettings) -> Self {
        self.debug = debug;
        self
    }

    /// Whether the color lookup should grade this frame
    pub fn color_lookup_active(&self) -> bool {
        self.lut_uploaded && self.color_lookup.is_active(self.lut_size)
    }
}

/// Resources produced so far in the frame being planned
#[derive(Debug, Default)]
pub struct FrameResources {
    available: HashSet<ResourceHandle>,
    debug_textures: HashMap<FullScreenDebugMode, DebugTexture>,
}

impl FrameResources {
    pub(super) fn with_imports(imports: impl IntoIterator<Item = ResourceHandle>) -> Self {
        Self { available: imports.into_iter().collect(), debug_textures: HashMap::new() }
    }

    pub fn is_available(&self, handle: ResourceHandle) -> bool {
        self.available.contains(&handle)
    }

    pub fn debug_texture(&self, mode: FullScreenDebugMode) -> Option<&DebugTexture> {
        self.debug_textures.get(&mode)
    }

    pub(super) fn insert(&mut self, handle: ResourceHandle) {
        self.available.insert(handle);
    }

    pub(super) fn export_debug(&mut self, mode: FullScreenDebugMode, texture: DebugTexture) {
        self.debug_textures.insert(mode, texture);
    }

    pub(super) fn into_debug_textures(self) -> HashMap<FullScreenDebugMode, DebugTexture> {
        self.debug_textures
    }
}
