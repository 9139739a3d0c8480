//! Pipeline cache, one compiled pipeline per program or kernel variant

use super::{BindingDecl, Kernel, Program, ShaderDefine};
use crate::resources::BindGroupLayouts;
use crate::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;

/// Key for pipeline cache lookup
#[derive(Hash, Eq, PartialEq, Clone, Copy, Debug)]
pub enum PipelineKey {
    Render(Program),
    Compute(Kernel),
}

/// A cached render pipeline with its pass-level layout
#[derive(Clone)]
pub struct RenderEntry {
    pub pipeline: Arc<wgpu::RenderPipeline>,
    pub pass_layout: Arc<wgpu::BindGroupLayout>,
    pub bindings: Vec<BindingDecl>,
}

/// A cached compute pipeline with its pass-level layout
#[derive(Clone)]
pub struct ComputeEntry {
    pub pipeline: Arc<wgpu::ComputePipeline>,
    pub pass_layout: Arc<wgpu::BindGroupLayout>,
    pub bindings: Vec<BindingDecl>,
}

/// Lazily compiles and caches pipelines
pub struct PipelineCache {
    device: Arc<wgpu::Device>,
    layouts: Arc<BindGroupLayouts>,
    output_format: wgpu::TextureFormat,
    render: HashMap<PipelineKey, RenderEntry>,
    compute: HashMap<PipelineKey, ComputeEntry>,
}

impl PipelineCache {
    pub fn new(device: Arc<wgpu::Device>, layouts: Arc<BindGroupLayouts>, output_format: wgpu::TextureFormat) -> Self {
        Self {
            device,
            layouts,
            output_format,
            render: HashMap::new(),
            compute: HashMap::new(),
        }
    }

    /// Get or create the render pipeline of `program`
    pub fn render(&mut self, program: Program) -> Result<RenderEntry> {
        let key = PipelineKey::Render(program);
        if let Some(entry) = self.render.get(&key) {
            log::trace!("Using cached pipeline: {:?}", key);
            return Ok(entry.clone());
        }

        log::info!("Creating new pipeline variant: {:?}", key);
        let desc = program.desc(self.output_format);
        let visibility = wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT;
        let pass_layout = Arc::new(BindGroupLayouts::pass_layout(&self.device, &desc.label, &desc.bindings, visibility));

        let pipeline = self.with_error_scope(&desc.label, |device| {
            let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(&desc.label),
                source: wgpu::ShaderSource::Wgsl(apply_defines(desc.source, &desc.defines).into()),
            });
            let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(&format!("{}_layout", desc.label)),
                bind_group_layouts: &[&self.layouts.global, &pass_layout],
                push_constant_ranges: &[],
            });
            let targets: Vec<Option<wgpu::ColorTargetState>> = desc
                .color_targets
                .iter()
                .map(|&format| {
                    // Integer targets do not support blending.
                    let integer = matches!(
                        format.sample_type(None, None),
                        Some(wgpu::TextureSampleType::Uint | wgpu::TextureSampleType::Sint)
                    );
                    Some(wgpu::ColorTargetState {
                        format,
                        blend: (!integer).then_some(wgpu::BlendState::REPLACE),
                        write_mask: wgpu::ColorWrites::ALL,
                    })
                })
                .collect();

            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(&desc.label),
                layout: Some(&layout),
                cache: None,
                vertex: wgpu::VertexState {
                    module: &module,
                    entry_point: desc.vertex_entry,
                    buffers: &[],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &module,
                    entry_point: desc.fragment_entry,
                    targets: &targets,
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    strip_index_format: None,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: desc.cull_mode,
                    polygon_mode: wgpu::PolygonMode::Fill,
                    unclipped_depth: false,
                    conservative: false,
                },
                depth_stencil: desc.depth.map(|depth| wgpu::DepthStencilState {
                    format: super::DEPTH_FORMAT,
                    depth_write_enabled: depth.write,
                    depth_compare: depth.compare,
                    stencil: wgpu::StencilState::default(),
                    bias: wgpu::DepthBiasState::default(),
                }),
                multisample: wgpu::MultisampleState {
                    count: 1,
                    mask: !0,
                    alpha_to_coverage_enabled: false,
                },
                multiview: None,
            })
        })?;

        let entry = RenderEntry { pipeline: Arc::new(pipeline), pass_layout, bindings: desc.bindings };
        self.render.insert(key, entry.clone());
        Ok(entry)
    }

    /// Get or create the compute pipeline of `kernel`
    pub fn compute(&mut self, kernel: Kernel) -> Result<ComputeEntry> {
        let key = PipelineKey::Compute(kernel);
        if let Some(entry) = self.compute.get(&key) {
            log::trace!("Using cached pipeline: {:?}", key);
            return Ok(entry.clone());
        }

        log::info!("Creating new compute pipeline: {:?}", key);
        let desc = kernel.desc();
        let pass_layout = Arc::new(BindGroupLayouts::pass_layout(
            &self.device,
            &desc.label,
            &desc.bindings,
            wgpu::ShaderStages::COMPUTE,
        ));

        let pipeline = self.with_error_scope(&desc.label, |device| {
            let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(&desc.label),
                source: wgpu::ShaderSource::Wgsl(apply_defines(desc.source, &desc.defines).into()),
            });
            let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(&format!("{}_layout", desc.label)),
                bind_group_layouts: &[&self.layouts.global, &pass_layout],
                push_constant_ranges: &[],
            });
            device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(&desc.label),
                layout: Some(&layout),
                module: &module,
                entry_point: desc.entry_point,
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                cache: None,
            })
        })?;

        let entry = ComputeEntry { pipeline: Arc::new(pipeline), pass_layout, bindings: desc.bindings };
        self.compute.insert(key, entry.clone());
        Ok(entry)
    }

    /// Run `create` inside a validation error scope on native targets
    fn with_error_scope<T>(&self, label: &str, create: impl FnOnce(&wgpu::Device) -> T) -> Result<T> {
        #[cfg(not(target_arch = "wasm32"))]
        {
            self.device.push_error_scope(wgpu::ErrorFilter::Validation);
            let created = create(&self.device);
            if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
                log::error!("Pipeline '{}' failed validation: {}", label, err);
                return Err(Error::Shader(format!("{}: {}", label, err)));
            }
            Ok(created)
        }
        #[cfg(target_arch = "wasm32")]
        {
            log::debug!("Creating pipeline '{}' without error scope", label);
            Ok(create(&self.device))
        }
    }

    pub fn len(&self) -> usize {
        self.render.len() + self.compute.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clear the pipeline cache
    pub fn clear(&mut self) {
        log::info!("Clearing pipeline cache ({} pipelines)", self.len());
        self.render.clear();
        self.compute.clear();
    }
}

/// Prepend shader defines to WGSL source as module-scope constants
pub(crate) fn apply_defines(source: &str, defines: &[(&'static str, ShaderDefine)]) -> String {
    let mut result = String::new();

    for (name, value) in defines {
        match value {
            ShaderDefine::Bool(b) => {
                result.push_str(&format!("const {}: bool = {};\n", name, b));
            }
            ShaderDefine::U32(u) => {
                result.push_str(&format!("const {}: u32 = {}u;\n", name, u));
            }
            ShaderDefine::F32(f) => {
                result.push_str(&format!("const {}: f32 = {:?};\n", name, f));
            }
        }
    }

    result.push_str(source);
    result
}
