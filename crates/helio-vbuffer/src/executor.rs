//! wgpu submission of a planned frame
//!
//! The executor is the only place that touches GPU objects. It owns the
//! uniform buffers, the external storage buffers, the texture pool and the
//! pipeline cache, and turns each [`PassRecipe`] of a [`FramePlan`] into a
//! render or compute pass on one command encoder.

use crate::camera::Camera;
use crate::graph::{FramePlan, ResourceHandle};
use crate::pipeline::{BindingDecl, PipelineCache};
use crate::recipe::{
    Binding, BindingResource, Command, DepthAccess, PassConstants, PassKind, PassRecipe, TextureLifetime, Viewport,
};
use crate::resources::{BindGroupBuilder, BindGroupLayouts, ExternalBuffers, TextureKey, TexturePool, CONSTANTS_STRIDE};
use crate::tiles::Extent;
use crate::{Error, Result};
use std::collections::HashMap;
use std::ops::Range;
use std::sync::Arc;

/// Records reserved in the constants buffer at startup
const INITIAL_CONSTANT_RECORDS: u64 = 64;

/// A texture owned outside the graph (the output target, the user LUT)
#[derive(Clone, Copy)]
pub struct ImportedTexture<'a> {
    pub view: &'a wgpu::TextureView,
    pub extent: Extent,
}

struct PooledTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    key: TextureKey,
    extent: Extent,
    lifetime: TextureLifetime,
}

/// Textures live during one frame, pooled or imported
struct FrameTextures<'a> {
    pooled: HashMap<ResourceHandle, PooledTexture>,
    imported: &'a HashMap<ResourceHandle, ImportedTexture<'a>>,
}

impl FrameTextures<'_> {
    fn view(&self, handle: ResourceHandle) -> Option<&wgpu::TextureView> {
        self.pooled
            .get(&handle)
            .map(|texture| &texture.view)
            .or_else(|| self.imported.get(&handle).map(|texture| texture.view))
    }

    fn extent(&self, handle: ResourceHandle) -> Option<Extent> {
        self.pooled
            .get(&handle)
            .map(|texture| texture.extent)
            .or_else(|| self.imported.get(&handle).map(|texture| texture.extent))
    }
}

/// One raster command with everything resolved
enum RasterStep {
    Viewport(Viewport),
    Draw {
        pipeline: Arc<wgpu::RenderPipeline>,
        bind_group: wgpu::BindGroup,
        constants_offset: u32,
        vertices: Range<u32>,
        instances: Range<u32>,
    },
}

struct ComputeStep {
    pipeline: Arc<wgpu::ComputePipeline>,
    bind_group: wgpu::BindGroup,
    constants_offset: u32,
    groups: [u32; 3],
}

/// Submits frame plans with wgpu
pub struct WgpuExecutor {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    layouts: Arc<BindGroupLayouts>,
    pipelines: PipelineCache,
    buffers: ExternalBuffers,
    pool: TexturePool,

    camera_buffer: wgpu::Buffer,
    constants_buffer: wgpu::Buffer,
    constants_capacity: u64,
    global_bind_group: wgpu::BindGroup,

    frame: u64,
}

impl WgpuExecutor {
    pub fn new(device: Arc<wgpu::Device>, queue: Arc<wgpu::Queue>, output_format: wgpu::TextureFormat) -> Self {
        let layouts = Arc::new(BindGroupLayouts::new(&device));
        let pipelines = PipelineCache::new(device.clone(), layouts.clone(), output_format);
        let buffers = ExternalBuffers::new(device.clone(), queue.clone());
        let pool = TexturePool::new(device.clone());

        let camera_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Camera Uniform Buffer"),
            size: std::mem::size_of::<Camera>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let constants_buffer = Self::create_constants_buffer(&device, INITIAL_CONSTANT_RECORDS);
        let global_bind_group = Self::create_global_bind_group(&device, &layouts, &camera_buffer, &constants_buffer);

        Self {
            device,
            queue,
            layouts,
            pipelines,
            buffers,
            pool,
            camera_buffer,
            constants_buffer,
            constants_capacity: INITIAL_CONSTANT_RECORDS,
            global_bind_group,
            frame: 0,
        }
    }

    fn create_constants_buffer(device: &wgpu::Device, records: u64) -> wgpu::Buffer {
        device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Pass Constants Buffer"),
            size: records * CONSTANTS_STRIDE,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }

    fn create_global_bind_group(
        device: &wgpu::Device,
        layouts: &BindGroupLayouts,
        camera_buffer: &wgpu::Buffer,
        constants_buffer: &wgpu::Buffer,
    ) -> wgpu::BindGroup {
        BindGroupBuilder::new("Global Bind Group")
            .buffer(0, camera_buffer)
            .buffer_range(
                1,
                constants_buffer,
                0,
                wgpu::BufferSize::new(std::mem::size_of::<PassConstants>() as u64),
            )
            .build(device, &layouts.global)
    }

    pub fn buffers(&self) -> &ExternalBuffers {
        &self.buffers
    }

    pub fn buffers_mut(&mut self) -> &mut ExternalBuffers {
        &mut self.buffers
    }

    pub fn pipelines(&self) -> &PipelineCache {
        &self.pipelines
    }

    pub fn pooled_textures(&self) -> usize {
        self.pool.len()
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Upload the constants of every command in plan order
    ///
    /// Returns the dynamic offset of each command, indexed by pass then command.
    fn upload_constants(&mut self, plan: &FramePlan) -> Vec<Vec<u32>> {
        let mut bytes = Vec::new();
        let mut offsets = Vec::with_capacity(plan.passes.len());
        for planned in &plan.passes {
            let mut pass_offsets = Vec::with_capacity(planned.recipe.commands.len());
            for command in &planned.recipe.commands {
                let constants = match command {
                    Command::Draw(draw) => draw.constants,
                    Command::Dispatch(dispatch) => dispatch.constants,
                    Command::SetViewport(_) => {
                        pass_offsets.push(0);
                        continue;
                    }
                };
                pass_offsets.push(bytes.len() as u32);
                bytes.extend_from_slice(bytemuck::bytes_of(&constants));
                bytes.resize(bytes.len().next_multiple_of(CONSTANTS_STRIDE as usize), 0);
            }
            offsets.push(pass_offsets);
        }

        let records = bytes.len() as u64 / CONSTANTS_STRIDE;
        if records > self.constants_capacity {
            let capacity = records.next_power_of_two();
            log::debug!("Growing pass constants buffer to {} records", capacity);
            self.constants_buffer = Self::create_constants_buffer(&self.device, capacity);
            self.constants_capacity = capacity;
            self.global_bind_group = Self::create_global_bind_group(
                &self.device,
                &self.layouts,
                &self.camera_buffer,
                &self.constants_buffer,
            );
        }
        if !bytes.is_empty() {
            self.queue.write_buffer(&self.constants_buffer, 0, &bytes);
        }
        offsets
    }

    /// Encode and submit a planned frame
    ///
    /// `imports` maps imported graph handles (the output target, the LUT) to
    /// their views. Every texture a recipe requests comes from the pool.
    pub fn run(
        &mut self,
        plan: &FramePlan,
        camera: &Camera,
        imports: &HashMap<ResourceHandle, ImportedTexture<'_>>,
    ) -> Result<()> {
        log::trace!("Executing frame {} ({} passes)", self.frame, plan.passes.len());

        self.queue.write_buffer(&self.camera_buffer, 0, bytemuck::bytes_of(camera));
        let constant_offsets = self.upload_constants(plan);

        let mut textures = FrameTextures { pooled: HashMap::new(), imported: imports };
        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("VBuffer Encoder"),
        });

        for (planned, offsets) in plan.passes.iter().zip(&constant_offsets) {
            log::trace!("  Executing pass: {}", planned.name);
            self.allocate(&planned.recipe, &mut textures);

            let result = match &planned.recipe.kind {
                PassKind::Raster { .. } => self.encode_raster(&planned.name, &planned.recipe, offsets, &textures, &mut encoder),
                PassKind::Compute => self.encode_compute(&planned.name, &planned.recipe, offsets, &textures, &mut encoder),
            };
            if let Err(err) = result {
                // Hand every pooled texture back before bailing.
                self.release(&mut textures, |_| true);
                return Err(err);
            }

            self.release(&mut textures, |texture| texture.lifetime == TextureLifetime::Transient);
        }

        self.queue.submit(Some(encoder.finish()));
        self.release(&mut textures, |_| true);
        self.pool.cleanup_old(self.frame);
        self.frame += 1;
        Ok(())
    }

    fn allocate(&mut self, recipe: &PassRecipe, textures: &mut FrameTextures<'_>) {
        for request in &recipe.textures {
            let key = TextureKey::from_request(request);
            let texture = self.pool.acquire(key, request.label);
            let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
            let previous = textures.pooled.insert(
                request.handle,
                PooledTexture {
                    texture,
                    view,
                    key,
                    extent: request.extent.at_least_one(),
                    lifetime: request.lifetime,
                },
            );
            if let Some(previous) = previous {
                self.pool.release(previous.texture, previous.key, self.frame);
            }
        }
    }

    fn release(&mut self, textures: &mut FrameTextures<'_>, filter: impl Fn(&PooledTexture) -> bool) {
        let handles: Vec<ResourceHandle> = textures
            .pooled
            .iter()
            .filter(|(_, texture)| filter(texture))
            .map(|(&handle, _)| handle)
            .collect();
        for handle in handles {
            if let Some(texture) = textures.pooled.remove(&handle) {
                self.pool.release(texture.texture, texture.key, self.frame);
            }
        }
    }

    fn encode_raster(
        &mut self,
        name: &str,
        recipe: &PassRecipe,
        offsets: &[u32],
        textures: &FrameTextures<'_>,
        encoder: &mut wgpu::CommandEncoder,
    ) -> Result<()> {
        let PassKind::Raster { color, depth } = &recipe.kind else {
            return Err(Error::Graph(format!("Pass '{}' is not a raster pass", name)));
        };

        let mut target_extent = None;
        let mut color_views = Vec::with_capacity(color.len());
        for attachment in color {
            let view = textures
                .view(attachment.handle)
                .ok_or_else(|| missing_texture(name, attachment.handle))?;
            target_extent = target_extent.or(textures.extent(attachment.handle));
            color_views.push((view, attachment.load));
        }
        let depth_view = match depth {
            Some(attachment) => {
                let view = textures
                    .view(attachment.handle)
                    .ok_or_else(|| missing_texture(name, attachment.handle))?;
                target_extent = target_extent.or(textures.extent(attachment.handle));
                Some((view, attachment))
            }
            None => None,
        };
        let target_extent = target_extent.unwrap_or_default();

        let mut steps = Vec::with_capacity(recipe.commands.len());
        for (command, &constants_offset) in recipe.commands.iter().zip(offsets) {
            match command {
                Command::SetViewport(viewport) => steps.push(RasterStep::Viewport(viewport.clamped_to(target_extent))),
                Command::Draw(draw) => {
                    if draw.instances.is_empty() || draw.vertex_count == 0 {
                        continue;
                    }
                    let entry = self.pipelines.render(draw.program)?;
                    let bind_group = build_pass_bind_group(
                        &self.device,
                        name,
                        &entry.bindings,
                        &entry.pass_layout,
                        &recipe.bindings,
                        &self.buffers,
                        textures,
                    )?;
                    steps.push(RasterStep::Draw {
                        pipeline: entry.pipeline,
                        bind_group,
                        constants_offset,
                        vertices: 0..draw.vertex_count,
                        instances: draw.instances.clone(),
                    });
                }
                Command::Dispatch(_) => {
                    return Err(Error::Graph(format!("Raster pass '{}' contains a dispatch", name)));
                }
            }
        }

        let color_attachments: Vec<Option<wgpu::RenderPassColorAttachment>> = color_views
            .iter()
            .map(|&(view, load)| {
                Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations { load, store: wgpu::StoreOp::Store },
                })
            })
            .collect();
        let depth_stencil_attachment = depth_view.map(|(view, attachment)| wgpu::RenderPassDepthStencilAttachment {
            view,
            depth_ops: match attachment.access {
                DepthAccess::ReadWrite => Some(wgpu::Operations { load: attachment.load, store: wgpu::StoreOp::Store }),
                DepthAccess::Read => None,
            },
            stencil_ops: None,
        });

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(name),
            color_attachments: &color_attachments,
            depth_stencil_attachment,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        for step in &steps {
            match step {
                RasterStep::Viewport(viewport) => {
                    if viewport.width <= 0.0 || viewport.height <= 0.0 {
                        log::trace!("Pass '{}': viewport clamped away", name);
                        continue;
                    }
                    pass.set_viewport(viewport.x, viewport.y, viewport.width, viewport.height, 0.0, 1.0);
                }
                RasterStep::Draw { pipeline, bind_group, constants_offset, vertices, instances } => {
                    pass.set_pipeline(pipeline);
                    pass.set_bind_group(0, &self.global_bind_group, &[*constants_offset]);
                    pass.set_bind_group(1, bind_group, &[]);
                    pass.draw(vertices.clone(), instances.clone());
                }
            }
        }
        Ok(())
    }

    fn encode_compute(
        &mut self,
        name: &str,
        recipe: &PassRecipe,
        offsets: &[u32],
        textures: &FrameTextures<'_>,
        encoder: &mut wgpu::CommandEncoder,
    ) -> Result<()> {
        let mut steps = Vec::with_capacity(recipe.commands.len());
        for (command, &constants_offset) in recipe.commands.iter().zip(offsets) {
            let Command::Dispatch(dispatch) = command else {
                return Err(Error::Graph(format!("Compute pass '{}' contains a raster command", name)));
            };
            if dispatch.groups.contains(&0) {
                log::trace!("Pass '{}': empty dispatch of {}", name, dispatch.kernel.id());
                continue;
            }
            let entry = self.pipelines.compute(dispatch.kernel)?;
            let bindings: Vec<Binding> = recipe.bindings.iter().chain(&dispatch.bindings).copied().collect();
            let bind_group = build_pass_bind_group(
                &self.device,
                name,
                &entry.bindings,
                &entry.pass_layout,
                &bindings,
                &self.buffers,
                textures,
            )?;
            steps.push(ComputeStep { pipeline: entry.pipeline, bind_group, constants_offset, groups: dispatch.groups });
        }

        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some(name),
            timestamp_writes: None,
        });
        for step in &steps {
            pass.set_pipeline(&step.pipeline);
            pass.set_bind_group(0, &self.global_bind_group, &[step.constants_offset]);
            pass.set_bind_group(1, &step.bind_group, &[]);
            pass.dispatch_workgroups(step.groups[0], step.groups[1], step.groups[2]);
        }
        Ok(())
    }
}

fn missing_texture(pass: &str, handle: ResourceHandle) -> Error {
    Error::Resource(format!("Pass '{}': texture {:?} was not allocated", pass, handle))
}

/// Group 1 for one program, resolving its declared slots by binding name
fn build_pass_bind_group(
    device: &wgpu::Device,
    pass: &str,
    decls: &[BindingDecl],
    layout: &wgpu::BindGroupLayout,
    bindings: &[Binding],
    buffers: &ExternalBuffers,
    textures: &FrameTextures<'_>,
) -> Result<wgpu::BindGroup> {
    let mut builder = BindGroupBuilder::new(format!("{} Bind Group", pass));
    for decl in decls {
        // Later bindings of the same name win (dispatch bindings override pass bindings).
        let binding = bindings
            .iter()
            .rev()
            .find(|binding| binding.name == decl.name)
            .ok_or_else(|| Error::Resource(format!("Pass '{}' does not bind '{}'", pass, decl.name)))?;
        builder = match binding.resource {
            BindingResource::Buffer(slot) => {
                let buffer = buffers
                    .get(slot)
                    .ok_or_else(|| Error::Resource(format!("Buffer '{}' is not allocated", slot.binding_name())))?;
                builder.buffer(decl.binding, buffer)
            }
            BindingResource::Texture(handle) | BindingResource::StorageTexture(handle) => {
                let view = textures.view(handle).ok_or_else(|| missing_texture(pass, handle))?;
                builder.texture(decl.binding, view)
            }
        };
    }
    Ok(builder.build(device, layout))
}
