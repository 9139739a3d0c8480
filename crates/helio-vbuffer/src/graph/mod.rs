//! Render graph system with automatic dependency resolution
//!
//! The render graph orders passes from their declared resource usage,
//! tracks transient lifetimes, and plans each frame: passes whose inputs
//! were not produced are skipped, the rest record their recipes in order.

mod pass;
mod resource;

pub use pass::{FrameContext, FrameResources, RenderPass};
pub use resource::{PassId, ResourceHandle};

use crate::debug::{DebugTexture, FullScreenDebugMode};
use crate::recipe::{CameraCaptureFlags, PassRecipe, TextureLifetime};
use crate::{Error, Result};
use std::collections::{BTreeSet, HashMap, VecDeque};

/// Render graph for automatic pass ordering and resource management
pub struct RenderGraph {
    passes: Vec<PassNode>,
    imports: Vec<ResourceHandle>,
    execution_order: Vec<usize>,
    lifetimes: HashMap<ResourceHandle, (usize, usize)>,
    built: bool,
}

struct PassNode {
    pass: Box<dyn RenderPass>,
    reads: Vec<ResourceHandle>,
    optional_reads: Vec<ResourceHandle>,
    writes: Vec<ResourceHandle>,
    creates: Vec<ResourceHandle>,
    transients: Vec<ResourceHandle>,
}

impl PassNode {
    fn produces(&self, handle: ResourceHandle) -> bool {
        self.writes.contains(&handle) || self.creates.contains(&handle)
    }

    fn all_reads(&self) -> impl Iterator<Item = &ResourceHandle> {
        self.reads.iter().chain(&self.optional_reads)
    }

    fn all_resources(&self) -> impl Iterator<Item = &ResourceHandle> {
        self.all_reads()
            .chain(&self.writes)
            .chain(&self.creates)
            .chain(&self.transients)
    }
}

/// Why a pass did not run this frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// A required input was not produced this frame
    MissingInput(ResourceHandle),
    /// The pass had nothing to do
    Declined,
}

/// A pass that recorded work for this frame
#[derive(Debug, Clone)]
pub struct PlannedPass {
    pub name: String,
    pub recipe: PassRecipe,
}

/// Ordered work for one frame
#[derive(Debug, Clone, Default)]
pub struct FramePlan {
    pub passes: Vec<PlannedPass>,
    pub skipped: Vec<(String, SkipReason)>,
    pub debug_textures: HashMap<FullScreenDebugMode, DebugTexture>,
    pub camera_capture: CameraCaptureFlags,
}

impl FramePlan {
    pub fn pass(&self, name: &str) -> Option<&PassRecipe> {
        self.passes.iter().find(|planned| planned.name == name).map(|planned| &planned.recipe)
    }

    pub fn skip_reason(&self, name: &str) -> Option<SkipReason> {
        self.skipped.iter().find(|(skipped, _)| skipped == name).map(|&(_, reason)| reason)
    }

    pub fn pass_names(&self) -> Vec<&str> {
        self.passes.iter().map(|planned| planned.name.as_str()).collect()
    }
}

impl RenderGraph {
    pub fn new() -> Self {
        Self {
            passes: Vec::new(),
            imports: Vec::new(),
            execution_order: Vec::new(),
            lifetimes: HashMap::new(),
            built: false,
        }
    }

    /// Add a pass to the graph
    pub fn add_pass(&mut self, pass: impl RenderPass + 'static) -> PassId {
        let id = PassId(self.passes.len());

        // Get resource declarations from the pass
        let mut builder = PassResourceBuilder::new();
        pass.declare_resources(&mut builder);

        self.passes.push(PassNode {
            pass: Box::new(pass),
            reads: builder.reads,
            optional_reads: builder.optional_reads,
            writes: builder.writes,
            creates: builder.creates,
            transients: builder.transients,
        });
        self.built = false;
        id
    }

    /// Declare a resource that exists before any pass runs (e.g. the output target)
    pub fn import(&mut self, handle: ResourceHandle) {
        if !self.imports.contains(&handle) {
            self.imports.push(handle);
        }
    }

    /// Build the graph - resolve dependencies and determine execution order
    pub fn build(&mut self) -> Result<()> {
        log::info!("Building render graph with {} passes", self.passes.len());

        self.validate_transients()?;

        // Collect every writer of each resource in registration order.
        let mut resource_writers: HashMap<ResourceHandle, Vec<usize>> = HashMap::new();
        for (i, pass) in self.passes.iter().enumerate() {
            for &resource in pass.writes.iter().chain(&pass.creates) {
                let writers = resource_writers.entry(resource).or_default();
                if !writers.contains(&i) {
                    writers.push(i);
                }
            }
        }

        let mut edges: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); self.passes.len()];

        // Read-after-write: a reader runs after every writer. A pass that
        // also writes the resource only waits for writers registered before it.
        for (i, pass) in self.passes.iter().enumerate() {
            for resource in pass.all_reads() {
                let Some(writers) = resource_writers.get(resource) else {
                    continue;
                };
                let read_modify_write = pass.produces(*resource);
                for &writer in writers {
                    if writer == i || (read_modify_write && writer > i) {
                        continue;
                    }
                    edges[writer].insert(i);
                }
            }
        }

        // Write-after-write: writers of one resource keep registration order.
        for writers in resource_writers.values() {
            for pair in writers.windows(2) {
                edges[pair[0]].insert(pair[1]);
            }
        }

        let mut in_degree = vec![0usize; self.passes.len()];
        for targets in &edges {
            for &target in targets {
                in_degree[target] += 1;
            }
        }

        // Topological sort (Kahn's algorithm, FIFO to preserve insertion order)
        let mut queue: VecDeque<usize> = (0..self.passes.len()).filter(|&i| in_degree[i] == 0).collect();
        let mut order = Vec::with_capacity(self.passes.len());

        while let Some(node) = queue.pop_front() {
            order.push(node);
            for &neighbor in &edges[node] {
                in_degree[neighbor] -= 1;
                if in_degree[neighbor] == 0 {
                    queue.push_back(neighbor);
                }
            }
        }

        if order.len() != self.passes.len() {
            let stuck: Vec<&str> = (0..self.passes.len())
                .filter(|i| !order.contains(i))
                .map(|i| self.passes[i].pass.name())
                .collect();
            return Err(Error::Graph(format!(
                "Cyclic dependency detected in render graph between passes {:?}",
                stuck
            )));
        }

        self.execution_order = order;

        for (i, &pass_idx) in self.execution_order.iter().enumerate() {
            log::debug!("  Pass {}: {}", i, self.passes[pass_idx].pass.name());
        }

        self.compute_resource_lifetimes();
        self.built = true;
        Ok(())
    }

    /// A transient belongs to exactly one pass and nothing else may name it
    fn validate_transients(&self) -> Result<()> {
        for (owner_idx, owner) in self.passes.iter().enumerate() {
            for transient in &owner.transients {
                for (i, pass) in self.passes.iter().enumerate() {
                    let uses = if i == owner_idx {
                        pass.all_reads().chain(&pass.writes).chain(&pass.creates).any(|r| r == transient)
                    } else {
                        pass.all_resources().any(|r| r == transient)
                    };
                    if uses {
                        return Err(Error::Graph(format!(
                            "Transient resource {:?} of pass '{}' is referenced by pass '{}'",
                            transient,
                            owner.pass.name(),
                            pass.pass.name()
                        )));
                    }
                }
                if self.imports.contains(transient) {
                    return Err(Error::Graph(format!(
                        "Transient resource {:?} of pass '{}' is also imported",
                        transient,
                        owner.pass.name()
                    )));
                }
            }
        }
        Ok(())
    }

    /// Compute first and last use (execution index) of every resource
    fn compute_resource_lifetimes(&mut self) {
        let mut resource_usage: HashMap<ResourceHandle, (usize, usize)> = HashMap::new();

        for (exec_idx, &pass_idx) in self.execution_order.iter().enumerate() {
            for &res in self.passes[pass_idx].all_resources() {
                resource_usage
                    .entry(res)
                    .and_modify(|(first, last)| {
                        *first = (*first).min(exec_idx);
                        *last = (*last).max(exec_idx);
                    })
                    .or_insert((exec_idx, exec_idx));
            }
        }

        self.lifetimes = resource_usage;
    }

    /// Pass names in execution order
    pub fn execution_order(&self) -> Vec<&str> {
        self.execution_order.iter().map(|&i| self.passes[i].pass.name()).collect()
    }

    /// First and last execution index of a transient resource
    pub fn transient_lifetime(&self, handle: ResourceHandle) -> Option<(usize, usize)> {
        let is_transient = self.passes.iter().any(|pass| pass.transients.contains(&handle));
        if !is_transient {
            return None;
        }
        self.lifetimes.get(&handle).copied()
    }

    /// First and last execution index of any declared resource
    pub fn resource_lifetime(&self, handle: ResourceHandle) -> Option<(usize, usize)> {
        self.lifetimes.get(&handle).copied()
    }

    pub fn is_built(&self) -> bool {
        self.built
    }

    /// Plan one frame
    pub fn plan(&self, frame: &FrameContext) -> Result<FramePlan> {
        if !self.built {
            return Err(Error::Graph("Render graph planned before build()".to_string()));
        }
        log::trace!("Planning render graph (frame {})", frame.frame);

        let mut resources = FrameResources::with_imports(self.imports.iter().copied());
        let mut plan = FramePlan::default();

        for &pass_idx in &self.execution_order {
            let node = &self.passes[pass_idx];
            let name = node.pass.name();

            let missing = node
                .reads
                .iter()
                .chain(node.writes.iter().filter(|w| !node.creates.contains(*w)))
                .find(|handle| !resources.is_available(**handle));
            if let Some(&handle) = missing {
                log::debug!("Skipping pass '{}': input {:?} not produced this frame", name, handle);
                plan.skipped.push((name.to_string(), SkipReason::MissingInput(handle)));
                continue;
            }

            let Some(recipe) = node.pass.record(frame, &resources) else {
                log::debug!("Skipping pass '{}': nothing to record", name);
                plan.skipped.push((name.to_string(), SkipReason::Declined));
                continue;
            };

            Self::validate_recipe(node, &recipe, &resources)?;

            for request in &recipe.textures {
                if request.lifetime == TextureLifetime::Frame {
                    resources.insert(request.handle);
                }
            }
            for &(mode, texture) in &recipe.debug_exports {
                resources.export_debug(mode, texture);
            }
            plan.camera_capture |= recipe.camera_capture;

            log::trace!("  Planned pass: {} ({} commands)", name, recipe.commands.len());
            plan.passes.push(PlannedPass { name: name.to_string(), recipe });
        }

        plan.debug_textures = resources.into_debug_textures();
        Ok(plan)
    }

    fn validate_recipe(node: &PassNode, recipe: &PassRecipe, resources: &FrameResources) -> Result<()> {
        let name = node.pass.name();
        for request in &recipe.textures {
            let declared = match request.lifetime {
                TextureLifetime::Frame => node.creates.contains(&request.handle),
                TextureLifetime::Transient => node.transients.contains(&request.handle),
            };
            if !declared {
                return Err(Error::Graph(format!(
                    "Pass '{}' creates undeclared {:?} texture '{}'",
                    name, request.lifetime, request.label
                )));
            }
        }

        for handle in recipe.referenced_textures() {
            let created_here = recipe.textures.iter().any(|request| request.handle == handle);
            if !created_here && !resources.is_available(handle) {
                return Err(Error::Graph(format!(
                    "Pass '{}' references {:?}, which is not available",
                    name, handle
                )));
            }
        }
        Ok(())
    }
}

/// Builder for declaring pass resource dependencies
pub struct PassResourceBuilder {
    reads: Vec<ResourceHandle>,
    optional_reads: Vec<ResourceHandle>,
    writes: Vec<ResourceHandle>,
    creates: Vec<ResourceHandle>,
    transients: Vec<ResourceHandle>,
}

impl PassResourceBuilder {
    fn new() -> Self {
        Self {
            reads: Vec::new(),
            optional_reads: Vec::new(),
            writes: Vec::new(),
            creates: Vec::new(),
            transients: Vec::new(),
        }
    }

    /// Declare that this pass reads a resource (skipped if it is missing)
    pub fn read(&mut self, resource: ResourceHandle) -> &mut Self {
        self.reads.push(resource);
        self
    }

    /// Declare that this pass reads a resource when it exists
    pub fn read_optional(&mut self, resource: ResourceHandle) -> &mut Self {
        self.optional_reads.push(resource);
        self
    }

    /// Declare that this pass writes to a resource
    pub fn write(&mut self, resource: ResourceHandle) -> &mut Self {
        self.writes.push(resource);
        self
    }

    /// Declare that this pass creates a frame resource
    pub fn create(&mut self, resource: ResourceHandle) -> &mut Self {
        self.creates.push(resource);
        self
    }

    /// Declare a resource that only lives inside this pass
    pub fn create_transient(&mut self, resource: ResourceHandle) -> &mut Self {
        self.transients.push(resource);
        self
    }
}

impl Default for RenderGraph {
    fn default() -> Self {
        Self::new()
    }
}
