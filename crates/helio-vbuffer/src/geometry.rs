//! Compacted cluster geometry and visibility-id encoding
//!
//! The upstream culling/compaction stage fills three flat buffers every
//! frame: compacted vertices, compacted indices (a fixed number of indices
//! per cluster) and one [`InstanceVData`] record per visible cluster
//! instance. Records are laid out back-facing first, then front-facing,
//! then double-sided, which is what lets the visibility prepass address
//! each facing category as a contiguous instance range.

/// Triangles per cluster
pub const CLUSTER_SIZE_IN_TRIANGLES: u32 = 128;

/// Indices per cluster (three per triangle)
pub const CLUSTER_SIZE_IN_INDICES: u32 = CLUSTER_SIZE_IN_TRIANGLES * 3;

/// Low bits of a visibility id holding the triangle index
pub const TRIANGLE_ID_BITS: u32 = 7;

/// Mask selecting the triangle bits of a visibility id
pub const TRIANGLE_ID_MASK: u32 = (1 << TRIANGLE_ID_BITS) - 1;

/// Largest instance slot representable in a visibility id
pub const MAX_INSTANCE_SLOT: u32 = (u32::MAX >> TRIANGLE_ID_BITS) - 1;

/// Facing convention shared by a batch of clusters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ClusterFacing {
    Back,
    Front,
    DoubleSided,
}

impl ClusterFacing {
    /// Draw order of the visibility prepass
    pub const ALL: [ClusterFacing; 3] = [Self::Back, Self::Front, Self::DoubleSided];

    /// Draw-call index (also the sub-pass index of the visibility program)
    pub fn draw_index(self) -> u32 {
        match self {
            Self::Back => 0,
            Self::Front => 1,
            Self::DoubleSided => 2,
        }
    }

    /// Rasterizer cull mode used for this facing category
    pub fn cull_mode(self) -> Option<wgpu::Face> {
        match self {
            Self::Back => Some(wgpu::Face::Back),
            Self::Front => Some(wgpu::Face::Front),
            Self::DoubleSided => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Back => "back",
            Self::Front => "front",
            Self::DoubleSided => "double",
        }
    }
}

/// Per-frame cluster instance counts, one per facing category
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClusterBatches {
    pub back: u32,
    pub front: u32,
    pub double_sided: u32,
}

impl ClusterBatches {
    pub fn new(back: u32, front: u32, double_sided: u32) -> Self {
        Self { back, front, double_sided }
    }

    pub fn count(&self, facing: ClusterFacing) -> u32 {
        match facing {
            ClusterFacing::Back => self.back,
            ClusterFacing::Front => self.front,
            ClusterFacing::DoubleSided => self.double_sided,
        }
    }

    /// Total cluster instances, `None` if the counts overflow `u32`
    pub fn total(&self) -> Option<u32> {
        self.back.checked_add(self.front)?.checked_add(self.double_sided)
    }
}

/// Presence and size of one compacted buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferInfo {
    /// Number of elements in the buffer
    pub len: u32,
}

/// Descriptor of the compacted geometry store for the current frame
///
/// Any of the three buffers may be missing when the compaction stage has not
/// built it yet; in that case the whole visibility pipeline is skipped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompactedGeometry {
    pub vertices: Option<BufferInfo>,
    pub indices: Option<BufferInfo>,
    pub instances: Option<BufferInfo>,
    pub batches: ClusterBatches,
}

impl CompactedGeometry {
    /// Descriptor with all three buffers present
    pub fn complete(vertices: u32, indices: u32, instances: u32, batches: ClusterBatches) -> Self {
        Self {
            vertices: Some(BufferInfo { len: vertices }),
            indices: Some(BufferInfo { len: indices }),
            instances: Some(BufferInfo { len: instances }),
            batches,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.vertices.is_some() && self.indices.is_some() && self.instances.is_some()
    }
}

/// Compacted vertex (world space, must match WGSL `CompactedVertex`)
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CompactedVertex {
    pub position: [f32; 3],
    pub _pad: f32,
}

impl CompactedVertex {
    pub fn new(position: [f32; 3]) -> Self {
        Self { position, _pad: 0.0 }
    }
}

/// Per-instance visibility metadata (must match WGSL `InstanceVData`)
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct InstanceVData {
    /// Cluster index into the compacted index buffer
    pub cluster_index: u32,
    /// Global material id of the cluster's material
    pub material_id: u32,
    pub flags: u32,
    pub _pad: u32,
}

impl InstanceVData {
    pub fn new(cluster_index: u32, material_id: u32) -> Self {
        Self { cluster_index, material_id, flags: 0, _pad: 0 }
    }
}

/// One texel of the visibility buffer
///
/// `0` is the cleared "no geometry" value; otherwise the texel holds
/// `((instance_slot + 1) << TRIANGLE_ID_BITS) | triangle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct VisibilityId(pub u32);

impl VisibilityId {
    pub const NONE: VisibilityId = VisibilityId(0);

    /// Encode an instance slot / triangle pair, `None` if it does not fit
    pub fn encode(instance_slot: u32, triangle: u32) -> Option<Self> {
        if instance_slot > MAX_INSTANCE_SLOT || triangle >= CLUSTER_SIZE_IN_TRIANGLES {
            return None;
        }
        Some(Self(((instance_slot + 1) << TRIANGLE_ID_BITS) | triangle))
    }

    pub fn is_none(self) -> bool {
        self.0 == 0
    }

    /// Instance slot (index into the instance metadata buffer)
    pub fn instance_slot(self) -> Option<u32> {
        (!self.is_none()).then(|| (self.0 >> TRIANGLE_ID_BITS) - 1)
    }

    pub fn triangle(self) -> Option<u32> {
        (!self.is_none()).then(|| self.0 & TRIANGLE_ID_MASK)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cluster_constants_agree() {
        assert_eq!(CLUSTER_SIZE_IN_INDICES, 384);
        assert_eq!(1 << TRIANGLE_ID_BITS, CLUSTER_SIZE_IN_TRIANGLES);
    }

    #[test]
    fn visibility_id_keeps_zero_as_sentinel() {
        let id = VisibilityId::encode(0, 0).unwrap();
        assert!(!id.is_none());
        assert_eq!(id.instance_slot(), Some(0));
        assert_eq!(id.triangle(), Some(0));
        assert_eq!(VisibilityId::NONE.instance_slot(), None);
    }

    #[test]
    fn visibility_id_rejects_overflow() {
        assert!(VisibilityId::encode(MAX_INSTANCE_SLOT, CLUSTER_SIZE_IN_TRIANGLES - 1).is_some());
        assert!(VisibilityId::encode(MAX_INSTANCE_SLOT + 1, 0).is_none());
        assert!(VisibilityId::encode(3, CLUSTER_SIZE_IN_TRIANGLES).is_none());
    }

    #[test]
    fn completeness_needs_all_three_buffers() {
        let mut geometry = CompactedGeometry::complete(8, 384, 1, ClusterBatches::new(1, 0, 0));
        assert!(geometry.is_complete());
        geometry.indices = None;
        assert!(!geometry.is_complete());
    }

    #[test]
    fn batch_total_reports_overflow() {
        assert_eq!(ClusterBatches::new(4, 2, 3).total(), Some(9));
        assert_eq!(ClusterBatches::new(u32::MAX, 0, 0).total(), Some(u32::MAX));
        assert_eq!(ClusterBatches::new(u32::MAX, 1, 0).total(), None);
        assert_eq!(ClusterBatches::new(1, 1, u32::MAX).total(), None);
    }
}
