//! Tile grid math and the N-level material reduction plan

use crate::{Error, Result};

/// Screen-space tile size used by the classification and lighting passes
pub const TILE_SIZE: u32 = 64;

/// Granularity of the light-list feature flags
pub const LIGHT_TILE_SIZE: u32 = 16;

/// Workgroup edge of the light tile classification kernel
pub const CLASSIFICATION_GROUP_SIZE: u32 = 8;

/// Largest fan-in a reduction level may use (workgroup edge limit)
pub const MAX_FAN_IN: u32 = 16;

/// Integer division rounding towards positive infinity
pub fn div_round_up(value: u32, divisor: u32) -> u32 {
    value.div_ceil(divisor.max(1))
}

/// Two-dimensional size in pixels or texels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Extent {
    pub width: u32,
    pub height: u32,
}

impl Extent {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Extent divided by `factor`, rounding up
    pub fn div_round_up(&self, factor: u32) -> Extent {
        Extent::new(div_round_up(self.width, factor), div_round_up(self.height, factor))
    }

    /// Extent with every dimension at least one texel (wgpu rejects zero-sized textures)
    pub fn at_least_one(&self) -> Extent {
        Extent::new(self.width.max(1), self.height.max(1))
    }

    pub fn contains(&self, x: u32, y: u32) -> bool {
        x < self.width && y < self.height
    }

    pub fn as_array(&self) -> [u32; 2] {
        [self.width, self.height]
    }
}

/// Grid of square tiles covering a viewport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileGrid {
    pub count_x: u32,
    pub count_y: u32,
    pub tile_size: u32,
}

impl TileGrid {
    /// Smallest grid of `tile_size` tiles covering `extent`
    pub fn cover(extent: Extent, tile_size: u32) -> Self {
        Self {
            count_x: div_round_up(extent.width, tile_size),
            count_y: div_round_up(extent.height, tile_size),
            tile_size,
        }
    }

    pub fn tile_count(&self) -> u32 {
        self.count_x * self.count_y
    }

    pub fn counts(&self) -> Extent {
        Extent::new(self.count_x, self.count_y)
    }

    /// Pixel area covered by the grid (may exceed the viewport at the edges)
    pub fn covered_extent(&self) -> Extent {
        Extent::new(self.count_x * self.tile_size, self.count_y * self.tile_size)
    }

    /// Compute groups needed to run one invocation per tile
    pub fn dispatch_groups(&self, group_size: u32) -> [u32; 3] {
        let groups = self.counts().div_round_up(group_size);
        [groups.width, groups.height, 1]
    }
}

/// Fan-in factor of every material reduction level
///
/// The default `[8, 8]` reduces pixels to 8x8 blocks and then to 64x64
/// tiles. The product of all fan-ins is the final tile size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReductionConfig {
    pub fan_in: Vec<u32>,
}

impl Default for ReductionConfig {
    fn default() -> Self {
        Self { fan_in: vec![8, 8] }
    }
}

impl ReductionConfig {
    pub fn new(fan_in: impl Into<Vec<u32>>) -> Self {
        Self { fan_in: fan_in.into() }
    }

    pub fn levels(&self) -> usize {
        self.fan_in.len()
    }

    /// Final tile size in pixels
    pub fn tile_size(&self) -> u32 {
        self.fan_in.iter().product()
    }

    pub fn validate(&self) -> Result<()> {
        if self.fan_in.is_empty() {
            return Err(Error::Config("Reduction needs at least one level".to_string()));
        }
        if let Some(bad) = self.fan_in.iter().find(|&&f| !(2..=MAX_FAN_IN).contains(&f)) {
            return Err(Error::Config(format!(
                "Reduction fan-in {} out of range 2..={}",
                bad, MAX_FAN_IN
            )));
        }
        Ok(())
    }
}

/// Which kernel a reduction level runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReductionStage {
    /// Reads the visibility buffer and instance data
    Material,
    /// Reads the previous level's tile maps
    Tiles,
}

/// One level of the material reduction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReductionLevel {
    pub index: usize,
    pub fan_in: u32,
    pub stage: ReductionStage,
    pub input: Extent,
    pub output: Extent,
}

impl ReductionLevel {
    /// One workgroup per output texel
    pub fn dispatch_groups(&self) -> [u32; 3] {
        [self.output.width, self.output.height, 1]
    }
}

/// Per-frame sizing of every reduction level, recomputed from the viewport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReductionPlan {
    levels: Vec<ReductionLevel>,
}

impl ReductionPlan {
    pub fn new(viewport: Extent, config: &ReductionConfig) -> Self {
        let mut input = viewport;
        let levels = config
            .fan_in
            .iter()
            .enumerate()
            .map(|(index, &fan_in)| {
                let output = input.div_round_up(fan_in);
                let level = ReductionLevel {
                    index,
                    fan_in,
                    stage: if index == 0 { ReductionStage::Material } else { ReductionStage::Tiles },
                    input,
                    output,
                };
                input = output;
                level
            })
            .collect();
        Self { levels }
    }

    pub fn levels(&self) -> &[ReductionLevel] {
        &self.levels
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Extent of the final tile maps
    pub fn output(&self) -> Option<Extent> {
        self.levels.last().map(|level| level.output)
    }
}
