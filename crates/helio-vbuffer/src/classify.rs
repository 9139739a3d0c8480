//! CPU reference of the classification kernels
//!
//! These mirror `tile_classification.wgsl` and `material_tile.wgsl` texel for
//! texel. They are used by tests, by debug tooling, and to reason about which
//! tiles a lighting draw keeps.

use crate::geometry::{InstanceVData, VisibilityId};
use crate::material::{GpuMaterial, MAX_BUCKETS, MAX_MATERIALS};
use crate::tiles::{Extent, ReductionConfig, TileGrid};
use crate::variants::LightVariant;

/// Inclusive range of global material ids present in a tile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MaterialRange {
    pub min: u32,
    pub max: u32,
}

impl MaterialRange {
    /// Packed value of a tile without materials
    pub const EMPTY_PACKED: u32 = 0xFFFF_0000;

    pub const EMPTY: MaterialRange = MaterialRange { min: MAX_MATERIALS, max: 0 };

    pub fn single(id: u32) -> Self {
        Self { min: id, max: id }
    }

    pub fn is_empty(&self) -> bool {
        self.min > self.max
    }

    pub fn include(&mut self, id: u32) {
        self.min = self.min.min(id);
        self.max = self.max.max(id);
    }

    pub fn merge(&mut self, other: MaterialRange) {
        if !other.is_empty() {
            self.include(other.min);
            self.include(other.max);
        }
    }

    pub fn contains(&self, id: u32) -> bool {
        !self.is_empty() && (self.min..=self.max).contains(&id)
    }

    /// `min << 16 | max`, as stored in the material tile map
    pub fn pack(&self) -> u32 {
        if self.is_empty() {
            return Self::EMPTY_PACKED;
        }
        (self.min << 16) | (self.max & 0xFFFF)
    }

    pub fn unpack(packed: u32) -> Self {
        Self { min: packed >> 16, max: packed & 0xFFFF }
    }
}

impl Default for MaterialRange {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// Materials and light buckets present in one tile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TileSummary {
    pub materials: MaterialRange,
    /// Bit `n` set when bucket `n` is present
    pub buckets: u32,
}

impl TileSummary {
    pub const EMPTY: TileSummary = TileSummary { materials: MaterialRange::EMPTY, buckets: 0 };

    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }

    pub fn include(&mut self, material_id: u32, bucket_id: u32) {
        self.materials.include(material_id);
        if bucket_id < MAX_BUCKETS {
            self.buckets |= 1 << bucket_id;
        }
    }

    pub fn merge(&mut self, other: &TileSummary) {
        self.materials.merge(other.materials);
        self.buckets |= other.buckets;
    }

    /// Whether a lighting draw for this material/bucket may keep the tile
    pub fn may_contain(&self, material_id: u32, bucket_id: u32) -> bool {
        bucket_id < MAX_BUCKETS
            && self.materials.contains(material_id)
            && self.buckets & (1 << bucket_id) != 0
    }
}

/// CPU copy of the visibility buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisibilityImage {
    pub extent: Extent,
    pub texels: Vec<u32>,
}

impl VisibilityImage {
    /// Image cleared to "no geometry"
    pub fn new(extent: Extent) -> Self {
        Self { extent, texels: vec![VisibilityId::NONE.0; extent.area() as usize] }
    }

    pub fn set(&mut self, x: u32, y: u32, id: VisibilityId) {
        if self.extent.contains(x, y) {
            self.texels[(y * self.extent.width + x) as usize] = id.0;
        }
    }

    /// Texel at `(x, y)`; out-of-bounds reads return "no geometry"
    pub fn get(&self, x: u32, y: u32) -> VisibilityId {
        if !self.extent.contains(x, y) {
            return VisibilityId::NONE;
        }
        VisibilityId(self.texels[(y * self.extent.width + x) as usize])
    }
}

/// A material tile map and its bucket map
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileMap {
    pub extent: Extent,
    pub tiles: Vec<TileSummary>,
}

impl TileMap {
    pub fn new(extent: Extent) -> Self {
        Self { extent, tiles: vec![TileSummary::EMPTY; extent.area() as usize] }
    }

    /// Tile at `(x, y)`; out-of-bounds reads return an empty tile
    pub fn get(&self, x: u32, y: u32) -> TileSummary {
        if !self.extent.contains(x, y) {
            return TileSummary::EMPTY;
        }
        self.tiles[(y * self.extent.width + x) as usize]
    }

    fn get_mut(&mut self, x: u32, y: u32) -> &mut TileSummary {
        let width = self.extent.width;
        &mut self.tiles[(y * width + x) as usize]
    }

    /// Texels of the material tile map
    pub fn packed_materials(&self) -> Vec<u32> {
        self.tiles.iter().map(|tile| tile.materials.pack()).collect()
    }

    /// Texels of the bucket id map
    pub fn bucket_masks(&self) -> Vec<u32> {
        self.tiles.iter().map(|tile| tile.buckets).collect()
    }
}

/// Resolve the material and bucket of one visibility texel
///
/// Texels whose instance or material falls outside the uploaded tables, or
/// whose material is not registered, count as empty like texels outside the
/// image.
pub fn resolve_texel(
    id: VisibilityId,
    instances: &[InstanceVData],
    materials: &[GpuMaterial],
) -> Option<(u32, u32)> {
    let slot = id.instance_slot()?;
    let instance = instances.get(slot as usize)?;
    let material = materials.get(instance.material_id as usize)?;
    if material.flags & GpuMaterial::FLAG_REGISTERED == 0 {
        return None;
    }
    Some((instance.material_id, material.bucket_id))
}

/// First reduction level: visibility texels to `fan_in` x `fan_in` blocks
pub fn reduce_visibility(
    image: &VisibilityImage,
    instances: &[InstanceVData],
    materials: &[GpuMaterial],
    fan_in: u32,
) -> TileMap {
    let mut map = TileMap::new(image.extent.div_round_up(fan_in));
    for ty in 0..map.extent.height {
        for tx in 0..map.extent.width {
            let mut summary = TileSummary::EMPTY;
            for y in ty * fan_in..(ty + 1) * fan_in {
                for x in tx * fan_in..(tx + 1) * fan_in {
                    if let Some((material_id, bucket_id)) = resolve_texel(image.get(x, y), instances, materials) {
                        summary.include(material_id, bucket_id);
                    }
                }
            }
            *map.get_mut(tx, ty) = summary;
        }
    }
    map
}

/// Later reduction levels: merge `fan_in` x `fan_in` tiles
pub fn reduce_tiles(input: &TileMap, fan_in: u32) -> TileMap {
    let mut map = TileMap::new(input.extent.div_round_up(fan_in));
    for ty in 0..map.extent.height {
        for tx in 0..map.extent.width {
            let mut summary = TileSummary::EMPTY;
            for y in ty * fan_in..(ty + 1) * fan_in {
                for x in tx * fan_in..(tx + 1) * fan_in {
                    summary.merge(&input.get(x, y));
                }
            }
            *map.get_mut(tx, ty) = summary;
        }
    }
    map
}

/// Full N-level material classification
pub fn classify_materials(
    image: &VisibilityImage,
    instances: &[InstanceVData],
    materials: &[GpuMaterial],
    config: &ReductionConfig,
) -> TileMap {
    let mut levels = config.fan_in.iter();
    let first = levels.next().copied().unwrap_or(1);
    let map = reduce_visibility(image, instances, materials, first);
    levels.fold(map, |map, &fan_in| reduce_tiles(&map, fan_in))
}

/// Reduce light-tile feature flags to one texel per classification tile
///
/// Texel `x` holds the union of the covered light tiles' flags, texel `y`
/// holds one bit per lighting variant required by any covered light tile.
/// Light tiles outside `light_grid` contribute nothing.
pub fn classify_light_tiles(
    flags: &[u32],
    light_grid: Extent,
    light_tile_size: u32,
    tiles: &TileGrid,
) -> Vec<[u32; 2]> {
    let ratio = (tiles.tile_size / light_tile_size.max(1)).max(1);
    let mut out = Vec::with_capacity(tiles.tile_count() as usize);
    for ty in 0..tiles.count_y {
        for tx in 0..tiles.count_x {
            let mut texel = [0u32; 2];
            for y in ty * ratio..(ty + 1) * ratio {
                for x in tx * ratio..(tx + 1) * ratio {
                    if !light_grid.contains(x, y) {
                        continue;
                    }
                    let Some(&bits) = flags.get((y * light_grid.width + x) as usize) else {
                        continue;
                    };
                    texel[0] |= bits;
                    texel[1] |= 1 << LightVariant::select_bits(bits).index();
                }
            }
            out.push(texel);
        }
    }
    out
}

/// Whether the lighting draw of `variant` keeps a tile for a material
///
/// Mirrors the vertex stage rejection of `vbuffer_lighting.wgsl`.
pub fn tile_accepts(
    summary: &TileSummary,
    classification: [u32; 2],
    material_id: u32,
    bucket_id: u32,
    variant: LightVariant,
) -> bool {
    summary.may_contain(material_id, bucket_id) && LightVariant::from_variant_bits(classification[1]) == variant
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(buckets: &[u32]) -> Vec<GpuMaterial> {
        buckets
            .iter()
            .map(|&bucket_id| GpuMaterial { bucket_id, flags: GpuMaterial::FLAG_REGISTERED, ..Default::default() })
            .collect()
    }

    #[test]
    fn range_packing() {
        assert_eq!(MaterialRange::EMPTY.pack(), MaterialRange::EMPTY_PACKED);
        assert!(MaterialRange::unpack(MaterialRange::EMPTY_PACKED).is_empty());
        let mut range = MaterialRange::single(5);
        range.include(2);
        assert_eq!(range.pack(), (2 << 16) | 5);
        assert_eq!(MaterialRange::unpack(range.pack()), range);
        assert!(range.contains(3) && !range.contains(6));
    }

    #[test]
    fn out_of_bounds_texels_are_empty() {
        // 10x10 image, one 8x8 block fully outside except a 2x2 corner
        let mut image = VisibilityImage::new(Extent::new(10, 10));
        let instances = [InstanceVData::new(0, 3)];
        image.set(9, 9, VisibilityId::encode(0, 0).unwrap());
        let map = reduce_visibility(&image, &instances, &table(&[0, 0, 0, 4]), 8);
        assert_eq!(map.extent, Extent::new(2, 2));
        assert!(map.get(0, 0).is_empty());
        assert_eq!(map.get(1, 1).materials, MaterialRange::single(3));
        assert_eq!(map.get(1, 1).buckets, 1 << 4);
        assert!(map.get(5, 5).is_empty());
    }

    #[test]
    fn unknown_instances_and_materials_are_ignored() {
        let mut image = VisibilityImage::new(Extent::new(4, 4));
        image.set(0, 0, VisibilityId::encode(7, 1).unwrap());
        image.set(1, 0, VisibilityId::encode(0, 1).unwrap());
        let instances = [InstanceVData::new(0, 99)];
        let map = reduce_visibility(&image, &instances, &table(&[0]), 4);
        assert!(map.get(0, 0).is_empty());
    }

    #[test]
    fn two_level_reduction_merges_blocks() {
        let mut image = VisibilityImage::new(Extent::new(130, 70));
        let instances = [InstanceVData::new(0, 1), InstanceVData::new(1, 2)];
        image.set(0, 0, VisibilityId::encode(0, 0).unwrap());
        image.set(63, 63, VisibilityId::encode(1, 0).unwrap());
        image.set(129, 69, VisibilityId::encode(1, 3).unwrap());
        let map = classify_materials(&image, &instances, &table(&[0, 1, 2]), &ReductionConfig::default());

        assert_eq!(map.extent, Extent::new(3, 2));
        assert_eq!(map.get(0, 0).materials, MaterialRange { min: 1, max: 2 });
        assert_eq!(map.get(0, 0).buckets, 0b110);
        assert!(map.get(1, 0).is_empty());
        assert_eq!(map.get(2, 1).materials, MaterialRange::single(2));
        assert_eq!(map.packed_materials()[1], MaterialRange::EMPTY_PACKED);
    }

    #[test]
    fn light_tiles_union_and_variant_bits() {
        use crate::variants::LightFeatureFlags as F;
        let grid = TileGrid::cover(Extent::new(100, 64), 64);
        // Light grid for 100x64 at 16px is 7x4
        let light_grid = Extent::new(7, 4);
        let mut flags = vec![F::DIRECTIONAL.bits(); 28];
        flags[5] = F::AREA.bits();
        let tiles = classify_light_tiles(&flags, light_grid, 16, &grid);
        assert_eq!(tiles.len(), 2);
        assert_eq!(tiles[0], [F::DIRECTIONAL.bits(), 0b001]);
        assert_eq!(tiles[1][0], (F::DIRECTIONAL | F::AREA).bits());
        assert_eq!(tiles[1][1], 0b101);
    }

    #[test]
    fn missing_light_input_yields_zero_flags() {
        let grid = TileGrid::cover(Extent::new(65, 65), 64);
        let tiles = classify_light_tiles(&[], Extent::default(), 16, &grid);
        assert_eq!(tiles, vec![[0, 0]; 4]);
    }

    #[test]
    fn each_tile_is_kept_by_exactly_one_variant() {
        let mut summary = TileSummary::EMPTY;
        summary.include(4, 2);
        for bits in [0, 1 << 12, 1 << 13, (1 << 14) | (1 << 15)] {
            let texel = [bits, 1 << LightVariant::select_bits(bits).index()];
            let kept = LightVariant::ALL
                .into_iter()
                .filter(|&variant| tile_accepts(&summary, texel, 4, 2, variant))
                .count();
            assert_eq!(kept, 1);
        }
        assert!(!tile_accepts(&summary, [0, 0], 4, 3, LightVariant::DirEnv));
        assert!(!tile_accepts(&summary, [0, 0], 5, 2, LightVariant::DirEnv));
    }
}
