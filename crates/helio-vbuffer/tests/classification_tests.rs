//! Classification Tests
//!
//! Tests for:
//! - Material tile reduction over arbitrary level counts
//! - Tile boundaries on viewports that are not tile multiples
//! - Light tile classification and variant selection
//! - Coverage: every visible pixel is shaded by exactly one variant draw
//!
//! All checks run against the CPU reference of the classification kernels.

use helio_vbuffer::classify::{
    classify_light_tiles, classify_materials, tile_accepts, MaterialRange, TileMap, VisibilityImage,
};
use helio_vbuffer::geometry::VisibilityId;
use helio_vbuffer::material::GpuMaterial;
use helio_vbuffer::{Extent, InstanceVData, LightFeatureFlags, LightVariant, ReductionConfig, TileGrid};

/// Small deterministic generator so the tests need no extra dependencies
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> u32 {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        (self.0 >> 33) as u32
    }

    fn below(&mut self, bound: u32) -> u32 {
        self.next() % bound
    }
}

fn material_table(buckets: &[u32]) -> Vec<GpuMaterial> {
    buckets
        .iter()
        .map(|&bucket_id| GpuMaterial { bucket_id, flags: GpuMaterial::FLAG_REGISTERED, ..Default::default() })
        .collect()
}

/// Scene with a few large material blobs and scattered noise
fn random_scene(extent: Extent, seed: u64) -> (VisibilityImage, Vec<InstanceVData>, Vec<GpuMaterial>) {
    let mut rng = Lcg(seed);
    let materials = material_table(&[0, 3, 3, 7, 12, 31]);
    let instances: Vec<InstanceVData> =
        (0..24).map(|slot| InstanceVData::new(slot, rng.below(materials.len() as u32))).collect();

    let mut image = VisibilityImage::new(extent);
    for y in 0..extent.height {
        for x in 0..extent.width {
            // Roughly a quarter of the screen stays empty.
            if rng.below(4) == 0 {
                continue;
            }
            let slot = if rng.below(8) == 0 { rng.below(24) } else { (x / 50 + y / 40) % 24 };
            let id = VisibilityId::encode(slot, rng.below(128)).unwrap();
            image.set(x, y, id);
        }
    }
    (image, instances, materials)
}

/// Brute-force summary of the pixels inside one tile
fn expected_tile(
    image: &VisibilityImage,
    instances: &[InstanceVData],
    materials: &[GpuMaterial],
    tx: u32,
    ty: u32,
    tile_size: u32,
) -> (MaterialRange, u32) {
    let mut range = MaterialRange::EMPTY;
    let mut buckets = 0;
    for y in ty * tile_size..(ty + 1) * tile_size {
        for x in tx * tile_size..(tx + 1) * tile_size {
            let id = image.get(x, y);
            let Some(slot) = id.instance_slot() else { continue };
            let Some(instance) = instances.get(slot as usize) else { continue };
            let Some(material) = materials.get(instance.material_id as usize) else { continue };
            range.include(instance.material_id);
            buckets |= 1 << material.bucket_id;
        }
    }
    (range, buckets)
}

// ============================================================================
// Material Tiles
// ============================================================================

#[test]
fn reduction_matches_brute_force() {
    let extent = Extent::new(300, 170);
    let (image, instances, materials) = random_scene(extent, 7);
    let map = classify_materials(&image, &instances, &materials, &ReductionConfig::default());

    assert_eq!(map.extent, Extent::new(5, 3));
    for ty in 0..map.extent.height {
        for tx in 0..map.extent.width {
            let (range, buckets) = expected_tile(&image, &instances, &materials, tx, ty, 64);
            let tile = map.get(tx, ty);
            assert_eq!(tile.materials, range, "tile ({}, {})", tx, ty);
            assert_eq!(tile.buckets, buckets, "tile ({}, {})", tx, ty);
        }
    }
}

#[test]
fn level_count_does_not_change_the_result() {
    let extent = Extent::new(1000, 563);
    let (image, instances, materials) = random_scene(extent, 42);

    let two = classify_materials(&image, &instances, &materials, &ReductionConfig::new([8, 8]));
    let three = classify_materials(&image, &instances, &materials, &ReductionConfig::new([4, 4, 4]));
    let uneven = classify_materials(&image, &instances, &materials, &ReductionConfig::new([16, 4]));
    let single = classify_materials(&image, &instances, &materials, &ReductionConfig::new([64]));

    assert_eq!(two.extent, Extent::new(16, 9));
    assert_eq!(two, three);
    assert_eq!(two, uneven);
    assert_eq!(two, single);
}

#[test]
fn classification_is_idempotent() {
    let extent = Extent::new(257, 129);
    let (image, instances, materials) = random_scene(extent, 3);
    let config = ReductionConfig::default();

    let first: TileMap = classify_materials(&image, &instances, &materials, &config);
    let second = classify_materials(&image, &instances, &materials, &config);
    assert_eq!(first.packed_materials(), second.packed_materials());
    assert_eq!(first.bucket_masks(), second.bucket_masks());
}

#[test]
fn last_pixel_of_odd_viewport_lands_in_the_partial_tile() {
    let mut image = VisibilityImage::new(Extent::new(65, 65));
    image.set(64, 64, VisibilityId::encode(0, 5).unwrap());
    let instances = [InstanceVData::new(0, 2)];
    let map = classify_materials(&image, &instances, &material_table(&[0, 0, 9]), &ReductionConfig::default());

    assert_eq!(map.extent, Extent::new(2, 2));
    assert_eq!(map.get(1, 1).materials, MaterialRange::single(2));
    assert_eq!(map.get(1, 1).buckets, 1 << 9);
    for (x, y) in [(0, 0), (1, 0), (0, 1)] {
        assert!(map.get(x, y).is_empty(), "tile ({}, {}) should be empty", x, y);
        assert_eq!(map.packed_materials()[(y * 2 + x) as usize], MaterialRange::EMPTY_PACKED);
    }
}

#[test]
fn empty_screen_yields_empty_tiles() {
    let image = VisibilityImage::new(Extent::new(128, 128));
    let map = classify_materials(&image, &[], &[], &ReductionConfig::default());
    assert!(map.tiles.iter().all(|tile| tile.is_empty()));
    assert!(map.bucket_masks().iter().all(|&mask| mask == 0));
}

#[test]
fn unregistered_materials_do_not_widen_the_range() {
    let mut image = VisibilityImage::new(Extent::new(64, 64));
    image.set(0, 0, VisibilityId::encode(0, 0).unwrap());
    image.set(1, 0, VisibilityId::encode(1, 0).unwrap());
    // Slot 2 has no instance data at all.
    image.set(2, 0, VisibilityId::encode(2, 0).unwrap());
    let instances = [InstanceVData::new(0, 1), InstanceVData::new(1, 3)];
    let mut materials = material_table(&[0, 4, 0, 5]);
    materials[3].flags = 0;

    let map = classify_materials(&image, &instances, &materials, &ReductionConfig::default());
    assert_eq!(map.get(0, 0).materials, MaterialRange::single(1));
    assert_eq!(map.get(0, 0).buckets, 1 << 4);
}

// ============================================================================
// Light Tiles
// ============================================================================

#[test]
fn light_tiles_pick_the_cheapest_covering_variant() {
    let grid = TileGrid::cover(Extent::new(192, 64), 64);
    let light_grid = Extent::new(12, 4);
    let dir_env = (LightFeatureFlags::DIRECTIONAL | LightFeatureFlags::ENV).bits();
    let mut flags = vec![dir_env; 48];
    // One punctual light tile in the second tile, one area in the third.
    flags[5] = LightFeatureFlags::PUNCTUAL.bits();
    flags[12 * 3 + 11] = LightFeatureFlags::AREA.bits();

    let tiles = classify_light_tiles(&flags, light_grid, 16, &grid);
    let variants: Vec<LightVariant> = tiles.iter().map(|texel| LightVariant::select_bits(texel[0])).collect();
    assert_eq!(
        variants,
        vec![LightVariant::DirEnv, LightVariant::DirPunctualEnv, LightVariant::DirPunctualAreaEnv]
    );
    assert_eq!(tiles[1][1], (1 << 0) | (1 << 1));
    assert_eq!(tiles[2][1], (1 << 0) | (1 << 2));
}

#[test]
fn light_grid_smaller_than_the_screen_leaves_tiles_unlit() {
    let grid = TileGrid::cover(Extent::new(128, 64), 64);
    let flags = vec![LightFeatureFlags::PUNCTUAL.bits(); 4];
    let tiles = classify_light_tiles(&flags, Extent::new(4, 1), 16, &grid);
    assert_eq!(tiles[0][0], LightFeatureFlags::PUNCTUAL.bits());
    assert_eq!(tiles[1], [0, 0]);
}

#[test]
fn variant_bits_agree_with_the_flag_union() {
    let extent = Extent::new(400, 300);
    let grid = TileGrid::cover(extent, 64);
    let light_grid = extent.div_round_up(16);
    let choices = [
        LightFeatureFlags::empty(),
        LightFeatureFlags::DIRECTIONAL | LightFeatureFlags::SKY,
        LightFeatureFlags::PUNCTUAL,
        LightFeatureFlags::AREA | LightFeatureFlags::ENV,
        LightFeatureFlags::SS_REFRACTION,
    ];
    for seed in 0..4 {
        let mut rng = Lcg(seed);
        let flags: Vec<u32> =
            (0..light_grid.area()).map(|_| choices[rng.below(choices.len() as u32) as usize].bits()).collect();
        for texel in classify_light_tiles(&flags, light_grid, 16, &grid) {
            assert_eq!(
                LightVariant::from_variant_bits(texel[1]),
                LightVariant::select_bits(texel[0]),
                "texel {:?}",
                texel
            );
        }
    }
}

// ============================================================================
// Coverage
// ============================================================================

#[test]
fn every_visible_pixel_is_shaded_exactly_once() {
    let extent = Extent::new(333, 200);
    let (image, instances, materials) = random_scene(extent, 99);
    let map = classify_materials(&image, &instances, &materials, &ReductionConfig::default());
    let grid = TileGrid::cover(extent, 64);

    let mut rng = Lcg(5);
    let light_grid = extent.div_round_up(16);
    let choices = [
        LightFeatureFlags::DIRECTIONAL,
        LightFeatureFlags::PUNCTUAL | LightFeatureFlags::ENV,
        LightFeatureFlags::AREA,
        LightFeatureFlags::SKY | LightFeatureFlags::SS_REFLECTION,
    ];
    let flags: Vec<u32> =
        (0..light_grid.area()).map(|_| choices[rng.below(choices.len() as u32) as usize].bits()).collect();
    let classification = classify_light_tiles(&flags, light_grid, 16, &grid);

    for y in 0..extent.height {
        for x in 0..extent.width {
            let Some(slot) = image.get(x, y).instance_slot() else { continue };
            let instance = &instances[slot as usize];
            let material = &materials[instance.material_id as usize];

            let (tx, ty) = (x / 64, y / 64);
            let tile = map.get(tx, ty);
            let texel = classification[(ty * grid.count_x + tx) as usize];
            let shading = LightVariant::ALL
                .into_iter()
                .filter(|&variant| tile_accepts(&tile, texel, instance.material_id, material.bucket_id, variant))
                .count();
            assert_eq!(shading, 1, "pixel ({}, {})", x, y);
        }
    }
}
