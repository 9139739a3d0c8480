//! Light feature flags and the three lighting variants
//!
//! Every 64x64 tile is assigned exactly one variant from the union of its
//! light feature flags. The lighting pass issues one draw per variant and
//! each draw only keeps the tiles assigned to it, so the three draws never
//! shade the same pixel twice.

use bitflags::bitflags;

bitflags! {
    /// Per-tile light feature flags written by the light list build
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct LightFeatureFlags: u32 {
        const PUNCTUAL = 1 << 12;
        const AREA = 1 << 13;
        const DIRECTIONAL = 1 << 14;
        const ENV = 1 << 15;
        const SKY = 1 << 16;
        const SS_REFRACTION = 1 << 17;
        const SS_REFLECTION = 1 << 18;
        const PROBE_VOLUME = 1 << 19;
    }
}

impl LightFeatureFlags {
    /// Bits that take part in variant selection
    pub const LIGHTING: LightFeatureFlags = LightFeatureFlags::PUNCTUAL
        .union(LightFeatureFlags::AREA)
        .union(LightFeatureFlags::DIRECTIONAL)
        .union(LightFeatureFlags::ENV)
        .union(LightFeatureFlags::SKY)
        .union(LightFeatureFlags::PROBE_VOLUME);
}

bitflags! {
    /// Variant keywords toggled around each lighting draw
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct VariantKeywords: u32 {
        const DIR_ENV = 1 << 0;
        const DIR_PUNCTUAL_ENV = 1 << 1;
        const DIR_PUNCTUAL_AREA_ENV = 1 << 2;
    }
}

/// Mutually exclusive lighting code paths
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LightVariant {
    DirEnv,
    DirPunctualEnv,
    DirPunctualAreaEnv,
}

impl LightVariant {
    /// Draw order within one material
    pub const ALL: [LightVariant; 3] = [Self::DirEnv, Self::DirPunctualEnv, Self::DirPunctualAreaEnv];

    pub fn index(self) -> u32 {
        match self {
            Self::DirEnv => 0,
            Self::DirPunctualEnv => 1,
            Self::DirPunctualAreaEnv => 2,
        }
    }

    pub fn from_index(index: u32) -> Option<Self> {
        Self::ALL.get(index as usize).copied()
    }

    /// Light features this variant evaluates
    pub fn feature_mask(self) -> LightFeatureFlags {
        let base = LightFeatureFlags::SKY
            | LightFeatureFlags::DIRECTIONAL
            | LightFeatureFlags::ENV
            | LightFeatureFlags::PROBE_VOLUME;
        match self {
            Self::DirEnv => base,
            Self::DirPunctualEnv => base | LightFeatureFlags::PUNCTUAL,
            Self::DirPunctualAreaEnv => base | LightFeatureFlags::PUNCTUAL | LightFeatureFlags::AREA,
        }
    }

    pub fn keyword(self) -> VariantKeywords {
        match self {
            Self::DirEnv => VariantKeywords::DIR_ENV,
            Self::DirPunctualEnv => VariantKeywords::DIR_PUNCTUAL_ENV,
            Self::DirPunctualAreaEnv => VariantKeywords::DIR_PUNCTUAL_AREA_ENV,
        }
    }

    pub fn keyword_name(self) -> &'static str {
        match self {
            Self::DirEnv => "VARIANT_DIR_ENV",
            Self::DirPunctualEnv => "VARIANT_DIR_PUNCTUAL_ENV",
            Self::DirPunctualAreaEnv => "VARIANT_DIR_PUNCTUAL_AREA_ENV",
        }
    }

    /// Cheapest variant whose feature mask covers the tile's lighting bits
    pub fn select(flags: LightFeatureFlags) -> Self {
        let needed = flags & LightFeatureFlags::LIGHTING;
        Self::ALL
            .into_iter()
            .find(|variant| variant.feature_mask().contains(needed))
            .unwrap_or(Self::DirPunctualAreaEnv)
    }

    /// Variant for a raw flag word as stored in the classification map
    pub fn select_bits(bits: u32) -> Self {
        Self::select(LightFeatureFlags::from_bits_truncate(bits))
    }

    /// Variant of a classified tile from its variant bits (`y` of the map)
    ///
    /// The masks nest, so the highest bit is the variant `select` picks for
    /// the union of the covered flags. No bits means no lights: `DirEnv`.
    pub fn from_variant_bits(bits: u32) -> Self {
        if bits == 0 {
            return Self::DirEnv;
        }
        Self::from_index(31 - bits.leading_zeros()).unwrap_or(Self::DirPunctualAreaEnv)
    }
}

/// Keyword state of the lighting program between draws
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KeywordState {
    enabled: VariantKeywords,
}

impl KeywordState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Disable every variant keyword, then enable the one for `variant`
    pub fn enable_exclusive(&mut self, variant: LightVariant) -> VariantKeywords {
        self.enabled = variant.keyword();
        self.enabled
    }

    pub fn clear(&mut self) {
        self.enabled = VariantKeywords::empty();
    }

    pub fn enabled(&self) -> VariantKeywords {
        self.enabled
    }

    /// Variant selected by the current keywords, if exactly one is enabled
    pub fn variant(&self) -> Option<LightVariant> {
        LightVariant::ALL
            .into_iter()
            .find(|variant| self.enabled == variant.keyword())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_picks_the_cheapest_covering_variant() {
        use LightFeatureFlags as F;
        assert_eq!(LightVariant::select(F::empty()), LightVariant::DirEnv);
        assert_eq!(LightVariant::select(F::SKY | F::DIRECTIONAL | F::ENV), LightVariant::DirEnv);
        assert_eq!(LightVariant::select(F::PUNCTUAL | F::ENV), LightVariant::DirPunctualEnv);
        assert_eq!(LightVariant::select(F::AREA), LightVariant::DirPunctualAreaEnv);
        // Screen-space effects do not change the lighting variant
        assert_eq!(
            LightVariant::select(F::SS_REFLECTION | F::SS_REFRACTION),
            LightVariant::DirEnv
        );
    }

    #[test]
    fn masks_nest() {
        let [a, b, c] = LightVariant::ALL.map(LightVariant::feature_mask);
        assert!(b.contains(a) && c.contains(b));
        assert_ne!(a, b);
        assert_ne!(b, c);
    }

    #[test]
    fn keywords_are_exclusive_and_cleared() {
        let mut state = KeywordState::new();
        for variant in LightVariant::ALL {
            let enabled = state.enable_exclusive(variant);
            assert_eq!(enabled.bits().count_ones(), 1);
            assert_eq!(state.variant(), Some(variant));
        }
        state.clear();
        assert!(state.enabled().is_empty());
        assert_eq!(state.variant(), None);
    }

    #[test]
    fn index_round_trips() {
        for variant in LightVariant::ALL {
            assert_eq!(LightVariant::from_index(variant.index()), Some(variant));
        }
        assert_eq!(LightVariant::from_index(3), None);
    }

    #[test]
    fn variant_bits_pick_the_highest_variant() {
        assert_eq!(LightVariant::from_variant_bits(0), LightVariant::DirEnv);
        assert_eq!(LightVariant::from_variant_bits(0b001), LightVariant::DirEnv);
        assert_eq!(LightVariant::from_variant_bits(0b011), LightVariant::DirPunctualEnv);
        assert_eq!(LightVariant::from_variant_bits(0b101), LightVariant::DirPunctualAreaEnv);
    }
}
