//! Post-process color lookup (strip LUT color grading)

/// Default LUT edge length
pub const DEFAULT_LUT_SIZE: u32 = 32;

/// Dimensionality of a LUT texture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LutDimension {
    #[default]
    Tex2D,
    Tex3D,
}

/// Description of a lookup texture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LutDesc {
    pub width: u32,
    pub height: u32,
    pub dimension: LutDimension,
    pub srgb: bool,
}

impl LutDesc {
    /// Linear 2D strip LUT of `size` slices laid out horizontally
    pub fn strip(size: u32) -> Self {
        Self {
            width: size * size,
            height: size,
            dimension: LutDimension::Tex2D,
            srgb: false,
        }
    }
}

/// Color lookup volume settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorLookup {
    pub lut: Option<LutDesc>,
    contribution: f32,
}

impl Default for ColorLookup {
    fn default() -> Self {
        Self { lut: None, contribution: 1.0 }
    }
}

impl ColorLookup {
    pub fn new(lut: Option<LutDesc>, contribution: f32) -> Self {
        let mut lookup = Self { lut, contribution: 0.0 };
        lookup.set_contribution(contribution);
        lookup
    }

    pub fn contribution(&self) -> f32 {
        self.contribution
    }

    /// Set the contribution, clamped to `[0, 1]` (NaN becomes 0)
    pub fn set_contribution(&mut self, contribution: f32) {
        self.contribution = if contribution.is_nan() { 0.0 } else { contribution.clamp(0.0, 1.0) };
    }

    /// Whether the LUT matches the configured grading size
    pub fn validate_lut(&self, lut_size: u32) -> bool {
        let Some(lut) = self.lut else {
            return false;
        };
        lut.height == lut_size
            && lut.dimension == LutDimension::Tex2D
            && lut.width == lut_size * lut_size
            && !lut.srgb
    }

    pub fn is_active(&self, lut_size: u32) -> bool {
        self.contribution > 0.0 && self.validate_lut(lut_size)
    }

    pub fn is_tile_compatible(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validates_strip_layout() {
        let lookup = ColorLookup::new(Some(LutDesc::strip(32)), 1.0);
        assert!(lookup.validate_lut(32));
        assert!(!lookup.validate_lut(16));

        let srgb = ColorLookup::new(Some(LutDesc { srgb: true, ..LutDesc::strip(32) }), 1.0);
        assert!(!srgb.validate_lut(32));

        let volume = ColorLookup::new(
            Some(LutDesc { dimension: LutDimension::Tex3D, ..LutDesc::strip(32) }),
            1.0,
        );
        assert!(!volume.validate_lut(32));
        assert!(!ColorLookup::default().validate_lut(32));
    }

    #[test]
    fn activity_needs_contribution_and_valid_lut() {
        let mut lookup = ColorLookup::new(Some(LutDesc::strip(16)), 0.0);
        assert!(!lookup.is_active(16));
        lookup.set_contribution(3.0);
        assert_eq!(lookup.contribution(), 1.0);
        assert!(lookup.is_active(16));
        assert!(lookup.is_tile_compatible());
        lookup.set_contribution(f32::NAN);
        assert!(!lookup.is_active(16));
    }
}
