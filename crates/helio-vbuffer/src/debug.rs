//! Full-screen debug views of the intermediate VBuffer textures

use crate::graph::ResourceHandle;

/// Intermediate texture shown over the final image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FullScreenDebugMode {
    #[default]
    None,
    VBufferTriangleId,
    VBufferGeometryId,
    VBufferMaterialId,
    VBufferLightingDebug,
    VBufferTileClassification,
    VBufferMaterialTile,
    VBufferBucketId,
}

/// How a debug texture is read by the visualization shader
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DebugSampleKind {
    Uint,
    Float,
    Depth,
}

impl FullScreenDebugMode {
    pub const ALL: [FullScreenDebugMode; 8] = [
        Self::None,
        Self::VBufferTriangleId,
        Self::VBufferGeometryId,
        Self::VBufferMaterialId,
        Self::VBufferLightingDebug,
        Self::VBufferTileClassification,
        Self::VBufferMaterialTile,
        Self::VBufferBucketId,
    ];

    /// Integer index, as driven by debug UI
    pub fn index(self) -> u32 {
        Self::ALL.iter().position(|&mode| mode == self).unwrap_or(0) as u32
    }

    pub fn from_index(index: u32) -> Option<Self> {
        Self::ALL.get(index as usize).copied()
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::None => "None",
            Self::VBufferTriangleId => "VBufferTriangleId",
            Self::VBufferGeometryId => "VBufferGeometryId",
            Self::VBufferMaterialId => "VBufferMaterialId",
            Self::VBufferLightingDebug => "VBufferLightingDebug",
            Self::VBufferTileClassification => "VBufferTileClassification",
            Self::VBufferMaterialTile => "VBufferMaterialTile",
            Self::VBufferBucketId => "VBufferBucketId",
        }
    }

    pub fn sample_kind(self) -> DebugSampleKind {
        match self {
            Self::VBufferMaterialId => DebugSampleKind::Depth,
            Self::VBufferLightingDebug => DebugSampleKind::Float,
            _ => DebugSampleKind::Uint,
        }
    }
}

/// A texture a pass exported for debug display
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebugTexture {
    pub handle: ResourceHandle,
    pub format: wgpu::TextureFormat,
    /// Screen pixels covered by one texel
    pub scale: u32,
}

/// Debug display state owned by the renderer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DebugDisplaySettings {
    full_screen: FullScreenDebugMode,
}

impl DebugDisplaySettings {
    pub fn set_full_screen_debug_mode(&mut self, mode: FullScreenDebugMode) {
        if mode != self.full_screen {
            log::info!("Full screen debug mode: {}", mode.name());
        }
        self.full_screen = mode;
    }

    pub fn full_screen_debug_mode(&self) -> FullScreenDebugMode {
        self.full_screen
    }

    pub fn is_active(&self) -> bool {
        self.full_screen != FullScreenDebugMode::None
    }

    pub fn reset(&mut self) {
        self.set_full_screen_debug_mode(FullScreenDebugMode::None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_round_trips() {
        for mode in FullScreenDebugMode::ALL {
            assert_eq!(FullScreenDebugMode::from_index(mode.index()), Some(mode));
        }
        assert_eq!(FullScreenDebugMode::from_index(42), None);
    }

    #[test]
    fn reset_clears_mode() {
        let mut settings = DebugDisplaySettings::default();
        settings.set_full_screen_debug_mode(FullScreenDebugMode::VBufferBucketId);
        assert!(settings.is_active());
        settings.reset();
        assert_eq!(settings.full_screen_debug_mode(), FullScreenDebugMode::None);
    }
}
