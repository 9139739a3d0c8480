//! Resource pooling for efficient memory reuse
//!
//! Frame and transient textures are returned to the pool after use and
//! reused by later passes or frames with the same description. Entries that
//! sit unused for `MAX_POOL_AGE` frames are dropped, which is how textures
//! sized for an old resolution go away after a resize.

use crate::recipe::TextureRequest;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

/// Frames an unused pooled resource is kept for
pub const MAX_POOL_AGE: u64 = 60;

/// Key for texture pool lookup
#[derive(Hash, Eq, PartialEq, Clone, Copy, Debug)]
pub struct TextureKey {
    pub width: u32,
    pub height: u32,
    pub format: wgpu::TextureFormat,
    pub usage: wgpu::TextureUsages,
}

impl TextureKey {
    pub fn from_request(request: &TextureRequest) -> Self {
        let extent = request.extent.at_least_one();
        Self {
            width: extent.width,
            height: extent.height,
            format: request.format,
            usage: request.usage,
        }
    }

    pub fn to_descriptor<'a>(&self, label: Option<&'a str>) -> wgpu::TextureDescriptor<'a> {
        wgpu::TextureDescriptor {
            label,
            size: wgpu::Extent3d {
                width: self.width,
                height: self.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: self.format,
            usage: self.usage,
            view_formats: &[],
        }
    }
}

/// Keyed free-list that remembers when each entry was released
#[derive(Debug)]
pub struct AgedPool<K, T> {
    available: HashMap<K, Vec<(T, u64)>>,
}

impl<K: Hash + Eq, T> AgedPool<K, T> {
    pub fn new() -> Self {
        Self { available: HashMap::new() }
    }

    /// Most recently released entry for `key`
    pub fn take(&mut self, key: &K) -> Option<T> {
        self.available.get_mut(key)?.pop().map(|(item, _)| item)
    }

    pub fn put(&mut self, key: K, item: T, frame: u64) {
        self.available.entry(key).or_default().push((item, frame));
    }

    /// Drop entries released `MAX_POOL_AGE` or more frames before `current_frame`
    pub fn cleanup_old(&mut self, current_frame: u64) -> usize {
        let mut dropped = 0;
        self.available.retain(|_, items| {
            let before = items.len();
            items.retain(|(_, released)| current_frame.saturating_sub(*released) < MAX_POOL_AGE);
            dropped += before - items.len();
            !items.is_empty()
        });
        dropped
    }

    pub fn len(&self) -> usize {
        self.available.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K: Hash + Eq, T> Default for AgedPool<K, T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Pool for reusing textures
pub struct TexturePool {
    device: Arc<wgpu::Device>,
    pool: AgedPool<TextureKey, wgpu::Texture>,
}

impl TexturePool {
    pub fn new(device: Arc<wgpu::Device>) -> Self {
        Self { device, pool: AgedPool::new() }
    }

    /// Acquire a texture from the pool (or create new one)
    pub fn acquire(&mut self, key: TextureKey, label: &str) -> wgpu::Texture {
        if let Some(texture) = self.pool.take(&key) {
            log::trace!("Reusing pooled texture '{}' {:?}", label, key);
            return texture;
        }

        log::debug!("Creating new pooled texture '{}' {:?}", label, key);
        self.device.create_texture(&key.to_descriptor(Some(label)))
    }

    /// Release a texture back to the pool
    pub fn release(&mut self, texture: wgpu::Texture, key: TextureKey, frame: u64) {
        self.pool.put(key, texture, frame);
    }

    /// Cleanup textures that haven't been used in a while
    pub fn cleanup_old(&mut self, current_frame: u64) {
        let dropped = self.pool.cleanup_old(current_frame);
        if dropped > 0 {
            log::debug!("Dropped {} pooled textures", dropped);
        }
    }

    pub fn len(&self) -> usize {
        self.pool.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pool.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reuses_entries_per_key() {
        let mut pool: AgedPool<u32, &str> = AgedPool::new();
        pool.put(1, "a", 0);
        pool.put(2, "b", 0);
        assert_eq!(pool.take(&1), Some("a"));
        assert_eq!(pool.take(&1), None);
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn old_entries_age_out() {
        let mut pool: AgedPool<u32, u32> = AgedPool::new();
        pool.put(1, 10, 0);
        pool.put(1, 11, 50);
        assert_eq!(pool.cleanup_old(MAX_POOL_AGE - 1), 0);
        assert_eq!(pool.cleanup_old(MAX_POOL_AGE), 1);
        assert_eq!(pool.take(&1), Some(11));
        assert!(pool.is_empty());
    }
}
