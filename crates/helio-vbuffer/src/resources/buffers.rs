//! Storage buffers supplied from outside the graph

use crate::recipe::BufferSlot;
use std::collections::HashMap;
use std::sync::Arc;

/// Size of the zero-filled placeholder bound when a slot has no data
const PLACEHOLDER_SIZE: u64 = 256;

struct SlotBuffer {
    buffer: wgpu::Buffer,
    /// Bytes of real data (0 for the placeholder)
    len: u64,
}

/// One read-only storage buffer per [`BufferSlot`]
///
/// Every slot always holds a valid buffer so bind groups can be built even
/// when the producer has not uploaded anything yet.
pub struct ExternalBuffers {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    slots: HashMap<BufferSlot, SlotBuffer>,
}

impl ExternalBuffers {
    pub fn new(device: Arc<wgpu::Device>, queue: Arc<wgpu::Queue>) -> Self {
        let slots = BufferSlot::ALL
            .into_iter()
            .map(|slot| (slot, SlotBuffer { buffer: Self::create(&device, slot, PLACEHOLDER_SIZE), len: 0 }))
            .collect();
        Self { device, queue, slots }
    }

    fn create(device: &wgpu::Device, slot: BufferSlot, size: u64) -> wgpu::Buffer {
        device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(slot.binding_name()),
            size,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }

    /// Upload `bytes` into a slot, reallocating when the size changes
    pub fn upload(&mut self, slot: BufferSlot, bytes: &[u8]) {
        if bytes.is_empty() {
            self.clear(slot);
            return;
        }
        // Storage bindings must be 4-byte aligned and non-empty.
        let size = (bytes.len() as u64).max(PLACEHOLDER_SIZE).next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT);
        // Shaders size their loops with arrayLength, so a stale tail must not survive.
        let needs_new = self.slots.get(&slot).map_or(true, |s| s.buffer.size() != size);
        if needs_new {
            log::debug!("Resizing {} to {} bytes", slot.binding_name(), size);
            let buffer = Self::create(&self.device, slot, size);
            self.slots.insert(slot, SlotBuffer { buffer, len: 0 });
        }
        if let Some(entry) = self.slots.get_mut(&slot) {
            let padded_len = (bytes.len() as u64).next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT);
            if padded_len == bytes.len() as u64 {
                self.queue.write_buffer(&entry.buffer, 0, bytes);
            } else {
                let mut padded = bytes.to_vec();
                padded.resize(padded_len as usize, 0);
                self.queue.write_buffer(&entry.buffer, 0, &padded);
            }
            entry.len = bytes.len() as u64;
        }
    }

    /// Replace a slot with a zeroed placeholder
    pub fn clear(&mut self, slot: BufferSlot) {
        let buffer = Self::create(&self.device, slot, PLACEHOLDER_SIZE);
        self.slots.insert(slot, SlotBuffer { buffer, len: 0 });
    }

    pub fn get(&self, slot: BufferSlot) -> Option<&wgpu::Buffer> {
        self.slots.get(&slot).map(|entry| &entry.buffer)
    }

    /// Whether real data has been uploaded to the slot
    pub fn has_data(&self, slot: BufferSlot) -> bool {
        self.slots.get(&slot).is_some_and(|entry| entry.len > 0)
    }
}
