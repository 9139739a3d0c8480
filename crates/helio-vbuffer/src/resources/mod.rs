//! GPU resource management: bind group layouts, external buffers and the
//! transient texture pool

mod bindgroup;
mod buffers;
mod pool;

pub use bindgroup::{BindGroupBuilder, BindGroupLayouts, CONSTANTS_STRIDE};
pub use buffers::ExternalBuffers;
pub use pool::{AgedPool, TextureKey, TexturePool, MAX_POOL_AGE};
