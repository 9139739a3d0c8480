//! Resource identifiers for the graph

/// Pass identifier (registration index)
#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq, PartialOrd, Ord)]
pub struct PassId(pub usize);

/// Resource handle for graph resources
#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq, PartialOrd, Ord)]
pub struct ResourceHandle(pub u64);

impl ResourceHandle {
    /// Create a named resource handle (deterministic)
    pub fn named(name: &str) -> Self {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = DefaultHasher::new();
        name.hash(&mut hasher);
        Self(hasher.finish())
    }

    /// Handle of level `index` of a family of numbered resources
    pub fn indexed(name: &str, index: usize) -> Self {
        Self::named(&format!("{name} {index}"))
    }
}
