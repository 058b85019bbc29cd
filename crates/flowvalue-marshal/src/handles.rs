//! The resource handle table.
//!
//! Host resources cannot be written into runtime memory, so a `Stream` slot
//! carries a small integer instead. Handles are dense, start at 0 and are
//! never reused or evicted while the table lives.

use std::collections::HashMap;

use crate::host::Resource;

/// The integer stored in a `Stream` slot.
pub type ResourceHandle = u32;

#[derive(Debug, Default)]
pub struct ResourceHandleTable {
    /// Resource identity → handle.
    by_identity: HashMap<usize, ResourceHandle>,
    /// Handle → resource. Holding a clone keeps every registered
    /// allocation alive, so identities cannot be recycled.
    resources: Vec<Resource>,
}

impl ResourceHandleTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// The handle for `resource`, registering it on first sight.
    pub fn handle_for(&mut self, resource: &Resource) -> ResourceHandle {
        if let Some(handle) = self.by_identity.get(&resource.identity()) {
            return *handle;
        }
        let handle = self.resources.len() as ResourceHandle;
        self.by_identity.insert(resource.identity(), handle);
        self.resources.push(resource.clone());
        handle
    }

    /// The handle already assigned to `resource`, if any.
    pub fn handle_of(&self, resource: &Resource) -> Option<ResourceHandle> {
        self.by_identity.get(&resource.identity()).copied()
    }

    /// The resource registered under `handle`.
    pub fn get(&self, handle: ResourceHandle) -> Option<&Resource> {
        self.resources.get(handle as usize)
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}
