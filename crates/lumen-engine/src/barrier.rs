use crate::resource::{ResourceId, ResourceState};

/// A single resource-state transition.
///
/// Barriers are never recorded on their own; the graphics context and the
/// upload drain group them into one `Command::Barriers` batch per flush.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ResourceBarrier {
    pub resource: ResourceId,
    pub from: ResourceState,
    pub to: ResourceState,
}

impl ResourceBarrier {
    #[inline]
    pub fn new(resource: ResourceId, from: ResourceState, to: ResourceState) -> Self {
        Self { resource, from, to }
    }

    #[inline]
    pub fn is_redundant(&self) -> bool {
        self.from == self.to
    }
}
