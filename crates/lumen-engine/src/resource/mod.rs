//! GPU resources: handles, descriptions, states and readiness.

mod desc;
mod state;

pub use desc::{
    BufferDesc, BufferViews, CONSTANT_BUFFER_ALIGNMENT, Format, MAX_TEXTURE_DIMENSION,
    TextureDesc, TextureViews,
};
pub use state::{AccessPattern, Readiness, ResourceState};

use crate::descriptor::DescriptorIndex;

slotmap::new_key_type! {
    /// Generational id of a buffer or texture in the device's resource table.
    pub struct ResourceId;
}

/// Typed handle to a buffer.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub(crate) ResourceId);

/// Typed handle to a texture.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub(crate) ResourceId);

impl BufferHandle {
    #[inline]
    pub fn id(self) -> ResourceId {
        self.0
    }
}

impl TextureHandle {
    #[inline]
    pub fn id(self) -> ResourceId {
        self.0
    }
}

impl From<BufferHandle> for ResourceId {
    fn from(h: BufferHandle) -> Self {
        h.0
    }
}

impl From<TextureHandle> for ResourceId {
    fn from(h: TextureHandle) -> Self {
        h.0
    }
}

/// The device's resource table.
pub(crate) type ResourceTable = slotmap::SlotMap<ResourceId, GpuResource>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceKind {
    Buffer(BufferDesc),
    Texture(TextureDesc),
}

/// A GPU-resident buffer or texture as tracked by the device.
#[derive(Debug, Clone)]
pub struct GpuResource {
    pub(crate) kind: ResourceKind,
    pub(crate) access: AccessPattern,
    pub(crate) bindless_index: Option<DescriptorIndex>,
    pub(crate) state: ResourceState,
    pub(crate) readiness: Readiness,
    /// Completion marker of the last submission that referenced this resource.
    pub(crate) last_used_fence: u64,
    pub(crate) back_buffer: bool,
}

impl GpuResource {
    pub(crate) fn buffer(desc: BufferDesc, bindless_index: Option<DescriptorIndex>) -> Self {
        let (state, readiness) = match desc.access {
            AccessPattern::HostWritable => (ResourceState::GenericRead, Readiness::Ready),
            AccessPattern::GpuOnly => (ResourceState::Common, Readiness::Unpopulated),
        };
        Self {
            access: desc.access,
            kind: ResourceKind::Buffer(desc),
            bindless_index,
            state,
            readiness,
            last_used_fence: 0,
            back_buffer: false,
        }
    }

    pub(crate) fn texture(desc: TextureDesc, bindless_index: Option<DescriptorIndex>) -> Self {
        let readiness = if desc.is_gpu_produced() {
            Readiness::Ready
        } else {
            Readiness::Unpopulated
        };
        Self {
            access: AccessPattern::GpuOnly,
            state: desc.initial_state(),
            kind: ResourceKind::Texture(desc),
            bindless_index,
            readiness,
            last_used_fence: 0,
            back_buffer: false,
        }
    }

    pub(crate) fn back_buffer(desc: TextureDesc) -> Self {
        Self {
            access: AccessPattern::GpuOnly,
            kind: ResourceKind::Texture(desc),
            bindless_index: None,
            state: ResourceState::Present,
            readiness: Readiness::Ready,
            last_used_fence: 0,
            back_buffer: true,
        }
    }

    #[inline]
    pub fn kind(&self) -> &ResourceKind {
        &self.kind
    }

    #[inline]
    pub fn access(&self) -> AccessPattern {
        self.access
    }

    #[inline]
    pub fn bindless_index(&self) -> Option<DescriptorIndex> {
        self.bindless_index
    }

    #[inline]
    pub fn state(&self) -> ResourceState {
        self.state
    }

    #[inline]
    pub fn readiness(&self) -> Readiness {
        self.readiness
    }

    #[inline]
    pub fn is_ready(&self) -> bool {
        self.readiness.is_ready()
    }

    #[inline]
    pub fn last_used_fence(&self) -> u64 {
        self.last_used_fence
    }

    #[inline]
    pub fn is_back_buffer(&self) -> bool {
        self.back_buffer
    }

    pub fn as_buffer(&self) -> Option<&BufferDesc> {
        match &self.kind {
            ResourceKind::Buffer(d) => Some(d),
            ResourceKind::Texture(_) => None,
        }
    }

    pub fn as_texture(&self) -> Option<&TextureDesc> {
        match &self.kind {
            ResourceKind::Texture(d) => Some(d),
            ResourceKind::Buffer(_) => None,
        }
    }

    /// State the resource returns to once an upload into it has landed.
    pub(crate) fn resting_state(&self) -> ResourceState {
        match self.access {
            AccessPattern::HostWritable => ResourceState::GenericRead,
            AccessPattern::GpuOnly => ResourceState::ShaderResource,
        }
    }

    /// State a shader view expects when the resource is bound through a space.
    pub(crate) fn shader_read_state(&self) -> ResourceState {
        self.resting_state()
    }
}
