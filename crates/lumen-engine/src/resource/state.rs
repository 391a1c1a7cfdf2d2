/// How a resource may currently be accessed by the GPU.
///
/// Every state-dependent command requires a specific state; transitions are
/// only made through flushed barrier batches.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ResourceState {
    Common,
    Present,
    RenderTarget,
    DepthWrite,
    DepthRead,
    ShaderResource,
    CopyDest,
    CopySource,
    /// Resting state of host-writable (upload heap) memory.
    GenericRead,
}

impl ResourceState {
    /// States in which a shader may read the resource through a view.
    #[inline]
    pub fn is_shader_readable(self) -> bool {
        matches!(self, Self::ShaderResource | Self::GenericRead | Self::DepthRead)
    }
}

/// Where a resource's memory lives and who writes it.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub enum AccessPattern {
    /// CPU-mapped memory; written with `Device::set_mapped_data`.
    HostWritable,
    /// Device-local memory; content arrives through the upload queue.
    #[default]
    GpuOnly,
}

/// Upload readiness of a resource.
///
/// `Pending -> Ready` happens exactly once per drained upload batch, and only
/// after the completion marker that carried the copies has been reached.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Readiness {
    /// Content is valid and safe to consume.
    Ready,
    /// Device-local and nothing has been uploaded yet.
    Unpopulated,
    /// An upload is queued but not yet drained into a submission.
    Queued,
    /// Copies were submitted with completion marker `fence`.
    Pending { fence: u64 },
}

impl Readiness {
    #[inline]
    pub fn is_ready(self) -> bool {
        self == Self::Ready
    }
}
