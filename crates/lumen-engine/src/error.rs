use thiserror::Error;

use crate::resource::{ResourceId, ResourceState};
use crate::space::SpaceId;

/// Errors returned by the engine.
///
/// Three classes share this type:
/// - initialization / backend failures (`Backend`, `OutOfMemory`)
/// - contract violations by the caller (most other variants)
/// - stale handles to objects that were already destroyed
///
/// Readiness gaps are never errors; callers check [`crate::device::Device::is_ready`].
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("backend failure during {op}: {reason}")]
    Backend { op: &'static str, reason: String },

    #[error("out of GPU memory allocating {what} ({bytes} bytes)")]
    OutOfMemory { what: String, bytes: u64 },

    #[error("invalid descriptor: {0}")]
    InvalidDescriptor(String),

    #[error("descriptor heap exhausted (capacity {capacity})")]
    DescriptorHeapExhausted { capacity: u32 },

    #[error("stale or unknown handle: {0}")]
    StaleHandle(String),

    #[error("no frame is being recorded; call begin_frame first")]
    NoFrameInFlight,

    #[error("a frame is already being recorded; call end_frame first")]
    FrameInProgress,

    #[error("context was reset in frame {recorded}, current frame is {current}")]
    StaleContext { recorded: u64, current: u64 },

    #[error("barrier for {resource:?} is pending; call flush_barriers first")]
    UnflushedBarrier { resource: ResourceId },

    #[error("{resource:?} is in state {actual:?}, operation requires {expected:?}")]
    InvalidState {
        resource: ResourceId,
        expected: ResourceState,
        actual: ResourceState,
    },

    #[error("no pipeline bound")]
    NoPipelineBound,

    #[error("viewport and scissor must be set before drawing")]
    ViewportNotSet,

    #[error("resource space {space:?} declared by the pipeline is not bound")]
    SpaceNotBound { space: SpaceId },

    #[error("resource space {space:?} does not match the pipeline layout")]
    LayoutMismatch { space: SpaceId },

    #[error("render targets do not match the pipeline: {0}")]
    FormatMismatch(String),

    #[error("resource space is locked; its slot layout cannot change")]
    SpaceLocked,

    #[error("{resource:?} has an upload queued this frame")]
    PendingUpload { resource: ResourceId },

    #[error("{resource:?} is referenced by GPU work at marker {fence} (completed {completed})")]
    ResourceInFlight {
        resource: ResourceId,
        fence: u64,
        completed: u64,
    },

    #[error("invalid upload: {0}")]
    InvalidUpload(String),

    /// The swap chain had no image this time (timeout, occluded window).
    /// Nothing was opened; the next `begin_frame` may succeed.
    #[error("frame skipped: {reason}")]
    FrameSkipped { reason: String },

    /// An earlier backend failure left the GPU timeline in an unknown state.
    #[error("device lost after {op} failed: {reason}")]
    DeviceLost { op: &'static str, reason: String },
}

impl EngineError {
    pub(crate) fn backend(op: &'static str, reason: impl ToString) -> Self {
        Self::Backend {
            op,
            reason: reason.to_string(),
        }
    }

    /// True for errors that leave the device unusable (device-lost class).
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Backend { .. } | Self::OutOfMemory { .. } | Self::DeviceLost { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
