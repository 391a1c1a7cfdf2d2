//! Upload queue.
//!
//! Content for device-local resources is queued here with owned bytes and
//! drained by `Device::end_frame` into a dedicated command list that runs
//! ahead of the frame's context work:
//!
//! 1. one barrier batch moving every target into `CopyDest`
//! 2. the copies, in issue order (a later upload to the same target wins)
//! 3. one barrier batch moving every target to its resting state
//!
//! Each target is then `Readiness::Pending` on the submission's completion
//! marker and becomes ready once the device observes that marker.

use std::collections::HashSet;

use crate::ResourceBarrier;
use crate::command::{Command, CommandList};
use crate::error::{EngineError, Result};
use crate::resource::{
    AccessPattern, BufferHandle, Readiness, ResourceId, ResourceState, ResourceTable,
    TextureHandle,
};

/// Replaces the whole content (or a prefix) of a device-local buffer.
#[derive(Debug, Clone)]
pub struct BufferUpload {
    pub buffer: BufferHandle,
    pub data: Vec<u8>,
}

/// Replaces the full content of a sampled texture. `data` is tightly packed.
#[derive(Debug, Clone)]
pub struct TextureUpload {
    pub texture: TextureHandle,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone)]
pub enum UploadRequest {
    Buffer(BufferUpload),
    Texture(TextureUpload),
}

impl UploadRequest {
    pub fn target(&self) -> ResourceId {
        match self {
            UploadRequest::Buffer(u) => u.buffer.id(),
            UploadRequest::Texture(u) => u.texture.id(),
        }
    }
}

#[derive(Debug, Default)]
pub struct UploadQueue {
    requests: Vec<UploadRequest>,
}

pub(crate) struct DrainedUploads {
    pub list: CommandList,
    pub targets: Vec<ResourceId>,
}

impl UploadQueue {
    #[inline]
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    pub fn requests(&self) -> &[UploadRequest] {
        &self.requests
    }

    pub(crate) fn drain(&mut self, resources: &mut ResourceTable, fence: u64) -> Option<DrainedUploads> {
        let requests: Vec<UploadRequest> = self
            .requests
            .drain(..)
            .filter(|r| {
                let live = resources.contains_key(r.target());
                if !live {
                    log::warn!("dropping upload to destroyed resource {:?}", r.target());
                }
                live
            })
            .collect();

        if requests.is_empty() {
            return None;
        }

        let mut targets: Vec<ResourceId> = Vec::new();
        for r in &requests {
            if !targets.contains(&r.target()) {
                targets.push(r.target());
            }
        }

        let mut list = CommandList::new("upload");

        let into_copy: Vec<ResourceBarrier> = targets
            .iter()
            .filter_map(|&id| {
                let state = resources.get(id)?.state;
                (state != ResourceState::CopyDest)
                    .then(|| ResourceBarrier::new(id, state, ResourceState::CopyDest))
            })
            .collect();
        if !into_copy.is_empty() {
            list.push(Command::Barriers(into_copy));
        }

        for request in requests {
            match request {
                UploadRequest::Buffer(u) => list.push(Command::CopyToBuffer {
                    dst: u.buffer,
                    offset: 0,
                    data: u.data,
                }),
                UploadRequest::Texture(u) => {
                    let Some(desc) = resources.get(u.texture.id()).and_then(|r| r.as_texture()) else {
                        continue;
                    };
                    list.push(Command::CopyToTexture {
                        dst: u.texture,
                        width: desc.width,
                        height: desc.height,
                        bytes_per_row: desc.bytes_per_row(),
                        data: u.data,
                    });
                }
            }
        }

        let mut out_of_copy = Vec::with_capacity(targets.len());
        for &id in &targets {
            let Some(r) = resources.get_mut(id) else { continue };
            let rest = r.resting_state();
            out_of_copy.push(ResourceBarrier::new(id, ResourceState::CopyDest, rest));
            r.state = rest;
            r.readiness = Readiness::Pending { fence };
        }
        list.push(Command::Barriers(out_of_copy));

        log::debug!(
            "drained uploads for {} resource(s) into marker {fence}",
            targets.len()
        );
        Some(DrainedUploads { list, targets })
    }
}

/// Upload handle for the frame being recorded.
///
/// Requests are validated against the resource table when added.
pub struct UploadContext<'a> {
    pub(crate) resources: &'a mut ResourceTable,
    pub(crate) touched: &'a HashSet<ResourceId>,
    pub(crate) queue: &'a mut UploadQueue,
}

impl UploadContext<'_> {
    pub fn add_buffer_upload(&mut self, upload: BufferUpload) -> Result<()> {
        let id = upload.buffer.id();
        self.check_untouched(id)?;
        let resource = self
            .resources
            .get_mut(id)
            .ok_or_else(|| EngineError::StaleHandle(format!("buffer {id:?}")))?;
        let desc = resource
            .as_buffer()
            .ok_or_else(|| EngineError::InvalidUpload(format!("{id:?} is not a buffer")))?;

        if resource.access == AccessPattern::HostWritable {
            return Err(EngineError::InvalidUpload(format!(
                "buffer '{}' is host-writable; write it with set_mapped_data",
                desc.debug_name
            )));
        }
        if upload.data.is_empty() || upload.data.len() as u64 > desc.size {
            return Err(EngineError::InvalidUpload(format!(
                "{} bytes do not fit buffer '{}' of {} bytes",
                upload.data.len(),
                desc.debug_name,
                desc.size
            )));
        }

        resource.readiness = Readiness::Queued;
        self.queue.requests.push(UploadRequest::Buffer(upload));
        Ok(())
    }

    pub fn add_texture_upload(&mut self, upload: TextureUpload) -> Result<()> {
        let id = upload.texture.id();
        self.check_untouched(id)?;
        let resource = self
            .resources
            .get_mut(id)
            .ok_or_else(|| EngineError::StaleHandle(format!("texture {id:?}")))?;
        let desc = resource
            .as_texture()
            .ok_or_else(|| EngineError::InvalidUpload(format!("{id:?} is not a texture")))?;

        if desc.is_gpu_produced() {
            return Err(EngineError::InvalidUpload(format!(
                "texture '{}' is a render or depth target",
                desc.debug_name
            )));
        }
        if upload.data.len() as u64 != desc.byte_size() {
            return Err(EngineError::InvalidUpload(format!(
                "texture '{}' expects {} bytes, got {}",
                desc.debug_name,
                desc.byte_size(),
                upload.data.len()
            )));
        }

        resource.readiness = Readiness::Queued;
        self.queue.requests.push(UploadRequest::Texture(upload));
        Ok(())
    }

    /// Queued requests so far, including those from earlier calls this frame.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    fn check_untouched(&self, id: ResourceId) -> Result<()> {
        // Copies execute ahead of this frame's context lists.
        if self.touched.contains(&id) {
            return Err(EngineError::InvalidUpload(format!(
                "{id:?} is used by context work submitted this frame"
            )));
        }
        Ok(())
    }
}
