//! Device and frame scheduler.
//!
//! The device owns every GPU object behind a handle and drives the frame
//! cycle:
//!
//! `begin_frame` -> record with a `GraphicsContext` -> `submit_context_work`
//! -> `end_frame` -> `present`
//!
//! Frames rotate through `frames_in_flight` slots. `begin_frame` waits for the
//! slot's previous completion marker before anything is recorded into it;
//! this is the only blocking call in the steady state. Completion processing
//! (readiness flips and deferred releases) happens right after that wait.

mod config;
mod retire;

pub use config::DeviceConfig;

use std::collections::HashSet;

use slotmap::SlotMap;

use crate::backend::{Backend, BackendObject};
use crate::command::CommandList;
use crate::context::GraphicsContext;
use crate::coords::Extent;
use crate::descriptor::{DescriptorHeap, DescriptorIndex};
use crate::error::{EngineError, Result};
use crate::frame::FrameSlot;
use crate::pipeline::{
    GraphicsPipelineDesc, PipelineHandle, PipelineStateObject, Shader, ShaderDesc, ShaderHandle,
    ShaderStage,
};
use crate::resource::{
    AccessPattern, BufferDesc, BufferHandle, Format, GpuResource, Readiness, ResourceId,
    ResourceKind, ResourceState, ResourceTable, TextureDesc, TextureHandle, TextureViews,
};
use crate::space::PipelineResourceLayout;
use crate::upload::{TextureUpload, UploadContext, UploadQueue};

use retire::RetirementQueue;

pub struct Device<B: Backend> {
    config: DeviceConfig,
    backend: B,

    resources: ResourceTable,
    shaders: SlotMap<ShaderHandle, Shader>,
    pipelines: SlotMap<PipelineHandle, PipelineStateObject>,
    descriptors: DescriptorHeap,

    slots: Vec<FrameSlot>,
    frame_index: usize,
    /// Incremented by every `begin_frame`; contexts remember the frame they were reset in.
    frame_number: u64,
    recording: bool,
    presentable: bool,

    back_buffers: Vec<TextureHandle>,
    back_buffer_index: usize,
    back_buffer_format: Format,
    screen_size: Extent,

    uploads: UploadQueue,
    in_flight_uploads: Vec<(ResourceId, u64)>,
    retirement: RetirementQueue,
    pending_lists: Vec<CommandList>,
    /// Resources referenced by context work submitted in the open frame.
    touched: HashSet<ResourceId>,

    last_signalled: u64,
    /// Set when a submission fails; the frame cycle refuses to continue.
    lost: Option<(&'static str, String)>,
}

impl<B: Backend> Device<B> {
    pub fn new(config: DeviceConfig, backend: B) -> Result<Self> {
        config.validate()?;

        let descriptors =
            DescriptorHeap::new(config.descriptor_capacity, config.reserved_descriptors)?;
        let slots = (0..config.frames_in_flight).map(|_| FrameSlot::new()).collect();

        let mut device = Self {
            // Starts on the last slot so the first begin_frame lands on slot 0.
            frame_index: config.frames_in_flight - 1,
            back_buffer_format: config.back_buffer_format,
            screen_size: config.screen_size,
            config,
            backend,
            resources: ResourceTable::with_key(),
            shaders: SlotMap::with_key(),
            pipelines: SlotMap::with_key(),
            descriptors,
            slots,
            frame_number: 0,
            recording: false,
            presentable: false,
            back_buffers: Vec::new(),
            back_buffer_index: 0,
            uploads: UploadQueue::default(),
            in_flight_uploads: Vec::new(),
            retirement: RetirementQueue::default(),
            pending_lists: Vec::new(),
            touched: HashSet::new(),
            last_signalled: 0,
            lost: None,
        };

        device.create_back_buffers(device.screen_size)?;

        log::info!(
            "device ready: backend={} frames_in_flight={} back_buffers={} format={:?} size={}x{}",
            device.backend.name(),
            device.config.frames_in_flight,
            device.config.back_buffer_count,
            device.back_buffer_format,
            device.screen_size.width,
            device.screen_size.height,
        );
        Ok(device)
    }

    fn create_back_buffers(&mut self, size: Extent) -> Result<()> {
        let requested = self.config.back_buffer_format;
        let ids: Vec<ResourceId> = (0..self.config.back_buffer_count)
            .map(|i| {
                let desc = TextureDesc::new(size.width, size.height, requested, TextureViews::RTV)
                    .named(format!("back buffer {i}"));
                self.resources.insert(GpuResource::back_buffer(desc))
            })
            .collect();

        let format = match self.backend.configure_swapchain(&ids, size, requested) {
            Ok(f) => f,
            Err(e) => {
                for id in ids {
                    self.resources.remove(id);
                }
                return Err(e);
            }
        };

        if format != requested {
            log::info!("swap chain uses {format:?} instead of {requested:?}");
        }
        for &id in &ids {
            if let Some(ResourceKind::Texture(desc)) =
                self.resources.get_mut(id).map(|r| &mut r.kind)
            {
                desc.format = format;
            }
        }

        self.back_buffers = ids.into_iter().map(TextureHandle).collect();
        self.back_buffer_index = 0;
        self.back_buffer_format = format;
        self.screen_size = size;
        Ok(())
    }

    // ── frame cycle ───────────────────────────────────────────────────────

    fn ensure_alive(&self) -> Result<()> {
        match &self.lost {
            Some((op, reason)) => Err(EngineError::DeviceLost {
                op: *op,
                reason: reason.clone(),
            }),
            None => Ok(()),
        }
    }

    /// Whether an earlier submission failure made the device unusable.
    pub fn is_lost(&self) -> bool {
        self.lost.is_some()
    }

    /// Opens the next frame slot, waiting for its previous GPU work if needed.
    ///
    /// Returns `EngineError::FrameSkipped` without opening a frame when the
    /// swap chain has no image to give.
    pub fn begin_frame(&mut self) -> Result<()> {
        self.ensure_alive()?;
        if self.recording {
            return Err(EngineError::FrameInProgress);
        }

        let next = (self.frame_index + 1) % self.slots.len();
        let back_buffer = self.current_back_buffer().id();
        let back_buffer_fence = self
            .resources
            .get(back_buffer)
            .map_or(0, |r| r.last_used_fence);

        let wait = self.slots[next].fence_value.max(back_buffer_fence);
        let completed = self.backend.completed_value();
        if wait > completed {
            log::trace!("slot {next}: waiting for marker {wait} (completed {completed})");
            self.backend.wait_for_value(wait)?;
        }

        self.process_completions();
        self.backend.acquire_back_buffer(back_buffer)?;

        self.frame_index = next;
        self.slots[next].begin();
        self.frame_number += 1;
        self.recording = true;
        Ok(())
    }

    /// Queues a context's recorded work for this frame's submission and
    /// commits the resource states it leaves behind.
    pub fn submit_context_work(&mut self, ctx: &mut GraphicsContext) -> Result<()> {
        self.ensure_alive()?;
        if !self.recording {
            return Err(EngineError::NoFrameInFlight);
        }
        match ctx.frame() {
            None => return Err(EngineError::NoFrameInFlight),
            Some(f) if f != self.frame_number => {
                return Err(EngineError::StaleContext {
                    recorded: f,
                    current: self.frame_number,
                });
            }
            Some(_) => {}
        }
        if let Some(b) = ctx.pending_barriers().first() {
            return Err(EngineError::UnflushedBarrier {
                resource: b.resource,
            });
        }

        // Another context may have moved a resource since this one observed it.
        for (&id, &expected) in ctx.initial_states() {
            let r = self.resource(id)?;
            if r.readiness == Readiness::Queued {
                return Err(EngineError::PendingUpload { resource: id });
            }
            if r.state != expected {
                return Err(EngineError::InvalidState {
                    resource: id,
                    expected,
                    actual: r.state,
                });
            }
        }
        let referenced = ctx.command_list().referenced_resources();
        if let Some(&id) = referenced.iter().find(|&&id| !self.resources.contains_key(id)) {
            return Err(EngineError::StaleHandle(format!("{id:?}")));
        }

        let (list, ledger) = ctx.finish();
        for (id, state) in ledger {
            if let Some(r) = self.resources.get_mut(id) {
                r.state = state;
            }
        }
        self.touched.extend(referenced);
        log::trace!("queued '{}' with {} command(s)", list.label(), list.len());
        self.pending_lists.push(list);
        Ok(())
    }

    /// Drains the upload queue, submits the frame's work and signals the
    /// next completion marker.
    ///
    /// A failed submission loses the device: every later frame call returns
    /// `EngineError::DeviceLost` and the uploads it carried never become ready.
    pub fn end_frame(&mut self) -> Result<()> {
        self.ensure_alive()?;
        if !self.recording {
            return Err(EngineError::NoFrameInFlight);
        }

        let fence = self.last_signalled + 1;
        let mut lists = Vec::with_capacity(self.pending_lists.len() + 1);

        let upload_targets = match self.uploads.drain(&mut self.resources, fence) {
            Some(drained) => {
                lists.push(drained.list);
                drained.targets
            }
            None => Vec::new(),
        };
        lists.append(&mut self.pending_lists);

        if let Err(e) = self.backend.submit(&lists, fence) {
            log::error!("submission of marker {fence} failed, device lost: {e}");
            self.lost = Some(("submit", e.to_string()));
            return Err(e);
        }

        self.in_flight_uploads
            .extend(upload_targets.into_iter().map(|id| (id, fence)));
        for list in &lists {
            for id in list.referenced_resources() {
                if let Some(r) = self.resources.get_mut(id) {
                    r.last_used_fence = fence;
                }
            }
        }

        self.slots[self.frame_index].submit(fence);
        self.last_signalled = fence;
        self.recording = false;
        self.presentable = true;
        self.touched.clear();

        log::debug!(
            "frame {} (slot {}) submitted: {} list(s), marker {fence}",
            self.frame_number,
            self.frame_index,
            lists.len()
        );
        Ok(())
    }

    /// Presents the current back buffer and advances to the next one.
    pub fn present(&mut self) -> Result<()> {
        self.ensure_alive()?;
        if self.recording {
            return Err(EngineError::FrameInProgress);
        }
        if !self.presentable {
            return Err(EngineError::NoFrameInFlight);
        }

        let id = self.current_back_buffer().id();
        let state = self.resource(id)?.state;
        if state != ResourceState::Present {
            return Err(EngineError::InvalidState {
                resource: id,
                expected: ResourceState::Present,
                actual: state,
            });
        }

        self.backend.present(id)?;
        self.back_buffer_index = (self.back_buffer_index + 1) % self.back_buffers.len();
        self.presentable = false;
        Ok(())
    }

    /// Blocks until all submitted work completes, then runs completion processing.
    pub fn wait_for_idle(&mut self) -> Result<()> {
        if self.last_signalled > self.backend.completed_value() {
            self.backend.wait_for_value(self.last_signalled)?;
        }
        self.process_completions();
        Ok(())
    }

    /// Recreates the back buffers at `size`. Zero-sized requests (minimized
    /// windows) are ignored. On failure the previous back buffers stay in use.
    pub fn resize(&mut self, size: Extent) -> Result<()> {
        self.ensure_alive()?;
        if self.recording {
            return Err(EngineError::FrameInProgress);
        }
        if size.is_empty() {
            log::debug!("ignoring resize to {}x{}", size.width, size.height);
            return Ok(());
        }
        if size == self.screen_size {
            return Ok(());
        }

        self.wait_for_idle()?;
        let previous = std::mem::take(&mut self.back_buffers);
        if let Err(e) = self.create_back_buffers(size) {
            log::warn!("resize to {}x{} failed, keeping the old swap chain: {e}", size.width, size.height);
            self.back_buffers = previous;
            return Err(e);
        }
        for handle in previous {
            self.resources.remove(handle.id());
            self.backend.release(BackendObject::Resource(handle.id()));
        }
        self.presentable = false;

        log::debug!("resized back buffers to {}x{}", size.width, size.height);
        Ok(())
    }

    fn process_completions(&mut self) {
        let completed = self.backend.completed_value();

        let resources = &mut self.resources;
        self.in_flight_uploads.retain(|&(id, fence)| {
            if fence > completed {
                return true;
            }
            if let Some(r) = resources.get_mut(id) {
                if r.readiness == (Readiness::Pending { fence }) {
                    r.readiness = Readiness::Ready;
                    log::debug!("{id:?} ready (marker {fence})");
                }
            }
            false
        });

        for retired in self.retirement.drain_completed(completed) {
            self.backend.release(retired.object);
            if let Some(index) = retired.descriptor {
                self.descriptors.free(index);
            }
        }

        for slot in &mut self.slots {
            slot.observe(completed);
        }
    }

    // ── creation ──────────────────────────────────────────────────────────

    pub fn create_buffer(&mut self, desc: &BufferDesc) -> Result<BufferHandle> {
        desc.validate()?;
        let index = if desc.views.is_shader_visible() {
            Some(self.descriptors.allocate()?)
        } else {
            None
        };

        let resource = GpuResource::buffer(desc.clone(), index);
        let initial = resource.state;
        let id = self.resources.insert(resource);

        if let Err(e) = self.backend.create_buffer(id, desc, initial) {
            self.discard(id, index);
            return Err(e);
        }

        log::debug!(
            "created buffer '{}' ({} bytes, {:?}, descriptor {:?})",
            desc.debug_name,
            desc.allocation_size(),
            desc.access,
            index.map(|i| i.get())
        );
        Ok(BufferHandle(id))
    }

    pub fn create_texture(&mut self, desc: &TextureDesc) -> Result<TextureHandle> {
        desc.validate()?;
        let index = if desc.views.srv {
            Some(self.descriptors.allocate()?)
        } else {
            None
        };

        let resource = GpuResource::texture(desc.clone(), index);
        let initial = resource.state;
        let id = self.resources.insert(resource);

        if let Err(e) = self.backend.create_texture(id, desc, initial) {
            self.discard(id, index);
            return Err(e);
        }

        log::debug!(
            "created texture '{}' ({}x{} {:?}, descriptor {:?})",
            desc.debug_name,
            desc.width,
            desc.height,
            desc.format,
            index.map(|i| i.get())
        );
        Ok(TextureHandle(id))
    }

    /// Creates a sampled texture and queues `data` as its initial content.
    pub fn create_texture_with_data(&mut self, desc: &TextureDesc, data: Vec<u8>) -> Result<TextureHandle> {
        let texture = self.create_texture(desc)?;
        let queued = self
            .upload_context_for_current_frame()
            .add_texture_upload(TextureUpload { texture, data });
        if let Err(e) = queued {
            self.destroy_texture(texture)?;
            return Err(e);
        }
        Ok(texture)
    }

    fn discard(&mut self, id: ResourceId, index: Option<DescriptorIndex>) {
        self.resources.remove(id);
        if let Some(i) = index {
            self.descriptors.free(i);
        }
    }

    pub fn create_shader(&mut self, desc: &ShaderDesc) -> Result<ShaderHandle> {
        let bytecode = self.backend.compile_shader(desc)?;
        log::debug!(
            "loaded shader {}:{} ({:?}, {} bytes)",
            desc.source_name,
            desc.entry_point,
            desc.stage,
            bytecode.len()
        );
        Ok(self.shaders.insert(Shader {
            desc: desc.clone(),
            bytecode,
        }))
    }

    pub fn create_graphics_pipeline(
        &mut self,
        desc: &GraphicsPipelineDesc,
        layout: &PipelineResourceLayout,
    ) -> Result<PipelineHandle> {
        desc.validate()?;

        self.shader_for(desc.vertex_shader, ShaderStage::Vertex)?;
        self.shader_for(desc.pixel_shader, ShaderStage::Pixel)?;

        let handle = self.pipelines.insert(PipelineStateObject {
            desc: desc.clone(),
            layout: layout.clone(),
        });

        let created = match (
            self.pipelines.get(handle),
            self.shaders.get(desc.vertex_shader),
            self.shaders.get(desc.pixel_shader),
        ) {
            (Some(pso), Some(vertex), Some(pixel)) => {
                self.backend.create_pipeline(handle, pso, vertex, pixel)
            }
            _ => Err(EngineError::StaleHandle(format!("{handle:?}"))),
        };
        if let Err(e) = created {
            self.pipelines.remove(handle);
            return Err(e);
        }

        log::debug!(
            "created pipeline '{}' ({} space(s))",
            desc.debug_name,
            layout.declared().count()
        );
        Ok(handle)
    }

    fn shader_for(&self, handle: ShaderHandle, stage: ShaderStage) -> Result<&Shader> {
        let shader = self.shader(handle)?;
        if shader.desc.stage != stage {
            return Err(EngineError::InvalidDescriptor(format!(
                "shader {}:{} is a {:?} shader, expected {stage:?}",
                shader.desc.source_name, shader.desc.entry_point, shader.desc.stage
            )));
        }
        Ok(shader)
    }

    pub fn create_graphics_context(&self) -> GraphicsContext {
        GraphicsContext::new()
    }

    // ── destruction ───────────────────────────────────────────────────────

    /// Marker after which nothing recorded so far can reference an object.
    fn retire_marker(&self) -> u64 {
        if self.recording {
            self.last_signalled + 1
        } else {
            self.last_signalled
        }
    }

    pub fn destroy_buffer(&mut self, buffer: BufferHandle) -> Result<()> {
        self.destroy_resource(buffer.id())
    }

    pub fn destroy_texture(&mut self, texture: TextureHandle) -> Result<()> {
        self.destroy_resource(texture.id())
    }

    fn destroy_resource(&mut self, id: ResourceId) -> Result<()> {
        if self.resource(id)?.back_buffer {
            return Err(EngineError::InvalidDescriptor(
                "back buffers belong to the swap chain".to_string(),
            ));
        }
        let marker = self.retire_marker();
        let Some(r) = self.resources.remove(id) else {
            return Err(EngineError::StaleHandle(format!("{id:?}")));
        };
        self.retirement.push(
            marker.max(r.last_used_fence),
            BackendObject::Resource(id),
            r.bindless_index,
        );
        Ok(())
    }

    pub fn destroy_shader(&mut self, shader: ShaderHandle) -> Result<()> {
        self.shaders
            .remove(shader)
            .ok_or_else(|| EngineError::StaleHandle(format!("{shader:?}")))?;
        let marker = self.retire_marker();
        self.retirement.push(marker, BackendObject::Shader(shader), None);
        Ok(())
    }

    pub fn destroy_pipeline(&mut self, pipeline: PipelineHandle) -> Result<()> {
        self.pipelines
            .remove(pipeline)
            .ok_or_else(|| EngineError::StaleHandle(format!("{pipeline:?}")))?;
        let marker = self.retire_marker();
        self.retirement.push(marker, BackendObject::Pipeline(pipeline), None);
        Ok(())
    }

    // ── host access ───────────────────────────────────────────────────────

    /// Upload handle for the frame being recorded (or the next one, when
    /// called between frames).
    pub fn upload_context_for_current_frame(&mut self) -> UploadContext<'_> {
        UploadContext {
            resources: &mut self.resources,
            touched: &self.touched,
            queue: &mut self.uploads,
        }
    }

    /// Writes `data` at the start of a host-writable buffer.
    ///
    /// Rejected while a submission that referenced the buffer is still
    /// executing; per-frame data belongs in a [`crate::frame::FrameLocal`].
    pub fn set_mapped_data(&mut self, buffer: BufferHandle, data: &[u8]) -> Result<()> {
        let id = buffer.id();
        let (size, last_used) = {
            let r = self.host_writable(id)?;
            (r.as_buffer().map_or(0, |d| d.size), r.last_used_fence)
        };

        if data.len() as u64 > size {
            return Err(EngineError::InvalidUpload(format!(
                "{} bytes exceed mapped buffer of {size} bytes",
                data.len()
            )));
        }

        let completed = self.backend.completed_value();
        if last_used > completed {
            return Err(EngineError::ResourceInFlight {
                resource: id,
                fence: last_used,
                completed,
            });
        }

        self.backend.write_mapped(id, 0, data)
    }

    /// Current CPU-visible content of a host-writable buffer.
    pub fn mapped_data(&self, buffer: BufferHandle) -> Result<Vec<u8>> {
        self.host_writable(buffer.id())?;
        self.backend.read_mapped(buffer.id())
    }

    fn host_writable(&self, id: ResourceId) -> Result<&GpuResource> {
        let r = self.resource(id)?;
        if r.as_buffer().is_none() || r.access != AccessPattern::HostWritable {
            return Err(EngineError::InvalidUpload(format!(
                "{id:?} is not a host-writable buffer"
            )));
        }
        Ok(r)
    }

    // ── queries ───────────────────────────────────────────────────────────

    pub fn resource(&self, id: impl Into<ResourceId>) -> Result<&GpuResource> {
        let id = id.into();
        self.resources
            .get(id)
            .ok_or_else(|| EngineError::StaleHandle(format!("{id:?}")))
    }

    pub fn shader(&self, handle: ShaderHandle) -> Result<&Shader> {
        self.shaders
            .get(handle)
            .ok_or_else(|| EngineError::StaleHandle(format!("{handle:?}")))
    }

    pub fn pipeline(&self, handle: PipelineHandle) -> Result<&PipelineStateObject> {
        self.pipelines
            .get(handle)
            .ok_or_else(|| EngineError::StaleHandle(format!("{handle:?}")))
    }

    /// True once the resource's content is safe to consume. Unknown handles are never ready.
    pub fn is_ready(&self, id: impl Into<ResourceId>) -> bool {
        self.resources.get(id.into()).is_some_and(|r| r.is_ready())
    }

    /// Bindless index of a resource's shader-visible view.
    pub fn descriptor_index(&self, id: impl Into<ResourceId>) -> Result<Option<DescriptorIndex>> {
        Ok(self.resource(id)?.bindless_index)
    }

    /// One of the descriptor slots set aside for collaborators.
    pub fn reserved_descriptor(&self, i: u32) -> Option<DescriptorIndex> {
        self.descriptors.reserved(i)
    }

    pub fn descriptor_heap(&self) -> &DescriptorHeap {
        &self.descriptors
    }

    /// Back buffer the next frame renders into. The set is never empty:
    /// construction fails without one and a failed resize keeps the old set.
    pub fn current_back_buffer(&self) -> TextureHandle {
        self.back_buffers[self.back_buffer_index]
    }

    pub fn back_buffer_format(&self) -> Format {
        self.back_buffer_format
    }

    pub fn screen_size(&self) -> Extent {
        self.screen_size
    }

    /// Index of the current frame slot, in `0..frames_in_flight`.
    pub fn frame_index(&self) -> usize {
        self.frame_index
    }

    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    pub fn frames_in_flight(&self) -> usize {
        self.slots.len()
    }

    pub fn slot(&self, index: usize) -> Option<&FrameSlot> {
        self.slots.get(index)
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    pub fn last_signalled(&self) -> u64 {
        self.last_signalled
    }

    pub fn completed_value(&mut self) -> u64 {
        self.backend.completed_value()
    }

    /// Objects destroyed but not yet released.
    pub fn retired_count(&self) -> usize {
        self.retirement.len()
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }
}

impl<B: Backend> Drop for Device<B> {
    fn drop(&mut self) {
        if let Err(e) = self.wait_for_idle() {
            log::warn!("device teardown without idle GPU: {e}");
        }

        for retired in self.retirement.drain_all() {
            self.backend.release(retired.object);
        }
        for id in self.resources.keys() {
            self.backend.release(BackendObject::Resource(id));
        }
        for handle in self.pipelines.keys() {
            self.backend.release(BackendObject::Pipeline(handle));
        }
        for handle in self.shaders.keys() {
            self.backend.release(BackendObject::Shader(handle));
        }
        log::debug!("device released");
    }
}
