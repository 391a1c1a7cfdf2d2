//! Graphics context: records one frame's commands into a command list.
//!
//! The context validates as it records. Resource states are read from the
//! device the first time a resource is touched and tracked locally after
//! that; `Device::submit_context_work` checks those first observations are
//! still current and commits the final states.

use std::collections::HashMap;
use std::mem;

use crate::ResourceBarrier;
use crate::backend::Backend;
use crate::command::{Command, CommandList};
use crate::coords::{Color, Extent, ScissorRect, Viewport};
use crate::device::Device;
use crate::error::{EngineError, Result};
use crate::pipeline::{MAX_RENDER_TARGETS, PipelineHandle, PipelineInfo, PrimitiveTopology};
use crate::resource::{Format, Readiness, ResourceId, ResourceState, TextureHandle};
use crate::space::{PipelineResourceLayout, PipelineResourceSpace, SpaceId};

const LIST_LABEL: &str = "graphics";

pub struct GraphicsContext {
    list: CommandList,
    /// Device frame number this context was reset in; `None` when closed.
    frame: Option<u64>,

    /// State of each touched resource as first observed on the device.
    initial: HashMap<ResourceId, ResourceState>,
    /// State of each touched resource after the last flushed batch.
    ledger: HashMap<ResourceId, ResourceState>,
    pending: Vec<ResourceBarrier>,

    pipeline: Option<PipelineHandle>,
    layout: Option<PipelineResourceLayout>,
    pipeline_topology: PrimitiveTopology,
    render_targets: Vec<TextureHandle>,
    depth_target: Option<TextureHandle>,
    /// Resources bound per space, with the state each was bound in.
    bound: [Option<Vec<(ResourceId, ResourceState)>>; SpaceId::COUNT],
    viewport: Option<Viewport>,
    scissor: Option<ScissorRect>,
    topology: PrimitiveTopology,
}

impl Default for GraphicsContext {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphicsContext {
    pub fn new() -> Self {
        Self {
            list: CommandList::new(LIST_LABEL),
            frame: None,
            initial: HashMap::new(),
            ledger: HashMap::new(),
            pending: Vec::new(),
            pipeline: None,
            layout: None,
            pipeline_topology: PrimitiveTopology::TriangleList,
            render_targets: Vec::new(),
            depth_target: None,
            bound: Default::default(),
            viewport: None,
            scissor: None,
            topology: PrimitiveTopology::TriangleList,
        }
    }

    /// Starts recording for the device's open frame, discarding anything left over.
    pub fn reset<B: Backend>(&mut self, device: &Device<B>) -> Result<()> {
        if !device.is_recording() {
            return Err(EngineError::NoFrameInFlight);
        }
        *self = Self::new();
        self.frame = Some(device.frame_number());
        Ok(())
    }

    fn ensure_recording<B: Backend>(&self, device: &Device<B>) -> Result<()> {
        let Some(frame) = self.frame else {
            return Err(EngineError::NoFrameInFlight);
        };
        if !device.is_recording() || frame != device.frame_number() {
            return Err(EngineError::StaleContext {
                recorded: frame,
                current: device.frame_number(),
            });
        }
        Ok(())
    }

    fn ensure_open(&self) -> Result<()> {
        self.frame.map(|_| ()).ok_or(EngineError::NoFrameInFlight)
    }

    /// Flushed state of `id` as seen by this context.
    fn observe<B: Backend>(&mut self, device: &Device<B>, id: ResourceId) -> Result<ResourceState> {
        if let Some(&s) = self.ledger.get(&id) {
            return Ok(s);
        }
        let s = device.resource(id)?.state();
        self.initial.insert(id, s);
        self.ledger.insert(id, s);
        Ok(s)
    }

    fn check_flushed_state<B: Backend>(
        &mut self,
        device: &Device<B>,
        id: ResourceId,
        expected: ResourceState,
    ) -> Result<()> {
        if self.pending.iter().any(|b| b.resource == id) {
            return Err(EngineError::UnflushedBarrier { resource: id });
        }
        let actual = self.observe(device, id)?;
        if actual != expected {
            return Err(EngineError::InvalidState {
                resource: id,
                expected,
                actual,
            });
        }
        Ok(())
    }

    // ── barriers ──────────────────────────────────────────────────────────

    /// Adds a transition of `resource` into `state` to the pending batch.
    ///
    /// Transitions to the state the resource is already in are dropped.
    /// Nothing is recorded until [`flush_barriers`](Self::flush_barriers).
    pub fn add_barrier<B: Backend>(
        &mut self,
        device: &Device<B>,
        resource: impl Into<ResourceId>,
        state: ResourceState,
    ) -> Result<()> {
        self.ensure_recording(device)?;
        let id = resource.into();
        if device.resource(id)?.readiness() == Readiness::Queued {
            return Err(EngineError::PendingUpload { resource: id });
        }

        if let Some(pos) = self.pending.iter().position(|b| b.resource == id) {
            self.pending[pos].to = state;
            if self.pending[pos].is_redundant() {
                self.pending.remove(pos);
            }
            return Ok(());
        }

        let from = self.observe(device, id)?;
        if from == state {
            log::trace!("dropping redundant barrier for {id:?} ({state:?})");
            return Ok(());
        }
        self.pending.push(ResourceBarrier::new(id, from, state));
        Ok(())
    }

    /// Records every pending transition as one batch.
    pub fn flush_barriers(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let batch = mem::take(&mut self.pending);
        for b in &batch {
            self.ledger.insert(b.resource, b.to);
        }
        self.list.push(Command::Barriers(batch));
    }

    pub fn pending_barriers(&self) -> &[ResourceBarrier] {
        &self.pending
    }

    // ── clears ────────────────────────────────────────────────────────────

    pub fn clear_render_target<B: Backend>(
        &mut self,
        device: &Device<B>,
        target: TextureHandle,
        color: Color,
    ) -> Result<()> {
        self.ensure_recording(device)?;
        let id = target.id();
        let is_rtv = device
            .resource(id)?
            .as_texture()
            .is_some_and(|d| d.views.rtv);
        if !is_rtv {
            return Err(EngineError::InvalidDescriptor(format!(
                "{id:?} has no render target view"
            )));
        }
        self.check_flushed_state(device, id, ResourceState::RenderTarget)?;
        self.list.push(Command::ClearRenderTarget { target, color });
        Ok(())
    }

    pub fn clear_depth_stencil_target<B: Backend>(
        &mut self,
        device: &Device<B>,
        target: TextureHandle,
        depth: f32,
        stencil: u8,
    ) -> Result<()> {
        self.ensure_recording(device)?;
        let id = target.id();
        let is_dsv = device
            .resource(id)?
            .as_texture()
            .is_some_and(|d| d.views.dsv);
        if !is_dsv {
            return Err(EngineError::InvalidDescriptor(format!(
                "{id:?} has no depth-stencil view"
            )));
        }
        if !(0.0..=1.0).contains(&depth) {
            return Err(EngineError::InvalidDescriptor(format!(
                "clear depth {depth} outside [0, 1]"
            )));
        }
        self.check_flushed_state(device, id, ResourceState::DepthWrite)?;
        self.list.push(Command::ClearDepthStencil {
            target,
            depth,
            stencil,
        });
        Ok(())
    }

    // ── pipeline and bindings ─────────────────────────────────────────────

    /// Binds a pipeline and its render targets. Resets all space bindings.
    pub fn set_pipeline<B: Backend>(&mut self, device: &Device<B>, info: &PipelineInfo) -> Result<()> {
        self.ensure_recording(device)?;
        if info.render_targets.len() > MAX_RENDER_TARGETS {
            return Err(EngineError::InvalidDescriptor(format!(
                "{} render targets exceed the limit of {MAX_RENDER_TARGETS}",
                info.render_targets.len()
            )));
        }

        let mut formats: Vec<Format> = Vec::with_capacity(info.render_targets.len());
        for &t in &info.render_targets {
            self.check_flushed_state(device, t.id(), ResourceState::RenderTarget)?;
            formats.extend(device.resource(t)?.as_texture().map(|d| d.format));
        }
        let depth_format = match info.depth_stencil_target {
            Some(d) => {
                self.check_flushed_state(device, d.id(), ResourceState::DepthWrite)?;
                device.resource(d)?.as_texture().map(|d| d.format)
            }
            None => None,
        };

        match info.pipeline {
            Some(handle) => {
                let pso = device.pipeline(handle)?;
                if formats != pso.desc().render_target_formats {
                    return Err(EngineError::FormatMismatch(format!(
                        "render targets are {formats:?}, pipeline '{}' expects {:?}",
                        pso.desc().debug_name,
                        pso.desc().render_target_formats
                    )));
                }
                if depth_format != pso.desc().depth_format {
                    return Err(EngineError::FormatMismatch(format!(
                        "depth target is {depth_format:?}, pipeline '{}' expects {:?}",
                        pso.desc().debug_name,
                        pso.desc().depth_format
                    )));
                }
                self.layout = Some(pso.layout().clone());
                self.pipeline_topology = pso.desc().topology;
                self.topology = pso.desc().topology;
            }
            None => self.layout = None,
        }

        self.pipeline = info.pipeline;
        self.render_targets = info.render_targets.clone();
        self.depth_target = info.depth_stencil_target;
        self.bound = Default::default();

        self.list.push(Command::SetPipeline {
            pipeline: info.pipeline,
            render_targets: info.render_targets.clone(),
            depth_stencil: info.depth_stencil_target,
        });
        Ok(())
    }

    /// Binds a locked space at `space_id`. Its layout must equal the bound
    /// pipeline's declaration for that id.
    pub fn set_pipeline_resources<B: Backend>(
        &mut self,
        device: &Device<B>,
        space_id: SpaceId,
        space: &PipelineResourceSpace,
    ) -> Result<()> {
        self.ensure_recording(device)?;
        let declared = self
            .layout
            .as_ref()
            .ok_or(EngineError::NoPipelineBound)?
            .space(space_id);
        if declared != Some(space.layout()) {
            return Err(EngineError::LayoutMismatch { space: space_id });
        }

        let mut bound = Vec::with_capacity(space.bindings().len());
        for id in space.resources() {
            let expected = device.resource(id)?.shader_read_state();
            self.check_flushed_state(device, id, expected)?;
            bound.push((id, expected));
        }
        self.bound[space_id.index()] = Some(bound);

        self.list.push(Command::SetResources {
            space: space_id,
            bindings: space.bindings().to_vec(),
        });
        Ok(())
    }

    // ── fixed-function state ──────────────────────────────────────────────

    pub fn set_viewport(&mut self, viewport: Viewport) -> Result<()> {
        self.ensure_open()?;
        if !viewport.is_valid() {
            return Err(EngineError::InvalidDescriptor(format!(
                "invalid viewport {viewport:?}"
            )));
        }
        self.viewport = Some(viewport);
        self.list.push(Command::SetViewport(viewport));
        Ok(())
    }

    pub fn set_scissor(&mut self, scissor: ScissorRect) -> Result<()> {
        self.ensure_open()?;
        self.scissor = Some(scissor);
        self.list.push(Command::SetScissor(scissor));
        Ok(())
    }

    /// Viewport and scissor covering `size`.
    pub fn set_default_viewport_and_scissor(&mut self, size: Extent) -> Result<()> {
        self.set_viewport(Viewport::covering(size))?;
        self.set_scissor(ScissorRect::covering(size))
    }

    pub fn set_primitive_topology(&mut self, topology: PrimitiveTopology) -> Result<()> {
        self.ensure_open()?;
        self.topology = topology;
        self.list.push(Command::SetTopology(topology));
        Ok(())
    }

    // ── draws ─────────────────────────────────────────────────────────────

    pub fn draw<B: Backend>(&mut self, device: &Device<B>, vertex_count: u32) -> Result<()> {
        self.draw_instanced(device, vertex_count, 1)
    }

    pub fn draw_instanced<B: Backend>(
        &mut self,
        device: &Device<B>,
        vertex_count: u32,
        instance_count: u32,
    ) -> Result<()> {
        self.ensure_recording(device)?;

        let layout = self.layout.as_ref().ok_or(EngineError::NoPipelineBound)?;
        if self.viewport.is_none() || self.scissor.is_none() {
            return Err(EngineError::ViewportNotSet);
        }
        if let Some((space, _)) = layout
            .declared()
            .find(|(id, _)| self.bound[id.index()].is_none())
        {
            return Err(EngineError::SpaceNotBound { space });
        }
        if self.topology != self.pipeline_topology {
            return Err(EngineError::InvalidDescriptor(format!(
                "topology {:?} does not match the pipeline's {:?}",
                self.topology, self.pipeline_topology
            )));
        }

        let targets: Vec<(ResourceId, ResourceState)> = self
            .render_targets
            .iter()
            .map(|t| (t.id(), ResourceState::RenderTarget))
            .chain(
                self.depth_target
                    .map(|d| (d.id(), ResourceState::DepthWrite)),
            )
            .chain(self.bound.iter().flatten().flatten().copied())
            .collect();
        for (id, expected) in targets {
            device.resource(id)?;
            self.check_flushed_state(device, id, expected)?;
        }

        self.list.push(Command::Draw {
            vertex_count,
            instance_count,
        });
        Ok(())
    }

    // ── recording handle ──────────────────────────────────────────────────

    /// Raw access to the command list, for collaborators that record their
    /// own commands (a UI overlay) after `set_pipeline` with no pipeline.
    pub fn command_list_mut(&mut self) -> &mut CommandList {
        &mut self.list
    }

    pub fn command_list(&self) -> &CommandList {
        &self.list
    }

    pub fn is_recording(&self) -> bool {
        self.frame.is_some()
    }

    pub(crate) fn frame(&self) -> Option<u64> {
        self.frame
    }

    pub(crate) fn initial_states(&self) -> &HashMap<ResourceId, ResourceState> {
        &self.initial
    }

    /// Closes the context, handing over its list and final resource states.
    pub(crate) fn finish(&mut self) -> (CommandList, HashMap<ResourceId, ResourceState>) {
        let list = mem::replace(&mut self.list, CommandList::new(LIST_LABEL));
        let ledger = mem::take(&mut self.ledger);
        *self = Self::new();
        (list, ledger)
    }
}
