//! Software GPU timeline.
//!
//! `SimBackend` executes command lists against its own copy of every
//! resource's state and memory. It re-validates each barrier and each
//! state-dependent command as it executes and records what it did, so tests
//! can assert on the GPU-side view of a frame.
//!
//! In [`SimMode::Immediate`] a submission executes inside `submit`. In
//! [`SimMode::Deferred`] submissions queue up and execute only when the
//! timeline is advanced explicitly or waited on, which makes frames in
//! flight observable.

use std::collections::{HashMap, VecDeque};

use super::{Backend, BackendObject};
use crate::command::{Command, CommandList};
use crate::coords::{Color, Extent};
use crate::error::{EngineError, Result};
use crate::pipeline::{PipelineHandle, PipelineStateObject, Shader, ShaderDesc};
use crate::resource::{AccessPattern, BufferDesc, Format, ResourceId, ResourceState, TextureDesc};
use crate::space::{PipelineResourceLayout, SpaceId};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum SimMode {
    #[default]
    Immediate,
    Deferred,
}

#[derive(Debug, Clone, Default)]
pub struct SimConfig {
    pub mode: SimMode,
    /// Allocation fails with `OutOfMemory` once this many bytes are live.
    pub memory_budget: Option<u64>,
    /// Format the swap chain reports regardless of the requested one.
    pub swapchain_format: Option<Format>,
}

/// A command as executed on the timeline.
#[derive(Debug, Clone, PartialEq)]
pub struct Executed {
    pub fence: u64,
    pub list: String,
    pub command: Command,
}

/// A draw as the timeline saw it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrawRecord {
    pub fence: u64,
    pub pipeline: PipelineHandle,
    pub vertex_count: u32,
    pub instance_count: u32,
    pub render_targets: Vec<ResourceId>,
    /// Resources bound through spaces, in space then slot order.
    pub resources: Vec<ResourceId>,
}

/// A contract violation detected during execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub fence: u64,
    pub message: String,
}

#[derive(Debug)]
struct SimResource {
    state: ResourceState,
    memory: Vec<u8>,
    size: usize,
    bytes: u64,
    host_visible: bool,
    last_clear: Option<Color>,
    last_depth_clear: Option<f32>,
}

#[derive(Debug)]
struct SimPipeline {
    layout: PipelineResourceLayout,
}

/// Binding state of one command list; lists do not inherit state.
#[derive(Default)]
struct ListState {
    pipeline: Option<PipelineHandle>,
    targets: Vec<ResourceId>,
    depth: Option<ResourceId>,
    spaces: [Option<Vec<ResourceId>>; SpaceId::COUNT],
    viewport: bool,
    scissor: bool,
}

#[derive(Debug, Default)]
pub struct SimBackend {
    config: SimConfig,
    resources: HashMap<ResourceId, SimResource>,
    pipelines: HashMap<PipelineHandle, SimPipeline>,
    back_buffers: Vec<ResourceId>,
    acquired: Option<ResourceId>,

    queue: VecDeque<(u64, Vec<CommandList>)>,
    submitted: u64,
    completed: u64,
    allocated: u64,

    log: Vec<Executed>,
    draws: Vec<DrawRecord>,
    violations: Vec<Violation>,
    presented: Vec<ResourceId>,
    waits: Vec<u64>,
    released: Vec<BackendObject>,
}

impl SimBackend {
    pub fn new(config: SimConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    pub fn immediate() -> Self {
        Self::new(SimConfig::default())
    }

    pub fn deferred() -> Self {
        Self::new(SimConfig {
            mode: SimMode::Deferred,
            ..Default::default()
        })
    }

    /// Executes the oldest queued submission. Returns `false` if none is queued.
    pub fn advance(&mut self) -> bool {
        match self.queue.pop_front() {
            Some((fence, lists)) => {
                self.execute(fence, &lists);
                true
            }
            None => false,
        }
    }

    /// Executes every queued submission.
    pub fn advance_all(&mut self) {
        while self.advance() {}
    }

    pub fn queued_submissions(&self) -> usize {
        self.queue.len()
    }

    pub fn log(&self) -> &[Executed] {
        &self.log
    }

    pub fn draws(&self) -> &[DrawRecord] {
        &self.draws
    }

    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    pub fn presented(&self) -> &[ResourceId] {
        &self.presented
    }

    /// Markers that `wait_for_value` actually had to block on.
    pub fn waits(&self) -> &[u64] {
        &self.waits
    }

    pub fn released(&self) -> &[BackendObject] {
        &self.released
    }

    pub fn allocated_bytes(&self) -> u64 {
        self.allocated
    }

    pub fn is_alive(&self, id: ResourceId) -> bool {
        self.resources.contains_key(&id)
    }

    /// State of a resource on the GPU timeline (as of the last executed command).
    pub fn state_of(&self, id: ResourceId) -> Option<ResourceState> {
        self.resources.get(&id).map(|r| r.state)
    }

    pub fn memory(&self, id: ResourceId) -> Option<&[u8]> {
        self.resources.get(&id).map(|r| &r.memory[..r.size.min(r.memory.len())])
    }

    pub fn last_clear(&self, id: ResourceId) -> Option<Color> {
        self.resources.get(&id).and_then(|r| r.last_clear)
    }

    pub fn last_depth_clear(&self, id: ResourceId) -> Option<f32> {
        self.resources.get(&id).and_then(|r| r.last_depth_clear)
    }

    fn allocate(&mut self, what: &str, bytes: u64) -> Result<()> {
        if let Some(budget) = self.config.memory_budget {
            if self.allocated + bytes > budget {
                return Err(EngineError::OutOfMemory {
                    what: what.to_string(),
                    bytes,
                });
            }
        }
        self.allocated += bytes;
        Ok(())
    }

    // ── execution ─────────────────────────────────────────────────────────

    fn execute(&mut self, fence: u64, lists: &[CommandList]) {
        for list in lists {
            let mut state = ListState::default();
            for command in list.commands() {
                self.execute_command(fence, &mut state, command);
                self.log.push(Executed {
                    fence,
                    list: list.label().to_string(),
                    command: command.clone(),
                });
            }
        }
        self.completed = fence;
        log::trace!("sim: reached marker {fence}");
    }

    fn violation(&mut self, fence: u64, message: String) {
        log::warn!("sim violation at marker {fence}: {message}");
        self.violations.push(Violation { fence, message });
    }

    fn require(&mut self, fence: u64, id: ResourceId, what: &str, ok: impl Fn(ResourceState) -> bool) {
        match self.resources.get(&id).map(|r| r.state) {
            None => self.violation(fence, format!("{what}: {id:?} is not alive")),
            Some(s) if !ok(s) => self.violation(fence, format!("{what}: {id:?} is in {s:?}")),
            Some(_) => {}
        }
    }

    fn execute_command(&mut self, fence: u64, st: &mut ListState, command: &Command) {
        match command {
            Command::Barriers(batch) => {
                for b in batch {
                    let current = self.resources.get(&b.resource).map(|r| r.state);
                    match current {
                        None => self.violation(fence, format!("barrier on dead {:?}", b.resource)),
                        Some(s) if s != b.from => self.violation(
                            fence,
                            format!(
                                "barrier {:?} -> {:?} on {:?}, which is in {s:?}",
                                b.from, b.to, b.resource
                            ),
                        ),
                        Some(_) => {}
                    }
                    if let Some(r) = self.resources.get_mut(&b.resource) {
                        r.state = b.to;
                    }
                }
            }

            Command::CopyToBuffer { dst, offset, data } => {
                let id = dst.id();
                self.require(fence, id, "copy to buffer", |s| s == ResourceState::CopyDest);
                let start = *offset as usize;
                let end = start + data.len();
                match self.resources.get_mut(&id) {
                    Some(r) if end <= r.memory.len() => r.memory[start..end].copy_from_slice(data),
                    Some(_) => self.violation(fence, format!("copy of {} bytes overruns {id:?}", data.len())),
                    None => {}
                }
            }

            Command::CopyToTexture { dst, data, .. } => {
                let id = dst.id();
                self.require(fence, id, "copy to texture", |s| s == ResourceState::CopyDest);
                match self.resources.get_mut(&id) {
                    Some(r) if data.len() == r.memory.len() => r.memory.copy_from_slice(data),
                    Some(_) => self.violation(fence, format!("texture copy size mismatch on {id:?}")),
                    None => {}
                }
            }

            Command::ClearRenderTarget { target, color } => {
                let id = target.id();
                self.require(fence, id, "clear render target", |s| s == ResourceState::RenderTarget);
                if let Some(r) = self.resources.get_mut(&id) {
                    r.last_clear = Some(*color);
                }
            }

            Command::ClearDepthStencil { target, depth, .. } => {
                let id = target.id();
                self.require(fence, id, "clear depth", |s| s == ResourceState::DepthWrite);
                if let Some(r) = self.resources.get_mut(&id) {
                    r.last_depth_clear = Some(*depth);
                }
            }

            Command::SetPipeline {
                pipeline,
                render_targets,
                depth_stencil,
            } => {
                if let Some(p) = pipeline {
                    if !self.pipelines.contains_key(p) {
                        self.violation(fence, format!("set pipeline: {p:?} is not alive"));
                    }
                }
                for t in render_targets {
                    self.require(fence, t.id(), "bind render target", |s| s == ResourceState::RenderTarget);
                }
                if let Some(d) = depth_stencil {
                    self.require(fence, d.id(), "bind depth target", |s| s == ResourceState::DepthWrite);
                }
                *st = ListState {
                    pipeline: *pipeline,
                    targets: render_targets.iter().map(|t| t.id()).collect(),
                    depth: depth_stencil.map(|d| d.id()),
                    viewport: st.viewport,
                    scissor: st.scissor,
                    ..Default::default()
                };
            }

            Command::SetResources { space, bindings } => {
                let declared = st
                    .pipeline
                    .and_then(|p| self.pipelines.get(&p))
                    .and_then(|p| p.layout.space(*space))
                    .map(|l| l.len());
                if declared != Some(bindings.len()) {
                    self.violation(fence, format!("space {space:?} does not match the bound pipeline"));
                }
                for b in bindings {
                    self.require(fence, b.id(), "bind resource", ResourceState::is_shader_readable);
                }
                st.spaces[space.index()] = Some(bindings.iter().map(|b| b.id()).collect());
            }

            Command::SetViewport(_) => st.viewport = true,
            Command::SetScissor(_) => st.scissor = true,
            Command::SetTopology(_) => {}

            Command::Draw {
                vertex_count,
                instance_count,
            } => self.execute_draw(fence, st, *vertex_count, *instance_count),
        }
    }

    fn execute_draw(&mut self, fence: u64, st: &ListState, vertex_count: u32, instance_count: u32) {
        let Some(pipeline) = st.pipeline else {
            self.violation(fence, "draw without a pipeline".to_string());
            return;
        };
        if !st.viewport || !st.scissor {
            self.violation(fence, "draw without viewport or scissor".to_string());
        }

        let declared: Vec<SpaceId> = self
            .pipelines
            .get(&pipeline)
            .map(|p| p.layout.declared().map(|(id, _)| id).collect())
            .unwrap_or_default();
        for space in declared {
            if st.spaces[space.index()].is_none() {
                self.violation(fence, format!("draw with {space:?} unbound"));
            }
        }

        for &t in &st.targets {
            self.require(fence, t, "draw target", |s| s == ResourceState::RenderTarget);
        }
        if let Some(d) = st.depth {
            self.require(fence, d, "draw depth target", |s| s == ResourceState::DepthWrite);
        }
        let resources: Vec<ResourceId> = st.spaces.iter().flatten().flatten().copied().collect();
        for &id in &resources {
            self.require(fence, id, "draw resource", ResourceState::is_shader_readable);
        }

        self.draws.push(DrawRecord {
            fence,
            pipeline,
            vertex_count,
            instance_count,
            render_targets: st.targets.clone(),
            resources,
        });
    }
}

impl Backend for SimBackend {
    fn name(&self) -> &'static str {
        "sim"
    }

    fn configure_swapchain(
        &mut self,
        back_buffers: &[ResourceId],
        _size: Extent,
        requested: Format,
    ) -> Result<Format> {
        for id in std::mem::take(&mut self.back_buffers) {
            self.resources.remove(&id);
        }
        for &id in back_buffers {
            self.resources.insert(
                id,
                SimResource {
                    state: ResourceState::Present,
                    memory: Vec::new(),
                    size: 0,
                    bytes: 0,
                    host_visible: false,
                    last_clear: None,
                    last_depth_clear: None,
                },
            );
        }
        self.back_buffers = back_buffers.to_vec();
        self.acquired = None;
        Ok(self.config.swapchain_format.unwrap_or(requested))
    }

    fn acquire_back_buffer(&mut self, back_buffer: ResourceId) -> Result<()> {
        if !self.back_buffers.contains(&back_buffer) {
            return Err(EngineError::backend("acquire", format!("{back_buffer:?} is not a back buffer")));
        }
        self.acquired = Some(back_buffer);
        Ok(())
    }

    fn create_buffer(&mut self, id: ResourceId, desc: &BufferDesc, initial: ResourceState) -> Result<()> {
        let bytes = desc.allocation_size();
        self.allocate(&desc.debug_name, bytes)?;
        self.resources.insert(
            id,
            SimResource {
                state: initial,
                memory: vec![0; bytes as usize],
                size: desc.size as usize,
                bytes,
                host_visible: desc.access == AccessPattern::HostWritable,
                last_clear: None,
                last_depth_clear: None,
            },
        );
        Ok(())
    }

    fn create_texture(&mut self, id: ResourceId, desc: &TextureDesc, initial: ResourceState) -> Result<()> {
        let bytes = desc.byte_size();
        self.allocate(&desc.debug_name, bytes)?;
        let memory = if desc.is_gpu_produced() {
            Vec::new()
        } else {
            vec![0; bytes as usize]
        };
        self.resources.insert(
            id,
            SimResource {
                state: initial,
                size: memory.len(),
                memory,
                bytes,
                host_visible: false,
                last_clear: None,
                last_depth_clear: None,
            },
        );
        Ok(())
    }

    fn write_mapped(&mut self, id: ResourceId, offset: u64, data: &[u8]) -> Result<()> {
        let r = self
            .resources
            .get_mut(&id)
            .filter(|r| r.host_visible)
            .ok_or_else(|| EngineError::backend("map", format!("{id:?} is not mapped")))?;
        let start = offset as usize;
        let end = start + data.len();
        if end > r.size {
            return Err(EngineError::backend("map", format!("write past the end of {id:?}")));
        }
        r.memory[start..end].copy_from_slice(data);
        Ok(())
    }

    fn read_mapped(&self, id: ResourceId) -> Result<Vec<u8>> {
        self.resources
            .get(&id)
            .filter(|r| r.host_visible)
            .map(|r| r.memory[..r.size].to_vec())
            .ok_or_else(|| EngineError::backend("map", format!("{id:?} is not mapped")))
    }

    fn compile_shader(&mut self, desc: &ShaderDesc) -> Result<Vec<u8>> {
        if desc.source_name.is_empty() || desc.entry_point.is_empty() {
            return Err(EngineError::InvalidDescriptor(
                "shader needs a source name and an entry point".to_string(),
            ));
        }
        Ok(format!("{}:{}:{:?}", desc.source_name, desc.entry_point, desc.stage).into_bytes())
    }

    fn create_pipeline(
        &mut self,
        handle: PipelineHandle,
        pso: &PipelineStateObject,
        _vertex: &Shader,
        _pixel: &Shader,
    ) -> Result<()> {
        self.pipelines.insert(
            handle,
            SimPipeline {
                layout: pso.layout().clone(),
            },
        );
        Ok(())
    }

    fn submit(&mut self, lists: &[CommandList], signal: u64) -> Result<()> {
        if signal <= self.submitted {
            return Err(EngineError::backend(
                "submit",
                format!("marker {signal} does not advance past {}", self.submitted),
            ));
        }
        self.submitted = signal;
        match self.config.mode {
            SimMode::Immediate => self.execute(signal, lists),
            SimMode::Deferred => self.queue.push_back((signal, lists.to_vec())),
        }
        Ok(())
    }

    fn completed_value(&mut self) -> u64 {
        self.completed
    }

    fn wait_for_value(&mut self, value: u64) -> Result<()> {
        if value <= self.completed {
            return Ok(());
        }
        self.waits.push(value);
        while self.completed < value {
            if !self.advance() {
                return Err(EngineError::backend(
                    "wait",
                    format!("marker {value} was never submitted"),
                ));
            }
        }
        Ok(())
    }

    fn present(&mut self, back_buffer: ResourceId) -> Result<()> {
        if self.acquired != Some(back_buffer) {
            return Err(EngineError::backend("present", format!("{back_buffer:?} was not acquired")));
        }
        // Queued work still owns the back buffer in deferred mode; its final
        // state is checked once the timeline catches up.
        if self.queue.is_empty() {
            self.require(self.completed, back_buffer, "present", |s| s == ResourceState::Present);
        }
        self.presented.push(back_buffer);
        self.acquired = None;
        Ok(())
    }

    fn release(&mut self, object: BackendObject) {
        match object {
            BackendObject::Resource(id) => {
                if let Some(r) = self.resources.remove(&id) {
                    self.allocated -= r.bytes;
                }
                self.back_buffers.retain(|&b| b != id);
            }
            BackendObject::Pipeline(handle) => {
                self.pipelines.remove(&handle);
            }
            BackendObject::Shader(_) => {}
        }
        self.released.push(object);
    }
}
