//! Recorded GPU commands.
//!
//! A [`CommandList`] is the unit a backend executes. Lists are recorded by a
//! `GraphicsContext` or by the upload drain and are submitted in order.

use crate::ResourceBarrier;
use crate::coords::{Color, ScissorRect, Viewport};
use crate::pipeline::{PipelineHandle, PrimitiveTopology};
use crate::resource::{BufferHandle, ResourceId, TextureHandle};
use crate::space::{Binding, SpaceId};

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// One flushed barrier batch.
    Barriers(Vec<ResourceBarrier>),
    CopyToBuffer {
        dst: BufferHandle,
        offset: u64,
        data: Vec<u8>,
    },
    CopyToTexture {
        dst: TextureHandle,
        data: Vec<u8>,
        width: u32,
        height: u32,
        bytes_per_row: u32,
    },
    ClearRenderTarget {
        target: TextureHandle,
        color: Color,
    },
    ClearDepthStencil {
        target: TextureHandle,
        depth: f32,
        stencil: u8,
    },
    SetPipeline {
        pipeline: Option<PipelineHandle>,
        render_targets: Vec<TextureHandle>,
        depth_stencil: Option<TextureHandle>,
    },
    /// Bindings of one space, in slot order.
    SetResources {
        space: SpaceId,
        bindings: Vec<Binding>,
    },
    SetViewport(Viewport),
    SetScissor(ScissorRect),
    SetTopology(PrimitiveTopology),
    Draw {
        vertex_count: u32,
        instance_count: u32,
    },
}

impl Command {
    fn for_each_resource(&self, mut f: impl FnMut(ResourceId)) {
        match self {
            Command::Barriers(batch) => batch.iter().for_each(|b| f(b.resource)),
            Command::CopyToBuffer { dst, .. } => f(dst.id()),
            Command::CopyToTexture { dst, .. } => f(dst.id()),
            Command::ClearRenderTarget { target, .. } | Command::ClearDepthStencil { target, .. } => {
                f(target.id())
            }
            Command::SetPipeline {
                render_targets,
                depth_stencil,
                ..
            } => {
                render_targets.iter().for_each(|t| f(t.id()));
                depth_stencil.iter().for_each(|t| f(t.id()));
            }
            Command::SetResources { bindings, .. } => bindings.iter().for_each(|b| f(b.id())),
            Command::SetViewport(_)
            | Command::SetScissor(_)
            | Command::SetTopology(_)
            | Command::Draw { .. } => {}
        }
    }
}

/// Ordered command recording.
#[derive(Debug, Clone, Default)]
pub struct CommandList {
    label: String,
    commands: Vec<Command>,
}

impl CommandList {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            commands: Vec::new(),
        }
    }

    #[inline]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[inline]
    pub fn push(&mut self, command: Command) {
        log::trace!("[{}] {:?}", self.label, command);
        self.commands.push(command);
    }

    #[inline]
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn clear(&mut self) {
        self.commands.clear();
    }

    /// Every resource any command touches, deduplicated, in first-use order.
    pub fn referenced_resources(&self) -> Vec<ResourceId> {
        let mut out = Vec::new();
        for cmd in &self.commands {
            cmd.for_each_resource(|id| {
                if !out.contains(&id) {
                    out.push(id);
                }
            });
        }
        out
    }

    /// Number of `Barriers` batches recorded.
    pub fn barrier_batches(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, Command::Barriers(_)))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::ResourceState;
    use slotmap::SlotMap;

    #[test]
    fn referenced_resources_are_deduplicated() {
        let mut ids: SlotMap<ResourceId, ()> = SlotMap::with_key();
        let rt = TextureHandle(ids.insert(()));
        let cb = BufferHandle(ids.insert(()));

        let mut list = CommandList::new("test");
        list.push(Command::Barriers(vec![ResourceBarrier::new(
            rt.id(),
            ResourceState::Present,
            ResourceState::RenderTarget,
        )]));
        list.push(Command::ClearRenderTarget {
            target: rt,
            color: Color::black(),
        });
        list.push(Command::SetResources {
            space: SpaceId::PerObject,
            bindings: vec![Binding::Buffer(cb)],
        });
        list.push(Command::Draw {
            vertex_count: 3,
            instance_count: 1,
        });

        assert_eq!(list.referenced_resources(), vec![rt.id(), cb.id()]);
        assert_eq!(list.barrier_batches(), 1);
    }
}
