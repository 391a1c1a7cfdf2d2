//! Pipeline resource spaces.
//!
//! A space groups the resources one shader binding slot set reads: at most one
//! constant buffer, shader-resource views by register and unordered-access
//! views by register. Spaces are assembled with [`ResourceSpaceBuilder`] and
//! sealed with [`ResourceSpaceBuilder::lock`]. A locked space keeps its slot
//! layout for life; only the resource behind an existing slot can be swapped.

use std::collections::BTreeMap;

use crate::error::{EngineError, Result};
use crate::resource::{BufferHandle, ResourceId, TextureHandle};

/// Binding frequency of a resource space. The discriminant is the shader's
/// space / bind-group index.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SpaceId {
    PerObject = 0,
    PerMaterial = 1,
    PerPass = 2,
    PerFrame = 3,
}

impl SpaceId {
    pub const COUNT: usize = 4;
    pub const ALL: [SpaceId; Self::COUNT] = [
        SpaceId::PerObject,
        SpaceId::PerMaterial,
        SpaceId::PerPass,
        SpaceId::PerFrame,
    ];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum SlotKind {
    Cbv,
    SrvBuffer,
    SrvTexture,
    UavBuffer,
}

/// One slot of a space layout.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct SlotLayout {
    pub kind: SlotKind,
    pub register: u32,
}

/// Ordered slot list of a space: the constant buffer first, then SRVs and
/// UAVs by ascending register. A slot's position is its binding number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct SpaceLayout {
    slots: Vec<SlotLayout>,
}

impl SpaceLayout {
    #[inline]
    pub fn slots(&self) -> &[SlotLayout] {
        &self.slots
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn position(&self, kind: SlotKind, register: u32) -> Option<usize> {
        self.slots
            .iter()
            .position(|s| s.kind == kind && s.register == register)
    }
}

/// Resource behind a slot.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Binding {
    Buffer(BufferHandle),
    Texture(TextureHandle),
}

impl Binding {
    #[inline]
    pub fn id(self) -> ResourceId {
        match self {
            Binding::Buffer(b) => b.id(),
            Binding::Texture(t) => t.id(),
        }
    }

    fn srv_kind(self) -> SlotKind {
        match self {
            Binding::Buffer(_) => SlotKind::SrvBuffer,
            Binding::Texture(_) => SlotKind::SrvTexture,
        }
    }
}

impl From<BufferHandle> for Binding {
    fn from(b: BufferHandle) -> Self {
        Binding::Buffer(b)
    }
}

impl From<TextureHandle> for Binding {
    fn from(t: TextureHandle) -> Self {
        Binding::Texture(t)
    }
}

/// Unlocked, freely mutable space under construction.
#[derive(Debug, Clone, Default)]
pub struct ResourceSpaceBuilder {
    cbv: Option<BufferHandle>,
    srvs: BTreeMap<u32, Binding>,
    uavs: BTreeMap<u32, BufferHandle>,
}

impl ResourceSpaceBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_cbv(&mut self, buffer: BufferHandle) -> &mut Self {
        self.cbv = Some(buffer);
        self
    }

    pub fn set_srv(&mut self, register: u32, resource: impl Into<Binding>) -> &mut Self {
        self.srvs.insert(register, resource.into());
        self
    }

    pub fn set_uav(&mut self, register: u32, buffer: BufferHandle) -> &mut Self {
        self.uavs.insert(register, buffer);
        self
    }

    /// Seals the slot layout.
    pub fn lock(&self) -> PipelineResourceSpace {
        let mut slots = Vec::new();
        let mut bindings = Vec::new();

        if let Some(cbv) = self.cbv {
            slots.push(SlotLayout { kind: SlotKind::Cbv, register: 0 });
            bindings.push(Binding::Buffer(cbv));
        }
        for (&register, &binding) in &self.srvs {
            slots.push(SlotLayout { kind: binding.srv_kind(), register });
            bindings.push(binding);
        }
        for (&register, &buffer) in &self.uavs {
            slots.push(SlotLayout { kind: SlotKind::UavBuffer, register });
            bindings.push(Binding::Buffer(buffer));
        }

        PipelineResourceSpace {
            layout: SpaceLayout { slots },
            bindings,
        }
    }
}

/// Locked space: fixed layout, swappable slot values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineResourceSpace {
    layout: SpaceLayout,
    bindings: Vec<Binding>,
}

impl PipelineResourceSpace {
    #[inline]
    pub fn layout(&self) -> &SpaceLayout {
        &self.layout
    }

    /// Bindings in slot order.
    #[inline]
    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    pub fn resources(&self) -> impl Iterator<Item = ResourceId> + '_ {
        self.bindings.iter().map(|b| b.id())
    }

    pub fn set_cbv(&mut self, buffer: BufferHandle) -> Result<()> {
        self.swap(SlotKind::Cbv, 0, Binding::Buffer(buffer))
    }

    pub fn set_srv(&mut self, register: u32, resource: impl Into<Binding>) -> Result<()> {
        let binding = resource.into();
        self.swap(binding.srv_kind(), register, binding)
    }

    pub fn set_uav(&mut self, register: u32, buffer: BufferHandle) -> Result<()> {
        self.swap(SlotKind::UavBuffer, register, Binding::Buffer(buffer))
    }

    fn swap(&mut self, kind: SlotKind, register: u32, binding: Binding) -> Result<()> {
        let slot = self
            .layout
            .position(kind, register)
            .ok_or(EngineError::SpaceLocked)?;
        self.bindings[slot] = binding;
        Ok(())
    }
}

/// Per-pipeline declaration of which spaces exist and what they look like.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct PipelineResourceLayout {
    spaces: [Option<SpaceLayout>; SpaceId::COUNT],
}

impl PipelineResourceLayout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_space(mut self, id: SpaceId, layout: &SpaceLayout) -> Self {
        self.set_space(id, layout);
        self
    }

    pub fn set_space(&mut self, id: SpaceId, layout: &SpaceLayout) {
        self.spaces[id.index()] = Some(layout.clone());
    }

    #[inline]
    pub fn space(&self, id: SpaceId) -> Option<&SpaceLayout> {
        self.spaces[id.index()].as_ref()
    }

    /// Declared spaces in ascending id order.
    pub fn declared(&self) -> impl Iterator<Item = (SpaceId, &SpaceLayout)> {
        SpaceId::ALL
            .into_iter()
            .filter_map(|id| self.space(id).map(|l| (id, l)))
    }
}
