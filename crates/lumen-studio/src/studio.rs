use std::fmt;
use std::str::FromStr;

use lumen_engine::backend::Backend;
use lumen_engine::coords::Extent;
use lumen_engine::core::{App, AppControl, FrameCtx};
use lumen_engine::device::Device;

use crate::scenes::{ClearScene, MeshScene, TriangleScene};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SceneKind {
    Clear,
    Triangle,
    Mesh,
}

impl FromStr for SceneKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "clear" => Ok(Self::Clear),
            "triangle" => Ok(Self::Triangle),
            "mesh" | "cube" => Ok(Self::Mesh),
            other => anyhow::bail!("unknown scene '{other}'"),
        }
    }
}

impl fmt::Display for SceneKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Clear => "clear",
            Self::Triangle => "triangle",
            Self::Mesh => "mesh",
        })
    }
}

enum Scene {
    Clear(ClearScene),
    Triangle(TriangleScene),
    Mesh(MeshScene),
}

/// Runs one scene; the scene is built once the device exists.
pub struct Studio {
    kind: SceneKind,
    scene: Option<Scene>,
}

impl Studio {
    pub fn new(kind: SceneKind) -> Self {
        Self { kind, scene: None }
    }
}

impl App for Studio {
    fn init<B: Backend>(&mut self, device: &mut Device<B>) -> anyhow::Result<()> {
        self.scene = Some(match self.kind {
            SceneKind::Clear => Scene::Clear(ClearScene::new()),
            SceneKind::Triangle => Scene::Triangle(TriangleScene::new(device)?),
            SceneKind::Mesh => Scene::Mesh(MeshScene::new(device)?),
        });
        log::info!("studio scene: {}", self.kind);
        Ok(())
    }

    fn on_frame<B: Backend>(&mut self, frame: &mut FrameCtx<'_, B>) -> anyhow::Result<AppControl> {
        match self.scene.as_mut() {
            Some(Scene::Clear(s)) => s.record(frame)?,
            Some(Scene::Triangle(s)) => s.record(frame)?,
            Some(Scene::Mesh(s)) => s.record(frame)?,
            None => anyhow::bail!("frame requested before init"),
        }
        Ok(AppControl::Continue)
    }

    fn on_resize<B: Backend>(&mut self, device: &mut Device<B>, size: Extent) -> anyhow::Result<()> {
        match self.scene.as_mut() {
            Some(Scene::Triangle(s)) => s.resize(device),
            Some(Scene::Mesh(s)) => s.resize(device, size),
            Some(Scene::Clear(_)) | None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_engine::backend::sim::SimBackend;
    use lumen_engine::context::GraphicsContext;
    use lumen_engine::core::{FrameTime, drive_frame};
    use lumen_engine::device::DeviceConfig;

    fn run(kind: SceneKind, frames: u64) -> Device<SimBackend> {
        let mut device = Device::new(DeviceConfig::default(), SimBackend::immediate()).unwrap();
        let mut gfx = GraphicsContext::new();
        let mut studio = Studio::new(kind);
        studio.init(&mut device).unwrap();
        for i in 0..frames {
            let control =
                drive_frame(&mut studio, &mut device, &mut gfx, FrameTime::fixed(i, 1.0 / 60.0), || {})
                    .unwrap();
            assert_eq!(control, AppControl::Continue);
        }
        device.wait_for_idle().unwrap();
        device
    }

    #[test]
    fn scene_names_parse() {
        assert_eq!("triangle".parse::<SceneKind>().unwrap(), SceneKind::Triangle);
        assert_eq!("Cube".parse::<SceneKind>().unwrap(), SceneKind::Mesh);
        assert!("teapot".parse::<SceneKind>().is_err());
        assert_eq!(SceneKind::Clear.to_string(), "clear");
    }

    #[test]
    fn clear_scene_presents_without_draws() {
        let device = run(SceneKind::Clear, 4);
        let sim = device.backend();
        assert_eq!(sim.presented().len(), 4);
        assert!(sim.draws().is_empty());
        assert!(sim.violations().is_empty(), "{:?}", sim.violations());
    }

    #[test]
    fn triangle_scene_draws_every_frame() {
        let device = run(SceneKind::Triangle, 5);
        let sim = device.backend();
        assert_eq!(sim.draws().len(), 5);
        assert!(sim.draws().iter().all(|d| d.vertex_count == 3));
        assert!(sim.violations().is_empty(), "{:?}", sim.violations());
    }

    #[test]
    fn mesh_scene_waits_for_its_uploads() {
        let device = run(SceneKind::Mesh, 4);
        let sim = device.backend();
        // Frame 1 carries the uploads; drawing starts once they completed.
        assert_eq!(sim.draws().len(), 3);
        assert!(sim.draws().iter().all(|d| d.vertex_count == 36));
        assert!(sim.violations().is_empty(), "{:?}", sim.violations());
    }

    #[test]
    fn mesh_scene_survives_resize() {
        let mut device = Device::new(DeviceConfig::default(), SimBackend::immediate()).unwrap();
        let mut gfx = GraphicsContext::new();
        let mut studio = Studio::new(SceneKind::Mesh);
        studio.init(&mut device).unwrap();
        for i in 0..2 {
            drive_frame(&mut studio, &mut device, &mut gfx, FrameTime::fixed(i, 0.1), || {}).unwrap();
        }

        let size = Extent::new(640, 360);
        device.resize(size).unwrap();
        studio.on_resize(&mut device, size).unwrap();
        drive_frame(&mut studio, &mut device, &mut gfx, FrameTime::fixed(2, 0.1), || {}).unwrap();

        let sim = device.backend();
        assert_eq!(sim.draws().len(), 2);
        assert!(sim.violations().is_empty(), "{:?}", sim.violations());
    }
}
