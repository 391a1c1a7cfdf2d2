mod geometry;
mod scenes;
mod studio;
mod transform;

use std::path::PathBuf;

use anyhow::Context;
use lumen_engine::backend::wgpu::WgpuConfig;
use lumen_engine::device::DeviceConfig;
use lumen_engine::logging::{LoggingConfig, init_logging};
use lumen_engine::window::{Runtime, RuntimeConfig};

use studio::{SceneKind, Studio};

fn main() -> anyhow::Result<()> {
    init_logging(LoggingConfig::default());

    let kind: SceneKind = match std::env::args().nth(1) {
        Some(arg) => arg.parse().context("usage: lumen-studio [clear|triangle|mesh]")?,
        None => SceneKind::Mesh,
    };

    Runtime::run(
        RuntimeConfig {
            title: format!("lumen studio: {kind}"),
            ..Default::default()
        },
        DeviceConfig::default(),
        WgpuConfig {
            shader_dir: PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/shaders")),
            ..Default::default()
        },
        Studio::new(kind),
    )
}
