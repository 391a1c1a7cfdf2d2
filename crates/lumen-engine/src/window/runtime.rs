use anyhow::{Context, Result};
use ouroboros::self_referencing;

use winit::application::ApplicationHandler;
use winit::dpi::{LogicalSize, PhysicalSize};
use winit::event::{ElementState, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowId};

use crate::backend::wgpu::{WgpuBackend, WgpuConfig};
use crate::context::GraphicsContext;
use crate::coords::Extent;
use crate::core::{App, AppControl, FrameClock, drive_frame};
use crate::device::{Device, DeviceConfig};

/// Window/runtime configuration.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub title: String,
    pub initial_size: LogicalSize<f64>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            title: "lumen".to_string(),
            initial_size: LogicalSize::new(1280.0, 720.0),
        }
    }
}

/// Entry point for the runtime.
pub struct Runtime;

impl Runtime {
    /// Opens one window and runs `app` in it until the window closes, Escape
    /// is pressed, the app exits, or an error escapes the frame loop.
    pub fn run<A>(
        config: RuntimeConfig,
        device_config: DeviceConfig,
        wgpu_config: WgpuConfig,
        app: A,
    ) -> Result<()>
    where
        A: App + 'static,
    {
        let event_loop = EventLoop::new().context("failed to create winit EventLoop")?;
        let mut state = AppState {
            config,
            device_config,
            wgpu_config,
            app,
            entry: None,
            failure: None,
        };

        event_loop
            .run_app(&mut state)
            .context("winit event loop terminated with error")?;

        match state.failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

fn extent(size: PhysicalSize<u32>) -> Extent {
    Extent::new(size.width, size.height)
}

#[self_referencing]
struct WindowEntry {
    gfx: GraphicsContext,
    clock: FrameClock,

    window: Window,

    #[borrows(window)]
    #[covariant]
    device: Device<WgpuBackend<'this>>,
}

struct AppState<A: App> {
    config: RuntimeConfig,
    device_config: DeviceConfig,
    wgpu_config: WgpuConfig,
    app: A,

    entry: Option<WindowEntry>,
    failure: Option<anyhow::Error>,
}

impl<A: App> AppState<A> {
    fn create_window_entry(&mut self, event_loop: &ActiveEventLoop) -> Result<WindowEntry> {
        let attrs = Window::default_attributes()
            .with_title(self.config.title.clone())
            .with_inner_size(self.config.initial_size);

        let window = event_loop
            .create_window(attrs)
            .context("failed to create window")?;

        let size = extent(window.inner_size());
        let device_config = DeviceConfig {
            screen_size: size,
            ..self.device_config.clone()
        };
        let wgpu_config = self.wgpu_config.clone();

        let mut entry = WindowEntryTryBuilder {
            gfx: GraphicsContext::new(),
            clock: FrameClock::new(),
            window,
            device_builder: |w| {
                pollster::block_on(WgpuBackend::new(w, size, wgpu_config))
                    .and_then(|backend| Ok(Device::new(device_config, backend)?))
            },
        }
        .try_build()
        .context("GPU initialization failed for window")?;

        let app = &mut self.app;
        entry
            .with_device_mut(|device| app.init(device))
            .context("app initialization failed")?;
        Ok(entry)
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        log::error!("{err:#}");
        if self.failure.is_none() {
            self.failure = Some(err);
        }
        self.shutdown(event_loop);
    }

    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        // Device teardown waits for the GPU before the window goes away.
        self.entry = None;
        event_loop.exit();
    }

    fn resize(&mut self, size: PhysicalSize<u32>) -> Result<()> {
        let (app, Some(entry)) = (&mut self.app, self.entry.as_mut()) else {
            return Ok(());
        };
        let size = extent(size);
        entry.with_device_mut(|device| -> Result<()> {
            if size.is_empty() || size == device.screen_size() {
                return Ok(());
            }
            device.resize(size)?;
            app.on_resize(device, size)
        })?;
        entry.with_window(|w| w.request_redraw());
        Ok(())
    }

    fn redraw(&mut self) -> Result<AppControl> {
        let (app, Some(entry)) = (&mut self.app, self.entry.as_mut()) else {
            return Ok(AppControl::Continue);
        };
        // Minimized: nothing to present into.
        if entry.with_window(|w| extent(w.inner_size()).is_empty()) {
            return Ok(AppControl::Continue);
        }

        entry.with_mut(|fields| {
            let time = fields.clock.tick();
            let window = fields.window;
            drive_frame(app, fields.device, fields.gfx, time, || window.pre_present_notify())
        })
    }
}

impl<A: App> ApplicationHandler for AppState<A> {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.entry.is_some() {
            return;
        }

        match self.create_window_entry(event_loop) {
            Ok(entry) => {
                entry.with_window(|w| w.request_redraw());
                self.entry = Some(entry);
            }
            Err(e) => self.fail(event_loop, e),
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        event_loop.set_control_flow(ControlFlow::Wait);

        // Continuous redraw; scenes animate every frame.
        if let Some(entry) = &self.entry {
            entry.with_window(|w| w.request_redraw());
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => self.shutdown(event_loop),

            WindowEvent::KeyboardInput { event, .. }
                if event.state == ElementState::Pressed
                    && event.physical_key == PhysicalKey::Code(KeyCode::Escape) =>
            {
                self.shutdown(event_loop)
            }

            WindowEvent::Resized(size) => {
                if let Err(e) = self.resize(size) {
                    self.fail(event_loop, e);
                }
            }

            WindowEvent::ScaleFactorChanged { .. } => {
                let size = self.entry.as_ref().map(|e| e.with_window(|w| w.inner_size()));
                if let Some(size) = size {
                    if let Err(e) = self.resize(size) {
                        self.fail(event_loop, e);
                    }
                }
            }

            WindowEvent::RedrawRequested => match self.redraw() {
                Ok(AppControl::Continue) => {}
                Ok(AppControl::Exit) => self.shutdown(event_loop),
                Err(e) => self.fail(event_loop, e),
            },

            _ => {}
        }
    }
}
