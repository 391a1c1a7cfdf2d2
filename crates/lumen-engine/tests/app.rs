mod common;

use lumen_engine::backend::Backend;
use lumen_engine::backend::sim::SimBackend;
use lumen_engine::context::GraphicsContext;
use lumen_engine::coords::{Color, Extent};
use lumen_engine::core::{App, AppControl, FrameCtx, FrameTime, drive_frame};
use lumen_engine::device::{Device, DeviceConfig};
use lumen_engine::resource::ResourceState;

#[derive(Default)]
struct ClearApp {
    initialized: bool,
    frames: u32,
    exit_after: u32,
    resized_to: Option<Extent>,
}

impl App for ClearApp {
    fn init<B: Backend>(&mut self, _device: &mut Device<B>) -> anyhow::Result<()> {
        self.initialized = true;
        Ok(())
    }

    fn on_frame<B: Backend>(&mut self, frame: &mut FrameCtx<'_, B>) -> anyhow::Result<AppControl> {
        let device = &*frame.device;
        let bb = device.current_back_buffer();
        frame.gfx.add_barrier(device, bb, ResourceState::RenderTarget)?;
        frame.gfx.flush_barriers();
        frame
            .gfx
            .clear_render_target(device, bb, Color::rgb(frame.time.elapsed, 0.0, 0.0))?;
        frame.gfx.add_barrier(device, bb, ResourceState::Present)?;
        frame.gfx.flush_barriers();

        self.frames += 1;
        Ok(if self.frames >= self.exit_after {
            AppControl::Exit
        } else {
            AppControl::Continue
        })
    }

    fn on_resize<B: Backend>(&mut self, _device: &mut Device<B>, size: Extent) -> anyhow::Result<()> {
        self.resized_to = Some(size);
        Ok(())
    }
}

#[test]
fn drive_frame_runs_the_full_cycle() {
    let mut device = Device::new(DeviceConfig::default(), SimBackend::deferred()).unwrap();
    let mut gfx = GraphicsContext::new();
    let mut app = ClearApp {
        exit_after: 3,
        ..Default::default()
    };
    app.init(&mut device).unwrap();
    assert!(app.initialized);

    let mut presents = 0;
    let mut frame = 0;
    loop {
        let control = drive_frame(&mut app, &mut device, &mut gfx, FrameTime::fixed(frame, 0.25), || {
            presents += 1
        })
        .unwrap();
        frame += 1;
        if control == AppControl::Exit {
            break;
        }
    }

    assert_eq!(app.frames, 3);
    assert_eq!(presents, 3);
    assert_eq!(device.last_signalled(), 3);
    assert_eq!(device.backend().presented().len(), 3);

    device.wait_for_idle().unwrap();
    let sim = device.backend();
    assert!(sim.violations().is_empty(), "{:?}", sim.violations());
    let last = sim.presented()[2];
    assert_eq!(sim.last_clear(last), Some(Color::rgb(0.5, 0.0, 0.0)));
}

#[test]
fn app_errors_abort_the_frame() {
    struct Broken;
    impl App for Broken {
        fn init<B: Backend>(&mut self, _device: &mut Device<B>) -> anyhow::Result<()> {
            Ok(())
        }

        fn on_frame<B: Backend>(&mut self, frame: &mut FrameCtx<'_, B>) -> anyhow::Result<AppControl> {
            let bb = frame.device.current_back_buffer();
            // Clearing in `Present` is a contract violation.
            frame.gfx.clear_render_target(&*frame.device, bb, Color::black())?;
            Ok(AppControl::Continue)
        }
    }

    let mut device = Device::new(DeviceConfig::default(), SimBackend::immediate()).unwrap();
    let mut gfx = GraphicsContext::new();
    let err = drive_frame(&mut Broken, &mut device, &mut gfx, FrameTime::fixed(0, 0.0), || {})
        .unwrap_err();
    assert!(err.downcast_ref::<lumen_engine::EngineError>().is_some());
    assert!(device.is_recording());
}

#[test]
fn resize_hook_receives_new_size() {
    let mut device = Device::new(DeviceConfig::default(), SimBackend::immediate()).unwrap();
    let mut app = ClearApp::default();
    app.on_resize(&mut device, Extent::new(10, 10)).unwrap();
    assert_eq!(app.resized_to, Some(Extent::new(10, 10)));
}

#[test]
fn skipped_acquire_does_not_reach_the_app() {
    let mut device = common::flaky();
    let mut gfx = GraphicsContext::new();
    let mut app = ClearApp {
        exit_after: u32::MAX,
        ..Default::default()
    };
    device.backend_mut().skip_acquires = 1;

    let mut presents = 0;
    let control = drive_frame(&mut app, &mut device, &mut gfx, FrameTime::fixed(0, 0.1), || presents += 1)
        .unwrap();
    assert_eq!(control, AppControl::Continue);
    assert_eq!(app.frames, 0);
    assert_eq!(presents, 0);
    assert!(!device.is_recording());
    assert_eq!(device.last_signalled(), 0);

    // The next frame goes through normally.
    drive_frame(&mut app, &mut device, &mut gfx, FrameTime::fixed(1, 0.1), || presents += 1).unwrap();
    assert_eq!(app.frames, 1);
    assert_eq!(presents, 1);
    assert_eq!(device.backend().sim.presented().len(), 1);
}
