//! Application contract.
//!
//! Sits between the platform loop (`window::Runtime`, or a test harness
//! driving the `sim` backend) and user code. Nothing here depends on winit,
//! so apps run unchanged against either backend.

mod app;
mod clock;
mod ctx;

pub use app::{App, AppControl};
pub use clock::{FrameClock, FrameTime};
pub use ctx::{FrameCtx, drive_frame};
