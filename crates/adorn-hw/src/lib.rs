//! adorn-hw — Hardware abstraction for webcam capture.
//!
//! Provides V4L2-based camera access producing RGB frames for the try-on
//! compositor.

pub mod camera;
pub mod frame;

pub use camera::{Camera, CameraError, DeviceInfo};
pub use frame::Frame;
