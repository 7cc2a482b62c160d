//! veriface-hw — V4L2 camera capture and pixel-format conversion.

pub mod camera;
pub mod frame;

pub use camera::{Camera, CameraError};
