//! rollcall-hw: V4L2 webcam capture.
//!
//! Frames are delivered as packed BGR regardless of the negotiated
//! device format.

pub mod camera;
pub mod frame;

pub use camera::{Camera, CameraError, DeviceInfo, FrameStream, PixelFormat};
pub use frame::Frame;
