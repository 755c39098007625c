//! Camera/session runtime boundary
//!
//! The engine consumes frames, snapshots and a feature-point raycast probe
//! from the host's camera session; it never manages session lifecycle.

use chefar_common::Result;
use glam::{Mat4, Vec2, Vec3};

/// Pinhole camera intrinsics in viewport pixel units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraIntrinsics {
    pub fx: f32,
    pub fy: f32,
    pub cx: f32,
    pub cy: f32,
}

impl CameraIntrinsics {
    /// Back-project a viewport pixel at a sampled depth (meters along the
    /// optical axis) into camera space.
    pub fn back_project(&self, pixel: Vec2, depth: f32) -> Vec3 {
        Vec3::new(
            (pixel.x - self.cx) * depth / self.fx,
            (pixel.y - self.cy) * depth / self.fy,
            depth,
        )
    }
}

/// Per-pixel depth in meters, row-major. Resolution may differ from the
/// viewport; sampling goes through normalized coordinates.
#[derive(Debug, Clone)]
pub struct DepthMap {
    pub width: u32,
    pub height: u32,
    pub data: Vec<f32>,
}

impl DepthMap {
    /// Depth at a normalized [0,1] view coordinate. `None` outside the
    /// map or where the sensor reported no valid depth.
    pub fn sample(&self, u: f32, v: f32) -> Option<f32> {
        if !(0.0..=1.0).contains(&u) || !(0.0..=1.0).contains(&v) {
            return None;
        }
        let x = ((u * self.width as f32) as u32).min(self.width.saturating_sub(1));
        let y = ((v * self.height as f32) as u32).min(self.height.saturating_sub(1));
        let depth = *self.data.get((y * self.width + x) as usize)?;
        if depth.is_finite() && depth > 0.0 {
            Some(depth)
        } else {
            None
        }
    }
}

/// One camera frame as delivered by the session runtime.
///
/// The pixel buffer itself stays on the host side; the classifier boundary
/// receives this frame descriptor and the host resolves it to image data.
#[derive(Debug, Clone)]
pub struct CameraFrame {
    /// Monotonic frame counter assigned by the host.
    pub ordinal: u64,
    /// Viewport size in pixels.
    pub width: u32,
    pub height: u32,
    pub intrinsics: CameraIntrinsics,
    /// Camera-to-world pose.
    pub camera_to_world: Mat4,
    /// Present when the device has an active depth sensor.
    pub depth: Option<DepthMap>,
}

impl CameraFrame {
    /// Viewport center in pixels.
    pub fn view_center(&self) -> Vec2 {
        Vec2::new(self.width as f32 / 2.0, self.height as f32 / 2.0)
    }

    /// Convert a normalized [0,1] view coordinate to viewport pixels.
    pub fn to_pixels(&self, norm: (f32, f32)) -> Vec2 {
        Vec2::new(norm.0 * self.width as f32, norm.1 * self.height as f32)
    }
}

/// Encoded snapshot of the current camera view, fed to the multimodal
/// inference service.
#[derive(Debug, Clone)]
pub struct SnapshotImage {
    pub png: Vec<u8>,
}

/// Camera session surface consumed by the engine.
pub trait CameraSession: Send + Sync {
    /// Capture an encoded snapshot of the current view.
    fn capture_snapshot(&self) -> Result<SnapshotImage>;

    /// Feature-point raycast through a viewport pixel against the
    /// session's tracked scene geometry. `None` when no surface is hit.
    fn raycast(&self, screen_point: Vec2) -> Option<Vec3>;
}
