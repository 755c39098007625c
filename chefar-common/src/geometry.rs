//! Detection geometry
//!
//! 2D types produced by the object-detection stage. Coordinates are
//! normalized view coordinates in [0,1] with the origin at the top-left.

use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box in normalized [0,1] view coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    /// Center point in normalized view coordinates.
    pub fn center(&self) -> (f32, f32) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Longer of the two normalized sides.
    pub fn max_side(&self) -> f32 {
        self.width.max(self.height)
    }
}

/// One detection result for one frame; never persisted beyond the frame's
/// processing.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionSample {
    pub bounding_box: BoundingBox,
    pub label: String,
    pub confidence: f32,
}
