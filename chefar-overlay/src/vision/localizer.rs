//! 2D→3D localization with temporal smoothing
//!
//! Converts a container detection into a world-space position using one of
//! two strategies: depth-buffer back-projection when a depth channel is
//! present, multi-sample feature-point ray casting otherwise. Raw
//! estimates pass an outlier gate and an exponential blend before they
//! reach the overlay, so single-frame detector glitches never move the
//! placed entity.

use chefar_common::config::DetectionConfig;
use chefar_common::geometry::DetectionSample;
use glam::{Vec2, Vec3};
use tracing::{debug, trace};

use crate::camera::{CameraFrame, CameraSession};

/// Raycast sample offsets around the box center, in pixels.
const SAMPLE_OFFSET_PX: f32 = 10.0;

/// Where a localized fix came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnchorSource {
    /// Derived from a confident detection of the target container.
    Container,
    /// Last-resort raycast of the view center; callers that need the real
    /// container must refuse to finalize placement on this.
    CenterFallback,
}

/// A world-space position produced for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalizedFix {
    pub position: Vec3,
    pub source: AnchorSource,
}

/// Smoothing state and strategy selection for one active overlay.
///
/// Owned single-writer by the lifecycle coordinator; detection results are
/// inputs, never direct mutators. Reset whenever a new step begins or
/// detection is lost for a full playback cycle.
pub struct ContainerLocalizer {
    smoothing_weight: f32,
    outlier_gate_distance: f32,
    smoothed: Option<Vec3>,
}

impl ContainerLocalizer {
    pub fn new(config: &DetectionConfig) -> Self {
        Self {
            smoothing_weight: config.smoothing_weight,
            outlier_gate_distance: config.outlier_gate_distance,
            smoothed: None,
        }
    }

    /// Drop all smoothing state.
    pub fn reset(&mut self) {
        self.smoothed = None;
    }

    /// Current smoothed position, if any sample has been committed.
    pub fn smoothed(&self) -> Option<Vec3> {
        self.smoothed
    }

    /// Localize a detection (or fall back to the view center when absent).
    ///
    /// With a sample: raw estimate via depth back-projection or
    /// multi-sample ray casting, then outlier gate and exponential blend;
    /// the result is container-confirmed. Without a sample: a raycast of
    /// the view center, marked as fallback and kept out of the smoothing
    /// state. `None` when no strategy produced a position this frame.
    pub fn localize<S: CameraSession + ?Sized>(
        &mut self,
        sample: Option<&DetectionSample>,
        frame: &CameraFrame,
        session: &S,
    ) -> Option<LocalizedFix> {
        match sample {
            Some(sample) => {
                let raw = self.raw_estimate(sample, frame, session)?;
                let position = self.commit(raw);
                Some(LocalizedFix {
                    position,
                    source: AnchorSource::Container,
                })
            }
            None => {
                let position = session.raycast(frame.view_center())?;
                trace!(frame = frame.ordinal, "Using view-center fallback anchor");
                Some(LocalizedFix {
                    position,
                    source: AnchorSource::CenterFallback,
                })
            }
        }
    }

    /// Single-frame raw world-space estimate for a detection.
    fn raw_estimate<S: CameraSession + ?Sized>(
        &self,
        sample: &DetectionSample,
        frame: &CameraFrame,
        session: &S,
    ) -> Option<Vec3> {
        let center_norm = sample.bounding_box.center();
        let center_px = frame.to_pixels(center_norm);

        if let Some(depth_map) = &frame.depth {
            let depth = depth_map.sample(center_norm.0, center_norm.1)?;
            let camera_point = frame.intrinsics.back_project(center_px, depth);
            return Some(frame.camera_to_world.transform_point3(camera_point));
        }

        // No depth channel: probe the box center plus eight offset points
        // and average the successful hits.
        let mut hits = Vec::with_capacity(9);
        for dy in [-SAMPLE_OFFSET_PX, 0.0, SAMPLE_OFFSET_PX] {
            for dx in [-SAMPLE_OFFSET_PX, 0.0, SAMPLE_OFFSET_PX] {
                let point = center_px + Vec2::new(dx, dy);
                if let Some(hit) = session.raycast(point) {
                    hits.push(hit);
                }
            }
        }
        if hits.is_empty() {
            trace!(frame = frame.ordinal, "No raycast hits for detection");
            return None;
        }
        let sum: Vec3 = hits.iter().copied().sum();
        Some(sum / hits.len() as f32)
    }

    /// Apply the outlier gate and exponential blend, updating state.
    fn commit(&mut self, raw: Vec3) -> Vec3 {
        let next = match self.smoothed {
            None => raw,
            Some(previous) => {
                if previous.distance(raw) > self.outlier_gate_distance {
                    debug!(
                        distance = previous.distance(raw),
                        "Rejected localization outlier"
                    );
                    previous
                } else {
                    previous * (1.0 - self.smoothing_weight) + raw * self.smoothing_weight
                }
            }
        };
        self.smoothed = Some(next);
        next
    }
}
