//! Container detection
//!
//! Wraps the opaque object-detection model: per frame, keep only
//! detections of the target container label above the confidence
//! threshold and return the single best match.

use chefar_common::animation::Container;
use chefar_common::geometry::DetectionSample;
use tracing::trace;

use crate::camera::CameraFrame;

/// Opaque per-frame object classifier; treated as a pure function of the
/// frame.
pub trait ObjectClassifier: Send + Sync {
    fn classify(&self, frame: &CameraFrame) -> Vec<DetectionSample>;
}

/// Label + confidence filter over the classifier output.
pub struct ContainerDetector<M: ObjectClassifier> {
    classifier: M,
    confidence_threshold: f32,
}

impl<M: ObjectClassifier> ContainerDetector<M> {
    pub fn new(classifier: M, confidence_threshold: f32) -> Self {
        Self {
            classifier,
            confidence_threshold,
        }
    }

    /// Best detection of `target` in `frame`, or `None`.
    ///
    /// Detections with confidence at or below the threshold are discarded.
    /// Among the survivors the highest confidence wins; ties keep the
    /// first-encountered sample (model output order is not guaranteed
    /// stable, an accepted nondeterminism).
    pub fn detect(&self, frame: &CameraFrame, target: Container) -> Option<DetectionSample> {
        let mut best: Option<DetectionSample> = None;
        for sample in self.classifier.classify(frame) {
            if sample.confidence <= self.confidence_threshold {
                continue;
            }
            if sample.label != target.wire_tag() {
                continue;
            }
            match &best {
                Some(current) if sample.confidence <= current.confidence => {}
                _ => best = Some(sample),
            }
        }
        if let Some(sample) = &best {
            trace!(
                frame = frame.ordinal,
                label = %sample.label,
                confidence = sample.confidence,
                "Container detected"
            );
        }
        best
    }
}
