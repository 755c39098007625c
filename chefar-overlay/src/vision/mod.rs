//! Object localization pipeline
//!
//! Per-frame container detection ([`detector`]) and conversion of a 2D
//! detection into a smoothed 3D world position ([`localizer`]).

mod detector;
mod localizer;

pub use detector::{ContainerDetector, ObjectClassifier};
pub use localizer::{AnchorSource, ContainerLocalizer, LocalizedFix};
